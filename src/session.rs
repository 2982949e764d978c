use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::access::{AccessGate, AccessState};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub question: String,
    pub response: String,
    /// Seconds spent in the agent; zero for cached answers.
    pub elapsed_time: f64,
    pub visualization_code: Option<String>,
    pub asked_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CachedAnswer {
    pub response: String,
    pub visualization_code: Option<String>,
}

/// One user's state. Cache and history grow for as long as the session lives.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub access: AccessState,
    pub history: Vec<HistoryEntry>,
    pub cache: HashMap<String, CachedAnswer>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            access: AccessState::Locked,
            history: Vec::new(),
            cache: HashMap::new(),
            created_at: Utc::now(),
        }
    }
}

/// In-memory sessions keyed by id. Nothing is persisted.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> (Uuid, DateTime<Utc>) {
        let session = Session::new();
        let created = (session.id, session.created_at);
        self.sessions.lock().await.insert(session.id, session);
        tracing::info!(session = %created.0, "session started");
        created
    }

    pub async fn remove(&self, id: Uuid) -> Result<()> {
        match self.sessions.lock().await.remove(&id) {
            Some(session) => {
                tracing::info!(session = %id, questions = session.history.len(), "session ended");
                Ok(())
            }
            None => Err(not_found(id)),
        }
    }

    /// Submits an access code. A rejected code leaves the session as it was.
    pub async fn unlock(&self, id: Uuid, gate: &AccessGate, code: &str) -> Result<AccessState> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(&id).ok_or_else(|| not_found(id))?;
        gate.submit(&mut session.access, code)?;
        tracing::info!(session = %id, "session unlocked");
        Ok(session.access)
    }

    /// Looks up a cached answer, failing if the session is still locked.
    pub async fn cached(&self, id: Uuid, question: &str) -> Result<Option<CachedAnswer>> {
        let sessions = self.sessions.lock().await;
        let session = sessions.get(&id).ok_or_else(|| not_found(id))?;
        if !session.access.is_unlocked() {
            return Err(AppError::Unauthorized);
        }
        Ok(session.cache.get(question).cloned())
    }

    pub async fn remember(&self, id: Uuid, question: &str, answer: CachedAnswer) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(&id).ok_or_else(|| not_found(id))?;
        session.cache.insert(question.to_string(), answer);
        Ok(())
    }

    pub async fn record(&self, id: Uuid, entry: HistoryEntry) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(&id).ok_or_else(|| not_found(id))?;
        session.history.push(entry);
        Ok(())
    }

    pub async fn history(&self, id: Uuid) -> Result<Vec<HistoryEntry>> {
        let sessions = self.sessions.lock().await;
        sessions.get(&id).map(|s| s.history.clone()).ok_or_else(|| not_found(id))
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::SessionNotFound(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessError;

    fn entry(question: &str) -> HistoryEntry {
        HistoryEntry {
            question: question.to_string(),
            response: "answer".to_string(),
            elapsed_time: 1.5,
            visualization_code: None,
            asked_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn locked_sessions_cannot_read_the_cache() {
        let store = SessionStore::new();
        let (id, _) = store.create().await;

        assert!(matches!(store.cached(id, "q").await, Err(AppError::Unauthorized)));

        store.unlock(id, &AccessGate::default(), "demo01").await.unwrap();
        assert!(store.cached(id, "q").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejected_codes_leave_the_session_locked() {
        let store = SessionStore::new();
        let (id, _) = store.create().await;

        let err = store.unlock(id, &AccessGate::default(), "abc12").await.unwrap_err();
        assert!(matches!(err, AppError::AccessDenied(AccessError::InvalidFormat)));
        assert!(matches!(store.cached(id, "q").await, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn cache_is_keyed_by_exact_question() {
        let store = SessionStore::new();
        let (id, _) = store.create().await;
        store.unlock(id, &AccessGate::default(), "ALPHA1").await.unwrap();

        store
            .remember(
                id,
                "Worst heat wave?",
                CachedAnswer {
                    response: "ERCOT 2011".to_string(),
                    visualization_code: Some("{}".to_string()),
                },
            )
            .await
            .unwrap();

        let hit = store.cached(id, "Worst heat wave?").await.unwrap().unwrap();
        assert_eq!(hit.response, "ERCOT 2011");
        assert!(store.cached(id, "worst heat wave?").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn history_keeps_submission_order() {
        let store = SessionStore::new();
        let (id, _) = store.create().await;
        store.record(id, entry("first")).await.unwrap();
        store.record(id, entry("second")).await.unwrap();

        let questions: Vec<String> = store
            .history(id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.question)
            .collect();
        assert_eq!(questions, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn removed_sessions_are_gone() {
        let store = SessionStore::new();
        let (id, _) = store.create().await;
        store.remove(id).await.unwrap();

        assert!(matches!(store.history(id).await, Err(AppError::SessionNotFound(_))));
        assert!(matches!(store.remove(id).await, Err(AppError::SessionNotFound(_))));
    }
}
