use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::access::AccessState;
use crate::session::HistoryEntry;
use crate::viz::VisualizationOutcome;

#[derive(Deserialize)]
pub struct AccessRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Serialize)]
pub struct SessionCreated {
    pub session_id: Uuid,
    pub access: AccessState,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct AccessResponse {
    pub session_id: Uuid,
    pub access: AccessState,
}

#[derive(Serialize)]
pub struct AskResponse {
    pub question: String,
    /// Raw answer text from the agent, or the apology when it failed.
    pub response: String,
    /// Markdown with the event table already rendered to HTML.
    pub presentation: String,
    pub elapsed_time: f64,
    pub cached: bool,
    pub error_banner: Option<String>,
    pub visualization: VisualizationOutcome,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub session_id: Uuid,
    pub entries: Vec<HistoryEntry>,
}

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}
