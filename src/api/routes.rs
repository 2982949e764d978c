use axum::{
    routing::{delete, get, post},
    Router,
    extract::{Json, Path, State},
    response::{Html, IntoResponse},
};
use chrono::Utc;
use std::time::Instant;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::api::models::{
    AccessRequest, AccessResponse, AskRequest, AskResponse, Health, HistoryResponse, SessionCreated,
};
use crate::api::response;
use crate::format::enhance_presentation;
use crate::session::{CachedAnswer, HistoryEntry};
use crate::viz::visualize;
use crate::AppState;

pub const APOLOGY: &str = "I'm sorry, I encountered an error while processing your question. Please try again.";

const INDEX_HTML: &str = include_str!("../../static/index.html");

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", delete(end_session))
        .route("/api/sessions/:id/access", post(submit_access_code))
        .route("/api/sessions/:id/ask", post(ask))
        .route("/api/sessions/:id/history", get(history))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> impl IntoResponse {
    response::success(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let (session_id, created_at) = state.sessions.create().await;
    response::success(SessionCreated {
        session_id,
        access: crate::access::AccessState::Locked,
        created_at,
    })
}

async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let session_id = parse_session_id(&id)?;
    state.sessions.remove(session_id).await?;
    Ok(response::success(session_id))
}

async fn submit_access_code(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AccessRequest>,
) -> Result<impl IntoResponse> {
    let session_id = parse_session_id(&id)?;
    let access = state.sessions.unlock(session_id, &state.gate, &req.code).await?;
    Ok(response::success(AccessResponse { session_id, access }))
}

async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let session_id = parse_session_id(&id)?;
    let entries = state.sessions.history(session_id).await?;
    Ok(response::success(HistoryResponse { session_id, entries }))
}

async fn ask(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AskRequest>,
) -> Result<impl IntoResponse> {
    let session_id = parse_session_id(&id)?;
    if req.question.trim().is_empty() {
        return Err(AppError::ParseError("question must not be empty".to_string()));
    }
    let question = req.question;

    // The store lock is released before the agent runs.
    let outcome = match state.sessions.cached(session_id, &question).await? {
        Some(hit) => {
            tracing::info!(session = %session_id, "answer served from cache");
            Answer::cached(hit.response)
        }
        None => run_agent(&state, &question).await,
    };

    let visualization = visualize(&outcome.response, &state.geometry);
    let visualization_code = if outcome.fresh() {
        visualization.summary()
    } else {
        None
    };

    if outcome.fresh() {
        state
            .sessions
            .remember(
                session_id,
                &question,
                CachedAnswer {
                    response: outcome.response.clone(),
                    visualization_code: visualization_code.clone(),
                },
            )
            .await?;
    }

    state
        .sessions
        .record(
            session_id,
            HistoryEntry {
                question: question.clone(),
                response: outcome.response.clone(),
                elapsed_time: outcome.elapsed_time,
                visualization_code,
                asked_at: Utc::now(),
            },
        )
        .await?;

    Ok(response::success(AskResponse {
        presentation: enhance_presentation(&outcome.response),
        question,
        response: outcome.response,
        elapsed_time: outcome.elapsed_time,
        cached: outcome.cached,
        error_banner: outcome.error_banner,
        visualization,
    }))
}

struct Answer {
    response: String,
    elapsed_time: f64,
    cached: bool,
    error_banner: Option<String>,
}

impl Answer {
    fn cached(response: String) -> Self {
        Self {
            response,
            elapsed_time: 0.0,
            cached: true,
            error_banner: None,
        }
    }

    /// A successful answer straight from the agent; only these are cached.
    fn fresh(&self) -> bool {
        !self.cached && self.error_banner.is_none()
    }
}

async fn run_agent(state: &AppState, question: &str) -> Answer {
    let prompt = state.prompt.render(question);
    let start_time = Instant::now();
    let result = state.agent.ask(&prompt).await;
    let elapsed_time = start_time.elapsed().as_secs_f64();

    match result {
        Ok(response) => {
            tracing::info!(elapsed = elapsed_time, chars = response.len(), "agent answered");
            Answer {
                response,
                elapsed_time,
                cached: false,
                error_banner: None,
            }
        }
        Err(err) => {
            tracing::error!(error = %err, elapsed = elapsed_time, "agent failed");
            Answer {
                response: APOLOGY.to_string(),
                elapsed_time,
                cached: false,
                error_banner: Some(format!("Error getting response: {}", err)),
            }
        }
    }
}

fn parse_session_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::SessionNotFound(raw.to_string()))
}
