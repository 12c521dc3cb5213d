//! HTTP surface: `POST /generate`, `DELETE /sessions/:id` and `GET /health`.
//!
//! Every `/generate` call answers 200 with a `{message, files}` body, including failures.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use eyre::{Result, WrapErr};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

use crate::codegen::{ConversationOrchestrator, ConversationState, GenerationResult};
use crate::error::CodegenError;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

struct Session {
    conversation: Arc<Mutex<ConversationState>>,
    last_used: Instant,
}

pub struct AppState {
    orchestrator: ConversationOrchestrator,
    sessions: Mutex<HashMap<String, Session>>,
    session_idle: Duration,
}

impl AppState {
    pub fn new(orchestrator: ConversationOrchestrator, session_idle: Duration) -> Self {
        Self {
            orchestrator,
            sessions: Mutex::new(HashMap::new()),
            session_idle,
        }
    }

    /// Fetch or open the conversation for `id`, dropping sessions idle longer than
    /// `session_idle` first.
    async fn session(&self, id: &str) -> Arc<Mutex<ConversationState>> {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();

        let before = sessions.len();
        sessions.retain(|_, session| now.duration_since(session.last_used) < self.session_idle);
        if sessions.len() < before {
            debug!("Evicted {} idle sessions", before - sessions.len());
        }

        let session = sessions.entry(id.to_string()).or_insert_with(|| Session {
            conversation: Arc::new(Mutex::new(ConversationState::new())),
            last_used: now,
        });
        session.last_used = now;
        session.conversation.clone()
    }

    /// Release the conversation for `id`. Returns `false` if there was none.
    async fn end_session(&self, id: &str) -> bool {
        self.sessions.lock().await.remove(id).is_some()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .route("/sessions/:id", delete(end_session))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .await
        .wrap_err("HTTP server stopped")?;
    Ok(())
}

async fn generate(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<GenerateRequest>, JsonRejection>,
) -> Json<GenerationResult> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let err = CodegenError::InvalidInput(rejection.body_text());
            error!("Rejected request: {}", err);
            return Json(GenerationResult::failure(&err));
        }
    };
    info!("Received prompt: {}", request.prompt);

    let outcome = match &request.session_id {
        Some(id) => {
            let session = state.session(id).await;
            // One cycle at a time per session.
            let mut conversation = session.lock().await;
            let outcome = state.orchestrator.handle_turn(&request.prompt, &mut conversation).await;
            debug!("Session {} now has {} turns", id, conversation.len());
            outcome
        }
        None => {
            let mut conversation = ConversationState::new();
            state.orchestrator.handle_turn(&request.prompt, &mut conversation).await
        }
    };

    match outcome {
        Ok(result) => Json(result),
        Err(e) => {
            error!("Rejected request: {}", e);
            Json(GenerationResult::failure(&e))
        }
    }
}

async fn end_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> StatusCode {
    if state.end_session(&id).await {
        info!("Ended session {}", id);
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
