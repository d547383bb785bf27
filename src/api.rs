//! REST API server for the loan assistant
//!
//! JSON chat endpoint for web front-ends and a form-encoded webhook for
//! WhatsApp (Twilio) that answers with TwiML.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::LoanOrchestrator;
use crate::state::SessionStore;

const WEBHOOK_FAILURE: &str =
    "I'm sorry, something went wrong. Please try again or type 'restart' to start over.";

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub message: String,
    /// ISO language code; English when absent
    pub language: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub reply: String,
    pub stage: String,
    pub final_decision: Option<String>,
}

/// Twilio posts these as form fields
#[derive(Debug, Deserialize)]
pub struct WhatsAppMessage {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<LoanOrchestrator>,
    pub sessions: Arc<dyn SessionStore>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Message must not be empty".into())),
        );
    }

    let session_id = req
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let session = match state.sessions.checkout(&session_id).await {
        Ok(session) => session,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Session checkout failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("Session unavailable: {}", e))),
            );
        }
    };

    let mut session = session.lock().await;
    if let Some(language) = req.language.filter(|l| !l.trim().is_empty()) {
        session.language = language.trim().to_lowercase();
    }

    let turn = state.orchestrator.handle_message(&mut session, &req.message).await;
    info!(session_id = %session_id, stage = %turn.stage, "Chat turn handled");

    (
        StatusCode::OK,
        Json(ApiResponse::success(ChatResponse {
            session_id,
            reply: turn.reply,
            stage: turn.stage.to_string(),
            final_decision: turn.final_decision.map(|d| d.to_string()),
        })),
    )
}

/// =============================
/// Status Endpoints
/// =============================

async fn status_handler(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    match state.sessions.active_sessions().await {
        Ok(active) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "status": "running",
                "active_sessions": active,
            }))),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Status unavailable: {}", e))),
        ),
    }
}

async fn applications_handler(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.applications().list_for_user(&user_id).await {
        Ok(records) => (StatusCode::OK, Json(ApiResponse::success(records))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Application lookup failed: {}", e))),
        ),
    }
}

/// =============================
/// WhatsApp Webhook
/// =============================

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn twiml(message: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
        escape_xml(message)
    )
}

async fn whatsapp_webhook(
    State(state): State<ApiState>,
    Form(msg): Form<WhatsAppMessage>,
) -> impl IntoResponse {
    info!(from = %msg.from, "WhatsApp message received");

    let reply = match state.sessions.checkout(&msg.from).await {
        Ok(session) => {
            let mut session = session.lock().await;
            let turn = state.orchestrator.handle_message(&mut session, &msg.body).await;
            turn.reply
        }
        Err(e) => {
            warn!(from = %msg.from, error = %e, "Session checkout failed");
            WEBHOOK_FAILURE.to_string()
        }
    };

    ([(header::CONTENT_TYPE, "application/xml")], twiml(&reply))
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<LoanOrchestrator>, sessions: Arc<dyn SessionStore>) -> Router {
    let state = ApiState {
        orchestrator,
        sessions,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/status", get(status_handler))
        .route("/api/applications/:user_id", get(applications_handler))
        .route("/webhook/whatsapp", post(whatsapp_webhook))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<LoanOrchestrator>,
    sessions: Arc<dyn SessionStore>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator, sessions);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{replies, OrchestratorSettings};
    use crate::audit::ApplicationLog;
    use crate::config::AppConfig;
    use crate::state::InMemorySessionStore;
    use crate::tools::create_default_toolkit;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn test_router() -> Router {
        let config = AppConfig {
            sanction_letter_dir: std::env::temp_dir().join(format!("sanction-{}", uuid::Uuid::new_v4())),
            ..AppConfig::default()
        };
        let tools = create_default_toolkit(&config, None).await;
        let orchestrator = Arc::new(LoanOrchestrator::new(
            tools,
            None,
            Arc::new(ApplicationLog::new()),
            OrchestratorSettings::from_config(&config),
        ));
        create_router(orchestrator, Arc::new(InMemorySessionStore::default()))
    }

    async fn post_json(router: &Router, uri: &str, body: serde_json::Value) -> (StatusCode, ApiResponse) {
        let response = router
            .clone()
            .oneshot(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let router = test_router().await;
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_chat_keeps_session_between_turns() {
        let router = test_router().await;

        let (status, first) = post_json(&router, "/api/chat", serde_json::json!({ "message": "__INIT__" })).await;
        assert_eq!(status, StatusCode::OK);
        let data = first.data.unwrap();
        let session_id = data["session_id"].as_str().unwrap().to_string();
        assert_eq!(data["reply"], replies::WELCOME);
        assert_eq!(data["stage"], "initial");

        let (_, second) = post_json(
            &router,
            "/api/chat",
            serde_json::json!({ "session_id": session_id, "message": "7303201137" }),
        )
        .await;
        let data = second.data.unwrap();
        assert_eq!(data["stage"], "verification");
        assert_eq!(data["session_id"], session_id.as_str());

        let response = router
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let status: ApiResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(status.data.unwrap()["active_sessions"], 1);
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let router = test_router().await;
        let (status, body) = post_json(&router, "/api/chat", serde_json::json!({ "message": "  " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
    }

    #[tokio::test]
    async fn test_whatsapp_webhook_returns_twiml() {
        let router = test_router().await;
        let response = router
            .oneshot(
                Request::post("/webhook/whatsapp")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("From=whatsapp%3A%2B917303201137&Body=hi"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.starts_with("<?xml"));
        assert!(body.contains("<Message>"));
    }

    #[test]
    fn test_twiml_escapes_markup() {
        assert_eq!(
            twiml("EMI < 50% & 'ok'"),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>EMI &lt; 50% &amp; &apos;ok&apos;</Message></Response>"
        );
    }
}
