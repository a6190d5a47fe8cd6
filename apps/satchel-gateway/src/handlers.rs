use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use satchel_proto::{ActivateError, ActivateResponse, GatewayHealth, UpstreamErrorBody, VersionInfo};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::audit::{AuditKind, AuditLog};
use crate::config::GatewayConfig;

/// Codes accepted by `/activate`. A static membership set, not a database.
const ACTIVATION_CODES: &[&str] = &["SCHOOL123", "EDUCATION456", "HOMEWORK789"];

/// System prompt sent with every session-issuance request.
const ASSISTANT_INSTRUCTIONS: &str = "\
You are a friendly, patient, and educational homework helper for students up \
to 5th grade. Respond in the language the student uses (English or Urdu), and \
switch if they do. Give clear, simple explanations, break concepts into small \
steps, use examples from a child's everyday life, and encourage critical \
thinking instead of handing over answers. Keep a warm, supportive tone and \
simple vocabulary. Cover elementary math, science, language arts, and social \
studies. Stay strictly on educational content, decline anything that looks \
like a test or quiz, and guide the student through the process rather than \
solving problems for them. Describe visual concepts in words.";

#[derive(Clone)]
pub struct AppState {
    pub http: reqwest::Client,
    pub config: Arc<GatewayConfig>,
    pub audit: AuditLog,
    pub started: Instant,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Self {
        let audit = AuditLog::new(&config.log_dir);
        Self {
            http: reqwest::Client::new(),
            config: Arc::new(config),
            audit,
            started: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/session", get(create_session))
        .route("/activate", post(activate))
        .route("/test", get(test_status))
        .route("/health", get(health))
        .route("/version", get(version))
        .layer(middleware::from_fn_with_state(state.clone(), access_log))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Access-log middleware: one line per request, fire-and-forget.
async fn access_log(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state
        .audit
        .append(AuditKind::Access, &format!("{} {}", request.method(), request.uri()));
    next.run(request).await
}

fn upstream_error(status: StatusCode, error: &str, details: serde_json::Value) -> Response {
    (
        status,
        Json(UpstreamErrorBody {
            error: error.to_string(),
            details,
            status: status.as_u16(),
        }),
    )
        .into_response()
}

/// GET /session - mint an ephemeral realtime credential via the provider.
///
/// The provider's JSON is returned verbatim on success so the client sees the
/// exact credential shape the provider documents.
pub async fn create_session(State(state): State<AppState>) -> Response {
    if state.config.provider_api_key.is_empty() {
        error!("provider API key is not configured");
        state
            .audit
            .append(AuditKind::Error, "session request refused: API key missing");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "API key is missing" })),
        )
            .into_response();
    }

    let body = json!({
        "model": state.config.model,
        "voice": state.config.voice,
        "instructions": ASSISTANT_INSTRUCTIONS,
    });
    let result = state
        .http
        .post(&state.config.provider_sessions_url)
        .bearer_auth(&state.config.provider_api_key)
        .timeout(state.config.upstream_timeout)
        .json(&body)
        .send()
        .await;

    let response = match result {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "provider session request failed to send");
            state
                .audit
                .append(AuditKind::Error, &format!("provider unreachable: {err}"));
            return upstream_error(
                StatusCode::BAD_GATEWAY,
                "Failed to reach provider",
                json!(err.to_string()),
            );
        }
    };

    let upstream_status = response.status();
    if !upstream_status.is_success() {
        let details = match response.text().await {
            Ok(text) => {
                serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw_error": text }))
            }
            Err(_) => serde_json::Value::Null,
        };
        warn!(status = upstream_status.as_u16(), "provider rejected session request");
        state.audit.append(
            AuditKind::Error,
            &format!("provider session error ({}): {details}", upstream_status.as_u16()),
        );
        let status = StatusCode::from_u16(upstream_status.as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        return upstream_error(status, "Provider session error", details);
    }

    match response.json::<serde_json::Value>().await {
        Ok(data) => {
            let session_id = data.get("id").and_then(|v| v.as_str()).unwrap_or("unknown");
            state
                .audit
                .append(AuditKind::Session, &format!("Session created: {session_id}"));
            Json(data).into_response()
        }
        Err(err) => {
            error!(error = %err, "provider returned unparseable session body");
            upstream_error(
                StatusCode::BAD_GATEWAY,
                "Provider returned invalid JSON",
                json!(err.to_string()),
            )
        }
    }
}

/// POST /activate - static membership check over the activation code set.
pub async fn activate(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let code = body
        .get("activationCode")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|code| !code.is_empty());
    let Some(code) = code else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Activation code is required" })),
        )
            .into_response();
    };

    if ACTIVATION_CODES.contains(&code) {
        state.audit.append(
            AuditKind::Activation,
            &format!("Successful activation with code: {code}"),
        );
        let token = STANDARD.encode(format!("{code}-{}", chrono::Utc::now().timestamp_millis()));
        Json(ActivateResponse {
            success: true,
            message: "Activation successful".to_string(),
            token,
        })
        .into_response()
    } else {
        state.audit.append(
            AuditKind::Activation,
            &format!("Failed activation attempt with code: {code}"),
        );
        (
            StatusCode::UNAUTHORIZED,
            Json(ActivateError {
                success: false,
                error: "Invalid activation code".to_string(),
            }),
        )
            .into_response()
    }
}

/// GET /test
pub async fn test_status() -> Json<serde_json::Value> {
    Json(json!({ "status": "Server is running" }))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<GatewayHealth> {
    Json(GatewayHealth {
        status: "OK".to_string(),
        uptime: state.started.elapsed().as_secs(),
        timestamp: chrono::Utc::now().timestamp_millis() as u64,
    })
}

/// GET /version
pub async fn version() -> Json<VersionInfo> {
    Json(VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        name: "Satchel Homework Helper".to_string(),
        description: "A voice-based homework helper for elementary students".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_router() -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = GatewayConfig {
            log_dir: dir.path().to_string_lossy().to_string(),
            ..GatewayConfig::default()
        };
        (router(AppState::new(config)), dir)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("parse body")
    }

    fn activate_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/activate")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("build request")
    }

    #[tokio::test]
    async fn valid_code_returns_token() {
        let (app, _dir) = test_router();
        let response = app
            .oneshot(activate_request(r#"{"activationCode":"SCHOOL123"}"#))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert!(!body["token"].as_str().unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn unknown_code_is_unauthorized() {
        let (app, _dir) = test_router();
        let response = app
            .oneshot(activate_request(r#"{"activationCode":"WRONG"}"#))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn missing_code_is_bad_request() {
        let (app, _dir) = test_router();
        let response = app
            .oneshot(activate_request(r#"{}"#))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn session_without_key_is_refused() {
        let (app, _dir) = test_router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/session")
                    .body(Body::empty())
                    .expect("build request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "API key is missing");
    }

    #[tokio::test]
    async fn diagnostics_respond() {
        let (app, _dir) = test_router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/version")
                    .body(Body::empty())
                    .expect("build request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["name"], "Satchel Homework Helper");
    }
}
