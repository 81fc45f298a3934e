//! HTTP gateway for the Talon runtime.
//!
//! Endpoints:
//! - `GET  /health` — liveness probe
//! - `POST /v1/runs` — synchronous run, JSON in/out
//! - `POST /v1/runs/stream` — server-sent events with 15 s pings
//!
//! Error kinds map onto status codes: invalid input 400, rate limit 429,
//! concurrency 503, model failure 502, timeout 504, everything else 500.
//! Bodies above 1 MiB are rejected as invalid requests.
//!
//! Built on Axum; the tower-http trace layer logs every request.

pub mod sse;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use talon_config::Settings;
use talon_core::{
    normalize_name, Error, ErrorKind, Model, RunMode, RunRequest, SessionStore,
};
use talon_runtime::{
    AdmissionGate, AgentRunner, GateConfig, LoggingMiddleware, MiddlewareChain,
    MonitoringMiddleware, RunnerConfig,
};
use talon_security::{CommandPolicy, SandboxPolicy};
use talon_sessions::{FileStore, InMemoryStore};
use talon_tools::{builtin_registry, BuiltinConfig};

/// Maximum accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared gateway state.
pub struct GatewayState {
    pub runner: Arc<AgentRunner>,
}

pub type SharedState = Arc<GatewayState>;

/// Assemble an [`AgentRunner`] from a validated settings record.
///
/// The model adapter is supplied by the caller; everything else (registry,
/// sandbox, sessions, gate, middleware chain) is wired from settings.
pub fn build_runtime(settings: &Settings, model: Arc<dyn Model>) -> talon_core::Result<Arc<AgentRunner>> {
    let working_set: Vec<PathBuf> = settings.working_set.iter().map(PathBuf::from).collect();

    let mut command_policy = CommandPolicy::default();
    command_policy
        .blocked_patterns
        .extend(settings.blocked_patterns.iter().cloned());
    command_policy
        .blocked_commands
        .extend(settings.blocked_commands.iter().cloned());

    let selection: Option<HashSet<String>> = if settings.tools.is_empty() {
        None
    } else {
        Some(settings.tools.iter().map(|t| normalize_name(t)).collect())
    };
    let registry = builtin_registry(
        &BuiltinConfig {
            working_set: working_set.clone(),
            command_policy: command_policy.clone(),
        },
        selection.as_ref(),
    )
    .build()?;

    let store: Arc<dyn SessionStore> = match settings.session.backend.as_str() {
        "file" => {
            let dir = settings.session.dir.clone().ok_or_else(|| {
                Error::InvalidRequest("file session backend requires session.dir".into())
            })?;
            Arc::new(FileStore::open(dir)?)
        }
        _ => Arc::new(InMemoryStore::new()),
    };

    let mut chain = MiddlewareChain::new(vec![
        Arc::new(LoggingMiddleware::new(90)),
        Arc::new(MonitoringMiddleware::new(50, Duration::from_secs(10))),
    ]);
    if settings.hook_timeout_ms > 0 {
        chain = chain.with_hook_timeout(Duration::from_millis(settings.hook_timeout_ms));
    }

    let runner_config = RunnerConfig {
        max_iterations: settings.max_iterations,
        default_timeout: (settings.run_timeout_ms > 0)
            .then(|| Duration::from_millis(settings.run_timeout_ms)),
        auto_bookmark: true,
    };

    Ok(Arc::new(
        AgentRunner::new(
            model,
            Arc::new(registry),
            Arc::new(chain),
            Arc::new(SandboxPolicy::new(working_set).with_command_policy(command_policy)),
            store,
            Arc::new(AdmissionGate::new(GateConfig {
                rate: settings.rate,
                burst: settings.burst,
                concurrency: settings.concurrency,
            })),
        )
        .with_config(runner_config),
    ))
}

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/runs", post(run_handler))
        .route("/v1/runs/stream", post(sse::stream_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn serve(settings: Settings, model: Arc<dyn Model>) -> talon_core::Result<()> {
    let addr = format!("{}:{}", settings.gateway.host, settings.gateway.port);
    let runner = build_runtime(&settings, model)?;
    let app = build_router(Arc::new(GatewayState { runner }));

    info!(%addr, "gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Internal(format!("bind {addr}: {e}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Internal(format!("serve: {e}")))
}

// --- Wire types ---

/// The run request body. Unknown fields are rejected.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunBody {
    pub prompt: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub tags: Option<HashMap<String, String>>,
    #[serde(default)]
    pub traits: Option<Vec<String>>,
    #[serde(default)]
    pub channels: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub tool_whitelist: Option<Vec<String>>,
}

impl RunBody {
    pub fn into_request(self) -> RunRequest {
        let mut request = RunRequest::new(self.prompt, RunMode::Http);
        request.session_id = self.session_id;
        request.timeout = self.timeout_ms.map(Duration::from_millis);
        request.tags = self.tags.unwrap_or_default();
        request.traits = self.traits.unwrap_or_default();
        request.channels = self.channels.unwrap_or_default();
        request.metadata = self.metadata.unwrap_or_default();
        if let Some(whitelist) = self.tool_whitelist {
            request = request.with_whitelist(whitelist);
        }
        request
    }
}

/// The `{kind, message, detail?}` error surface.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ErrorBody {
    pub fn from_error(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            detail: None,
        }
    }
}

/// Error kind → HTTP status mapping.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest | ErrorKind::InvalidToolArgs => StatusCode::BAD_REQUEST,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::ConcurrencyExceeded => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ModelError => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) struct ApiError(pub Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody::from_error(&self.0);
        (status_for(body.kind), Json(body)).into_response()
    }
}

/// Decode a JSON body within the size cap.
pub(crate) fn decode_body(bytes: &Bytes) -> Result<RunBody, ApiError> {
    if bytes.len() > MAX_BODY_BYTES {
        return Err(ApiError(Error::InvalidRequest(
            "request body exceeds 1 MiB".into(),
        )));
    }
    serde_json::from_slice(bytes)
        .map_err(|e| ApiError(Error::InvalidRequest(format!("invalid request body: {e}"))))
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn run_handler(
    State(state): State<SharedState>,
    bytes: Bytes,
) -> Result<Response, ApiError> {
    let body = decode_body(&bytes)?;
    let response = state
        .runner
        .run(body.into_request())
        .await
        .map_err(ApiError)?;
    Ok(Json(response).into_response())
}
