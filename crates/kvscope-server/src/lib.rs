//! HTTP API over kvscope-core.
//!
//! Serves the overview of each configured target and runs single commands
//! against a target node, returning the reply through the selected
//! formatter.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};

use kvscope_core::{
    ConfigError, ConnectionError, CpuTracker, MonitorConfig, OutputFormat, OverviewAggregator,
    OverviewRecord, Target,
};

/// How often idle CPU baselines are swept.
pub const EVICTION_PERIOD: Duration = Duration::from_secs(60);

/// Shared server state.
pub struct AppState {
    targets: Vec<Target>,
    aggregator: OverviewAggregator,
    default_format: OutputFormat,
}

impl AppState {
    pub fn new(
        targets: Vec<Target>,
        aggregator: OverviewAggregator,
        default_format: OutputFormat,
    ) -> Self {
        Self {
            targets,
            aggregator,
            default_format,
        }
    }

    /// TCP-backed targets and a tracker using the configured idle TTL.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, ConfigError> {
        let tracker = match config.baseline_ttl() {
            Some(ttl) => CpuTracker::with_idle_ttl(ttl),
            None => CpuTracker::new(),
        };
        Ok(Self::new(
            config.connect_targets()?,
            OverviewAggregator::new(Arc::new(tracker)),
            config.output_format,
        ))
    }

    fn target(&self, id: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.id == id)
    }

    pub fn tracker(&self) -> &Arc<CpuTracker> {
        self.aggregator.tracker()
    }
}

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    BadRequest(String),
    Upstream(ConnectionError),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Upstream(e) => {
                log::warn!("upstream failure: {e}");
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

fn unknown_target(id: &str) -> ApiError {
    ApiError::NotFound(format!(
        "Unknown target: {id}. Use /targets to list configured targets."
    ))
}

/// Run blocking node I/O off the async runtime.
async fn blocking<T, F>(state: &Arc<AppState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T, ApiError> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {e}")))?
}

#[derive(Deserialize)]
struct CommandRequest {
    /// Whitespace-separated command line, e.g. `GET foo`.
    command: String,
    format: Option<OutputFormat>,
    /// `host:port` of the node to run on; first node when absent.
    node: Option<String>,
}

#[derive(Serialize)]
struct CommandResponse {
    node: String,
    format: OutputFormat,
    reply: serde_json::Value,
}

#[derive(Serialize)]
struct TargetsResponse {
    targets: Vec<TargetEntry>,
    total: usize,
}

#[derive(Serialize)]
struct TargetEntry {
    id: String,
    nodes: Vec<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    targets: usize,
    baselines: usize,
}

#[derive(Serialize)]
struct BaselineResponse {
    target: String,
    removed: bool,
}

async fn handle_overview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OverviewRecord>, ApiError> {
    let record = blocking(&state, move |state| {
        let target = state.target(&id).ok_or_else(|| unknown_target(&id))?;
        state
            .aggregator
            .get_target_overview(target)
            .map_err(ApiError::Upstream)
    })
    .await?;
    Ok(Json(record))
}

async fn handle_command(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let args: Vec<String> = req.command.split_whitespace().map(str::to_string).collect();
    if args.is_empty() {
        return Err(ApiError::BadRequest("empty command".to_string()));
    }
    let format = req.format.unwrap_or(state.default_format);

    let response = blocking(&state, move |state| {
        let target = state.target(&id).ok_or_else(|| unknown_target(&id))?;
        let conn = match req.node.as_deref() {
            Some(node) => target.node(node).ok_or_else(|| {
                ApiError::NotFound(format!("Node {node} is not part of target {id}"))
            })?,
            None => target
                .nodes
                .first()
                .map(|n| &**n)
                .ok_or_else(|| ApiError::NotFound(format!("Target {id} has no nodes")))?,
        };

        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        let reply = conn.command(&argv).map_err(ApiError::Upstream)?;
        log::debug!("{id}: {} on {} -> {}", argv[0], conn.address(), reply.kind());

        Ok(CommandResponse {
            node: conn.address().id(),
            format,
            reply: format.formatter().format(&reply),
        })
    })
    .await?;
    Ok(Json(response))
}

async fn handle_reset_baseline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BaselineResponse>, ApiError> {
    if state.target(&id).is_none() {
        return Err(unknown_target(&id));
    }
    let removed = state.tracker().remove(&id);
    Ok(Json(BaselineResponse {
        target: id,
        removed,
    }))
}

async fn handle_targets(State(state): State<Arc<AppState>>) -> Json<TargetsResponse> {
    let targets: Vec<TargetEntry> = state
        .targets
        .iter()
        .map(|t| TargetEntry {
            id: t.id.clone(),
            nodes: t.node_ids(),
        })
        .collect();
    let total = targets.len();
    Json(TargetsResponse { targets, total })
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        targets: state.targets.len(),
        baselines: state.tracker().len(),
    })
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let first = state
        .targets
        .first()
        .map(|t| t.id.as_str())
        .unwrap_or("cache");

    Json(serde_json::json!({
        "name": "kvscope",
        "version": kvscope_core::VERSION,
        "targets": state.targets.len(),
        "default_format": state.default_format.to_string(),
        "endpoints": {
            "/": "This API index",
            "/health": "Health check",
            "/targets": "List configured targets and their nodes",
            "/targets/{id}/overview": {
                "method": "GET",
                "description": "Poll every node of the target and aggregate one overview",
            },
            "/targets/{id}/command": {
                "method": "POST",
                "description": "Run one command on a node of the target",
                "body": {
                    "command": "Command line, e.g. \"GET foo\"",
                    "format": "Reply format: raw (default) or text",
                    "node": "host:port of the node (default: first node)",
                }
            },
            "/targets/{id}/baseline": {
                "method": "DELETE",
                "description": "Forget the CPU baseline; the next overview reports null CPU",
            },
        },
        "examples": {
            "overview": format!("/targets/{first}/overview"),
        }
    }))
}

/// Build the axum router.
pub fn build_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/targets", get(handle_targets))
        .route("/targets/{id}/overview", get(handle_overview))
        .route("/targets/{id}/command", post(handle_command))
        .route("/targets/{id}/baseline", delete(handle_reset_baseline))
        .with_state(state)
}

/// Periodically drop idle CPU baselines. No-op when the tracker has no TTL.
pub fn spawn_eviction(tracker: Arc<CpuTracker>) -> Option<tokio::task::JoinHandle<()>> {
    tracker.idle_ttl()?;
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(EVICTION_PERIOD);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = tracker.evict_idle();
            if evicted > 0 {
                log::debug!("evicted {evicted} idle baseline(s)");
            }
        }
    }))
}

/// Run the HTTP API until the listener fails.
pub async fn run_server(state: AppState, host: &str, port: u16) -> std::io::Result<()> {
    let eviction = spawn_eviction(Arc::clone(state.tracker()));
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on http://{addr}");
    let result = axum::serve(listener, app).await;
    if let Some(handle) = eviction {
        handle.abort();
    }
    result
}
