//! HTTP facade for the capability authority.
//!
//! Thin JSON wrapper over [`CapabilityAuthority`]: handlers parse ids and
//! bodies, call exactly one authority operation and map
//! [`AuthorizationError`] to a status code with a `{"error", "message"}`
//! body. Prometheus metrics are served from a separate listener.

use crate::caps::{
    AutoGrantRule, CandidateOffer, CapabilityAuthority, CapabilityId, RequestId,
    RequestSubmission, RequesterAttributes, RootIssue,
};
use crate::error::{AuthorizationError, AuthzResult};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    authority: Arc<CapabilityAuthority>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl IntoResponse for AuthorizationError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error_code(),
            message: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Optional grant body.
#[derive(Debug, Default, Deserialize)]
struct GrantBody {
    #[serde(rename = "requesterAttributes", default)]
    attributes: Option<RequesterAttributes>,
}

/// Build the API router.
pub fn router(authority: Arc<CapabilityAuthority>, cors_allow_any_origin: bool) -> Router {
    let app = Router::new()
        .route("/ping", get(ping))
        .route("/cap", get(list_capabilities).post(issue_roots))
        .route("/cap/delegated", get(list_delegated))
        .route("/cap/granted", get(list_granted))
        .route("/cap/:capability_id/chain", get(capability_chain))
        .route("/cap/:capability_id/revoke", post(revoke))
        .route("/capReq", get(list_requests).post(submit_request))
        .route("/capReq/pending", get(list_pending))
        .route("/capReq/:request_id/candidates", post(attach_candidate))
        .route("/capReq/:request_id/grant/:capability_id", post(grant))
        .route("/user/grantPolicy", get(list_rules).post(add_rule))
        .with_state(ApiState { authority });

    let app = if cors_allow_any_origin {
        app.layer(CorsLayer::permissive())
    } else {
        app
    };
    app.layer(TraceLayer::new_for_http())
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> AuthzResult<T> {
    serde_json::from_slice(body).map_err(|e| AuthorizationError::BadRequest(e.to_string()))
}

fn non_empty(id: String, what: &str) -> AuthzResult<String> {
    if id.trim().is_empty() {
        return Err(AuthorizationError::BadRequest(format!("empty {what} id")));
    }
    Ok(id)
}

/// Run a lock-taking authority call off the async workers.
async fn blocking<T, F>(authority: Arc<CapabilityAuthority>, op: F) -> AuthzResult<T>
where
    T: Send + 'static,
    F: FnOnce(&CapabilityAuthority) -> AuthzResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || op(&authority))
        .await
        .map_err(|e| AuthorizationError::Internal(e.to_string()))?
}

// ============================================================================
// Handlers
// ============================================================================

async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "pong" }))
}

async fn list_capabilities(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.authority.list_capabilities())
}

async fn list_delegated(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.authority.list_delegated())
}

async fn list_granted(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.authority.list_granted())
}

async fn issue_roots(State(state): State<ApiState>, body: Bytes) -> Response {
    let issues: Vec<RootIssue> = match parse_json(&body) {
        Ok(issues) => issues,
        Err(e) => return e.into_response(),
    };
    let mut issued = Vec::with_capacity(issues.len());
    for issue in issues {
        match state.authority.issue_root(issue) {
            Ok(cap) => issued.push(cap),
            Err(e) => return e.into_response(),
        }
    }
    Json(issued).into_response()
}

async fn capability_chain(
    State(state): State<ApiState>,
    Path(capability_id): Path<String>,
) -> Response {
    let id = match non_empty(capability_id, "capability") {
        Ok(id) => CapabilityId::from(id),
        Err(e) => return e.into_response(),
    };
    match state.authority.chain(&id) {
        Ok(chain) => Json(chain).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn revoke(State(state): State<ApiState>, Path(capability_id): Path<String>) -> Response {
    let id = match non_empty(capability_id, "capability") {
        Ok(id) => CapabilityId::from(id),
        Err(e) => return e.into_response(),
    };
    match state.authority.revoke(&id) {
        Ok(cap) => Json(cap).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn list_requests(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.authority.list_requests())
}

async fn list_pending(State(state): State<ApiState>) -> Response {
    let authority = Arc::clone(&state.authority);
    match blocking(authority, |a| Ok(a.list_pending_requests())).await {
        Ok(pending) => Json(pending).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn submit_request(State(state): State<ApiState>, body: Bytes) -> Response {
    let submission: RequestSubmission = match parse_json(&body) {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };
    let authority = Arc::clone(&state.authority);
    match blocking(authority, move |a| a.request_capability(submission)).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn attach_candidate(
    State(state): State<ApiState>,
    Path(request_id): Path<String>,
    body: Bytes,
) -> Response {
    let request_id = match non_empty(request_id, "request") {
        Ok(id) => RequestId::from(id),
        Err(e) => return e.into_response(),
    };
    let offer: CandidateOffer = match parse_json(&body) {
        Ok(o) => o,
        Err(e) => return e.into_response(),
    };
    let authority = Arc::clone(&state.authority);
    match blocking(authority, move |a| a.attach_candidate(&request_id, offer)).await {
        Ok(cap) => Json(cap).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn grant(
    State(state): State<ApiState>,
    Path((request_id, capability_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let ids = non_empty(request_id, "request").and_then(|r| {
        non_empty(capability_id, "capability").map(|c| (RequestId::from(r), CapabilityId::from(c)))
    });
    let (request_id, capability_id) = match ids {
        Ok(ids) => ids,
        Err(e) => return e.into_response(),
    };

    let attributes = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match parse_json::<GrantBody>(&body) {
            Ok(b) => b.attributes,
            Err(e) => return e.into_response(),
        }
    };

    let authority = Arc::clone(&state.authority);
    match blocking(authority, move |a| {
        a.grant(&request_id, &capability_id, attributes)
    })
    .await
    {
        Ok(cap) => Json(cap).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn list_rules(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.authority.auto_grant_rules())
}

async fn add_rule(State(state): State<ApiState>, body: Bytes) -> Response {
    match parse_json::<AutoGrantRule>(&body) {
        Ok(rule) => Json(state.authority.add_auto_grant_rule(rule)).into_response(),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// Servers
// ============================================================================

/// Serve the API on `listener` until ctrl-c.
pub async fn serve_api(listener: tokio::net::TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Run the HTTP server for Prometheus metrics.
///
/// Binds to `0.0.0.0:port` and serves `/metrics`. Long-running; spawn it.
pub async fn run_metrics_server(port: u16) {
    let app = Router::new().route("/metrics", get(metrics_handler));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Prometheus HTTP server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind metrics server on {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Metrics server error: {}", e);
    }
}
