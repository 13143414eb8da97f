use std::net::{IpAddr, SocketAddr};

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::cluster::{
    ClientInfo, CloudletSummary, DeploymentRecipe, GeoLocation, HeartbeatReport, PublicKey,
    ResourceRequirements,
};
use crate::matcher::MatchError;
use crate::server::state::AppState;

/// Header carrying the original client address when the request is proxied
pub const CLIENT_IP_HEADER: &str = "x-clientip";

/// Client description in a match request
#[derive(Debug, Deserialize)]
pub struct ClientRequest {
    pub publickey: PublicKey,
    #[serde(default)]
    pub ipaddress: Option<IpAddr>,
    #[serde(default)]
    pub location: Option<GeoLocation>,
    #[serde(rename = "resourceReqs", default)]
    pub resource_reqs: ResourceRequirements,
}

/// Body of `POST /api/v1/match`
#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    #[serde(default)]
    pub client: Option<ClientRequest>,
    pub recipe: DeploymentRecipe,
    /// Deployment class selecting the pipeline
    #[serde(default)]
    pub class: Option<String>,
    /// Number of candidates wanted
    #[serde(default)]
    pub results: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Error response with a JSON body
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<MatchError> for ApiError {
    fn from(e: MatchError) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: e.to_string(),
        }
    }
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Heartbeat from a Tier2 node or cloudlet
pub async fn post_heartbeat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let report: HeartbeatReport = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid heartbeat: {}", e)))?;

    debug!("Heartbeat from {} at {}", report.uuid, report.endpoint);
    state.registry.apply_heartbeat(report).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Known cloudlets
pub async fn list_cloudlets(State(state): State<AppState>) -> Json<Vec<CloudletSummary>> {
    Json(state.registry.summaries().await)
}

#[derive(Serialize)]
struct PipelineInfo {
    class: String,
    stages: Vec<String>,
}

/// Configured pipelines per deployment class
pub async fn list_matchers(State(state): State<AppState>) -> impl IntoResponse {
    let pipelines: Vec<_> = state
        .pipelines
        .values()
        .map(|p| PipelineInfo {
            class: p.class().to_string(),
            stages: p.names().into_iter().map(String::from).collect(),
        })
        .collect();
    Json(pipelines)
}

/// Rank cloudlets for a client and recipe
pub async fn match_cloudlets(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<CloudletSummary>>, ApiError> {
    let request: MatchRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid match request: {}", e)))?;

    let header_ip = headers
        .get(CLIENT_IP_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok());
    let client = build_client(request.client, header_ip, peer.ip());

    let class = request.class.as_deref();
    let pipeline = state.pipeline(class).ok_or_else(|| {
        ApiError::bad_request(format!(
            "Unknown deployment class '{}'",
            class.unwrap_or_default()
        ))
    })?;
    let limit = state.result_limit(request.results);

    let mut pool = state.registry.snapshot().await;
    let found = pipeline
        .best_match(&client, &request.recipe, &mut pool)
        .take_best(limit)?;

    info!(
        "Matched {} cloudlet(s) for {} ({} {})",
        found.len(),
        client.ipaddress,
        request.recipe.name,
        request.recipe.version
    );
    Ok(Json(found.iter().map(|c| c.summary()).collect()))
}

/// Client address precedence: request body, then `X-ClientIP`, then the
/// connection peer.
fn build_client(
    request: Option<ClientRequest>,
    header_ip: Option<IpAddr>,
    peer_ip: IpAddr,
) -> ClientInfo {
    let (publickey, ipaddress, location, reqs) = match request {
        Some(c) => (c.publickey, c.ipaddress, c.location, c.resource_reqs),
        None => (PublicKey::new(""), None, None, ResourceRequirements::default()),
    };
    let ipaddress = ipaddress.or(header_ip).unwrap_or(peer_ip);

    let mut client = ClientInfo::new(publickey, ipaddress).with_requirements(reqs);
    if let Some(location) = location {
        client = client.with_location(location);
    }
    client
}

/// Create the Axum router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/cloudlets/",
            get(list_cloudlets).post(post_heartbeat),
        )
        .route(
            "/api/v1/cloudlets",
            get(list_cloudlets).post(post_heartbeat),
        )
        .route("/api/v1/matchers", get(list_matchers))
        .route("/api/v1/match", post(match_cloudlets))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
