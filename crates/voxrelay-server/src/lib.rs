//! The HTTP control plane: the browser's sole entry point. Serves a static
//! voice-selector page, proxies the stateful agent service, mints LiveKit
//! join tokens, and dispatches agents into rooms.

pub mod config;

use axum::extract::{DefaultBodyLimit, Query, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use config::CorsConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use voxrelay_fabric::Fabric;

const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;
const DEFAULT_TOKEN_TTL_HOURS: u64 = 24;
const MAX_TOKEN_TTL_HOURS: u64 = 168;
const DEFAULT_ROOM: &str = "test-room";
const DEFAULT_IDENTITY: &str = "user1";

/// Shared state for every handler.
pub struct AppState {
    pub fabric: Arc<dyn Fabric>,
    pub http_client: reqwest::Client,
    pub agent_service_base_url: String,
    pub worker_name: String,
}

impl AppState {
    pub fn new(fabric: Arc<dyn Fabric>, agent_service_base_url: String, worker_name: String) -> Self {
        Self {
            fabric,
            http_client: reqwest::Client::new(),
            agent_service_base_url,
            worker_name,
        }
    }
}

/// Errors surfaced to HTTP clients, mapped to status codes the way the
/// platform's own API error enum does.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("upstream request failed: {0}")]
    UpstreamFailure(String),

    #[error("fabric operation failed: {0}")]
    FabricFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            ApiError::FabricFailure(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody {
            success: false,
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

/// Builds the router. `join_token_fn` mints a signed room-access credential;
/// it is a plain closure rather than a method on `Fabric` because token
/// minting only needs the LiveKit key pair, not a live room-service call.
pub fn app(state: Arc<AppState>, cors: &CorsConfig) -> Router {
    let cors_layer = build_cors_layer(cors);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/token", get(issue_token))
        .route("/api/dispatch-agent", post(dispatch_agent))
        .route("/api/v1/{*path}", get(proxy_agent_service))
        .layer(cors_layer)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .with_state(state)
}

fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    if cors.allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn index() -> &'static str {
    "voxrelay control plane"
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct TokenQuery {
    room: Option<String>,
    identity: Option<String>,
    ttl: Option<u64>,
}

#[derive(Serialize)]
struct TokenResponse {
    token: String,
    url: String,
    room: String,
    ttl_hours: u64,
}

async fn issue_token(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<TokenResponse>, ApiError> {
    let room = query.room.unwrap_or_else(|| DEFAULT_ROOM.to_string());
    let identity = query.identity.unwrap_or_else(|| DEFAULT_IDENTITY.to_string());
    let ttl_hours = query.ttl.unwrap_or(DEFAULT_TOKEN_TTL_HOURS);

    if ttl_hours == 0 || ttl_hours > MAX_TOKEN_TTL_HOURS {
        return Err(ApiError::BadRequest(format!(
            "ttl must be between 1 and {MAX_TOKEN_TTL_HOURS} hours, got {ttl_hours}"
        )));
    }

    let token = state
        .fabric
        .generate_join_token(&room, &identity, &identity, Duration::from_secs(ttl_hours * 3600))
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(TokenResponse {
        token,
        url: String::new(),
        room,
        ttl_hours,
    }))
}

#[derive(Deserialize)]
struct DispatchRequest {
    room: Option<String>,
}

#[derive(Serialize)]
struct DispatchResponse {
    success: bool,
    room: String,
    dispatch_id: String,
    room_existed: bool,
}

async fn dispatch_agent(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DispatchRequest>,
) -> Result<Json<DispatchResponse>, ApiError> {
    let room = body
        .room
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("room is required".to_string()))?;

    let room_existed = ensure_clean_room(&state, &room).await?;

    let dispatch_id = state
        .fabric
        .create_dispatch(&room, &state.worker_name)
        .await
        .map_err(|e| ApiError::FabricFailure(e.to_string()))?;

    Ok(Json(DispatchResponse {
        success: true,
        room,
        dispatch_id,
        room_existed,
    }))
}

/// Removes any stale agent-identity participants from `room`. If listing or
/// removal fails outright, the room is deleted instead so the dispatch that
/// follows starts from a known-clean state.
async fn ensure_clean_room(state: &AppState, room: &str) -> Result<bool, ApiError> {
    match state.fabric.list_participants(room).await {
        Ok(participants) => {
            let room_existed = true;
            for participant in participants {
                if voxrelay_fabric::room::looks_like_agent_identity(&participant.identity) {
                    if let Err(e) = state.fabric.remove_participant(room, &participant.identity).await {
                        tracing::warn!(room, identity = %participant.identity, error = %e, "failed to remove stale agent participant, deleting room instead");
                        state
                            .fabric
                            .delete_room(room)
                            .await
                            .map_err(|e| ApiError::FabricFailure(e.to_string()))?;
                        return Ok(room_existed);
                    }
                }
            }
            Ok(room_existed)
        }
        Err(_) => Ok(false),
    }
}

/// Transparent proxy to the stateful agent service's `/v1/...` surface.
/// Streams the upstream response body through unchanged.
async fn proxy_agent_service(State(state): State<Arc<AppState>>, req: Request) -> Result<Response, ApiError> {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let upstream_path = path_and_query
        .strip_prefix("/api/v1")
        .unwrap_or(path_and_query);
    let url = format!("{}/v1{}", state.agent_service_base_url.trim_end_matches('/'), upstream_path);

    let upstream = state
        .http_client
        .get(&url)
        .send()
        .await
        .map_err(|e| ApiError::UpstreamFailure(e.to_string()))?;

    let status = upstream.status();
    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .cloned();
    let body = upstream
        .bytes()
        .await
        .map_err(|e| ApiError::UpstreamFailure(e.to_string()))?;

    let mut response = Response::builder().status(status.as_u16());
    if let Some(content_type) = content_type {
        if let Ok(value) = HeaderValue::from_bytes(content_type.as_bytes()) {
            response = response.header(reqwest::header::CONTENT_TYPE.as_str(), value);
        }
    }
    response
        .body(axum::body::Body::from(body))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use std::sync::Mutex as StdMutex;
    use tower::ServiceExt;
    use voxrelay_fabric::{FabricError, ParticipantInfo, RoomInfo};

    struct FakeFabric {
        participants: StdMutex<Vec<ParticipantInfo>>,
        removed: StdMutex<Vec<String>>,
        deleted: StdMutex<Vec<String>>,
        dispatch_result: Result<String, String>,
    }

    impl FakeFabric {
        fn new(participants: Vec<ParticipantInfo>) -> Self {
            Self {
                participants: StdMutex::new(participants),
                removed: StdMutex::new(Vec::new()),
                deleted: StdMutex::new(Vec::new()),
                dispatch_result: Ok("dispatch-1".to_string()),
            }
        }
    }

    #[async_trait]
    impl Fabric for FakeFabric {
        async fn list_rooms(&self) -> Result<Vec<RoomInfo>, FabricError> {
            Ok(Vec::new())
        }
        async fn list_participants(&self, _room: &str) -> Result<Vec<ParticipantInfo>, FabricError> {
            Ok(self.participants.lock().unwrap().clone())
        }
        async fn remove_participant(&self, _room: &str, identity: &str) -> Result<(), FabricError> {
            self.removed.lock().unwrap().push(identity.to_string());
            Ok(())
        }
        async fn delete_room(&self, room: &str) -> Result<(), FabricError> {
            self.deleted.lock().unwrap().push(room.to_string());
            Ok(())
        }
        async fn create_dispatch(&self, _room: &str, _agent_name: &str) -> Result<String, FabricError> {
            self.dispatch_result.clone().map_err(FabricError::Dispatch)
        }
        fn generate_join_token(
            &self,
            room: &str,
            _identity: &str,
            _display_name: &str,
            _ttl: Duration,
        ) -> Result<String, FabricError> {
            Ok(format!("token-for-{room}"))
        }
    }

    fn state(fabric: FakeFabric) -> Arc<AppState> {
        Arc::new(AppState::new(
            Arc::new(fabric),
            "http://localhost:8283".to_string(),
            "voxrelay-worker".to_string(),
        ))
    }

    #[tokio::test]
    async fn token_endpoint_uses_defaults() {
        let app = app(state(FakeFabric::new(Vec::new())), &CorsConfig::default());
        let response = app
            .oneshot(HttpRequest::get("/api/token").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: TokenResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.room, DEFAULT_ROOM);
        assert_eq!(parsed.ttl_hours, DEFAULT_TOKEN_TTL_HOURS);
        assert_eq!(parsed.token, format!("token-for-{DEFAULT_ROOM}"));
    }

    #[tokio::test]
    async fn token_endpoint_rejects_ttl_over_max() {
        let app = app(state(FakeFabric::new(Vec::new())), &CorsConfig::default());
        let response = app
            .oneshot(
                HttpRequest::get(format!("/api/token?ttl={}", MAX_TOKEN_TTL_HOURS + 1))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn token_endpoint_rejects_zero_ttl() {
        let app = app(state(FakeFabric::new(Vec::new())), &CorsConfig::default());
        let response = app
            .oneshot(HttpRequest::get("/api/token?ttl=0").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dispatch_agent_requires_room() {
        let app = app(state(FakeFabric::new(Vec::new())), &CorsConfig::default());
        let response = app
            .oneshot(
                HttpRequest::post("/api/dispatch-agent")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dispatch_agent_removes_stale_agent_participant_then_dispatches() {
        let fabric = FakeFabric::new(vec![ParticipantInfo {
            identity: "agent-old".to_string(),
            joined_at: 0,
        }]);
        let app_state = state(fabric);
        let router = app(app_state.clone(), &CorsConfig::default());
        let response = router
            .oneshot(
                HttpRequest::post("/api/dispatch-agent")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"room":"room-1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: DispatchResponse = serde_json::from_slice(&body).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.dispatch_id, "dispatch-1");
        assert!(parsed.room_existed);
    }

    #[tokio::test]
    async fn health_endpoint_ok() {
        let app = app(state(FakeFabric::new(Vec::new())), &CorsConfig::default());
        let response = app
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
