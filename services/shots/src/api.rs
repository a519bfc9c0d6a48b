use crate::config::ApiConfig;
use crate::handler::{CreateShotError, ShotService};
use crate::model::{ShotSubmission, Side, StoredShot};
use crate::shot_path;
use crate::shot_store::StoreError;
use crate::validator::FieldError;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::future::Future;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Path segment selecting the shots whose file name has no index
pub const UNINDEXED: &str = "none";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: ShotService,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl ErrorResponse {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errors: Vec::new(),
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Successful creation
#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub message: &'static str,
    pub data: ShotSubmission,
}

#[derive(Debug, Serialize)]
pub struct ShotListResponse {
    pub shots: Vec<StoredShot>,
    pub count: usize,
}

impl From<Vec<StoredShot>> for ShotListResponse {
    fn from(shots: Vec<StoredShot>) -> Self {
        Self {
            count: shots.len(),
            shots,
        }
    }
}

impl From<CreateShotError> for ApiErrorResponse {
    fn from(err: CreateShotError) -> Self {
        let response = match err {
            CreateShotError::MalformedInput(reason) => {
                bad_request(format!("Invalid JSON: {reason}"))
            }
            CreateShotError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    message: "Validation failed".to_string(),
                    errors: errors.errors,
                }),
            ),
            CreateShotError::ResolutionMismatch(mismatch) => bad_request(mismatch.to_string()),
            // Already logged by the service
            CreateShotError::Store(_) => internal_error(),
        };
        ApiErrorResponse(response)
    }
}

/// Response of a failed creation
pub struct ApiErrorResponse(ApiError);

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> axum::response::Response {
        self.0.into_response()
    }
}

fn internal_error() -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::message("Internal server error")),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::message(message)))
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let routes = Router::new()
        .route("/health", get(health_check))
        .route("/shots", post(create_shot))
        .route("/cameras/:camera_id/shots", get(list_camera_shots))
        .route(
            "/cameras/:camera_id/sequences/:sequence/shots",
            get(list_sequence_shots),
        )
        .route(
            "/cameras/:camera_id/sequences/:sequence/photos/:photo_index/shots",
            get(list_photo_shots),
        )
        .route(
            "/cameras/:camera_id/sequences/:sequence/photos/:photo_index/:side",
            get(get_shot),
        );

    let routes = match config.mount_path() {
        Some(prefix) => Router::new().nest(&prefix, routes),
        None => routes,
    };

    routes
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "shot-service"
    }))
}

/// Validate, store and pair one shot
#[instrument(skip(state, body))]
async fn create_shot(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiErrorResponse> {
    let data = state.service.create_shot(&body).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            message: "Insertion successful",
            data,
        }),
    ))
}

fn parse_camera(camera_id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(camera_id).map_err(|_| bad_request(format!("Invalid camera id '{camera_id}'")))
}

fn parse_sequence(sequence: &str) -> Result<(), ApiError> {
    if shot_path::is_sequence(sequence) {
        Ok(())
    } else {
        Err(bad_request(format!("Invalid sequence '{sequence}'")))
    }
}

fn parse_photo_index(photo_index: &str) -> Result<Option<u64>, ApiError> {
    if photo_index == UNINDEXED {
        return Ok(None);
    }
    // u64::from_str alone would accept a leading '+'
    photo_index
        .bytes()
        .all(|b| b.is_ascii_digit())
        .then(|| photo_index.parse::<u64>().ok())
        .flatten()
        .map(Some)
        .ok_or_else(|| bad_request(format!("Invalid photo index '{photo_index}'")))
}

fn parse_side(side: &str) -> Result<Side, ApiError> {
    side.parse().map_err(|_| {
        bad_request(format!("Side must be one of: {}", Side::valid_values()))
    })
}

async fn lookup<T, F>(query: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    query.await.map_err(|e| {
        error!(error = %e, "Failed to read shots");
        internal_error()
    })
}

#[instrument(skip(state))]
async fn list_camera_shots(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> Result<Json<ShotListResponse>, ApiError> {
    let camera_id = parse_camera(&camera_id)?;
    let shots = lookup(state.service.shots_of_camera(camera_id)).await?;
    Ok(Json(shots.into()))
}

#[instrument(skip(state))]
async fn list_sequence_shots(
    State(state): State<AppState>,
    Path((camera_id, sequence)): Path<(String, String)>,
) -> Result<Json<ShotListResponse>, ApiError> {
    let camera_id = parse_camera(&camera_id)?;
    parse_sequence(&sequence)?;
    let shots = lookup(state.service.shots_of_sequence(camera_id, &sequence)).await?;
    Ok(Json(shots.into()))
}

#[instrument(skip(state))]
async fn list_photo_shots(
    State(state): State<AppState>,
    Path((camera_id, sequence, photo_index)): Path<(String, String, String)>,
) -> Result<Json<ShotListResponse>, ApiError> {
    let camera_id = parse_camera(&camera_id)?;
    parse_sequence(&sequence)?;
    let photo_index = parse_photo_index(&photo_index)?;
    let shots = lookup(
        state
            .service
            .shots_of_photo_index(camera_id, &sequence, photo_index),
    )
    .await?;
    Ok(Json(shots.into()))
}

#[instrument(skip(state))]
async fn get_shot(
    State(state): State<AppState>,
    Path((camera_id, sequence, photo_index, side)): Path<(String, String, String, String)>,
) -> Result<Json<StoredShot>, ApiError> {
    let camera_id = parse_camera(&camera_id)?;
    parse_sequence(&sequence)?;
    let photo_index = parse_photo_index(&photo_index)?;
    let side = parse_side(&side)?;

    let shot = lookup(
        state
            .service
            .get_shot(camera_id, &sequence, photo_index, side),
    )
    .await?;

    shot.map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, Json(ErrorResponse::message("Shot not found"))))
}

/// Serve the router on the configured address until shutdown
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_router(state, config);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(addr = %addr, "Starting API server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shot_store::{MemoryShotStore, MockShotRepository};
    use crate::stitcher::{DisabledStitchNotifier, MockStitchNotifier};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const CAMERA: &str = "123e4567-e89b-12d3-a456-426614174000";

    fn router() -> Router {
        let service = ShotService::new(
            Arc::new(MemoryShotStore::new()),
            Arc::new(DisabledStitchNotifier),
        );
        create_router(AppState { service }, &ApiConfig::default())
    }

    fn shot_body(side: &str, file: &str, resolution: &str) -> Value {
        json!({
            "s3_key": format!("{CAMERA}/123456/{side}/{file}"),
            "resolution": resolution,
            "file_size": 1024,
            "shooting_date": "2024-01-01T12:00:00"
        })
    }

    async fn post(app: &Router, body: impl Into<Body>) -> (StatusCode, Value) {
        let request = Request::post("/shots")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap();
        send(app, request).await
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
        send(app, Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_health_check() {
        let (status, body) = get(&router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_create_shot_returns_derived_fields() {
        let app = router();
        let (status, body) = post(&app, shot_body("left", "my_photo1.jpg", "1920x1080").to_string()).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Insertion successful");
        assert_eq!(body["data"]["camera_id"], CAMERA);
        assert_eq!(body["data"]["sequence"], "123456");
        assert_eq!(body["data"]["side"], "left");
        assert_eq!(body["data"]["photo_name"], "my_photo1.jpg");
        assert_eq!(body["data"]["photo_index"], 1);
        assert_eq!(body["data"]["shooting_date"], "2024-01-01T12:00:00");
    }

    #[tokio::test]
    async fn test_validation_errors_are_listed() {
        let app = router();
        let (status, body) = post(
            &app,
            json!({
                "s3_key": "invalid-uuid/123456/left/my_photo.jpg",
                "resolution": "1920x1080x720",
                "file_size": -1,
                "shooting_date": "2024-01-01T12:00:00"
            })
            .to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Validation failed");
        let errors = body["errors"].as_array().unwrap();
        let fields: Vec<_> = errors.iter().map(|e| e["field"].as_str().unwrap()).collect();
        assert_eq!(fields, ["s3_key", "resolution", "file_size"]);
        assert_eq!(errors[0]["kind"], "identity");
        assert!(errors[0]["message"].as_str().unwrap().contains("invalid-uuid"));
        assert!(errors[1]["message"]
            .as_str()
            .unwrap()
            .contains("resolution must be in the format"));
    }

    #[tokio::test]
    async fn test_resolution_mismatch_is_bad_request() {
        let app = router();
        let (status, _) = post(&app, shot_body("right", "my_photo1.jpg", "3840x2160").to_string()).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = post(&app, shot_body("left", "my_photo1.jpg", "1920x1080").to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let message = body["message"].as_str().unwrap();
        assert!(message.starts_with("Resolution mismatch"));
        assert!(message.contains(CAMERA));
        assert!(body.get("errors").is_none());
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let (status, body) = post(&router(), "{\"s3_key\": ").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().starts_with("Invalid JSON"));
    }

    #[tokio::test]
    async fn test_store_failure_is_opaque() {
        let mut repository = MockShotRepository::new();
        repository.expect_query().returning(|_, _| {
            Err(StoreError::Backend {
                operation: "query",
                message: "secret table details".to_string(),
            })
        });
        let mut notifier = MockStitchNotifier::new();
        notifier.expect_notify().times(0);
        let service = ShotService::new(Arc::new(repository), Arc::new(notifier));
        let app = create_router(AppState { service }, &ApiConfig::default());

        let (status, body) = post(&app, shot_body("left", "my_photo1.jpg", "1920x1080").to_string()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "message": "Internal server error" }));

        let (status, body) = get(&app, &format!("/cameras/{CAMERA}/sequences/1/shots")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_read_endpoints() {
        let app = router();
        for (side, file) in [
            ("left", "my_photo1.jpg"),
            ("right", "my_photo1.jpg"),
            ("left", "my_photo.jpg"),
        ] {
            let (status, _) = post(&app, shot_body(side, file, "1920x1080").to_string()).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = get(&app, &format!("/cameras/{CAMERA}/shots")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 3);

        let (_, body) = get(&app, &format!("/cameras/{CAMERA}/sequences/123456/shots")).await;
        assert_eq!(body["count"], 3);

        let (_, body) = get(&app, &format!("/cameras/{CAMERA}/sequences/123456/photos/1/shots")).await;
        assert_eq!(body["count"], 2);

        let (_, body) = get(&app, &format!("/cameras/{CAMERA}/sequences/123456/photos/none/shots")).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["shots"][0]["SK"], "#left");

        let (status, body) = get(&app, &format!("/cameras/{CAMERA}/sequences/123456/photos/1/right")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["PK"], format!("{CAMERA}#123456"));
        assert_eq!(body["SK"], "1#right");

        let (status, _) = get(&app, &format!("/cameras/{CAMERA}/sequences/123456/photos/1/stitched")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_path_parameters() {
        let app = router();
        for uri in [
            "/cameras/not-a-uuid/shots".to_string(),
            format!("/cameras/{CAMERA}/sequences/12a/shots"),
            format!("/cameras/{CAMERA}/sequences/1/photos/+1/shots"),
            format!("/cameras/{CAMERA}/sequences/1/photos/1/LEFT"),
        ] {
            let (status, body) = get(&app, &uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body["message"].is_string(), "{uri}");
        }
    }

    #[tokio::test]
    async fn test_routes_mounted_under_stage_prefix() {
        let service = ShotService::new(
            Arc::new(MemoryShotStore::new()),
            Arc::new(DisabledStitchNotifier),
        );
        let config = ApiConfig {
            base_path: Some("/prod".to_string()),
            ..ApiConfig::default()
        };
        let app = create_router(AppState { service }, &config);

        let (status, _) = get(&app, "/prod/health").await;
        assert_eq!(status, StatusCode::OK);

        let request = Request::post("/prod/shots")
            .header("content-type", "application/json")
            .body(Body::from(shot_body("left", "my_photo1.jpg", "1920x1080").to_string()))
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = get(&app, "/health").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_parse_photo_index() {
        assert_eq!(parse_photo_index("none").unwrap(), None);
        assert_eq!(parse_photo_index("007").unwrap(), Some(7));
        assert!(parse_photo_index("").is_err());
        assert!(parse_photo_index("-1").is_err());
        assert!(parse_photo_index("99999999999999999999999").is_err());
    }
}
