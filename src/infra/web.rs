use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::domain::{
    model::{DeployRequest, RoutingRequest},
    webhook::PushNotification,
    ApplicationManager, Error, ErrorKind,
};

type Manager = State<Arc<ApplicationManager>>;

pub fn router(manager: Arc<ApplicationManager>) -> Router {
    Router::new()
        .route("/", get(version))
        .route("/manager/apps", get(list_applications))
        .route("/manager/app", post(deploy_application))
        .route(
            "/manager/app/:id",
            get(application_status).delete(delete_application),
        )
        .route("/manager/app/:id/events", get(application_events))
        .route("/manager/app/:id/stdout", get(application_stdout))
        .route("/manager/app/:id/stderr", get(application_stderr))
        .route("/manager/app/:id/config", get(application_manifest))
        .route(
            "/manager/app/:id/reload",
            get(reload_application).post(reload_application),
        )
        .route("/manager/app/:id/eventurl", post(register_event_url))
        .route("/manager/validate", post(validate_application))
        .route("/manager/webhook/gitlab", post(gitlab_webhook))
        .route("/api/launch/:id", post(launch_configuration))
        .route("/api/status/:id", get(routing_status))
        .with_state(manager)
}

struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::Validation | ErrorKind::SourceControl => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::ExternalProvider => StatusCode::BAD_GATEWAY,
            ErrorKind::Process | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {:?}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn version() -> String {
    format!("rokku-{}", env!("CARGO_PKG_VERSION"))
}

async fn list_applications(State(manager): Manager) -> impl IntoResponse {
    Json(manager.list().await)
}

async fn deploy_application(
    State(manager): Manager,
    Json(request): Json<DeployRequest>,
) -> ApiResult<String> {
    Ok(manager.deploy(request).await?)
}

async fn application_status(State(manager): Manager, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(manager.status(&id).await?))
}

async fn delete_application(State(manager): Manager, Path(id): Path<String>) -> ApiResult<&'static str> {
    manager.delete(&id).await?;
    Ok("Application deleted")
}

async fn application_events(State(manager): Manager, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(manager.events(&id).await?))
}

async fn application_stdout(State(manager): Manager, Path(id): Path<String>) -> ApiResult<String> {
    Ok(manager.stdout(&id).await?)
}

async fn application_stderr(State(manager): Manager, Path(id): Path<String>) -> ApiResult<String> {
    Ok(manager.stderr(&id).await?)
}

async fn application_manifest(State(manager): Manager, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(manager.manifest(&id).await?))
}

async fn reload_application(State(manager): Manager, Path(id): Path<String>) -> ApiResult<&'static str> {
    manager.reload(&id).await?;
    Ok("Application reloading")
}

#[derive(Debug, Deserialize)]
struct EventUrlRequest {
    event_url: String,
}

async fn register_event_url(
    State(manager): Manager,
    Path(id): Path<String>,
    Json(request): Json<EventUrlRequest>,
) -> ApiResult<&'static str> {
    let url = request.event_url.trim();
    if url.is_empty() {
        return Err(Error::Validation("event_url is empty".to_string()).into());
    }
    manager.add_event_url(&id, url.to_string()).await?;
    Ok("Event url registered")
}

async fn validate_application(
    State(manager): Manager,
    Json(request): Json<DeployRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(manager.validate(request).await?))
}

/// Always acknowledges; the forge has no use for our failures.
async fn gitlab_webhook(State(manager): Manager, body: Bytes) -> impl IntoResponse {
    match PushNotification::from_gitlab(&body) {
        Some(notification) => {
            info!(
                "Push on branch {} of {:?}",
                notification.branch, notification.repository_urls
            );
            tokio::spawn(async move {
                let reloaded = manager.handle_push(&notification).await;
                if !reloaded.is_empty() {
                    info!("Reloaded {:?} after push", reloaded);
                }
            });
        }
        None => info!("Ignoring webhook payload"),
    }
    Json(json!({ "ok": true }))
}

async fn launch_configuration(
    State(manager): Manager,
    Path(id): Path<String>,
    Json(request): Json<RoutingRequest>,
) -> ApiResult<impl IntoResponse> {
    let applied = manager.apply_routing(&id, request).await?;
    Ok(Json(json!({ "host": applied.host })))
}

async fn routing_status(State(manager): Manager, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(manager.health(&id).await?))
}
