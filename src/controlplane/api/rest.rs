//! REST API Handlers
//!
//! Thin CDMI front end over the orchestrator. Objects are addressed by path
//! (`GET|PUT|DELETE /<path>`, the root included) or by identifier
//! (`GET /cdmi_objectid/<id>`). Service endpoints live at `/health`,
//! `/ready` and `/metrics`, which shadows objects of the same name in the
//! root container.

use super::filter::filter_fields;
use super::metrics::ApiMetrics;
use crate::controlplane::{ObjectUpdate, Orchestrator};
use crate::domain::model::{normalize_path, CdmiObject, ObjectKind, DATA_OBJECT_TYPE};
use crate::error::{Error, ErrorKind};
use axum::{
    body::Bytes,
    extract::{Path, RawQuery, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Specification version advertised on every CDMI response
pub const CDMI_SPECIFICATION_VERSION: &str = "1.1.1";

const CDMI_VERSION_HEADER: &str = "X-CDMI-Specification-Version";

// =============================================================================
// Request/Response Types
// =============================================================================

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
}

/// Error returned from a handler
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::UnsupportedTransition => StatusCode::BAD_REQUEST,
            ErrorKind::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Malformed => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self.0.kind() {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::UnsupportedTransition => "unsupported_transition",
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::Malformed => "malformed",
            ErrorKind::Internal => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        } else {
            debug!(error = %self.0, "Request rejected");
        }

        let body = ApiErrorResponse {
            error: self.code().to_string(),
            message: self.0.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        with_version(&mut response);
        response
    }
}

type ApiResult = std::result::Result<Response, ApiError>;

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    orchestrator: Arc<Orchestrator>,
    metrics: Arc<ApiMetrics>,
}

impl RestRouter {
    /// Create a new REST router
    pub fn new(orchestrator: Arc<Orchestrator>, metrics: Arc<ApiMetrics>) -> Self {
        Self {
            orchestrator,
            metrics,
        }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            orchestrator: self.orchestrator,
            metrics: self.metrics,
        };

        Router::new()
            // Service endpoints
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics))
            // Identifier addressing
            .route("/cdmi_objectid/:id", get(get_by_id))
            // Everything else is a path into the tree
            .fallback(object_by_path)
            .layer(middleware::from_fn_with_state(state.clone(), track))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
    metrics: Arc<ApiMetrics>,
}

// =============================================================================
// Handlers
// =============================================================================

async fn track(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let response = next.run(request).await;
    state
        .metrics
        .record_request(&method, response.status().as_u16());
    response
}

/// Get an object by identifier. `Path` has already percent-decoded it.
async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> ApiResult {
    debug!(object_id = %id, "Get object by ID");
    match state.orchestrator.get_by_id(&id).await? {
        Some(object) => render(&object, query.as_deref(), StatusCode::OK),
        None => Err(Error::not_found(id).into()),
    }
}

/// Dispatch a path-addressed request by method
async fn object_by_path(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let path = decode_path(uri.path())?;

    match method {
        Method::GET => get_by_path(&state, &path, query.as_deref()).await,
        Method::PUT => put_by_path(&state, &path, &headers, &body).await,
        Method::DELETE => delete_by_path(&state, &path).await,
        other => {
            let mut response = (
                StatusCode::METHOD_NOT_ALLOWED,
                format!("{} is not supported", other),
            )
                .into_response();
            with_version(&mut response);
            Ok(response)
        }
    }
}

async fn get_by_path(state: &AppState, path: &str, query: Option<&str>) -> ApiResult {
    debug!(path = %path, "Get object by path");
    match state.orchestrator.get_by_path(path).await? {
        Some(object) => render(&object, query, StatusCode::OK),
        None => Err(Error::not_found(path).into()),
    }
}

/// Create (201) or update (204) the object at `path`
async fn put_by_path(state: &AppState, path: &str, headers: &HeaderMap, body: &[u8]) -> ApiResult {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let kind = request_kind(content_type)?;

    let body: Value = if body.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(body).map_err(Error::from)?
    };

    let existing = state.orchestrator.hierarchy().find_by_path(path).await?;
    match existing {
        Some(existing) if existing.kind() != kind => Err(Error::Conflict {
            key: format!("{} holds a {}", path, existing.kind()),
        }
        .into()),
        Some(_) => {
            debug!(path = %path, kind = %kind, "Update object");
            let update: ObjectUpdate = serde_json::from_value(body).map_err(Error::from)?;
            let transition = update.capabilities_uri.is_some();

            match state.orchestrator.update(path, update).await {
                Ok(_) => {
                    if transition {
                        state.metrics.record_transition("accepted");
                    }
                    let mut response = StatusCode::NO_CONTENT.into_response();
                    with_version(&mut response);
                    Ok(response)
                }
                Err(e) => {
                    if transition
                        && matches!(
                            e.kind(),
                            ErrorKind::UnsupportedTransition | ErrorKind::Conflict
                        )
                    {
                        state.metrics.record_transition("rejected");
                    }
                    Err(e.into())
                }
            }
        }
        None => {
            let created = state.orchestrator.create(path, kind, body).await?;
            info!(path = %path, kind = %kind, object_id = %created.object_id(), "Created via REST");
            state.metrics.record_created();
            render(&created, None, StatusCode::CREATED)
        }
    }
}

async fn delete_by_path(state: &AppState, path: &str) -> ApiResult {
    match state.orchestrator.delete(path).await? {
        Some(deleted) => {
            info!(path = %path, object_id = %deleted.object_id(), "Deleted via REST");
            state.metrics.record_deleted();
            let mut response = StatusCode::NO_CONTENT.into_response();
            with_version(&mut response);
            Ok(response)
        }
        None => Err(Error::not_found(path).into()),
    }
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness check
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.orchestrator.status().await;
    if status.healthy {
        (StatusCode::OK, Json(status)).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response()
    }
}

/// Prometheus exposition
async fn metrics(State(state): State<AppState>) -> ApiResult {
    let body = state.metrics.render()?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, state.metrics.content_type())],
        body,
    )
        .into_response())
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Percent-decode a request path segment by segment and normalise it
fn decode_path(raw: &str) -> std::result::Result<String, Error> {
    let mut segments = Vec::new();
    for segment in raw.split('/') {
        let decoded = urlencoding::decode(segment)
            .map_err(|e| Error::Malformed(format!("path {} does not decode to UTF-8: {}", raw, e)))?;
        if decoded.contains('/') {
            return Err(Error::invalid_path(raw, "encoded '/' inside a name"));
        }
        segments.push(decoded.into_owned());
    }
    normalize_path(&segments.join("/"))
}

/// Entity kind requested by a PUT content type
fn request_kind(content_type: &str) -> std::result::Result<ObjectKind, Error> {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();
    match ObjectKind::from_media_type(media_type) {
        Some(kind @ (ObjectKind::Container | ObjectKind::DataObject | ObjectKind::Domain)) => {
            Ok(kind)
        }
        _ => Err(Error::Malformed(format!(
            "unsupported content type '{}'",
            content_type
        ))),
    }
}

/// Serialize an entity, applying the projection query if any
fn render(object: &CdmiObject, query: Option<&str>, status: StatusCode) -> ApiResult {
    let json = object.to_json()?;
    let json = match query {
        Some(query) => filter_fields(&json, query)?,
        None => json,
    };

    let mut response = (status, Json(json)).into_response();
    let media_type = match object.kind() {
        ObjectKind::Generic => DATA_OBJECT_TYPE,
        kind => kind.media_type(),
    };
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(media_type));
    with_version(&mut response);
    Ok(response)
}

fn with_version(response: &mut Response) {
    response.headers_mut().insert(
        CDMI_VERSION_HEADER,
        HeaderValue::from_static(CDMI_SPECIFICATION_VERSION),
    );
}
