//! HTTP surface
//!
//! Thin axum layer over the resolution engine: one wildcard route for the
//! repository plus a health probe. Handlers authenticate the caller, hand
//! the request to the engine, and translate domain outcomes and errors into
//! status codes and headers; no repository logic lives here.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path as UrlPath, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::{Authenticator, Principal};
use crate::config::{Config, ConfigManager};
use crate::error::{DepotError, DepotResult};
use crate::repo::engine::{ArtifactView, ResolutionEngine, WriteOutcome};
use crate::repo::RemoteRepository;

/// Shared state for all request handlers
#[derive(Clone)]
pub struct AppState {
    engine: Arc<ResolutionEngine>,
    authenticator: Authenticator,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: ResolutionEngine, authenticator: Authenticator) -> Self {
        Self {
            engine: Arc::new(engine),
            authenticator,
            started_at: Utc::now(),
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/repository/{*path}",
            get(get_artifact)
                .head(head_artifact)
                .options(options_artifact)
                .put(put_artifact),
        )
        // uploads are whole jars; the default 2 MB request cap is far too small
        .layer(DefaultBodyLimit::disable())
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the server until ctrl-c
pub async fn serve(config: Config) -> DepotResult<()> {
    ConfigManager::ensure_storage_root(&config).await?;
    let remotes = RemoteRepository::from_config(&config.remotes)?;
    for remote in &remotes {
        info!("Mirror {} at {}", remote.name, remote.url);
    }

    let engine = ResolutionEngine::new(
        config.storage.root.clone(),
        remotes,
        config.storage.cache_capacity_mb * 1024 * 1024,
        std::time::Duration::from_secs(config.fetch.timeout_secs),
    );
    let state = AppState::new(engine, Authenticator::new(config.auth.clone()));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .map_err(|e| DepotError::io(format!("binding {}", config.server.bind), e))?;
    info!("Serving repository on {}", config.server.bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| DepotError::io("serving HTTP", e))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}

/// Domain error carried out of a handler, mapped to a status on the way out
struct HttpError(DepotError);

impl From<DepotError> for HttpError {
    fn from(err: DepotError) -> Self {
        Self(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let err = self.0;
        match &err {
            DepotError::AccessDenied { .. } => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"depot\"")],
                err.to_string(),
            )
                .into_response(),
            _ if err.is_client_error() => {
                (StatusCode::BAD_REQUEST, err.to_string()).into_response()
            }
            _ => {
                error!("Request failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
        }
    }
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal, HttpError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    Ok(state.authenticator.authenticate(authorization)?)
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}

fn artifact_response(view: &ArtifactView, include_body: bool) -> Response {
    // a plain header array overrides the Content-Type the body would
    // otherwise set, so exactly one value goes out on the wire
    let headers = [
        (header::CONTENT_TYPE, view.content_type.to_string()),
        (header::LAST_MODIFIED, view.file.http_last_modified()),
        (header::ETAG, view.file.etag()),
    ];
    if include_body {
        (StatusCode::OK, headers, view.file.content.clone()).into_response()
    } else {
        (StatusCode::OK, headers).into_response()
    }
}

async fn get_artifact(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let principal = authenticate(&state, &headers)?;
    match state.engine.read(&path, &principal).await? {
        Some(view) => Ok(artifact_response(&view, true)),
        None => Ok(not_found()),
    }
}

async fn head_artifact(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let principal = authenticate(&state, &headers)?;
    match state.engine.read(&path, &principal).await? {
        Some(view) => Ok(artifact_response(&view, false)),
        None => Ok(not_found()),
    }
}

async fn options_artifact(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let principal = authenticate(&state, &headers)?;
    match state.engine.allowed_methods(&path, &principal)? {
        Some(allowed) => Ok((
            StatusCode::NO_CONTENT,
            [(header::ALLOW, allowed.header_value())],
        )
            .into_response()),
        None => Ok(not_found()),
    }
}

async fn put_artifact(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    let principal = authenticate(&state, &headers)?;
    let outcome = state.engine.write(&path, &principal, body.to_vec()).await?;
    let location = [(
        header::CONTENT_LOCATION,
        format!("/repository/{}", path),
    )];
    Ok(match outcome {
        WriteOutcome::Created => (StatusCode::CREATED, location).into_response(),
        WriteOutcome::Replaced => (StatusCode::OK, location).into_response(),
        WriteOutcome::Discarded => StatusCode::OK.into_response(),
    })
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    Json(serde_json::json!({
        "status": "ok",
        "started_at": state.started_at.to_rfc3339(),
        "uptime_secs": uptime,
    }))
}
