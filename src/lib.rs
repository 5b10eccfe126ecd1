//! Hearth is a multi-user profile service.

#![forbid(unsafe_code)]
pub mod avatar;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod flash;
pub mod mail;
pub mod middleware;
pub mod profile;
pub mod repository;
pub mod router;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod token;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::http::{StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::repository::Repository;
use crate::storage::AvatarStorage;

/// Multipart overhead on top of the largest accepted avatar.
const UPLOAD_LIMIT: usize = avatar::MAX_SIZE + 64 * 1024;

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: axum::http::Method,
    path: &str,
    cookie: Option<&str>,
    body: &str,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }

    app.oneshot(request.body(axum::body::Body::from(body.to_owned())).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub repo: Arc<dyn Repository>,
    pub crypto: Arc<crypto::Crypto>,
    pub session: Arc<session::SessionManager>,
    pub tokens: Arc<token::ConfirmationTokens>,
    pub mail: mail::MailDispatcher,
    pub storage: Arc<dyn AvatarStorage>,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(
                    |chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                        tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                    },
                )
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(true)
                        .level(tracing::Level::INFO),
                )
                .on_request(DefaultOnRequest::new())
                .on_response(
                    DefaultOnResponse::new()
                        .include_headers(true)
                        .latency_unit(LatencyUnit::Micros),
                ),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(10),
        ))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
            header::SET_COOKIE,
        ]));

    let members = Router::new()
        .route("/works/", get(router::pages::works))
        .route("/equations/", get(router::pages::equations))
        .route("/works/show/", get(router::pages::show))
        .route("/profile/logout/", post(router::login::logout))
        .merge(router::profile::router())
        .route_layer(AxumMiddleware::from_fn(middleware::require_login));

    Router::new()
        .route("/", get(router::pages::index))
        // `GET /api/` goes to `status`.
        .route("/api/", get(router::status::status))
        .route("/metrics", get(telemetry::render))
        .route(
            "/profile/reg/",
            get(router::register::page).post(router::register::handler),
        )
        .route(
            "/profile/activate/{uidb64}/{token}/",
            get(router::register::activate),
        )
        .route(
            "/profile/edit/confirm/{uidb64}/{token}/",
            get(router::profile::edit::confirm),
        )
        .route("/profile/login/", post(router::login::handler))
        .merge(router::reset::router())
        .merge(members)
        .merge(router::admin::router())
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
        .layer(AxumMiddleware::from_fn_with_state(
            state.clone(),
            middleware::session,
        ))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state(
    secret: &str,
    metrics: Option<PrometheusHandle>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    if secret.is_empty() {
        return Err(crypto::CryptoError::EmptyKey.into());
    }

    // read configuration file. let it in memory.
    let path = std::env::var("CONFIG_PATH").unwrap_or_default();
    let config = config::Configuration::default()
        .path(path.into())
        .read()?;

    let repo: Arc<dyn Repository> = match config.postgres {
        Some(ref config) => {
            let db = database::Database::new(
                &config.address,
                config
                    .username
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                config
                    .password
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                config
                    .database
                    .as_deref()
                    .unwrap_or(database::DEFAULT_DATABASE_NAME),
                config.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
            )
            .await?;

            // execute migrations scripts on start.
            db.migrate().await?;

            Arc::new(repository::PgRepository::new(db))
        },
        None => {
            tracing::warn!(
                "missing `postgres` entry on `config.yaml` file, data is kept in memory"
            );
            Arc::new(repository::MemoryRepository::new())
        },
    };

    let crypto = Arc::new(crypto::Crypto::new(config.argon2.clone())?);
    let session = Arc::new(session::SessionManager::new(
        &config.name,
        &config.session,
        secret,
    ));
    let tokens =
        Arc::new(token::ConfirmationTokens::new(secret, config.token.window));
    let mail = mail::MailDispatcher::from_config(config.mail.as_ref())?;
    let storage = Arc::new(storage::LocalStorage::new(&config.storage));

    Ok(AppState {
        config,
        repo,
        crypto,
        session,
        tokens,
        mail,
        storage,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_secret() {
        let err = initialize_state("", None).await.err().unwrap();

        assert_eq!(err.to_string(), "secret key must not be empty");
    }
}
