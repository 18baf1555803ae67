//! HTTP surface for hookbridge.
//!
//! One process serves one provider. The router accepts that provider's
//! webhooks, authenticates them, and hands them to the [`bridge`] relay. It
//! also exposes the setup handshake and mapping management routes used by
//! operators.
//!
//! # Endpoints
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | POST | `/webhooks/<provider>` (configurable) | Webhook delivery, 202 on accept |
//! | POST | `/api/setup/start` | Start setup from a JSON body |
//! | GET | `/setup/start` | Start setup from query parameters, 302 to the install page |
//! | GET | `/setup/callback` | Complete setup after the provider install flow |
//! | GET | `/api/mappings` | List mappings with secrets masked |
//! | POST | `/api/mappings/delete` | Revoke a mapping |
//! | GET | `/healthz` | Liveness |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Handlers translate HTTP into calls on
//! [`bridge::InstallationResolver`] and [`bridge::relay_events`]; they hold no
//! domain rules of their own.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use bridge::{mask_secret, EventSink, InstallationResolver, Provider, PublishDefaults};

pub mod auth;
pub mod error;
pub mod health;
pub mod mappings;
pub mod setup;
pub mod signature;
pub mod webhook;

pub use error::ApiError;
pub use health::health_handler;
pub use webhook::webhook_handler;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// JSON setup start.
pub const SETUP_START_API_PATH: &str = "/api/setup/start";
/// Browser setup start (302).
pub const SETUP_START_PATH: &str = "/setup/start";
pub const MAPPINGS_PATH: &str = "/api/mappings";
pub const MAPPINGS_DELETE_PATH: &str = "/api/mappings/delete";
pub const HEALTH_PATH: &str = "/healthz";

/// Per-process listener configuration.
#[derive(Clone)]
pub struct ListenerSettings {
    /// The only provider whose deliveries this process accepts.
    pub provider: Provider,
    /// Route for webhook deliveries.
    pub webhook_path: String,
    /// GitHub webhook secret or GitLab webhook token.
    pub webhook_secret: String,
    /// When set, setup and mapping routes require it.
    pub setup_token: Option<String>,
    /// Converter `source`; blank uses the provider default.
    pub source: String,
    /// Credentials used when no enabled mapping applies.
    pub defaults: PublishDefaults,
}

impl ListenerSettings {
    /// Settings with the provider's default webhook path and no setup token.
    pub fn new(provider: Provider, webhook_secret: impl Into<String>) -> Self {
        Self {
            provider,
            webhook_path: default_webhook_path(provider),
            webhook_secret: webhook_secret.into(),
            setup_token: None,
            source: String::new(),
            defaults: PublishDefaults::default(),
        }
    }
}

impl std::fmt::Debug for ListenerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSettings")
            .field("provider", &self.provider)
            .field("webhook_path", &self.webhook_path)
            .field("webhook_secret", &mask_secret(&self.webhook_secret))
            .field("setup_token", &self.setup_token.as_deref().map(mask_secret))
            .field("source", &self.source)
            .field("defaults", &self.defaults)
            .finish()
    }
}

/// `/webhooks/github` or `/webhooks/gitlab`.
pub fn default_webhook_path(provider: Provider) -> String {
    format!("/webhooks/{}", provider.as_str())
}

/// Shared handler state, passed via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    settings: ListenerSettings,
    resolver: InstallationResolver,
    sink: Arc<dyn EventSink>,
}

impl AppState {
    pub fn new(
        settings: ListenerSettings,
        resolver: InstallationResolver,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                settings,
                resolver,
                sink,
            }),
        }
    }

    pub fn settings(&self) -> &ListenerSettings {
        &self.inner.settings
    }

    pub fn resolver(&self) -> &InstallationResolver {
        &self.inner.resolver
    }

    pub fn sink(&self) -> &dyn EventSink {
        self.inner.sink.as_ref()
    }

    /// Runs a store-backed call on tokio's blocking pool.
    ///
    /// Installation stores are synchronous and may wait on disk or on
    /// SQLite's busy timeout, so handlers never call them on a runtime worker.
    pub async fn blocking<T, F>(&self, call: F) -> Result<T, ApiError>
    where
        F: FnOnce(&AppState) -> T + Send + 'static,
        T: Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || call(&state))
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "store task did not complete");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "installation store failure",
                )
            })
    }
}

/// Builds the router with every endpoint.
///
/// # Panics
///
/// If the configured webhook or callback path collides with another route.
pub fn build_router(state: AppState) -> Router {
    let webhook_path = state.settings().webhook_path.clone();
    let callback_path = state.resolver().settings().callback_path.clone();

    Router::new()
        .route(&webhook_path, post(webhook_handler))
        .route(SETUP_START_API_PATH, post(setup::start_setup_json))
        .route(SETUP_START_PATH, get(setup::start_setup_redirect))
        .route(&callback_path, get(setup::setup_callback))
        .route(MAPPINGS_PATH, get(mappings::list_mappings))
        .route(MAPPINGS_DELETE_PATH, post(mappings::delete_mapping))
        .route(HEALTH_PATH, get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_follow_provider() {
        assert_eq!(default_webhook_path(Provider::GitHub), "/webhooks/github");
        let settings = ListenerSettings::new(Provider::GitLab, "tok");
        assert_eq!(settings.webhook_path, "/webhooks/gitlab");
        assert!(settings.setup_token.is_none());
    }
}
