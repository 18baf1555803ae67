//! Setup handshake routes.
//!
//! Starting setup records an intent and returns (or redirects to) the
//! provider install page carrying the intent's `state`. The provider then
//! sends the operator back to the callback with that `state` and the new
//! installation or project id.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bridge::{OrganizationId, PublishCredentials, SetupStarted, TenantProfile, Timestamp};
use serde::Deserialize;

use crate::auth::authorize_setup;
use crate::mappings::MappingView;
use crate::{ApiError, AppState};

/// JSON body for `POST /api/setup/start`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartSetupRequest {
    /// Dashboard organization the tenant belongs to, if known.
    pub organization_id: Option<i64>,
    /// Human-readable tenant name.
    pub organization_label: String,
    /// Dashboard base URL.
    pub ddash_endpoint: String,
    /// Bearer token for the dashboard.
    pub ddash_auth_token: String,
    /// HMAC key for signing published envelopes.
    pub ddash_webhook_secret: String,
    /// Environment for events whose payload names none.
    pub default_environment: String,
}

impl StartSetupRequest {
    fn into_profile(self) -> TenantProfile {
        TenantProfile {
            organization_id: self.organization_id.and_then(OrganizationId::new),
            organization_label: self.organization_label,
            credentials: PublishCredentials {
                endpoint: self.ddash_endpoint,
                auth_token: self.ddash_auth_token,
                webhook_secret: self.ddash_webhook_secret,
            },
            default_environment: self.default_environment,
        }
    }
}

/// `POST /api/setup/start`: returns `{state, redirect_url, expires_at}`.
pub async fn start_setup_json(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SetupStarted>, ApiError> {
    authorize_setup(state.settings(), &headers, &query)?;
    let request: StartSetupRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_request("invalid json payload"))?;

    let profile = request.into_profile();
    let started = state
        .blocking(move |state| state.resolver().start_setup(profile, Timestamp::now()))
        .await??;
    Ok(Json(started))
}

/// `GET /setup/start`: same as the JSON route, with blank fields filled from
/// the process defaults, answered with a 302 to the install page.
pub async fn start_setup_redirect(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let settings = state.settings();
    authorize_setup(settings, &headers, &query)?;

    let param = |key: &str| query.get(key).map(|v| v.trim()).unwrap_or_default();
    let or_default = |key: &str, fallback: &str| match param(key) {
        "" => fallback.trim().to_string(),
        value => value.to_string(),
    };
    let defaults = &settings.defaults;
    let profile = TenantProfile {
        organization_id: OrganizationId::parse(param("organization_id")),
        organization_label: param("organization").to_string(),
        credentials: PublishCredentials {
            endpoint: or_default("ddash_endpoint", &defaults.credentials.endpoint),
            auth_token: or_default("ddash_auth_token", &defaults.credentials.auth_token),
            webhook_secret: or_default("ddash_webhook_secret", &defaults.credentials.webhook_secret),
        },
        default_environment: or_default("default_environment", &defaults.default_environment),
    };

    let started = state
        .blocking(move |state| state.resolver().start_setup(profile, Timestamp::now()))
        .await??;
    Ok((StatusCode::FOUND, [(LOCATION, started.redirect_url)]).into_response())
}

/// `GET /setup/callback`: binds the intent to the returned installation.
///
/// GitHub sends `installation_id`; some flows send `installationId`; GitLab
/// setups send `project_id`.
pub async fn setup_callback(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<MappingView>, ApiError> {
    let installation_id = ["installation_id", "installationId", "project_id"]
        .iter()
        .filter_map(|key| query.get(*key))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(str::to_string);
    let setup_state = query.get("state").cloned();

    let mapping = state
        .blocking(move |state| {
            state.resolver().complete_setup(
                setup_state.as_deref(),
                installation_id.as_deref(),
                Timestamp::now(),
            )
        })
        .await??;
    Ok(Json(MappingView::from(&mapping)))
}
