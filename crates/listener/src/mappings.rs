//! Mapping management routes.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use bridge::{mask_secret, InstallationId, InstallationMapping, OrganizationId};
use serde::{Deserialize, Serialize};

use crate::auth::authorize_setup;
use crate::{ApiError, AppState};

/// A mapping as shown to operators: token and secret masked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingView {
    /// GitHub installation id or GitLab project id.
    pub installation_id: i64,
    /// Owning dashboard organization, if recorded.
    pub organization_id: Option<i64>,
    /// Human-readable tenant name.
    pub organization_label: String,
    /// Dashboard base URL, shown in full.
    pub ddash_endpoint: String,
    /// Masked bearer token.
    pub ddash_auth_token: String,
    /// Masked signing secret.
    pub ddash_webhook_secret: String,
    /// Environment for events whose payload names none.
    pub default_environment: String,
    /// Disabled mappings fall back to the process defaults.
    pub enabled: bool,
}

impl From<&InstallationMapping> for MappingView {
    fn from(mapping: &InstallationMapping) -> Self {
        let profile = &mapping.profile;
        Self {
            installation_id: mapping.installation_id.as_i64(),
            organization_id: profile.organization_id.map(OrganizationId::as_i64),
            organization_label: profile.organization_label.clone(),
            ddash_endpoint: profile.credentials.endpoint.clone(),
            ddash_auth_token: mask_secret(&profile.credentials.auth_token),
            ddash_webhook_secret: mask_secret(&profile.credentials.webhook_secret),
            default_environment: profile.default_environment.clone(),
            enabled: mapping.enabled,
        }
    }
}

/// Response body of `GET /api/mappings`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MappingList {
    /// Ordered by installation id.
    pub mappings: Vec<MappingView>,
}

/// `GET /api/mappings[?org_id=N]`. A missing or non-positive `org_id` lists
/// everything.
pub async fn list_mappings(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<MappingList>, ApiError> {
    authorize_setup(state.settings(), &headers, &query)?;
    let organization = query.get("org_id").and_then(|raw| OrganizationId::parse(raw));

    let mappings = state
        .blocking(move |state| state.resolver().list(organization))
        .await?
        .map_err(|err| ApiError::internal("failed to list mappings", &err))?;
    Ok(Json(MappingList {
        mappings: mappings.iter().map(MappingView::from).collect(),
    }))
}

/// JSON body of `POST /api/mappings/delete`.
#[derive(Debug, Deserialize)]
pub struct DeleteMappingRequest {
    /// Mapping to remove.
    pub installation_id: i64,
    /// When set, the mapping must belong to this organization.
    #[serde(default)]
    pub organization_id: Option<i64>,
}

/// `POST /api/mappings/delete` with `{installation_id, organization_id?}`.
pub async fn delete_mapping(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize_setup(state.settings(), &headers, &query)?;
    let request: DeleteMappingRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_request("invalid json payload"))?;
    let installation_id = InstallationId::new(request.installation_id)
        .ok_or_else(|| ApiError::bad_request("invalid installation_id"))?;
    let organization = request.organization_id.and_then(OrganizationId::new);

    state
        .blocking(move |state| state.resolver().revoke(installation_id, organization))
        .await??;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
