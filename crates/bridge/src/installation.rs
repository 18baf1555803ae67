//! Installation mapping: which tenant credentials apply to which provider
//! installation, and the setup handshake that creates those mappings.
//!
//! ## Lifecycle
//!
//! ```text
//! start_setup ──► SetupIntent (pending, 15 min) ──callback──► InstallationMapping (enabled)
//!                        │
//!                        └── expired on read or on store open ──► discarded
//! ```
//!
//! The store is the only shared mutable state. The resolver owns the rules
//! (validation, expiry, fallback to process defaults); the store owns
//! atomicity of the intent→mapping promotion.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    InstallationId, OrganizationId, PublishCredentials, SetupError, SetupState, StoreError,
    TenantProfile, Timestamp,
};

/// How long a setup intent stays redeemable.
pub const SETUP_INTENT_TTL: Duration = Duration::from_secs(15 * 60);

/// Callback path used in redirect URLs when no install URL is configured.
pub const DEFAULT_CALLBACK_PATH: &str = "/setup/callback";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A pending setup handshake, keyed by its random state token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupIntent {
    /// Random token echoed back by the callback.
    pub state: SetupState,
    /// Tenant fields copied into the mapping on promotion.
    pub profile: TenantProfile,
    /// Absolute deadline for the callback.
    pub expires_at: Timestamp,
}

impl SetupIntent {
    /// An intent is redeemable up to and including its expiry instant.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }
}

/// Tenant credentials bound to one provider installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationMapping {
    /// GitHub installation id or GitLab project id.
    pub installation_id: InstallationId,
    /// Credentials and defaults published with.
    pub profile: TenantProfile,
    /// Disabled mappings are kept but ignored during resolution.
    pub enabled: bool,
}

impl InstallationMapping {
    /// The enabled mapping a completed handshake produces.
    pub fn from_intent(intent: SetupIntent, installation_id: InstallationId) -> Self {
        Self {
            installation_id,
            profile: intent.profile,
            enabled: true,
        }
    }
}

/// Outcome of [`InstallationStore::promote_intent`] when the intent existed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Promotion {
    /// The intent was consumed and this mapping was upserted.
    Completed(InstallationMapping),
    /// The intent had expired. It was deleted and no mapping was written.
    Expired,
}

// ---------------------------------------------------------------------------
// Store port
// ---------------------------------------------------------------------------

/// Persistence for setup intents and installation mappings.
///
/// Implementations must be safe to share across request handlers. Every
/// method is a short, self-contained unit of work; none holds state between
/// calls.
pub trait InstallationStore: Send + Sync {
    /// Inserts a new intent. States are random, so a collision is a backend
    /// error.
    fn create_intent(&self, intent: &SetupIntent) -> Result<(), StoreError>;

    /// Returns [`StoreError::NotFound`] when no intent has this state.
    fn get_intent(&self, state: &SetupState) -> Result<SetupIntent, StoreError>;

    /// Removes the intent if present. Absent is not an error.
    fn delete_intent(&self, state: &SetupState) -> Result<(), StoreError>;

    /// Inserts or replaces the mapping for its installation id.
    fn upsert_mapping(&self, mapping: &InstallationMapping) -> Result<(), StoreError>;

    /// Returns [`StoreError::NotFound`] when no mapping exists.
    fn get_mapping(&self, id: InstallationId) -> Result<InstallationMapping, StoreError>;

    /// Every mapping, or only those owned by `organization`, ordered by
    /// installation id ascending.
    fn list_mappings(
        &self,
        organization: Option<OrganizationId>,
    ) -> Result<Vec<InstallationMapping>, StoreError>;

    /// Deletes a mapping.
    ///
    /// With `organization` set, the delete only matches a mapping owned by
    /// that organization and returns [`StoreError::NotFound`] when nothing
    /// matched. Without it, deleting an absent mapping succeeds.
    fn delete_mapping(
        &self,
        id: InstallationId,
        organization: Option<OrganizationId>,
    ) -> Result<(), StoreError>;

    /// Consumes the intent for `state` in one atomic step.
    ///
    /// Exactly one concurrent caller can observe [`Promotion::Completed`] for
    /// a given state; the rest get [`StoreError::NotFound`].
    fn promote_intent(
        &self,
        state: &SetupState,
        installation_id: InstallationId,
        now: Timestamp,
    ) -> Result<Promotion, StoreError>;

    /// Deletes every intent expired as of `now`, returning how many went.
    fn sweep_expired_intents(&self, now: Timestamp) -> Result<usize, StoreError>;
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Process-wide fallbacks used when no enabled mapping applies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishDefaults {
    /// Dashboard credentials; may be incomplete, in which case unmapped
    /// deliveries are ignored.
    pub credentials: PublishCredentials,
    /// Environment for events whose payload names none.
    pub default_environment: String,
}

/// Credentials and environment to use for one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    /// Where and how to publish.
    pub credentials: PublishCredentials,
    /// Converter fallback environment for this delivery.
    pub default_environment: String,
    /// `true` when an enabled mapping supplied the credentials.
    pub mapped: bool,
}

/// Settings for the setup handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupSettings {
    /// Provider install page. The state token is appended as a `state`
    /// query parameter. `None` redirects straight to [`Self::callback_path`].
    pub install_url: Option<String>,
    /// Local route that completes the handshake.
    pub callback_path: String,
    /// Applied to intents that name no default environment.
    pub default_environment: String,
    /// How long an intent stays redeemable.
    pub intent_ttl: Duration,
}

impl Default for SetupSettings {
    fn default() -> Self {
        Self {
            install_url: None,
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            default_environment: String::new(),
            intent_ttl: SETUP_INTENT_TTL,
        }
    }
}

/// Result of [`InstallationResolver::start_setup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupStarted {
    /// Token the callback must present.
    pub state: SetupState,
    /// Install page (or local callback) carrying `state`.
    pub redirect_url: String,
    /// Deadline for the callback.
    pub expires_at: Timestamp,
}

/// Runs the setup handshake and resolves per-delivery publish targets.
#[derive(Clone)]
pub struct InstallationResolver {
    store: Arc<dyn InstallationStore>,
    settings: SetupSettings,
}

impl InstallationResolver {
    pub fn new(store: Arc<dyn InstallationStore>, settings: SetupSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &SetupSettings {
        &self.settings
    }

    /// Creates a setup intent for `request` and returns where to send the
    /// operator next.
    ///
    /// # Errors
    ///
    /// [`SetupError::MissingCredentials`] unless endpoint, token, and secret
    /// are all non-blank. Store failures pass through.
    pub fn start_setup(
        &self,
        request: TenantProfile,
        now: Timestamp,
    ) -> Result<SetupStarted, SetupError> {
        let profile = self.normalize_profile(request);
        if !profile.credentials.is_complete() {
            return Err(SetupError::MissingCredentials);
        }

        let state = SetupState::generate();
        let intent = SetupIntent {
            state: state.clone(),
            profile,
            expires_at: now.plus(self.settings.intent_ttl),
        };
        self.store.create_intent(&intent)?;
        tracing::info!(
            organization_id = ?intent.profile.organization_id,
            expires_at = %intent.expires_at,
            "setup intent created"
        );

        Ok(SetupStarted {
            redirect_url: self.redirect_url(&state),
            state,
            expires_at: intent.expires_at,
        })
    }

    /// Redeems the intent for `state` and binds it to `installation_id`.
    ///
    /// Raw inputs are taken as received from the callback query so the
    /// resolver owns their validation.
    pub fn complete_setup(
        &self,
        state: Option<&str>,
        installation_id: Option<&str>,
        now: Timestamp,
    ) -> Result<InstallationMapping, SetupError> {
        let state = state
            .and_then(SetupState::new)
            .ok_or(SetupError::MissingState)?;
        let installation_id = installation_id
            .and_then(InstallationId::parse)
            .ok_or(SetupError::InvalidInstallationId)?;

        match self.store.promote_intent(&state, installation_id, now) {
            Ok(Promotion::Completed(mapping)) => {
                tracing::info!(
                    installation_id = %mapping.installation_id,
                    organization_id = ?mapping.profile.organization_id,
                    "installation mapped"
                );
                Ok(mapping)
            }
            Ok(Promotion::Expired) => {
                tracing::debug!(%installation_id, "setup intent expired");
                Err(SetupError::ExpiredState)
            }
            Err(StoreError::NotFound) => {
                tracing::debug!(%installation_id, "unknown setup state");
                Err(SetupError::UnknownState)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Picks the credentials for one delivery.
    ///
    /// An enabled mapping for `installation_id` wins. A missing or disabled
    /// mapping, or no id at all, falls back to `defaults`. Store faults are
    /// returned, never masked as a fallback.
    pub fn resolve(
        &self,
        installation_id: Option<InstallationId>,
        defaults: &PublishDefaults,
    ) -> Result<PublishTarget, StoreError> {
        let fallback = || PublishTarget {
            credentials: defaults.credentials.clone(),
            default_environment: defaults.default_environment.clone(),
            mapped: false,
        };
        let Some(id) = installation_id else {
            return Ok(fallback());
        };

        match self.store.get_mapping(id) {
            Ok(mapping) if mapping.enabled => {
                let environment = mapping.profile.default_environment.trim();
                Ok(PublishTarget {
                    credentials: mapping.profile.credentials.clone(),
                    default_environment: if environment.is_empty() {
                        defaults.default_environment.clone()
                    } else {
                        environment.to_string()
                    },
                    mapped: true,
                })
            }
            Ok(_) => {
                tracing::debug!(installation_id = %id, "mapping disabled; using defaults");
                Ok(fallback())
            }
            Err(StoreError::NotFound) => Ok(fallback()),
            Err(err) => {
                tracing::error!(installation_id = %id, error = %err, "mapping lookup failed");
                Err(err)
            }
        }
    }

    /// Deletes the mapping for `installation_id`, optionally only when owned
    /// by `organization`.
    pub fn revoke(
        &self,
        installation_id: InstallationId,
        organization: Option<OrganizationId>,
    ) -> Result<(), SetupError> {
        match self.store.delete_mapping(installation_id, organization) {
            Ok(()) => {
                tracing::info!(%installation_id, organization_id = ?organization, "mapping revoked");
                Ok(())
            }
            Err(StoreError::NotFound) => Err(SetupError::MappingNotFound(installation_id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Mappings ordered by installation id, optionally for one organization.
    pub fn list(
        &self,
        organization: Option<OrganizationId>,
    ) -> Result<Vec<InstallationMapping>, StoreError> {
        self.store.list_mappings(organization)
    }

    fn normalize_profile(&self, request: TenantProfile) -> TenantProfile {
        let environment = match request.default_environment.trim() {
            "" => self.settings.default_environment.trim().to_string(),
            e => e.to_string(),
        };
        TenantProfile {
            organization_id: request.organization_id,
            organization_label: request.organization_label.trim().to_string(),
            credentials: PublishCredentials {
                endpoint: request.credentials.endpoint.trim().to_string(),
                auth_token: request.credentials.auth_token.trim().to_string(),
                webhook_secret: request.credentials.webhook_secret.trim().to_string(),
            },
            default_environment: environment,
        }
    }

    fn redirect_url(&self, state: &SetupState) -> String {
        match self.settings.install_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => append_query(url, "state", state.as_str()),
            _ => append_query(&self.settings.callback_path, "state", state.as_str()),
        }
    }
}

/// Appends `key=value` to `url`, keeping any existing query and fragment.
/// `value` must already be URL-safe.
fn append_query(url: &str, key: &str, value: &str) -> String {
    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };
    let separator = match base.find('?') {
        None => Some('?'),
        Some(pos) if pos + 1 == base.len() || base.ends_with('&') => None,
        Some(_) => Some('&'),
    };
    let mut out = String::with_capacity(url.len() + key.len() + value.len() + 2);
    out.push_str(base);
    out.extend(separator);
    out.push_str(key);
    out.push('=');
    out.push_str(value);
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}
