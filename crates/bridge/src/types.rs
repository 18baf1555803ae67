//! Shared value types for the hookbridge domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants and participate in domain computations.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::OrganizationId;

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from whole Unix seconds.
    ///
    /// Returns `None` when the value is outside chrono's representable range.
    pub fn from_unix_seconds(secs: i64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(Self)
    }

    /// Whole seconds since the Unix epoch.
    pub fn unix_seconds(self) -> i64 {
        self.0.timestamp()
    }

    /// Nanoseconds since the Unix epoch.
    ///
    /// Saturates to `i64::MAX` past the year 2262.
    pub fn unix_nanos(self) -> i64 {
        self.0.timestamp_nanos_opt().unwrap_or(i64::MAX)
    }

    /// RFC 3339 rendering with nanosecond precision and a `Z` suffix.
    pub fn to_rfc3339_nanos(self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    /// Returns this timestamp shifted forward by `duration`.
    pub fn plus(self, duration: std::time::Duration) -> Self {
        chrono::Duration::from_std(duration)
            .ok()
            .and_then(|delta| self.0.checked_add_signed(delta))
            .map_or(Self(DateTime::<Utc>::MAX_UTC), Self)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Tenant credentials
// ---------------------------------------------------------------------------

/// The endpoint and secrets used to publish on behalf of one tenant.
///
/// Passed to the publishing port per call; never persisted by it.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublishCredentials {
    /// Dashboard base URL; `/webhooks/cdevents` is appended on publish.
    pub endpoint: String,
    /// Sent as `Authorization: Bearer <token>`.
    pub auth_token: String,
    /// HMAC-SHA256 key for the `X-Webhook-Signature` header.
    pub webhook_secret: String,
}

impl PublishCredentials {
    /// Returns `true` when endpoint, token, and secret are all non-blank.
    pub fn is_complete(&self) -> bool {
        !self.endpoint.trim().is_empty()
            && !self.auth_token.trim().is_empty()
            && !self.webhook_secret.trim().is_empty()
    }
}

impl std::fmt::Debug for PublishCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishCredentials")
            .field("endpoint", &self.endpoint)
            .field("auth_token", &mask_secret(&self.auth_token))
            .field("webhook_secret", &mask_secret(&self.webhook_secret))
            .finish()
    }
}

// ---------------------------------------------------------------------------

/// Tenant fields shared by a [`crate::SetupIntent`] and the
/// [`crate::InstallationMapping`] it is promoted into.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TenantProfile {
    /// Owning dashboard organization, when the operator supplied one.
    pub organization_id: Option<OrganizationId>,
    /// Free-form label shown to operators.
    pub organization_label: String,
    /// Where and how to publish for this tenant.
    pub credentials: PublishCredentials,
    /// Environment used by converters when a payload names none.
    /// Empty means "use the process default".
    pub default_environment: String,
}

impl std::fmt::Debug for TenantProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantProfile")
            .field("organization_id", &self.organization_id)
            .field("organization_label", &self.organization_label)
            .field("credentials", &self.credentials)
            .field("default_environment", &self.default_environment)
            .finish()
    }
}

/// Masks a secret for display: `abcd...wxyz` for long values, `****` for
/// short ones, empty for empty.
pub fn mask_secret(value: &str) -> String {
    let value = value.trim();
    let chars: Vec<char> = value.chars().collect();
    match chars.len() {
        0 => String::new(),
        1..=8 => "****".to_string(),
        n => {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[n - 4..].iter().collect();
            format!("{head}...{tail}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_secret_hides_middle_of_long_values() {
        assert_eq!(mask_secret(""), "");
        assert_eq!(mask_secret("short"), "****");
        assert_eq!(mask_secret("abcdefghijkl"), "abcd...ijkl");
    }

    #[test]
    fn credentials_debug_does_not_leak_secrets() {
        let creds = PublishCredentials {
            endpoint: "https://dash.example".into(),
            auth_token: "token-very-secret".into(),
            webhook_secret: "hmac-very-secret".into(),
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("token-very-secret"));
        assert!(!rendered.contains("hmac-very-secret"));
        assert!(rendered.contains("https://dash.example"));
    }

    #[test]
    fn credentials_require_all_three_fields() {
        let mut creds = PublishCredentials {
            endpoint: "https://dash.example".into(),
            auth_token: "t".into(),
            webhook_secret: "s".into(),
        };
        assert!(creds.is_complete());
        creds.webhook_secret = "  ".into();
        assert!(!creds.is_complete());
    }

    #[test]
    fn timestamp_renders_nanosecond_rfc3339() {
        let ts = Timestamp::from_unix_seconds(0).unwrap();
        assert_eq!(ts.to_rfc3339_nanos(), "1970-01-01T00:00:00.000000000Z");
        assert_eq!(ts.plus(std::time::Duration::from_secs(90)).unix_seconds(), 90);
    }
}
