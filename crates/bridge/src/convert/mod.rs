//! Provider webhook conversion.
//!
//! Each provider module owns a table of `(event name, handler)` pairs. The
//! dispatcher looks the event name up, decodes the payload into the handler's
//! own shape, and returns zero or more [`CanonicalEvent`]s.
//!
//! An unknown event name, an action the provider table does not map, or a
//! payload without a repository/project name all produce an empty list. Only a
//! payload that fails to decode is an error.

use serde::de::{DeserializeOwned, Unexpected};
use serde_json::Value;

use crate::{CanonicalEvent, ConvertError, DeliveryId, InstallationId};

pub mod github;
pub mod gitlab;

/// Environment used when neither the payload nor the config names one.
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// Fallbacks applied by every converter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertConfig {
    /// Environment for events whose payload has none. Blank means
    /// [`DEFAULT_ENVIRONMENT`].
    pub default_environment: String,
    /// Value of every produced event's `source`. Blank means the provider's
    /// [`Provider::default_source`].
    pub source: String,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// The webhook sender a listener is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// A GitHub App; tenants are keyed by installation id.
    GitHub,
    /// GitLab project webhooks; tenants are keyed by project id.
    GitLab,
}

impl Provider {
    /// Parses `github` or `gitlab`, ignoring case and surrounding whitespace.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "github" => Some(Self::GitHub),
            "gitlab" => Some(Self::GitLab),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
        }
    }

    /// `source` stamped on events when the config leaves it blank.
    pub fn default_source(self) -> &'static str {
        match self {
            Self::GitHub => "github/app",
            Self::GitLab => "gitlab/webhook",
        }
    }

    /// Header carrying the provider's event name.
    pub fn event_header(self) -> &'static str {
        match self {
            Self::GitHub => "x-github-event",
            Self::GitLab => "x-gitlab-event",
        }
    }

    /// Header carrying the provider's per-delivery id.
    pub fn delivery_header(self) -> &'static str {
        match self {
            Self::GitHub => "x-github-delivery",
            Self::GitLab => "x-gitlab-event-uuid",
        }
    }

    /// Converts one webhook delivery into canonical events.
    ///
    /// `delivery_id` becomes the `chainId` of push and change events; `None`
    /// leaves it empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::MalformedPayload`] when the event name is
    /// recognised but the payload does not decode.
    pub fn convert(
        self,
        event_name: &str,
        delivery_id: Option<&DeliveryId>,
        payload: &[u8],
        config: &ConvertConfig,
    ) -> Result<Vec<CanonicalEvent>, ConvertError> {
        let table = match self {
            Self::GitHub => github::HANDLERS,
            Self::GitLab => gitlab::HANDLERS,
        };
        let event_name = event_name.trim();
        let Some((_, handler)) = table.iter().find(|(name, _)| *name == event_name) else {
            tracing::debug!(provider = self.as_str(), event = event_name, "unhandled event");
            return Ok(Vec::new());
        };

        let source = match config.source.trim() {
            "" => self.default_source(),
            s => s,
        };
        let environment = match config.default_environment.trim() {
            "" => DEFAULT_ENVIRONMENT,
            e => e,
        };
        handler(&Delivery {
            event_name,
            delivery_id,
            payload,
            source,
            environment,
        })
    }

    /// Reads the tenant identifier from a payload: GitHub's `installation.id`
    /// or GitLab's `project_id`/`project.id`.
    ///
    /// Returns `None` when the payload is not JSON or carries no positive id.
    pub fn extract_installation_id(self, payload: &[u8]) -> Option<InstallationId> {
        let value: Value = serde_json::from_slice(payload).ok()?;
        match self {
            Self::GitHub => github::extract_installation_id(&value),
            Self::GitLab => gitlab::extract_project_id(&value),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Handler plumbing
// ---------------------------------------------------------------------------

/// One delivery with config fallbacks already applied.
pub(crate) struct Delivery<'a> {
    pub event_name: &'a str,
    pub delivery_id: Option<&'a DeliveryId>,
    pub payload: &'a [u8],
    pub source: &'a str,
    pub environment: &'a str,
}

pub(crate) type Handler = fn(&Delivery<'_>) -> Result<Vec<CanonicalEvent>, ConvertError>;

impl Delivery<'_> {
    /// Decodes the payload into `T`.
    ///
    /// JSON `null`s are dropped first so they fall back to the field's
    /// default, the same as an absent key. A top-level `null` decodes as an
    /// empty object; any other non-object payload is malformed.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ConvertError> {
        let malformed = |source: serde_json::Error| ConvertError::MalformedPayload {
            event: self.event_name.to_string(),
            source,
        };
        let mut value: Value = serde_json::from_slice(self.payload).map_err(malformed)?;
        drop_nulls(&mut value);
        if value.is_null() {
            value = Value::Object(serde_json::Map::new());
        }
        let kind = match &value {
            Value::Object(_) | Value::Null => None,
            Value::Array(_) => Some("array"),
            Value::Bool(_) => Some("boolean"),
            Value::Number(_) => Some("number"),
            Value::String(_) => Some("string"),
        };
        if let Some(kind) = kind {
            return Err(malformed(serde::de::Error::invalid_type(
                Unexpected::Other(kind),
                &"a JSON object",
            )));
        }
        serde_json::from_value(value).map_err(malformed)
    }

    /// The delivery id as a `chainId` value, empty when the header was absent.
    pub fn chain_id(&self) -> String {
        self.delivery_id.map(DeliveryId::to_string).unwrap_or_default()
    }

    /// A canonical event pre-filled with this delivery's source, the given
    /// service, and the fallback environment.
    pub fn event(&self, event_type: impl Into<String>, service: &str) -> CanonicalEvent {
        CanonicalEvent {
            event_type: event_type.into(),
            source: self.source.to_string(),
            service: service.to_string(),
            environment: self.environment.to_string(),
            ..CanonicalEvent::default()
        }
    }
}

fn drop_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(drop_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(drop_nulls),
        _ => {}
    }
}

/// First argument that is non-blank after trimming, trimmed; else `""`.
pub(crate) fn first_non_empty<'a>(values: &[&'a str]) -> &'a str {
    values
        .iter()
        .copied()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or("")
}

/// Looks `state` up in a `(state, value)` table, falling back to `default`.
pub(crate) fn lookup<T: Copy>(table: &[(&str, T)], state: &str, default: T) -> T {
    table
        .iter()
        .find(|(key, _)| *key == state)
        .map_or(default, |(_, value)| *value)
}

/// Interprets a JSON number or numeric string as a positive id.
pub(crate) fn positive_id(value: Option<&Value>) -> Option<InstallationId> {
    match value? {
        Value::Number(n) => n.as_i64().and_then(InstallationId::new),
        Value::String(s) => InstallationId::parse(s),
        _ => None,
    }
}
