//! Error types for each stage of the relay.
//!
//! Errors fall into five classes, and every type here belongs to exactly one:
//!
//! | Class | Type | Caller response |
//! |-------|------|-----------------|
//! | Ignorable | *(not an error: empty result)* | accept as a no-op |
//! | Validation | [`ConvertError`], [`BuildError`], [`SetupError`] input variants | reject the request |
//! | Configuration | [`PublishError::MissingConfiguration`] | fail before any network call |
//! | Transport | [`PublishError::Transport`], [`PublishError::Rejected`] | report delivery failure, never retry |
//! | Store | [`StoreError`] | not-found is expected; backend faults are logged |
//!
//! Nothing in this crate retries. Callers above the relay own retry policy.

use thiserror::Error;

use crate::InstallationId;

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// A recognised provider event whose payload could not be decoded.
///
/// Unknown event names and payloads without a repository name are *not*
/// errors; converters return an empty list for those.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The payload is not valid JSON for the event's expected shape.
    #[error("malformed {event} payload: {source}")]
    MalformedPayload {
        /// The provider event name the payload arrived under.
        event: String,
        /// The underlying decode failure.
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Envelope construction
// ---------------------------------------------------------------------------

/// A canonical event that cannot be rendered into a wire envelope.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// No subject id was supplied and none could be inferred.
    #[error("subject is required (set subject-id, service, or environment based on event type)")]
    MissingSubject,

    /// A `service.*` type without a service or environment.
    #[error("service and environment are required for service events")]
    MissingServiceOrEnvironment,

    /// An `environment.*` type without an environment.
    #[error("environment is required for environment events")]
    MissingEnvironment,

    /// The type is neither a known kind nor an accepted custom prefix.
    #[error("unsupported event type {0:?}")]
    UnsupportedType(String),

    /// The envelope could not be serialised.
    #[error("failed to encode envelope: {0}")]
    Encode(String),
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

/// Failure to deliver an envelope to the downstream endpoint.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    /// Endpoint, token, or secret is blank; no request was attempted.
    #[error("endpoint/token/secret are required")]
    MissingConfiguration,

    /// The request could not be built or sent, or timed out.
    #[error("send request: {0}")]
    Transport(String),

    /// The endpoint answered with a status of 300 or above.
    #[error("webhook rejected: status={status} body={body}")]
    Rejected {
        /// HTTP status code returned by the endpoint.
        status: u16,
        /// Trimmed, truncated response body.
        body: String,
    },
}

// ---------------------------------------------------------------------------
// Installation store
// ---------------------------------------------------------------------------

/// Errors returned by [`crate::InstallationStore`] implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The requested row does not exist (or a scoped delete matched nothing).
    ///
    /// This is an expected outcome, not a fault.
    #[error("not found")]
    NotFound,

    /// The backing store failed.
    #[error("storage failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns `true` for [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

// ---------------------------------------------------------------------------
// Setup handshake
// ---------------------------------------------------------------------------

/// Errors from the setup-intent handshake and mapping management.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetupError {
    /// Endpoint, token, and secret must all be supplied to start setup.
    #[error("ddash_endpoint, ddash_auth_token, ddash_webhook_secret are required")]
    MissingCredentials,

    /// The callback carried no `state` token.
    #[error("missing state")]
    MissingState,

    /// The callback identifier was absent or not a positive integer.
    #[error("invalid installation id")]
    InvalidInstallationId,

    /// No intent exists for the supplied state (never created, or already consumed).
    #[error("unknown setup state")]
    UnknownState,

    /// The intent existed but had expired; it has been discarded.
    #[error("setup state expired")]
    ExpiredState,

    /// No mapping exists for the installation (or it belongs to another organization).
    #[error("mapping not found for installation {0}")]
    MappingNotFound(InstallationId),

    /// The store failed underneath the handshake.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// Failure while relaying one converted event.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    /// The event could not be rendered; the request should be rejected.
    #[error("invalid event: {0}")]
    Build(#[from] BuildError),

    /// The envelope was built but delivery failed.
    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
}
