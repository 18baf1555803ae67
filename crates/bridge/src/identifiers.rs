//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! an [`InstallationId`] with an [`OrganizationId`] even though both are `i64`
//! under the hood.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from a trimmed value, returning `None`
            /// if nothing remains.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                let v = v.trim();
                if v.is_empty() { None } else { Some(Self(v.to_string())) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for i64-wrapped newtypes (provider-assigned integers).
// Generates: struct (Copy), new() rejecting non-positive values, as_i64(), Display.
// ---------------------------------------------------------------------------
macro_rules! positive_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates a new identifier, returning `None` unless `value > 0`.
            pub fn new(value: i64) -> Option<Self> {
                if value > 0 { Some(Self(value)) } else { None }
            }

            /// Parses a decimal identifier, returning `None` for anything that is
            /// not a strictly positive integer.
            pub fn parse(raw: &str) -> Option<Self> {
                raw.trim().parse::<i64>().ok().and_then(Self::new)
            }

            /// Returns the underlying integer value.
            pub fn as_i64(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: provider-integer-backed
// ---------------------------------------------------------------------------

positive_id! {
    /// Identifies a provider-side installation: a GitHub App installation id or
    /// a GitLab project id.
    ///
    /// This is the key of an [`crate::InstallationMapping`].
    InstallationId
}

positive_id! {
    /// Identifies the dashboard organization a tenant's credentials belong to.
    ///
    /// Used to scope mapping listings and revocations.
    OrganizationId
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// The opaque random token that keys a [`crate::SetupIntent`].
    ///
    /// Travels through the external install flow as the `state` query
    /// parameter and comes back on the callback.
    SetupState
}

string_id! {
    /// Transport-level delivery id (`X-GitHub-Delivery`, `X-Gitlab-Event-UUID`).
    ///
    /// Propagated into `chainId` for push and change events.
    DeliveryId
}

/// Bytes of randomness in a setup state token, before hex encoding.
pub const SETUP_STATE_BYTES: usize = 16;

impl SetupState {
    /// A fresh unguessable token: random bytes from the OS, hex-encoded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SETUP_STATE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }
}
