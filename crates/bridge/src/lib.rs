//! Core domain for hookbridge: CI/CD provider webhooks in, CDEvents out.
//!
//! This crate holds every rule of the relay. Infrastructure crates implement
//! the two ports defined here ([`InstallationStore`] and [`EventSink`]); they
//! never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** No network or disk I/O. `serde_json`
//! is used for payload decoding and envelope encoding only.
//!
//! ## Data flow
//!
//! ```text
//! webhook ──► convert::Provider::convert ──► CanonicalEvent*
//!                                               │
//!                                 envelope::build_envelope
//!                                               │
//!   InstallationResolver::resolve ──► PublishCredentials ──► EventSink::publish
//! ```
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`InstallationId`, `SetupState`, etc.) |
//! | [`types`] | `Timestamp`, `PublishCredentials`, `TenantProfile` |
//! | [`errors`] | One error enum per stage |
//! | [`event`] | `CanonicalEvent` and artifact/SHA helpers |
//! | [`normalize`] | Type aliases and subject inference tables |
//! | [`envelope`] | Strict and generic CDEvents wire bodies |
//! | [`convert`] | GitHub and GitLab webhook converters |
//! | [`installation`] | Setup handshake, mappings, store port |
//! | [`sink`] | Publishing port |
//! | [`relay`] | Build-and-publish loop |

pub mod convert;
pub mod envelope;
pub mod errors;
pub mod event;
pub mod identifiers;
pub mod installation;
pub mod normalize;
pub mod relay;
pub mod sink;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use convert::{ConvertConfig, Provider, DEFAULT_ENVIRONMENT};
pub use envelope::{build_envelope, build_envelope_at, BuiltEnvelope, SPEC_VERSION};
pub use errors::{BuildError, ConvertError, PublishError, RelayError, SetupError, StoreError};
pub use event::CanonicalEvent;
pub use identifiers::{DeliveryId, InstallationId, OrganizationId, SetupState};
pub use installation::{
    InstallationMapping, InstallationResolver, InstallationStore, Promotion, PublishDefaults,
    PublishTarget, SetupIntent, SetupSettings, SetupStarted, SETUP_INTENT_TTL,
};
pub use normalize::{normalize_type, EventKind, SubjectType};
pub use relay::relay_events;
pub use sink::EventSink;
pub use types::{mask_secret, PublishCredentials, TenantProfile, Timestamp};
