//! Event-type normalisation and subject inference.
//!
//! All decisions here are table lookups. The order of entries in
//! [`SUBJECT_PREFIX_RULES`] and [`SUBJECT_INFIX_RULES`] is significant: the
//! first match wins.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Known kinds
// ---------------------------------------------------------------------------

/// The event kinds rendered with a strict, versioned CDEvents schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A service version went live in an environment.
    ServiceDeployed,
    /// A running service moved to a new version.
    ServiceUpgraded,
    /// A running service went back to an earlier version.
    ServiceRolledback,
    /// A service was taken out of an environment.
    ServiceRemoved,
    /// A new service version was released.
    ServicePublished,
    /// An environment was provisioned.
    EnvironmentCreated,
    /// An environment's configuration changed.
    EnvironmentModified,
    /// An environment was torn down.
    EnvironmentDeleted,
}

/// `(kind, short key, long versioned type)`.
const KIND_TABLE: &[(EventKind, &str, &str)] = &[
    (EventKind::ServiceDeployed, "service.deployed", "dev.cdevents.service.deployed.0.3.0"),
    (EventKind::ServiceUpgraded, "service.upgraded", "dev.cdevents.service.upgraded.0.3.0"),
    (EventKind::ServiceRolledback, "service.rolledback", "dev.cdevents.service.rolledback.0.3.0"),
    (EventKind::ServiceRemoved, "service.removed", "dev.cdevents.service.removed.0.3.0"),
    (EventKind::ServicePublished, "service.published", "dev.cdevents.service.published.0.3.0"),
    (EventKind::EnvironmentCreated, "environment.created", "dev.cdevents.environment.created.0.3.0"),
    (EventKind::EnvironmentModified, "environment.modified", "dev.cdevents.environment.modified.0.3.0"),
    (EventKind::EnvironmentDeleted, "environment.deleted", "dev.cdevents.environment.deleted.0.3.0"),
];

impl EventKind {
    /// Every known kind, in table order.
    pub const ALL: [EventKind; 8] = [
        EventKind::ServiceDeployed,
        EventKind::ServiceUpgraded,
        EventKind::ServiceRolledback,
        EventKind::ServiceRemoved,
        EventKind::ServicePublished,
        EventKind::EnvironmentCreated,
        EventKind::EnvironmentModified,
        EventKind::EnvironmentDeleted,
    ];

    fn row(self) -> &'static (EventKind, &'static str, &'static str) {
        // KIND_TABLE lists every variant exactly once.
        KIND_TABLE
            .iter()
            .find(|(kind, _, _)| *kind == self)
            .unwrap_or(&KIND_TABLE[0])
    }

    /// Internal short key, e.g. `service.deployed`.
    pub fn short_key(self) -> &'static str {
        self.row().1
    }

    /// Versioned CDEvents type, e.g. `dev.cdevents.service.deployed.0.3.0`.
    pub fn cdevents_type(self) -> &'static str {
        self.row().2
    }

    /// Looks up a kind by its exact short key.
    pub fn from_short_key(key: &str) -> Option<Self> {
        KIND_TABLE
            .iter()
            .find(|(_, short, _)| *short == key)
            .map(|(kind, _, _)| *kind)
    }

    /// `true` for the five `service.*` kinds.
    pub fn is_service(self) -> bool {
        !self.is_environment()
    }

    /// `true` for the three `environment.*` kinds.
    pub fn is_environment(self) -> bool {
        matches!(
            self,
            EventKind::EnvironmentCreated
                | EventKind::EnvironmentModified
                | EventKind::EnvironmentDeleted
        )
    }

    /// Whether the strict envelope carries `artifactId`.
    pub fn carries_artifact(self) -> bool {
        self.is_service() && self != EventKind::ServiceRemoved
    }
}

// ---------------------------------------------------------------------------
// Type normalisation
// ---------------------------------------------------------------------------

/// Lower-cased, trimmed spellings that resolve to a known kind. Short keys are
/// absent on purpose: they pass through unchanged and already equal the key.
const TYPE_ALIASES: &[(&str, EventKind)] = &[
    ("", EventKind::ServiceDeployed),
    ("dev.cdevents.service.deployed.0.3.0", EventKind::ServiceDeployed),
    ("dev.cdevents.service.upgraded.0.3.0", EventKind::ServiceUpgraded),
    ("dev.cdevents.service.rolledback.0.3.0", EventKind::ServiceRolledback),
    ("dev.cdevents.service.removed.0.3.0", EventKind::ServiceRemoved),
    ("dev.cdevents.service.published.0.3.0", EventKind::ServicePublished),
    ("dev.cdevents.environment.created.0.3.0", EventKind::EnvironmentCreated),
    ("dev.cdevents.environment.modified.0.3.0", EventKind::EnvironmentModified),
    ("dev.cdevents.environment.deleted.0.3.0", EventKind::EnvironmentDeleted),
];

/// Resolves a free-form type string to an internal key.
///
/// Known long forms (any case, surrounding whitespace allowed) map to their
/// short key and the empty string maps to `service.deployed`. Anything else
/// comes back lower-cased and trimmed so the caller can test it with
/// [`is_accepted_custom_type`].
pub fn normalize_type(raw: &str) -> String {
    let value = raw.trim().to_lowercase();
    TYPE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == value)
        .map(|(_, kind)| kind.short_key().to_string())
        .unwrap_or(value)
}

// ---------------------------------------------------------------------------
// Subject inference
// ---------------------------------------------------------------------------

/// The entity an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    /// A deployable service.
    Service,
    /// A deployment target.
    Environment,
    /// A CI pipeline or workflow run.
    Pipeline,
    /// A source change: push, pull or merge request.
    Change,
    /// A built package or image.
    Artifact,
    /// An operational incident.
    Incident,
}

impl SubjectType {
    /// Lower-case wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            SubjectType::Service => "service",
            SubjectType::Environment => "environment",
            SubjectType::Pipeline => "pipeline",
            SubjectType::Change => "change",
            SubjectType::Artifact => "artifact",
            SubjectType::Incident => "incident",
        }
    }
}

impl std::fmt::Display for SubjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checked first, against the start of the resolved type.
pub const SUBJECT_PREFIX_RULES: &[(&str, SubjectType)] = &[
    ("service.", SubjectType::Service),
    ("environment.", SubjectType::Environment),
];

/// Checked second, anywhere in the resolved type.
pub const SUBJECT_INFIX_RULES: &[(&str, SubjectType)] = &[
    (".pipeline.", SubjectType::Pipeline),
    (".change.", SubjectType::Change),
    (".artifact.", SubjectType::Artifact),
    (".incident.", SubjectType::Incident),
];

/// Buckets a resolved type into a subject type; defaults to `service`.
pub fn infer_subject_type(resolved_type: &str) -> SubjectType {
    SUBJECT_PREFIX_RULES
        .iter()
        .find(|(prefix, _)| resolved_type.starts_with(prefix))
        .or_else(|| {
            SUBJECT_INFIX_RULES
                .iter()
                .find(|(infix, _)| resolved_type.contains(infix))
        })
        .map(|(_, subject)| *subject)
        .unwrap_or(SubjectType::Service)
}

/// Derives a subject id from the event's service or environment.
///
/// Returns an empty string when nothing applies; callers must treat that as a
/// validation failure.
pub fn infer_subject_id(subject_type: &str, service: &str, environment: &str) -> String {
    let subject_type = subject_type.trim();
    let service = service.trim();
    let environment = environment.trim();
    if !service.is_empty() {
        if service.contains('/') {
            return service.to_string();
        }
        return format!("{subject_type}/{service}");
    }
    if subject_type == SubjectType::Environment.as_str() && !environment.is_empty() {
        return format!("environment/{environment}");
    }
    String::new()
}

// ---------------------------------------------------------------------------
// Custom types
// ---------------------------------------------------------------------------

/// Long-form prefixes rendered with the generic envelope.
pub const ACCEPTED_CUSTOM_PREFIXES: [&str; 4] = [
    "dev.cdevents.pipeline.",
    "dev.cdevents.change.",
    "dev.cdevents.artifact.",
    "dev.cdevents.incident.",
];

/// Whether an unrecognised type is still eligible for the generic envelope.
pub fn is_accepted_custom_type(event_type: &str) -> bool {
    let value = event_type.trim().to_lowercase();
    ACCEPTED_CUSTOM_PREFIXES
        .iter()
        .any(|prefix| value.starts_with(prefix))
}
