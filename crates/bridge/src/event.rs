//! The provider-neutral intermediate record produced by converters.

use serde::{Deserialize, Serialize};

/// A single deployment-lifecycle fact, before it is rendered to the wire.
///
/// Every field is free text. Converters fill what the provider offers and
/// leave the rest empty; [`crate::build_envelope`] trims, defaults, and
/// validates. A converter never emits an event with an empty `service`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEvent {
    /// Short (`service.deployed`) or long (`dev.cdevents.change.merged.0.3.0`) type key.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Producer identifier; blank becomes `ci/pipeline` at build time.
    pub source: String,
    /// Service (repository or project) the event is about.
    pub service: String,
    /// Target environment, e.g. `production`.
    pub environment: String,
    /// Artifact reference, conventionally `pkg:generic/<service>@<ref>`.
    pub artifact: String,
    /// Explicit subject id; inferred from the type and service when blank.
    pub subject_id: String,
    /// Explicit subject type; inferred from the event type when blank.
    pub subject_type: String,
    /// Correlates related events; empty when the provider has no natural key.
    pub chain_id: String,
    /// User or bot that triggered the event.
    pub actor_name: String,
    /// Provider's pipeline or workflow run id.
    pub pipeline_run: String,
    /// Link to the run, release, or deployment page.
    #[serde(rename = "pipelineURL")]
    pub pipeline_url: String,
}

/// Literal prefix of synthesized artifact ids. Downstream consumers match on it.
pub const ARTIFACT_PREFIX: &str = "pkg:generic/";

/// Renders `pkg:generic/<service>@<reference>`.
pub fn artifact_id(service: &str, reference: &str) -> String {
    format!("{ARTIFACT_PREFIX}{service}@{reference}")
}

/// Placeholder used when a provider sends no commit SHA.
pub const UNKNOWN_SHA: &str = "unknown";

/// Maximum length of a shortened SHA.
pub const SHORT_SHA_LEN: usize = 12;

/// Trims a SHA-like value to at most [`SHORT_SHA_LEN`] characters.
///
/// This truncates; it never hashes. Blank input becomes [`UNKNOWN_SHA`].
pub fn short_sha(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return UNKNOWN_SHA.to_string();
    }
    value.chars().take(SHORT_SHA_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn short_sha_truncates_long_values() {
        assert_eq!(short_sha("abcdef1234567890"), "abcdef123456");
        assert_eq!(short_sha(" abc "), "abc");
        assert_eq!(short_sha(""), UNKNOWN_SHA);
        assert_eq!(short_sha("   "), UNKNOWN_SHA);
    }

    #[test]
    fn artifact_id_keeps_generic_prefix() {
        assert_eq!(artifact_id("orders", "v1.2.3"), "pkg:generic/orders@v1.2.3");
    }

    #[test]
    fn canonical_event_serializes_with_wire_field_names() {
        let event = CanonicalEvent {
            event_type: "service.deployed".into(),
            pipeline_url: "https://ci".into(),
            ..CanonicalEvent::default()
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "service.deployed");
        assert_eq!(json["pipelineURL"], "https://ci");
        assert!(json.get("subjectId").is_some());
    }

    proptest! {
        #[test]
        fn short_sha_is_never_longer_than_limit(value in "\\PC*") {
            let short = short_sha(&value);
            prop_assert!(short.chars().count() <= SHORT_SHA_LEN);
            prop_assert!(!short.is_empty());
        }

        #[test]
        fn short_sha_is_a_prefix_of_trimmed_input(value in "[0-9a-f]{1,40}") {
            prop_assert!(value.starts_with(&short_sha(&value)));
        }
    }
}
