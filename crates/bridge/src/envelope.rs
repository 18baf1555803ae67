//! Rendering canonical events into CDEvents wire envelopes.
//!
//! Known kinds get a strict, versioned envelope. Types under one of the
//! [`crate::normalize::ACCEPTED_CUSTOM_PREFIXES`] get the generic envelope.
//! Everything else is rejected.

use serde::Serialize;

use crate::event::artifact_id;
use crate::normalize::{
    infer_subject_id, infer_subject_type, is_accepted_custom_type, normalize_type, EventKind,
};
use crate::{BuildError, CanonicalEvent, Timestamp};

/// CDEvents spec version stamped on every envelope.
pub const SPEC_VERSION: &str = "0.5.0";

/// Source used when the event names none.
pub const DEFAULT_SOURCE: &str = "ci/pipeline";

/// A rendered envelope ready for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltEnvelope {
    /// Exact JSON bytes to sign and send.
    pub body: Vec<u8>,
    /// Versioned type for strict kinds, the normalised type for custom ones.
    /// Used by callers for logging.
    pub resolved_type: String,
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Envelope<'a, C: Serialize> {
    context: Context<'a>,
    subject: Subject<'a, C>,
}

#[derive(Serialize)]
struct Context<'a> {
    specversion: &'static str,
    id: String,
    source: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    timestamp: String,
    #[serde(rename = "chainId", skip_serializing_if = "Option::is_none")]
    chain_id: Option<&'a str>,
}

#[derive(Serialize)]
struct Subject<'a, C: Serialize> {
    id: &'a str,
    source: &'a str,
    #[serde(rename = "type")]
    subject_type: &'a str,
    content: C,
}

#[derive(Serialize)]
struct Reference<'a> {
    id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceContent<'a> {
    environment: Reference<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact_id: Option<&'a str>,
}

#[derive(Serialize)]
struct EnvironmentContent {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenericContent<'a> {
    environment: Reference<'a>,
    artifact_id: &'a str,
    pipeline: PipelineContent<'a>,
    actor: ActorContent<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PipelineContent<'a> {
    run_id: &'a str,
    url: &'a str,
}

#[derive(Serialize)]
struct ActorContent<'a> {
    name: &'a str,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Renders `event` using the current wall-clock time.
pub fn build_envelope(event: &CanonicalEvent) -> Result<BuiltEnvelope, BuildError> {
    build_envelope_at(event, Timestamp::now())
}

/// Renders `event` as of `now`.
///
/// `now` supplies the synthesized artifact suffix for service events without
/// an artifact, and the generic envelope's id and timestamp. Neither is an
/// identity key; two builds within the same instant may collide.
pub fn build_envelope_at(
    event: &CanonicalEvent,
    now: Timestamp,
) -> Result<BuiltEnvelope, BuildError> {
    let service = event.service.trim();
    let environment = event.environment.trim();
    let source = match event.source.trim() {
        "" => DEFAULT_SOURCE,
        s => s,
    };

    let resolved = normalize_type(&event.event_type);

    let mut artifact = event.artifact.trim().to_string();
    if artifact.is_empty() && resolved.starts_with("service.") {
        artifact = artifact_id(service, &now.unix_seconds().to_string());
    }

    let subject_type = match event.subject_type.trim() {
        "" => infer_subject_type(&resolved).as_str().to_string(),
        s => s.to_string(),
    };
    let mut subject_id = match event.subject_id.trim() {
        "" => infer_subject_id(&subject_type, service, environment),
        s => s.to_string(),
    };
    if subject_id.is_empty() {
        return Err(BuildError::MissingSubject);
    }
    if !subject_id.contains('/') {
        subject_id = format!("{subject_type}/{subject_id}");
    }

    if let Some(kind) = EventKind::from_short_key(&resolved) {
        let body = if kind.is_service() {
            if service.is_empty() || environment.is_empty() {
                return Err(BuildError::MissingServiceOrEnvironment);
            }
            let content = ServiceContent {
                environment: Reference { id: environment },
                artifact_id: kind.carries_artifact().then_some(artifact.as_str()),
            };
            encode(&strict_envelope(kind, source, &subject_id, "service", content, now))?
        } else {
            if environment.is_empty() {
                return Err(BuildError::MissingEnvironment);
            }
            let content = EnvironmentContent {};
            encode(&strict_envelope(kind, source, &subject_id, "environment", content, now))?
        };
        return Ok(BuiltEnvelope {
            body,
            resolved_type: kind.cdevents_type().to_string(),
        });
    }

    if is_accepted_custom_type(&resolved) {
        let chain_id = event.chain_id.trim();
        let envelope = Envelope {
            context: Context {
                specversion: SPEC_VERSION,
                id: now.unix_nanos().to_string(),
                source,
                event_type: &resolved,
                timestamp: now.to_rfc3339_nanos(),
                chain_id: (!chain_id.is_empty()).then_some(chain_id),
            },
            subject: Subject {
                id: &subject_id,
                source,
                subject_type: &subject_type,
                content: GenericContent {
                    environment: Reference { id: environment },
                    artifact_id: &artifact,
                    pipeline: PipelineContent {
                        run_id: event.pipeline_run.trim(),
                        url: event.pipeline_url.trim(),
                    },
                    actor: ActorContent {
                        name: event.actor_name.trim(),
                    },
                },
            },
        };
        return Ok(BuiltEnvelope {
            body: encode(&envelope)?,
            resolved_type: resolved,
        });
    }

    Err(BuildError::UnsupportedType(event.event_type.clone()))
}

fn strict_envelope<'a, C: Serialize>(
    kind: EventKind,
    source: &'a str,
    subject_id: &'a str,
    subject_type: &'a str,
    content: C,
    now: Timestamp,
) -> Envelope<'a, C> {
    Envelope {
        context: Context {
            specversion: SPEC_VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            source,
            event_type: kind.cdevents_type(),
            timestamp: now.to_rfc3339_nanos(),
            chain_id: None,
        },
        subject: Subject {
            id: subject_id,
            source,
            subject_type,
            content,
        },
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, BuildError> {
    serde_json::to_vec(value).map_err(|e| BuildError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn parse(built: &BuiltEnvelope) -> Value {
        serde_json::from_slice(&built.body).expect("envelope is valid JSON")
    }

    fn service_event(kind: &str) -> CanonicalEvent {
        CanonicalEvent {
            event_type: kind.into(),
            source: "ci/test".into(),
            service: "billing-api".into(),
            environment: "staging".into(),
            ..CanonicalEvent::default()
        }
    }

    #[test]
    fn all_service_kinds_render_their_long_type() {
        for kind in EventKind::ALL.iter().filter(|k| k.is_service()) {
            let built = build_envelope(&service_event(kind.short_key())).unwrap();
            assert_eq!(built.resolved_type, kind.cdevents_type());
            let text = String::from_utf8(built.body.clone()).unwrap();
            assert!(text.contains(kind.cdevents_type()), "{text}");

            let json = parse(&built);
            assert_eq!(json["context"]["specversion"], SPEC_VERSION);
            assert_eq!(json["context"]["source"], "ci/test");
            assert_eq!(json["subject"]["id"], "service/billing-api");
            assert_eq!(json["subject"]["type"], "service");
            assert_eq!(json["subject"]["content"]["environment"]["id"], "staging");
        }
    }

    #[test]
    fn removed_omits_artifact_and_others_carry_it() {
        let removed = parse(&build_envelope(&service_event("service.removed")).unwrap());
        assert!(removed["subject"]["content"].get("artifactId").is_none());

        let mut published = service_event("service.published");
        published.artifact = "pkg:generic/billing-api@v2".into();
        let published = parse(&build_envelope(&published).unwrap());
        assert_eq!(
            published["subject"]["content"]["artifactId"],
            "pkg:generic/billing-api@v2"
        );
    }

    #[test]
    fn service_artifact_is_synthesized_from_build_time() {
        let now = Timestamp::from_unix_seconds(1_700_000_000).unwrap();
        let built = build_envelope_at(&service_event("service.deployed"), now).unwrap();
        assert_eq!(
            parse(&built)["subject"]["content"]["artifactId"],
            "pkg:generic/billing-api@1700000000"
        );
    }

    #[test]
    fn service_kinds_require_service_and_environment() {
        let mut event = service_event("service.upgraded");
        event.environment.clear();
        assert_eq!(
            build_envelope(&event),
            Err(BuildError::MissingServiceOrEnvironment)
        );

        let mut event = service_event("service.upgraded");
        event.service.clear();
        event.subject_id = "service/explicit".into();
        assert_eq!(
            build_envelope(&event),
            Err(BuildError::MissingServiceOrEnvironment)
        );
    }

    #[test]
    fn environment_kinds_require_environment() {
        for kind in EventKind::ALL.iter().filter(|k| k.is_environment()) {
            let mut event = CanonicalEvent {
                event_type: kind.short_key().into(),
                subject_id: "environment/staging".into(),
                ..CanonicalEvent::default()
            };
            assert_eq!(build_envelope(&event), Err(BuildError::MissingEnvironment));

            event.environment = "staging".into();
            let built = build_envelope(&event).unwrap();
            assert_eq!(built.resolved_type, kind.cdevents_type());
            let json = parse(&built);
            assert_eq!(json["subject"]["id"], "environment/staging");
            assert_eq!(json["subject"]["type"], "environment");
        }
    }

    #[test]
    fn environment_subject_is_inferred_from_environment() {
        let event = CanonicalEvent {
            event_type: "dev.cdevents.environment.created.0.3.0".into(),
            environment: "qa".into(),
            ..CanonicalEvent::default()
        };
        let json = parse(&build_envelope(&event).unwrap());
        assert_eq!(json["subject"]["id"], "environment/qa");
        assert_eq!(json["context"]["source"], DEFAULT_SOURCE);
    }

    #[test]
    fn missing_subject_is_a_validation_error() {
        let event = CanonicalEvent {
            event_type: "environment.created".into(),
            ..CanonicalEvent::default()
        };
        assert_eq!(build_envelope(&event), Err(BuildError::MissingSubject));
    }

    #[test]
    fn bare_subject_id_gets_type_prefix() {
        let mut event = service_event("service.deployed");
        event.subject_id = "orders".into();
        let json = parse(&build_envelope(&event).unwrap());
        assert_eq!(json["subject"]["id"], "service/orders");
    }

    #[test]
    fn custom_types_use_generic_envelope_with_chain_id() {
        for prefix in ["pipeline.run.started", "change.merged", "artifact.packaged", "incident.detected"] {
            let event = CanonicalEvent {
                event_type: format!("dev.cdevents.{prefix}.0.3.0"),
                source: "ci/test".into(),
                service: "payments".into(),
                environment: "staging".into(),
                actor_name: "build-bot".into(),
                pipeline_run: "run-123".into(),
                pipeline_url: "https://ci.example.local/runs/123".into(),
                chain_id: "chain-123".into(),
                ..CanonicalEvent::default()
            };
            let built = build_envelope(&event).unwrap();
            assert_eq!(built.resolved_type, event.event_type);
            let json = parse(&built);
            assert_eq!(json["context"]["chainId"], "chain-123");
            assert_eq!(json["context"]["specversion"], SPEC_VERSION);
            assert_eq!(json["subject"]["content"]["pipeline"]["runId"], "run-123");
            assert_eq!(json["subject"]["content"]["actor"]["name"], "build-bot");
            assert_eq!(json["subject"]["content"]["environment"]["id"], "staging");
        }
    }

    #[test]
    fn empty_chain_id_is_absent_not_blank() {
        let event = CanonicalEvent {
            event_type: "dev.cdevents.change.pushed.0.3.0".into(),
            service: "payments".into(),
            chain_id: "   ".into(),
            ..CanonicalEvent::default()
        };
        let json = parse(&build_envelope(&event).unwrap());
        assert!(json["context"].get("chainId").is_none());
        assert_eq!(json["subject"]["id"], "change/payments");
        assert_eq!(json["subject"]["type"], "change");
    }

    #[test]
    fn generic_context_uses_nanosecond_clock() {
        let now = Timestamp::from_unix_seconds(1_700_000_000).unwrap();
        let event = CanonicalEvent {
            event_type: "dev.cdevents.pipeline.run.queued.0.3.0".into(),
            service: "payments".into(),
            ..CanonicalEvent::default()
        };
        let json = parse(&build_envelope_at(&event, now).unwrap());
        assert_eq!(json["context"]["id"], "1700000000000000000");
        assert_eq!(json["context"]["timestamp"], "2023-11-14T22:13:20.000000000Z");
    }

    #[test]
    fn long_and_short_forms_resolve_identically() {
        for kind in EventKind::ALL {
            let mut short = service_event(kind.short_key());
            let mut long = service_event(&format!("  {}  ", kind.cdevents_type().to_uppercase()));
            short.artifact = "pkg:generic/billing-api@1".into();
            long.artifact = short.artifact.clone();
            let a = build_envelope(&short).unwrap();
            let b = build_envelope(&long).unwrap();
            assert_eq!(a.resolved_type, b.resolved_type);
        }
    }

    #[test]
    fn unsupported_type_names_original_string() {
        let mut event = service_event("Dev.CDEvents.TestCase.Run.Started.0.1.0");
        event.subject_id = "testcase/x".into();
        assert_eq!(
            build_envelope(&event),
            Err(BuildError::UnsupportedType(
                "Dev.CDEvents.TestCase.Run.Started.0.1.0".into()
            ))
        );
    }
}
