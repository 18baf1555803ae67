//! Build-then-publish for a batch of converted events.

use crate::envelope::build_envelope;
use crate::sink::EventSink;
use crate::{CanonicalEvent, PublishCredentials, RelayError};

/// Renders and publishes `events` in order, stopping at the first failure.
///
/// Returns how many events were delivered. Events after a failure are not
/// attempted and earlier deliveries are not rolled back.
pub async fn relay_events(
    sink: &dyn EventSink,
    credentials: &PublishCredentials,
    events: &[CanonicalEvent],
) -> Result<usize, RelayError> {
    let mut published = 0;
    for event in events {
        let built = build_envelope(event)?;
        sink.publish(credentials, &built.body).await?;
        tracing::info!(
            event_type = %built.resolved_type,
            service = %event.service,
            environment = %event.environment,
            "event published"
        );
        published += 1;
    }
    Ok(published)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BuildError, PublishError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        bodies: Mutex<Vec<Vec<u8>>>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl EventSink for Recording {
        async fn publish(
            &self,
            _credentials: &PublishCredentials,
            body: &[u8],
        ) -> Result<(), PublishError> {
            let mut bodies = self.bodies.lock().unwrap();
            if self.fail_after.is_some_and(|n| bodies.len() >= n) {
                return Err(PublishError::Rejected {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            bodies.push(body.to_vec());
            Ok(())
        }
    }

    fn deployed(service: &str) -> CanonicalEvent {
        CanonicalEvent {
            event_type: "service.deployed".into(),
            service: service.into(),
            environment: "production".into(),
            ..CanonicalEvent::default()
        }
    }

    #[tokio::test]
    async fn publishes_every_event_in_order() {
        let sink = Recording::default();
        let events = [deployed("a"), deployed("b")];
        let n = relay_events(&sink, &PublishCredentials::default(), &events)
            .await
            .unwrap();
        assert_eq!(n, 2);
        let bodies = sink.bodies.lock().unwrap();
        assert!(String::from_utf8_lossy(&bodies[0]).contains("service/a"));
        assert!(String::from_utf8_lossy(&bodies[1]).contains("service/b"));
    }

    #[tokio::test]
    async fn stops_at_first_publish_failure() {
        let sink = Recording {
            fail_after: Some(1),
            ..Recording::default()
        };
        let events = [deployed("a"), deployed("b"), deployed("c")];
        let err = relay_events(&sink, &PublishCredentials::default(), &events)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Publish(PublishError::Rejected { status: 503, .. })));
        assert_eq!(sink.bodies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn build_failure_is_reported_before_publishing() {
        let sink = Recording::default();
        let mut bad = deployed("a");
        bad.environment.clear();
        let err = relay_events(&sink, &PublishCredentials::default(), &[bad])
            .await
            .unwrap_err();
        assert_eq!(err, RelayError::Build(BuildError::MissingServiceOrEnvironment));
        assert!(sink.bodies.lock().unwrap().is_empty());
    }
}
