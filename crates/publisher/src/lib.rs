//! Outbound CDEvents delivery over HTTP.
//!
//! Implements [`bridge::EventSink`] with `reqwest`. Each call signs the body
//! with the tenant's webhook secret and sends one POST to
//! `<endpoint>/webhooks/cdevents`. There are no retries; callers decide what a
//! failure means.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** The domain crate never sees `reqwest` or `hmac`.

use std::time::Duration;

use async_trait::async_trait;
use bridge::{EventSink, PublishCredentials, PublishError};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Path appended to the tenant endpoint.
pub const CDEVENTS_PATH: &str = "/webhooks/cdevents";

/// Header carrying the hex HMAC-SHA256 of the body.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Default end-to-end request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest response body kept in [`PublishError::Rejected`].
pub const MAX_ERROR_BODY_BYTES: usize = 512;

/// Signs `body` with `secret`, returning lower-case hex.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, PublishError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PublishError::Transport(format!("invalid signing key: {e}")))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Builds the delivery URL, tolerating a trailing slash on `endpoint`.
pub fn delivery_url(endpoint: &str) -> String {
    format!("{}{CDEVENTS_PATH}", endpoint.trim().trim_end_matches('/'))
}

/// HTTP publisher shared by all tenants. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CdEventsPublisher {
    client: reqwest::Client,
}

impl CdEventsPublisher {
    /// Creates a publisher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EventSink for CdEventsPublisher {
    async fn publish(
        &self,
        credentials: &PublishCredentials,
        body: &[u8],
    ) -> Result<(), PublishError> {
        if !credentials.is_complete() {
            return Err(PublishError::MissingConfiguration);
        }
        let url = delivery_url(&credentials.endpoint);
        let signature = sign(credentials.webhook_secret.trim(), body)?;

        let response = self
            .client
            .post(&url)
            .bearer_auth(credentials.auth_token.trim())
            .header(SIGNATURE_HEADER, signature)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(%url, error = %e, "cdevents delivery failed");
                PublishError::Transport(e.to_string())
            })?;

        let status = response.status();
        if status.as_u16() >= 300 {
            // A body that cannot be read still leaves the status to report.
            let text = response.text().await.unwrap_or_default();
            let body = truncate_on_char_boundary(text.trim(), MAX_ERROR_BODY_BYTES).to_string();
            tracing::warn!(%url, status = status.as_u16(), "cdevents delivery rejected");
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        tracing::debug!(%url, status = status.as_u16(), "cdevents delivered");
        Ok(())
    }
}

fn truncate_on_char_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sign_matches_known_vector() {
        // RFC 4231 test case 2.
        assert_eq!(
            sign("Jefe", b"what do ya want for nothing?").unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn delivery_url_strips_trailing_slashes() {
        assert_eq!(
            delivery_url("https://dash.example/"),
            "https://dash.example/webhooks/cdevents"
        );
        assert_eq!(
            delivery_url(" https://dash.example "),
            "https://dash.example/webhooks/cdevents"
        );
    }

    #[test]
    fn truncation_respects_multibyte_chars() {
        let text = "é".repeat(300);
        let cut = truncate_on_char_boundary(&text, MAX_ERROR_BODY_BYTES);
        assert!(cut.len() <= MAX_ERROR_BODY_BYTES);
        assert_eq!(cut.len() % 2, 0);
    }

    proptest! {
        #[test]
        fn truncation_never_exceeds_limit(text in "\\PC{0,700}", max in 0usize..600) {
            let cut = truncate_on_char_boundary(&text, max);
            prop_assert!(cut.len() <= max);
            prop_assert!(text.starts_with(cut));
        }
    }
}
