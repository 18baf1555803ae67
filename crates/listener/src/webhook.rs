//! Webhook delivery handler.
//!
//! Steps, in order:
//!
//! 1. Authenticate the raw body (401 on failure).
//! 2. Read the event name and delivery id from the provider's headers.
//! 3. Resolve credentials from the installation/project id on the blocking
//!    pool (500 on store fault).
//! 4. Ignore the delivery when no complete credentials apply.
//! 5. Convert (400 on a malformed payload; empty result is ignored).
//! 6. Build and publish every event (422 on build failure, 502 on delivery).
//!
//! Accepted deliveries answer 202 with `ignored` or `published=<n>`.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use bridge::{relay_events, ConvertConfig, DeliveryId, RelayError};

use crate::signature::verify_delivery;
use crate::{ApiError, AppState};

/// Body of a 202 for a delivery that published nothing.
pub const IGNORED: &str = "ignored";

/// Handles one provider delivery.
#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(
        provider = %state.settings().provider,
        event = tracing::field::Empty,
        delivery = tracing::field::Empty,
        installation_id = tracing::field::Empty,
    )
)]
pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, String), ApiError> {
    let settings = state.settings();
    let provider = settings.provider;

    if !verify_delivery(provider, &headers, &body, &settings.webhook_secret) {
        tracing::warn!("webhook authentication failed");
        return Err(ApiError::unauthorized("invalid signature"));
    }

    let event_name = header_value(&headers, provider.event_header());
    let delivery_id = DeliveryId::new(header_value(&headers, provider.delivery_header()));
    let installation_id = provider.extract_installation_id(&body);

    let span = tracing::Span::current();
    span.record("event", event_name);
    if let Some(id) = &delivery_id {
        span.record("delivery", id.as_str());
    }
    if let Some(id) = installation_id {
        span.record("installation_id", id.as_i64());
    }

    let target = state
        .blocking(move |state| {
            state
                .resolver()
                .resolve(installation_id, &state.settings().defaults)
        })
        .await?
        .map_err(|err| ApiError::internal("mapping resolution failed", &err))?;

    if !target.credentials.is_complete() {
        tracing::warn!("ignoring webhook: no mapping or default publish credentials");
        return Ok(accepted(IGNORED));
    }

    let config = ConvertConfig {
        default_environment: target.default_environment.clone(),
        source: settings.source.clone(),
    };
    let events = provider
        .convert(event_name, delivery_id.as_ref(), &body, &config)
        .map_err(|err| {
            tracing::warn!(error = %err, "rejecting malformed payload");
            ApiError::bad_request(format!("invalid {provider} payload"))
        })?;
    if events.is_empty() {
        return Ok(accepted(IGNORED));
    }

    match relay_events(state.sink(), &target.credentials, &events).await {
        Ok(published) => Ok(accepted(&format!("published={published}"))),
        Err(err) => {
            match &err {
                RelayError::Build(_) => tracing::warn!(error = %err, "converted event rejected"),
                RelayError::Publish(_) => tracing::error!(error = %err, "failed to publish converted event"),
            }
            Err(err.into())
        }
    }
}

fn accepted(message: &str) -> (StatusCode, String) {
    (StatusCode::ACCEPTED, message.to_string())
}

fn header_value<'h>(headers: &'h HeaderMap, name: &str) -> &'h str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default()
}
