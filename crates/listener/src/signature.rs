//! Inbound webhook authentication.
//!
//! GitHub signs each delivery with HMAC-SHA256 over the raw body and sends
//! `X-Hub-Signature-256: sha256=<hex>`. GitLab echoes the configured secret
//! token verbatim in `X-Gitlab-Token`. Both checks run before the body is
//! parsed, and both compare in constant time.

use axum::http::HeaderMap;
use bridge::Provider;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// `sha256=<hex>` HMAC of the raw body.
pub const GITHUB_SIGNATURE_HEADER: &str = "x-hub-signature-256";
/// Shared secret sent verbatim by GitLab.
pub const GITLAB_TOKEN_HEADER: &str = "x-gitlab-token";

/// Decodes a `sha256=<hex>` header value into raw MAC bytes.
///
/// The prefix is matched case-insensitively and surrounding whitespace is
/// ignored. Returns `None` for any other shape.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let header = header.trim();
    let (prefix, hex_sig) = header.split_at_checked("sha256=".len())?;
    if !prefix.eq_ignore_ascii_case("sha256=") {
        return None;
    }
    hex::decode(hex_sig).ok()
}

/// Renders the `X-Hub-Signature-256` value GitHub would send for `payload`.
///
/// Returns `None` only if the MAC cannot be keyed, which HMAC never refuses.
pub fn github_signature_header(payload: &[u8], secret: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Checks a GitHub signature header against `payload`.
///
/// A blank `secret` never verifies.
pub fn verify_github(payload: &[u8], header: Option<&str>, secret: &[u8]) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Some(expected) = header.and_then(parse_signature_header) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Checks a GitLab `X-Gitlab-Token` header against the configured token.
///
/// Both sides are trimmed. A blank configured token never verifies.
pub fn verify_gitlab(header: Option<&str>, token: &str) -> bool {
    let token = token.trim();
    if token.is_empty() {
        return false;
    }
    let Some(received) = header.map(str::trim) else {
        return false;
    };
    received.as_bytes().ct_eq(token.as_bytes()).into()
}

/// Authenticates one delivery for `provider` using its header convention.
pub fn verify_delivery(provider: Provider, headers: &HeaderMap, body: &[u8], secret: &str) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    match provider {
        Provider::GitHub => verify_github(body, header(GITHUB_SIGNATURE_HEADER), secret.trim().as_bytes()),
        Provider::GitLab => verify_gitlab(header(GITLAB_TOKEN_HEADER), secret),
    }
}
