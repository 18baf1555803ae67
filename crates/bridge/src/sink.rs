//! The outbound publishing port.

use async_trait::async_trait;

use crate::{PublishCredentials, PublishError};

/// Delivers one rendered envelope to a tenant's dashboard.
///
/// Credentials travel with every call; implementations must not cache or
/// persist them. One call is one delivery attempt.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Sends `body` exactly as given, signed with the tenant's secret.
    ///
    /// # Errors
    ///
    /// - [`PublishError::MissingConfiguration`] before any I/O when any
    ///   credential is blank.
    /// - [`PublishError::Transport`] or [`PublishError::Rejected`] when the
    ///   delivery fails.
    async fn publish(
        &self,
        credentials: &PublishCredentials,
        body: &[u8],
    ) -> Result<(), PublishError>;
}
