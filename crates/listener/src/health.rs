//! Liveness check.

/// Always returns 200 `ok` while the process is serving.
pub async fn health_handler() -> &'static str {
    "ok"
}
