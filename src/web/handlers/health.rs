//! # Health Check Handlers

/// Liveness probe: GET /healthz
///
/// Answers `ok` whenever the process is serving requests. It does not touch
/// the database or the order log.
pub async fn healthz() -> &'static str {
    "ok"
}
