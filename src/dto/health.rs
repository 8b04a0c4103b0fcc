use serde::Serialize;
use utoipa::ToSchema;

/// Payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok", or "degraded" while no storage backend is reachable.
    pub status: String,
    /// Storage backend probe result.
    pub storage: StorageHealth,
    pub boards: usize,
    pub active_matches: usize,
    pub sse_subscribers: usize,
}

/// Outcome of the storage probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StorageHealth {
    Ok,
    Unreachable,
    /// No backend installed yet.
    Missing,
}

impl HealthResponse {
    pub fn new(
        degraded: bool,
        storage: StorageHealth,
        boards: usize,
        active_matches: usize,
        sse_subscribers: usize,
    ) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            storage,
            boards,
            active_matches,
            sse_subscribers,
        }
    }
}
