use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Number of sessions with at least one live realtime connection.
    pub live_sessions: usize,
}

impl HealthResponse {
    /// Build the payload from the degraded flag and the hub's session count.
    pub fn new(degraded: bool, live_sessions: usize) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_owned(),
            live_sessions,
        }
    }
}
