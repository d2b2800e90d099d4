//! Health endpoint response body.

use serde::Serialize;
use utoipa::ToSchema;

/// Snapshot returned by `/healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` while the process is serving.
    pub status: &'static str,
    /// Whether a console is currently identified.
    pub console_connected: bool,
    /// Number of registered buzzers.
    pub buzzers: usize,
    /// Number of in-memory game sessions.
    pub active_games: usize,
    /// Number of jingle streams currently in flight.
    pub active_jingle_streams: usize,
}
