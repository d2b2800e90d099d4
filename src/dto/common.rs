//! Payload fragments shared by several wire messages.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One buzzer as reported to the console in list updates and announcements.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuzzerSummary {
    /// Stable opaque buzzer identifier.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Connection instant, epoch milliseconds.
    pub connected_at: i64,
    /// Last reported battery percentage.
    pub battery: Option<i32>,
    /// Last reported WiFi signal strength in dBm.
    #[serde(rename = "wifiRSSI")]
    pub wifi_rssi: Option<i32>,
    /// Last measured round-trip latency in milliseconds.
    pub latency: Option<i64>,
    /// Whether the transport is currently open.
    pub connected: bool,
}

/// Client-side timestamps attached to answers and buzzes.
///
/// `synced` is the client clock corrected by the three-timestamp exchange and
/// is what response times are computed from; `local` is the uncorrected
/// device clock kept for diagnostics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientTimestamps {
    /// Uncorrected device clock, epoch milliseconds.
    #[serde(default)]
    pub local: Option<i64>,
    /// Offset-corrected clock, epoch milliseconds.
    #[serde(default)]
    pub synced: Option<i64>,
    /// Latency the device measured during calibration, milliseconds.
    #[serde(default)]
    pub calibrated_latency: Option<i64>,
}

/// Server configuration advertised to the console on `CONNECTED`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleConfig {
    /// Maximum number of buzzer devices the registry accepts.
    pub max_buzzers: usize,
    /// Server version string.
    pub version: String,
}
