//! Health snapshot assembly for the operational endpoint.

use crate::{dto::health::HealthResponse, state::SharedState};

/// Build the current health snapshot.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    HealthResponse {
        status: "ok",
        console_connected: state.registry().console_connected().await,
        buzzers: state.registry().buzzer_count(),
        active_games: state.game_count(),
        active_jingle_streams: state.jingle_streams().len(),
    }
}
