//! Post-identification handlers for buzzer messages.

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tracing::warn;

use crate::{
    dto::ws::{ClientMessage, ServerMessage, StatusUpdatePayload},
    services::{broadcaster, game_service, websocket_service},
    state::SharedState,
};

/// Dispatch one parsed message from an identified buzzer.
pub async fn handle(
    state: &SharedState,
    buzzer_id: &str,
    message: ClientMessage,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) {
    match message {
        ClientMessage::AnswerMcq(payload) => {
            game_service::handle_answer_mcq(state, buzzer_id, payload).await;
        }
        ClientMessage::AnswerBuzzer(payload) => {
            game_service::handle_answer_buzzer(state, buzzer_id, payload).await;
        }
        ClientMessage::TimeSyncReq(payload) => {
            websocket_service::send_time_sync_res(outbound_tx, payload);
        }
        ClientMessage::Ping(payload) => websocket_service::send_pong(outbound_tx, payload),
        ClientMessage::StatusUpdate(payload) => {
            handle_status_update(state, buzzer_id, payload).await;
        }
        ClientMessage::BuzzerRegister(_) => {
            warn!(buzzer_id, "ignoring duplicate identification message");
        }
        other => warn!(buzzer_id, message = ?other, "unhandled buzzer message, dropping"),
    }
}

/// Store telemetry on the registry entry and relay it to the console.
async fn handle_status_update(state: &SharedState, buzzer_id: &str, payload: StatusUpdatePayload) {
    state.registry().update_telemetry(buzzer_id, payload);
    broadcaster::send_to_console(
        state,
        &ServerMessage::BuzzerStatusUpdate {
            buzzer_id: buzzer_id.to_string(),
            battery: payload.battery,
            wifi_rssi: payload.wifi_rssi,
            free_heap: payload.free_heap,
        },
    )
    .await;
}
