//! Post-identification handlers for console messages.

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    dto::ws::{
        BuzzerTargetPayload, CLOSE_ADMIN_DISCONNECT, ClientMessage, PlayerRenamePayload,
        ServerMessage,
    },
    error::ServiceError,
    services::{broadcaster, game_service, jingle_service, websocket_service},
    state::SharedState,
};

/// Relay a failed console command back as an `ERROR` message.
async fn report(state: &SharedState, result: Result<(), ServiceError>) {
    if let Err(err) = result {
        warn!(error = %err, "console command failed");
        broadcaster::send_console_error(state, err.to_string()).await;
    }
}

/// Dispatch one parsed console message.
pub async fn handle(
    state: &SharedState,
    message: ClientMessage,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) {
    match message {
        ClientMessage::RequestBuzzerList => broadcaster::send_buzzer_list_update(state).await,
        ClientMessage::PlayerRename(payload) => handle_player_rename(state, payload).await,
        ClientMessage::QuestionSend(payload) => {
            report(state, game_service::handle_question_send(state, payload).await).await;
        }
        ClientMessage::GameStart(payload) => game_service::handle_game_start(state, payload).await,
        ClientMessage::BuzzCorrect(payload) => {
            report(state, game_service::handle_buzz_correct(state, payload).await).await;
        }
        ClientMessage::BuzzReopen(payload) => {
            report(state, game_service::handle_buzz_reopen(state, payload).await).await;
        }
        ClientMessage::JinglePlay(payload) => {
            jingle_service::handle_jingle_play(state, payload).await;
        }
        ClientMessage::BuzzerDisconnect(payload) => handle_buzzer_disconnect(state, payload).await,
        ClientMessage::TimeSyncReq(payload) => {
            websocket_service::send_time_sync_res(outbound_tx, payload);
        }
        ClientMessage::Ping(payload) => websocket_service::send_pong(outbound_tx, payload),
        ClientMessage::AngularConnect => {
            debug!("ignoring duplicate console identification");
        }
        other => warn!(message = ?other, "unhandled console message, dropping"),
    }
}

/// Rename the player behind a buzzer and push the update both ways.
async fn handle_player_rename(state: &SharedState, payload: PlayerRenamePayload) {
    match state
        .registry()
        .rename_buzzer(&payload.buzzer_id, &payload.new_name)
    {
        Ok(buzzer_tx) => {
            state
                .rename_player(&payload.buzzer_id, &payload.new_name)
                .await;
            broadcaster::send_to_tx(
                &buzzer_tx,
                &ServerMessage::PlayerNameUpdate {
                    name: payload.new_name,
                },
            );
            broadcaster::send_buzzer_list_update(state).await;
        }
        Err(err) => report(state, Err(err)).await,
    }
}

/// Close a buzzer's transport at the console's request (code 4003).
async fn handle_buzzer_disconnect(state: &SharedState, payload: BuzzerTargetPayload) {
    match state.registry().buzzer_tx(&payload.buzzer_id) {
        Some(buzzer_tx) => {
            let _ = buzzer_tx.send(websocket_service::close_frame(
                CLOSE_ADMIN_DISCONNECT,
                "Disconnected by administrator",
            ));
        }
        None => {
            broadcaster::send_console_error(
                state,
                format!("buzzer `{}` not found", payload.buzzer_id),
            )
            .await;
        }
    }
}
