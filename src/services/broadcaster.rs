//! Fan-out helpers: send to the console, to one buzzer, or to all buzzers.
//!
//! All text frames leave through here so the envelope stamping stays in one
//! place. Sends to a closed or missing transport are dropped at warn level;
//! the connection's own read loop notices the closure and cleans up.

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tracing::warn;

use crate::{
    dto::ws::{self, ServerMessage},
    state::SharedState,
};

/// Serialize a message and push it onto a peer's writer channel.
///
/// Serialization failures are permanent (a bug in the message type); they are
/// logged and swallowed. A closed channel is reported so callers tied to that
/// peer can terminate.
pub fn send_to_tx(tx: &mpsc::UnboundedSender<Message>, message: &ServerMessage) -> bool {
    let payload = match ws::encode(message) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{message:?}`");
            return true;
        }
    };
    tx.send(Message::Text(payload.into())).is_ok()
}

/// Push a pre-framed binary chunk onto a peer's writer channel.
pub fn send_binary_to_tx(tx: &mpsc::UnboundedSender<Message>, frame: Vec<u8>) -> bool {
    tx.send(Message::Binary(frame.into())).is_ok()
}

/// Send a message to the console, if one is identified.
pub async fn send_to_console(state: &SharedState, message: &ServerMessage) {
    match state.registry().console_tx().await {
        Some(tx) => {
            if !send_to_tx(&tx, message) {
                warn!("console writer closed, dropping message");
            }
        }
        None => warn!("no console connected, dropping message"),
    }
}

/// Send a message to one buzzer by id.
pub fn send_to_buzzer(state: &SharedState, buzzer_id: &str, message: &ServerMessage) {
    match state.registry().buzzer_tx(buzzer_id) {
        Some(tx) => {
            if !send_to_tx(&tx, message) {
                warn!(buzzer_id, "buzzer writer closed, dropping message");
            }
        }
        None => warn!(buzzer_id, "buzzer not connected, dropping message"),
    }
}

/// Send the same message to every registered buzzer.
pub fn broadcast_to_buzzers(state: &SharedState, message: &ServerMessage) {
    for (buzzer_id, tx) in state.registry().all_buzzer_tx() {
        if !send_to_tx(&tx, message) {
            warn!(buzzer_id, "buzzer writer closed, dropping broadcast");
        }
    }
}

/// Push a fresh registry snapshot to the console.
pub async fn send_buzzer_list_update(state: &SharedState) {
    let buzzers = state.registry().summaries();
    let total = buzzers.len();
    send_to_console(state, &ServerMessage::BuzzerListUpdate { buzzers, total }).await;
}

/// Report a non-fatal failure to the console.
pub async fn send_console_error(state: &SharedState, message: impl Into<String>) {
    send_to_console(
        state,
        &ServerMessage::Error {
            message: message.into(),
        },
    )
    .await;
}
