//! WebSocket lifecycle: identification state machine, heartbeats, and the
//! per-class receive loops.
//!
//! Every accepted transport walks `Accepted → AwaitingIdentification →
//! Identified(Console|Buzzer) → Closed`. Until the first identifying frame
//! only time-sync and ping probes are answered; everything else is logged and
//! dropped. An unidentified socket is closed with code 4001 once the
//! identification window elapses.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt, stream::SplitStream};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    clock,
    dto::ws::{
        self, BuzzerRegisterPayload, CLOSE_DUPLICATE_ID, CLOSE_IDENT_TIMEOUT, ClientMessage,
        PingPayload, ServerMessage, TimeSyncReqPayload,
    },
    services::{broadcaster, buzzer_service, console_service},
    state::{SharedState, registry::ConsoleHandle},
};

/// What the identification phase resolved the peer into.
enum Identity {
    /// The administrative console.
    Console,
    /// A buzzer device with its registration payload.
    Buzzer(BuzzerRegisterPayload),
}

/// Build a close frame with one of the protocol close codes.
pub(crate) fn close_frame(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

/// Reply to a `TIME_SYNC_REQ` on the peer's writer channel.
pub(crate) fn send_time_sync_res(
    outbound_tx: &mpsc::UnboundedSender<Message>,
    request: TimeSyncReqPayload,
) {
    let echo = clock::sync_echo(request.t1, clock::now_ms());
    broadcaster::send_to_tx(
        outbound_tx,
        &ServerMessage::TimeSyncRes {
            t1: echo.t1,
            t2: echo.t2,
            t3: echo.t3,
        },
    );
}

/// Reply to an application-level `PING` on the peer's writer channel.
pub(crate) fn send_pong(outbound_tx: &mpsc::UnboundedSender<Message>, request: PingPayload) {
    broadcaster::send_to_tx(
        outbound_tx,
        &ServerMessage::Pong {
            t_send: request.t_send,
            t_receive: clock::now_ms(),
        },
    );
}

/// Handle the full lifecycle for one accepted WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let identity = match await_identification(&state, &mut receiver, &outbound_tx).await {
        Some(identity) => identity,
        None => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    match identity {
        Identity::Console => run_console(&state, &mut receiver, &outbound_tx).await,
        Identity::Buzzer(registration) => {
            run_buzzer(&state, &mut receiver, &outbound_tx, registration).await;
        }
    }

    finalize(writer_task, outbound_tx).await;
}

/// Drive the `AwaitingIdentification` state until an identifying frame
/// arrives or the window expires (close 4001).
async fn await_identification(
    state: &SharedState,
    receiver: &mut SplitStream<WebSocket>,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) -> Option<Identity> {
    let deadline = Instant::now() + state.config().identification_timeout();

    loop {
        let frame = match tokio::time::timeout_at(deadline, receiver.next()).await {
            Ok(frame) => frame,
            Err(_) => {
                warn!("identification timed out, closing");
                let _ = outbound_tx.send(close_frame(CLOSE_IDENT_TIMEOUT, "Identification timeout"));
                return None;
            }
        };

        match frame {
            Some(Ok(Message::Text(text))) => match ws::parse_client_message(&text) {
                Ok(ClientMessage::AngularConnect) => return Some(Identity::Console),
                Ok(ClientMessage::BuzzerRegister(payload)) => {
                    return Some(Identity::Buzzer(payload));
                }
                Ok(ClientMessage::TimeSyncReq(payload)) => {
                    send_time_sync_res(outbound_tx, payload);
                }
                Ok(ClientMessage::Ping(payload)) => send_pong(outbound_tx, payload),
                Ok(other) => {
                    warn!(message = ?other, "non-identification message before identification, dropping");
                }
                Err(err) => warn!(error = %err, "failed to parse pre-identification frame"),
            },
            Some(Ok(Message::Ping(payload))) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                warn!(error = %err, "websocket receive error during identification");
                return None;
            }
        }
    }
}

/// Identified-console path: install in the registry, greet, then pump frames.
async fn run_console(
    state: &SharedState,
    receiver: &mut SplitStream<WebSocket>,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) {
    let session_id = Uuid::new_v4().to_string();
    let displaced = state
        .registry()
        .set_console(ConsoleHandle {
            session_id: session_id.clone(),
            tx: outbound_tx.clone(),
        })
        .await;
    if let Some(previous) = displaced {
        info!(session_id = %previous.session_id, "replacing previously connected console");
        let _ = previous.tx.send(Message::Close(None));
    }

    info!(session_id = %session_id, "console connected");

    let config = state.config();
    broadcaster::send_to_tx(
        outbound_tx,
        &ServerMessage::Connected {
            session_id: session_id.clone(),
            server_time: clock::now_ms(),
            config: crate::dto::common::ConsoleConfig {
                max_buzzers: config.max_buzzers,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        },
    );
    broadcaster::send_buzzer_list_update(state).await;

    receive_loop(state, receiver, outbound_tx, |state, message, outbound_tx| {
        console_service::handle(state, message, outbound_tx)
    })
    .await;

    state.registry().clear_console(&session_id).await;
    info!(session_id = %session_id, "console disconnected");
}

/// Identified-buzzer path: register (or reject), announce, then pump frames.
async fn run_buzzer(
    state: &SharedState,
    receiver: &mut SplitStream<WebSocket>,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    registration: BuzzerRegisterPayload,
) {
    let buzzer_id = registration.buzzer_id.clone();
    let registered = state
        .registry()
        .register_buzzer(
            buzzer_id.clone(),
            registration.name,
            registration.mac_address,
            outbound_tx.clone(),
            clock::now_ms(),
            state.config().max_buzzers,
        )
        .await;

    let peer = match registered {
        Ok(peer) => peer,
        Err(err) => {
            warn!(buzzer_id = %buzzer_id, reason = err.reason(), "buzzer registration rejected");
            broadcaster::send_to_tx(
                outbound_tx,
                &ServerMessage::ConnectionRejected {
                    reason: err.reason().to_string(),
                },
            );
            let _ = outbound_tx.send(close_frame(CLOSE_DUPLICATE_ID, "Registration rejected"));
            return;
        }
    };

    info!(buzzer_id = %buzzer_id, player_number = peer.player_number, "buzzer connected");

    broadcaster::send_to_tx(
        outbound_tx,
        &ServerMessage::ConnectionAck {
            buzzer_id: buzzer_id.clone(),
            player_number: peer.player_number,
        },
    );
    broadcaster::send_to_console(
        state,
        &ServerMessage::BuzzerConnected {
            buzzer: peer.summary(),
            total_buzzers: state.registry().buzzer_count(),
        },
    )
    .await;

    receive_loop(state, receiver, outbound_tx, |state, message, outbound_tx| {
        buzzer_service::handle(state, &buzzer_id, message, outbound_tx)
    })
    .await;

    // A stream in flight to this buzzer must not outlive the transport.
    state.jingle_streams().remove(&buzzer_id);
    if state.registry().remove_buzzer(&buzzer_id).is_some() {
        broadcaster::send_to_console(
            state,
            &ServerMessage::BuzzerDisconnected {
                buzzer_id: buzzer_id.clone(),
                total_buzzers: state.registry().buzzer_count(),
            },
        )
        .await;
    }
    info!(buzzer_id = %buzzer_id, "buzzer disconnected");
}

/// Shared post-identification frame pump with the liveness heartbeat.
///
/// Every heartbeat period the liveness flag is checked and cleared and a
/// protocol-level ping goes out; the peer's pong sets the flag back. A peer
/// that misses a full interval is terminated.
async fn receive_loop<'a, H, Fut>(
    state: &'a SharedState,
    receiver: &mut SplitStream<WebSocket>,
    outbound_tx: &'a mpsc::UnboundedSender<Message>,
    mut handler: H,
) where
    H: FnMut(&'a SharedState, ClientMessage, &'a mpsc::UnboundedSender<Message>) -> Fut,
    Fut: Future<Output = ()>,
{
    let period = state.config().heartbeat_interval();
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut alive = true;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if !alive {
                    warn!("peer missed a heartbeat interval, terminating");
                    let _ = outbound_tx.send(Message::Close(None));
                    break;
                }
                alive = false;
                let _ = outbound_tx.send(Message::Ping(Vec::new().into()));
            }
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => match ws::parse_client_message(&text) {
                    Ok(ClientMessage::Unknown) => debug!("unknown message type, dropping"),
                    Ok(message) => handler(state, message, outbound_tx).await,
                    Err(err) => warn!(error = %err, "failed to parse frame, dropping"),
                },
                Some(Ok(Message::Pong(_))) => alive = true,
                Some(Ok(Message::Ping(payload))) => {
                    let _ = outbound_tx.send(Message::Pong(payload));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Binary(_))) => {}
                Some(Err(err)) => {
                    warn!(error = %err, "websocket error");
                    break;
                }
            }
        }
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
