//! Envelope and message enums for the console/buzzer WebSocket protocol.
//!
//! Text frames are JSON envelopes `{type, timestamp, sender, payload}`. The
//! `type`/`payload` pair maps onto adjacently tagged enums; `timestamp` and
//! `sender` are envelope metadata the deserializer skips on the way in and
//! [`encode`] stamps on the way out. Binary frames (jingle chunks) never pass
//! through here.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::{
    clock,
    dao::models::QuestionType,
    dto::common::{BuzzerSummary, ClientTimestamps, ConsoleConfig},
};

/// `sender` value stamped on every server-originated envelope.
pub const SENDER_SERVER: &str = "SERVER";

/// Close code for the 30-second identification timeout.
pub const CLOSE_IDENT_TIMEOUT: u16 = 4001;
/// Close code for a duplicate buzzer registration.
pub const CLOSE_DUPLICATE_ID: u16 = 4002;
/// Close code for a console-requested buzzer disconnect.
pub const CLOSE_ADMIN_DISCONNECT: u16 = 4003;

/// Messages accepted from console and buzzer clients.
///
/// Which variants are honored depends on the peer's identification state and
/// class; the dispatch lives in the websocket service. Unknown types land in
/// [`ClientMessage::Unknown`] and are logged and dropped, never fatal.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Console identification; carries no payload.
    AngularConnect,
    /// Buzzer identification with its stable device identifier.
    BuzzerRegister(BuzzerRegisterPayload),
    /// Clock synchronization probe, answered pre- and post-identification.
    TimeSyncReq(TimeSyncReqPayload),
    /// Application-level latency probe.
    Ping(PingPayload),
    /// Console asks for a fresh buzzer list snapshot.
    RequestBuzzerList,
    /// Console renames a player.
    PlayerRename(PlayerRenamePayload),
    /// Console dispatches a question to all buzzers.
    QuestionSend(QuestionSendPayload),
    /// Console opens a new game session.
    GameStart(GameStartPayload),
    /// Console forcibly disconnects one buzzer.
    BuzzerDisconnect(BuzzerTargetPayload),
    /// Console validates the current buzz winner's oral answer.
    BuzzCorrect(BuzzJudgementPayload),
    /// Console rejects the current winner and reopens buzzing.
    BuzzReopen(BuzzJudgementPayload),
    /// Console streams a jingle to one buzzer.
    JinglePlay(JinglePlayPayload),
    /// Buzzer submits a multiple-choice answer.
    AnswerMcq(AnswerMcqPayload),
    /// Buzzer presses the button on a rapidity question.
    AnswerBuzzer(AnswerBuzzerPayload),
    /// Buzzer telemetry report.
    StatusUpdate(StatusUpdatePayload),
    /// Any message type this server does not understand.
    #[serde(other)]
    Unknown,
}

/// Payload of `BUZZER_REGISTER`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BuzzerRegisterPayload {
    /// Stable opaque identifier, unique across connected buzzers.
    #[serde(rename = "buzzerID")]
    #[validate(length(min = 1, max = 64))]
    pub buzzer_id: String,
    /// Advisory MAC address reported by the device.
    #[serde(rename = "macAddress", default)]
    pub mac_address: Option<String>,
    /// Optional display name; defaults to the buzzer id.
    #[serde(default)]
    #[validate(length(max = 50))]
    pub name: Option<String>,
}

/// Payload of `TIME_SYNC_REQ`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimeSyncReqPayload {
    /// Client send time, echoed back unchanged.
    #[serde(rename = "T1")]
    pub t1: i64,
}

/// Payload of `PING`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PingPayload {
    /// Client send time, echoed back unchanged.
    #[serde(rename = "T_send")]
    pub t_send: i64,
}

/// Payload of `PLAYER_RENAME`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PlayerRenamePayload {
    /// Buzzer whose player is renamed.
    #[serde(rename = "buzzerID")]
    pub buzzer_id: String,
    /// New display name.
    #[serde(rename = "newName")]
    #[validate(length(min = 1, max = 50))]
    pub new_name: String,
}

/// Payload of `QUESTION_SEND`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSendPayload {
    /// Game the question belongs to.
    pub game_id: String,
    /// Catalog question identifier.
    pub question_id: u32,
}

/// Payload of `GAME_START`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStartPayload {
    /// Opaque game identifier chosen by the console.
    pub game_id: String,
    /// Display name of the game.
    #[serde(default)]
    pub name: Option<String>,
    /// Announced number of questions.
    #[serde(default)]
    pub total_questions: Option<u32>,
}

/// Payload of `BUZZER_DISCONNECT`.
#[derive(Debug, Clone, Deserialize)]
pub struct BuzzerTargetPayload {
    /// Buzzer to act on.
    #[serde(rename = "buzzerID")]
    pub buzzer_id: String,
}

/// Payload of `BUZZ_CORRECT` and `BUZZ_REOPEN`.
#[derive(Debug, Clone, Deserialize)]
pub struct BuzzJudgementPayload {
    /// Game holding the contested question.
    #[serde(rename = "gameId")]
    pub game_id: String,
    /// Question the buzz belongs to.
    #[serde(rename = "questionId")]
    pub question_id: u32,
    /// The judged buzzer.
    #[serde(rename = "buzzerID")]
    pub buzzer_id: String,
}

/// Payload of `JINGLE_PLAY`.
#[derive(Debug, Clone, Deserialize)]
pub struct JinglePlayPayload {
    /// Buzzer receiving the stream.
    #[serde(rename = "buzzerID")]
    pub buzzer_id: String,
    /// Catalog jingle identifier.
    #[serde(rename = "jingleId")]
    pub jingle_id: u32,
}

/// Payload of `ANSWER_MCQ`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerMcqPayload {
    /// Game the answer belongs to.
    pub game_id: String,
    /// Question being answered.
    pub question_id: u32,
    /// Submitted answer text.
    pub answer: String,
    /// Client-side timing data.
    #[serde(default)]
    pub timestamps: ClientTimestamps,
}

/// Payload of `ANSWER_BUZZER`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerBuzzerPayload {
    /// Game the buzz belongs to.
    pub game_id: String,
    /// Question being buzzed on.
    pub question_id: u32,
    /// Client-side timing data.
    #[serde(default)]
    pub timestamps: ClientTimestamps,
}

/// Payload of `STATUS_UPDATE`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StatusUpdatePayload {
    /// Battery percentage.
    #[serde(default)]
    pub battery: Option<i32>,
    /// WiFi signal strength in dBm.
    #[serde(rename = "wifiRSSI", default)]
    pub wifi_rssi: Option<i32>,
    /// Free heap bytes on the device.
    #[serde(rename = "freeHeap", default)]
    pub free_heap: Option<i64>,
}

/// Messages the server pushes to the console and the buzzers.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Console identification acknowledgement.
    Connected {
        /// Fresh session identifier.
        #[serde(rename = "sessionID")]
        session_id: String,
        /// Server wall clock, epoch milliseconds.
        server_time: i64,
        /// Advertised server configuration.
        config: ConsoleConfig,
    },
    /// Full snapshot of the buzzer registry.
    BuzzerListUpdate {
        /// One entry per registered buzzer, in player-number order.
        buzzers: Vec<BuzzerSummary>,
        /// Registry size.
        total: usize,
    },
    /// A buzzer finished registration.
    BuzzerConnected {
        /// The new buzzer.
        buzzer: BuzzerSummary,
        /// Registry size after the insert.
        total_buzzers: usize,
    },
    /// A buzzer's transport closed.
    BuzzerDisconnected {
        /// The departed buzzer.
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        /// Registry size after the removal.
        total_buzzers: usize,
    },
    /// Confirmation that a question went out.
    QuestionSent {
        /// Dispatched question.
        question_id: u32,
        /// Number of buzzers it was sent to.
        sent_to: usize,
        /// Dispatch instant, epoch milliseconds.
        timestamp: i64,
    },
    /// Arbitration elected a winner.
    BuzzWinner {
        /// Winning buzzer.
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        /// Winner's display name.
        player_name: String,
        /// Question the buzz belongs to.
        question_id: u32,
        /// Game holding the question.
        game_id: String,
        /// Winner's question-relative response time, milliseconds.
        response_time: i64,
    },
    /// Outcome of a console judgement on the current winner.
    BuzzValidated {
        /// Judged buzzer.
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        /// Verdict.
        is_correct: bool,
        /// Points awarded.
        points: i32,
        /// Winner's response time, milliseconds.
        response_time: i64,
    },
    /// Buzzing reopened after a wrong answer.
    BuzzReopened {
        /// Buzzers barred from re-buzzing this question.
        excluded_players: Vec<String>,
        /// Buzzers still allowed to buzz.
        remaining_players: Vec<String>,
    },
    /// A jingle stream started.
    JingleStarted {
        /// Receiving buzzer.
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        /// Streamed jingle.
        jingle_id: u32,
        /// Jingle display name.
        name: String,
        /// Total file size in bytes.
        file_size: u64,
    },
    /// A jingle stream ran to completion.
    JingleCompleted {
        /// Receiving buzzer.
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        /// Streamed jingle.
        jingle_id: u32,
        /// Number of chunks delivered.
        total_chunks: u32,
    },
    /// A jingle request or stream failed.
    JingleError {
        /// Target buzzer, when known.
        #[serde(rename = "buzzerID", skip_serializing_if = "Option::is_none")]
        buzzer_id: Option<String>,
        /// Requested jingle, when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        jingle_id: Option<u32>,
        /// Failure description.
        error: String,
    },
    /// A scored answer, relayed to the console.
    AnswerReceived {
        /// Answering buzzer.
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        /// Answered question.
        question_id: u32,
        /// Submitted answer text, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        answer: Option<String>,
        /// Verdict.
        is_correct: bool,
        /// Points awarded.
        points: i32,
        /// Question-relative response time, milliseconds.
        response_time: i64,
        /// Client-side timing data as submitted.
        timestamps: ClientTimestamps,
    },
    /// Telemetry relayed to the console.
    BuzzerStatusUpdate {
        /// Reporting buzzer.
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        /// Battery percentage.
        battery: Option<i32>,
        /// WiFi signal strength in dBm.
        #[serde(rename = "wifiRSSI")]
        wifi_rssi: Option<i32>,
        /// Free heap bytes on the device.
        free_heap: Option<i64>,
    },
    /// Non-fatal failure report for the console.
    Error {
        /// Human-readable description.
        message: String,
    },
    /// Registration acknowledgement for a buzzer.
    ConnectionAck {
        /// Registered buzzer id.
        #[serde(rename = "buzzerID")]
        buzzer_id: String,
        /// Assigned player number (1..N in connection order).
        player_number: usize,
    },
    /// Registration refusal; the transport closes right after.
    ConnectionRejected {
        /// Refusal reason.
        reason: String,
    },
    /// Pushes a renamed player's new display name to its buzzer.
    PlayerNameUpdate {
        /// New display name.
        name: String,
    },
    /// A question dispatched to every buzzer.
    QuestionStart(QuestionStartPayload),
    /// A game session opened.
    GameStarted {
        /// Game identifier.
        game_id: String,
        /// Display name.
        name: String,
        /// Announced number of questions.
        total_questions: u32,
    },
    /// Scoring verdict pushed to the answering buzzer.
    AnswerResult {
        /// Answered question.
        question_id: u32,
        /// Verdict.
        is_correct: bool,
        /// Points awarded.
        points: i32,
        /// Question-relative response time, milliseconds.
        response_time: i64,
    },
    /// A buzz was not taken into account.
    BuzzIgnored {
        /// Why the buzz was dropped.
        reason: String,
    },
    /// Buzzing is locked because a winner was elected.
    BuzzerLocked {
        /// Game holding the question.
        game_id: String,
        /// Locked question.
        question_id: u32,
        /// Elected winner.
        #[serde(rename = "winnerID")]
        winner_id: String,
    },
    /// Buzzing is open again for this buzzer.
    BuzzerUnlocked {
        /// Game holding the question.
        game_id: String,
        /// Reopened question.
        question_id: u32,
    },
    /// This buzzer is barred from the current question.
    BuzzerExcluded {
        /// Game holding the question.
        game_id: String,
        /// Question the exclusion applies to.
        question_id: u32,
        /// Why the buzzer is barred.
        reason: String,
    },
    /// Three-timestamp synchronization reply.
    TimeSyncRes {
        /// Client send time, echoed unchanged.
        #[serde(rename = "T1")]
        t1: i64,
        /// Server receive time.
        #[serde(rename = "T2")]
        t2: i64,
        /// Server transmit time.
        #[serde(rename = "T3")]
        t3: i64,
    },
    /// Application-level latency reply.
    Pong {
        /// Client send time, echoed unchanged.
        #[serde(rename = "T_send")]
        t_send: i64,
        /// Server receive time.
        #[serde(rename = "T_receive")]
        t_receive: i64,
    },
    /// A jingle stream is about to begin on this buzzer.
    JingleStart {
        /// Streamed jingle.
        jingle_id: u32,
        /// Display name.
        name: String,
        /// Audio format, taken from the file extension.
        format: String,
        /// Total file size in bytes.
        file_size: u64,
    },
    /// A jingle stream delivered its last chunk.
    JingleEnd {
        /// Streamed jingle.
        jingle_id: u32,
        /// Number of chunks delivered.
        total_chunks: u32,
        /// Total file size in bytes.
        file_size: u64,
    },
}

/// Payload of `QUESTION_START`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStartPayload {
    /// Game the question belongs to.
    pub game_id: String,
    /// Catalog question identifier.
    pub id: u32,
    /// Question text.
    pub text: String,
    /// MCQ or BUZZER.
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    /// Display category, if any.
    pub category: Option<String>,
    /// Points at stake.
    pub points: i32,
    /// Dispatch instant, epoch milliseconds.
    pub start_time: i64,
    /// MCQ answer choices; absent for rapidity questions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answers: Option<Vec<String>>,
    /// The correct MCQ answer; absent for rapidity questions.
    #[serde(rename = "correct_answer", skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
}

/// Failure modes of [`parse_client_message`].
#[derive(Debug, Error)]
pub enum MessageParseError {
    /// The frame is not a well-formed envelope.
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    /// The payload carried values outside the accepted ranges.
    #[error("invalid payload: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Parse and validate a text frame into a [`ClientMessage`].
///
/// Envelope metadata (`timestamp`, `sender`) is tolerated and ignored; the
/// server trusts only its own clock.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, MessageParseError> {
    let message: ClientMessage = serde_json::from_str(text)?;
    match &message {
        ClientMessage::BuzzerRegister(payload) => payload.validate()?,
        ClientMessage::PlayerRename(payload) => payload.validate()?,
        _ => {}
    }
    Ok(message)
}

/// Serialize a server message into its wire envelope, stamping `timestamp`
/// and `sender`.
pub fn encode(message: &ServerMessage) -> serde_json::Result<String> {
    #[derive(Serialize)]
    struct Envelope<'a> {
        #[serde(flatten)]
        message: &'a ServerMessage,
        timestamp: i64,
        sender: &'static str,
    }

    serde_json::to_string(&Envelope {
        message,
        timestamp: clock::now_ms(),
        sender: SENDER_SERVER,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_buzzer_register_envelope() {
        let text = r#"{
            "type": "BUZZER_REGISTER",
            "timestamp": 1700000000000,
            "sender": "BUZZER",
            "payload": {"buzzerID": "buzzer-07", "macAddress": "AA:BB:CC:DD:EE:FF"}
        }"#;
        match parse_client_message(text).unwrap() {
            ClientMessage::BuzzerRegister(payload) => {
                assert_eq!(payload.buzzer_id, "buzzer-07");
                assert_eq!(payload.mac_address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn parses_console_connect_without_payload() {
        let text = r#"{"type": "ANGULAR_CONNECT", "sender": "ANGULAR"}"#;
        assert!(matches!(
            parse_client_message(text).unwrap(),
            ClientMessage::AngularConnect
        ));
    }

    #[test]
    fn unknown_type_maps_to_unknown_variant() {
        let text = r#"{"type": "SOMETHING_ELSE", "payload": {"x": 1}}"#;
        assert!(matches!(
            parse_client_message(text).unwrap(),
            ClientMessage::Unknown
        ));
    }

    #[test]
    fn rejects_empty_buzzer_id() {
        let text = r#"{"type": "BUZZER_REGISTER", "payload": {"buzzerID": ""}}"#;
        assert!(matches!(
            parse_client_message(text),
            Err(MessageParseError::Validation(_))
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            parse_client_message("{not-json"),
            Err(MessageParseError::Json(_))
        ));
    }

    #[test]
    fn answer_payload_defaults_missing_timestamps() {
        let text = r#"{
            "type": "ANSWER_MCQ",
            "payload": {"gameId": "g1", "questionId": 42, "answer": "Paris"}
        }"#;
        match parse_client_message(text).unwrap() {
            ClientMessage::AnswerMcq(payload) => {
                assert_eq!(payload.answer, "Paris");
                assert!(payload.timestamps.synced.is_none());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn encode_wraps_message_in_envelope() {
        let text = encode(&ServerMessage::BuzzIgnored {
            reason: "buzzers locked".into(),
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "BUZZ_IGNORED");
        assert_eq!(value["sender"], "SERVER");
        assert_eq!(value["payload"]["reason"], "buzzers locked");
        assert!(value["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn time_sync_reply_echoes_t1_on_the_wire() {
        let text = encode(&ServerMessage::TimeSyncRes {
            t1: 111,
            t2: 222,
            t3: 222,
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "TIME_SYNC_RES");
        assert_eq!(value["payload"]["T1"], 111);
        assert_eq!(value["payload"]["T2"], 222);
        assert_eq!(value["payload"]["T3"], 222);
    }

    #[test]
    fn locked_message_uses_winner_id_key() {
        let text = encode(&ServerMessage::BuzzerLocked {
            game_id: "g1".into(),
            question_id: 42,
            winner_id: "b2".into(),
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["payload"]["winnerID"], "b2");
        assert_eq!(value["payload"]["questionId"], 42);
    }
}
