//! Session engine orchestration: question dispatch, answer scoring, and buzz
//! arbitration over the pure state in [`crate::state::session`].
//!
//! Every handler follows the same discipline: catalog lookups happen before
//! the per-game lock is taken, the lock is held only for synchronous state
//! mutation, and all fan-out happens after it is released. The result writer
//! is best-effort; its failures are logged and the in-memory session stays
//! authoritative.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    clock,
    dao::models::{DEFAULT_POINTS, QuestionEntity, QuestionType, ResultEntity},
    dto::{
        common::ClientTimestamps,
        ws::{
            AnswerBuzzerPayload, AnswerMcqPayload, BuzzJudgementPayload, GameStartPayload,
            QuestionSendPayload, QuestionStartPayload, ServerMessage,
        },
    },
    error::ServiceError,
    services::broadcaster,
    state::{SharedState, session::BuzzAttempt, session::GameSession},
};

/// Open (or reopen) a game session and announce it to every buzzer.
pub async fn handle_game_start(state: &SharedState, payload: GameStartPayload) {
    let game = state.game_or_create(&payload.game_id);
    let (name, total_questions) = {
        let mut session = game.lock().await;
        if let Some(name) = payload.name {
            session.name = name;
        }
        session.total_questions = payload.total_questions.or(session.total_questions);
        session.status = crate::state::session::GameStatus::Started;
        (session.name.clone(), session.total_questions.unwrap_or(0))
    };

    broadcaster::broadcast_to_buzzers(
        state,
        &ServerMessage::GameStarted {
            game_id: payload.game_id,
            name,
            total_questions,
        },
    );
}

/// Dispatch a question: reset the runtime state and fan `QUESTION_START` out
/// to every connected buzzer, then confirm to the console.
pub async fn handle_question_send(
    state: &SharedState,
    payload: QuestionSendPayload,
) -> Result<(), ServiceError> {
    let question = lookup_question(state, payload.question_id)
        .await
        .ok_or_else(|| ServiceError::NotFound(format!("question `{}`", payload.question_id)))?;

    let started_at = clock::now_ms();
    let game = state.game_or_create(&payload.game_id);
    game.lock().await.reset_question(question.id, started_at);

    let (answers, correct_answer) = match question.question_type {
        QuestionType::Mcq => (question.decoded_answers(), question.correct_answer.clone()),
        QuestionType::Buzzer => (None, None),
    };

    let start = ServerMessage::QuestionStart(QuestionStartPayload {
        game_id: payload.game_id,
        id: question.id,
        text: question.text.clone(),
        question_type: question.question_type,
        category: question.category.clone(),
        points: question.points_or_default(),
        start_time: started_at,
        answers,
        correct_answer,
    });

    let sent_to = state.registry().buzzer_count();
    broadcaster::broadcast_to_buzzers(state, &start);
    broadcaster::send_to_console(
        state,
        &ServerMessage::QuestionSent {
            question_id: question.id,
            sent_to,
            timestamp: started_at,
        },
    )
    .await;
    Ok(())
}

/// Score a submitted answer and relay the verdict to both sides.
///
/// Duplicates (a second answer from the same buzzer within one question) are
/// dropped without state mutation or any outbound message.
pub async fn handle_answer_mcq(state: &SharedState, buzzer_id: &str, payload: AnswerMcqPayload) {
    let Some(game) = state.find_game(&payload.game_id) else {
        warn!(game_id = %payload.game_id, buzzer_id, "answer for unknown game");
        broadcaster::send_console_error(state, format!("game `{}` not found", payload.game_id))
            .await;
        return;
    };

    let Some(question) = lookup_question(state, payload.question_id).await else {
        broadcaster::send_console_error(
            state,
            format!("question `{}` not found", payload.question_id),
        )
        .await;
        return;
    };

    record_latency(state, buzzer_id, &payload.timestamps);

    let name = display_name(state, &game, buzzer_id).await;
    let now = clock::now_ms();
    let scored = {
        let mut session = game.lock().await;
        if session.question.question_id != Some(payload.question_id) {
            warn!(
                buzzer_id,
                question_id = payload.question_id,
                "answer for a question that is not live"
            );
            return;
        }
        if session.has_answered(buzzer_id) {
            debug!(buzzer_id, question_id = payload.question_id, "duplicate answer dropped");
            return;
        }

        let is_correct = match question.question_type {
            QuestionType::Mcq => {
                question.correct_answer.as_deref() == Some(payload.answer.as_str())
            }
            // A rapidity question posted through the answer path: first in wins.
            QuestionType::Buzzer => session.answer_count() == 0,
        };
        let response_time_ms = session.answer_response_time(&payload.timestamps, now);
        let points = if is_correct {
            question.points_or_default()
        } else {
            0
        };
        session.register_answer(
            buzzer_id,
            &name,
            Some(payload.answer.clone()),
            is_correct,
            points,
            response_time_ms,
        );
        (is_correct, points, response_time_ms)
    };
    let (is_correct, points, response_time_ms) = scored;

    persist_result(
        state,
        ResultEntity {
            game_id: payload.game_id.clone(),
            question_id: payload.question_id,
            buzzer_id: buzzer_id.to_string(),
            player_name: name,
            answer: Some(payload.answer.clone()),
            is_correct,
            points,
            response_time_ms,
            created_at: clock::now_ms(),
        },
    )
    .await;

    broadcaster::send_to_buzzer(
        state,
        buzzer_id,
        &ServerMessage::AnswerResult {
            question_id: payload.question_id,
            is_correct,
            points,
            response_time: response_time_ms,
        },
    );
    broadcaster::send_to_console(
        state,
        &ServerMessage::AnswerReceived {
            buzzer_id: buzzer_id.to_string(),
            question_id: payload.question_id,
            answer: Some(payload.answer),
            is_correct,
            points,
            response_time: response_time_ms,
            timestamps: payload.timestamps,
        },
    )
    .await;
}

/// Record a buzz and, if this is the first of its window, arm the
/// simultaneity timer that elects the winner.
pub async fn handle_answer_buzzer(
    state: &SharedState,
    buzzer_id: &str,
    payload: AnswerBuzzerPayload,
) {
    let Some(game) = state.find_game(&payload.game_id) else {
        send_buzz_ignored(state, buzzer_id, "no active question");
        return;
    };

    record_latency(state, buzzer_id, &payload.timestamps);

    let now = clock::now_ms();
    let attempt = {
        let mut session = game.lock().await;
        if session.question.question_id != Some(payload.question_id) {
            BuzzAttempt::Ignored {
                reason: "no active question",
            }
        } else {
            session.record_buzz(buzzer_id, payload.timestamps, now)
        }
    };

    match attempt {
        BuzzAttempt::Ignored { reason } => {
            debug!(buzzer_id, reason, "buzz ignored");
            send_buzz_ignored(state, buzzer_id, reason);
        }
        BuzzAttempt::Pending {
            arm_timer, epoch, ..
        } => {
            if arm_timer {
                spawn_evaluation(
                    Arc::clone(state),
                    game,
                    payload.game_id,
                    payload.question_id,
                    epoch,
                );
            }
        }
    }
}

/// Single-shot evaluation armed by the first eligible buzz of a window.
///
/// The sleep is wall-clock; the epoch guard turns the callback into a no-op
/// when the question advanced (or the session reset) before it fired.
fn spawn_evaluation(
    state: SharedState,
    game: Arc<Mutex<GameSession>>,
    game_id: String,
    question_id: u32,
    epoch: u64,
) {
    let window = state.config().buzz_window();
    tokio::spawn(async move {
        tokio::time::sleep(window).await;

        let elected = {
            let mut session = game.lock().await;
            if session.question.epoch != epoch {
                debug!(game_id = %game_id, question_id, "stale evaluation timer, skipping");
                return;
            }
            match session.evaluate_buzzes() {
                Some(winner) => {
                    let name = session
                        .players
                        .get(&winner.buzzer_id)
                        .map(|player| player.name.clone());
                    (winner, name)
                }
                None => return,
            }
        };
        let (winner, known_name) = elected;
        let player_name = known_name
            .or_else(|| state.registry().buzzer_name(&winner.buzzer_id))
            .unwrap_or_else(|| winner.buzzer_id.clone());

        broadcaster::broadcast_to_buzzers(
            &state,
            &ServerMessage::BuzzerLocked {
                game_id: game_id.clone(),
                question_id,
                winner_id: winner.buzzer_id.clone(),
            },
        );
        broadcaster::send_to_console(
            &state,
            &ServerMessage::BuzzWinner {
                buzzer_id: winner.buzzer_id,
                player_name,
                question_id,
                game_id,
                response_time: winner.response_time_ms,
            },
        )
        .await;
    });
}

/// Console validated the winner's oral answer: score it and resolve the question.
pub async fn handle_buzz_correct(
    state: &SharedState,
    payload: BuzzJudgementPayload,
) -> Result<(), ServiceError> {
    let game = state
        .find_game(&payload.game_id)
        .ok_or_else(|| ServiceError::NotFound(format!("game `{}`", payload.game_id)))?;

    // Default to ten points when the catalog no longer knows the question.
    let points = match lookup_question(state, payload.question_id).await {
        Some(question) => question.points_or_default(),
        None => DEFAULT_POINTS,
    };

    let name = display_name(state, &game, &payload.buzzer_id).await;
    let mut session = game.lock().await;
    let verdict = match session.question.current_winner.as_deref() {
        Some(winner_id) if winner_id == payload.buzzer_id => Ok(()),
        Some(winner_id) => Err(ServiceError::InvalidState(format!(
            "buzzer `{}` is not the current winner (`{winner_id}` is)",
            payload.buzzer_id
        ))),
        None => Err(ServiceError::InvalidState(
            "no buzz winner to validate".into(),
        )),
    };
    verdict?;

    let validated = session
        .winner_buzz()
        .map(|buzz| buzz.response_time_ms)
        .unwrap_or(0);
    // The answer set is append-only within a question: a winner that already
    // holds a scored answer is not counted twice.
    let fresh = !session.has_answered(&payload.buzzer_id);
    if fresh {
        session.register_answer(&payload.buzzer_id, &name, None, true, points, validated);
    }
    session.clear_lock();
    drop(session);

    if fresh {
        persist_result(
            state,
            ResultEntity {
                game_id: payload.game_id.clone(),
                question_id: payload.question_id,
                buzzer_id: payload.buzzer_id.clone(),
                player_name: name,
                answer: None,
                is_correct: true,
                points,
                response_time_ms: validated,
                created_at: clock::now_ms(),
            },
        )
        .await;
    }

    broadcaster::send_to_buzzer(
        state,
        &payload.buzzer_id,
        &ServerMessage::AnswerResult {
            question_id: payload.question_id,
            is_correct: true,
            points,
            response_time: validated,
        },
    );
    broadcaster::send_to_console(
        state,
        &ServerMessage::BuzzValidated {
            buzzer_id: payload.buzzer_id.clone(),
            is_correct: true,
            points,
            response_time: validated,
        },
    )
    .await;
    broadcaster::broadcast_to_buzzers(
        state,
        &ServerMessage::BuzzerUnlocked {
            game_id: payload.game_id,
            question_id: payload.question_id,
        },
    );
    Ok(())
}

/// Console rejected the winner's answer: record the miss, bar the buzzer from
/// this question, and reopen buzzing for everyone else.
pub async fn handle_buzz_reopen(
    state: &SharedState,
    payload: BuzzJudgementPayload,
) -> Result<(), ServiceError> {
    let game = state
        .find_game(&payload.game_id)
        .ok_or_else(|| ServiceError::NotFound(format!("game `{}`", payload.game_id)))?;

    let name = display_name(state, &game, &payload.buzzer_id).await;
    let (response_time_ms, fresh, excluded) = {
        let mut session = game.lock().await;
        let response_time_ms = session
            .question
            .pending_buzzes
            .iter()
            .rev()
            .find(|buzz| buzz.buzzer_id == payload.buzzer_id)
            .map(|buzz| buzz.response_time_ms)
            .unwrap_or(0);
        let fresh = !session.has_answered(&payload.buzzer_id);
        if fresh {
            session.register_answer(&payload.buzzer_id, &name, None, false, 0, response_time_ms);
        }
        session.exclude_player(&payload.buzzer_id);
        (response_time_ms, fresh, session.excluded_players())
    };

    if fresh {
        persist_result(
            state,
            ResultEntity {
                game_id: payload.game_id.clone(),
                question_id: payload.question_id,
                buzzer_id: payload.buzzer_id.clone(),
                player_name: name,
                answer: None,
                is_correct: false,
                points: 0,
                response_time_ms,
                created_at: clock::now_ms(),
            },
        )
        .await;
    }

    let remaining: Vec<String> = state
        .registry()
        .all_buzzer_tx()
        .into_iter()
        .map(|(id, _)| id)
        .filter(|id| !excluded.contains(id))
        .collect();

    for buzzer_id in &excluded {
        broadcaster::send_to_buzzer(
            state,
            buzzer_id,
            &ServerMessage::BuzzerExcluded {
                game_id: payload.game_id.clone(),
                question_id: payload.question_id,
                reason: "wrong answer".into(),
            },
        );
    }
    for buzzer_id in &remaining {
        broadcaster::send_to_buzzer(
            state,
            buzzer_id,
            &ServerMessage::BuzzerUnlocked {
                game_id: payload.game_id.clone(),
                question_id: payload.question_id,
            },
        );
    }
    broadcaster::send_to_console(
        state,
        &ServerMessage::BuzzReopened {
            excluded_players: excluded,
            remaining_players: remaining,
        },
    )
    .await;
    Ok(())
}

fn send_buzz_ignored(state: &SharedState, buzzer_id: &str, reason: &str) {
    broadcaster::send_to_buzzer(
        state,
        buzzer_id,
        &ServerMessage::BuzzIgnored {
            reason: reason.to_string(),
        },
    );
}

async fn lookup_question(state: &SharedState, question_id: u32) -> Option<QuestionEntity> {
    match state.catalog().find_question(question_id).await {
        Ok(found) => found,
        Err(err) => {
            warn!(question_id, error = %err, "question lookup failed");
            None
        }
    }
}

/// Best display name for a buzzer: in-game player name, then registry name,
/// then the raw id.
async fn display_name(
    state: &SharedState,
    game: &Arc<Mutex<GameSession>>,
    buzzer_id: &str,
) -> String {
    let known = {
        let session = game.lock().await;
        session
            .players
            .get(buzzer_id)
            .map(|player| player.name.clone())
    };
    known
        .or_else(|| state.registry().buzzer_name(buzzer_id))
        .unwrap_or_else(|| buzzer_id.to_string())
}

async fn persist_result(state: &SharedState, result: ResultEntity) {
    if let Err(err) = state.results().insert_result(result).await {
        warn!(error = %err, "failed to persist result; in-memory state stays authoritative");
    }
}

/// Update the registry latency estimate when the client reported one.
fn record_latency(state: &SharedState, buzzer_id: &str, timestamps: &ClientTimestamps) {
    if let Some(latency) = timestamps.calibrated_latency {
        state.registry().update_latency(buzzer_id, latency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use axum::extract::ws::Message;
    use futures::future::BoxFuture;
    use tokio::sync::mpsc;

    use crate::{
        config::AppConfig,
        dao::{
            file::FileCatalog,
            models::JingleEntity,
            store::{ResultStore, StorageResult},
        },
        state::{AppState, registry::ConsoleHandle},
    };

    /// Result store capturing inserts for assertions.
    #[derive(Default)]
    struct RecordingResults {
        rows: Arc<StdMutex<Vec<ResultEntity>>>,
    }

    impl ResultStore for RecordingResults {
        fn insert_result(&self, result: ResultEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.rows.lock().unwrap().push(result);
            Box::pin(async { Ok(()) })
        }
    }

    fn mcq_question(id: u32) -> QuestionEntity {
        QuestionEntity {
            id,
            text: "capital of France?".into(),
            question_type: QuestionType::Mcq,
            category: Some("geo".into()),
            points: Some(15),
            answers: Some(serde_json::json!(r#"["Paris","Lyon","Nice"]"#)),
            correct_answer: Some("Paris".into()),
        }
    }

    fn buzzer_question(id: u32) -> QuestionEntity {
        QuestionEntity {
            id,
            text: "first to buzz".into(),
            question_type: QuestionType::Buzzer,
            category: None,
            points: None,
            answers: None,
            correct_answer: None,
        }
    }

    struct Harness {
        state: SharedState,
        console_rx: mpsc::UnboundedReceiver<Message>,
        rows: Arc<StdMutex<Vec<ResultEntity>>>,
    }

    async fn harness(questions: Vec<QuestionEntity>) -> Harness {
        let results = RecordingResults::default();
        let rows = Arc::clone(&results.rows);
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(FileCatalog::from_entities(questions, Vec::<JingleEntity>::new())),
            Arc::new(results),
        );
        let (tx, console_rx) = mpsc::unbounded_channel();
        state
            .registry()
            .set_console(ConsoleHandle {
                session_id: "test-console".into(),
                tx,
            })
            .await;
        Harness {
            state,
            console_rx,
            rows,
        }
    }

    async fn add_buzzer(state: &SharedState, id: &str) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        state
            .registry()
            .register_buzzer(id.into(), None, None, tx, 0, 10)
            .await
            .unwrap();
        rx
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let Message::Text(text) = message {
                frames.push(serde_json::from_str(&text).unwrap());
            }
        }
        frames
    }

    fn types(frames: &[serde_json::Value]) -> Vec<String> {
        frames
            .iter()
            .map(|frame| frame["type"].as_str().unwrap().to_string())
            .collect()
    }

    fn synced(at_ms: i64) -> ClientTimestamps {
        ClientTimestamps {
            local: Some(at_ms),
            synced: Some(at_ms),
            calibrated_latency: None,
        }
    }

    async fn dispatch_question(harness: &mut Harness, game_id: &str, question_id: u32) {
        handle_question_send(
            &harness.state,
            QuestionSendPayload {
                game_id: game_id.into(),
                question_id,
            },
        )
        .await
        .unwrap();
        // Pin the question start for deterministic response times.
        let game = harness.state.find_game(game_id).unwrap();
        game.lock().await.question.started_at = 1_000;
        drain(&mut harness.console_rx);
    }

    fn buzz(game_id: &str, question_id: u32) -> AnswerBuzzerPayload {
        AnswerBuzzerPayload {
            game_id: game_id.into(),
            question_id,
            timestamps: ClientTimestamps::default(),
        }
    }

    #[tokio::test]
    async fn question_send_reaches_each_buzzer_once_and_confirms() {
        let mut harness = harness(vec![mcq_question(42)]).await;
        let mut b1 = add_buzzer(&harness.state, "b1").await;
        let mut b2 = add_buzzer(&harness.state, "b2").await;

        handle_question_send(
            &harness.state,
            QuestionSendPayload {
                game_id: "g1".into(),
                question_id: 42,
            },
        )
        .await
        .unwrap();

        for rx in [&mut b1, &mut b2] {
            let frames = drain(rx);
            assert_eq!(types(&frames), vec!["QUESTION_START"]);
            let payload = &frames[0]["payload"];
            assert_eq!(payload["id"], 42);
            assert_eq!(payload["type"], "MCQ");
            assert_eq!(payload["points"], 15);
            assert_eq!(payload["answers"][0], "Paris");
            assert_eq!(payload["correct_answer"], "Paris");
        }

        let console = drain(&mut harness.console_rx);
        assert_eq!(types(&console), vec!["QUESTION_SENT"]);
        assert_eq!(console[0]["payload"]["sentTo"], 2);
    }

    #[tokio::test]
    async fn unknown_question_fails_and_sends_nothing() {
        let mut harness = harness(vec![]).await;
        let mut b1 = add_buzzer(&harness.state, "b1").await;

        let err = handle_question_send(
            &harness.state,
            QuestionSendPayload {
                game_id: "g1".into(),
                question_id: 9,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(drain(&mut b1).is_empty());
        assert!(drain(&mut harness.console_rx).is_empty());
        // No session springs into existence for a rejected dispatch either.
        assert!(harness.state.find_game("g1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn single_buzz_wins_after_the_window() {
        let mut harness = harness(vec![buzzer_question(42)]).await;
        let mut b1 = add_buzzer(&harness.state, "b1").await;
        dispatch_question(&mut harness, "g1", 42).await;
        drain(&mut b1);

        let mut payload = buzz("g1", 42);
        payload.timestamps = synced(1_300);
        handle_answer_buzzer(&harness.state, "b1", payload).await;

        // Inside the window nothing is decided yet.
        assert!(drain(&mut harness.console_rx).is_empty());

        tokio::time::sleep(Duration::from_millis(250)).await;

        let frames = drain(&mut b1);
        assert_eq!(types(&frames), vec!["BUZZER_LOCKED"]);
        assert_eq!(frames[0]["payload"]["winnerID"], "b1");

        let console = drain(&mut harness.console_rx);
        assert_eq!(types(&console), vec!["BUZZ_WINNER"]);
        assert_eq!(console[0]["payload"]["buzzerID"], "b1");
        assert_eq!(console[0]["payload"]["responseTime"], 300);
    }

    #[tokio::test(start_paused = true)]
    async fn simultaneous_buzzes_elect_the_fastest_synced_time() {
        let mut harness = harness(vec![buzzer_question(42)]).await;
        let mut b1 = add_buzzer(&harness.state, "b1").await;
        let mut b2 = add_buzzer(&harness.state, "b2").await;
        let mut b3 = add_buzzer(&harness.state, "b3").await;
        dispatch_question(&mut harness, "g1", 42).await;
        for rx in [&mut b1, &mut b2, &mut b3] {
            drain(rx);
        }

        for (id, at_ms) in [("b1", 1_520), ("b2", 1_505), ("b3", 1_540)] {
            let mut payload = buzz("g1", 42);
            payload.timestamps = synced(at_ms);
            handle_answer_buzzer(&harness.state, id, payload).await;
        }

        tokio::time::sleep(Duration::from_millis(250)).await;

        let console = drain(&mut harness.console_rx);
        assert_eq!(types(&console), vec!["BUZZ_WINNER"]);
        assert_eq!(console[0]["payload"]["buzzerID"], "b2");
        assert_eq!(console[0]["payload"]["responseTime"], 505);

        for rx in [&mut b1, &mut b2, &mut b3] {
            let frames = drain(rx);
            assert_eq!(types(&frames), vec!["BUZZER_LOCKED"]);
            assert_eq!(frames[0]["payload"]["winnerID"], "b2");
        }

        let game = harness.state.find_game("g1").unwrap();
        let session = game.lock().await;
        assert!(session.question.pending_buzzes.iter().all(|b| b.processed));
    }

    #[tokio::test(start_paused = true)]
    async fn reopen_excludes_winner_and_allows_a_second_cycle() {
        let mut harness = harness(vec![buzzer_question(42)]).await;
        let mut b1 = add_buzzer(&harness.state, "b1").await;
        let mut b2 = add_buzzer(&harness.state, "b2").await;
        let mut b3 = add_buzzer(&harness.state, "b3").await;
        dispatch_question(&mut harness, "g1", 42).await;

        for (id, at_ms) in [("b1", 1_520), ("b2", 1_505), ("b3", 1_540)] {
            let mut payload = buzz("g1", 42);
            payload.timestamps = synced(at_ms);
            handle_answer_buzzer(&harness.state, id, payload).await;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
        for rx in [&mut b1, &mut b2, &mut b3] {
            drain(rx);
        }
        drain(&mut harness.console_rx);

        handle_buzz_reopen(
            &harness.state,
            BuzzJudgementPayload {
                game_id: "g1".into(),
                question_id: 42,
                buzzer_id: "b2".into(),
            },
        )
        .await
        .unwrap();

        let excluded_frames = drain(&mut b2);
        assert_eq!(types(&excluded_frames), vec!["BUZZER_EXCLUDED"]);
        for rx in [&mut b1, &mut b3] {
            let frames = drain(rx);
            assert_eq!(types(&frames), vec!["BUZZER_UNLOCKED"]);
        }
        let console = drain(&mut harness.console_rx);
        assert_eq!(types(&console), vec!["BUZZ_REOPENED"]);
        assert_eq!(console[0]["payload"]["excludedPlayers"][0], "b2");

        // The loser's miss is on the record.
        {
            let rows = harness.rows.lock().unwrap();
            assert_eq!(rows.len(), 1);
            assert!(!rows[0].is_correct);
            assert_eq!(rows[0].points, 0);
        }

        // A fresh buzz from b1 opens a new window and wins it.
        let mut payload = buzz("g1", 42);
        payload.timestamps = synced(2_000);
        handle_answer_buzzer(&harness.state, "b1", payload).await;
        tokio::time::sleep(Duration::from_millis(250)).await;

        let console = drain(&mut harness.console_rx);
        assert_eq!(types(&console), vec!["BUZZ_WINNER"]);
        assert_eq!(console[0]["payload"]["buzzerID"], "b1");

        // The excluded buzzer stays out.
        let mut payload = buzz("g1", 42);
        payload.timestamps = synced(2_100);
        handle_answer_buzzer(&harness.state, "b2", payload).await;
        let frames = drain(&mut b2);
        assert!(types(&frames).contains(&"BUZZ_IGNORED".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn validate_scores_winner_and_unlocks_everyone() {
        let mut harness = harness(vec![buzzer_question(42)]).await;
        let mut b1 = add_buzzer(&harness.state, "b1").await;
        let mut b2 = add_buzzer(&harness.state, "b2").await;
        dispatch_question(&mut harness, "g1", 42).await;

        let mut payload = buzz("g1", 42);
        payload.timestamps = synced(1_400);
        handle_answer_buzzer(&harness.state, "b1", payload).await;
        tokio::time::sleep(Duration::from_millis(250)).await;
        for rx in [&mut b1, &mut b2] {
            drain(rx);
        }
        drain(&mut harness.console_rx);

        handle_buzz_correct(
            &harness.state,
            BuzzJudgementPayload {
                game_id: "g1".into(),
                question_id: 42,
                buzzer_id: "b1".into(),
            },
        )
        .await
        .unwrap();

        let winner_frames = drain(&mut b1);
        assert_eq!(types(&winner_frames), vec!["ANSWER_RESULT", "BUZZER_UNLOCKED"]);
        assert_eq!(winner_frames[0]["payload"]["isCorrect"], true);
        assert_eq!(winner_frames[0]["payload"]["points"], DEFAULT_POINTS);
        assert_eq!(winner_frames[0]["payload"]["responseTime"], 400);

        let other_frames = drain(&mut b2);
        assert_eq!(types(&other_frames), vec!["BUZZER_UNLOCKED"]);

        let console = drain(&mut harness.console_rx);
        assert_eq!(types(&console), vec!["BUZZ_VALIDATED"]);

        let game = harness.state.find_game("g1").unwrap();
        let session = game.lock().await;
        assert!(!session.question.buzzer_locked);
        let player = session.players.get("b1").unwrap();
        assert_eq!(player.score, DEFAULT_POINTS);
        assert_eq!(player.correct_answers, 1);

        let rows = harness.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_correct);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_evaluation_timer_is_a_no_op_after_question_advance() {
        let mut harness = harness(vec![buzzer_question(42), buzzer_question(43)]).await;
        add_buzzer(&harness.state, "b1").await;
        dispatch_question(&mut harness, "g1", 42).await;

        let mut payload = buzz("g1", 42);
        payload.timestamps = synced(1_300);
        handle_answer_buzzer(&harness.state, "b1", payload).await;

        // The console advances to the next question before the window closes.
        dispatch_question(&mut harness, "g1", 43).await;
        tokio::time::sleep(Duration::from_millis(250)).await;

        let console = drain(&mut harness.console_rx);
        assert!(!types(&console).contains(&"BUZZ_WINNER".to_string()));
    }

    #[tokio::test]
    async fn duplicate_answer_produces_no_second_relay_or_row() {
        let mut harness = harness(vec![mcq_question(42)]).await;
        let mut b1 = add_buzzer(&harness.state, "b1").await;
        dispatch_question(&mut harness, "g1", 42).await;
        drain(&mut b1);

        let payload = AnswerMcqPayload {
            game_id: "g1".into(),
            question_id: 42,
            answer: "Paris".into(),
            timestamps: synced(1_200),
        };
        handle_answer_mcq(&harness.state, "b1", payload.clone()).await;
        handle_answer_mcq(&harness.state, "b1", payload).await;

        let frames = drain(&mut b1);
        assert_eq!(types(&frames), vec!["ANSWER_RESULT"]);
        let console = drain(&mut harness.console_rx);
        assert_eq!(types(&console), vec!["ANSWER_RECEIVED"]);
        assert_eq!(harness.rows.lock().unwrap().len(), 1);

        let game = harness.state.find_game("g1").unwrap();
        let session = game.lock().await;
        assert_eq!(session.players.get("b1").unwrap().total_answers, 1);
    }

    #[tokio::test]
    async fn wrong_mcq_answer_scores_zero() {
        let mut harness = harness(vec![mcq_question(42)]).await;
        let mut b1 = add_buzzer(&harness.state, "b1").await;
        dispatch_question(&mut harness, "g1", 42).await;
        drain(&mut b1);

        handle_answer_mcq(
            &harness.state,
            "b1",
            AnswerMcqPayload {
                game_id: "g1".into(),
                question_id: 42,
                answer: "Lyon".into(),
                timestamps: synced(1_200),
            },
        )
        .await;

        let frames = drain(&mut b1);
        assert_eq!(frames[0]["payload"]["isCorrect"], false);
        assert_eq!(frames[0]["payload"]["points"], 0);
    }

    #[tokio::test]
    async fn buzzer_question_on_answer_path_is_first_in_wins() {
        let mut harness = harness(vec![buzzer_question(42)]).await;
        let mut b1 = add_buzzer(&harness.state, "b1").await;
        let mut b2 = add_buzzer(&harness.state, "b2").await;
        dispatch_question(&mut harness, "g1", 42).await;
        drain(&mut b1);
        drain(&mut b2);

        for (id, answer_at) in [("b1", 1_250), ("b2", 1_300)] {
            handle_answer_mcq(
                &harness.state,
                id,
                AnswerMcqPayload {
                    game_id: "g1".into(),
                    question_id: 42,
                    answer: "buzz".into(),
                    timestamps: synced(answer_at),
                },
            )
            .await;
        }

        let first = drain(&mut b1);
        assert_eq!(first[0]["payload"]["isCorrect"], true);
        let second = drain(&mut b2);
        assert_eq!(second[0]["payload"]["isCorrect"], false);
    }

    #[tokio::test]
    async fn buzz_without_active_question_is_ignored_with_reason() {
        let harness = harness(vec![]).await;
        let mut b1 = add_buzzer(&harness.state, "b1").await;

        handle_answer_buzzer(&harness.state, "b1", buzz("g1", 42)).await;

        let frames = drain(&mut b1);
        assert_eq!(types(&frames), vec!["BUZZ_IGNORED"]);
        assert_eq!(frames[0]["payload"]["reason"], "no active question");
    }
}
