//! In-memory game session state: players, per-question runtime, buzz arbitration.
//!
//! Everything here is synchronous and free of I/O so the arbitration rules can
//! be tested without a runtime. The async orchestration (timers, persistence,
//! fan-out) lives in the game service, which drives these methods under the
//! per-game lock.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::{config::GameSettings, dto::common::ClientTimestamps};

/// Upper clamp applied to answer response times, milliseconds.
pub const MAX_ANSWER_RESPONSE_MS: i64 = 120_000;

/// Lifecycle of a game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    /// Session exists but no question was dispatched yet.
    Created,
    /// Questions are being played.
    Started,
    /// Gameplay suspended by the console.
    Paused,
    /// Session is over; kept only until the console discards it.
    Ended,
}

/// Cumulative per-player statistics, updated as answers are scored.
#[derive(Debug, Clone)]
pub struct Player {
    /// Stable buzzer identifier; identity survives reconnects.
    pub buzzer_id: String,
    /// Display name at the time of the last update.
    pub name: String,
    /// Cumulative score.
    pub score: i32,
    /// Number of correct answers.
    pub correct_answers: u32,
    /// Number of scored answers, correct or not.
    pub total_answers: u32,
    /// Sum of response times, milliseconds.
    pub total_response_time_ms: i64,
    /// Fastest response so far, milliseconds.
    pub fastest_response_ms: Option<i64>,
    /// Slowest response so far, milliseconds.
    pub slowest_response_ms: Option<i64>,
}

impl Player {
    fn new(buzzer_id: String, name: String) -> Self {
        Self {
            buzzer_id,
            name,
            score: 0,
            correct_answers: 0,
            total_answers: 0,
            total_response_time_ms: 0,
            fastest_response_ms: None,
            slowest_response_ms: None,
        }
    }

    fn record(&mut self, is_correct: bool, points: i32, response_time_ms: i64) {
        self.total_answers += 1;
        if is_correct {
            self.correct_answers += 1;
        }
        self.score += points;
        self.total_response_time_ms += response_time_ms;
        self.fastest_response_ms = Some(match self.fastest_response_ms {
            Some(fastest) => fastest.min(response_time_ms),
            None => response_time_ms,
        });
        self.slowest_response_ms = Some(match self.slowest_response_ms {
            Some(slowest) => slowest.max(response_time_ms),
            None => response_time_ms,
        });
    }
}

/// One scored answer within the current question.
#[derive(Debug, Clone)]
pub struct RecordedAnswer {
    /// Submitted answer text; buzz wins validated orally record none.
    pub answer: Option<String>,
    /// Verdict.
    pub is_correct: bool,
    /// Points awarded.
    pub points: i32,
    /// Question-relative response time, milliseconds.
    pub response_time_ms: i64,
}

/// A buzz waiting for (or consumed by) an evaluation cycle.
#[derive(Debug, Clone)]
pub struct PendingBuzz {
    /// Buzzer that pressed.
    pub buzzer_id: String,
    /// Question-relative response time, milliseconds.
    pub response_time_ms: i64,
    /// Client timestamps as submitted, kept for the console relay.
    pub timestamps: ClientTimestamps,
    /// Server receive instant, epoch milliseconds.
    pub received_at: i64,
    /// Whether an evaluation cycle already consumed this entry.
    pub processed: bool,
}

/// Outcome of [`GameSession::record_buzz`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuzzAttempt {
    /// The buzz was dropped; the reason goes back in `BUZZ_IGNORED`.
    Ignored {
        /// Why the buzz was not taken into account.
        reason: &'static str,
    },
    /// The buzz joined the pending list.
    Pending {
        /// Computed response time, milliseconds.
        response_time_ms: i64,
        /// Whether the caller must arm the evaluation timer.
        arm_timer: bool,
        /// Question epoch guarding the timer callback.
        epoch: u64,
    },
}

/// Winner elected by an evaluation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuzzWinner {
    /// Winning buzzer.
    pub buzzer_id: String,
    /// Winning response time, milliseconds.
    pub response_time_ms: i64,
}

/// Runtime state scoped to the current question, reset on every dispatch.
#[derive(Debug, Default)]
pub struct QuestionRuntimeState {
    /// Catalog id of the question being played.
    pub question_id: Option<u32>,
    /// Server instant the question was dispatched, epoch milliseconds.
    pub started_at: i64,
    /// Scored answers keyed by buzzer id; append-only within a question.
    pub answers: HashMap<String, RecordedAnswer>,
    /// Buzzers barred from re-buzzing until the next question.
    pub excluded: HashSet<String>,
    /// Buzzes collected for arbitration, in arrival order.
    pub pending_buzzes: Vec<PendingBuzz>,
    /// A winner holds the floor; no new buzz is accepted.
    pub buzzer_locked: bool,
    /// The buzzer currently holding the floor.
    pub current_winner: Option<String>,
    /// Whether an evaluation timer is in flight for this question.
    pub evaluation_armed: bool,
    /// Bumped on every question reset; stale timers compare against it.
    pub epoch: u64,
}

/// One in-memory game: players, question sequence, and the live question state.
#[derive(Debug)]
pub struct GameSession {
    /// Opaque identifier chosen by the console.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Per-game settings.
    pub settings: GameSettings,
    /// Announced number of questions, when the console provided one.
    pub total_questions: Option<u32>,
    /// Question ids in dispatch order.
    pub question_ids: Vec<u32>,
    /// Index into `question_ids` of the live question.
    pub current_question_index: Option<usize>,
    /// Players in connection order; identity keyed by buzzer id.
    pub players: IndexMap<String, Player>,
    /// State of the live question.
    pub question: QuestionRuntimeState,
}

impl GameSession {
    /// Create a fresh session in the `Created` state.
    pub fn new(id: String, name: String, settings: GameSettings) -> Self {
        Self {
            id,
            name,
            status: GameStatus::Created,
            settings,
            total_questions: None,
            question_ids: Vec::new(),
            current_question_index: None,
            players: IndexMap::new(),
            question: QuestionRuntimeState::default(),
        }
    }

    /// Fetch-or-create the player for `buzzer_id`, refreshing its name.
    pub fn ensure_player(&mut self, buzzer_id: &str, name: &str) -> &mut Player {
        let player = self
            .players
            .entry(buzzer_id.to_string())
            .or_insert_with(|| Player::new(buzzer_id.to_string(), name.to_string()));
        if !name.is_empty() {
            player.name = name.to_string();
        }
        player
    }

    /// Rename a player if it exists.
    pub fn rename_player(&mut self, buzzer_id: &str, name: &str) {
        if let Some(player) = self.players.get_mut(buzzer_id) {
            player.name = name.to_string();
        }
    }

    /// Reset the runtime state for a newly dispatched question.
    ///
    /// Bumps the question epoch so an evaluation timer armed for the previous
    /// question becomes a no-op.
    pub fn reset_question(&mut self, question_id: u32, started_at: i64) {
        let epoch = self.question.epoch + 1;
        self.question = QuestionRuntimeState {
            question_id: Some(question_id),
            started_at,
            epoch,
            ..QuestionRuntimeState::default()
        };
        match self.question_ids.iter().position(|&id| id == question_id) {
            Some(index) => self.current_question_index = Some(index),
            None => {
                self.question_ids.push(question_id);
                self.current_question_index = Some(self.question_ids.len() - 1);
            }
        }
        self.status = GameStatus::Started;
    }

    /// Question-relative response time for an answer, clamped to
    /// `[0, MAX_ANSWER_RESPONSE_MS]`.
    pub fn answer_response_time(&self, timestamps: &ClientTimestamps, now_ms: i64) -> i64 {
        self.raw_response_time(timestamps, now_ms)
            .clamp(0, MAX_ANSWER_RESPONSE_MS)
    }

    /// Question-relative response time for a buzz, floored at 0.
    ///
    /// The upper clamp deliberately does not apply here; arbitration compares
    /// buzzes against each other, not against the answer window.
    pub fn buzz_response_time(&self, timestamps: &ClientTimestamps, now_ms: i64) -> i64 {
        self.raw_response_time(timestamps, now_ms).max(0)
    }

    fn raw_response_time(&self, timestamps: &ClientTimestamps, now_ms: i64) -> i64 {
        let observed = timestamps.synced.unwrap_or(now_ms);
        observed - self.question.started_at
    }

    /// Whether `buzzer_id` already has a scored answer for the live question.
    pub fn has_answered(&self, buzzer_id: &str) -> bool {
        self.question.answers.contains_key(buzzer_id)
    }

    /// Number of scored answers for the live question.
    pub fn answer_count(&self) -> usize {
        self.question.answers.len()
    }

    /// Append a scored answer and fold it into the player's statistics.
    ///
    /// Callers must check [`GameSession::has_answered`] first; a second answer
    /// from the same buzzer within one question is a duplicate and must not
    /// reach this method.
    pub fn register_answer(
        &mut self,
        buzzer_id: &str,
        name: &str,
        answer: Option<String>,
        is_correct: bool,
        points: i32,
        response_time_ms: i64,
    ) {
        self.question.answers.insert(
            buzzer_id.to_string(),
            RecordedAnswer {
                answer,
                is_correct,
                points,
                response_time_ms,
            },
        );
        self.ensure_player(buzzer_id, name)
            .record(is_correct, points, response_time_ms);
    }

    /// Record a buzz for arbitration (spec'd gate order: exclusion, duplicate,
    /// lock), computing its response time and reporting whether the caller
    /// must arm the evaluation window.
    pub fn record_buzz(
        &mut self,
        buzzer_id: &str,
        timestamps: ClientTimestamps,
        now_ms: i64,
    ) -> BuzzAttempt {
        if self.question.excluded.contains(buzzer_id) {
            return BuzzAttempt::Ignored { reason: "excluded" };
        }
        if self
            .question
            .pending_buzzes
            .iter()
            .any(|buzz| !buzz.processed && buzz.buzzer_id == buzzer_id)
        {
            return BuzzAttempt::Ignored {
                reason: "already buzzed",
            };
        }
        if self.question.buzzer_locked {
            return BuzzAttempt::Ignored {
                reason: "buzzers locked",
            };
        }

        let response_time_ms = self.buzz_response_time(&timestamps, now_ms);
        self.question.pending_buzzes.push(PendingBuzz {
            buzzer_id: buzzer_id.to_string(),
            response_time_ms,
            timestamps,
            received_at: now_ms,
            processed: false,
        });

        let arm_timer = !self.question.evaluation_armed;
        self.question.evaluation_armed = true;

        BuzzAttempt::Pending {
            response_time_ms,
            arm_timer,
            epoch: self.question.epoch,
        }
    }

    /// Elect the lowest-latency unprocessed buzz, locking the question.
    ///
    /// Returns `None` when a previous cycle already decided or nothing
    /// eligible is pending. All eligible entries are consumed either way, and
    /// the evaluation window is disarmed so the next buzz opens a new one.
    pub fn evaluate_buzzes(&mut self) -> Option<BuzzWinner> {
        self.question.evaluation_armed = false;

        if self.question.buzzer_locked {
            return None;
        }

        let excluded = &self.question.excluded;
        let mut eligible: Vec<usize> = self
            .question
            .pending_buzzes
            .iter()
            .enumerate()
            .filter(|(_, buzz)| !buzz.processed && !excluded.contains(&buzz.buzzer_id))
            .map(|(index, _)| index)
            .collect();
        if eligible.is_empty() {
            return None;
        }

        // Stable sort: ties resolve by arrival order, deterministic within a run.
        eligible.sort_by_key(|&index| self.question.pending_buzzes[index].response_time_ms);
        let winner_index = eligible[0];

        for &index in &eligible {
            self.question.pending_buzzes[index].processed = true;
        }

        let winner = &self.question.pending_buzzes[winner_index];
        let elected = BuzzWinner {
            buzzer_id: winner.buzzer_id.clone(),
            response_time_ms: winner.response_time_ms,
        };
        self.question.current_winner = Some(elected.buzzer_id.clone());
        self.question.buzzer_locked = true;
        Some(elected)
    }

    /// The pending entry backing the current winner, if any.
    pub fn winner_buzz(&self) -> Option<&PendingBuzz> {
        let winner_id = self.question.current_winner.as_deref()?;
        self.question
            .pending_buzzes
            .iter()
            .rev()
            .find(|buzz| buzz.buzzer_id == winner_id)
    }

    /// Bar a buzzer from the current question and release the lock.
    pub fn exclude_player(&mut self, buzzer_id: &str) {
        self.question.excluded.insert(buzzer_id.to_string());
        self.question.buzzer_locked = false;
        self.question.current_winner = None;
    }

    /// Release the lock after a validated (correct) buzz; the question is done.
    pub fn clear_lock(&mut self) {
        self.question.buzzer_locked = false;
        self.question.current_winner = None;
    }

    /// Buzzers excluded from the current question, sorted for stable output.
    pub fn excluded_players(&self) -> Vec<String> {
        let mut excluded: Vec<String> = self.question.excluded.iter().cloned().collect();
        excluded.sort();
        excluded
    }
}
