//! Entity structs handed across the catalog and result-log boundaries.

use serde::{Deserialize, Serialize};

/// Discriminates the two question families the engine arbitrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionType {
    /// Multiple-choice: answers are indexable, one of them is correct.
    #[serde(rename = "MCQ")]
    Mcq,
    /// Rapidity: first buzzer to press wins the right to answer.
    #[serde(rename = "BUZZER")]
    Buzzer,
}

/// A question as stored in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionEntity {
    /// Catalog identifier, referenced by `QUESTION_SEND`.
    pub id: u32,
    /// Question text shown on the buzzers.
    pub text: String,
    /// MCQ or BUZZER.
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    /// Optional display category.
    #[serde(default)]
    pub category: Option<String>,
    /// Points awarded for a correct answer; the engine defaults to 10 when absent.
    #[serde(default)]
    pub points: Option<i32>,
    /// MCQ answer choices. Legacy catalogs store these as a JSON string,
    /// newer ones as a plain array; [`QuestionEntity::decoded_answers`] accepts both.
    #[serde(default)]
    pub answers: Option<serde_json::Value>,
    /// The correct MCQ answer, compared verbatim against submissions.
    #[serde(default)]
    pub correct_answer: Option<String>,
}

/// Points awarded when the catalog does not specify any.
pub const DEFAULT_POINTS: i32 = 10;

impl QuestionEntity {
    /// Points for this question, with the catalog-wide default applied.
    pub fn points_or_default(&self) -> i32 {
        self.points.unwrap_or(DEFAULT_POINTS)
    }

    /// Decode the stored answer choices into a list, tolerating the legacy
    /// JSON-string form.
    pub fn decoded_answers(&self) -> Option<Vec<String>> {
        match self.answers.as_ref()? {
            serde_json::Value::String(encoded) => serde_json::from_str(encoded).ok(),
            value @ serde_json::Value::Array(_) => {
                serde_json::from_value(value.clone()).ok()
            }
            _ => None,
        }
    }
}

/// A jingle as stored in the catalog; audio bytes stay on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JingleEntity {
    /// Catalog identifier, echoed in every binary frame header.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Path of the audio file, resolved against the configured jingle root.
    pub file_path: String,
}

/// One scored answer, appended to the durable result log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEntity {
    /// Game the answer belongs to.
    pub game_id: String,
    /// Question that was answered.
    pub question_id: u32,
    /// Buzzer that answered.
    pub buzzer_id: String,
    /// Display name of the player at the time of answering.
    pub player_name: String,
    /// Submitted answer text; buzz-only wins record no text.
    pub answer: Option<String>,
    /// Whether the answer was scored as correct.
    pub is_correct: bool,
    /// Points awarded.
    pub points: i32,
    /// Question-relative response time in milliseconds.
    pub response_time_ms: i64,
    /// Wall-clock insertion time, epoch milliseconds.
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(answers: serde_json::Value) -> QuestionEntity {
        QuestionEntity {
            id: 1,
            text: "capital of France?".into(),
            question_type: QuestionType::Mcq,
            category: None,
            points: None,
            answers: Some(answers),
            correct_answer: Some("Paris".into()),
        }
    }

    #[test]
    fn decodes_answers_from_plain_array() {
        let q = question(serde_json::json!(["Paris", "Lyon"]));
        assert_eq!(q.decoded_answers().unwrap(), vec!["Paris", "Lyon"]);
    }

    #[test]
    fn decodes_answers_from_legacy_json_string() {
        let q = question(serde_json::json!(r#"["Paris","Lyon"]"#));
        assert_eq!(q.decoded_answers().unwrap(), vec!["Paris", "Lyon"]);
    }

    #[test]
    fn missing_points_fall_back_to_ten() {
        assert_eq!(question(serde_json::json!([])).points_or_default(), DEFAULT_POINTS);
    }

    #[test]
    fn question_type_round_trips_wire_names() {
        let json = serde_json::to_string(&QuestionType::Buzzer).unwrap();
        assert_eq!(json, r#""BUZZER""#);
        let parsed: QuestionType = serde_json::from_str(r#""MCQ""#).unwrap();
        assert_eq!(parsed, QuestionType::Mcq);
    }
}
