use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod result;
pub mod violation;

/// question id -> selected option index, `None` when unanswered
pub type AnswerMap = BTreeMap<String, Option<usize>>;

/// question id -> seconds spent viewing the question
pub type TimeSpentMap = BTreeMap<String, u32>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub subject: String,
    pub text: String,
    pub options: Vec<String>,
}

/// Response of `POST /student/tests/{id}/start`.
///
/// Starting an already started attempt returns the same attempt together with
/// the answers saved so far, so the client never distinguishes start from resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartAttemptResponse {
    pub attempt_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub started_at: String,
    /// Duration in minutes
    #[serde(rename = "duration", alias = "duration_minutes")]
    pub duration_minutes: i64,
    #[serde(default)]
    pub questions: Vec<Question>,
    /// Raw saved answers; entries may be null, negative or otherwise unusable
    #[serde(default)]
    pub answers: BTreeMap<String, serde_json::Value>,
}

impl StartAttemptResponse {
    /// Saved answer for `question`, if it is a usable option index.
    ///
    /// Any non-negative whole number is accepted, `1.0` included. Indices past
    /// the option list load as unanswered since no option could show them.
    pub fn saved_answer(&self, question: &Question) -> Option<usize> {
        self.answers
            .get(&question.id)
            .and_then(option_index)
            .filter(|index| *index < question.options.len())
    }
}

fn option_index(value: &serde_json::Value) -> Option<usize> {
    let index = match value.as_u64() {
        Some(index) => index,
        None => {
            let number = value.as_f64()?;
            if number < 0.0 || number.fract() != 0.0 || number > u32::MAX as f64 {
                return None;
            }
            number as u64
        }
    };
    usize::try_from(index).ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveAnswersRequest {
    pub answers: AnswerMap,
    pub time_spent: TimeSpentMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAnswersResponse {
    pub attempt_id: String,
    #[serde(default, alias = "saved_count")]
    pub saved_answers: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitAttemptRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<TimeSpentMap>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitAttemptResponse {
    pub attempt_id: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub total_questions: u32,
    #[serde(default)]
    pub answered: u32,
    #[serde(default, alias = "correct")]
    pub correct_answers: u32,
    #[serde(default, alias = "incorrect")]
    pub incorrect_answers: u32,
    #[serde(default)]
    pub unattempted: u32,
}

/// Transport hints for a single request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Let the request finish even if the screen that issued it goes away
    pub keepalive: bool,
}
