use serde::{Deserialize, Serialize};

/// Graded attempt as shown on the results screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultResponse {
    pub attempt_id: String,
    #[serde(default)]
    pub test_id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub total_questions: u32,
    #[serde(default)]
    pub answered: u32,
    #[serde(default)]
    pub correct_answers: u32,
    #[serde(default)]
    pub incorrect_answers: u32,
    #[serde(default)]
    pub unattempted: u32,
    #[serde(default)]
    pub submitted_at: String,
    #[serde(default)]
    pub questions: Vec<ResultQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultQuestion {
    pub question_id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub question_text: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub selected_answer: Option<usize>,
    pub correct_answer: usize,
    pub is_correct: bool,
    #[serde(default)]
    pub explanation: String,
}

impl ResultResponse {
    /// Share of answered questions that were correct, in percent.
    pub fn accuracy_percent(&self) -> f64 {
        if self.answered == 0 {
            return 0.0;
        }
        f64::from(self.correct_answers) * 100.0 / f64::from(self.answered)
    }
}
