use crate::models::{AnswerMap, Question, StartAttemptResponse, TimeSpentMap};

/// Answers, flags and per-question viewing time of the active attempt.
///
/// Indices follow the question order of the attempt. Every mutator returns
/// whether the answers themselves changed, which is what arms the autosave.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerStore {
    questions: Vec<Question>,
    answers: Vec<Option<usize>>,
    flagged: Vec<bool>,
    time_spent: Vec<u32>,
    current: usize,
}

impl AnswerStore {
    pub fn new(questions: Vec<Question>) -> Self {
        let len = questions.len();
        Self {
            questions,
            answers: vec![None; len],
            flagged: vec![false; len],
            time_spent: vec![0; len],
            current: 0,
        }
    }

    /// Builds the store from a start/resume response. Flags always start cleared.
    pub fn from_started(started: &StartAttemptResponse) -> Self {
        let mut store = Self::new(started.questions.clone());
        store.answers = started
            .questions
            .iter()
            .map(|question| started.saved_answer(question))
            .collect();
        store
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    pub fn answers(&self) -> &[Option<usize>] {
        &self.answers
    }

    pub fn flagged(&self) -> &[bool] {
        &self.flagged
    }

    pub fn answer(&self, index: usize) -> Option<usize> {
        self.answers.get(index).copied().flatten()
    }

    pub fn is_flagged(&self, index: usize) -> bool {
        self.flagged.get(index).copied().unwrap_or(false)
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|answer| answer.is_some()).count()
    }

    pub fn flagged_count(&self) -> usize {
        self.flagged.iter().filter(|flag| **flag).count()
    }

    /// Selects `option` on the current question; selecting the chosen option again clears it.
    pub fn select_option(&mut self, option: usize) -> bool {
        let Some(question) = self.questions.get(self.current) else {
            return false;
        };
        if option >= question.options.len() {
            return false;
        }

        let slot = &mut self.answers[self.current];
        *slot = if *slot == Some(option) {
            None
        } else {
            Some(option)
        };
        true
    }

    pub fn toggle_flag(&mut self) {
        if let Some(flag) = self.flagged.get_mut(self.current) {
            *flag = !*flag;
        }
    }

    pub fn next(&mut self) {
        if self.current + 1 < self.questions.len() {
            self.current += 1;
        }
    }

    pub fn previous(&mut self) {
        self.current = self.current.saturating_sub(1);
    }

    /// Jumps to `index`; out-of-range indices are ignored.
    pub fn jump_to(&mut self, index: usize) -> bool {
        if index < self.questions.len() {
            self.current = index;
            true
        } else {
            false
        }
    }

    /// One second of viewing time for the displayed question.
    pub fn accrue_current(&mut self) {
        if let Some(seconds) = self.time_spent.get_mut(self.current) {
            *seconds = seconds.saturating_add(1);
        }
    }

    pub fn seconds_spent(&self, index: usize) -> u32 {
        self.time_spent.get(index).copied().unwrap_or(0)
    }

    /// Dense answer payload: one entry per question, `None` when unanswered.
    pub fn answer_payload(&self) -> AnswerMap {
        self.questions
            .iter()
            .zip(&self.answers)
            .map(|(question, answer)| (question.id.clone(), *answer))
            .collect()
    }

    /// Viewing time per question; questions never displayed are left out.
    pub fn time_spent_payload(&self) -> TimeSpentMap {
        self.questions
            .iter()
            .zip(&self.time_spent)
            .filter(|(_, seconds)| **seconds > 0)
            .map(|(question, seconds)| (question.id.clone(), *seconds))
            .collect()
    }
}
