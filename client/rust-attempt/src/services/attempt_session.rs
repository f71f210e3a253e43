use chrono::{DateTime, Utc};

use crate::models::violation::Violation;
use crate::models::{
    Question, RequestOptions, SaveAnswersRequest, StartAttemptResponse, SubmitAttemptRequest,
    SubmitAttemptResponse,
};
use crate::services::answer_store::AnswerStore;
use crate::services::countdown::Countdown;

/// What the attempt screen is showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenState {
    Loading,
    /// Terminal; the only way out is back to test selection
    Error(String),
    /// Terminal; the attempt has no questions
    NoQuestions,
    Ready,
    Confirming,
    Submitting,
    /// Terminal; carries the attempt id returned by the submit call
    Completed { attempt_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitTrigger {
    /// Student confirmed the submit dialog
    Manual,
    /// Countdown reached zero
    Timeout,
    /// Forced by the violation monitor
    Violation(Violation),
}

impl SubmitTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitTrigger::Manual => "manual",
            SubmitTrigger::Timeout => "timeout",
            SubmitTrigger::Violation(_) => "violation",
        }
    }

    pub fn violation_reason(&self) -> Option<&str> {
        match self {
            SubmitTrigger::Violation(violation) => {
                Some(violation.reason.trim()).filter(|reason| !reason.is_empty())
            }
            _ => None,
        }
    }

    pub fn is_forced(&self) -> bool {
        matches!(self, SubmitTrigger::Violation(_))
    }

    /// Voluntary submissions abort when the final save fails; forced ones submit anyway.
    pub fn requires_saved_answers(&self) -> bool {
        !self.is_forced()
    }
}

/// Everything the finalizer sends, captured when the submission begins.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionPlan {
    pub trigger: SubmitTrigger,
    pub save_request: SaveAnswersRequest,
    pub submit_request: SubmitAttemptRequest,
    pub options: RequestOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Clock is not counting in the current state
    Idle,
    Running,
    /// No time left; a timeout submission is due
    Expired,
}

/// Immutable view of the screen, replaced wholesale on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptSnapshot {
    pub state: ScreenState,
    pub attempt_id: Option<String>,
    pub current_index: usize,
    pub question: Option<Question>,
    pub total_questions: usize,
    pub answers: Vec<Option<usize>>,
    pub flagged: Vec<bool>,
    pub answered_count: usize,
    pub flagged_count: usize,
    pub remaining_seconds: u32,
    pub time_display: String,
    pub urgent: bool,
    pub action_error: Option<String>,
}

impl AttemptSnapshot {
    pub fn loading() -> Self {
        Self::bare(ScreenState::Loading)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::bare(ScreenState::Error(message.into()))
    }

    fn bare(state: ScreenState) -> Self {
        Self {
            state,
            attempt_id: None,
            current_index: 0,
            question: None,
            total_questions: 0,
            answers: Vec::new(),
            flagged: Vec::new(),
            answered_count: 0,
            flagged_count: 0,
            remaining_seconds: 0,
            time_display: crate::services::countdown::format_hms(0),
            urgent: false,
            action_error: None,
        }
    }
}

/// State machine of one initialized attempt.
///
/// Pure and synchronous: the controller feeds it events and performs the I/O
/// it asks for. Owns the one-shot forced-submit guard, so a fresh session
/// always starts with the guard cleared.
#[derive(Debug, Clone)]
pub struct AttemptSession {
    attempt_id: String,
    status: String,
    credential: String,
    store: AnswerStore,
    countdown: Countdown,
    state: ScreenState,
    submitting: bool,
    forced_submit_triggered: bool,
    resume_state: ScreenState,
    action_error: Option<String>,
}

impl AttemptSession {
    pub fn from_started(
        started: &StartAttemptResponse,
        credential: &str,
        now: DateTime<Utc>,
        low_time_threshold_seconds: u32,
    ) -> Self {
        let store = AnswerStore::from_started(started);
        let state = if store.is_empty() {
            ScreenState::NoQuestions
        } else {
            ScreenState::Ready
        };

        Self {
            attempt_id: started.attempt_id.clone(),
            status: started.status.clone(),
            credential: credential.to_string(),
            store,
            countdown: Countdown::from_server(
                started.duration_minutes,
                &started.started_at,
                now,
                low_time_threshold_seconds,
            ),
            state,
            submitting: false,
            forced_submit_triggered: false,
            resume_state: ScreenState::Ready,
            action_error: None,
        }
    }

    pub fn attempt_id(&self) -> &str {
        &self.attempt_id
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn state(&self) -> &ScreenState {
        &self.state
    }

    pub fn store(&self) -> &AnswerStore {
        &self.store
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn action_error(&self) -> Option<&str> {
        self.action_error.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn forced_submit_triggered(&self) -> bool {
        self.forced_submit_triggered
    }

    fn is_interactive(&self) -> bool {
        matches!(self.state, ScreenState::Ready | ScreenState::Confirming)
    }

    /// Countdown runs in the question and confirm views, never while submitting.
    pub fn countdown_running(&self) -> bool {
        self.is_interactive() && !self.submitting
    }

    pub fn monitor_active(&self) -> bool {
        self.is_interactive() && !self.submitting && !self.store.is_empty()
    }

    pub fn can_autosave(&self) -> bool {
        self.is_interactive() && !self.store.is_empty()
    }

    /// Returns whether the answers changed.
    pub fn select_option(&mut self, option: usize) -> bool {
        self.state == ScreenState::Ready && self.store.select_option(option)
    }

    pub fn toggle_flag(&mut self) {
        if self.state == ScreenState::Ready {
            self.store.toggle_flag();
        }
    }

    pub fn next(&mut self) {
        if self.state == ScreenState::Ready {
            self.store.next();
        }
    }

    pub fn previous(&mut self) {
        if self.state == ScreenState::Ready {
            self.store.previous();
        }
    }

    pub fn jump_to(&mut self, index: usize) {
        if self.state == ScreenState::Ready {
            self.store.jump_to(index);
        }
    }

    /// Opens the confirm dialog.
    pub fn request_submit(&mut self) {
        if self.state == ScreenState::Ready && !self.submitting {
            self.state = ScreenState::Confirming;
        }
    }

    /// "Review": closes the confirm dialog.
    pub fn cancel_submit(&mut self) {
        if self.state == ScreenState::Confirming && !self.submitting {
            self.state = ScreenState::Ready;
        }
    }

    /// One clock second. Viewing time accrues only while a question is displayed.
    pub fn on_tick(&mut self) -> TickOutcome {
        if !self.countdown_running() {
            return TickOutcome::Idle;
        }
        if self.countdown.is_expired() {
            return TickOutcome::Expired;
        }

        if self.state == ScreenState::Ready {
            self.store.accrue_current();
        }
        if self.countdown.tick() {
            TickOutcome::Expired
        } else {
            TickOutcome::Running
        }
    }

    pub fn save_request(&self) -> SaveAnswersRequest {
        SaveAnswersRequest {
            answers: self.store.answer_payload(),
            time_spent: self.store.time_spent_payload(),
        }
    }

    /// Enters `Submitting` and captures the payloads, or returns `None` when the
    /// trigger must be ignored (already submitting, guard set, wrong state).
    pub fn begin_submission(&mut self, trigger: SubmitTrigger) -> Option<SubmissionPlan> {
        if self.submitting || !self.is_interactive() || self.store.is_empty() {
            return None;
        }

        match &trigger {
            SubmitTrigger::Manual if self.state != ScreenState::Confirming => return None,
            SubmitTrigger::Timeout if !self.countdown.is_expired() => return None,
            SubmitTrigger::Violation(_) if self.forced_submit_triggered => return None,
            SubmitTrigger::Violation(_) => {
                self.forced_submit_triggered = true;
                self.resume_state = ScreenState::Ready;
            }
            _ => self.resume_state = self.state.clone(),
        }

        self.submitting = true;
        self.state = ScreenState::Submitting;
        self.action_error = None;

        let save_request = self.save_request();
        let submit_request = SubmitAttemptRequest {
            violation_reason: trigger.violation_reason().map(str::to_string),
            time_spent: Some(save_request.time_spent.clone()),
        };
        let options = RequestOptions {
            keepalive: trigger.is_forced(),
        };

        Some(SubmissionPlan {
            trigger,
            save_request,
            submit_request,
            options,
        })
    }

    /// Back to the view the submission started from, with an inline error.
    pub fn fail_submission(&mut self, trigger: &SubmitTrigger, message: impl Into<String>) {
        self.submitting = false;
        self.state = self.resume_state.clone();
        self.action_error = Some(message.into());
        if trigger.is_forced() {
            self.forced_submit_triggered = false;
        }
    }

    pub fn complete_submission(&mut self, response: &SubmitAttemptResponse) {
        self.submitting = false;
        self.state = ScreenState::Completed {
            attempt_id: response.attempt_id.clone(),
        };
    }

    pub fn snapshot(&self) -> AttemptSnapshot {
        AttemptSnapshot {
            state: self.state.clone(),
            attempt_id: Some(self.attempt_id.clone()),
            current_index: self.store.current_index(),
            question: self.store.current_question().cloned(),
            total_questions: self.store.len(),
            answers: self.store.answers().to_vec(),
            flagged: self.store.flagged().to_vec(),
            answered_count: self.store.answered_count(),
            flagged_count: self.store.flagged_count(),
            remaining_seconds: self.countdown.remaining_seconds(),
            time_display: self.countdown.display(),
            urgent: self.countdown.is_urgent(),
            action_error: self.action_error.clone(),
        }
    }
}
