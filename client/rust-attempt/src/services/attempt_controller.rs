use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::ControllerSettings;
use crate::metrics::{ActiveAttemptGuard, ATTEMPTS_STARTED_TOTAL, AUTOSAVES_TOTAL, SUBMISSIONS_TOTAL};
use crate::models::{SaveAnswersResponse, SubmitAttemptResponse};
use crate::services::attempt_api::{ApiError, AttemptApi};
use crate::services::attempt_cache::AttemptCache;
use crate::services::attempt_session::{
    AttemptSession, AttemptSnapshot, ScreenState, SubmissionPlan, SubmitTrigger, TickOutcome,
};
use crate::services::autosave::AutosaveScheduler;
use crate::services::violation_monitor::{SignalSource, ViolationMonitor};

const START_FAILED: &str = "Failed to start test.";
const SUBMIT_FAILED: &str = "Failed to submit test.";

/// The countdown removes one second per tick.
const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Student login is required.")]
    MissingCredential,
    #[error("No test selected. Please choose a test first.")]
    MissingTest,
    #[error("Failed to start test: {0}")]
    Start(#[from] ApiError),
}

impl InitError {
    /// Text for the blocking error view.
    pub fn user_message(&self) -> String {
        match self {
            InitError::Start(err) => err.user_message(START_FAILED),
            other => other.to_string(),
        }
    }
}

/// Discrete student actions on the attempt screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    SelectOption(usize),
    ToggleFlag,
    Next,
    Previous,
    JumpTo(usize),
    /// Opens the confirm dialog
    RequestSubmit,
    /// "Review" in the confirm dialog
    CancelSubmit,
    ConfirmSubmit,
    /// Leave the screen ("Back to Tests" or navigating away)
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Navigate to the results view for `attempt_id`
    Results {
        attempt_id: String,
        summary: SubmitAttemptResponse,
    },
    /// Screen left without submitting
    Exited,
}

enum CommandEffect {
    None,
    Submit(SubmitTrigger),
    Exit,
}

type AutosaveFuture = BoxFuture<'static, Result<SaveAnswersResponse, ApiError>>;

/// Drives one attempt screen from start to results.
pub struct AttemptController<A> {
    api: Arc<A>,
    settings: ControllerSettings,
    cache: AttemptCache,
    snapshots: watch::Sender<AttemptSnapshot>,
}

impl<A: AttemptApi + 'static> AttemptController<A> {
    pub fn new(
        api: Arc<A>,
        settings: ControllerSettings,
        cache: AttemptCache,
    ) -> (Self, watch::Receiver<AttemptSnapshot>) {
        let (snapshots, receiver) = watch::channel(AttemptSnapshot::loading());
        (
            Self {
                api,
                settings,
                cache,
                snapshots,
            },
            receiver,
        )
    }

    /// Starts (or resumes) the attempt. No request is made without both inputs.
    pub async fn initialize(
        &self,
        credential: Option<&str>,
        test_id: Option<&str>,
    ) -> Result<AttemptSession, InitError> {
        let credential = credential
            .filter(|value| !value.is_empty())
            .ok_or(InitError::MissingCredential)
            .inspect_err(|_| ATTEMPTS_STARTED_TOTAL.with_label_values(&["rejected"]).inc())?;
        let test_id = test_id
            .filter(|value| !value.is_empty())
            .ok_or(InitError::MissingTest)
            .inspect_err(|_| ATTEMPTS_STARTED_TOTAL.with_label_values(&["rejected"]).inc())?;

        self.cache.clear_completed();

        let started = match self.api.start_attempt(test_id, credential).await {
            Ok(started) => started,
            Err(err) => {
                ATTEMPTS_STARTED_TOTAL.with_label_values(&["error"]).inc();
                tracing::error!("Failed to start attempt for test {}: {}", test_id, err);
                return Err(err.into());
            }
        };

        let session = AttemptSession::from_started(
            &started,
            credential,
            Utc::now(),
            self.settings.low_time_threshold_seconds,
        );
        self.cache.record_started(
            session.attempt_id(),
            session.store().questions(),
            session.store().answers(),
        );
        ATTEMPTS_STARTED_TOTAL.with_label_values(&["success"]).inc();

        tracing::info!(
            "Attempt {} started for test {}: status={}, questions={}, remaining={}s",
            session.attempt_id(),
            test_id,
            session.status(),
            session.store().len(),
            session.countdown().remaining_seconds()
        );

        Ok(session)
    }

    /// Runs the screen until the student reaches results or leaves.
    ///
    /// Returning drops the countdown, the pending debounce deadline, in-flight
    /// autosaves and the signal source.
    pub async fn run<S: SignalSource>(
        self,
        credential: Option<String>,
        test_id: Option<String>,
        mut commands: mpsc::Receiver<UserCommand>,
        signals: S,
    ) -> AttemptOutcome {
        let _active = ActiveAttemptGuard::enter();
        self.snapshots.send_replace(AttemptSnapshot::loading());

        let mut session = match self
            .initialize(credential.as_deref(), test_id.as_deref())
            .await
        {
            Ok(session) => session,
            Err(err) => {
                self.snapshots
                    .send_replace(AttemptSnapshot::error(err.user_message()));
                return wait_for_exit(&mut commands).await;
            }
        };
        self.publish(&session);

        if session.state() == &ScreenState::NoQuestions {
            tracing::warn!("Attempt {} has no questions", session.attempt_id());
            return wait_for_exit(&mut commands).await;
        }

        let mut monitor = ViolationMonitor::new(signals);
        // Signals from before the attempt was ready are not violations
        monitor.drain_pending();
        let mut autosave = AutosaveScheduler::new(self.settings.autosave_debounce);
        let mut inflight: FuturesUnordered<AutosaveFuture> = FuturesUnordered::new();

        let mut ticker = time::interval_at(Instant::now() + TICK, TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if session.countdown().is_expired() {
            if let Some(outcome) = self
                .submit(&mut session, SubmitTrigger::Timeout, &mut autosave, &mut inflight, &mut monitor)
                .await
            {
                return outcome;
            }
        }

        loop {
            let autosave_deadline = autosave.deadline();

            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("Attempt {} screen closed", session.attempt_id());
                        return AttemptOutcome::Exited;
                    };
                    match self.apply_command(&mut session, command, &mut autosave) {
                        CommandEffect::None => {}
                        CommandEffect::Exit => {
                            tracing::info!("Student left attempt {}", session.attempt_id());
                            return AttemptOutcome::Exited;
                        }
                        CommandEffect::Submit(trigger) => {
                            if let Some(outcome) = self
                                .submit(&mut session, trigger, &mut autosave, &mut inflight, &mut monitor)
                                .await
                            {
                                return outcome;
                            }
                        }
                    }
                }
                violation = monitor.next_violation(), if session.monitor_active() && !monitor.is_closed() => {
                    if let Some(violation) = violation {
                        if let Some(outcome) = self
                            .submit(
                                &mut session,
                                SubmitTrigger::Violation(violation),
                                &mut autosave,
                                &mut inflight,
                                &mut monitor,
                            )
                            .await
                        {
                            return outcome;
                        }
                    }
                }
                _ = ticker.tick(), if session.countdown_running() => {
                    let outcome = session.on_tick();
                    self.publish(&session);
                    if outcome == TickOutcome::Expired {
                        if let Some(outcome) = self
                            .submit(&mut session, SubmitTrigger::Timeout, &mut autosave, &mut inflight, &mut monitor)
                            .await
                        {
                            return outcome;
                        }
                    }
                }
                _ = time::sleep_until(autosave_deadline.unwrap_or_else(Instant::now)), if autosave_deadline.is_some() => {
                    if autosave.take_due(Instant::now()) && session.can_autosave() {
                        inflight.push(self.autosave(&session));
                    }
                }
                Some(result) = inflight.next(), if !inflight.is_empty() => {
                    match result {
                        Ok(saved) => {
                            AUTOSAVES_TOTAL.with_label_values(&["success"]).inc();
                            tracing::debug!(
                                "Autosaved attempt {}: {} answers",
                                saved.attempt_id,
                                saved.saved_answers
                            );
                        }
                        Err(err) => {
                            // Best effort; the finalizer saves again before submitting
                            AUTOSAVES_TOTAL.with_label_values(&["error"]).inc();
                            tracing::warn!("Autosave failed for attempt {}: {}", session.attempt_id(), err);
                        }
                    }
                }
            }
        }
    }

    /// Single chokepoint for ending the attempt. Returns the outcome on success;
    /// on failure the session is back in an interactive state with an error.
    async fn submit<S: SignalSource>(
        &self,
        session: &mut AttemptSession,
        trigger: SubmitTrigger,
        autosave: &mut AutosaveScheduler,
        inflight: &mut FuturesUnordered<AutosaveFuture>,
        monitor: &mut ViolationMonitor<S>,
    ) -> Option<AttemptOutcome> {
        let plan = session.begin_submission(trigger)?;
        autosave.fire_now();
        *inflight = FuturesUnordered::new();
        self.publish(session);

        tracing::info!(
            "Submitting attempt {}: trigger={}, keepalive={}",
            session.attempt_id(),
            plan.trigger.as_str(),
            plan.options.keepalive
        );

        match self.finalize(session, &plan).await {
            Ok(response) => {
                SUBMISSIONS_TOTAL
                    .with_label_values(&[plan.trigger.as_str(), "success"])
                    .inc();
                session.complete_submission(&response);
                self.cache
                    .record_completed(&response.attempt_id, session.store().answers());
                self.publish(session);

                tracing::info!(
                    "Attempt {} submitted: score={}, answered={}/{}",
                    response.attempt_id,
                    response.score,
                    response.answered,
                    response.total_questions
                );

                Some(AttemptOutcome::Results {
                    attempt_id: response.attempt_id.clone(),
                    summary: response,
                })
            }
            Err(message) => {
                SUBMISSIONS_TOTAL
                    .with_label_values(&[plan.trigger.as_str(), "error"])
                    .inc();
                tracing::error!(
                    "Submission of attempt {} failed ({}): {}",
                    session.attempt_id(),
                    plan.trigger.as_str(),
                    message
                );
                session.fail_submission(&plan.trigger, message);
                monitor.drain_pending();
                self.publish(session);
                None
            }
        }
    }

    /// Final save, then submit. Errors come back as the text for the inline banner.
    async fn finalize(
        &self,
        session: &AttemptSession,
        plan: &SubmissionPlan,
    ) -> Result<SubmitAttemptResponse, String> {
        let attempt_id = session.attempt_id();
        let credential = session.credential();

        if let Err(err) = self
            .api
            .save_answers(attempt_id, credential, &plan.save_request)
            .await
        {
            if plan.trigger.requires_saved_answers() {
                return Err(err.user_message(SUBMIT_FAILED));
            }
            tracing::warn!(
                "Pre-submit save failed for attempt {}; submitting anyway: {}",
                attempt_id,
                err
            );
        }

        self.api
            .submit_attempt(attempt_id, credential, &plan.submit_request, plan.options)
            .await
            .map_err(|err| err.user_message(SUBMIT_FAILED))
    }

    fn apply_command(
        &self,
        session: &mut AttemptSession,
        command: UserCommand,
        autosave: &mut AutosaveScheduler,
    ) -> CommandEffect {
        let effect = match command {
            UserCommand::SelectOption(option) => {
                if session.select_option(option) {
                    self.cache.record_answers(session.store().answers());
                    if session.can_autosave() {
                        autosave.arm(Instant::now());
                    }
                }
                CommandEffect::None
            }
            UserCommand::ToggleFlag => {
                session.toggle_flag();
                CommandEffect::None
            }
            UserCommand::Next => {
                session.next();
                CommandEffect::None
            }
            UserCommand::Previous => {
                session.previous();
                CommandEffect::None
            }
            UserCommand::JumpTo(index) => {
                session.jump_to(index);
                CommandEffect::None
            }
            UserCommand::RequestSubmit => {
                session.request_submit();
                CommandEffect::None
            }
            UserCommand::CancelSubmit => {
                session.cancel_submit();
                CommandEffect::None
            }
            UserCommand::ConfirmSubmit => CommandEffect::Submit(SubmitTrigger::Manual),
            UserCommand::Exit => CommandEffect::Exit,
        };

        self.publish(session);
        effect
    }

    /// Payload is read here, when the debounce fires, not when it was armed.
    fn autosave(&self, session: &AttemptSession) -> AutosaveFuture {
        let api = Arc::clone(&self.api);
        let attempt_id = session.attempt_id().to_string();
        let credential = session.credential().to_string();
        let request = session.save_request();

        Box::pin(async move { api.save_answers(&attempt_id, &credential, &request).await })
    }

    fn publish(&self, session: &AttemptSession) {
        self.snapshots.send_replace(session.snapshot());
    }
}

/// Terminal views only react to leaving the screen.
async fn wait_for_exit(commands: &mut mpsc::Receiver<UserCommand>) -> AttemptOutcome {
    while let Some(command) = commands.recv().await {
        if command == UserCommand::Exit {
            break;
        }
    }
    AttemptOutcome::Exited
}
