#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use jeeprep_attempt::config::ControllerSettings;
use jeeprep_attempt::models::result::ResultResponse;
use jeeprep_attempt::models::{
    Question, RequestOptions, SaveAnswersRequest, SaveAnswersResponse, StartAttemptResponse,
    SubmitAttemptRequest, SubmitAttemptResponse,
};
use jeeprep_attempt::services::attempt_api::{ApiError, AttemptApi};
use jeeprep_attempt::services::attempt_cache::AttemptCache;
use jeeprep_attempt::services::attempt_session::AttemptSnapshot;
use jeeprep_attempt::services::violation_monitor::{ChannelSignalSource, SignalEmitter};
use jeeprep_attempt::{AttemptController, AttemptOutcome, UserCommand};

pub const TOKEN: &str = "student-token";
pub const TEST_ID: &str = "jee-main-mock-1";
pub const ATTEMPT_ID: &str = "attempt-1";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Start {
        test_id: String,
        credential: String,
    },
    Save {
        attempt_id: String,
        request: SaveAnswersRequest,
    },
    Submit {
        attempt_id: String,
        request: SubmitAttemptRequest,
        options: RequestOptions,
    },
    Result {
        attempt_id: String,
    },
}

/// In-memory backend that records every call.
pub struct FakeAttemptApi {
    started: StartAttemptResponse,
    start_error: Option<(u16, String)>,
    submitted_attempt_id: String,
    fail_saves: bool,
    failing_submits: AtomicUsize,
    calls: Mutex<Vec<ApiCall>>,
}

impl FakeAttemptApi {
    pub fn new(started: StartAttemptResponse) -> Self {
        Self {
            submitted_attempt_id: started.attempt_id.clone(),
            started,
            start_error: None,
            fail_saves: false,
            failing_submits: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_start(mut self, status: u16, detail: &str) -> Self {
        self.start_error = Some((status, detail.to_string()));
        self
    }

    pub fn failing_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    /// The next `count` submissions fail with a 500.
    pub fn failing_submits(self, count: usize) -> Self {
        self.failing_submits.store(count, Ordering::SeqCst);
        self
    }

    pub fn submitted_as(mut self, attempt_id: &str) -> Self {
        self.submitted_attempt_id = attempt_id.to_string();
        self
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn saves(&self) -> Vec<SaveAnswersRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Save { request, .. } => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn submits(&self) -> Vec<(SubmitAttemptRequest, RequestOptions)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Submit {
                    request, options, ..
                } => Some((request, options)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AttemptApi for FakeAttemptApi {
    async fn start_attempt(
        &self,
        test_id: &str,
        credential: &str,
    ) -> Result<StartAttemptResponse, ApiError> {
        self.record(ApiCall::Start {
            test_id: test_id.to_string(),
            credential: credential.to_string(),
        });
        match &self.start_error {
            Some((status, detail)) => Err(ApiError::Status {
                status: *status,
                detail: detail.clone(),
            }),
            None => Ok(self.started.clone()),
        }
    }

    async fn save_answers(
        &self,
        attempt_id: &str,
        _credential: &str,
        request: &SaveAnswersRequest,
    ) -> Result<SaveAnswersResponse, ApiError> {
        self.record(ApiCall::Save {
            attempt_id: attempt_id.to_string(),
            request: request.clone(),
        });
        if self.fail_saves {
            return Err(ApiError::Status {
                status: 503,
                detail: "Could not save answers".to_string(),
            });
        }
        Ok(SaveAnswersResponse {
            attempt_id: attempt_id.to_string(),
            saved_answers: request.answers.values().filter(|a| a.is_some()).count() as u32,
        })
    }

    async fn submit_attempt(
        &self,
        attempt_id: &str,
        _credential: &str,
        request: &SubmitAttemptRequest,
        options: RequestOptions,
    ) -> Result<SubmitAttemptResponse, ApiError> {
        self.record(ApiCall::Submit {
            attempt_id: attempt_id.to_string(),
            request: request.clone(),
            options,
        });
        let failed = self
            .failing_submits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ApiError::Status {
                status: 500,
                detail: "Submission window closed".to_string(),
            });
        }

        let total = self.started.questions.len() as u32;
        Ok(SubmitAttemptResponse {
            attempt_id: self.submitted_attempt_id.clone(),
            score: 4.0,
            total_questions: total,
            answered: 1,
            correct_answers: 1,
            incorrect_answers: 0,
            unattempted: total.saturating_sub(1),
        })
    }

    async fn get_result(
        &self,
        attempt_id: &str,
        _credential: &str,
    ) -> Result<ResultResponse, ApiError> {
        self.record(ApiCall::Result {
            attempt_id: attempt_id.to_string(),
        });
        Err(ApiError::Status {
            status: 404,
            detail: "Result not found".to_string(),
        })
    }
}

pub fn question(id: &str) -> Question {
    Question {
        id: id.to_string(),
        subject: "Physics".to_string(),
        text: format!("Question {}", id),
        options: vec![
            "Option A".to_string(),
            "Option B".to_string(),
            "Option C".to_string(),
            "Option D".to_string(),
        ],
    }
}

/// Attempt started `elapsed_seconds` ago with questions `q1..=q{count}`.
pub fn started_attempt(
    question_count: usize,
    duration_minutes: i64,
    elapsed_seconds: i64,
) -> StartAttemptResponse {
    let started_at = (Utc::now() - ChronoDuration::seconds(elapsed_seconds))
        .to_rfc3339_opts(SecondsFormat::Secs, true);
    StartAttemptResponse {
        attempt_id: ATTEMPT_ID.to_string(),
        status: "in_progress".to_string(),
        started_at,
        duration_minutes,
        questions: (1..=question_count)
            .map(|i| question(&format!("q{}", i)))
            .collect(),
        answers: BTreeMap::new(),
    }
}

pub fn with_saved_answers(
    mut started: StartAttemptResponse,
    answers: serde_json::Value,
) -> StartAttemptResponse {
    started.answers = serde_json::from_value(answers).unwrap();
    started
}

pub fn sample_attempt() -> StartAttemptResponse {
    with_saved_answers(started_attempt(3, 180, 0), json!({}))
}

/// A controller running on its own task, with every handle a screen would hold.
pub struct Harness {
    pub api: Arc<FakeAttemptApi>,
    pub cache: AttemptCache,
    pub commands: mpsc::Sender<UserCommand>,
    pub signals: SignalEmitter,
    pub snapshots: watch::Receiver<AttemptSnapshot>,
    pub handle: JoinHandle<AttemptOutcome>,
}

impl Harness {
    pub fn launch(api: FakeAttemptApi) -> Self {
        Self::launch_with(api, Some(TOKEN), Some(TEST_ID))
    }

    pub fn launch_with(
        api: FakeAttemptApi,
        credential: Option<&str>,
        test_id: Option<&str>,
    ) -> Self {
        init_tracing();

        let api = Arc::new(api);
        let cache = AttemptCache::new();
        let (controller, snapshots) =
            AttemptController::new(Arc::clone(&api), ControllerSettings::default(), cache.clone());
        let (commands, command_rx) = mpsc::channel(16);
        let (signals, source) = ChannelSignalSource::channel();

        let credential = credential.map(str::to_string);
        let test_id = test_id.map(str::to_string);
        let handle = tokio::spawn(controller.run(credential, test_id, command_rx, source));

        Self {
            api,
            cache,
            commands,
            signals,
            snapshots,
            handle,
        }
    }

    pub async fn send(&self, command: UserCommand) {
        self.commands.send(command).await.unwrap();
    }

    /// Waits until the published snapshot satisfies `predicate`.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&AttemptSnapshot) -> bool,
    ) -> AttemptSnapshot {
        self.snapshots.wait_for(predicate).await.unwrap().clone()
    }

    pub async fn outcome(self) -> AttemptOutcome {
        self.handle.await.unwrap()
    }
}
