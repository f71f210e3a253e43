use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::Question;

/// Last fetched attempt state, shared with the rest of the app (results screen, home).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedAttempt {
    pub active_attempt_id: Option<String>,
    pub questions: Vec<Question>,
    pub answers: Vec<Option<usize>>,
    /// Set from the submit response; read by the results screen.
    pub completed_attempt_id: Option<String>,
}

/// Cloneable in-memory handle; nothing is persisted.
#[derive(Debug, Clone, Default)]
pub struct AttemptCache {
    inner: Arc<RwLock<CachedAttempt>>,
}

impl AttemptCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CachedAttempt {
        self.read().clone()
    }

    pub fn completed_attempt_id(&self) -> Option<String> {
        self.read().completed_attempt_id.clone()
    }

    /// Called before a start request goes out.
    pub fn clear_completed(&self) {
        self.write().completed_attempt_id = None;
    }

    pub fn record_started(
        &self,
        attempt_id: &str,
        questions: &[Question],
        answers: &[Option<usize>],
    ) {
        let mut cached = self.write();
        cached.active_attempt_id = Some(attempt_id.to_string());
        cached.questions = questions.to_vec();
        cached.answers = answers.to_vec();
    }

    pub fn record_answers(&self, answers: &[Option<usize>]) {
        self.write().answers = answers.to_vec();
    }

    pub fn record_completed(&self, attempt_id: &str, answers: &[Option<usize>]) {
        let mut cached = self.write();
        cached.completed_attempt_id = Some(attempt_id.to_string());
        cached.answers = answers.to_vec();
    }

    // Every write is a single assignment, so a poisoned lock still holds whole values
    fn read(&self) -> RwLockReadGuard<'_, CachedAttempt> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CachedAttempt> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
