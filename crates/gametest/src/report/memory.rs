use std::sync::{Arc, Mutex, MutexGuard};

use crate::framework::{GameTestError, GameTestInfo};

use super::{ReportError, TestReporter};

#[derive(Debug, Default)]
struct Recorded {
    passed: Vec<String>,
    failures: Vec<(String, GameTestError)>,
    finish_calls: usize,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryTestReporter {
    recorded: Arc<Mutex<Recorded>>,
}

impl MemoryTestReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        // A poisoned lock only means a reporting call panicked; the data is
        // still consistent.
        self.recorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn passed(&self) -> Vec<String> {
        self.recorded().passed.clone()
    }

    pub fn failed(&self) -> Vec<String> {
        self.recorded()
            .failures
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn failures(&self) -> Vec<(String, GameTestError)> {
        self.recorded().failures.clone()
    }

    pub fn finish_calls(&self) -> usize {
        self.recorded().finish_calls
    }
}

impl TestReporter for MemoryTestReporter {
    fn on_test_failed(&mut self, info: &GameTestInfo, error: &GameTestError) {
        self.recorded()
            .failures
            .push((info.name().to_string(), error.clone()));
    }

    fn on_test_success(&mut self, info: &GameTestInfo) {
        self.recorded().passed.push(info.name().to_string());
    }

    fn finish(&mut self) -> Result<(), ReportError> {
        self.recorded().finish_calls += 1;
        Ok(())
    }
}
