use std::collections::HashMap;

use tracing::{info, warn};

use crate::framework::{
    GameTestError, GameTestInfo, GameTestListener, ListenerContext, TestInstanceId,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AttemptCounter {
    pub attempts: u32,
    pub successes: u32,
}

/// Decides whether a finished test is reported or rerun, applying both the
/// run's retry options and the test's own flakiness budget. The counters
/// follow a test from attempt to attempt.
#[derive(Debug, Default)]
pub struct ReportGameListener {
    counters: HashMap<TestInstanceId, AttemptCounter>,
}

impl ReportGameListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, id: TestInstanceId) -> Option<AttemptCounter> {
        self.counters.get(&id).copied()
    }

    fn report_passed(info: &GameTestInfo, context: &mut ListenerContext<'_>) {
        context.reporter().on_test_success(info);
    }

    fn report_failure(info: &GameTestInfo, error: &GameTestError, context: &mut ListenerContext<'_>) {
        context.reporter().on_test_failed(info, error);
    }
}

impl GameTestListener for ReportGameListener {
    fn test_structure_loaded(&mut self, id: TestInstanceId, _info: &GameTestInfo) {
        self.counters.entry(id).or_default().attempts += 1;
    }

    fn test_passed(
        &mut self,
        id: TestInstanceId,
        info: &GameTestInfo,
        context: &mut ListenerContext<'_>,
    ) {
        let counter = self.counters.entry(id).or_default();
        counter.successes += 1;
        let counter = *counter;
        let retry = info.retry_options();

        if retry.has_retries() {
            Self::report_passed(info, context);
            if retry.has_tries_left(counter.attempts, counter.successes) {
                info!(
                    test = %info.name(),
                    attempt = counter.attempts,
                    tries_left = ?retry.tries_left(counter.attempts),
                    "test_passed_rerunning"
                );
                context.rerun(id);
            }
            return;
        }

        if !info.is_flaky() || counter.successes >= info.required_successes() {
            Self::report_passed(info, context);
            return;
        }

        info!(
            test = %info.name(),
            attempt = counter.attempts,
            max_attempts = info.max_attempts(),
            successes = counter.successes,
            required_successes = info.required_successes(),
            "flaky_test_passed"
        );
        context.rerun(id);
    }

    fn test_failed(
        &mut self,
        id: TestInstanceId,
        info: &GameTestInfo,
        context: &mut ListenerContext<'_>,
    ) {
        let counter = self.counters.get(&id).copied().unwrap_or_default();
        let Some(error) = info.error() else {
            return;
        };

        // A structure that never came up will not come up on a rerun either.
        if error.is_structural() {
            Self::report_failure(info, error, context);
            return;
        }

        if !info.is_flaky() {
            Self::report_failure(info, error, context);
            if info
                .retry_options()
                .has_tries_left(counter.attempts, counter.successes)
            {
                context.rerun(id);
            }
            return;
        }

        warn!(
            test = %info.name(),
            attempt = counter.attempts,
            max_attempts = info.max_attempts(),
            successes = counter.successes,
            error = %error,
            "flaky_test_failed"
        );
        let still_reachable = i64::from(info.max_attempts()) - i64::from(counter.attempts)
            + i64::from(counter.successes)
            >= i64::from(info.required_successes());
        if still_reachable {
            context.rerun(id);
        } else {
            let exhausted = GameTestError::ExhaustedAttempts {
                attempts: counter.attempts,
                successes: counter.successes,
                required: info.required_successes(),
            };
            Self::report_failure(info, &exhausted, context);
        }
    }

    fn test_added_for_rerun(
        &mut self,
        original: TestInstanceId,
        rerun: TestInstanceId,
        _info: &GameTestInfo,
    ) {
        if let Some(counter) = self.counters.remove(&original) {
            self.counters.insert(rerun, counter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::TestDefinition;
    use crate::framework::testing::game_test;
    use crate::framework::{MultipleTestTracker, RetryOptions};
    use crate::report::MemoryTestReporter;

    struct Harness {
        tracker: MultipleTestTracker,
        listener: ReportGameListener,
        reporter: MemoryTestReporter,
    }

    impl Harness {
        fn new(info: GameTestInfo) -> (Self, TestInstanceId) {
            let mut tracker = MultipleTestTracker::new();
            let id = tracker.add(info);
            (
                Self {
                    tracker,
                    listener: ReportGameListener::new(),
                    reporter: MemoryTestReporter::default(),
                },
                id,
            )
        }

        fn attempt(&mut self, id: TestInstanceId, error: Option<GameTestError>) -> Option<TestInstanceId> {
            let info = self.tracker.get_mut(id).expect("tracked");
            if let Some(error) = error.clone() {
                info.fail(error);
            }
            let info = self.tracker.get(id).expect("tracked");
            self.listener.test_structure_loaded(id, info);
            let mut reruns = Vec::new();
            let mut reporter = self.reporter.clone();
            let mut context = ListenerContext::new(&mut reruns, &mut reporter);
            match error {
                Some(_) => self.listener.test_failed(id, info, &mut context),
                None => self.listener.test_passed(id, info, &mut context),
            }
            if !reruns.contains(&id) {
                return None;
            }
            let rerun = self.tracker.add_rerun(id).expect("rerun");
            let copy = self.tracker.get(rerun).expect("tracked");
            self.listener.test_added_for_rerun(id, rerun, copy);
            Some(rerun)
        }
    }

    fn failure() -> Option<GameTestError> {
        Some(GameTestError::assertion("nope", 1))
    }

    fn info(definition: TestDefinition, retry: RetryOptions) -> GameTestInfo {
        GameTestInfo::from_test(game_test(definition, |_| Ok(())), retry)
    }

    #[test]
    fn plain_failure_is_reported_once() {
        let (mut harness, id) = Harness::new(info(
            TestDefinition::new("plain", "test:box"),
            RetryOptions::no_retries(),
        ));

        assert_eq!(harness.attempt(id, failure()), None);

        assert_eq!(harness.reporter.failed(), vec!["plain".to_string()]);
        assert_eq!(harness.listener.counter(id), Some(AttemptCounter { attempts: 1, successes: 0 }));
    }

    #[test]
    fn retries_without_halt_keep_going_after_failure() {
        let (mut harness, id) = Harness::new(info(
            TestDefinition::new("retry", "test:box"),
            RetryOptions::new(2, false),
        ));

        let rerun = harness.attempt(id, failure()).expect("rerun");
        assert_eq!(harness.attempt(rerun, None), None);

        assert_eq!(harness.reporter.failed(), vec!["retry".to_string()]);
        assert_eq!(harness.reporter.passed(), vec!["retry".to_string()]);
        assert_eq!(harness.listener.counter(id), None);
        assert_eq!(
            harness.listener.counter(rerun),
            Some(AttemptCounter { attempts: 2, successes: 1 })
        );
    }

    #[test]
    fn halt_on_failure_stops_retrying() {
        let (mut harness, id) = Harness::new(info(
            TestDefinition::new("halting", "test:box"),
            RetryOptions::until_failure(),
        ));

        let second = harness.attempt(id, None).expect("rerun after pass");
        assert_eq!(harness.attempt(second, failure()), None);

        assert_eq!(harness.reporter.passed().len(), 1);
        assert_eq!(harness.reporter.failed().len(), 1);
    }

    #[test]
    fn flaky_failure_reruns_while_successes_are_reachable() {
        let definition = TestDefinition::new("flaky", "test:box").with_flakiness(4, 2);
        let (mut harness, id) = Harness::new(info(definition, RetryOptions::no_retries()));

        let second = harness.attempt(id, failure()).expect("3 attempts left for 2 successes");
        let third = harness.attempt(second, failure()).expect("2 attempts left for 2 successes");
        assert_eq!(harness.attempt(third, failure()), None);

        assert!(harness.reporter.passed().is_empty());
        let failures = harness.reporter.failures();
        assert_eq!(
            failures,
            vec![(
                "flaky".to_string(),
                GameTestError::ExhaustedAttempts {
                    attempts: 3,
                    successes: 0,
                    required: 2,
                }
            )]
        );
    }

    #[test]
    fn flaky_pass_is_reported_once_enough_successes_accumulate() {
        let definition = TestDefinition::new("flaky", "test:box").with_flakiness(3, 2);
        let (mut harness, id) = Harness::new(info(definition, RetryOptions::no_retries()));

        let second = harness.attempt(id, None).expect("needs a second success");
        assert_eq!(harness.attempt(second, None), None);

        assert_eq!(harness.reporter.passed(), vec!["flaky".to_string()]);
        assert!(harness.reporter.failed().is_empty());
    }

    #[test]
    fn structural_failure_is_never_rerun() {
        let definition = TestDefinition::new("corrupt", "test:box").with_flakiness(3, 1);
        let (mut harness, id) = Harness::new(info(definition, RetryOptions::new(0, false)));

        let placement = GameTestError::Placement {
            structure: "test:box".to_string(),
            reason: "corrupt".to_string(),
        };
        assert_eq!(harness.attempt(id, Some(placement)), None);

        assert_eq!(harness.reporter.failed(), vec!["corrupt".to_string()]);
    }
}
