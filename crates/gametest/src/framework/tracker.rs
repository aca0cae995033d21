use std::fmt;

use crate::report::TestReporter;

use super::info::{GameTestInfo, TestOutcome};
use super::listener::{GameTestListener, ListenerContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestInstanceId(pub(crate) usize);

impl TestInstanceId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TestInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct TrackedTest {
    info: GameTestInfo,
    superseded: bool,
}

/// The tests of one runner, including rerun attempts, plus everyone who
/// wants to hear about them. Attempts replaced by a rerun stay addressable
/// but no longer count towards the totals.
#[derive(Default)]
pub struct MultipleTestTracker {
    tests: Vec<TrackedTest>,
    listeners: Vec<Box<dyn GameTestListener>>,
}

impl MultipleTestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, info: GameTestInfo) -> TestInstanceId {
        self.tests.push(TrackedTest {
            info,
            superseded: false,
        });
        TestInstanceId(self.tests.len() - 1)
    }

    pub fn get(&self, id: TestInstanceId) -> Option<&GameTestInfo> {
        self.tests.get(id.0).map(|tracked| &tracked.info)
    }

    pub fn get_mut(&mut self, id: TestInstanceId) -> Option<&mut GameTestInfo> {
        self.tests.get_mut(id.0).map(|tracked| &mut tracked.info)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TestInstanceId, &GameTestInfo)> {
        self.tests
            .iter()
            .enumerate()
            .filter(|(_, tracked)| !tracked.superseded)
            .map(|(index, tracked)| (TestInstanceId(index), &tracked.info))
    }

    pub fn attempt_count(&self) -> usize {
        self.tests.len()
    }

    pub fn add_listener(&mut self, mut listener: Box<dyn GameTestListener>) {
        for (index, tracked) in self.tests.iter().enumerate() {
            if tracked.info.has_placed_structure() {
                listener.test_structure_loaded(TestInstanceId(index), &tracked.info);
            }
        }
        self.listeners.push(listener);
    }

    pub(crate) fn notify_structure_loaded(&mut self, id: TestInstanceId) {
        let Some(tracked) = self.tests.get(id.0) else {
            return;
        };
        for listener in &mut self.listeners {
            listener.test_structure_loaded(id, &tracked.info);
        }
    }

    pub(crate) fn notify_finished(
        &mut self,
        id: TestInstanceId,
        outcome: TestOutcome,
        reruns: &mut Vec<TestInstanceId>,
        reporter: &mut dyn TestReporter,
    ) {
        let Some(tracked) = self.tests.get(id.0) else {
            return;
        };
        let mut context = ListenerContext::new(reruns, reporter);
        for listener in &mut self.listeners {
            match outcome {
                TestOutcome::Passed => listener.test_passed(id, &tracked.info, &mut context),
                TestOutcome::Failed => listener.test_failed(id, &tracked.info, &mut context),
            }
        }
    }

    pub(crate) fn add_rerun(&mut self, original: TestInstanceId) -> Option<TestInstanceId> {
        let copy = self.get(original)?.copy_reset();
        if let Some(tracked) = self.tests.get_mut(original.0) {
            tracked.superseded = true;
        }
        let rerun = self.add(copy);
        if let Some(tracked) = self.tests.get(rerun.0) {
            for listener in &mut self.listeners {
                listener.test_added_for_rerun(original, rerun, &tracked.info);
            }
        }
        Some(rerun)
    }

    pub fn total_count(&self) -> usize {
        self.iter().count()
    }

    pub fn done_count(&self) -> usize {
        self.iter().filter(|(_, info)| info.is_done()).count()
    }

    pub fn passed_count(&self) -> usize {
        self.iter().filter(|(_, info)| info.has_succeeded()).count()
    }

    pub fn failed_required_count(&self) -> usize {
        self.iter()
            .filter(|(_, info)| info.has_failed() && info.is_required())
            .count()
    }

    pub fn failed_optional_count(&self) -> usize {
        self.iter()
            .filter(|(_, info)| info.has_failed() && info.is_optional())
            .count()
    }

    pub fn has_failed_required(&self) -> bool {
        self.failed_required_count() > 0
    }

    pub fn is_done(&self) -> bool {
        self.iter().all(|(_, info)| info.is_done())
    }

    /// One character per test: ' ' waiting, '_' running, '+' passed,
    /// 'X' required failure, 'x' optional failure.
    pub fn progress_bar(&self) -> String {
        self.iter()
            .map(|(_, info)| {
                if !info.has_started() && !info.is_done() {
                    ' '
                } else if info.has_succeeded() {
                    '+'
                } else if info.has_failed() && info.is_done() {
                    if info.is_required() {
                        'X'
                    } else {
                        'x'
                    }
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for MultipleTestTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} done, {} required failed, {} optional failed [{}]",
            self.done_count(),
            self.total_count(),
            self.failed_required_count(),
            self.failed_optional_count(),
            self.progress_bar()
        )
    }
}
