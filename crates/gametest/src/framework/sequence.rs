use std::collections::VecDeque;

use super::error::{GameTestError, TestResult};
use super::helper::GameTestHelper;
use super::info::GameTestInfo;

pub(crate) type StepAction = Box<dyn FnMut(&mut GameTestHelper<'_>) -> TestResult>;
pub(crate) type FailureSupplier = Box<dyn FnMut() -> GameTestError>;

const NOT_YET_ELAPSED: &str = "test timed out before sequence completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Condition(pub(crate) usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Satisfied,
    Pending(GameTestError),
    Failed(GameTestError),
}

impl StepOutcome {
    fn from_result(result: TestResult) -> Self {
        match result {
            Ok(()) => StepOutcome::Satisfied,
            Err(error) if error.is_assertion() => StepOutcome::Pending(error),
            Err(error) => StepOutcome::Failed(error),
        }
    }

    // Executed steps get one chance; any error fails the test.
    fn from_execution(result: TestResult) -> Self {
        match result {
            Ok(()) => StepOutcome::Satisfied,
            Err(error) => StepOutcome::Failed(error),
        }
    }
}

enum StepKind {
    WaitUntil(StepAction),
    Execute(StepAction),
    ExecuteAfter { delay: i64, action: StepAction },
    ExecuteFor { duration: i64, check: StepAction },
    Trigger(Condition),
    Succeed,
    Fail(FailureSupplier),
}

struct Step {
    expected_delay: Option<i64>,
    kind: StepKind,
}

impl Step {
    fn evaluate(&mut self, helper: &mut GameTestHelper<'_>, last_tick: i64) -> StepOutcome {
        let tick = helper.tick();
        match &mut self.kind {
            StepKind::WaitUntil(check) => StepOutcome::from_result(check(helper)),
            StepKind::Execute(action) => StepOutcome::from_execution(action(helper)),
            StepKind::ExecuteAfter { delay, action } => {
                if tick < last_tick + *delay {
                    return StepOutcome::Pending(GameTestError::assertion(NOT_YET_ELAPSED, tick));
                }
                StepOutcome::from_execution(action(helper))
            }
            StepKind::ExecuteFor { duration, check } => {
                if tick >= last_tick + *duration {
                    return StepOutcome::Satisfied;
                }
                match check(helper) {
                    Ok(()) => StepOutcome::Pending(GameTestError::assertion(NOT_YET_ELAPSED, tick)),
                    Err(error) => StepOutcome::Failed(error),
                }
            }
            StepKind::Trigger(condition) => match helper.trigger_condition(*condition) {
                Ok(()) => StepOutcome::Satisfied,
                Err(error) => StepOutcome::Failed(error),
            },
            StepKind::Succeed => {
                helper.succeed();
                StepOutcome::Satisfied
            }
            StepKind::Fail(supplier) => {
                helper.fail(supplier());
                StepOutcome::Satisfied
            }
        }
    }
}

pub struct GameTestSequence {
    steps: VecDeque<Step>,
    last_tick: i64,
}

impl GameTestSequence {
    pub(crate) fn new(start_tick: i64) -> Self {
        Self {
            steps: VecDeque::new(),
            last_tick: start_tick,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn remaining_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn last_tick(&self) -> i64 {
        self.last_tick
    }

    fn push(&mut self, expected_delay: Option<i64>, kind: StepKind) {
        self.steps.push_back(Step {
            expected_delay,
            kind,
        });
    }

    pub(crate) fn tick_and_continue(&mut self, helper: &mut GameTestHelper<'_>) {
        self.run(helper, false);
    }

    pub(crate) fn tick_and_fail_if_not_complete(&mut self, helper: &mut GameTestHelper<'_>) {
        self.run(helper, true);
    }

    fn run(&mut self, helper: &mut GameTestHelper<'_>, fail_if_not_complete: bool) {
        let tick = helper.tick();
        while let Some(step) = self.steps.front_mut() {
            let anchor = self.last_tick;
            match step.evaluate(helper, anchor) {
                StepOutcome::Satisfied => {}
                StepOutcome::Pending(reason) => {
                    if fail_if_not_complete {
                        helper.fail(GameTestError::SequenceNotCompleted {
                            reason: reason.to_string(),
                            tick,
                        });
                    }
                    return;
                }
                StepOutcome::Failed(error) => {
                    helper.fail(error);
                    return;
                }
            }

            let expected_delay = step.expected_delay;
            self.steps.pop_front();
            self.last_tick = tick;
            if let Some(delay) = expected_delay {
                if tick - anchor != delay {
                    helper.fail(GameTestError::InvalidTick {
                        expected: anchor + delay,
                        actual: tick,
                    });
                    return;
                }
            }
        }
    }
}

pub struct SequenceBuilder<'a> {
    info: &'a mut GameTestInfo,
    index: usize,
}

impl<'a> SequenceBuilder<'a> {
    pub(crate) fn new(info: &'a mut GameTestInfo, index: usize) -> Self {
        Self { info, index }
    }

    fn push(&mut self, expected_delay: Option<i64>, kind: StepKind) -> &mut Self {
        if let Some(sequence) = self.info.sequence_mut(self.index) {
            sequence.push(expected_delay, kind);
        }
        self
    }

    pub fn then_wait_until<F>(&mut self, check: F) -> &mut Self
    where
        F: FnMut(&mut GameTestHelper<'_>) -> TestResult + 'static,
    {
        self.push(None, StepKind::WaitUntil(Box::new(check)))
    }

    /// Like `then_wait_until`, but the test fails unless `check` first passes
    /// exactly `delay` ticks after the previous step.
    pub fn then_wait_until_after<F>(&mut self, delay: u32, check: F) -> &mut Self
    where
        F: FnMut(&mut GameTestHelper<'_>) -> TestResult + 'static,
    {
        self.push(Some(i64::from(delay)), StepKind::WaitUntil(Box::new(check)))
    }

    pub fn then_execute<F>(&mut self, action: F) -> &mut Self
    where
        F: FnMut(&mut GameTestHelper<'_>) -> TestResult + 'static,
    {
        self.push(None, StepKind::Execute(Box::new(action)))
    }

    pub fn then_execute_after<F>(&mut self, delay: u32, action: F) -> &mut Self
    where
        F: FnMut(&mut GameTestHelper<'_>) -> TestResult + 'static,
    {
        self.push(
            None,
            StepKind::ExecuteAfter {
                delay: i64::from(delay),
                action: Box::new(action),
            },
        )
    }

    pub fn then_idle(&mut self, ticks: u32) -> &mut Self {
        self.then_execute_after(ticks, |_| Ok(()))
    }

    /// Runs `check` on every tick for `duration` ticks. The first error fails the test.
    pub fn then_execute_for<F>(&mut self, duration: u32, check: F) -> &mut Self
    where
        F: FnMut(&mut GameTestHelper<'_>) -> TestResult + 'static,
    {
        self.push(
            None,
            StepKind::ExecuteFor {
                duration: i64::from(duration),
                check: Box::new(check),
            },
        )
    }

    pub fn then_trigger(&mut self) -> Condition {
        let condition = self.info.new_condition();
        self.push(None, StepKind::Trigger(condition));
        condition
    }

    pub fn then_succeed(&mut self) -> &mut Self {
        self.push(None, StepKind::Succeed)
    }

    pub fn then_fail<F>(&mut self, supplier: F) -> &mut Self
    where
        F: FnMut() -> GameTestError + 'static,
    {
        self.push(None, StepKind::Fail(Box::new(supplier)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::framework::testing::{placed_info, tick_until_done, world_with_box};
    use crate::framework::{GameTestError, TestOutcome};
    use crate::world::BlockPos;

    #[test]
    fn execute_after_runs_once_on_the_due_tick_and_succeeds() {
        let runs = Arc::new(Mutex::new(Vec::<i64>::new()));
        let seen = Arc::clone(&runs);
        let mut world = world_with_box();
        let mut info = placed_info(&mut world, move |helper| {
            let seen = Arc::clone(&seen);
            helper
                .start_sequence()
                .then_execute_after(10, move |helper| {
                    seen.lock().expect("lock").push(helper.tick());
                    Ok(())
                })
                .then_succeed();
            Ok(())
        });

        let mut outcome = None;
        for _ in 0..=100 {
            if let Some(result) = info.tick(&mut world) {
                outcome = Some(result);
                break;
            }
        }

        assert_eq!(outcome, Some(TestOutcome::Passed));
        assert_eq!(*runs.lock().expect("lock"), vec![10]);
        assert_eq!(info.run_ticks(), Some(10));
    }

    #[test]
    fn wait_until_after_fails_test_when_satisfied_early() {
        let mut world = world_with_box();
        let mut info = placed_info(&mut world, |helper| {
            helper
                .start_sequence()
                .then_wait_until_after(5, |helper| {
                    if helper.tick() >= 3 {
                        Ok(())
                    } else {
                        Err(GameTestError::assertion("not yet", helper.tick()))
                    }
                })
                .then_succeed();
            Ok(())
        });

        let outcome = tick_until_done(&mut info, &mut world, 20);

        assert_eq!(outcome, Some(TestOutcome::Failed));
        assert_eq!(
            info.error(),
            Some(&GameTestError::InvalidTick {
                expected: 5,
                actual: 3
            })
        );
    }

    #[test]
    fn wait_until_after_passes_on_exact_tick() {
        let mut world = world_with_box();
        let mut info = placed_info(&mut world, |helper| {
            helper
                .start_sequence()
                .then_idle(2)
                .then_wait_until_after(4, |helper| {
                    if helper.tick() >= 6 {
                        Ok(())
                    } else {
                        Err(GameTestError::assertion("not yet", helper.tick()))
                    }
                })
                .then_succeed();
            Ok(())
        });

        let outcome = tick_until_done(&mut info, &mut world, 20);

        assert_eq!(outcome, Some(TestOutcome::Passed));
        assert_eq!(info.run_ticks(), Some(6));
    }

    #[test]
    fn execute_for_keeps_pending_until_duration_elapses() {
        let checks = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&checks);
        let mut world = world_with_box();
        let mut info = placed_info(&mut world, move |helper| {
            let counted = Arc::clone(&counted);
            helper
                .start_sequence()
                .then_execute_for(3, move |_| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .then_succeed();
            Ok(())
        });

        let outcome = tick_until_done(&mut info, &mut world, 20);

        assert_eq!(outcome, Some(TestOutcome::Passed));
        assert_eq!(checks.load(Ordering::SeqCst), 3);
        assert_eq!(info.run_ticks(), Some(3));
    }

    #[test]
    fn execute_after_error_fails_the_test() {
        let mut world = world_with_box();
        let mut info = placed_info(&mut world, |helper| {
            helper
                .start_sequence()
                .then_execute_after(1, |helper| {
                    Err(GameTestError::assertion("lever stayed off", helper.tick()))
                })
                .then_succeed();
            Ok(())
        });

        let outcome = tick_until_done(&mut info, &mut world, 20);

        assert_eq!(outcome, Some(TestOutcome::Failed));
        assert_eq!(
            info.error(),
            Some(&GameTestError::assertion("lever stayed off", 1))
        );
    }

    #[test]
    fn trigger_records_the_tick_it_fired_on() {
        let mut world = world_with_box();
        let mut info = placed_info(&mut world, |helper| {
            let mut sequence = helper.start_sequence();
            sequence.then_idle(2);
            let condition = sequence.then_trigger();
            sequence
                .then_execute(move |helper| helper.assert_triggered_this_tick(condition))
                .then_succeed();
            Ok(())
        });

        let outcome = tick_until_done(&mut info, &mut world, 20);

        assert_eq!(outcome, Some(TestOutcome::Passed));
        assert_eq!(info.run_ticks(), Some(2));
    }

    #[test]
    fn then_fail_records_supplied_error() {
        let mut world = world_with_box();
        let mut info = placed_info(&mut world, |helper| {
            helper
                .start_sequence()
                .then_idle(1)
                .then_fail(|| GameTestError::Unknown("scripted".to_string()));
            Ok(())
        });

        let outcome = tick_until_done(&mut info, &mut world, 20);

        assert_eq!(outcome, Some(TestOutcome::Failed));
        assert_eq!(info.error(), Some(&GameTestError::Unknown("scripted".to_string())));
    }

    #[test]
    fn execute_for_fails_on_the_first_broken_check() {
        let checks = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&checks);
        let mut world = world_with_box();
        let mut info = placed_info(&mut world, move |helper| {
            let counted = Arc::clone(&counted);
            helper
                .start_sequence()
                .then_execute_for(5, move |helper| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Err(GameTestError::assertion("invariant broken", helper.tick()))
                })
                .then_succeed();
            Ok(())
        });

        let outcome = tick_until_done(&mut info, &mut world, 20);

        assert_eq!(outcome, Some(TestOutcome::Failed));
        assert_eq!(
            info.error(),
            Some(&GameTestError::assertion("invariant broken", 0))
        );
        assert_eq!(checks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn execute_does_not_retry_a_failed_assertion() {
        let checks = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&checks);
        let mut world = world_with_box();
        let mut info = placed_info(&mut world, move |helper| {
            let counted = Arc::clone(&counted);
            helper
                .start_sequence()
                .then_idle(1)
                .then_execute(move |helper| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    helper.assert_block_present("minecraft:gold_block", BlockPos::new(0, 1, 0))
                })
                .then_succeed();
            Ok(())
        });

        let outcome = tick_until_done(&mut info, &mut world, 20);

        assert_eq!(outcome, Some(TestOutcome::Failed));
        assert!(info.error().is_some_and(GameTestError::is_assertion));
        assert_eq!(checks.load(Ordering::SeqCst), 1);
    }
}
