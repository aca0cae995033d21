use tracing::debug;

use crate::world::World;

use super::runner::{GameTestRunner, RunnerError};
use super::tracker::TestInstanceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunnerId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TestKey {
    pub runner: RunnerId,
    pub test: TestInstanceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerState {
    Idle,
    Running,
    Halting,
}

pub struct TickerHandle<'a> {
    runner: RunnerId,
    tests: &'a mut Vec<TestKey>,
    pending: &'a mut Vec<TestKey>,
    halted: &'a mut Vec<RunnerId>,
    state: &'a mut TickerState,
}

impl TickerHandle<'_> {
    pub fn add(&mut self, test: TestInstanceId) {
        let key = TestKey {
            runner: self.runner,
            test,
        };
        match self.state {
            TickerState::Idle => self.tests.push(key),
            TickerState::Running | TickerState::Halting => self.pending.push(key),
        }
    }

    /// Drops every live test of this runner. During a tick the removal is
    /// deferred until iteration has finished.
    pub fn clear(&mut self) {
        match self.state {
            TickerState::Idle => {
                let runner = self.runner;
                self.tests.retain(|key| key.runner != runner);
                self.pending.retain(|key| key.runner != runner);
            }
            TickerState::Running | TickerState::Halting => {
                *self.state = TickerState::Halting;
                if !self.halted.contains(&self.runner) {
                    self.halted.push(self.runner);
                }
            }
        }
    }

    pub fn state(&self) -> TickerState {
        *self.state
    }
}

pub struct GameTestTicker {
    runners: Vec<Option<GameTestRunner>>,
    tests: Vec<TestKey>,
    pending: Vec<TestKey>,
    halted: Vec<RunnerId>,
    state: TickerState,
}

impl Default for GameTestTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl GameTestTicker {
    pub fn new() -> Self {
        Self {
            runners: Vec::new(),
            tests: Vec::new(),
            pending: Vec::new(),
            halted: Vec::new(),
            state: TickerState::Idle,
        }
    }

    pub fn state(&self) -> TickerState {
        self.state
    }

    pub fn live_count(&self) -> usize {
        self.tests.len()
    }

    pub fn live_tests(&self) -> &[TestKey] {
        &self.tests
    }

    pub fn add_runner(&mut self, runner: GameTestRunner) -> RunnerId {
        self.runners.push(Some(runner));
        RunnerId(self.runners.len() - 1)
    }

    pub fn runner(&self, id: RunnerId) -> Option<&GameTestRunner> {
        self.runners.get(id.0).and_then(Option::as_ref)
    }

    pub fn remove_runner(&mut self, id: RunnerId) -> Option<GameTestRunner> {
        let runner = self.runners.get_mut(id.0).and_then(Option::take)?;
        self.tests.retain(|key| key.runner != id);
        self.pending.retain(|key| key.runner != id);
        Some(runner)
    }

    pub fn all_runners_finished(&self) -> bool {
        self.runners
            .iter()
            .flatten()
            .all(GameTestRunner::is_finished)
    }

    pub fn start(&mut self, id: RunnerId, world: &mut dyn World) -> Result<(), RunnerError> {
        self.with_runner(id, |runner, handle| runner.start(world, handle))?
    }

    pub fn start_runner(
        &mut self,
        runner: GameTestRunner,
        world: &mut dyn World,
    ) -> Result<RunnerId, RunnerError> {
        let id = self.add_runner(runner);
        self.start(id, world)?;
        Ok(id)
    }

    pub fn rerun_test(
        &mut self,
        id: RunnerId,
        test: TestInstanceId,
        world: &mut dyn World,
    ) -> Result<TestInstanceId, RunnerError> {
        self.with_runner(id, |runner, handle| runner.rerun_test(test, world, handle))?
    }

    pub fn stop_runner(&mut self, id: RunnerId, world: &mut dyn World) -> Result<(), RunnerError> {
        self.with_runner(id, |runner, handle| runner.stop(world, handle))
    }

    fn with_runner<R>(
        &mut self,
        id: RunnerId,
        body: impl FnOnce(&mut GameTestRunner, &mut TickerHandle<'_>) -> R,
    ) -> Result<R, RunnerError> {
        let runner = self
            .runners
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(RunnerError::UnknownRunner(id))?;
        let mut handle = TickerHandle {
            runner: id,
            tests: &mut self.tests,
            pending: &mut self.pending,
            halted: &mut self.halted,
            state: &mut self.state,
        };
        Ok(body(runner, &mut handle))
    }

    pub fn tick(&mut self, world: &mut dyn World) {
        self.state = TickerState::Running;
        let live = std::mem::take(&mut self.tests);
        let mut still_running = Vec::with_capacity(live.len());
        for key in live {
            let Some(Some(runner)) = self.runners.get_mut(key.runner.0) else {
                continue;
            };
            let mut handle = TickerHandle {
                runner: key.runner,
                tests: &mut self.tests,
                pending: &mut self.pending,
                halted: &mut self.halted,
                state: &mut self.state,
            };
            if !runner.tick_test(key.test, world, &mut handle) {
                still_running.push(key);
            }
        }
        still_running.append(&mut self.pending);
        self.tests = still_running;

        if self.state == TickerState::Halting {
            let halted = std::mem::take(&mut self.halted);
            self.tests.retain(|key| !halted.contains(&key.runner));
            debug!(runners = halted.len(), remaining = self.tests.len(), "ticker_halted");
        }
        self.state = TickerState::Idle;
    }

    pub fn clear(&mut self) {
        self.tests.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::TestDefinition;
    use crate::framework::testing::{game_test, world_with_box};
    use crate::framework::{
        GameTestError, GameTestInfo, GameTestRunner, RetryOptions, StructureGridSpawner,
    };
    use crate::world::BlockPos;

    fn runner_with(tests: Vec<GameTestInfo>, halt_on_error: bool, origin: BlockPos) -> GameTestRunner {
        GameTestRunner::builder()
            .tests(tests)
            .new_structure_spawner(Box::new(StructureGridSpawner::new(origin, 8, false)))
            .halt_on_error(halt_on_error)
            .build()
    }

    fn failing(name: &str) -> GameTestInfo {
        let test = game_test(TestDefinition::new(name, "test:box"), |helper| {
            Err(GameTestError::assertion("broken", helper.tick()))
        });
        GameTestInfo::from_test(test, RetryOptions::no_retries())
    }

    fn waiting(name: &str) -> GameTestInfo {
        let test = game_test(TestDefinition::new(name, "test:box").with_max_ticks(50), |_| Ok(()));
        GameTestInfo::from_test(test, RetryOptions::no_retries())
    }

    #[test]
    fn halt_during_tick_is_applied_after_iteration() {
        let mut world = world_with_box();
        let mut ticker = GameTestTicker::new();
        let halting = ticker
            .start_runner(
                runner_with(vec![failing("a"), waiting("b")], true, BlockPos::ORIGIN),
                &mut world,
            )
            .expect("start halting runner");
        let steady = ticker
            .start_runner(
                runner_with(vec![waiting("c")], false, BlockPos::new(0, 0, 100)),
                &mut world,
            )
            .expect("start steady runner");
        assert_eq!(ticker.live_count(), 3);

        ticker.tick(&mut world);
        assert_eq!(ticker.live_count(), 3);
        ticker.tick(&mut world);

        assert_eq!(ticker.state(), TickerState::Idle);
        assert_eq!(ticker.live_tests().len(), 1);
        assert!(ticker.live_tests().iter().all(|key| key.runner == steady));
        assert!(ticker.runner(halting).is_some_and(GameTestRunner::is_finished));
        assert!(!ticker.all_runners_finished());
    }

    #[test]
    fn handle_defers_additions_while_running() {
        let mut tests = Vec::new();
        let mut pending = Vec::new();
        let mut halted = Vec::new();
        let mut state = TickerState::Running;
        let mut handle = TickerHandle {
            runner: RunnerId(0),
            tests: &mut tests,
            pending: &mut pending,
            halted: &mut halted,
            state: &mut state,
        };

        handle.add(TestInstanceId(4));
        handle.clear();

        assert_eq!(handle.state(), TickerState::Halting);
        assert!(tests.is_empty());
        assert_eq!(pending.len(), 1);
        assert_eq!(halted, vec![RunnerId(0)]);
    }

    #[test]
    fn idle_clear_only_touches_own_runner() {
        let mut tests = vec![
            TestKey {
                runner: RunnerId(0),
                test: TestInstanceId(0),
            },
            TestKey {
                runner: RunnerId(1),
                test: TestInstanceId(0),
            },
        ];
        let mut pending = Vec::new();
        let mut halted = Vec::new();
        let mut state = TickerState::Idle;
        let mut handle = TickerHandle {
            runner: RunnerId(1),
            tests: &mut tests,
            pending: &mut pending,
            halted: &mut halted,
            state: &mut state,
        };

        handle.clear();

        assert_eq!(state, TickerState::Idle);
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].runner, RunnerId(0));
    }

    #[test]
    fn unknown_runner_is_an_error() {
        let mut world = world_with_box();
        let mut ticker = GameTestTicker::new();

        let error = ticker.start(RunnerId(3), &mut world).expect_err("unknown runner");

        assert_eq!(error, RunnerError::UnknownRunner(RunnerId(3)));
    }

    #[test]
    fn starting_twice_is_rejected() {
        let mut world = world_with_box();
        let mut ticker = GameTestTicker::new();
        let id = ticker
            .start_runner(runner_with(vec![waiting("a")], false, BlockPos::ORIGIN), &mut world)
            .expect("start");

        assert_eq!(ticker.start(id, &mut world), Err(RunnerError::AlreadyStarted));
        ticker.stop_runner(id, &mut world).expect("stop");
        assert_eq!(ticker.live_count(), 0);
    }
}
