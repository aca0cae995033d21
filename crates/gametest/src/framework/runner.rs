use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::content::{EnvironmentRegistry, TestEnvironment};
use crate::report::{AttemptCounter, LogTestReporter, ReportGameListener, TestReporter};
use crate::world::World;

use super::batch::{BatchError, GameTestBatch, GameTestBatchFactory, TestBatcher};
use super::error::GameTestError;
use super::info::{GameTestInfo, TestOutcome};
use super::listener::{GameTestBatchListener, GameTestListener, ListenerContext};
use super::spawner::{InPlaceSpawner, NotSetSpawner, StructureSpawner};
use super::ticker::{RunnerId, TickerHandle};
use super::tracker::{MultipleTestTracker, TestInstanceId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    #[error("runner has already been started")]
    AlreadyStarted,
    #[error("no runner registered as {0:?}")]
    UnknownRunner(RunnerId),
    #[error("test instance {0} is not tracked by this runner")]
    UnknownTest(TestInstanceId),
    #[error("failed to batch tests: {0}")]
    Batch(#[from] BatchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerPhase {
    NotStarted,
    Running,
    Finished,
    Halted,
}

pub struct GameTestRunnerBuilder {
    tests: Vec<GameTestInfo>,
    batcher: Box<dyn TestBatcher>,
    existing_structure_spawner: Box<dyn StructureSpawner>,
    new_structure_spawner: Box<dyn StructureSpawner>,
    halt_on_error: bool,
    clear_between_batches: bool,
    environments: EnvironmentRegistry,
    reporter: Box<dyn TestReporter>,
    listeners: Vec<Box<dyn GameTestListener>>,
    batch_listeners: Vec<Box<dyn GameTestBatchListener>>,
}

impl Default for GameTestRunnerBuilder {
    fn default() -> Self {
        Self {
            tests: Vec::new(),
            batcher: Box::new(GameTestBatchFactory::default()),
            existing_structure_spawner: Box::new(InPlaceSpawner),
            new_structure_spawner: Box::new(NotSetSpawner),
            halt_on_error: false,
            clear_between_batches: false,
            environments: EnvironmentRegistry::new(),
            reporter: Box::new(LogTestReporter::default()),
            listeners: Vec::new(),
            batch_listeners: Vec::new(),
        }
    }
}

impl GameTestRunnerBuilder {
    pub fn test(mut self, info: GameTestInfo) -> Self {
        self.tests.push(info);
        self
    }

    pub fn tests(mut self, infos: impl IntoIterator<Item = GameTestInfo>) -> Self {
        self.tests.extend(infos);
        self
    }

    pub fn batcher(mut self, batcher: Box<dyn TestBatcher>) -> Self {
        self.batcher = batcher;
        self
    }

    pub fn existing_structure_spawner(mut self, spawner: Box<dyn StructureSpawner>) -> Self {
        self.existing_structure_spawner = spawner;
        self
    }

    pub fn new_structure_spawner(mut self, spawner: Box<dyn StructureSpawner>) -> Self {
        self.new_structure_spawner = spawner;
        self
    }

    pub fn halt_on_error(mut self, halt_on_error: bool) -> Self {
        self.halt_on_error = halt_on_error;
        self
    }

    pub fn clear_between_batches(mut self, clear_between_batches: bool) -> Self {
        self.clear_between_batches = clear_between_batches;
        self
    }

    pub fn environments(mut self, environments: EnvironmentRegistry) -> Self {
        self.environments = environments;
        self
    }

    pub fn reporter(mut self, reporter: Box<dyn TestReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn listener(mut self, listener: Box<dyn GameTestListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn batch_listener(mut self, listener: Box<dyn GameTestBatchListener>) -> Self {
        self.batch_listeners.push(listener);
        self
    }

    pub fn build(self) -> GameTestRunner {
        let mut tracker = MultipleTestTracker::new();
        let initial = self
            .tests
            .into_iter()
            .map(|info| tracker.add(info))
            .collect();
        for listener in self.listeners {
            tracker.add_listener(listener);
        }
        GameTestRunner {
            tracker,
            report: ReportGameListener::new(),
            batcher: self.batcher,
            existing_structure_spawner: self.existing_structure_spawner,
            new_structure_spawner: self.new_structure_spawner,
            halt_on_error: self.halt_on_error,
            clear_between_batches: self.clear_between_batches,
            environments: self.environments,
            reporter: self.reporter,
            batch_listeners: self.batch_listeners,
            initial,
            batches: Vec::new(),
            current_batch: None,
            active_environment: None,
            scheduled_for_rerun: Vec::new(),
            phase: RunnerPhase::NotStarted,
        }
    }
}

pub struct GameTestRunner {
    tracker: MultipleTestTracker,
    report: ReportGameListener,
    batcher: Box<dyn TestBatcher>,
    existing_structure_spawner: Box<dyn StructureSpawner>,
    new_structure_spawner: Box<dyn StructureSpawner>,
    halt_on_error: bool,
    clear_between_batches: bool,
    environments: EnvironmentRegistry,
    reporter: Box<dyn TestReporter>,
    batch_listeners: Vec<Box<dyn GameTestBatchListener>>,
    initial: Vec<TestInstanceId>,
    batches: Vec<GameTestBatch>,
    current_batch: Option<usize>,
    active_environment: Option<Arc<dyn TestEnvironment>>,
    scheduled_for_rerun: Vec<TestInstanceId>,
    phase: RunnerPhase,
}

impl GameTestRunner {
    pub fn builder() -> GameTestRunnerBuilder {
        GameTestRunnerBuilder::default()
    }

    pub fn tracker(&self) -> &MultipleTestTracker {
        &self.tracker
    }

    pub fn phase(&self) -> RunnerPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, RunnerPhase::Finished | RunnerPhase::Halted)
    }

    pub fn batches(&self) -> &[GameTestBatch] {
        &self.batches
    }

    pub fn current_batch(&self) -> Option<&GameTestBatch> {
        self.current_batch.and_then(|index| self.batches.get(index))
    }

    pub fn attempts(&self, id: TestInstanceId) -> Option<AttemptCounter> {
        self.report.counter(id)
    }

    pub fn scheduled_rerun_count(&self) -> usize {
        self.scheduled_for_rerun.len()
    }

    pub(crate) fn start(
        &mut self,
        world: &mut dyn World,
        ticker: &mut TickerHandle<'_>,
    ) -> Result<(), RunnerError> {
        if self.phase != RunnerPhase::NotStarted {
            return Err(RunnerError::AlreadyStarted);
        }
        self.batches = self
            .batcher
            .batch(&self.initial, &self.tracker, &self.environments)?;
        self.phase = RunnerPhase::Running;
        info!(
            tests = self.initial.len(),
            batches = self.batches.len(),
            "runner_starting"
        );
        self.run_batch(0, world, ticker);
        Ok(())
    }

    fn run_batch(&mut self, mut index: usize, world: &mut dyn World, ticker: &mut TickerHandle<'_>) {
        while self.phase == RunnerPhase::Running {
            if index >= self.batches.len() {
                self.teardown_environment(world);
                self.current_batch = None;
                if self.scheduled_for_rerun.is_empty() {
                    self.finish_run();
                    return;
                }
                let reruns = std::mem::take(&mut self.scheduled_for_rerun);
                match self
                    .batcher
                    .batch(&reruns, &self.tracker, &self.environments)
                {
                    Ok(batches) => {
                        info!(tests = reruns.len(), batches = batches.len(), "running_scheduled_reruns");
                        self.batches = batches;
                        index = 0;
                        continue;
                    }
                    Err(error) => {
                        error!(error = %error, "rerun_batching_failed");
                        self.halt(world, ticker);
                        return;
                    }
                }
            }

            if index > 0 && self.clear_between_batches {
                self.clear_batch_structures(index - 1, world);
            }
            self.current_batch = Some(index);
            self.existing_structure_spawner.on_batch_start(world);
            self.new_structure_spawner.on_batch_start(world);

            let batch = self.batches[index].clone();
            let (spawned, unspawned) = self.spawn_batch(&batch, world);
            for id in &spawned {
                self.notify_structure_loaded(*id);
            }
            for id in unspawned {
                self.finalize_unspawned(id);
                self.dispatch_finished(id, TestOutcome::Failed);
                if self.halt_on_error {
                    self.halt(world, ticker);
                    return;
                }
            }

            self.teardown_environment(world);
            batch.environment().setup(world);
            self.active_environment = Some(Arc::clone(batch.environment()));
            info!(
                index = batch.index(),
                environment = %batch.environment_name(),
                tests = spawned.len(),
                "test_batch_starting"
            );
            for listener in &mut self.batch_listeners {
                listener.test_batch_starting(&batch);
            }

            if spawned.is_empty() {
                self.finish_batch(&batch, world);
                index += 1;
                continue;
            }
            for id in spawned {
                ticker.add(id);
            }
            return;
        }
    }

    fn spawn_batch(
        &mut self,
        batch: &GameTestBatch,
        world: &mut dyn World,
    ) -> (Vec<TestInstanceId>, Vec<TestInstanceId>) {
        let mut spawned = Vec::new();
        let mut unspawned = Vec::new();
        for id in batch.tests() {
            let Some(info) = self.tracker.get_mut(*id) else {
                continue;
            };
            let spawner = if info.origin().is_some() {
                &mut self.existing_structure_spawner
            } else {
                &mut self.new_structure_spawner
            };
            match spawner.spawn_structure(info, world) {
                Some(_) => spawned.push(*id),
                None => unspawned.push(*id),
            }
        }
        (spawned, unspawned)
    }

    fn finalize_unspawned(&mut self, id: TestInstanceId) {
        let Some(info) = self.tracker.get_mut(id) else {
            return;
        };
        if info.error().is_none() {
            let structure = info.structure_name().to_string();
            info.fail(GameTestError::Placement {
                structure,
                reason: "structure could not be spawned".to_string(),
            });
        }
        info.finish();
        warn!(test = %info.name(), "test_structure_spawn_failed");
    }

    fn clear_batch_structures(&mut self, index: usize, world: &mut dyn World) {
        let Some(batch) = self.batches.get(index) else {
            return;
        };
        for id in batch.tests() {
            if let Some(bounds) = self.tracker.get(*id).and_then(GameTestInfo::bounds) {
                world.clear_structure(bounds);
            }
        }
    }

    pub(crate) fn tick_test(
        &mut self,
        id: TestInstanceId,
        world: &mut dyn World,
        ticker: &mut TickerHandle<'_>,
    ) -> bool {
        if self.phase != RunnerPhase::Running {
            return true;
        }
        let Some(info) = self.tracker.get_mut(id) else {
            return true;
        };
        match info.tick(world) {
            Some(outcome) => {
                self.on_test_finished(id, outcome, world, ticker);
                true
            }
            None => info.is_done(),
        }
    }

    fn on_test_finished(
        &mut self,
        id: TestInstanceId,
        outcome: TestOutcome,
        world: &mut dyn World,
        ticker: &mut TickerHandle<'_>,
    ) {
        debug!(test = %id, outcome = ?outcome, "test_finished");
        self.dispatch_finished(id, outcome);
        if outcome == TestOutcome::Failed && self.halt_on_error {
            self.halt(world, ticker);
            return;
        }
        let Some(index) = self.current_batch else {
            return;
        };
        let finished = self.batches.get(index).is_some_and(|batch| {
            batch
                .tests()
                .iter()
                .all(|test| self.tracker.get(*test).map_or(true, GameTestInfo::is_done))
        });
        if finished {
            let batch = self.batches[index].clone();
            self.finish_batch(&batch, world);
            self.run_batch(index + 1, world, ticker);
        }
    }

    fn notify_structure_loaded(&mut self, id: TestInstanceId) {
        if let Some(info) = self.tracker.get(id) {
            self.report.test_structure_loaded(id, info);
        }
        self.tracker.notify_structure_loaded(id);
    }

    fn dispatch_finished(&mut self, id: TestInstanceId, outcome: TestOutcome) {
        let mut reruns = Vec::new();
        if let Some(info) = self.tracker.get(id) {
            let mut context = ListenerContext::new(&mut reruns, self.reporter.as_mut());
            match outcome {
                TestOutcome::Passed => self.report.test_passed(id, info, &mut context),
                TestOutcome::Failed => self.report.test_failed(id, info, &mut context),
            }
        }
        self.tracker
            .notify_finished(id, outcome, &mut reruns, self.reporter.as_mut());
        for original in reruns {
            self.schedule_rerun(original);
        }
    }

    fn schedule_rerun(&mut self, original: TestInstanceId) -> Option<TestInstanceId> {
        let rerun = self.tracker.add_rerun(original)?;
        if let Some(info) = self.tracker.get(rerun) {
            self.report.test_added_for_rerun(original, rerun, info);
            info!(test = %info.name(), original = %original, rerun = %rerun, "test_rerun_scheduled");
        }
        self.scheduled_for_rerun.push(rerun);
        Some(rerun)
    }

    pub(crate) fn rerun_test(
        &mut self,
        id: TestInstanceId,
        world: &mut dyn World,
        ticker: &mut TickerHandle<'_>,
    ) -> Result<TestInstanceId, RunnerError> {
        let rerun = self
            .schedule_rerun(id)
            .ok_or(RunnerError::UnknownTest(id))?;
        if self.phase == RunnerPhase::Finished {
            self.phase = RunnerPhase::Running;
            let end = self.batches.len();
            self.run_batch(end, world, ticker);
        }
        Ok(rerun)
    }

    fn finish_batch(&mut self, batch: &GameTestBatch, world: &mut dyn World) {
        for listener in &mut self.batch_listeners {
            listener.test_batch_finished(batch);
        }
        world.release_forced_chunks();
        info!(
            index = batch.index(),
            environment = %batch.environment_name(),
            progress = %self.tracker.progress_bar(),
            "test_batch_finished"
        );
    }

    fn teardown_environment(&mut self, world: &mut dyn World) {
        if let Some(environment) = self.active_environment.take() {
            environment.teardown(world);
        }
    }

    fn halt(&mut self, world: &mut dyn World, ticker: &mut TickerHandle<'_>) {
        self.discard_pending_work(world, ticker);
        warn!(
            failed_required = self.tracker.failed_required_count(),
            progress = %self.tracker.progress_bar(),
            "runner_halted"
        );
        self.finish_reporter();
    }

    pub(crate) fn stop(&mut self, world: &mut dyn World, ticker: &mut TickerHandle<'_>) {
        if matches!(self.phase, RunnerPhase::Halted | RunnerPhase::Finished) {
            return;
        }
        self.discard_pending_work(world, ticker);
        info!(progress = %self.tracker.progress_bar(), "runner_stopped");
        self.finish_reporter();
    }

    fn discard_pending_work(&mut self, world: &mut dyn World, ticker: &mut TickerHandle<'_>) {
        self.phase = RunnerPhase::Halted;
        self.teardown_environment(world);
        world.release_forced_chunks();
        ticker.clear();
        self.scheduled_for_rerun.clear();
        self.current_batch = None;
    }

    fn finish_run(&mut self) {
        self.phase = RunnerPhase::Finished;
        info!(
            total = self.tracker.total_count(),
            passed = self.tracker.passed_count(),
            failed_required = self.tracker.failed_required_count(),
            failed_optional = self.tracker.failed_optional_count(),
            attempts = self.tracker.attempt_count(),
            "runner_finished"
        );
        self.finish_reporter();
    }

    fn finish_reporter(&mut self) {
        if let Err(error) = self.reporter.finish() {
            error!(error = %error, "report_finish_failed");
        }
    }
}
