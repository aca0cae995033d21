use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::content::{GameTest, TestDefinition};
use crate::world::{BlockPos, BoundingBox, Rotation, World};

use super::error::{GameTestError, TestResult, TimeoutKind};
use super::helper::GameTestHelper;
use super::retry::RetryOptions;
use super::sequence::{Condition, GameTestSequence, StepAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeferredId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed,
}

struct DeferredAssertion {
    due_tick: i64,
    action: StepAction,
}

/// One attempt at running a test. Never reused: reruns get a fresh copy
/// from `copy_reset`.
pub struct GameTestInfo {
    test: Arc<GameTest>,
    rotation: Rotation,
    retry_options: RetryOptions,
    origin: Option<BlockPos>,
    bounds: Option<BoundingBox>,
    tick_count: i64,
    placed_structure: bool,
    chunks_loaded: bool,
    started: bool,
    done: bool,
    error: Option<GameTestError>,
    sequences: Vec<GameTestSequence>,
    tick_hooks: Vec<StepAction>,
    deferred: BTreeMap<DeferredId, DeferredAssertion>,
    next_deferred: u64,
    conditions: Vec<Option<i64>>,
    finished_at_tick: Option<i64>,
    started_at: Option<Instant>,
    run_duration: Option<Duration>,
}

impl GameTestInfo {
    pub fn new(test: Arc<GameTest>, rotation: Rotation, retry_options: RetryOptions) -> Self {
        let setup_ticks = i64::from(test.definition().setup_ticks);
        Self {
            test,
            rotation,
            retry_options,
            origin: None,
            bounds: None,
            tick_count: -setup_ticks - 1,
            placed_structure: false,
            chunks_loaded: false,
            started: false,
            done: false,
            error: None,
            sequences: Vec::new(),
            tick_hooks: Vec::new(),
            deferred: BTreeMap::new(),
            next_deferred: 0,
            conditions: Vec::new(),
            finished_at_tick: None,
            started_at: None,
            run_duration: None,
        }
    }

    pub fn from_test(test: Arc<GameTest>, retry_options: RetryOptions) -> Self {
        let rotation = test.definition().rotation;
        Self::new(test, rotation, retry_options)
    }

    pub fn copy_reset(&self) -> Self {
        let mut copy = Self::new(Arc::clone(&self.test), self.rotation, self.retry_options);
        copy.origin = self.origin;
        copy
    }

    pub fn test(&self) -> &Arc<GameTest> {
        &self.test
    }

    pub fn definition(&self) -> &TestDefinition {
        self.test.definition()
    }

    pub fn name(&self) -> &str {
        self.test.name()
    }

    pub fn structure_name(&self) -> &str {
        &self.definition().structure
    }

    pub fn environment_name(&self) -> &str {
        &self.definition().environment
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn retry_options(&self) -> RetryOptions {
        self.retry_options
    }

    pub fn is_required(&self) -> bool {
        self.definition().required
    }

    pub fn is_optional(&self) -> bool {
        !self.is_required()
    }

    pub fn is_flaky(&self) -> bool {
        self.definition().is_flaky()
    }

    pub fn max_attempts(&self) -> u32 {
        self.definition().max_attempts
    }

    pub fn required_successes(&self) -> u32 {
        self.definition().required_successes
    }

    pub fn max_ticks(&self) -> u32 {
        self.definition().max_ticks
    }

    pub fn origin(&self) -> Option<BlockPos> {
        self.origin
    }

    pub fn set_origin(&mut self, origin: BlockPos) {
        self.origin = Some(origin);
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }

    pub fn tick_count(&self) -> i64 {
        self.tick_count
    }

    pub fn has_placed_structure(&self) -> bool {
        self.placed_structure
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn is_running(&self) -> bool {
        self.started && !self.done
    }

    pub fn has_succeeded(&self) -> bool {
        self.done && self.error.is_none()
    }

    pub fn has_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&GameTestError> {
        self.error.as_ref()
    }

    pub fn run_ticks(&self) -> Option<i64> {
        self.finished_at_tick
    }

    pub fn run_duration(&self) -> Option<Duration> {
        self.run_duration
    }

    pub fn outcome(&self) -> Option<TestOutcome> {
        match (self.done, self.error.is_some()) {
            (false, _) => None,
            (true, false) => Some(TestOutcome::Passed),
            (true, true) => Some(TestOutcome::Failed),
        }
    }

    pub fn start_execution(&mut self, delay: u32) {
        self.tick_count = -(i64::from(self.definition().setup_ticks) + i64::from(delay));
    }

    pub fn place_structure(&mut self, world: &mut dyn World) -> Result<BoundingBox, GameTestError> {
        if self.placed_structure {
            if let Some(bounds) = self.bounds {
                return Ok(bounds);
            }
        }
        match self.try_place_structure(world) {
            Ok(bounds) => {
                self.placed_structure = true;
                self.bounds = Some(bounds);
                debug!(
                    test = %self.name(),
                    structure = %self.structure_name(),
                    bounds = %bounds,
                    "test_structure_placed"
                );
                Ok(bounds)
            }
            Err(error) => {
                self.fail(error.clone());
                Err(error)
            }
        }
    }

    fn try_place_structure(&self, world: &mut dyn World) -> Result<BoundingBox, GameTestError> {
        let structure = self.structure_name().to_string();
        let origin = self.origin.ok_or_else(|| GameTestError::Placement {
            structure: structure.clone(),
            reason: "no position was assigned".to_string(),
        })?;
        let template =
            world
                .structures()
                .template(&structure)
                .ok_or_else(|| GameTestError::Placement {
                    structure: structure.clone(),
                    reason: "unknown structure template".to_string(),
                })?;
        world
            .place_structure(&template, origin, self.rotation)
            .map_err(|error| GameTestError::Placement {
                structure,
                reason: error.to_string(),
            })
    }

    /// Advances the test by one world tick. Returns the outcome on the tick
    /// the test finishes and `None` otherwise.
    pub fn tick(&mut self, world: &mut dyn World) -> Option<TestOutcome> {
        if self.done {
            return None;
        }
        if !self.placed_structure {
            self.fail(GameTestError::StructureNotPlaced);
        } else if let Some(origin) = self.origin {
            if world.structure_at(origin).is_none() {
                self.fail(GameTestError::MissingStructure { origin });
            }
        }
        if self.error.is_some() {
            self.finish();
            return self.outcome();
        }

        if !self.chunks_loaded {
            let Some(bounds) = self.bounds else {
                return None;
            };
            if !world.chunks_loaded(bounds) {
                return None;
            }
            self.chunks_loaded = true;
        }

        self.tick_internal(world);
        if self.done {
            self.outcome()
        } else {
            None
        }
    }

    fn tick_internal(&mut self, world: &mut dyn World) {
        self.tick_count += 1;
        if self.tick_count < 0 {
            return;
        }
        if !self.started {
            self.start_test(world);
        }
        self.run_due_deferred(world);

        let timed_out = self.tick_count > i64::from(self.max_ticks());
        if !timed_out {
            self.run_tick_hooks(world);
        }

        let mut sequences = std::mem::take(&mut self.sequences);
        if timed_out {
            if sequences.is_empty() {
                self.fail(GameTestError::Timeout {
                    kind: TimeoutKind::NoResult,
                    max_ticks: self.max_ticks(),
                });
            } else {
                for sequence in &mut sequences {
                    self.guarded(world, |helper| {
                        sequence.tick_and_fail_if_not_complete(helper);
                        Ok(())
                    });
                }
                if self.error.is_none() {
                    self.fail(GameTestError::Timeout {
                        kind: TimeoutKind::NoSequencesFinished,
                        max_ticks: self.max_ticks(),
                    });
                }
            }
        } else {
            for sequence in &mut sequences {
                self.guarded(world, |helper| {
                    sequence.tick_and_continue(helper);
                    Ok(())
                });
            }
        }
        // Sequences started by steps during this tick were pushed onto the
        // emptied list; keep them after the ones that already existed.
        sequences.retain(|sequence| !sequence.is_exhausted());
        sequences.append(&mut self.sequences);
        self.sequences = sequences;
    }

    fn start_test(&mut self, world: &mut dyn World) {
        self.started = true;
        self.started_at = Some(Instant::now());
        let function = Arc::clone(self.test.function());
        self.guarded(world, |helper| function(helper));
    }

    fn run_due_deferred(&mut self, world: &mut dyn World) {
        let due = self
            .deferred
            .iter()
            .filter(|(_, entry)| entry.due_tick <= self.tick_count)
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        for id in due {
            let Some(mut entry) = self.deferred.remove(&id) else {
                continue;
            };
            self.guarded(world, |helper| (entry.action)(helper));
        }
    }

    fn run_tick_hooks(&mut self, world: &mut dyn World) {
        let mut hooks = std::mem::take(&mut self.tick_hooks);
        for hook in &mut hooks {
            self.guarded(world, |helper| hook(helper));
        }
        hooks.append(&mut self.tick_hooks);
        self.tick_hooks = hooks;
    }

    fn guarded<F>(&mut self, world: &mut dyn World, body: F)
    where
        F: FnOnce(&mut GameTestHelper<'_>) -> TestResult,
    {
        let result = {
            let mut helper = GameTestHelper::new(self, world);
            panic::catch_unwind(AssertUnwindSafe(|| body(&mut helper)))
        };
        match result {
            Ok(Ok(())) => {}
            Ok(Err(error)) => self.fail(error),
            Err(payload) => {
                let error = GameTestError::from_panic(payload);
                warn!(test = %self.name(), error = %error, "test_code_panicked");
                self.fail(error);
            }
        }
    }

    pub fn succeed(&mut self, world: &mut dyn World) {
        if self.error.is_some() || self.done {
            return;
        }
        self.finish();
        if let Some(bounds) = self.bounds {
            for entity in world.entities_in(bounds.inflated(1)) {
                if !entity.is_player {
                    world.remove_entity(entity.id);
                }
            }
        }
    }

    pub fn fail(&mut self, error: GameTestError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub(crate) fn finish(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.finished_at_tick = Some(self.tick_count.max(0));
        self.run_duration = Some(
            self.started_at
                .map(|started_at| started_at.elapsed())
                .unwrap_or_default(),
        );
    }

    pub(crate) fn push_sequence(&mut self) -> usize {
        self.sequences.push(GameTestSequence::new(self.tick_count));
        self.sequences.len() - 1
    }

    pub(crate) fn sequence_mut(&mut self, index: usize) -> Option<&mut GameTestSequence> {
        self.sequences.get_mut(index)
    }

    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    pub(crate) fn add_tick_hook(&mut self, hook: StepAction) {
        self.tick_hooks.push(hook);
    }

    pub(crate) fn defer(&mut self, due_tick: i64, action: StepAction) -> DeferredId {
        let id = DeferredId(self.next_deferred);
        self.next_deferred += 1;
        self.deferred.insert(id, DeferredAssertion { due_tick, action });
        id
    }

    pub(crate) fn cancel_deferred(&mut self, id: DeferredId) -> bool {
        self.deferred.remove(&id).is_some()
    }

    pub fn pending_deferred_count(&self) -> usize {
        self.deferred.len()
    }

    pub(crate) fn new_condition(&mut self) -> Condition {
        self.conditions.push(None);
        Condition(self.conditions.len() - 1)
    }

    pub(crate) fn trigger_condition(&mut self, condition: Condition, tick: i64) -> TestResult {
        match self.conditions.get_mut(condition.0) {
            Some(Some(at)) => Err(GameTestError::ConditionAlreadyTriggered { at: *at }),
            Some(slot) => {
                *slot = Some(tick);
                Ok(())
            }
            None => Err(GameTestError::Unknown(format!(
                "condition {} does not belong to this test",
                condition.0
            ))),
        }
    }

    pub(crate) fn condition_tick(&self, condition: Condition) -> Option<i64> {
        self.conditions.get(condition.0).copied().flatten()
    }
}

impl std::fmt::Debug for GameTestInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameTestInfo")
            .field("name", &self.name())
            .field("origin", &self.origin)
            .field("tick_count", &self.tick_count)
            .field("done", &self.done)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
