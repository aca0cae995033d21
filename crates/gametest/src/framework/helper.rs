use std::fmt::Debug;

use crate::world::{BlockPos, BoundingBox, EntityId, EntitySnapshot, Extent, World};

use super::error::{GameTestError, TestResult};
use super::info::{DeferredId, GameTestInfo};
use super::sequence::{Condition, SequenceBuilder};

/// Positions taken and returned here are relative to the structure's
/// north-west corner, in the structure's unrotated frame.
pub struct GameTestHelper<'a> {
    info: &'a mut GameTestInfo,
    world: &'a mut dyn World,
}

impl<'a> GameTestHelper<'a> {
    pub(crate) fn new(info: &'a mut GameTestInfo, world: &'a mut dyn World) -> Self {
        Self { info, world }
    }

    pub fn tick(&self) -> i64 {
        self.info.tick_count()
    }

    pub fn test_name(&self) -> &str {
        self.info.name()
    }

    pub fn origin(&self) -> BlockPos {
        self.info.origin().unwrap_or(BlockPos::ORIGIN)
    }

    pub fn bounds(&self) -> BoundingBox {
        self.info
            .bounds()
            .unwrap_or_else(|| BoundingBox::at(self.origin()))
    }

    pub fn world(&mut self) -> &mut dyn World {
        &mut *self.world
    }

    pub fn absolute_pos(&self, relative: BlockPos) -> BlockPos {
        let size = self.unrotated_size();
        self.origin()
            .add(self.info.rotation().rotate_local(relative, size))
    }

    pub fn relative_pos(&self, absolute: BlockPos) -> BlockPos {
        let bounds = self.bounds();
        let rotated = Extent::new(bounds.x_size(), bounds.y_size(), bounds.z_size());
        self.info
            .rotation()
            .inverse()
            .rotate_local(absolute.subtract(self.origin()), rotated)
    }

    fn unrotated_size(&self) -> Extent {
        let bounds = self.bounds();
        let rotated = Extent::new(bounds.x_size(), bounds.y_size(), bounds.z_size());
        self.info.rotation().inverse().rotate_extent(rotated)
    }

    pub fn succeed(&mut self) {
        self.info.succeed(&mut *self.world);
    }

    pub fn fail(&mut self, error: GameTestError) {
        self.info.fail(error);
    }

    pub fn succeed_if<F>(&mut self, check: F) -> TestResult
    where
        F: FnOnce(&mut GameTestHelper<'_>) -> TestResult,
    {
        check(self)?;
        self.succeed();
        Ok(())
    }

    pub fn succeed_when<F>(&mut self, check: F)
    where
        F: FnMut(&mut GameTestHelper<'_>) -> TestResult + 'static,
    {
        self.start_sequence().then_wait_until(check).then_succeed();
    }

    pub fn succeed_on_tick_when<F>(&mut self, tick: i64, mut check: F) -> DeferredId
    where
        F: FnMut(&mut GameTestHelper<'_>) -> TestResult + 'static,
    {
        self.run_at_tick_time(tick, move |helper| {
            check(helper)?;
            helper.succeed();
            Ok(())
        })
    }

    /// Runs `check` every tick until the test times out. The first error fails the test.
    pub fn fail_if_ever<F>(&mut self, check: F)
    where
        F: FnMut(&mut GameTestHelper<'_>) -> TestResult + 'static,
    {
        self.on_each_tick(check);
    }

    pub fn on_each_tick<F>(&mut self, action: F)
    where
        F: FnMut(&mut GameTestHelper<'_>) -> TestResult + 'static,
    {
        self.info.add_tick_hook(Box::new(action));
    }

    pub fn run_at_tick_time<F>(&mut self, tick: i64, action: F) -> DeferredId
    where
        F: FnMut(&mut GameTestHelper<'_>) -> TestResult + 'static,
    {
        self.info.defer(tick, Box::new(action))
    }

    pub fn run_after_delay<F>(&mut self, delay: u32, action: F) -> DeferredId
    where
        F: FnMut(&mut GameTestHelper<'_>) -> TestResult + 'static,
    {
        let due = self.tick() + i64::from(delay);
        self.run_at_tick_time(due, action)
    }

    pub fn cancel_deferred(&mut self, id: DeferredId) -> bool {
        self.info.cancel_deferred(id)
    }

    pub fn start_sequence(&mut self) -> SequenceBuilder<'_> {
        let index = self.info.push_sequence();
        SequenceBuilder::new(&mut *self.info, index)
    }

    pub(crate) fn trigger_condition(&mut self, condition: Condition) -> TestResult {
        let tick = self.tick();
        self.info.trigger_condition(condition, tick)
    }

    pub fn block_at(&self, relative: BlockPos) -> Option<String> {
        self.world.block_at(self.absolute_pos(relative))
    }

    pub fn set_block(&mut self, relative: BlockPos, block: &str) {
        let pos = self.absolute_pos(relative);
        self.world.set_block(pos, Some(block));
    }

    pub fn destroy_block(&mut self, relative: BlockPos) {
        let pos = self.absolute_pos(relative);
        self.world.set_block(pos, None);
    }

    pub fn spawn_entity(&mut self, kind: &str, relative: BlockPos) -> EntityId {
        let pos = self.absolute_pos(relative);
        self.world.spawn_entity(kind, pos)
    }

    pub fn entities(&self) -> Vec<EntitySnapshot> {
        self.world.entities_in(self.bounds())
    }

    pub fn kill_all_entities(&mut self) -> usize {
        let doomed = self
            .entities()
            .into_iter()
            .filter(|entity| !entity.is_player)
            .collect::<Vec<_>>();
        doomed
            .iter()
            .filter(|entity| self.world.remove_entity(entity.id))
            .count()
    }

    fn positional(&self, message: String, relative: BlockPos) -> GameTestError {
        GameTestError::PositionalAssertion {
            message,
            absolute: self.absolute_pos(relative),
            relative,
            tick: self.tick(),
        }
    }

    pub fn assert_block_present(&self, block: &str, relative: BlockPos) -> TestResult {
        match self.block_at(relative) {
            Some(found) if found == block => Ok(()),
            Some(found) => Err(self.positional(format!("expected {block}, got {found}"), relative)),
            None => Err(self.positional(format!("expected {block}, got air"), relative)),
        }
    }

    pub fn assert_block_not_present(&self, block: &str, relative: BlockPos) -> TestResult {
        match self.block_at(relative) {
            Some(found) if found == block => {
                Err(self.positional(format!("did not expect {block}"), relative))
            }
            _ => Ok(()),
        }
    }

    fn count_entities(&self, kind: &str) -> usize {
        self.entities()
            .iter()
            .filter(|entity| entity.kind == kind)
            .count()
    }

    pub fn assert_entity_present(&self, kind: &str) -> TestResult {
        if self.count_entities(kind) > 0 {
            Ok(())
        } else {
            Err(GameTestError::assertion(
                format!("expected entity {kind}"),
                self.tick(),
            ))
        }
    }

    pub fn assert_entity_present_at(&self, kind: &str, relative: BlockPos) -> TestResult {
        let pos = self.absolute_pos(relative);
        let found = self
            .entities()
            .iter()
            .any(|entity| entity.kind == kind && entity.pos == pos);
        if found {
            Ok(())
        } else {
            Err(self.positional(format!("expected entity {kind}"), relative))
        }
    }

    pub fn assert_entity_not_present(&self, kind: &str) -> TestResult {
        if self.count_entities(kind) == 0 {
            Ok(())
        } else {
            Err(GameTestError::assertion(
                format!("did not expect entity {kind}"),
                self.tick(),
            ))
        }
    }

    pub fn assert_entity_count(&self, kind: &str, expected: usize) -> TestResult {
        let actual = self.count_entities(kind);
        if actual == expected {
            Ok(())
        } else {
            Err(GameTestError::assertion(
                format!("expected {expected} of type {kind} to exist, found {actual}"),
                self.tick(),
            ))
        }
    }

    pub fn assert_true(&self, condition: bool, message: &str) -> TestResult {
        if condition {
            Ok(())
        } else {
            Err(GameTestError::assertion(message, self.tick()))
        }
    }

    pub fn assert_value_equal<T>(&self, actual: T, expected: T, name: &str) -> TestResult
    where
        T: PartialEq + Debug,
    {
        if actual == expected {
            Ok(())
        } else {
            Err(GameTestError::assertion(
                format!("expected {name} to be {expected:?}, but was {actual:?}"),
                self.tick(),
            ))
        }
    }

    pub fn assert_triggered_this_tick(&self, condition: Condition) -> TestResult {
        let tick = self.tick();
        match self.info.condition_tick(condition) {
            Some(at) if at == tick => Ok(()),
            Some(at) => Err(GameTestError::assertion(
                format!("condition triggered at {at}"),
                tick,
            )),
            None => Err(GameTestError::assertion("condition not triggered", tick)),
        }
    }
}
