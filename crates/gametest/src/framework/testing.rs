use std::sync::Arc;

use crate::content::{GameTest, TestDefinition};
use crate::world::{BlockPos, Extent, InMemoryWorld, World};

use super::{GameTestHelper, GameTestInfo, RetryOptions, TestOutcome, TestResult};

pub(crate) const TEST_ORIGIN: BlockPos = BlockPos::new(10, 0, 0);

pub(crate) fn world_with_box() -> InMemoryWorld {
    InMemoryWorld::default()
        .with_structure("test:box", Extent::new(3, 3, 3))
        .with_structure("test:wide", Extent::new(7, 2, 4))
}

pub(crate) fn game_test<F>(definition: TestDefinition, function: F) -> Arc<GameTest>
where
    F: Fn(&mut GameTestHelper<'_>) -> TestResult + Send + Sync + 'static,
{
    Arc::new(GameTest::from_fn(definition, function))
}

pub(crate) fn placed_info<F>(world: &mut InMemoryWorld, function: F) -> GameTestInfo
where
    F: Fn(&mut GameTestHelper<'_>) -> TestResult + Send + Sync + 'static,
{
    placed_info_with(world, TestDefinition::new("fixture", "test:box"), function)
}

pub(crate) fn placed_info_with<F>(
    world: &mut InMemoryWorld,
    definition: TestDefinition,
    function: F,
) -> GameTestInfo
where
    F: Fn(&mut GameTestHelper<'_>) -> TestResult + Send + Sync + 'static,
{
    let mut info = GameTestInfo::from_test(game_test(definition, function), RetryOptions::no_retries());
    info.set_origin(TEST_ORIGIN);
    info.place_structure(world).expect("place fixture structure");
    info.start_execution(1);
    info
}

pub(crate) fn tick_until_done(
    info: &mut GameTestInfo,
    world: &mut InMemoryWorld,
    max_calls: usize,
) -> Option<TestOutcome> {
    for _ in 0..max_calls {
        if let Some(outcome) = info.tick(world) {
            return Some(outcome);
        }
        world.advance_time();
    }
    None
}
