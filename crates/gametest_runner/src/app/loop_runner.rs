use std::time::{Duration, Instant};

use gametest::{GameTestRunner, GameTestTicker, RunnerId, World};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub(crate) struct LoopConfig {
    pub max_world_ticks: u64,
    pub progress_log_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_world_ticks: 20_000,
            progress_log_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoopSummary {
    pub world_ticks: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub(crate) enum LoopError {
    #[error("runner {0:?} is not registered with the ticker")]
    UnknownRunner(RunnerId),
    #[error("gave up after {world_ticks} world ticks with {live} tests still running [{progress}]")]
    TickBudgetExhausted {
        world_ticks: u64,
        live: usize,
        progress: String,
    },
}

pub(crate) fn run_until_finished(
    ticker: &mut GameTestTicker,
    runner: RunnerId,
    world: &mut dyn World,
    config: &LoopConfig,
) -> Result<LoopSummary, LoopError> {
    let started = Instant::now();
    let mut interval_start = started;
    let mut interval_ticks = 0_u64;
    let mut world_ticks = 0_u64;

    loop {
        let current = ticker.runner(runner).ok_or(LoopError::UnknownRunner(runner))?;
        if current.is_finished() {
            return Ok(LoopSummary {
                world_ticks,
                elapsed: started.elapsed(),
            });
        }
        if world_ticks >= config.max_world_ticks.max(1) {
            let progress = current.tracker().progress_bar();
            warn!(world_ticks, live = ticker.live_count(), "tick_budget_exhausted");
            return Err(LoopError::TickBudgetExhausted {
                world_ticks,
                live: ticker.live_count(),
                progress,
            });
        }

        ticker.tick(world);
        world.advance_time();
        world_ticks += 1;
        interval_ticks += 1;

        let interval_elapsed = interval_start.elapsed();
        if interval_elapsed >= config.progress_log_interval {
            log_progress(ticker.runner(runner), interval_ticks, interval_elapsed);
            interval_start = Instant::now();
            interval_ticks = 0;
        }
    }
}

fn log_progress(runner: Option<&GameTestRunner>, ticks: u64, elapsed: Duration) {
    let Some(runner) = runner else {
        return;
    };
    let tps = ticks as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    info!(
        tps = tps.round() as u64,
        progress = %runner.tracker(),
        "test_progress"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gametest::content::TestDefinition;
    use gametest::world::Extent;
    use gametest::{
        BlockPos, GameTest, GameTestHelper, GameTestInfo, InMemoryWorld, RetryOptions,
        StructureGridSpawner,
    };

    use super::*;

    fn runner_with(definition: TestDefinition, succeed: bool) -> GameTestRunner {
        let test = GameTest::from_fn(definition, move |helper: &mut GameTestHelper<'_>| {
            if succeed {
                helper.succeed();
            }
            Ok(())
        });
        GameTestRunner::builder()
            .test(GameTestInfo::from_test(Arc::new(test), RetryOptions::no_retries()))
            .new_structure_spawner(Box::new(StructureGridSpawner::new(BlockPos::ORIGIN, 8, false)))
            .build()
    }

    fn world() -> InMemoryWorld {
        InMemoryWorld::default().with_structure("demo:empty", Extent::new(2, 1, 2))
    }

    #[test]
    fn stops_once_the_runner_finishes() {
        let mut world = world();
        let mut ticker = GameTestTicker::new();
        let runner = ticker
            .start_runner(runner_with(TestDefinition::new("quick", "demo:empty"), true), &mut world)
            .expect("start");

        let summary = run_until_finished(&mut ticker, runner, &mut world, &LoopConfig::default())
            .expect("finished");

        assert!(summary.world_ticks <= 3);
        assert_eq!(world.game_time(), summary.world_ticks);
    }

    #[test]
    fn gives_up_when_the_budget_is_spent() {
        let mut world = world();
        let mut ticker = GameTestTicker::new();
        let definition = TestDefinition::new("slow", "demo:empty").with_max_ticks(1_000);
        let runner = ticker
            .start_runner(runner_with(definition, false), &mut world)
            .expect("start");
        let config = LoopConfig {
            max_world_ticks: 25,
            ..LoopConfig::default()
        };

        let error = run_until_finished(&mut ticker, runner, &mut world, &config)
            .expect_err("budget exhausted");

        match error {
            LoopError::TickBudgetExhausted {
                world_ticks, live, ..
            } => {
                assert_eq!(world_ticks, 25);
                assert_eq!(live, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
