mod bootstrap;
mod config;
mod loop_runner;

use gametest::framework::{GameTestBatchFactory, StructureGridSpawner};
use gametest::{
    load_definitions_dir, DefinitionError, GameTestInfo, GameTestRunner, GameTestTicker,
    JUnitTestReporter, LogTestReporter, MultiTestReporter, RegistryError, RunnerError,
    TestRegistry, TestSelection,
};
use thiserror::Error;
use tracing::info;

pub(crate) use bootstrap::init_tracing;
use config::{resolve_config, RunnerConfig, StartupError};
use loop_runner::{run_until_finished, LoopConfig, LoopError};

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to load test definitions: {0}")]
    Definitions(#[from] DefinitionError),
    #[error("failed to resolve tests: {0}")]
    Registry(#[from] RegistryError),
    #[error("failed to start test runner: {0}")]
    Runner(#[from] RunnerError),
    #[error(transparent)]
    Loop(#[from] LoopError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed_required: usize,
    pub failed_optional: usize,
    pub world_ticks: u64,
}

impl RunSummary {
    pub(crate) fn succeeded(&self) -> bool {
        self.failed_required == 0
    }
}

pub(crate) fn run() -> Result<RunSummary, AppError> {
    let config = resolve_config()?;
    info!(
        root = %config.root.display(),
        definitions_dir = %config.definitions_dir.display(),
        filter = config.settings.filter.as_deref().unwrap_or("*"),
        halt_on_error = config.settings.halt_on_error,
        "startup"
    );
    run_with_config(&config)
}

fn run_with_config(config: &RunnerConfig) -> Result<RunSummary, AppError> {
    let settings = &config.settings;
    let mut registry = TestRegistry::new();
    demo_tests::register_functions(&mut registry);
    registry.add_definitions(load_definitions_dir(&config.definitions_dir)?)?;

    let selection = match &settings.filter {
        Some(prefix) => TestSelection::Prefix(prefix.clone()),
        None => TestSelection::All,
    };
    let tests = registry.resolve(&selection)?;
    info!(
        defined = registry.definitions().len(),
        selected = tests.len(),
        "tests_resolved"
    );

    let mut reporter = MultiTestReporter::new(vec![Box::new(LogTestReporter)]);
    if let Some(path) = config.junit_path() {
        reporter.push(Box::new(JUnitTestReporter::new(path)));
    }

    let runner = GameTestRunner::builder()
        .tests(
            tests
                .into_iter()
                .map(|test| GameTestInfo::from_test(test, settings.retry)),
        )
        .batcher(Box::new(GameTestBatchFactory::new(settings.max_batch_size)))
        .new_structure_spawner(Box::new(StructureGridSpawner::new(
            settings.grid_origin,
            settings.tests_per_row,
            settings.clear_between_batches,
        )))
        .clear_between_batches(settings.clear_between_batches)
        .halt_on_error(settings.halt_on_error)
        .environments(demo_tests::build_environments())
        .reporter(Box::new(reporter))
        .build();

    let mut world = demo_tests::build_world();
    let mut ticker = GameTestTicker::new();
    let runner_id = ticker.start_runner(runner, &mut world)?;
    let loop_config = LoopConfig {
        max_world_ticks: settings.max_world_ticks,
        ..LoopConfig::default()
    };
    let outcome = run_until_finished(&mut ticker, runner_id, &mut world, &loop_config);
    if outcome.is_err() {
        ticker.stop_runner(runner_id, &mut world)?;
    }
    let loop_summary = outcome?;

    let tracker = ticker
        .runner(runner_id)
        .ok_or(RunnerError::UnknownRunner(runner_id))?
        .tracker();
    let summary = RunSummary {
        total: tracker.total_count(),
        passed: tracker.passed_count(),
        failed_required: tracker.failed_required_count(),
        failed_optional: tracker.failed_optional_count(),
        world_ticks: loop_summary.world_ticks,
    };
    info!(
        total = summary.total,
        passed = summary.passed,
        failed_required = summary.failed_required,
        failed_optional = summary.failed_optional,
        world_ticks = summary.world_ticks,
        elapsed_ms = loop_summary.elapsed.as_millis(),
        "run_finished"
    );
    Ok(summary)
}
