pub mod content;
pub mod framework;
pub mod report;
pub mod world;

pub use content::{
    load_definitions_dir, DefinitionError, EnvironmentRegistry, GameTest, RegistryError,
    TestDefinition, TestEnvironment, TestRegistry, TestSelection,
};
pub use framework::{
    GameTestError, GameTestHelper, GameTestInfo, GameTestRunner, GameTestTicker, RetryOptions,
    RunnerError, RunnerId, StructureGridSpawner, TestOutcome, TestResult,
};
pub use report::{
    JUnitTestReporter, LogTestReporter, MultiTestReporter, ReportError, TestReporter,
};
pub use world::{BlockPos, InMemoryWorld, World};
