mod batch;
mod error;
mod helper;
mod info;
mod listener;
mod retry;
mod runner;
mod sequence;
mod spawner;
mod ticker;
mod tracker;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{
    BatchError, GameTestBatch, GameTestBatchFactory, TestBatcher, DEFAULT_MAX_TESTS_PER_BATCH,
};
pub use error::{GameTestError, TestResult, TimeoutKind};
pub use helper::GameTestHelper;
pub use info::{DeferredId, GameTestInfo, TestOutcome};
pub use listener::{GameTestBatchListener, GameTestListener, ListenerContext};
pub use retry::RetryOptions;
pub use runner::{GameTestRunner, GameTestRunnerBuilder, RunnerError, RunnerPhase};
pub use sequence::{Condition, GameTestSequence, SequenceBuilder, StepOutcome};
pub use spawner::{
    InPlaceSpawner, NotSetSpawner, StructureGridSpawner, StructureSpawner, DEFAULT_TESTS_PER_ROW,
};
pub use ticker::{GameTestTicker, RunnerId, TestKey, TickerHandle, TickerState};
pub use tracker::{MultipleTestTracker, TestInstanceId};
