mod atomic_io;
mod junit;
mod listener;
mod log;
mod memory;
mod multi;

use std::path::PathBuf;

use thiserror::Error;

use crate::framework::{GameTestError, GameTestInfo};

pub use junit::JUnitTestReporter;
pub use listener::{AttemptCounter, ReportGameListener};
pub use log::LogTestReporter;
pub use memory::MemoryTestReporter;
pub use multi::MultiTestReporter;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize report for {path}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: quick_junit::SerializeError,
    },
}

pub trait TestReporter {
    fn on_test_failed(&mut self, info: &GameTestInfo, error: &GameTestError);

    fn on_test_success(&mut self, info: &GameTestInfo);

    fn finish(&mut self) -> Result<(), ReportError> {
        Ok(())
    }
}
