use tracing::{error, info, warn};

use crate::framework::{GameTestError, GameTestInfo};

use super::TestReporter;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogTestReporter;

impl TestReporter for LogTestReporter {
    fn on_test_failed(&mut self, info: &GameTestInfo, failure: &GameTestError) {
        let location = info.origin().map(|origin| origin.to_string()).unwrap_or_default();
        if info.is_required() {
            error!(test = %info.name(), location = %location, error = %failure, "test_failed");
        } else {
            warn!(test = %info.name(), location = %location, error = %failure, "optional_test_failed");
        }
    }

    fn on_test_success(&mut self, info: &GameTestInfo) {
        let millis = info
            .run_duration()
            .map(|duration| duration.as_millis())
            .unwrap_or_default();
        info!(
            test = %info.name(),
            ticks = info.run_ticks().unwrap_or_default(),
            ms = millis,
            "test_passed"
        );
    }
}
