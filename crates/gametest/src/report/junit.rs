use std::path::{Path, PathBuf};
use std::time::Duration;

use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use tracing::info;

use crate::framework::{GameTestError, GameTestInfo};

use super::atomic_io::write_text_atomic;
use super::{ReportError, TestReporter};

const SUITE_NAME: &str = "gametest";

#[derive(Debug)]
pub struct JUnitTestReporter {
    path: PathBuf,
    cases: Vec<TestCase>,
    elapsed: Duration,
}

impl JUnitTestReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cases: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn push(&mut self, info: &GameTestInfo, status: TestCaseStatus) {
        let duration = info.run_duration().unwrap_or_default();
        let mut case = TestCase::new(info.name(), status);
        case.set_classname(SUITE_NAME).set_time(duration);
        self.elapsed += duration;
        self.cases.push(case);
    }

    fn render(&self) -> Result<String, ReportError> {
        let mut suite = TestSuite::new(SUITE_NAME);
        suite.set_time(self.elapsed);
        suite.add_test_cases(self.cases.iter().cloned());
        let mut report = Report::new(SUITE_NAME);
        report.set_time(self.elapsed).add_test_suite(suite);
        report.to_string().map_err(|source| ReportError::Serialize {
            path: self.path.clone(),
            source,
        })
    }
}

impl TestReporter for JUnitTestReporter {
    fn on_test_failed(&mut self, info: &GameTestInfo, error: &GameTestError) {
        let mut status = if info.is_required() {
            TestCaseStatus::non_success(NonSuccessKind::Failure)
        } else {
            TestCaseStatus::skipped()
        };
        status.set_message(error.to_string());
        self.push(info, status);
    }

    fn on_test_success(&mut self, info: &GameTestInfo) {
        self.push(info, TestCaseStatus::success());
    }

    fn finish(&mut self) -> Result<(), ReportError> {
        let xml = self.render()?;
        write_text_atomic(&self.path, &xml).map_err(|source| ReportError::Write {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), tests = self.cases.len(), "junit_report_written");
        Ok(())
    }
}
