use crate::framework::{GameTestError, GameTestInfo};

use super::{ReportError, TestReporter};

#[derive(Default)]
pub struct MultiTestReporter {
    reporters: Vec<Box<dyn TestReporter>>,
}

impl MultiTestReporter {
    pub fn new(reporters: Vec<Box<dyn TestReporter>>) -> Self {
        Self { reporters }
    }

    pub fn push(&mut self, reporter: Box<dyn TestReporter>) {
        self.reporters.push(reporter);
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl TestReporter for MultiTestReporter {
    fn on_test_failed(&mut self, info: &GameTestInfo, error: &GameTestError) {
        for reporter in &mut self.reporters {
            reporter.on_test_failed(info, error);
        }
    }

    fn on_test_success(&mut self, info: &GameTestInfo) {
        for reporter in &mut self.reporters {
            reporter.on_test_success(info);
        }
    }

    fn finish(&mut self) -> Result<(), ReportError> {
        let mut first_error = None;
        for reporter in &mut self.reporters {
            if let Err(error) = reporter.finish() {
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::TestDefinition;
    use crate::framework::testing::game_test;
    use crate::framework::RetryOptions;
    use crate::report::MemoryTestReporter;

    #[test]
    fn fans_out_to_every_reporter() {
        let first = MemoryTestReporter::default();
        let second = MemoryTestReporter::default();
        let mut multi = MultiTestReporter::new(vec![Box::new(first.clone()), Box::new(second.clone())]);
        let info = GameTestInfo::from_test(
            game_test(TestDefinition::new("fan", "test:box"), |_| Ok(())),
            RetryOptions::no_retries(),
        );

        multi.on_test_success(&info);
        multi.on_test_failed(&info, &GameTestError::Unknown("boom".to_string()));
        multi.finish().expect("finish");

        for reporter in [first, second] {
            assert_eq!(reporter.passed(), vec!["fan".to_string()]);
            assert_eq!(reporter.failed(), vec!["fan".to_string()]);
            assert_eq!(reporter.finish_calls(), 1);
        }
    }
}
