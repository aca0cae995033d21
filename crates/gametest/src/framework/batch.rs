use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::content::{EnvironmentRegistry, TestEnvironment};

use super::info::GameTestInfo;
use super::tracker::{MultipleTestTracker, TestInstanceId};

pub const DEFAULT_MAX_TESTS_PER_BATCH: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("test {test} references unknown environment '{environment}'")]
    UnknownEnvironment { test: String, environment: String },
    #[error("test instance {0} is not tracked by this runner")]
    UnknownTest(TestInstanceId),
}

#[derive(Clone)]
pub struct GameTestBatch {
    index: usize,
    tests: Vec<TestInstanceId>,
    environment_name: String,
    environment: Arc<dyn TestEnvironment>,
}

impl GameTestBatch {
    pub fn new(
        index: usize,
        tests: Vec<TestInstanceId>,
        environment_name: impl Into<String>,
        environment: Arc<dyn TestEnvironment>,
    ) -> Self {
        Self {
            index,
            tests,
            environment_name: environment_name.into(),
            environment,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn tests(&self) -> &[TestInstanceId] {
        &self.tests
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn environment_name(&self) -> &str {
        &self.environment_name
    }

    pub fn environment(&self) -> &Arc<dyn TestEnvironment> {
        &self.environment
    }
}

impl fmt::Debug for GameTestBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameTestBatch")
            .field("index", &self.index)
            .field("environment", &self.environment_name)
            .field("tests", &self.tests)
            .finish()
    }
}

pub trait TestBatcher {
    fn batch(
        &self,
        tests: &[TestInstanceId],
        tracker: &MultipleTestTracker,
        environments: &EnvironmentRegistry,
    ) -> Result<Vec<GameTestBatch>, BatchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameTestBatchFactory {
    max_batch_size: usize,
}

impl Default for GameTestBatchFactory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TESTS_PER_BATCH)
    }
}

impl GameTestBatchFactory {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn from_game_test_info<'a>(
        &self,
        tests: impl IntoIterator<Item = (TestInstanceId, &'a GameTestInfo)>,
        environments: &EnvironmentRegistry,
    ) -> Result<Vec<GameTestBatch>, BatchError> {
        let mut groups: Vec<(String, Arc<dyn TestEnvironment>, Vec<TestInstanceId>)> = Vec::new();
        for (id, info) in tests {
            let name = info.environment_name();
            if let Some((_, _, members)) = groups.iter_mut().find(|(group, _, _)| group == name) {
                members.push(id);
                continue;
            }
            let environment =
                environments
                    .get(name)
                    .ok_or_else(|| BatchError::UnknownEnvironment {
                        test: info.name().to_string(),
                        environment: name.to_string(),
                    })?;
            groups.push((name.to_string(), environment, vec![id]));
        }

        let mut batches = Vec::new();
        for (name, environment, members) in groups {
            for (index, chunk) in members.chunks(self.max_batch_size).enumerate() {
                batches.push(GameTestBatch::new(
                    index,
                    chunk.to_vec(),
                    name.clone(),
                    Arc::clone(&environment),
                ));
            }
        }
        Ok(batches)
    }
}

impl TestBatcher for GameTestBatchFactory {
    fn batch(
        &self,
        tests: &[TestInstanceId],
        tracker: &MultipleTestTracker,
        environments: &EnvironmentRegistry,
    ) -> Result<Vec<GameTestBatch>, BatchError> {
        let infos = tests
            .iter()
            .map(|id| {
                tracker
                    .get(*id)
                    .map(|info| (*id, info))
                    .ok_or(BatchError::UnknownTest(*id))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.from_game_test_info(infos, environments)
    }
}
