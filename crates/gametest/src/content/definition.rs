use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::framework::{GameTestHelper, TestResult};
use crate::world::Rotation;

pub const DEFAULT_ENVIRONMENT: &str = "default";
pub const DEFAULT_MAX_TICKS: u32 = 100;

pub type TestFunction = Arc<dyn Fn(&mut GameTestHelper<'_>) -> TestResult + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestDefinition {
    pub name: String,
    pub structure: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u32,
    #[serde(default)]
    pub setup_ticks: u32,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default)]
    pub manual_only: bool,
    #[serde(default = "default_one")]
    pub max_attempts: u32,
    #[serde(default = "default_one")]
    pub required_successes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

impl TestDefinition {
    pub fn new(name: impl Into<String>, structure: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            structure: structure.into(),
            environment: default_environment(),
            max_ticks: DEFAULT_MAX_TICKS,
            setup_ticks: 0,
            required: true,
            rotation: Rotation::None,
            manual_only: false,
            max_attempts: 1,
            required_successes: 1,
            function: None,
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_max_ticks(mut self, max_ticks: u32) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    pub fn with_setup_ticks(mut self, setup_ticks: u32) -> Self {
        self.setup_ticks = setup_ticks;
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_flakiness(mut self, max_attempts: u32, required_successes: u32) -> Self {
        self.max_attempts = max_attempts;
        self.required_successes = required_successes;
        self
    }

    pub fn with_manual_only(mut self, manual_only: bool) -> Self {
        self.manual_only = manual_only;
        self
    }

    pub fn function_name(&self) -> &str {
        self.function.as_deref().unwrap_or(&self.name)
    }

    pub fn is_flaky(&self) -> bool {
        self.max_attempts > 1
    }

    pub fn check(&self) -> Result<(), (&'static str, String)> {
        if self.name.trim().is_empty() {
            return Err(("name", "test name cannot be empty".to_string()));
        }
        if self.structure.trim().is_empty() {
            return Err(("structure", "structure id cannot be empty".to_string()));
        }
        if self.environment.trim().is_empty() {
            return Err(("environment", "environment cannot be empty".to_string()));
        }
        if self.max_ticks == 0 {
            return Err(("max_ticks", "expected at least 1 tick".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(("max_attempts", "expected at least 1 attempt".to_string()));
        }
        if self.required_successes == 0 || self.required_successes > self.max_attempts {
            return Err((
                "required_successes",
                format!(
                    "expected between 1 and max_attempts ({}), got {}",
                    self.max_attempts, self.required_successes
                ),
            ));
        }
        Ok(())
    }
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

fn default_max_ticks() -> u32 {
    DEFAULT_MAX_TICKS
}

fn default_true() -> bool {
    true
}

fn default_one() -> u32 {
    1
}

#[derive(Clone)]
pub struct GameTest {
    definition: TestDefinition,
    function: TestFunction,
}

impl GameTest {
    pub fn new(definition: TestDefinition, function: TestFunction) -> Self {
        Self {
            definition,
            function,
        }
    }

    pub fn from_fn<F>(definition: TestDefinition, function: F) -> Self
    where
        F: Fn(&mut GameTestHelper<'_>) -> TestResult + Send + Sync + 'static,
    {
        Self::new(definition, Arc::new(function))
    }

    pub fn definition(&self) -> &TestDefinition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub(crate) fn function(&self) -> &TestFunction {
        &self.function
    }
}

impl fmt::Debug for GameTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameTest")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_are_missing() {
        let definition: TestDefinition =
            serde_json::from_str(r#"{"name": "doors.open", "structure": "doors:basic"}"#)
                .expect("parse");

        assert_eq!(definition.environment, DEFAULT_ENVIRONMENT);
        assert_eq!(definition.max_ticks, DEFAULT_MAX_TICKS);
        assert_eq!(definition.setup_ticks, 0);
        assert!(definition.required);
        assert_eq!(definition.rotation, Rotation::None);
        assert!(!definition.is_flaky());
        assert_eq!(definition.function_name(), "doors.open");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_str::<TestDefinition>(
            r#"{"name": "a", "structure": "b", "timeout": 4}"#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn check_rejects_required_successes_above_attempts() {
        let definition = TestDefinition::new("a", "b").with_flakiness(2, 3);

        let (field, _) = definition.check().expect_err("invalid");
        assert_eq!(field, "required_successes");
    }

    #[test]
    fn check_rejects_zero_max_ticks() {
        let definition = TestDefinition::new("a", "b").with_max_ticks(0);

        let (field, _) = definition.check().expect_err("invalid");
        assert_eq!(field, "max_ticks");
    }

    #[test]
    fn rotation_uses_snake_case_names() {
        let definition: TestDefinition = serde_json::from_str(
            r#"{"name": "a", "structure": "b", "rotation": "clockwise90"}"#,
        )
        .expect("parse");

        assert_eq!(definition.rotation, Rotation::Clockwise90);
    }
}
