use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use crate::framework::{GameTestHelper, TestResult};

use super::definition::{GameTest, TestDefinition, TestFunction};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("test '{test}' uses function '{function}', which is not registered")]
    UnboundFunction { test: String, function: String },
    #[error("no test named '{0}'")]
    UnknownTest(String),
    #[error("test '{0}' is defined twice")]
    Duplicate(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestSelection {
    All,
    Named(Vec<String>),
    Prefix(String),
}

#[derive(Default)]
pub struct TestRegistry {
    functions: BTreeMap<String, TestFunction>,
    definitions: Vec<TestDefinition>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_function<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&mut GameTestHelper<'_>) -> TestResult + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn add_definition(&mut self, definition: TestDefinition) -> Result<(), RegistryError> {
        if self
            .definitions
            .iter()
            .any(|existing| existing.name == definition.name)
        {
            return Err(RegistryError::Duplicate(definition.name));
        }
        self.definitions.push(definition);
        Ok(())
    }

    pub fn add_definitions(
        &mut self,
        definitions: impl IntoIterator<Item = TestDefinition>,
    ) -> Result<(), RegistryError> {
        definitions
            .into_iter()
            .try_for_each(|definition| self.add_definition(definition))
    }

    pub fn definitions(&self) -> &[TestDefinition] {
        &self.definitions
    }

    pub fn resolve(&self, selection: &TestSelection) -> Result<Vec<Arc<GameTest>>, RegistryError> {
        let selected: Vec<&TestDefinition> = match selection {
            TestSelection::All => self
                .definitions
                .iter()
                .filter(|definition| !definition.manual_only)
                .collect(),
            TestSelection::Prefix(prefix) => self
                .definitions
                .iter()
                .filter(|definition| !definition.manual_only && definition.name.starts_with(prefix))
                .collect(),
            TestSelection::Named(names) => {
                let mut seen = HashSet::new();
                let mut selected = Vec::new();
                for name in names {
                    if !seen.insert(name.as_str()) {
                        continue;
                    }
                    let definition = self
                        .definitions
                        .iter()
                        .find(|definition| &definition.name == name)
                        .ok_or_else(|| RegistryError::UnknownTest(name.clone()))?;
                    selected.push(definition);
                }
                selected
            }
        };
        selected.into_iter().map(|definition| self.bind(definition)).collect()
    }

    fn bind(&self, definition: &TestDefinition) -> Result<Arc<GameTest>, RegistryError> {
        let function_name = definition.function_name();
        let function =
            self.functions
                .get(function_name)
                .ok_or_else(|| RegistryError::UnboundFunction {
                    test: definition.name.clone(),
                    function: function_name.to_string(),
                })?;
        Ok(Arc::new(GameTest::new(definition.clone(), Arc::clone(function))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TestRegistry {
        let mut registry = TestRegistry::new();
        registry.register_function("noop", |_: &mut GameTestHelper<'_>| Ok(()));
        registry
            .add_definitions([
                TestDefinition {
                    function: Some("noop".to_string()),
                    ..TestDefinition::new("doors.open", "s")
                },
                TestDefinition {
                    function: Some("noop".to_string()),
                    ..TestDefinition::new("doors.slow", "s").with_manual_only(true)
                },
                TestDefinition {
                    function: Some("noop".to_string()),
                    ..TestDefinition::new("pistons.push", "s")
                },
            ])
            .expect("definitions");
        registry
    }

    fn names(tests: &[Arc<GameTest>]) -> Vec<&str> {
        tests.iter().map(|test| test.name()).collect()
    }

    #[test]
    fn all_skips_manual_only_tests() {
        let tests = registry().resolve(&TestSelection::All).expect("resolve");

        assert_eq!(names(&tests), vec!["doors.open", "pistons.push"]);
    }

    #[test]
    fn named_selection_includes_manual_tests() {
        let selection = TestSelection::Named(vec!["doors.slow".to_string()]);

        let tests = registry().resolve(&selection).expect("resolve");

        assert_eq!(names(&tests), vec!["doors.slow"]);
    }

    #[test]
    fn prefix_selection_filters_by_name() {
        let tests = registry()
            .resolve(&TestSelection::Prefix("doors.".to_string()))
            .expect("resolve");

        assert_eq!(names(&tests), vec!["doors.open"]);
    }

    #[test]
    fn unknown_name_is_an_error() {
        let selection = TestSelection::Named(vec!["nope".to_string()]);

        assert_eq!(
            registry().resolve(&selection).expect_err("unknown"),
            RegistryError::UnknownTest("nope".to_string())
        );
    }

    #[test]
    fn unbound_function_is_an_error() {
        let mut registry = registry();
        registry
            .add_definition(TestDefinition::new("orphan", "s"))
            .expect("add");

        let error = registry.resolve(&TestSelection::All).expect_err("unbound");

        assert_eq!(
            error,
            RegistryError::UnboundFunction {
                test: "orphan".to_string(),
                function: "orphan".to_string(),
            }
        );
    }

    #[test]
    fn duplicate_definition_is_rejected() {
        let mut registry = registry();

        let error = registry
            .add_definition(TestDefinition::new("doors.open", "s"))
            .expect_err("duplicate");

        assert_eq!(error, RegistryError::Duplicate("doors.open".to_string()));
    }
}
