use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::world::{Weather, World};

use super::definition::DEFAULT_ENVIRONMENT;

pub trait TestEnvironment: Send + Sync {
    fn setup(&self, world: &mut dyn World);

    fn teardown(&self, _world: &mut dyn World) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyEnvironment;

impl TestEnvironment for EmptyEnvironment {
    fn setup(&self, _world: &mut dyn World) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay(pub u64);

impl TestEnvironment for TimeOfDay {
    fn setup(&self, world: &mut dyn World) {
        world.set_time_of_day(self.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeatherEnvironment(pub Weather);

impl TestEnvironment for WeatherEnvironment {
    fn setup(&self, world: &mut dyn World) {
        world.set_weather(self.0);
    }

    fn teardown(&self, world: &mut dyn World) {
        world.set_weather(Weather::Clear);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameRules {
    rules: Vec<(String, String)>,
}

impl GameRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, rule: impl Into<String>, value: impl Into<String>) -> Self {
        self.rules.push((rule.into(), value.into()));
        self
    }
}

impl TestEnvironment for GameRules {
    fn setup(&self, world: &mut dyn World) {
        for (rule, value) in &self.rules {
            world.set_game_rule(rule, value);
        }
    }

    fn teardown(&self, world: &mut dyn World) {
        for (rule, _) in &self.rules {
            world.reset_game_rule(rule);
        }
    }
}

type WorldHook = Box<dyn Fn(&mut dyn World) + Send + Sync>;

pub struct FunctionHook {
    setup: WorldHook,
    teardown: WorldHook,
}

impl FunctionHook {
    pub fn new<S, T>(setup: S, teardown: T) -> Self
    where
        S: Fn(&mut dyn World) + Send + Sync + 'static,
        T: Fn(&mut dyn World) + Send + Sync + 'static,
    {
        Self {
            setup: Box::new(setup),
            teardown: Box::new(teardown),
        }
    }
}

impl fmt::Debug for FunctionHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionHook").finish_non_exhaustive()
    }
}

impl TestEnvironment for FunctionHook {
    fn setup(&self, world: &mut dyn World) {
        (self.setup)(world);
    }

    fn teardown(&self, world: &mut dyn World) {
        (self.teardown)(world);
    }
}

#[derive(Default)]
pub struct AllOf {
    environments: Vec<Arc<dyn TestEnvironment>>,
}

impl AllOf {
    pub fn new(environments: Vec<Arc<dyn TestEnvironment>>) -> Self {
        Self { environments }
    }
}

impl TestEnvironment for AllOf {
    fn setup(&self, world: &mut dyn World) {
        for environment in &self.environments {
            environment.setup(world);
        }
    }

    fn teardown(&self, world: &mut dyn World) {
        for environment in self.environments.iter().rev() {
            environment.teardown(world);
        }
    }
}

#[derive(Clone)]
pub struct EnvironmentRegistry {
    environments: BTreeMap<String, Arc<dyn TestEnvironment>>,
}

impl Default for EnvironmentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentRegistry {
    pub fn new() -> Self {
        let mut environments = BTreeMap::<String, Arc<dyn TestEnvironment>>::new();
        environments.insert(DEFAULT_ENVIRONMENT.to_string(), Arc::new(EmptyEnvironment));
        Self { environments }
    }

    pub fn register(&mut self, name: impl Into<String>, environment: Arc<dyn TestEnvironment>) {
        self.environments.insert(name.into(), environment);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TestEnvironment>> {
        self.environments.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.environments.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.environments.keys().map(String::as_str)
    }
}

impl fmt::Debug for EnvironmentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.environments.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::world::InMemoryWorld;

    #[test]
    fn registry_always_has_default() {
        let registry = EnvironmentRegistry::new();

        assert!(registry.contains(DEFAULT_ENVIRONMENT));
        assert!(registry.get("night").is_none());
    }

    #[test]
    fn game_rules_are_restored_on_teardown() {
        let mut world = InMemoryWorld::default();
        let rules = GameRules::new().with("doMobSpawning", "false");

        rules.setup(&mut world);
        assert_eq!(world.game_rule("doMobSpawning"), Some("false"));
        rules.teardown(&mut world);

        assert_eq!(world.game_rule("doMobSpawning"), None);
    }

    #[test]
    fn all_of_tears_down_in_reverse() {
        let mut world = InMemoryWorld::default();
        let order = Arc::new(Mutex::new(Vec::new()));
        let hook = |name: &'static str| {
            let setup_order = Arc::clone(&order);
            let teardown_order = Arc::clone(&order);
            Arc::new(FunctionHook::new(
                move |_: &mut dyn World| setup_order.lock().expect("lock").push(format!("+{name}")),
                move |_: &mut dyn World| {
                    teardown_order.lock().expect("lock").push(format!("-{name}"))
                },
            )) as Arc<dyn TestEnvironment>
        };
        let combined = AllOf::new(vec![
            hook("a"),
            hook("b"),
            Arc::new(WeatherEnvironment(Weather::Rain)),
            Arc::new(TimeOfDay(13_000)),
        ]);

        combined.setup(&mut world);
        assert_eq!(world.weather(), Weather::Rain);
        assert_eq!(world.time_of_day(), 13_000);
        combined.teardown(&mut world);

        assert_eq!(world.weather(), Weather::Clear);
        assert_eq!(*order.lock().expect("lock"), vec!["+a", "+b", "-b", "-a"]);
    }
}
