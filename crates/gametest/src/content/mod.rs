mod definition;
mod discovery;
mod environment;
mod registry;

pub use definition::{
    GameTest, TestDefinition, TestFunction, DEFAULT_ENVIRONMENT, DEFAULT_MAX_TICKS,
};
pub use discovery::{load_definitions_dir, load_definitions_file, DefinitionError};
pub use environment::{
    AllOf, EmptyEnvironment, EnvironmentRegistry, FunctionHook, GameRules, TestEnvironment,
    TimeOfDay, WeatherEnvironment,
};
pub use registry::{RegistryError, TestRegistry, TestSelection};
