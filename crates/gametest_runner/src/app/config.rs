use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use gametest::framework::{RetryOptions, DEFAULT_MAX_TESTS_PER_BATCH, DEFAULT_TESTS_PER_ROW};
use gametest::BlockPos;
use serde::Deserialize;
use thiserror::Error;

pub(crate) const ROOT_ENV_VAR: &str = "GAMETEST_ROOT";
pub(crate) const FILTER_ENV_VAR: &str = "GAMETEST_FILTER";
pub(crate) const HALT_ON_ERROR_ENV_VAR: &str = "GAMETEST_HALT_ON_ERROR";
pub(crate) const JUNIT_ENV_VAR: &str = "GAMETEST_JUNIT";
pub(crate) const MAX_WORLD_TICKS_ENV_VAR: &str = "GAMETEST_MAX_WORLD_TICKS";
pub(crate) const SETTINGS_FILE_NAME: &str = "gametest.json";

#[derive(Debug, Error)]
pub(crate) enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("environment variable {var} has an invalid value '{value}': expected {expected}")]
    InvalidEnvValue {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error(
        "GAMETEST_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or gametests/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or gametests/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/project\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
    #[error("failed to read settings file {path}: {source}")]
    ReadSettings {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path} at {field_path}: {message}")]
    ParseSettings {
        path: PathBuf,
        field_path: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RunnerSettings {
    pub definitions_dir: PathBuf,
    pub grid_origin: BlockPos,
    pub tests_per_row: usize,
    pub max_batch_size: usize,
    pub clear_between_batches: bool,
    pub halt_on_error: bool,
    pub max_world_ticks: u64,
    pub retry: RetryOptions,
    pub filter: Option<String>,
    pub junit: Option<PathBuf>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            definitions_dir: PathBuf::from("gametests"),
            grid_origin: BlockPos::new(0, 64, 0),
            tests_per_row: DEFAULT_TESTS_PER_ROW,
            max_batch_size: DEFAULT_MAX_TESTS_PER_BATCH,
            clear_between_batches: true,
            halt_on_error: false,
            max_world_ticks: 20_000,
            retry: RetryOptions::no_retries(),
            filter: None,
            junit: None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RunnerConfig {
    pub root: PathBuf,
    pub definitions_dir: PathBuf,
    pub settings: RunnerSettings,
}

impl RunnerConfig {
    pub(crate) fn junit_path(&self) -> Option<PathBuf> {
        self.settings
            .junit
            .as_ref()
            .map(|path| absolutize(&self.root, path))
    }
}

pub(crate) fn resolve_config() -> Result<RunnerConfig, StartupError> {
    let root = resolve_root()?;
    let mut settings = load_settings(&root.join(SETTINGS_FILE_NAME))?;
    apply_env_overrides(&mut settings, read_env)?;
    let definitions_dir = absolutize(&root, &settings.definitions_dir);
    Ok(RunnerConfig {
        root,
        definitions_dir,
        settings,
    })
}

fn read_env(var: &'static str) -> Result<Option<String>, StartupError> {
    match env::var(var) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(StartupError::EnvVar { var, source }),
    }
}

pub(crate) fn load_settings(path: &Path) -> Result<RunnerSettings, StartupError> {
    if !path.is_file() {
        return Ok(RunnerSettings::default());
    }
    let raw = fs::read_to_string(path).map_err(|source| StartupError::ReadSettings {
        path: path.to_path_buf(),
        source,
    })?;
    let mut deserializer = serde_json::Deserializer::from_str(&raw);
    serde_path_to_error::deserialize::<_, RunnerSettings>(&mut deserializer).map_err(|error| {
        let field_path = error.path().to_string();
        StartupError::ParseSettings {
            path: path.to_path_buf(),
            field_path,
            message: error.into_inner().to_string(),
        }
    })
}

pub(crate) fn apply_env_overrides<F>(
    settings: &mut RunnerSettings,
    mut lookup: F,
) -> Result<(), StartupError>
where
    F: FnMut(&'static str) -> Result<Option<String>, StartupError>,
{
    if let Some(filter) = lookup(FILTER_ENV_VAR)? {
        let trimmed = filter.trim();
        settings.filter = (!trimmed.is_empty()).then(|| trimmed.to_string());
    }
    if let Some(raw) = lookup(HALT_ON_ERROR_ENV_VAR)? {
        settings.halt_on_error = parse_flag(HALT_ON_ERROR_ENV_VAR, &raw)?;
    }
    if let Some(path) = lookup(JUNIT_ENV_VAR)? {
        let trimmed = path.trim();
        settings.junit = (!trimmed.is_empty()).then(|| PathBuf::from(trimmed));
    }
    if let Some(raw) = lookup(MAX_WORLD_TICKS_ENV_VAR)? {
        settings.max_world_ticks = raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|ticks| *ticks > 0)
            .ok_or_else(|| StartupError::InvalidEnvValue {
                var: MAX_WORLD_TICKS_ENV_VAR,
                value: raw.clone(),
                expected: "a positive number of ticks",
            })?;
    }
    Ok(())
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, StartupError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(StartupError::InvalidEnvValue {
            var,
            value: raw.to_string(),
            expected: "true or false",
        }),
    }
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            for candidate in exe_dir.ancestors() {
                if is_repo_marker(candidate) {
                    return Ok(normalize_path(candidate));
                }
            }

            Err(StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_gametests = path.join("gametests").is_dir();

    cargo_toml && (has_crates || has_gametests)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
