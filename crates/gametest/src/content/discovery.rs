use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::definition::TestDefinition;

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read definitions directory {path}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read definitions file {path}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} at {field_path}: {message}")]
    Parse {
        path: PathBuf,
        field_path: String,
        message: String,
    },
    #[error("invalid test '{name}' in {path} at {field}: {reason}")]
    Invalid {
        path: PathBuf,
        name: String,
        field: String,
        reason: String,
    },
    #[error("test '{name}' is defined in both {first} and {second}")]
    Duplicate {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefinitionsFile {
    tests: Vec<TestDefinition>,
}

/// Loads every `*.json` file directly inside `dir`, in file name order.
pub fn load_definitions_dir(dir: &Path) -> Result<Vec<TestDefinition>, DefinitionError> {
    let files = collect_json_files_sorted(dir)?;
    let mut seen = HashMap::<String, PathBuf>::new();
    let mut definitions = Vec::new();
    for path in files {
        let loaded = load_definitions_file(&path)?;
        debug!(path = %path.display(), tests = loaded.len(), "definitions_file_loaded");
        for definition in loaded {
            if let Some(first) = seen.get(&definition.name) {
                return Err(DefinitionError::Duplicate {
                    name: definition.name,
                    first: first.clone(),
                    second: path,
                });
            }
            seen.insert(definition.name.clone(), path.clone());
            definitions.push(definition);
        }
    }
    Ok(definitions)
}

pub fn load_definitions_file(path: &Path) -> Result<Vec<TestDefinition>, DefinitionError> {
    let raw = fs::read_to_string(path).map_err(|source| DefinitionError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let file = parse_definitions(path, &raw)?;
    for (index, definition) in file.tests.iter().enumerate() {
        definition
            .check()
            .map_err(|(field, reason)| DefinitionError::Invalid {
                path: path.to_path_buf(),
                name: definition.name.clone(),
                field: format!("tests[{index}].{field}"),
                reason,
            })?;
    }
    Ok(file.tests)
}

fn parse_definitions(path: &Path, raw: &str) -> Result<DefinitionsFile, DefinitionError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, DefinitionsFile>(&mut deserializer).map_err(|error| {
        let field_path = error.path().to_string();
        DefinitionError::Parse {
            path: path.to_path_buf(),
            field_path,
            message: error.into_inner().to_string(),
        }
    })
}

fn collect_json_files_sorted(dir: &Path) -> Result<Vec<PathBuf>, DefinitionError> {
    let read_dir_error = |source| DefinitionError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_dir_error)? {
        let path = entry.map_err(read_dir_error)?.path();
        if path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
