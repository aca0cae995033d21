use std::any::Any;
use std::fmt;

use thiserror::Error;

use crate::world::BlockPos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    NoResult,
    NoSequencesFinished,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutKind::NoResult => f.write_str("no result"),
            TimeoutKind::NoSequencesFinished => f.write_str("no sequences finished"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameTestError {
    #[error("{message} (t={tick})")]
    Assertion { message: String, tick: i64 },
    #[error("{message} at {absolute} (relative: {relative}) (t={tick})")]
    PositionalAssertion {
        message: String,
        absolute: BlockPos,
        relative: BlockPos,
        tick: i64,
    },
    #[error("timed out after {max_ticks} ticks: {kind}")]
    Timeout { kind: TimeoutKind, max_ticks: u32 },
    #[error("sequence not completed at t={tick}: {reason}")]
    SequenceNotCompleted { reason: String, tick: i64 },
    #[error("succeeded in invalid tick: expected {expected}, but current tick is {actual}")]
    InvalidTick { expected: i64, actual: i64 },
    #[error("condition already triggered at t={at}")]
    ConditionAlreadyTriggered { at: i64 },
    #[error("failed to place structure {structure}: {reason}")]
    Placement { structure: String, reason: String },
    #[error("test was ticked before its structure was placed")]
    StructureNotPlaced,
    #[error("could not find the placed structure at {origin}")]
    MissingStructure { origin: BlockPos },
    #[error(
        "not enough successes: {successes} out of {required} required, after {attempts} attempts"
    )]
    ExhaustedAttempts {
        attempts: u32,
        successes: u32,
        required: u32,
    },
    #[error("unknown failure: {0}")]
    Unknown(String),
}

impl GameTestError {
    pub fn assertion(message: impl Into<String>, tick: i64) -> Self {
        Self::Assertion {
            message: message.into(),
            tick,
        }
    }

    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            GameTestError::Assertion { .. } | GameTestError::PositionalAssertion { .. }
        )
    }

    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            GameTestError::Placement { .. }
                | GameTestError::StructureNotPlaced
                | GameTestError::MissingStructure { .. }
        )
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "test code panicked".to_string()
        };
        Self::Unknown(message)
    }
}

pub type TestResult = Result<(), GameTestError>;
