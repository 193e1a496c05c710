use thiserror::Error;

/// Errors surfaced by the grouping, generation and selection core.
///
/// Exhaustion of the combination space is not an error: it comes back as
/// `Selection::Exhausted`. Split mismatches are repaired and reported as a
/// `SplitAdjustment` on the returned `TargetSplit`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PickerError {
    #[error("Invalid selection: no pick with a match id to build a key from")]
    InvalidSelection,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Session is not active")]
    SessionNotActive,

    #[error("Session lock poisoned")]
    SessionPoisoned,
}

/// How a caller should present a failure to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No more valid combinations. Expected end state.
    ExpectedEnd,
    /// The caller supplied something it can correct.
    Configuration,
    /// Unexpected; automation should halt.
    Internal,
}

impl PickerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PickerError::InvalidConfig(_) | PickerError::SessionNotActive => {
                ErrorKind::Configuration
            }
            PickerError::InvalidSelection | PickerError::SessionPoisoned => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, PickerError>;
