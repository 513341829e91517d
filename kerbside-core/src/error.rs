//! Error taxonomy shared by workflows, ports, and adapters.

use std::fmt;

/// Result alias used throughout the core and its adapters.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors surfaced by kerbside operations.
///
/// Every variant is recoverable at the caller boundary and maps to a distinct
/// [`ErrorKind`], so an API layer never has to parse messages.
pub enum CoreError {
    /// An entity id did not resolve.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// Identifier that failed to resolve.
        id: String,
    },
    /// An ownership or role predicate failed.
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// A value was outside its documented domain.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// The operation is not valid for the entity's current status.
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// A concurrent update was detected and not resolved.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Persistence or network failure; callers may retry.
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Category of a [`CoreError`], stable for mapping onto user-visible outcomes.
pub enum ErrorKind {
    /// See [`CoreError::NotFound`].
    NotFound,
    /// See [`CoreError::Forbidden`].
    Forbidden,
    /// See [`CoreError::InvalidInput`].
    InvalidInput,
    /// See [`CoreError::InvalidState`].
    InvalidState,
    /// See [`CoreError::Conflict`].
    Conflict,
    /// See [`CoreError::Unavailable`].
    Unavailable,
}

impl CoreError {
    /// Category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::Forbidden(_) => ErrorKind::Forbidden,
            CoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            CoreError::InvalidState(_) => ErrorKind::InvalidState,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    /// Build a [`CoreError::NotFound`] for the given entity kind and id.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Build a [`CoreError::Forbidden`].
    #[must_use]
    pub fn forbidden(reason: impl Into<String>) -> Self {
        CoreError::Forbidden(reason.into())
    }

    /// Build a [`CoreError::InvalidInput`].
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        CoreError::InvalidInput(reason.into())
    }

    /// Build a [`CoreError::InvalidState`].
    #[must_use]
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        CoreError::InvalidState(reason.into())
    }

    /// Whether the caller may retry the same request unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Unavailable)
    }
}
