//! Errors surfaced by the curriculum resolver.
//!
//! Storage failures never appear here: the resolver absorbs them and takes
//! the fallback path. What remains is bad input, content that exists
//! nowhere, and a broken fallback installation.

use thiserror::Error;

use crate::grade::{UnknownGrade, UnknownTerm};

#[derive(Debug, Error)]
pub enum CurriculumError {
    #[error(transparent)]
    UnknownGrade(#[from] UnknownGrade),

    #[error(transparent)]
    UnknownTerm(#[from] UnknownTerm),

    #[error("invalid subject: '{0}'")]
    InvalidSubject(String),

    #[error("query must not be empty")]
    EmptyQuery,

    #[error("{0}")]
    NotFound(String),

    /// A bundled fallback file is missing or unreadable. This is a
    /// deployment problem rather than a request problem.
    #[error("fallback content unavailable: {0}")]
    FallbackUnavailable(String),
}

impl CurriculumError {
    pub fn not_found(message: impl Into<String>) -> Self {
        CurriculumError::NotFound(message.into())
    }
}
