//! Common error type for the dispatcher.
//!
//! The dispatcher talks to the database, an email provider and HTTP callers.
//! This module consolidates the possible failures into a single [`Error`]
//! enum so that callers can use a simple `Result<T, Error>`, and maps every
//! variant onto an HTTP status and a machine-readable error code for the
//! trigger endpoints.

use thiserror::Error;

use crate::delivery::provider::ProviderError;
use crate::domain::SubjectId;
use crate::repository::RepositoryError;

/// Why a run was refused before any email was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// No topic is scheduled at the subject's current sequence.
    NoTopic,
    /// The scheduled topic has no approved issue.
    NoApprovedIssue,
    /// The issue or campaign has an empty body.
    EmptyContent,
    /// The requested issue exists but is not approved.
    IssueNotApproved,
}

impl Precondition {
    pub fn code(self) -> &'static str {
        match self {
            Precondition::NoTopic => "no_topic",
            Precondition::NoApprovedIssue => "no_approved_issue",
            Precondition::EmptyContent => "empty_content",
            Precondition::IssueNotApproved => "issue_not_approved",
        }
    }
}

/// Errors that can occur while running the dispatcher.
#[derive(Debug, Error)]
pub enum Error {
    /// Persistence layer failures.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Errors while constructing the database pool.
    #[error("database pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// The email provider rejected a request outside of batch sending.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Problems with environment or configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Missing or wrong shared secret.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The requested subject, issue or campaign does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The run cannot start; nothing was sent.
    #[error("{message}")]
    Precondition { kind: Precondition, message: String },

    /// Another invocation advanced the sequence first.
    #[error("sequence for subject#{subject_id} is no longer at {expected}")]
    SequenceConflict { subject_id: SubjectId, expected: i32 },

    /// Every attempted send failed.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Malformed caller input (bad unsubscribe token, invalid email).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Binding or serving the HTTP listener failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn precondition(kind: Precondition, message: impl Into<String>) -> Self {
        Error::Precondition {
            kind,
            message: message.into(),
        }
    }

    /// HTTP status code reported by the trigger endpoints.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Unauthorized(_) => 401,
            Error::NotFound(_) => 404,
            Error::Precondition { kind, .. } => match kind {
                Precondition::NoTopic | Precondition::NoApprovedIssue => 404,
                Precondition::EmptyContent | Precondition::IssueNotApproved => 400,
            },
            Error::BadRequest(_) => 400,
            Error::SequenceConflict { .. } => 409,
            Error::Repository(RepositoryError::NotFound(_)) => 404,
            Error::Repository(_)
            | Error::Pool(_)
            | Error::Provider(_)
            | Error::Config(_)
            | Error::Delivery(_)
            | Error::Io(_) => 500,
        }
    }

    /// Machine-readable error code reported alongside the status.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Unauthorized(_) => "unauthorized",
            Error::NotFound(_) | Error::Repository(RepositoryError::NotFound(_)) => "not_found",
            Error::Precondition { kind, .. } => kind.code(),
            Error::BadRequest(_) => "bad_request",
            Error::SequenceConflict { .. } => "sequence_conflict",
            Error::Delivery(_) | Error::Provider(_) => "delivery_failed",
            Error::Repository(_) | Error::Pool(_) => "database_error",
            Error::Config(_) => "configuration_error",
            Error::Io(_) => "io_error",
        }
    }
}
