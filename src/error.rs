//! Error types.
//!
//! [`AssignmentError`] is the closed set of outcomes the assignment engine
//! reports. [`AppError`] is the boundary error that HTTP handlers return and
//! that carries the human-readable message.

use crate::db::DbError;
use thiserror::Error;

/// Failure kinds reported by the assignment engine.
#[derive(Debug, Error)]
pub enum AssignmentError {
    /// The pull request or user does not exist.
    #[error("resource not found")]
    NotFound,

    /// The pull request is merged and its reviewer list is frozen.
    #[error("pull request is merged")]
    PullRequestMerged,

    /// The reviewer being replaced is not assigned to the pull request.
    #[error("reviewer is not assigned")]
    NotAssigned,

    /// Nobody in the reviewer's team is eligible as a replacement.
    #[error("no replacement candidate")]
    NoCandidate,

    /// A directory or ledger call failed.
    #[error(transparent)]
    Store(#[from] DbError),
}

/// Application-level errors returned by the HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Requested resource not found.
    #[error("Not found: {resource}")]
    NotFound {
        resource: String,
        id: Option<String>,
    },

    /// Invalid input provided.
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
    },

    /// A team with this name already exists.
    #[error("team_name already exists: {team_name}")]
    TeamExists { team_name: String },

    /// A pull request with this id already exists.
    #[error("PR id already exists: {pull_request_id}")]
    PullRequestExists { pull_request_id: String },

    /// Reviewer changes were requested on a merged pull request.
    #[error("cannot reassign on merged PR")]
    PullRequestMerged,

    /// The reviewer to replace is not on the pull request.
    #[error("reviewer is not assigned to this PR")]
    NotAssigned,

    /// No active replacement exists in the reviewer's team.
    #[error("no active replacement candidate in team")]
    NoCandidate,

    /// Internal application error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: None,
        }
    }

    /// Create a not found error with ID.
    pub fn not_found_with_id(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: Some(id.into()),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
        }
    }

    /// Create an invalid input error with field name.
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable code for the API error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::TeamExists { .. } => "TEAM_EXISTS",
            Self::PullRequestExists { .. } => "PR_EXISTS",
            Self::PullRequestMerged => "PR_MERGED",
            Self::NotAssigned => "NOT_ASSIGNED",
            Self::NoCandidate => "NO_CANDIDATE",
            Self::Database { .. } | Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

// Conversions from lower layers

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::database(err.to_string())
    }
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::TeamExists(team_name) => Self::TeamExists { team_name },
            DbError::PullRequestExists(pull_request_id) => {
                Self::PullRequestExists { pull_request_id }
            }
            DbError::UserNotFound(id) => Self::not_found_with_id("User", id),
            other => Self::database(other.to_string()),
        }
    }
}

impl From<AssignmentError> for AppError {
    fn from(err: AssignmentError) -> Self {
        match err {
            AssignmentError::NotFound => Self::not_found("resource"),
            AssignmentError::PullRequestMerged => Self::PullRequestMerged,
            AssignmentError::NotAssigned => Self::NotAssigned,
            AssignmentError::NoCandidate => Self::NoCandidate,
            AssignmentError::Store(db) => Self::from(db),
        }
    }
}
