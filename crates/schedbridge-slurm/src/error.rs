//! Error handling for the Slurm bridge.

use serde::Serialize;
use thiserror::Error;

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Machine-readable reason code carried by every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    Internal,
    Unknown,
}

impl ErrorCode {
    /// Wire name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while serving a request.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Account does not exist in the accounting store.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// User does not exist in the accounting store.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// No association links the user to the account.
    #[error("User {user} is not associated with account {account}")]
    AssociationNotFound { user: String, account: String },

    /// Job not found in the accounting store.
    #[error("Job not found: {0}")]
    JobNotFound(i64),

    /// Node not known to the controller.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Account already exists.
    #[error("Account already exists: {0}")]
    AccountExists(String),

    /// User is already associated with the account.
    #[error("User {user} is already associated with account {account}")]
    AssociationExists { user: String, account: String },

    /// An identifier failed the character whitelist.
    #[error("Invalid identifier {value:?} for {field}")]
    InvalidIdentifier { field: &'static str, value: String },

    /// Any other malformed argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The scheduler controller could not be contacted.
    #[error("Slurm controller unreachable: {0}")]
    ControllerUnreachable(String),

    /// An external command could not be run or exited unsuccessfully.
    #[error("Command failed: {command} - {message}")]
    CommandFailed { command: String, message: String },

    /// An external command exceeded its deadline.
    #[error("Command timed out: {0}")]
    Timeout(String),

    /// Command output could not be parsed.
    #[error("Unexpected output from {command}: {message}")]
    Parse { command: String, message: String },

    /// Job submission, cancellation or modification rejected by the scheduler.
    #[error("{0}")]
    Scheduler(String),

    /// Accounting store query failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdapterError {
    /// Reason code reported to RPC clients.
    pub fn code(&self) -> ErrorCode {
        match self {
            AdapterError::AccountNotFound(_)
            | AdapterError::UserNotFound(_)
            | AdapterError::AssociationNotFound { .. }
            | AdapterError::JobNotFound(_)
            | AdapterError::NodeNotFound(_) => ErrorCode::NotFound,
            AdapterError::AccountExists(_) | AdapterError::AssociationExists { .. } => {
                ErrorCode::AlreadyExists
            }
            AdapterError::InvalidIdentifier { .. } | AdapterError::InvalidArgument(_) => {
                ErrorCode::InvalidArgument
            }
            AdapterError::ControllerUnreachable(_)
            | AdapterError::CommandFailed { .. }
            | AdapterError::Timeout(_)
            | AdapterError::Parse { .. }
            | AdapterError::Database(_)
            | AdapterError::Internal(_) => ErrorCode::Internal,
            AdapterError::Scheduler(_) => ErrorCode::Unknown,
        }
    }
}

impl From<sqlx::Error> for AdapterError {
    fn from(e: sqlx::Error) -> Self {
        AdapterError::Database(e.to_string())
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(e: std::io::Error) -> Self {
        AdapterError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AdapterError::AccountNotFound("acme".to_string());
        assert_eq!(err.to_string(), "Account not found: acme");

        let err = AdapterError::AssociationNotFound {
            user: "alice".to_string(),
            account: "acme".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "User alice is not associated with account acme"
        );

        let err = AdapterError::Scheduler("sbatch: error: invalid partition".to_string());
        assert_eq!(err.to_string(), "sbatch: error: invalid partition");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AdapterError::JobNotFound(7).code(), ErrorCode::NotFound);
        assert_eq!(
            AdapterError::AccountExists("a".into()).code(),
            ErrorCode::AlreadyExists
        );
        assert_eq!(
            AdapterError::InvalidIdentifier {
                field: "account",
                value: "a;b".into()
            }
            .code(),
            ErrorCode::InvalidArgument
        );
        assert_eq!(
            AdapterError::ControllerUnreachable("squeue".into()).code(),
            ErrorCode::Internal
        );
        assert_eq!(
            AdapterError::Scheduler("boom".into()).code(),
            ErrorCode::Unknown
        );
        assert_eq!(ErrorCode::AlreadyExists.as_str(), "ALREADY_EXISTS");
    }
}
