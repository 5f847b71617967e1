use serde::Serialize;
use std::fmt;

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", content = "data")]
pub enum DaemonError {
    SessionNotFound {
        session_id: String,
    },
    TaskNotFound {
        task_id: String,
    },
    RewindPointNotFound,
    QueryNotActive,
    SdkNotReady,
    InvalidSessionState {
        session_id: String,
        current_state: String,
        expected_state: String,
    },
    GitOperationFailed {
        operation: String,
        message: String,
    },
    DatabaseError {
        message: String,
    },
    InvalidInput {
        field: String,
        message: String,
    },
    ConfigError {
        key: String,
        message: String,
    },
}

impl DaemonError {
    pub fn from_session_lookup(session_id: &str, error: impl ToString) -> Self {
        let message = error.to_string();
        let normalized = message.to_lowercase();
        if normalized.contains("query returned no rows")
            || normalized.contains("session not found")
            || normalized.contains("failed to get session")
        {
            DaemonError::SessionNotFound {
                session_id: session_id.to_string(),
            }
        } else {
            DaemonError::DatabaseError { message }
        }
    }

    pub fn db(error: impl ToString) -> Self {
        DaemonError::DatabaseError {
            message: error.to_string(),
        }
    }

    pub fn git(operation: &str, error: impl ToString) -> Self {
        DaemonError::GitOperationFailed {
            operation: operation.to_string(),
            message: error.to_string(),
        }
    }

    pub fn invalid_input(field: &str, message: impl ToString) -> Self {
        DaemonError::InvalidInput {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn config(key: &str, message: impl ToString) -> Self {
        DaemonError::ConfigError {
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SessionNotFound { .. } => {
                write!(f, "Session not found")
            }
            Self::TaskNotFound { task_id } => {
                write!(f, "Task not found: {task_id}")
            }
            Self::RewindPointNotFound => {
                write!(f, "Rewind point not found")
            }
            Self::QueryNotActive => {
                write!(f, "SDK query not active")
            }
            Self::SdkNotReady => {
                write!(f, "SDK not ready")
            }
            Self::InvalidSessionState {
                session_id,
                current_state,
                expected_state,
            } => {
                write!(
                    f,
                    "Session '{session_id}' is in state '{current_state}', expected '{expected_state}'"
                )
            }
            Self::GitOperationFailed { operation, message } => {
                write!(f, "Git operation '{operation}' failed: {message}")
            }
            Self::DatabaseError { message } => {
                write!(f, "Database error: {message}")
            }
            Self::InvalidInput { field, message } => {
                write!(f, "Invalid input for field '{field}': {message}")
            }
            Self::ConfigError { key, message } => {
                write!(f, "Configuration error for key '{key}': {message}")
            }
        }
    }
}

impl std::error::Error for DaemonError {}

impl From<DaemonError> for String {
    fn from(error: DaemonError) -> Self {
        error.to_string()
    }
}
