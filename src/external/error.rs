//! Errors from external operations

use thiserror::Error;

/// Failure of a single external operation
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("failed to start {command}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("{command} exited with code {code}: {output}")]
    Exit {
        command: String,
        code: i32,
        /// Last lines the command wrote, stdout then stderr
        output: String,
    },

    #[error("{command} timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Config(String),
}

impl OperationError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        OperationError::Io {
            context: context.into(),
            source,
        }
    }
}
