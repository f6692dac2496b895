//! Runtime error taxonomy: what can go wrong while scheduling, running
//! containers, and collecting outputs, layered over the language-level
//! [`WdlError`].

use crate::error::WdlError;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Language-level failure (evaluation, coercion, validation).
    #[error(transparent)]
    Language(#[from] WdlError),

    /// The task command exited with an unacceptable status.
    #[error("task command failed with exit status {exit_status}")]
    CommandFailed {
        exit_status: i32,
        /// Last portion of captured stderr, for the log.
        stderr_tail: String,
    },

    /// Cooperative cancellation (termination signal observed).
    #[error("terminated")]
    Terminated,

    /// The container backend aborted the run.
    #[error("interrupted: {message}")]
    Interrupted { message: String },

    /// A declared output was missing or escaped the task sandbox.
    #[error("task output error: {message}")]
    Output { message: String },

    /// Bad run inputs (unusable file, malformed JSON, unknown input name).
    #[error("input error: {message}")]
    Input { message: String },

    #[error("failed to download {uri}: {message}")]
    DownloadFailed { uri: String, message: String },

    #[error("container backend error: {message}")]
    Container { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    /// Task failure wrapper carrying run identification.
    #[error("task {task} ({run_id}) failed: {cause}")]
    RunFailed {
        task: String,
        run_id: String,
        #[source]
        cause: Box<RuntimeError>,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl RuntimeError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        RuntimeError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn container(message: impl Into<String>) -> Self {
        RuntimeError::Container {
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        RuntimeError::Input {
            message: message.into(),
        }
    }

    pub fn output(message: impl Into<String>) -> Self {
        RuntimeError::Output {
            message: message.into(),
        }
    }

    /// Whether retrying the task attempt could possibly help.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            RuntimeError::CommandFailed { .. } | RuntimeError::Interrupted { .. }
        )
    }
}
