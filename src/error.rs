//! Error types and the crate-wide [`Result`] alias.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for bmctty operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by session, console, and login-shell operations.
///
/// Nothing in the crate retries internally: every failure is returned to the
/// immediate caller with enough context (command text, buffered output,
/// configured timeout) to log or re-attempt.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport or PTY setup failed, or the initial prompt was never seen.
    /// Fatal to the session.
    #[error("connection failed: {reason}")]
    Connection { reason: String },

    /// A pattern wait hit its deadline. `buffered` holds whatever had been
    /// read from the stream before the deadline fired.
    #[error("timeout after {timeout:?}")]
    Timeout { timeout: Duration, buffered: String },

    /// The remote shell reported an error line, or its response could not be
    /// parsed into at least a command echo and a prompt line.
    #[error("command '{cmd}' failed: {reason}")]
    Command {
        cmd: String,
        response: String,
        reason: String,
    },

    /// A step of the login handshake or sentinel bootstrap did not see its
    /// expected prompt. Fatal to the login automaton.
    #[error("login failed while {stage}: {reason}")]
    Login { stage: &'static str, reason: String },

    /// The sentinel exit-code capture did not parse as an integer. Indicates
    /// a bootstrap or sentinel-definition bug, not a failing command.
    #[error("bad return code capture '{capture}' from '{cmd}'")]
    ResultParse { cmd: String, capture: String },
}

impl Error {
    pub(crate) fn connection(reason: impl ToString) -> Self {
        Error::Connection {
            reason: reason.to_string(),
        }
    }
}
