use std::error::Error as StdError;

use crate::{api::Problem, poll::Status};

/// Result type used throughout the engine.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the ACME engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport or provider settings are unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A builder or method was called with arguments it cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The CA (or the caller) produced data that does not fit the protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The CA answered with a problem document.
    #[error("{url}: {problem}")]
    Server {
        /// URL of the request that failed.
        url: String,

        /// Problem document as returned by the CA.
        problem: Problem,
    },

    /// A polled resource did not reach a terminal status within the time budget.
    #[error("timed out waiting for {url} (last status: {status})")]
    Timeout {
        /// Location of the resource that was polled.
        url: String,

        /// Status observed on the last successful poll.
        status: Status,
    },

    /// The CA does not advertise a feature that was requested.
    #[error("not supported by the CA: {0}")]
    CapabilityUnsupported(String),

    /// Connection, TLS or HTTP level failure.
    #[error("HTTP request failure: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to (de)serialize a JSON body.
    #[error("failed to (de)serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Key handling, CSR or certificate failures.
    #[error(transparent)]
    Other(Box<dyn StdError + Send + Sync + 'static>),
}

impl Error {
    /// Returns the CA problem document, if this error carries one.
    pub fn problem(&self) -> Option<&Problem> {
        match self {
            Error::Server { problem, .. } => Some(problem),
            _ => None,
        }
    }

    /// Returns true if the CA rejected the replay nonce.
    pub fn is_bad_nonce(&self) -> bool {
        self.problem().is_some_and(Problem::is_bad_nonce)
    }
}

impl From<eyre::Report> for Error {
    fn from(err: eyre::Report) -> Self {
        Error::Other(err.into())
    }
}
