//! Error types for dirauthz

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or unreadable configuration, including TLS trust/key
    /// material. Fatal to the invocation, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Every configured directory endpoint failed to connect or bind.
    #[error("Unable to connect to any of the directory servers [{}]", attempted.join(", "))]
    NoReachableServer { attempted: Vec<String> },

    /// The principal's identity could not be resolved to a directory entry.
    #[error("No directory entry found for user '{0}'")]
    PrincipalNotFound(String),

    /// A string that was required to be a distinguished name was not one.
    #[error("Invalid distinguished name: {0}")]
    InvalidDn(String),

    /// Any other failure during lookup, search, or nested expansion.
    /// Wraps the underlying cause.
    #[error("Role resolution failed: {0}")]
    Resolution(#[source] anyhow::Error),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn resolution(err: impl Into<anyhow::Error>) -> Self {
        Self::Resolution(err.into())
    }
}
