//! Error types for edgeos-bouncer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BouncerError {
    /// Startup problem that retrying cannot fix (missing group, bad settings).
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    /// The device answered but refused the request.
    #[error("Device error: {0}")]
    Device(String),

    #[error("Device diverged from confirmed state: expected {expected} addresses, found {actual}")]
    Divergence { expected: usize, actual: usize },

    #[error("Decision feed error: {0}")]
    Feed(String),
}

impl BouncerError {
    /// Whether the error must stop the process instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BouncerError::Configuration(_))
    }
}

impl From<reqwest::Error> for BouncerError {
    fn from(err: reqwest::Error) -> Self {
        BouncerError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_is_fatal() {
        assert!(BouncerError::Configuration("group missing".into()).is_fatal());
        assert!(!BouncerError::Network("timeout".into()).is_fatal());
        assert!(!BouncerError::Device("rejected".into()).is_fatal());
        assert!(!BouncerError::Divergence {
            expected: 3,
            actual: 2
        }
        .is_fatal());
    }

    #[test]
    fn test_divergence_message() {
        let err = BouncerError::Divergence {
            expected: 10,
            actual: 7,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected 10"));
        assert!(msg.contains("found 7"));
    }
}
