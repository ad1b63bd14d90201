//! Error types for the rule repair pipeline
//!
//! Stage-boundary failures (acquisition, engine output, publishing) surface
//! as variants of [`Error`] and end the run. Per-unit failures (one batch,
//! one rule) are logged where they happen and never reach the controller.

use thiserror::Error;

/// Result type for rulemend operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The corpus working copy could not be obtained
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    /// The lint engine reported an internal failure or emitted unparsable output
    #[error("Engine error: {0}")]
    Engine(String),

    /// A rule id could not be mapped to a rule file
    #[error("Resolution error for {rule_id}: {message}")]
    Resolution { rule_id: String, message: String },

    /// The reasoning agent failed to run or returned nothing useful
    #[error("Agent error: {0}")]
    Agent(String),

    /// Branch, commit, push, or pull request creation failed
    #[error("Publish error: {0}")]
    Publish(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn acquisition(msg: impl Into<String>) -> Self {
        Self::Acquisition(msg.into())
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    pub fn resolution(rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolution {
            rule_id: rule_id.into(),
            message: message.into(),
        }
    }

    pub fn agent(msg: impl Into<String>) -> Self {
        Self::Agent(msg.into())
    }

    /// Wraps any failure from the git/GitHub adapters, keeping the context chain.
    pub fn publish(err: impl std::fmt::Display) -> Self {
        Self::Publish(format!("{:#}", err))
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_keeps_anyhow_context_chain() {
        let inner = anyhow::anyhow!("remote rejected").context("git push failed");
        let err = Error::publish(inner);
        let text = err.to_string();
        assert!(text.contains("git push failed"));
        assert!(text.contains("remote rejected"));
    }

    #[test]
    fn test_resolution_message_names_rule() {
        let err = Error::resolution("RedHat.Missing", "rule file not found");
        assert_eq!(
            err.to_string(),
            "Resolution error for RedHat.Missing: rule file not found"
        );
    }
}
