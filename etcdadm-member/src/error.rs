//! Error kinds for the agent
//!
//! Mirrors the error taxonomy from the design: configuration problems and
//! precondition failures are fatal at startup, external call failures are
//! fatal for the current invocation only, and an unknown verb is its own
//! distinct case so `main` can print the exact wording the operator expects.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{0}")]
    Configuration(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("{op} failed: {source}")]
    ExternalCall {
        op: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Unexpected command: {0}")]
    UnknownVerb(String),
}

impl AgentError {
    pub fn external(op: impl Into<String>, source: anyhow::Error) -> Self {
        AgentError::ExternalCall {
            op: op.into(),
            source,
        }
    }
}
