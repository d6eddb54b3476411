//! Session-engine error types.

use thiserror::Error;

use crate::domain::ports::{MemoryError, ProviderError};

/// Failures surfaced by the session engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("Tool call {tool} is missing required field '{field}'")]
    MissingField {
        tool: &'static str,
        field: &'static str,
    },

    #[error("Entry summary is {len} characters, exceeding the {max} character bound")]
    SummaryTooLong { len: usize, max: usize },

    #[error("Entry role '{0}' is not a canonical speaker role")]
    NonCanonicalRole(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Could not resolve memory id from candidate '{0}'")]
    UnresolvedMemoryId(String),

    #[error("Asset '{0}' resolved to an empty body")]
    EmptyAsset(String),

    #[error("Bootstrap incomplete after {polls} polling turns")]
    BootstrapTimeout { polls: u32 },

    #[error(
        "Session failed to close after {attempts} attempts{}",
        explanation.as_deref().map(|e| format!("; model explanation: {e}")).unwrap_or_default()
    )]
    Termination {
        attempts: u32,
        explanation: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_termination_embeds_explanation() {
        let err = EngineError::Termination {
            attempts: 10,
            explanation: Some("still draining entries".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("10 attempts"));
        assert!(msg.contains("still draining entries"));

        let bare = EngineError::Termination {
            attempts: 10,
            explanation: None,
        };
        assert!(!bare.to_string().contains("explanation"));
    }

    #[test]
    fn test_provider_error_converts() {
        let err: EngineError = ProviderError::Overloaded("529".to_string()).into();
        assert!(matches!(err, EngineError::Provider(_)));
    }
}
