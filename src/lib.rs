//! Turn-taking orchestration for spoken conversations with a streaming
//! language model.
//!
//! The [`integration::TurnController`] owns the conversation state machine and
//! the [`integration::Orchestrator`] drives it from a single serialized
//! event loop fed by capture, model and synthesis tasks.

pub mod integration;
pub mod llm;
pub mod messages;
pub mod speech;
pub mod utils;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VoxError {
    #[error("Speech capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("Speech capture error: {0}")]
    CaptureError(String),

    #[error("Model stream error: {0}")]
    ModelStreamError(String),

    #[error("Speech synthesis error: {0}")]
    SynthesisError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

impl From<serde_json::Error> for VoxError {
    fn from(e: serde_json::Error) -> Self {
        VoxError::ConfigError(e.to_string())
    }
}

impl VoxError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Text input keeps working without a microphone
            VoxError::CaptureUnavailable(_) => true,
            VoxError::CaptureError(_) => true,
            VoxError::ModelStreamError(_) => true,
            VoxError::SynthesisError(_) => true,
            VoxError::PersistenceError(_) => true,
            VoxError::ConfigError(_) => false,
            VoxError::ChannelError(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            VoxError::CaptureUnavailable(_) => {
                "Voice input is not available. You can keep typing your answers.".to_string()
            }
            VoxError::CaptureError(_) => {
                "Speech recognition stopped unexpectedly. Please try again.".to_string()
            }
            VoxError::ModelStreamError(_) => {
                "The interviewer's reply was cut short. Please retry.".to_string()
            }
            VoxError::SynthesisError(_) => {
                "Part of the reply could not be spoken. It is still shown as text.".to_string()
            }
            VoxError::ConfigError(_) => {
                "Voice settings are invalid. Please check settings.".to_string()
            }
            VoxError::ChannelError(_) => {
                "Internal communication error. Please restart the session.".to_string()
            }
            VoxError::PersistenceError(_) => {
                "The conversation could not be saved. Please try again.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, VoxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_errors_are_recoverable() {
        assert!(VoxError::CaptureUnavailable("no mic".into()).is_recoverable());
        assert!(VoxError::ModelStreamError("reset".into()).is_recoverable());
        assert!(VoxError::SynthesisError("busy".into()).is_recoverable());
        assert!(!VoxError::ChannelError("closed".into()).is_recoverable());
    }

    #[test]
    fn test_user_message_mentions_retry() {
        let msg = VoxError::ModelStreamError("eof".into()).user_message();
        assert!(msg.contains("retry"));
    }

    #[test]
    fn test_json_error_maps_to_config() {
        let err: VoxError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, VoxError::ConfigError(_)));
    }
}
