//! Turn-taking integration
//!
//! This module provides:
//! - The turn controller state machine that decides whose turn it is
//! - The orchestrator event loop that drives capture, model and synthesis
//! - Session configuration

pub mod config;
pub mod controller;
pub mod orchestrator;
pub mod session;

// Re-export main types
pub use config::{SessionConfig, TurnTiming};
pub use controller::{ControllerEvent, Effect, Transition, TurnController};
pub use orchestrator::{
    Orchestrator, OrchestratorBuilder, OrchestratorCommand, OrchestratorEvent,
    OrchestratorHandle,
};
pub use session::{Transcript, TurnState, VoiceSession};
