//! Speech capture and synthesis
//!
//! This module provides:
//! - Capture and synthesis adapter interfaces over external engines
//! - Scripted/mock engines for tests and demos
//! - The playback queue that feeds synthesis one sentence at a time
//! - Per-session voice settings

pub mod capture;
pub mod playback;
pub mod settings;
pub mod synthesis;

// Re-export commonly used types
pub use capture::{
    CaptureAdapter, CaptureEvent, CaptureSignal, CaptureSink, CaptureStep, ScriptedCapture,
};
pub use playback::PlaybackQueue;
pub use settings::{SpeechProvider, VoiceSettings};
pub use synthesis::{MockSynthesizer, SynthesisAdapter};
