//! Configuration for a voice session
//!
//! Bundles the user-facing [`VoiceSettings`] with the controller's timing knobs.

use crate::llm::DEFAULT_MAX_SENTENCE_CHARS;
use crate::speech::settings::VoiceSettings;
use crate::{Result, VoxError};
use std::time::Duration;

/// Timers and limits owned by the turn controller
#[derive(Clone, Debug, PartialEq)]
pub struct TurnTiming {
    /// How long to wait after capture stops for a trailing final transcript
    pub settle_window: Duration,

    /// Pause between the end of speech and listening again
    pub resume_delay: Duration,

    /// Length ceiling for punctuation-free text in the segmenter
    pub max_sentence_chars: usize,
}

impl Default for TurnTiming {
    fn default() -> Self {
        Self {
            settle_window: Duration::from_millis(300),
            resume_delay: Duration::from_millis(600),
            max_sentence_chars: DEFAULT_MAX_SENTENCE_CHARS,
        }
    }
}

/// Configuration for one voice session
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionConfig {
    /// Voice settings, immutable for the session
    pub settings: VoiceSettings,

    /// Controller timing
    pub timing: TurnTiming,
}

impl SessionConfig {
    /// Create a configuration from voice settings with default timing
    pub fn new(settings: VoiceSettings) -> Self {
        Self {
            settings,
            timing: TurnTiming::default(),
        }
    }

    /// Set the voice settings
    pub fn with_settings(mut self, settings: VoiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the controller timing
    pub fn with_timing(mut self, timing: TurnTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Enable or disable push-to-talk
    pub fn push_to_talk(mut self, enabled: bool) -> Self {
        self.settings.push_to_talk = enabled;
        self
    }

    /// Set the settle window after capture stops
    pub fn with_settle_window(mut self, window: Duration) -> Self {
        self.timing.settle_window = window;
        self
    }

    /// Set the delay before listening resumes
    pub fn with_resume_delay(mut self, delay: Duration) -> Self {
        self.timing.resume_delay = delay;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.settings.validate()?;

        if self.timing.max_sentence_chars == 0 {
            return Err(VoxError::ConfigError(
                "Sentence length ceiling must be positive".into(),
            ));
        }
        if self.timing.settle_window > Duration::from_secs(5) {
            return Err(VoxError::ConfigError(format!(
                "Settle window too long: {:?}",
                self.timing.settle_window
            )));
        }

        Ok(())
    }
}
