//! Per-session voice settings

use crate::{Result, VoxError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which speech engine family backs capture and synthesis
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechProvider {
    /// Engine built into the host platform
    #[default]
    Native,
    /// Remote recognition/synthesis service
    Cloud,
    /// Scripted engines for tests and demos
    Mock,
}

/// Settings fixed for the lifetime of a session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoiceSettings {
    /// BCP 47 language tag for recognition and synthesis
    pub language: String,

    pub provider: SpeechProvider,

    /// Speech rate (1.0 = normal)
    pub rate: f32,

    /// Voice pitch (1.0 = normal)
    pub pitch: f32,

    /// Output volume (0.0 to 1.0)
    pub volume: f32,

    /// Speak assistant replies as they stream in
    pub auto_play_response: bool,

    /// Require an explicit start for every user turn
    pub push_to_talk: bool,

    /// Stop listening after this long without transcript activity (0 = never)
    pub silence_timeout_ms: u64,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            provider: SpeechProvider::Native,
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            auto_play_response: true,
            push_to_talk: false,
            silence_timeout_ms: 3000,
        }
    }
}

impl VoiceSettings {
    /// Parse settings from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Set the recognition/synthesis language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the speech provider
    pub fn with_provider(mut self, provider: SpeechProvider) -> Self {
        self.provider = provider;
        self
    }

    /// Enable or disable push-to-talk
    pub fn with_push_to_talk(mut self, push_to_talk: bool) -> Self {
        self.push_to_talk = push_to_talk;
        self
    }

    /// Enable or disable speaking replies
    pub fn with_auto_play(mut self, auto_play: bool) -> Self {
        self.auto_play_response = auto_play;
        self
    }

    /// Set the silence timeout in milliseconds (0 disables it)
    pub fn with_silence_timeout_ms(mut self, ms: u64) -> Self {
        self.silence_timeout_ms = ms;
        self
    }

    /// Silence timeout as a duration, if enabled
    pub fn silence_timeout(&self) -> Option<Duration> {
        (self.silence_timeout_ms > 0).then(|| Duration::from_millis(self.silence_timeout_ms))
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.language.trim().is_empty() {
            return Err(VoxError::ConfigError("Language is required".into()));
        }
        if !(0.1..=10.0).contains(&self.rate) {
            return Err(VoxError::ConfigError(format!(
                "Speech rate out of range: {}",
                self.rate
            )));
        }
        if !(0.0..=2.0).contains(&self.pitch) {
            return Err(VoxError::ConfigError(format!(
                "Pitch out of range: {}",
                self.pitch
            )));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(VoxError::ConfigError(format!(
                "Volume out of range: {}",
                self.volume
            )));
        }
        Ok(())
    }
}
