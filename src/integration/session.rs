//! Per-session conversation state
//!
//! Only the turn controller mutates a [`VoiceSession`].

use crate::speech::playback::PlaybackQueue;
use crate::speech::settings::VoiceSettings;

/// Turn-taking state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Nobody's turn; waiting for the user
    Idle,
    /// Capturing the user's speech
    Listening,
    /// Capture closed, waiting for a trailing final transcript
    ProcessingCapture,
    /// User turn committed, waiting for the first model output
    WaitingOnModel,
    /// Assistant reply streaming and/or being spoken
    Speaking,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Listening => "listening",
            TurnState::ProcessingCapture => "processing_capture",
            TurnState::WaitingOnModel => "waiting_on_model",
            TurnState::Speaking => "speaking",
        }
    }
}

/// Transcript of the user turn being captured
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    /// Confirmed text; only grows within a turn
    final_text: String,

    /// Latest unconfirmed text; replaced on every event
    interim: String,
}

impl Transcript {
    /// Apply a capture event
    pub fn apply(&mut self, text: &str, is_final: bool) {
        if is_final {
            let text = text.trim();
            if !text.is_empty() {
                if !self.final_text.is_empty() {
                    self.final_text.push(' ');
                }
                self.final_text.push_str(text);
            }
            self.interim.clear();
        } else {
            self.interim = text.to_string();
        }
    }

    /// Text to commit: the final transcript, or the interim text if nothing was confirmed
    pub fn best(&self) -> String {
        let final_text = self.final_text.trim();
        if final_text.is_empty() {
            self.interim.trim().to_string()
        } else {
            final_text.to_string()
        }
    }

    pub fn final_text(&self) -> &str {
        &self.final_text
    }

    pub fn interim(&self) -> &str {
        &self.interim
    }

    pub fn is_empty(&self) -> bool {
        self.final_text.trim().is_empty() && self.interim.trim().is_empty()
    }

    pub fn clear(&mut self) {
        self.final_text.clear();
        self.interim.clear();
    }
}

/// One active conversation
#[derive(Debug)]
pub struct VoiceSession {
    pub state: TurnState,
    pub settings: VoiceSettings,
    pub transcript: Transcript,
    /// Last reported input level; advisory only
    pub audio_level: f32,
    pub playback_queue: PlaybackQueue,
}

impl VoiceSession {
    pub fn new(settings: VoiceSettings) -> Self {
        Self {
            state: TurnState::Idle,
            settings,
            transcript: Transcript::default(),
            audio_level: 0.0,
            playback_queue: PlaybackQueue::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interim_is_replaced() {
        let mut transcript = Transcript::default();
        transcript.apply("hel", false);
        transcript.apply("hello the", false);

        assert_eq!(transcript.interim(), "hello the");
        assert_eq!(transcript.best(), "hello the");
    }

    #[test]
    fn test_final_appends_and_clears_interim() {
        let mut transcript = Transcript::default();
        transcript.apply("hello", false);
        transcript.apply("Hello there.", true);
        transcript.apply("How are", false);
        transcript.apply("How are you?", true);

        assert_eq!(transcript.final_text(), "Hello there. How are you?");
        assert!(transcript.interim().is_empty());
    }

    #[test]
    fn test_best_prefers_final() {
        let mut transcript = Transcript::default();
        transcript.apply("Hello there.", true);
        transcript.apply("and more", false);

        assert_eq!(transcript.best(), "Hello there.");
    }

    #[test]
    fn test_empty_transcript() {
        let mut transcript = Transcript::default();
        transcript.apply("   ", false);
        assert!(transcript.is_empty());
        assert_eq!(transcript.best(), "");

        transcript.apply("words", true);
        transcript.clear();
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = VoiceSession::new(VoiceSettings::default());
        assert_eq!(session.state, TurnState::Idle);
        assert!(session.playback_queue.is_drained());
    }
}
