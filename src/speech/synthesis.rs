//! Speech synthesis adapter interface

use crate::speech::settings::VoiceSettings;
use crate::{Result, VoxError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Speech-synthesis engine
///
/// Callers never have more than one `speak` in flight at a time.
#[async_trait]
pub trait SynthesisAdapter: Send + Sync {
    /// Speak one utterance, resolving when it has finished playing
    async fn speak(&self, text: &str, settings: &VoiceSettings) -> Result<()>;

    /// Cancel the current utterance, if any
    fn stop(&self);
}

#[derive(Default)]
struct MockSynthesizerInner {
    utterance_duration: Duration,
    failing: Mutex<HashSet<String>>,
    started: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
    cancel: Notify,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    stops: AtomicUsize,
}

/// Synthesizer that "speaks" by waiting, recording every utterance
#[derive(Clone, Default)]
pub struct MockSynthesizer {
    inner: Arc<MockSynthesizerInner>,
}

/// Keeps the in-flight count right even when a speak future is dropped
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockSynthesizer {
    /// Utterances complete immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Every utterance takes `duration` to play
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            inner: Arc::new(MockSynthesizerInner {
                utterance_duration: duration,
                ..Default::default()
            }),
        }
    }

    /// Make utterances with exactly this text fail
    pub fn fail_on(self, text: impl Into<String>) -> Self {
        self.inner.failing.lock().insert(text.into());
        self
    }

    /// Texts handed to `speak`, in call order
    pub fn spoken(&self) -> Vec<String> {
        self.inner.started.lock().clone()
    }

    /// Texts that finished playing
    pub fn completed(&self) -> Vec<String> {
        self.inner.completed.lock().clone()
    }

    /// Highest number of overlapping `speak` calls observed
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.inner.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisAdapter for MockSynthesizer {
    async fn speak(&self, text: &str, _settings: &VoiceSettings) -> Result<()> {
        let inner = &self.inner;
        let now_in_flight = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&inner.in_flight);
        inner.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        inner.started.lock().push(text.to_string());

        if inner.failing.lock().contains(text) {
            return Err(VoxError::SynthesisError(format!("Cannot speak {:?}", text)));
        }

        debug!("Mock speaking: {}", text);
        tokio::select! {
            _ = tokio::time::sleep(inner.utterance_duration) => {
                inner.completed.lock().push(text.to_string());
                Ok(())
            }
            _ = inner.cancel.notified() => {
                Err(VoxError::SynthesisError("Utterance cancelled".into()))
            }
        }
    }

    fn stop(&self) {
        self.inner.stops.fetch_add(1, Ordering::SeqCst);
        self.inner.cancel.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_utterances() {
        let synth = MockSynthesizer::new();
        let settings = VoiceSettings::default();

        synth.speak("Hi!", &settings).await.unwrap();
        synth.speak("Nice to meet you.", &settings).await.unwrap();

        assert_eq!(synth.spoken(), vec!["Hi!", "Nice to meet you."]);
        assert_eq!(synth.completed(), synth.spoken());
        assert_eq!(synth.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_failing_utterance() {
        let synth = MockSynthesizer::new().fail_on("bad");
        let result = synth.speak("bad", &VoiceSettings::default()).await;

        assert!(matches!(result, Err(VoxError::SynthesisError(_))));
        assert!(synth.completed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_utterance() {
        let synth = MockSynthesizer::with_duration(Duration::from_secs(5));
        let speaker = synth.clone();
        let task =
            tokio::spawn(async move { speaker.speak("long", &VoiceSettings::default()).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        synth.stop();

        let result = task.await.unwrap();
        assert!(result.is_err());
        assert_eq!(synth.stop_count(), 1);
        assert!(synth.completed().is_empty());
    }
}
