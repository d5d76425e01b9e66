//! Speech capture adapter interface
//!
//! A capture engine reports transcript and level events through a
//! [`CaptureSink`]. Each capture session gets its own epoch so the controller
//! can tell trailing events of the current session from stale ones.

use crate::speech::settings::VoiceSettings;
use crate::{Result, VoxError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

/// Event reported by a capture engine
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureEvent {
    /// Recognized text; interim text replaces the previous interim text
    Transcript { text: String, is_final: bool },

    /// Instantaneous input level (0.0 to 1.0)
    Level(f32),

    /// The engine failed while listening
    Error(String),

    /// The engine stopped listening on its own
    Ended,
}

/// Capture event tagged with the capture session it belongs to
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureSignal {
    pub epoch: u64,
    pub event: CaptureEvent,
}

/// Handle a capture engine uses to report events
#[derive(Clone, Debug)]
pub struct CaptureSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<CaptureSignal>,
}

impl CaptureSink {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<CaptureSignal>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Report an event; returns false once the session loop is gone
    pub fn send(&self, event: CaptureEvent) -> bool {
        self.tx
            .send(CaptureSignal {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }

    pub fn transcript(&self, text: impl Into<String>, is_final: bool) -> bool {
        self.send(CaptureEvent::Transcript {
            text: text.into(),
            is_final,
        })
    }

    pub fn level(&self, level: f32) -> bool {
        self.send(CaptureEvent::Level(level))
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.send(CaptureEvent::Error(message.into()))
    }
}

/// Speech-recognition engine
#[async_trait]
pub trait CaptureAdapter: Send + Sync {
    /// Whether the runtime has any capture capability
    fn is_supported(&self) -> bool {
        true
    }

    /// Open the microphone and start reporting events to `sink`
    ///
    /// Fails with [`VoxError::CaptureUnavailable`] when there is no engine.
    async fn start(&self, settings: &VoiceSettings, sink: CaptureSink) -> Result<()>;

    /// Stop listening; a trailing final transcript may still be reported
    async fn stop(&self) -> Result<()>;
}

/// One step of a scripted capture session
#[derive(Clone, Debug)]
pub enum CaptureStep {
    Transcript { text: String, is_final: bool },
    Level(f32),
    Error(String),
    Pause(Duration),
    /// Hold the remaining steps until `stop` is called
    AwaitStop,
}

impl CaptureStep {
    pub fn interim(text: impl Into<String>) -> Self {
        CaptureStep::Transcript {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        CaptureStep::Transcript {
            text: text.into(),
            is_final: true,
        }
    }
}

struct ScriptedCaptureInner {
    supported: bool,
    scripts: Mutex<VecDeque<Vec<CaptureStep>>>,
    stop_signal: Mutex<Arc<Notify>>,
    task: Mutex<Option<JoinHandle<()>>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

/// Capture engine that plays back prepared sessions, one script per `start`
#[derive(Clone)]
pub struct ScriptedCapture {
    inner: Arc<ScriptedCaptureInner>,
}

impl ScriptedCapture {
    pub fn new() -> Self {
        Self::with_support(true)
    }

    /// A runtime without any microphone
    pub fn unsupported() -> Self {
        Self::with_support(false)
    }

    fn with_support(supported: bool) -> Self {
        Self {
            inner: Arc::new(ScriptedCaptureInner {
                supported,
                scripts: Mutex::new(VecDeque::new()),
                stop_signal: Mutex::new(Arc::new(Notify::new())),
                task: Mutex::new(None),
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
            }),
        }
    }

    /// Queue the script for the next capture session
    pub fn then_script(self, steps: Vec<CaptureStep>) -> Self {
        self.inner.scripts.lock().push_back(steps);
        self
    }

    pub fn start_count(&self) -> usize {
        self.inner.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.inner.stops.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureAdapter for ScriptedCapture {
    fn is_supported(&self) -> bool {
        self.inner.supported
    }

    async fn start(&self, _settings: &VoiceSettings, sink: CaptureSink) -> Result<()> {
        if !self.inner.supported {
            return Err(VoxError::CaptureUnavailable(
                "No speech recognition engine".into(),
            ));
        }

        self.inner.starts.fetch_add(1, Ordering::SeqCst);
        let steps = self.inner.scripts.lock().pop_front().unwrap_or_default();
        let stop_signal = Arc::new(Notify::new());
        *self.inner.stop_signal.lock() = Arc::clone(&stop_signal);

        debug!("Scripted capture {} starting", sink.epoch());

        let task = tokio::spawn(async move {
            for step in steps {
                let delivered = match step {
                    CaptureStep::Transcript { text, is_final } => sink.transcript(text, is_final),
                    CaptureStep::Level(level) => sink.level(level),
                    CaptureStep::Error(message) => sink.error(message),
                    CaptureStep::Pause(pause) => {
                        tokio::time::sleep(pause).await;
                        true
                    }
                    CaptureStep::AwaitStop => {
                        stop_signal.notified().await;
                        true
                    }
                };
                if !delivered {
                    break;
                }
            }
        });

        if let Some(previous) = self.inner.task.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.inner.stops.fetch_add(1, Ordering::SeqCst);
        self.inner.stop_signal.lock().notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_tags_epoch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = CaptureSink::new(7, tx);

        assert!(sink.transcript("hello", false));
        let signal = rx.recv().await.unwrap();
        assert_eq!(signal.epoch, 7);
        assert_eq!(
            signal.event,
            CaptureEvent::Transcript {
                text: "hello".into(),
                is_final: false
            }
        );
    }

    #[tokio::test]
    async fn test_sink_reports_closed_loop() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        assert!(!CaptureSink::new(1, tx).level(0.5));
    }

    #[tokio::test]
    async fn test_unsupported_capture() {
        let capture = ScriptedCapture::unsupported();
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(!capture.is_supported());
        let result = capture
            .start(&VoiceSettings::default(), CaptureSink::new(1, tx))
            .await;
        assert!(matches!(result, Err(VoxError::CaptureUnavailable(_))));
    }

    #[tokio::test]
    async fn test_trailing_final_after_stop() {
        let capture = ScriptedCapture::new().then_script(vec![
            CaptureStep::interim("hello"),
            CaptureStep::AwaitStop,
            CaptureStep::final_text("Hello there."),
        ]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        capture
            .start(&VoiceSettings::default(), CaptureSink::new(1, tx))
            .await
            .unwrap();
        let first = rx.recv().await.unwrap();
        assert!(matches!(first.event, CaptureEvent::Transcript { is_final: false, .. }));

        capture.stop().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(
            second.event,
            CaptureEvent::Transcript {
                text: "Hello there.".into(),
                is_final: true
            }
        );
        assert_eq!(capture.start_count(), 1);
        assert_eq!(capture.stop_count(), 1);
    }
}
