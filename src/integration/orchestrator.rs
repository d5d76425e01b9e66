//! Orchestrator for a voice conversation
//!
//! Wires the turn controller to the capture engine, the model stream and the
//! synthesizer: Capture -> Transcript -> Model -> Sentences -> Synthesis

use crate::integration::config::SessionConfig;
use crate::integration::controller::{ControllerEvent, Effect, TurnController};
use crate::integration::session::TurnState;
use crate::llm::{ModelRequest, ModelStream, Sentence};
use crate::messages::{ConversationTurn, MessageStorage, TurnStore};
use crate::speech::capture::{CaptureAdapter, CaptureSignal, CaptureSink, ScriptedCapture};
use crate::speech::settings::VoiceSettings;
use crate::speech::synthesis::SynthesisAdapter;
use crate::utils::perf::TurnMetrics;
use crate::{Result, VoxError};
use crossbeam_channel::Receiver;
use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Commands that can be sent to the orchestrator
#[derive(Debug, Clone)]
pub enum OrchestratorCommand {
    /// Start capturing the user's speech
    StartListening,

    /// Stop capturing and send what was heard
    StopListening,

    /// Send a typed message instead of speaking
    SendText(String),

    /// Cancel listening, generation and playback
    Interrupt,

    /// Attach side context to the following model requests
    SetContext(Option<String>),

    /// Shutdown the orchestrator
    Shutdown,
}

/// Events emitted by the orchestrator
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    /// Turn state changed
    StateChanged { from: TurnState, to: TurnState },

    /// Live transcript of the user turn
    TranscriptUpdated { final_text: String, interim: String },

    /// Input level while listening
    AudioLevel(f32),

    /// A user turn was added to the history
    TurnCommitted(ConversationTurn),

    /// Assistant reply content so far
    AssistantUpdated { turn_id: Uuid, content: String },

    /// Sentence added to the playback queue
    SentenceQueued(Sentence),

    /// Sentence handed to the synthesizer
    SpeakingSentence(Sentence),

    /// Assistant turn ended normally
    TurnFinished { turn_id: Uuid, metrics: TurnMetrics },

    /// An error occurred
    Error(VoxError),

    /// Orchestrator has shut down
    Shutdown,
}

/// Handle for controlling the orchestrator
#[derive(Clone)]
pub struct OrchestratorHandle {
    /// Command sender
    command_tx: mpsc::UnboundedSender<OrchestratorCommand>,

    /// Event receiver
    event_rx: Receiver<OrchestratorEvent>,

    /// Mirror of the controller state
    state: Arc<RwLock<TurnState>>,

    /// Conversation history
    store: Arc<dyn TurnStore>,
}

impl OrchestratorHandle {
    /// Send a command to the orchestrator
    pub fn send_command(&self, cmd: OrchestratorCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| VoxError::ChannelError(format!("Failed to send command: {}", e)))
    }

    pub fn start_listening(&self) -> Result<()> {
        self.send_command(OrchestratorCommand::StartListening)
    }

    pub fn stop_listening(&self) -> Result<()> {
        self.send_command(OrchestratorCommand::StopListening)
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send_command(OrchestratorCommand::SendText(text.into()))
    }

    pub fn interrupt(&self) -> Result<()> {
        self.send_command(OrchestratorCommand::Interrupt)
    }

    pub fn set_context(&self, context: Option<String>) -> Result<()> {
        self.send_command(OrchestratorCommand::SetContext(context))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send_command(OrchestratorCommand::Shutdown)
    }

    /// Try to receive an event from the orchestrator
    pub fn try_recv_event(&self) -> Option<OrchestratorEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Get the event receiver for direct access
    pub fn event_receiver(&self) -> Receiver<OrchestratorEvent> {
        self.event_rx.clone()
    }

    /// Current turn state
    pub fn state(&self) -> TurnState {
        *self.state.read()
    }

    /// Snapshot of the conversation history
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.store.turns()
    }
}

/// Capture engine calls, applied strictly in order
#[derive(Debug)]
enum CaptureOp {
    Start { epoch: u64 },
    Stop,
}

/// Main orchestrator that runs one voice session
pub struct Orchestrator {
    /// Voice settings handed to the engines
    settings: VoiceSettings,

    /// Turn-taking state machine
    controller: TurnController,

    /// Command receiver
    command_rx: mpsc::UnboundedReceiver<OrchestratorCommand>,

    /// Capture events from the engine
    capture_tx: mpsc::UnboundedSender<CaptureSignal>,
    capture_rx: mpsc::UnboundedReceiver<CaptureSignal>,

    /// Completions from model and synthesis tasks
    inbox_tx: mpsc::UnboundedSender<ControllerEvent>,
    inbox_rx: mpsc::UnboundedReceiver<ControllerEvent>,

    /// Queue of capture engine calls
    capture_ops_tx: mpsc::UnboundedSender<CaptureOp>,
    capture_ops_rx: Option<mpsc::UnboundedReceiver<CaptureOp>>,

    capture: Arc<dyn CaptureAdapter>,
    model: Arc<dyn ModelStream>,
    synthesis: Arc<dyn SynthesisAdapter>,

    /// State mirror shared with the handle
    state: Arc<RwLock<TurnState>>,

    /// Stream consumer for the active request
    model_task: Option<(Uuid, JoinHandle<()>)>,

    /// Utterance in flight
    speak_task: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Create a new orchestrator over the given collaborators
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn TurnStore>,
        capture: Arc<dyn CaptureAdapter>,
        model: Arc<dyn ModelStream>,
        synthesis: Arc<dyn SynthesisAdapter>,
    ) -> Result<(Self, OrchestratorHandle)> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (capture_ops_tx, capture_ops_rx) = mpsc::unbounded_channel();

        let settings = config.settings.clone();
        let (mut controller, event_rx) = TurnController::new(config, Arc::clone(&store));
        if !capture.is_supported() {
            warn!("No speech capture available");
            controller.disable_capture();
        }

        let state = Arc::new(RwLock::new(controller.state()));

        let handle = OrchestratorHandle {
            command_tx,
            event_rx,
            state: Arc::clone(&state),
            store,
        };

        let orchestrator = Self {
            settings,
            controller,
            command_rx,
            capture_tx,
            capture_rx,
            inbox_tx,
            inbox_rx,
            capture_ops_tx,
            capture_ops_rx: Some(capture_ops_rx),
            capture,
            model,
            synthesis,
            state,
            model_task: None,
            speak_task: None,
        };

        Ok((orchestrator, handle))
    }

    /// Run the orchestrator on the current tokio runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Event loop; returns after `Shutdown` or once every handle is dropped
    pub async fn run(mut self) {
        info!("Orchestrator started");

        let capture_worker = self.capture_ops_rx.take().map(|ops_rx| {
            tokio::spawn(capture_worker(
                Arc::clone(&self.capture),
                self.settings.clone(),
                self.capture_tx.clone(),
                self.inbox_tx.clone(),
                ops_rx,
            ))
        });

        loop {
            let deadline = self.controller.next_deadline();

            let event = tokio::select! {
                biased;

                command = self.command_rx.recv() => match command {
                    Some(command) => match command_event(command) {
                        Some(event) => event,
                        None => {
                            info!("Orchestrator shutdown requested");
                            break;
                        }
                    },
                    None => {
                        warn!("Command channel disconnected");
                        break;
                    }
                },
                Some(event) = self.inbox_rx.recv() => event,
                Some(signal) = self.capture_rx.recv() => ControllerEvent::Capture(signal),
                _ = wait_until(deadline) => ControllerEvent::Tick,
            };

            self.dispatch(event);
        }

        self.dispatch(ControllerEvent::Interrupt);
        if let Some((_, task)) = self.model_task.take() {
            task.abort();
        }

        // Let pending capture calls (including the final stop) reach the engine
        drop(self.capture_ops_tx);
        if let Some(worker) = capture_worker {
            let _ = worker.await;
        }

        let _ = self
            .controller
            .event_sender()
            .send(OrchestratorEvent::Shutdown);
        info!("Orchestrator stopped");
    }

    fn dispatch(&mut self, event: ControllerEvent) {
        let transition = self.controller.handle(event, Instant::now());
        if transition.changed() {
            *self.state.write() = transition.to;
        }

        for effect in transition.effects {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::OpenCapture { epoch } => {
                let _ = self.capture_ops_tx.send(CaptureOp::Start { epoch });
            }
            Effect::CloseCapture => {
                let _ = self.capture_ops_tx.send(CaptureOp::Stop);
            }
            Effect::RequestModel(request) => self.start_model(request),
            Effect::AbandonModel { request_id } => match self.model_task.take() {
                Some((id, task)) if id == request_id => {
                    debug!("Abandoning model stream {}", request_id);
                    task.abort();
                }
                other => self.model_task = other,
            },
            Effect::Speak {
                request_id,
                sentence,
            } => self.start_utterance(request_id, sentence),
            Effect::StopSynthesis => {
                self.synthesis.stop();
                if let Some(task) = self.speak_task.take() {
                    task.abort();
                }
            }
        }
    }

    fn start_model(&mut self, request: ModelRequest) {
        let request_id = request.request_id;
        let mut stream = self.model.stream(request);
        let inbox = self.inbox_tx.clone();

        debug!("Requesting model reply {}", request_id);

        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let event = match item {
                    Ok(text) => ControllerEvent::ModelFragment { request_id, text },
                    Err(error) => {
                        let _ = inbox.send(ControllerEvent::ModelFailed { request_id, error });
                        return;
                    }
                };
                if inbox.send(event).is_err() {
                    return;
                }
            }
            let _ = inbox.send(ControllerEvent::ModelComplete { request_id });
        });

        if let Some((_, previous)) = self.model_task.replace((request_id, task)) {
            previous.abort();
        }
    }

    fn start_utterance(&mut self, request_id: Uuid, sentence: Sentence) {
        let synthesis = Arc::clone(&self.synthesis);
        let settings = self.settings.clone();
        let inbox = self.inbox_tx.clone();

        let task = tokio::spawn(async move {
            let index = sentence.index;
            let event = match synthesis.speak(&sentence.text, &settings).await {
                Ok(()) => ControllerEvent::SynthesisDone { request_id, index },
                Err(error) => ControllerEvent::SynthesisFailed {
                    request_id,
                    index,
                    error,
                },
            };
            let _ = inbox.send(event);
        });

        if self.speak_task.replace(task).is_some() {
            debug!("Previous utterance task still registered");
        }
    }
}

/// Controller input for a command; `None` ends the event loop
fn command_event(command: OrchestratorCommand) -> Option<ControllerEvent> {
    let event = match command {
        OrchestratorCommand::StartListening => ControllerEvent::StartListening,
        OrchestratorCommand::StopListening => ControllerEvent::StopListening,
        OrchestratorCommand::SendText(text) => ControllerEvent::SubmitText(text),
        OrchestratorCommand::Interrupt => ControllerEvent::Interrupt,
        OrchestratorCommand::SetContext(context) => ControllerEvent::SetContext(context),
        OrchestratorCommand::Shutdown => return None,
    };
    Some(event)
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn capture_worker(
    capture: Arc<dyn CaptureAdapter>,
    settings: VoiceSettings,
    signal_tx: mpsc::UnboundedSender<CaptureSignal>,
    inbox: mpsc::UnboundedSender<ControllerEvent>,
    mut ops_rx: mpsc::UnboundedReceiver<CaptureOp>,
) {
    while let Some(op) = ops_rx.recv().await {
        match op {
            CaptureOp::Start { epoch } => {
                debug!("Opening capture {}", epoch);
                let sink = CaptureSink::new(epoch, signal_tx.clone());
                if let Err(error) = capture.start(&settings, sink).await {
                    let _ = inbox.send(ControllerEvent::CaptureFailed { epoch, error });
                }
            }
            CaptureOp::Stop => {
                if let Err(e) = capture.stop().await {
                    warn!("Failed to stop capture: {}", e);
                }
            }
        }
    }
}

/// Builder for creating an orchestrator
pub struct OrchestratorBuilder {
    config: SessionConfig,
    store: Arc<dyn TurnStore>,
    capture: Arc<dyn CaptureAdapter>,
    model: Option<Arc<dyn ModelStream>>,
    synthesis: Option<Arc<dyn SynthesisAdapter>>,
}

impl OrchestratorBuilder {
    /// Create a new builder with default configuration, in-memory history and no capture
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            store: Arc::new(MessageStorage::new()),
            capture: Arc::new(ScriptedCapture::unsupported()),
            model: None,
            synthesis: None,
        }
    }

    /// Set the complete configuration
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the voice settings
    pub fn with_settings(mut self, settings: VoiceSettings) -> Self {
        self.config.settings = settings;
        self
    }

    /// Enable or disable push-to-talk
    pub fn push_to_talk(mut self, enabled: bool) -> Self {
        self.config = self.config.push_to_talk(enabled);
        self
    }

    /// Set the conversation store
    pub fn with_store(mut self, store: impl TurnStore + 'static) -> Self {
        self.store = Arc::new(store);
        self
    }

    /// Set the speech capture engine
    pub fn with_capture(mut self, capture: impl CaptureAdapter + 'static) -> Self {
        self.capture = Arc::new(capture);
        self
    }

    /// Set the language model
    pub fn with_model(mut self, model: impl ModelStream + 'static) -> Self {
        self.model = Some(Arc::new(model));
        self
    }

    /// Set the speech synthesizer
    pub fn with_synthesis(mut self, synthesis: impl SynthesisAdapter + 'static) -> Self {
        self.synthesis = Some(Arc::new(synthesis));
        self
    }

    /// Build the orchestrator
    pub fn build(self) -> Result<(Orchestrator, OrchestratorHandle)> {
        let model = self
            .model
            .ok_or_else(|| VoxError::ConfigError("No language model configured".into()))?;
        let synthesis = self
            .synthesis
            .ok_or_else(|| VoxError::ConfigError("No speech synthesizer configured".into()))?;

        Orchestrator::new(self.config, self.store, self.capture, model, synthesis)
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
