//! Turn controller
//!
//! Single-writer state machine deciding whose turn it is. Every input (user
//! commands, capture events, model fragments, synthesis callbacks, deadline
//! ticks) goes through [`TurnController::handle`], which updates the session
//! and returns the side effects the event loop must carry out.
//!
//! The controller owns three deadlines: the settle window after capture stops,
//! the silence timeout while listening, and the auto-resume delay after the
//! assistant finishes speaking. An interrupt cancels all of them at once.

use crate::integration::config::{SessionConfig, TurnTiming};
use crate::integration::orchestrator::OrchestratorEvent;
use crate::integration::session::{TurnState, VoiceSession};
use crate::llm::{ModelRequest, Sentence, SentenceSegmenter};
use crate::messages::{ConversationTurn, TurnRole, TurnStore};
use crate::speech::capture::{CaptureEvent, CaptureSignal};
use crate::utils::perf::{TimingTracker, TurnTimer};
use crate::VoxError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Inputs to the controller
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// User asked to start speaking
    StartListening,

    /// User asked to stop speaking and send
    StopListening,

    /// Typed user message
    SubmitText(String),

    /// Cancel whatever is in progress
    Interrupt,

    /// Side context attached to subsequent model requests
    SetContext(Option<String>),

    /// Event from a capture session
    Capture(CaptureSignal),

    /// Capture session could not be opened or failed outright
    CaptureFailed { epoch: u64, error: VoxError },

    /// Text fragment from the model
    ModelFragment { request_id: Uuid, text: String },

    /// Model stream ended normally
    ModelComplete { request_id: Uuid },

    /// Model stream failed
    ModelFailed { request_id: Uuid, error: VoxError },

    /// Utterance finished playing
    SynthesisDone { request_id: Uuid, index: usize },

    /// Utterance could not be spoken
    SynthesisFailed {
        request_id: Uuid,
        index: usize,
        error: VoxError,
    },

    /// Check deadlines against the current time
    Tick,
}

/// Side effects requested by a transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Open the capture engine for a new capture session
    OpenCapture { epoch: u64 },

    /// Close the capture engine
    CloseCapture,

    /// Start streaming a reply
    RequestModel(ModelRequest),

    /// Stop consuming the stream for this request
    AbandonModel { request_id: Uuid },

    /// Speak one sentence
    Speak { request_id: Uuid, sentence: Sentence },

    /// Cancel the utterance being spoken
    StopSynthesis,
}

/// Result of handling one event
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: TurnState,
    pub to: TurnState,
    pub effects: Vec<Effect>,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// The assistant turn currently streaming or being spoken
#[derive(Debug)]
struct ActiveReply {
    request_id: Uuid,
    content: String,
    stream_complete: bool,
    timer: TurnTimer,
}

#[derive(Debug, Default)]
struct Deadlines {
    settle: Option<Instant>,
    silence: Option<Instant>,
    resume: Option<Instant>,
}

impl Deadlines {
    fn next(&self) -> Option<Instant> {
        [self.settle, self.silence, self.resume]
            .into_iter()
            .flatten()
            .min()
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

fn is_due(deadline: Option<Instant>, now: Instant) -> bool {
    deadline.is_some_and(|at| at <= now)
}

pub struct TurnController {
    session: VoiceSession,
    timing: TurnTiming,
    store: Arc<dyn TurnStore>,
    event_tx: Sender<OrchestratorEvent>,
    segmenter: SentenceSegmenter,
    reply: Option<ActiveReply>,
    deadlines: Deadlines,
    capture_epoch: u64,
    capture_available: bool,
    side_context: Option<String>,
    first_fragment_latency: TimingTracker,
}

impl TurnController {
    /// Create a controller and the receiver for its observer events
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn TurnStore>,
    ) -> (Self, Receiver<OrchestratorEvent>) {
        let (event_tx, event_rx) = unbounded();
        let segmenter = SentenceSegmenter::with_max_chars(config.timing.max_sentence_chars);

        let controller = Self {
            session: VoiceSession::new(config.settings),
            timing: config.timing,
            store,
            event_tx,
            segmenter,
            reply: None,
            deadlines: Deadlines::default(),
            capture_epoch: 0,
            capture_available: true,
            side_context: None,
            first_fragment_latency: TimingTracker::new(20),
        };

        (controller, event_rx)
    }

    pub fn state(&self) -> TurnState {
        self.session.state
    }

    pub fn session(&self) -> &VoiceSession {
        &self.session
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.next()
    }

    /// Request id of the assistant turn in progress
    pub fn active_request(&self) -> Option<Uuid> {
        self.reply.as_ref().map(|r| r.request_id)
    }

    pub fn capture_epoch(&self) -> u64 {
        self.capture_epoch
    }

    pub fn capture_available(&self) -> bool {
        self.capture_available
    }

    /// Latch voice input off, e.g. when the runtime has no capture engine
    pub fn disable_capture(&mut self) {
        if self.capture_available {
            info!("Voice input disabled, text input only");
        }
        self.capture_available = false;
        self.deadlines.resume = None;
    }

    /// Time-to-first-fragment over recent turns
    pub fn first_fragment_latency(&self) -> &TimingTracker {
        &self.first_fragment_latency
    }

    pub fn event_sender(&self) -> Sender<OrchestratorEvent> {
        self.event_tx.clone()
    }

    /// Apply one event at time `now`
    pub fn handle(&mut self, event: ControllerEvent, now: Instant) -> Transition {
        let from = self.session.state;
        let mut effects = Vec::new();

        match event {
            ControllerEvent::StartListening => self.start_listening(now, &mut effects),
            ControllerEvent::StopListening => self.stop_listening(now, &mut effects),
            ControllerEvent::SubmitText(text) => self.submit_text(text, now, &mut effects),
            ControllerEvent::Interrupt => self.interrupt(&mut effects),
            ControllerEvent::SetContext(context) => self.side_context = context,
            ControllerEvent::Capture(signal) => self.on_capture(signal, now, &mut effects),
            ControllerEvent::CaptureFailed { epoch, error } => {
                self.on_capture_failed(epoch, error, now, &mut effects)
            }
            ControllerEvent::ModelFragment { request_id, text } => {
                self.on_fragment(request_id, &text, now, &mut effects)
            }
            ControllerEvent::ModelComplete { request_id } => {
                self.on_model_complete(request_id, now, &mut effects)
            }
            ControllerEvent::ModelFailed { request_id, error } => {
                self.on_model_failed(request_id, error, &mut effects)
            }
            ControllerEvent::SynthesisDone { request_id, index } => {
                self.on_utterance_end(request_id, index, None, now, &mut effects)
            }
            ControllerEvent::SynthesisFailed {
                request_id,
                index,
                error,
            } => self.on_utterance_end(request_id, index, Some(error), now, &mut effects),
            ControllerEvent::Tick => self.on_tick(now, &mut effects),
        }

        Transition {
            from,
            to: self.session.state,
            effects,
        }
    }

    fn emit(&self, event: OrchestratorEvent) {
        let _ = self.event_tx.send(event);
    }

    fn set_state(&mut self, to: TurnState) {
        let from = self.session.state;
        if from == to {
            return;
        }
        info!("Turn state {} -> {}", from.as_str(), to.as_str());
        self.session.state = to;
        self.emit(OrchestratorEvent::StateChanged { from, to });
    }

    fn emit_transcript(&self) {
        self.emit(OrchestratorEvent::TranscriptUpdated {
            final_text: self.session.transcript.final_text().to_string(),
            interim: self.session.transcript.interim().to_string(),
        });
    }

    fn arm_silence(&mut self, now: Instant) {
        self.deadlines.silence = self.session.settings.silence_timeout().map(|t| now + t);
    }

    fn start_listening(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        match self.session.state {
            TurnState::Idle => {}
            TurnState::Listening => {
                debug!("Already listening");
                return;
            }
            state => {
                warn!("Cannot start listening while {}", state.as_str());
                return;
            }
        }

        self.deadlines.resume = None;

        if !self.capture_available {
            warn!("Capture unavailable, staying idle");
            self.emit(OrchestratorEvent::Error(VoxError::CaptureUnavailable(
                "Speech capture is not available in this session".into(),
            )));
            return;
        }

        self.session.transcript.clear();
        self.session.audio_level = 0.0;
        self.capture_epoch += 1;
        effects.push(Effect::OpenCapture {
            epoch: self.capture_epoch,
        });
        self.set_state(TurnState::Listening);
        self.arm_silence(now);
        self.emit_transcript();
    }

    fn stop_listening(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        if self.session.state != TurnState::Listening {
            debug!("Stop ignored while {}", self.session.state.as_str());
            return;
        }

        effects.push(Effect::CloseCapture);
        self.deadlines.silence = None;
        self.set_state(TurnState::ProcessingCapture);

        if self.timing.settle_window.is_zero() {
            self.commit_capture(now, effects);
        } else {
            self.deadlines.settle = Some(now + self.timing.settle_window);
        }
    }

    fn commit_capture(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        self.deadlines.settle = None;
        let text = self.session.transcript.best();
        self.session.transcript.clear();
        self.session.audio_level = 0.0;

        if text.is_empty() {
            info!("No speech captured, not starting a turn");
            self.set_state(TurnState::Idle);
            return;
        }

        self.commit_user_turn(text, true, now, effects);
    }

    fn submit_text(&mut self, text: String, now: Instant, effects: &mut Vec<Effect>) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }

        match self.session.state {
            TurnState::Idle => self.deadlines.resume = None,
            TurnState::Listening | TurnState::ProcessingCapture => {
                // Typed text replaces whatever was being captured
                if self.session.state == TurnState::Listening {
                    effects.push(Effect::CloseCapture);
                }
                self.deadlines.silence = None;
                self.deadlines.settle = None;
                self.session.transcript.clear();
            }
            state => {
                warn!("Text input ignored while {}", state.as_str());
                return;
            }
        }

        self.commit_user_turn(text, false, now, effects);
    }

    fn commit_user_turn(
        &mut self,
        text: String,
        is_voice_input: bool,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) {
        // Replies cut off before any output carry nothing for the model
        let history: Vec<ConversationTurn> = self
            .store
            .turns()
            .into_iter()
            .filter(|t| !(t.role == TurnRole::Assistant && t.content.trim().is_empty()))
            .collect();
        let turn = ConversationTurn::user(text.clone(), is_voice_input);

        if let Err(e) = self.store.append_turn(turn.clone()) {
            warn!("Failed to record user turn: {}", e);
            self.emit(OrchestratorEvent::Error(e));
            self.set_state(TurnState::Idle);
            return;
        }
        info!("User turn committed ({} chars)", text.len());
        self.emit(OrchestratorEvent::TurnCommitted(turn));

        let request_id = Uuid::new_v4();
        if let Err(e) = self
            .store
            .append_turn(ConversationTurn::assistant_placeholder(request_id))
        {
            warn!("Failed to record assistant placeholder: {}", e);
            self.emit(OrchestratorEvent::Error(e));
            self.set_state(TurnState::Idle);
            return;
        }

        self.segmenter.reset();
        self.session.playback_queue.begin_request(request_id);
        self.reply = Some(ActiveReply {
            request_id,
            content: String::new(),
            stream_complete: false,
            timer: TurnTimer::start(now),
        });

        effects.push(Effect::RequestModel(ModelRequest {
            request_id,
            history,
            user_text: text,
            side_context: self.side_context.clone(),
        }));
        self.set_state(TurnState::WaitingOnModel);
    }

    fn interrupt(&mut self, effects: &mut Vec<Effect>) {
        let state = self.session.state;
        info!("Interrupt while {}", state.as_str());

        self.deadlines.clear();

        if matches!(state, TurnState::Listening | TurnState::ProcessingCapture) {
            effects.push(Effect::CloseCapture);
        }
        self.session.transcript.clear();

        if let Some(reply) = self.reply.take() {
            if !reply.stream_complete {
                effects.push(Effect::AbandonModel {
                    request_id: reply.request_id,
                });
                if let Err(e) = self.store.finish_turn(reply.request_id) {
                    warn!("Failed to close interrupted turn: {}", e);
                }
            }
        }

        let was_speaking = self.session.playback_queue.clear();
        if was_speaking || matches!(state, TurnState::WaitingOnModel | TurnState::Speaking) {
            effects.push(Effect::StopSynthesis);
        }
        self.segmenter.reset();

        self.set_state(TurnState::Idle);
    }

    fn on_capture(&mut self, signal: CaptureSignal, now: Instant, effects: &mut Vec<Effect>) {
        if signal.epoch != self.capture_epoch {
            debug!("Dropping event from stale capture {}", signal.epoch);
            return;
        }

        let capturing = matches!(
            self.session.state,
            TurnState::Listening | TurnState::ProcessingCapture
        );

        match signal.event {
            CaptureEvent::Level(level) => {
                self.session.audio_level = level.clamp(0.0, 1.0);
                self.emit(OrchestratorEvent::AudioLevel(self.session.audio_level));
            }
            CaptureEvent::Transcript { text, is_final } => {
                if !capturing {
                    debug!("Transcript ignored while {}", self.session.state.as_str());
                    return;
                }
                self.session.transcript.apply(&text, is_final);
                if self.session.state == TurnState::Listening {
                    self.arm_silence(now);
                }
                self.emit_transcript();
            }
            CaptureEvent::Error(message) => {
                if self.session.state == TurnState::Listening {
                    warn!("Capture error while listening: {}", message);
                    self.emit(OrchestratorEvent::Error(VoxError::CaptureError(message)));
                    self.stop_listening(now, effects);
                }
            }
            CaptureEvent::Ended => {
                if self.session.state == TurnState::Listening {
                    debug!("Capture ended by engine");
                    self.stop_listening(now, effects);
                }
            }
        }
    }

    fn on_capture_failed(
        &mut self,
        epoch: u64,
        error: VoxError,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) {
        if epoch != self.capture_epoch || self.session.state != TurnState::Listening {
            return;
        }

        warn!("Capture failed: {}", error);
        let unavailable = matches!(error, VoxError::CaptureUnavailable(_));
        self.emit(OrchestratorEvent::Error(error));

        if unavailable {
            // Degrade to text-only input for the rest of the session
            self.disable_capture();
            self.deadlines.silence = None;
            self.session.transcript.clear();
            self.set_state(TurnState::Idle);
        } else {
            self.stop_listening(now, effects);
        }
    }

    fn on_fragment(&mut self, request_id: Uuid, text: &str, now: Instant, effects: &mut Vec<Effect>) {
        let Some(reply) = self.reply.as_mut() else {
            debug!("Dropping fragment for abandoned request {}", request_id);
            return;
        };
        if reply.request_id != request_id || reply.stream_complete {
            debug!("Dropping fragment for abandoned request {}", request_id);
            return;
        }

        reply.content.push_str(text);
        reply.timer.mark_fragment(now);
        let content = reply.content.clone();

        if let Err(e) = self.store.update_turn(request_id, &content) {
            warn!("Failed to update assistant turn: {}", e);
        }
        self.emit(OrchestratorEvent::AssistantUpdated {
            turn_id: request_id,
            content,
        });

        if self.session.state == TurnState::WaitingOnModel {
            self.set_state(TurnState::Speaking);
        }

        for sentence in self.segmenter.feed(text) {
            self.enqueue_sentence(sentence);
        }
        self.pump(now, effects);
    }

    fn on_model_complete(&mut self, request_id: Uuid, now: Instant, effects: &mut Vec<Effect>) {
        let Some(reply) = self.reply.as_mut() else {
            return;
        };
        if reply.request_id != request_id || reply.stream_complete {
            return;
        }

        reply.stream_complete = true;
        if reply.content.is_empty() {
            warn!("Model finished without any output");
        }
        debug!("Model stream complete ({} chars)", reply.content.len());

        if let Err(e) = self.store.finish_turn(request_id) {
            warn!("Failed to finalize assistant turn: {}", e);
        }

        if let Some(sentence) = self.segmenter.flush() {
            self.enqueue_sentence(sentence);
        }
        self.pump(now, effects);
        self.maybe_finish_turn(now);
    }

    fn on_model_failed(&mut self, request_id: Uuid, error: VoxError, effects: &mut Vec<Effect>) {
        match &self.reply {
            Some(reply) if reply.request_id == request_id && !reply.stream_complete => {}
            _ => {
                debug!("Dropping failure for abandoned request {}", request_id);
                return;
            }
        }

        warn!("Model stream failed: {}", error);
        if let Err(e) = self.store.mark_error(request_id, &error.to_string()) {
            warn!("Failed to flag assistant turn: {}", e);
        }
        self.emit(OrchestratorEvent::Error(error));

        self.reply = None;
        if self.session.playback_queue.clear() {
            effects.push(Effect::StopSynthesis);
        }
        self.segmenter.reset();
        self.set_state(TurnState::Idle);
    }

    fn on_utterance_end(
        &mut self,
        request_id: Uuid,
        index: usize,
        error: Option<VoxError>,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) {
        if self.session.playback_queue.request_id() != Some(request_id) {
            debug!("Dropping synthesis callback for request {}", request_id);
            return;
        }
        if self.session.playback_queue.finish_current(index).is_none() {
            debug!("Dropping synthesis callback for sentence {}", index);
            return;
        }

        if let Some(reply) = self.reply.as_mut() {
            match &error {
                Some(_) => reply.timer.record_failed(),
                None => reply.timer.record_spoken(),
            }
        }
        if let Some(error) = error {
            // Skip the sentence and keep draining
            warn!("Sentence {} could not be spoken: {}", index, error);
            self.emit(OrchestratorEvent::Error(error));
        }

        self.pump(now, effects);
        self.maybe_finish_turn(now);
    }

    fn on_tick(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        if is_due(self.deadlines.silence, now) {
            self.deadlines.silence = None;
            info!("Silence timeout, stopping capture");
            self.stop_listening(now, effects);
        }

        if is_due(self.deadlines.settle, now) {
            self.deadlines.settle = None;
            if self.session.state == TurnState::ProcessingCapture {
                self.commit_capture(now, effects);
            }
        }

        if is_due(self.deadlines.resume, now) {
            self.deadlines.resume = None;
            if self.session.state == TurnState::Idle {
                debug!("Resuming listening");
                self.start_listening(now, effects);
            }
        }
    }

    fn enqueue_sentence(&mut self, sentence: Sentence) {
        if sentence.is_blank() || !self.session.settings.auto_play_response {
            return;
        }
        debug!("Queueing sentence {}: {}", sentence.index, sentence.text);
        self.emit(OrchestratorEvent::SentenceQueued(sentence.clone()));
        self.session.playback_queue.enqueue(sentence);
    }

    /// Hand the next sentence to synthesis if nothing is being spoken
    fn pump(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        if self.session.state != TurnState::Speaking {
            return;
        }
        let Some(reply) = self.reply.as_mut() else {
            return;
        };
        let Some(sentence) = self.session.playback_queue.next_utterance() else {
            return;
        };
        reply.timer.mark_speech(now);
        let request_id = reply.request_id;

        self.emit(OrchestratorEvent::SpeakingSentence(sentence.clone()));
        effects.push(Effect::Speak {
            request_id,
            sentence,
        });
    }

    /// End the assistant turn once the stream is done and the queue has drained
    fn maybe_finish_turn(&mut self, now: Instant) {
        let done = matches!(
            self.session.state,
            TurnState::WaitingOnModel | TurnState::Speaking
        ) && self.reply.as_ref().is_some_and(|r| r.stream_complete)
            && self.session.playback_queue.is_drained();
        if !done {
            return;
        }
        let Some(reply) = self.reply.take() else {
            return;
        };

        if let Some(latency) = reply.timer.first_fragment_latency() {
            self.first_fragment_latency.record(latency);
        }
        let metrics = reply.timer.finish(now);
        info!(
            "Assistant turn finished in {}ms ({} spoken, {} failed, avg first fragment {:?})",
            metrics.total_ms,
            metrics.sentences_spoken,
            metrics.sentences_failed,
            self.first_fragment_latency.average()
        );
        self.emit(OrchestratorEvent::TurnFinished {
            turn_id: reply.request_id,
            metrics,
        });

        self.set_state(TurnState::Idle);
        if !self.session.settings.push_to_talk && self.capture_available {
            self.deadlines.resume = Some(now + self.timing.resume_delay);
        }
    }
}
