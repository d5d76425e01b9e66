//! Language-model stream interface
//!
//! The orchestrator only sees the model as an async sequence of text
//! fragments. How the prompt is built and where the tokens come from is up to
//! the implementor.

use crate::messages::ConversationTurn;
use crate::{Result, VoxError};
use async_stream::stream;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Stream of reply fragments; ends on completion, yields `Err` on failure
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Everything the model needs to produce the next assistant reply
#[derive(Clone, Debug)]
pub struct ModelRequest {
    /// Id of the assistant turn this request feeds
    pub request_id: Uuid,

    /// Committed turns before the new user turn
    pub history: Vec<ConversationTurn>,

    /// The user's new message
    pub user_text: String,

    /// Optional side context (current code, image description, ...)
    pub side_context: Option<String>,
}

/// A source of streamed replies
pub trait ModelStream: Send + Sync {
    /// Start a reply for `request`
    fn stream(&self, request: ModelRequest) -> FragmentStream;
}

/// One step of a scripted reply
#[derive(Clone, Debug)]
pub enum ScriptStep {
    /// Yield a text fragment
    Fragment(String),

    /// Wait before the next step
    Pause(Duration),

    /// Fail the stream with this message
    Fail(String),
}

/// Model that plays back prepared replies, one script per request
#[derive(Clone, Default)]
pub struct ScriptedModel {
    scripts: Arc<Mutex<VecDeque<Vec<ScriptStep>>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
    fragment_delay: Duration,
}

impl ScriptedModel {
    /// Create a model with no scripts; every request completes immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a model that answers the first request with `fragments`
    pub fn reply(fragments: &[&str]) -> Self {
        Self::new().then_reply(fragments)
    }

    /// Queue a reply made of plain fragments
    pub fn then_reply(self, fragments: &[&str]) -> Self {
        let steps = fragments
            .iter()
            .map(|f| ScriptStep::Fragment(f.to_string()))
            .collect();
        self.then_script(steps)
    }

    /// Queue an arbitrary script
    pub fn then_script(self, steps: Vec<ScriptStep>) -> Self {
        self.scripts.lock().push_back(steps);
        self
    }

    /// Wait this long before every fragment
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = delay;
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().clone()
    }
}

impl ModelStream for ScriptedModel {
    fn stream(&self, request: ModelRequest) -> FragmentStream {
        debug!(
            "Scripted model request {}: {:?}",
            request.request_id, request.user_text
        );
        self.requests.lock().push(request);

        let steps = self.scripts.lock().pop_front().unwrap_or_default();
        let delay = self.fragment_delay;

        Box::pin(stream! {
            for step in steps {
                match step {
                    ScriptStep::Fragment(text) => {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        yield Ok(text);
                    }
                    ScriptStep::Pause(pause) => tokio::time::sleep(pause).await,
                    ScriptStep::Fail(message) => {
                        yield Err(VoxError::ModelStreamError(message));
                        break;
                    }
                }
            }
        })
    }
}
