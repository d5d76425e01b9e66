//! Model-facing side of the conversation
//!
//! - **stream**: the [`ModelStream`] interface the orchestrator consumes, plus a
//!   scripted implementation for tests and demos
//! - **segmenter**: cuts streamed fragments into speakable sentences
//!
//! # Usage
//!
//! ```rust,ignore
//! use voxturn::llm::SentenceSegmenter;
//!
//! let mut segmenter = SentenceSegmenter::new();
//! for fragment in ["Hi! ", "Nice to meet you."] {
//!     for sentence in segmenter.feed(fragment) {
//!         println!("speak: {}", sentence.text);
//!     }
//! }
//! if let Some(last) = segmenter.flush() {
//!     println!("speak: {}", last.text);
//! }
//! ```

pub mod segmenter;
pub mod stream;

pub use segmenter::{segment_text, Sentence, SentenceSegmenter, DEFAULT_MAX_SENTENCE_CHARS};
pub use stream::{FragmentStream, ModelRequest, ModelStream, ScriptStep, ScriptedModel};
