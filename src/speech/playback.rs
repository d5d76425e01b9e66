//! Playback queue for sentences waiting to be spoken
//!
//! Strict FIFO with a single in-flight slot: the head is only handed out once
//! the previous utterance has been reported finished.

use crate::llm::Sentence;
use std::collections::VecDeque;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct PlaybackQueue {
    /// Sentences not yet handed to synthesis
    pending: VecDeque<Sentence>,

    /// Sentence currently being spoken
    current: Option<Sentence>,

    /// Assistant turn the queued sentences belong to
    request_id: Option<Uuid>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh queue for a new assistant turn
    pub fn begin_request(&mut self, request_id: Uuid) {
        self.pending.clear();
        self.current = None;
        self.request_id = Some(request_id);
    }

    /// Assistant turn the queue is bound to
    pub fn request_id(&self) -> Option<Uuid> {
        self.request_id
    }

    /// Append a sentence at the tail
    pub fn enqueue(&mut self, sentence: Sentence) {
        self.pending.push_back(sentence);
    }

    /// Hand out the head if nothing is being spoken
    pub fn next_utterance(&mut self) -> Option<Sentence> {
        if self.current.is_some() {
            return None;
        }
        let next = self.pending.pop_front()?;
        self.current = Some(next.clone());
        Some(next)
    }

    /// Mark the in-flight sentence with `index` as finished
    ///
    /// Returns `None` if that sentence is not the one being spoken.
    pub fn finish_current(&mut self, index: usize) -> Option<Sentence> {
        match &self.current {
            Some(current) if current.index == index => self.current.take(),
            _ => None,
        }
    }

    /// Drop everything, including the sentence being spoken
    ///
    /// Returns true if an utterance was in flight.
    pub fn clear(&mut self) -> bool {
        self.pending.clear();
        self.request_id = None;
        self.current.take().is_some()
    }

    pub fn is_speaking(&self) -> bool {
        self.current.is_some()
    }

    /// Number of sentences waiting (not counting the one being spoken)
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Nothing waiting and nothing being spoken
    pub fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.current.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::segment_text;

    fn queue_with(text: &str) -> PlaybackQueue {
        let mut queue = PlaybackQueue::new();
        queue.begin_request(Uuid::new_v4());
        for sentence in segment_text(text) {
            queue.enqueue(sentence);
        }
        queue
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = queue_with("One. Two. Three.");
        let mut order = Vec::new();

        while let Some(sentence) = queue.next_utterance() {
            order.push(sentence.text.clone());
            assert!(queue.finish_current(sentence.index).is_some());
        }

        assert_eq!(order, vec!["One.", "Two.", "Three."]);
        assert!(queue.is_drained());
    }

    #[test]
    fn test_single_in_flight() {
        let mut queue = queue_with("One. Two.");

        let first = queue.next_utterance().unwrap();
        assert!(queue.next_utterance().is_none());
        assert!(queue.is_speaking());
        assert_eq!(queue.len(), 1);

        // Stale completion for a different sentence is ignored
        assert!(queue.finish_current(first.index + 1).is_none());
        assert!(queue.is_speaking());

        queue.finish_current(first.index);
        assert_eq!(queue.next_utterance().unwrap().text, "Two.");
    }

    #[test]
    fn test_clear_drops_everything() {
        for text in ["", "One.", "One. Two. Three. Four."] {
            let mut queue = queue_with(text);
            let was_speaking = queue.next_utterance().is_some();

            assert_eq!(queue.clear(), was_speaking);
            assert!(queue.is_drained());
            assert!(queue.request_id().is_none());
        }
    }

    #[test]
    fn test_begin_request_resets() {
        let mut queue = queue_with("One. Two.");
        queue.next_utterance();

        let request_id = Uuid::new_v4();
        queue.begin_request(request_id);

        assert!(queue.is_drained());
        assert_eq!(queue.request_id(), Some(request_id));
    }
}
