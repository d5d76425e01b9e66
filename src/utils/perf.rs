//! Turn latency measurement
//!
//! Timestamps are supplied by the caller so the controller stays
//! deterministic under a paused clock.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Tracks timing metrics over a sliding window
#[derive(Debug)]
pub struct TimingTracker {
    samples: VecDeque<Duration>,
    max_samples: usize,
}

impl TimingTracker {
    /// Create a new timing tracker with the specified window size
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    /// Record a new timing sample
    pub fn record(&mut self, duration: Duration) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(duration);
    }

    /// Get the average duration
    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.samples.iter().max().copied().unwrap_or(Duration::ZERO)
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

/// Latency summary for one assistant turn
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TurnMetrics {
    /// Time from request to first model fragment (ms)
    pub first_fragment_ms: Option<u64>,

    /// Time from request to first sentence handed to synthesis (ms)
    pub first_speech_ms: Option<u64>,

    /// Time from request to end of turn (ms)
    pub total_ms: u64,

    pub sentences_spoken: usize,
    pub sentences_failed: usize,
}

/// Collects [`TurnMetrics`] while an assistant turn runs
#[derive(Debug, Clone)]
pub struct TurnTimer {
    started: Instant,
    first_fragment: Option<Instant>,
    first_speech: Option<Instant>,
    sentences_spoken: usize,
    sentences_failed: usize,
}

impl TurnTimer {
    pub fn start(now: Instant) -> Self {
        Self {
            started: now,
            first_fragment: None,
            first_speech: None,
            sentences_spoken: 0,
            sentences_failed: 0,
        }
    }

    pub fn mark_fragment(&mut self, now: Instant) {
        self.first_fragment.get_or_insert(now);
    }

    pub fn mark_speech(&mut self, now: Instant) {
        self.first_speech.get_or_insert(now);
    }

    pub fn record_spoken(&mut self) {
        self.sentences_spoken += 1;
    }

    pub fn record_failed(&mut self) {
        self.sentences_failed += 1;
    }

    /// Time to first fragment, if one arrived
    pub fn first_fragment_latency(&self) -> Option<Duration> {
        self.first_fragment.map(|at| at - self.started)
    }

    pub fn finish(&self, now: Instant) -> TurnMetrics {
        TurnMetrics {
            first_fragment_ms: self.first_fragment.map(|at| millis(at - self.started)),
            first_speech_ms: self.first_speech.map(|at| millis(at - self.started)),
            total_ms: millis(now.saturating_duration_since(self.started)),
            sentences_spoken: self.sentences_spoken,
            sentences_failed: self.sentences_failed,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_tracker_window() {
        let mut tracker = TimingTracker::new(2);
        tracker.record(Duration::from_millis(100));
        tracker.record(Duration::from_millis(200));
        tracker.record(Duration::from_millis(400));

        assert_eq!(tracker.count(), 2);
        assert_eq!(tracker.average(), Duration::from_millis(300));
        assert_eq!(tracker.max(), Duration::from_millis(400));
    }

    #[test]
    fn test_empty_tracker() {
        let tracker = TimingTracker::new(10);
        assert_eq!(tracker.average(), Duration::ZERO);
    }

    #[test]
    fn test_turn_timer() {
        let start = Instant::now();
        let mut timer = TurnTimer::start(start);

        timer.mark_fragment(start + Duration::from_millis(120));
        timer.mark_fragment(start + Duration::from_millis(500));
        timer.mark_speech(start + Duration::from_millis(130));
        timer.record_spoken();
        timer.record_spoken();
        timer.record_failed();

        let metrics = timer.finish(start + Duration::from_millis(2000));
        assert_eq!(metrics.first_fragment_ms, Some(120));
        assert_eq!(metrics.first_speech_ms, Some(130));
        assert_eq!(metrics.total_ms, 2000);
        assert_eq!(metrics.sentences_spoken, 2);
        assert_eq!(metrics.sentences_failed, 1);
    }
}
