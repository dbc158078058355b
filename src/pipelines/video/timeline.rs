// SPDX-License-Identifier: GPL-3.0-only

//! Pausable recording timeline
//!
//! Paused gaps accumulate into an offset that is subtracted from every raw
//! frame timestamp, so the output timeline has no holes. Raw and rebased
//! timestamps share the session clock.

use std::time::Duration;
use tracing::debug;

/// Recording state as seen by the rest of the app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
    Paused,
}

#[derive(Debug, Default)]
pub struct RecordingTimeline {
    state: RecordingState,
    offset: Duration,
    pause_time: Option<Duration>,
    last_written: Option<Duration>,
}

impl RecordingTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Sum of every paused gap so far
    pub fn offset(&self) -> Duration {
        self.offset
    }

    pub fn pause_time(&self) -> Option<Duration> {
        self.pause_time
    }

    /// Enter recording from idle
    pub fn begin(&mut self) {
        self.state = RecordingState::Recording;
    }

    /// Pause at `now`; a no-op unless recording
    pub fn pause(&mut self, now: Duration) -> bool {
        if self.state != RecordingState::Recording {
            return false;
        }
        self.state = RecordingState::Paused;
        self.pause_time = Some(now);
        true
    }

    /// Resume at `now`, adding the paused gap to the offset
    pub fn resume(&mut self, now: Duration) -> bool {
        if self.state != RecordingState::Paused {
            return false;
        }
        if let Some(paused_at) = self.pause_time {
            let gap = now.saturating_sub(paused_at);
            self.offset += gap;
            debug!(gap_ms = gap.as_millis(), offset_ms = self.offset.as_millis(), "Resumed recording");
        }
        self.state = RecordingState::Recording;
        true
    }

    /// Leave recording; offset and pause time stay until [`Self::reset`]
    pub fn stop(&mut self) {
        self.state = RecordingState::Idle;
    }

    /// Clear offset, pause time and monotonic tracking
    pub fn reset(&mut self) {
        self.offset = Duration::ZERO;
        self.pause_time = None;
        self.last_written = None;
    }

    /// Rebased timestamp for a raw frame timestamp
    pub fn adjust(&self, raw: Duration) -> Duration {
        raw.saturating_sub(self.offset)
    }

    /// Rebase `raw` and accept it if output stays monotonic
    pub fn accept(&mut self, raw: Duration) -> Option<Duration> {
        let adjusted = self.adjust(raw);
        if let Some(last) = self.last_written
            && adjusted < last
        {
            return None;
        }
        self.last_written = Some(adjusted);
        Some(adjusted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_offset_is_sum_of_gaps() {
        let mut t = RecordingTimeline::new();
        t.begin();
        assert_eq!(t.accept(ms(1000)), Some(ms(1000)));

        assert!(t.pause(ms(1100)));
        assert!(t.resume(ms(1600)));
        assert_eq!(t.offset(), ms(500));
        assert_eq!(t.accept(ms(1633)), Some(ms(1133)));

        assert!(t.pause(ms(2000)));
        assert!(t.resume(ms(2250)));
        assert_eq!(t.offset(), ms(750));
        assert_eq!(t.accept(ms(2300)), Some(ms(1550)));
    }

    #[test]
    fn test_pause_is_idempotent() {
        let mut t = RecordingTimeline::new();
        t.begin();
        assert!(t.pause(ms(100)));
        assert!(!t.pause(ms(900)));
        assert_eq!(t.pause_time(), Some(ms(100)));
        assert_eq!(t.offset(), Duration::ZERO);
        assert_eq!(t.state(), RecordingState::Paused);
    }

    #[test]
    fn test_resume_only_from_paused() {
        let mut t = RecordingTimeline::new();
        assert!(!t.resume(ms(10)));
        t.begin();
        assert!(!t.resume(ms(10)));
        assert_eq!(t.offset(), Duration::ZERO);
    }

    #[test]
    fn test_non_monotonic_frames_dropped() {
        let mut t = RecordingTimeline::new();
        t.begin();
        assert_eq!(t.accept(ms(500)), Some(ms(500)));
        assert_eq!(t.accept(ms(400)), None);
        assert_eq!(t.accept(ms(500)), Some(ms(500)));
    }

    #[test]
    fn test_reset_clears_offset() {
        let mut t = RecordingTimeline::new();
        t.begin();
        t.pause(ms(100));
        t.resume(ms(300));
        t.stop();
        assert_eq!(t.offset(), ms(200));
        t.reset();
        assert_eq!(t.offset(), Duration::ZERO);
        assert_eq!(t.pause_time(), None);
        assert_eq!(t.state(), RecordingState::Idle);
    }
}
