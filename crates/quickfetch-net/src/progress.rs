// crates/quickfetch-net/src/progress.rs
//! Throttled transfer progress accounting

use std::time::{Duration, Instant};

/// Minimum gap between two progress notifications for one transfer
pub(crate) const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// One progress notification for an upload or download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    /// File name for downloads, form key for uploads
    pub key: String,
    /// Bytes transferred so far, including any resume offset
    pub bytes: u64,
    /// Expected total bytes, when the remote (or local file size) says
    pub total: Option<u64>,
    /// Set on the final notification of a transfer, exactly once
    pub done: bool,
}

/// Accumulates bytes over a chunk stream and decides when a notification
/// is due.
///
/// The first update always emits; later updates emit only when
/// [`PROGRESS_INTERVAL`] has elapsed since the previous emission. Reaching
/// a known total emits the `done` notification immediately, bypassing the
/// throttle; otherwise [`finish`](Self::finish) produces the guaranteed
/// final notification when the stream ends.
pub struct ProgressMeter {
    key: String,
    bytes: u64,
    total: Option<u64>,
    last_emit: Option<Instant>,
    finished: bool,
}

impl ProgressMeter {
    /// Creates a meter seeded with the resume offset
    pub fn new(key: impl Into<String>, start_offset: u64, total: Option<u64>) -> Self {
        Self {
            key: key.into(),
            bytes: start_offset,
            total,
            last_emit: None,
            finished: false,
        }
    }

    fn snapshot(&self, done: bool) -> TransferProgress {
        TransferProgress {
            key: self.key.clone(),
            bytes: self.bytes,
            total: self.total,
            done,
        }
    }

    /// Records a chunk of the transfer; returns a notification if one is due
    pub fn update(&mut self, chunk_len: u64) -> Option<TransferProgress> {
        if self.finished {
            return None;
        }
        self.bytes += chunk_len;

        if self.total.is_some_and(|t| self.bytes >= t) {
            self.finished = true;
            return Some(self.snapshot(true));
        }

        let due = match self.last_emit {
            None => true,
            Some(at) => at.elapsed() >= PROGRESS_INTERVAL,
        };
        if due {
            self.last_emit = Some(Instant::now());
            Some(self.snapshot(false))
        } else {
            None
        }
    }

    /// Emits the final notification if the throttle suppressed it
    pub fn finish(&mut self) -> Option<TransferProgress> {
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(self.snapshot(true))
    }

    /// Bytes transferred so far, including the resume offset
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_update_emits_immediately() {
        let mut meter = ProgressMeter::new("book.mp3", 0, Some(1000));
        let ev = meter.update(10).expect("first update should emit");
        assert_eq!(ev.bytes, 10);
        assert_eq!(ev.total, Some(1000));
        assert!(!ev.done);
    }

    #[test]
    fn test_fast_updates_are_throttled() {
        let mut meter = ProgressMeter::new("book.mp3", 0, Some(1_000_000));
        let mut emitted = 0;
        let reads = 100;
        for _ in 0..reads {
            if meter.update(10).is_some() {
                emitted += 1;
            }
        }
        if let Some(ev) = meter.finish() {
            assert!(ev.done);
            emitted += 1;
        }
        assert!(emitted < reads);
        assert_eq!(meter.bytes(), 1000);
    }

    #[test]
    fn test_reaching_known_total_emits_done_unthrottled() {
        let mut meter = ProgressMeter::new("book.mp3", 0, Some(30));
        meter.update(10);
        meter.update(10);
        let last = meter.update(10).expect("completion must emit");
        assert!(last.done);
        assert_eq!(last.bytes, 30);
        assert!(meter.finish().is_none());
    }

    #[test]
    fn test_finish_guarantees_exactly_one_final_event() {
        let mut meter = ProgressMeter::new("book.mp3", 0, None);
        meter.update(5);
        meter.update(5);
        let last = meter.finish().expect("finish must emit when not done");
        assert!(last.done);
        assert_eq!(last.bytes, 10);
        assert!(meter.finish().is_none());
        assert!(meter.update(5).is_none());
    }

    #[test]
    fn test_resume_offset_seeds_byte_count() {
        let mut meter = ProgressMeter::new("book.mp3", 500, Some(1000));
        let ev = meter.update(100).expect("first update should emit");
        assert_eq!(ev.bytes, 600);
    }
}
