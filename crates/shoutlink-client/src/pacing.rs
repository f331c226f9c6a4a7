//! Send pacing from the announced bitrate.
//!
//! The payload is opaque, so the only clock available is the nominal bitrate
//! from the configuration: after `n` bytes the stream should be
//! `n * 8 / bitrate` seconds old. Without a bitrate no pacing happens.

use std::time::{Duration, Instant};

/// Tracks how far the sent payload runs ahead of real time.
#[derive(Debug, Clone)]
pub struct Pacer {
    bits_per_second: Option<u64>,
    started: Option<Instant>,
    sent: u64,
}

impl Pacer {
    /// Creates a pacer for a bitrate in kbit/s.
    pub fn new(bitrate_kbps: Option<u32>) -> Self {
        Self {
            bits_per_second: bitrate_kbps
                .filter(|b| *b > 0)
                .map(|b| u64::from(b) * 1000),
            started: None,
            sent: 0,
        }
    }

    /// Records `len` payload bytes sent at `now`.
    pub fn record(&mut self, len: usize, now: Instant) {
        self.started.get_or_insert(now);
        self.sent = self.sent.saturating_add(len as u64);
    }

    /// Time to wait at `now` before sending more.
    pub fn delay_at(&self, now: Instant) -> Duration {
        let (Some(bps), Some(started)) = (self.bits_per_second, self.started) else {
            return Duration::ZERO;
        };
        let media_time = Duration::from_secs_f64(self.sent as f64 * 8.0 / bps as f64);
        let elapsed = now.saturating_duration_since(started);
        media_time.saturating_sub(elapsed)
    }

    /// Time to wait now before sending more.
    pub fn delay(&self) -> Duration {
        self.delay_at(Instant::now())
    }

    /// Forgets everything sent so far.
    pub fn reset(&mut self) {
        self.started = None;
        self.sent = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_bitrate_no_delay() {
        let mut pacer = Pacer::new(None);
        let now = Instant::now();
        pacer.record(1_000_000, now);
        assert_eq!(pacer.delay_at(now), Duration::ZERO);
        assert_eq!(Pacer::new(Some(0)).delay(), Duration::ZERO);
    }

    #[test]
    fn delay_tracks_media_time() {
        // 128 kbit/s is 16000 bytes per second.
        let mut pacer = Pacer::new(Some(128));
        let start = Instant::now();
        pacer.record(16_000, start);
        assert_eq!(pacer.delay_at(start), Duration::from_secs(1));
        assert_eq!(
            pacer.delay_at(start + Duration::from_millis(250)),
            Duration::from_millis(750)
        );
        assert_eq!(pacer.delay_at(start + Duration::from_secs(2)), Duration::ZERO);
    }

    #[test]
    fn reset_clears_history() {
        let mut pacer = Pacer::new(Some(64));
        let now = Instant::now();
        pacer.record(8_000, now);
        pacer.reset();
        assert_eq!(pacer.delay_at(now), Duration::ZERO);
    }
}
