/// Estimate a tempo from button taps.
use heapless::HistoryBuffer;
use std::time::{Duration, Instant};

const TAP_HISTORY_LEN: usize = 4;

/// Taps further apart than this start a new estimate.
pub const TAP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct TapTempo {
    last_tap: Option<Instant>,
    intervals_us: HistoryBuffer<u64, TAP_HISTORY_LEN>,
}

impl Default for TapTempo {
    fn default() -> TapTempo {
        TapTempo {
            last_tap: None,
            intervals_us: HistoryBuffer::new(),
        }
    }
}

impl TapTempo {
    pub fn new() -> TapTempo {
        TapTempo::default()
    }

    /// Register a tap. From the second tap in a run, returns the average tempo of the most
    /// recent intervals in BPM.
    pub fn tap(&mut self, now: Instant) -> Option<f64> {
        let last = self.last_tap.replace(now)?;
        let interval = now.saturating_duration_since(last);
        if interval > TAP_TIMEOUT {
            self.intervals_us = HistoryBuffer::new();
            return None;
        }
        if interval.is_zero() {
            return None;
        }
        self.intervals_us.write(interval.as_micros() as u64);
        let intervals = self.intervals_us.as_slice();
        let average_us = intervals.iter().sum::<u64>() / intervals.len() as u64;
        Some(60_000_000.0 / average_us as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tap_tempo_should_need_two_taps() {
        let start = Instant::now();
        let mut tap_tempo = TapTempo::new();
        assert_eq!(None, tap_tempo.tap(start));
        assert_eq!(Some(120.0), tap_tempo.tap(start + Duration::from_millis(500)));
    }

    #[test]
    fn tap_tempo_should_average_recent_intervals() {
        let start = Instant::now();
        let mut tap_tempo = TapTempo::new();
        tap_tempo.tap(start);
        tap_tempo.tap(start + Duration::from_millis(400));
        // intervals 400ms and 600ms average to 500ms
        assert_eq!(Some(120.0), tap_tempo.tap(start + Duration::from_millis(1000)));
    }

    #[test]
    fn tap_tempo_should_forget_old_intervals() {
        let start = Instant::now();
        let mut tap_tempo = TapTempo::new();
        let mut now = start;
        tap_tempo.tap(now);
        for _ in 0..TAP_HISTORY_LEN {
            now += Duration::from_millis(250);
            tap_tempo.tap(now);
        }
        for _ in 0..TAP_HISTORY_LEN - 1 {
            now += Duration::from_millis(1000);
            tap_tempo.tap(now);
        }
        now += Duration::from_millis(1000);
        assert_eq!(Some(60.0), tap_tempo.tap(now));
    }

    #[test]
    fn tap_tempo_should_restart_after_timeout() {
        let start = Instant::now();
        let mut tap_tempo = TapTempo::new();
        tap_tempo.tap(start);
        tap_tempo.tap(start + Duration::from_millis(300));
        let later = start + Duration::from_secs(5);
        assert_eq!(None, tap_tempo.tap(later));
        assert_eq!(Some(60.0), tap_tempo.tap(later + Duration::from_secs(1)));
    }
}
