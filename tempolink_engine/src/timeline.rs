/// The shared musical timeline: a monotonic clock plus a versioned mapping between time and
/// beats. A peer session supplies this in production; `LocalTimeline` is the peerless version.
use core::fmt::Debug;
use crossbeam_utils::atomic::AtomicCell;
use fugit::MicrosDurationU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Timestamps on the timeline clock, in microseconds since an arbitrary epoch.
pub type Micros = MicrosDurationU64;

pub const MIN_TEMPO: f64 = 20.0;
pub const MAX_TEMPO: f64 = 999.0;

const MICROS_PER_MINUTE: f64 = 60_000_000.0;

pub fn clamp_tempo(bpm: f64) -> f64 {
    bpm.clamp(MIN_TEMPO, MAX_TEMPO)
}

pub trait Clock: Send + Sync {
    fn micros(&self) -> Micros;
}

/// Wall clock for the device, counting from process start.
#[derive(Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> MonotonicClock {
        MonotonicClock {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn micros(&self) -> Micros {
        Micros::micros(self.start.elapsed().as_micros() as u64)
    }
}

/// Clock which only moves when told to. Lets tests place ticks at exact beat positions.
#[cfg(any(test, feature = "host_testing"))]
#[derive(Debug, Default)]
pub struct ManualClock {
    now_us: AtomicU64,
}

#[cfg(any(test, feature = "host_testing"))]
impl ManualClock {
    pub fn new(start_us: u64) -> ManualClock {
        ManualClock {
            now_us: AtomicU64::new(start_us),
        }
    }

    pub fn set(&self, now_us: u64) {
        self.now_us.store(now_us, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_us: u64) {
        self.now_us.fetch_add(delta_us, Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "host_testing"))]
impl Clock for ManualClock {
    fn micros(&self) -> Micros {
        Micros::micros(self.now_us.load(Ordering::SeqCst))
    }
}

/// Immutable value copy of a timeline, captured at some instant. Mutating a snapshot has no
/// effect until it is committed back to the `SharedTimeline` it came from.
pub trait TimelineSnapshot: Clone + Debug + Send {
    fn tempo(&self) -> f64;
    fn beat_at_time(&self, time: Micros, quantum: f64) -> f64;
    fn phase_at_time(&self, time: Micros, quantum: f64) -> f64;
    fn set_tempo(&mut self, bpm: f64, time: Micros);
    fn force_beat_at_time(&mut self, beat: f64, time: Micros, quantum: f64);
}

/// Contract of the peer synchronization collaborator. Capture/commit is the only mutation path;
/// the last committer wins.
pub trait SharedTimeline: Send + Sync {
    type Snapshot: TimelineSnapshot;

    fn now(&self) -> Micros;
    fn capture_app_timeline(&self) -> Self::Snapshot;
    fn commit_app_timeline(&self, timeline: Self::Snapshot);
    fn num_peers(&self) -> usize;
}

/// Linear tempo map anchored at a single (time, beat) origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timeline {
    tempo: f64,
    beat_origin: f64,
    time_origin_us: u64,
}

impl Timeline {
    pub fn new(tempo: f64, time: Micros) -> Timeline {
        Timeline {
            tempo: clamp_tempo(tempo),
            beat_origin: 0.0,
            time_origin_us: time.to_micros(),
        }
    }

    fn beats_since_origin(&self, time: Micros) -> f64 {
        let elapsed_us = time.to_micros() as f64 - self.time_origin_us as f64;
        elapsed_us * self.tempo / MICROS_PER_MINUTE
    }
}

impl TimelineSnapshot for Timeline {
    fn tempo(&self) -> f64 {
        self.tempo
    }

    // A session without peers never has to shift its beat grid to meet another quantum, so the
    // quantum only matters for phase.
    fn beat_at_time(&self, time: Micros, _quantum: f64) -> f64 {
        self.beat_origin + self.beats_since_origin(time)
    }

    fn phase_at_time(&self, time: Micros, quantum: f64) -> f64 {
        if quantum <= 0.0 {
            return 0.0;
        }
        self.beat_at_time(time, quantum).rem_euclid(quantum)
    }

    fn set_tempo(&mut self, bpm: f64, time: Micros) {
        self.beat_origin = self.beat_at_time(time, 1.0);
        self.time_origin_us = time.to_micros();
        self.tempo = clamp_tempo(bpm);
    }

    fn force_beat_at_time(&mut self, beat: f64, time: Micros, _quantum: f64) {
        self.beat_origin = beat;
        self.time_origin_us = time.to_micros();
    }
}

/// A session of one: owns its phase, never sees peers.
pub struct LocalTimeline<C: Clock = MonotonicClock> {
    clock: C,
    timeline: AtomicCell<Timeline>,
    version: AtomicU64,
}

impl<C: Clock> LocalTimeline<C> {
    pub fn new(clock: C, tempo: f64) -> LocalTimeline<C> {
        let timeline = Timeline::new(tempo, clock.micros());
        LocalTimeline {
            clock,
            timeline: AtomicCell::new(timeline),
            version: AtomicU64::new(0),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Number of commits since creation.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

impl<C: Clock> SharedTimeline for LocalTimeline<C> {
    type Snapshot = Timeline;

    fn now(&self) -> Micros {
        self.clock.micros()
    }

    fn capture_app_timeline(&self) -> Timeline {
        self.timeline.load()
    }

    fn commit_app_timeline(&self, timeline: Timeline) {
        self.timeline.store(timeline);
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    fn num_peers(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(expected: f64, actual: f64) {
        assert!(
            (expected - actual).abs() < 1e-9,
            "expected {} got {}",
            expected,
            actual
        );
    }

    #[test]
    fn timeline_should_advance_one_beat_per_second_at_60_bpm() {
        let timeline = Timeline::new(60.0, Micros::micros(0));
        assert_close(0.0, timeline.beat_at_time(Micros::micros(0), 4.0));
        assert_close(1.0, timeline.beat_at_time(Micros::micros(1_000_000), 4.0));
        assert_close(2.5, timeline.beat_at_time(Micros::micros(2_500_000), 4.0));
    }

    #[test]
    fn timeline_phase_should_wrap_within_quantum() {
        let timeline = Timeline::new(120.0, Micros::micros(0));
        // 5 seconds at 120bpm is 10 beats
        assert_close(2.0, timeline.phase_at_time(Micros::micros(5_000_000), 4.0));
        assert_close(0.0, timeline.phase_at_time(Micros::micros(5_000_000), 1.0));
    }

    #[test]
    fn timeline_phase_should_be_positive_before_beat_zero() {
        let mut timeline = Timeline::new(60.0, Micros::micros(0));
        timeline.force_beat_at_time(0.0, Micros::micros(1_000_000), 4.0);
        assert_close(-0.5, timeline.beat_at_time(Micros::micros(500_000), 4.0));
        assert_close(3.5, timeline.phase_at_time(Micros::micros(500_000), 4.0));
    }

    #[test]
    fn timeline_set_tempo_should_keep_beat_continuous() {
        let mut timeline = Timeline::new(60.0, Micros::micros(0));
        let switch_time = Micros::micros(2_000_000);
        timeline.set_tempo(120.0, switch_time);
        assert_close(2.0, timeline.beat_at_time(switch_time, 4.0));
        assert_close(4.0, timeline.beat_at_time(Micros::micros(3_000_000), 4.0));
    }

    #[test]
    fn timeline_tempo_should_be_clamped() {
        let mut timeline = Timeline::new(5.0, Micros::micros(0));
        assert_close(MIN_TEMPO, timeline.tempo());
        timeline.set_tempo(5_000.0, Micros::micros(0));
        assert_close(MAX_TEMPO, timeline.tempo());
    }

    #[test]
    fn local_timeline_commit_should_replace_snapshot_and_bump_version() {
        let shared = LocalTimeline::new(ManualClock::new(0), 120.0);
        assert_eq!(0, shared.version());
        let mut timeline = shared.capture_app_timeline();
        timeline.set_tempo(90.0, shared.now());
        assert_close(120.0, shared.capture_app_timeline().tempo());
        shared.commit_app_timeline(timeline);
        assert_close(90.0, shared.capture_app_timeline().tempo());
        assert_eq!(1, shared.version());
        assert_eq!(0, shared.num_peers());
    }

    #[test]
    fn local_timeline_should_read_time_from_its_clock() {
        let shared = LocalTimeline::new(ManualClock::new(10), 120.0);
        shared.clock().advance(990);
        assert_eq!(1_000, shared.now().to_micros());
    }
}
