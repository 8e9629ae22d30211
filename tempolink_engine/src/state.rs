/// The single state record shared by the engine, the controller and every periodic process.
use crate::quantizer::{self, OutputModel};
use crate::settings::Settings;
use crate::timeline::{Micros, SharedTimeline, TimelineSnapshot};

use crossbeam_utils::atomic::AtomicCell;
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayState {
    #[default]
    Stopped,
    Cued,
    Playing,
    CuedStop,
}

impl PlayState {
    /// State the play/stop button moves to. `None` while a stop is already pending.
    pub fn toggled(self) -> Option<PlayState> {
        match self {
            PlayState::Stopped => Some(PlayState::Cued),
            PlayState::Cued => Some(PlayState::Stopped),
            PlayState::Playing => Some(PlayState::CuedStop),
            PlayState::CuedStop => None,
        }
    }

    /// State reached when a loop boundary passes.
    pub fn at_loop_boundary(self) -> PlayState {
        match self {
            PlayState::Cued => PlayState::Playing,
            PlayState::CuedStop => PlayState::Stopped,
            other => other,
        }
    }
}

/// Which setting the encoder adjusts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputMode {
    #[default]
    Bpm,
    Loop,
    Clock,
}

impl InputMode {
    pub fn next(self) -> InputMode {
        match self {
            InputMode::Bpm => InputMode::Loop,
            InputMode::Loop => InputMode::Clock,
            InputMode::Clock => InputMode::Bpm,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InputMode::Bpm => "BPM",
            InputMode::Loop => "LOOP",
            InputMode::Clock => "CLK",
        }
    }
}

pub struct EngineState<T: SharedTimeline> {
    running: AtomicBool,
    play_state: AtomicCell<PlayState>,
    input_mode: AtomicCell<InputMode>,
    settings: AtomicCell<Settings>,
    queued_start_transport: AtomicBool,
    timeline: T,
}

impl<T: SharedTimeline> EngineState<T> {
    pub fn new(timeline: T, settings: Settings) -> EngineState<T> {
        EngineState {
            running: AtomicBool::new(true),
            play_state: AtomicCell::new(PlayState::Stopped),
            input_mode: AtomicCell::new(InputMode::Bpm),
            settings: AtomicCell::new(settings),
            queued_start_transport: AtomicBool::new(false),
            timeline,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask every loop to wind down. Never undone.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            debug!("[state] shutdown requested");
        }
    }

    pub fn play_state(&self) -> PlayState {
        self.play_state.load()
    }

    /// Move from `from` to `to` only if nobody changed the state in between.
    pub fn transition(&self, from: PlayState, to: PlayState) -> bool {
        let moved = self.play_state.compare_exchange(from, to).is_ok();
        if moved {
            debug!("[state] {:?} -> {:?}", from, to);
        }
        moved
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode.load()
    }

    pub fn set_input_mode(&self, input_mode: InputMode) {
        self.input_mode.store(input_mode);
    }

    pub fn settings(&self) -> Settings {
        self.settings.load()
    }

    /// Read-modify-write of the settings. Only the controller writes settings, so plain
    /// load and store is enough.
    pub fn update_settings<F>(&self, update: F) -> Settings
    where
        F: FnOnce(Settings) -> Settings,
    {
        let settings = update(self.settings.load());
        self.settings.store(settings);
        settings
    }

    pub fn timeline(&self) -> &T {
        &self.timeline
    }

    pub fn num_peers(&self) -> usize {
        self.timeline.num_peers()
    }

    pub fn tempo(&self) -> f64 {
        self.timeline.capture_app_timeline().tempo()
    }

    /// Have the next loop boundary send a MIDI start even though transport never stopped.
    pub fn queue_start_transport(&self) {
        self.queued_start_transport.store(true, Ordering::Release);
    }

    pub fn take_queued_start_transport(&self) -> bool {
        self.queued_start_transport.swap(false, Ordering::AcqRel)
    }

    /// Evaluate the outputs at the timeline's current time against the previous evaluation.
    pub fn output_model(&self, last: Option<Micros>) -> OutputModel {
        let now = self.timeline.now();
        let timeline = self.timeline.capture_app_timeline();
        quantizer::quantize(&timeline, now, last, &self.settings())
    }

    /// Position in the loop, 0.0 at the boundary and approaching 1.0 just before the next one.
    pub fn normalized_phase(&self) -> f64 {
        let quantum = self.settings().quantum();
        let timeline = self.timeline.capture_app_timeline();
        (timeline.phase_at_time(self.timeline.now(), quantum) / quantum).clamp(0.0, 1.0)
    }

    /// Position within the current beat.
    pub fn beat_phase(&self) -> f64 {
        let timeline = self.timeline.capture_app_timeline();
        timeline.phase_at_time(self.timeline.now(), 1.0).clamp(0.0, 1.0)
    }
}
