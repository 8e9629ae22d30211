/// Engine lifecycle and the command handlers that mutate shared state.
use crate::hw::{InterruptLine, IoExpander, LedDriver, SegmentDisplay};
use crate::input::{InputDispatchLoop, InputDispatcher};
use crate::midi::MidiOut;
use crate::process::output_process::{OutputProcess, OUTPUT_PERIOD, OUTPUT_PRIORITY};
use crate::process::user_input_process::{UserInputProcess, USER_INPUT_PERIOD};
use crate::process::view_process::{ViewUpdateProcess, VIEW_PERIOD};
use crate::process::{PeriodicProcess, Runnable};
use crate::settings::{Settings, SettingsStore};
use crate::state::{EngineState, InputMode, PlayState};
use crate::tap_tempo::TapTempo;
use crate::timeline::{clamp_tempo, Micros, SharedTimeline, TimelineSnapshot};
use crate::view::MainView;

use core::fmt::Debug;
use embedded_hal::digital::v2::OutputPin;
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

pub const SETTINGS_SAVE_INTERVAL: Duration = Duration::from_secs(1);
pub const MODE_MESSAGE_DURATION: Duration = Duration::from_millis(500);

// how far ahead a rewound timeline puts beat zero
const TIMELINE_RESET_LEAD_US: u64 = 1_000;
const SUPERVISOR_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    PlayStop,
    TapTempo,
    EncoderRotate(f32),
    EncoderPress,
}

pub trait CommandHandler: Send + Sync {
    fn handle(&self, command: Command);
}

/// The only writer of play state toggles, input mode, settings and the app timeline.
pub struct Controller<T: SharedTimeline> {
    state: Arc<EngineState<T>>,
    view: Arc<MainView>,
    tap_tempo: Mutex<TapTempo>,
}

impl<T: SharedTimeline> Controller<T> {
    pub fn new(state: Arc<EngineState<T>>, view: Arc<MainView>) -> Controller<T> {
        Controller {
            state,
            view,
            tap_tempo: Mutex::new(TapTempo::new()),
        }
    }

    /// Cue playback when stopped, or cue a stop when playing. A device alone in its session
    /// rewinds to beat zero first; with peers it joins the shared phase as it is. If the output
    /// thread moves the state in the meantime the press applies to the new state.
    pub fn play_stop(&self) {
        for _ in 0..2 {
            let current = self.state.play_state();
            let Some(next) = current.toggled() else {
                debug!("[engine] stop already cued");
                return;
            };
            if current == PlayState::Stopped && self.state.num_peers() == 0 {
                self.reset_timeline();
            }
            if self.state.transition(current, next) {
                info!("[engine] {:?} -> {:?}", current, next);
                return;
            }
            debug!("[engine] play state left {:?} during toggle", current);
        }
        warn!("[engine] play/stop dropped, play state kept changing");
    }

    pub fn reset_timeline(&self) {
        let timeline = self.state.timeline();
        let mut snapshot = timeline.capture_app_timeline();
        let at = Micros::micros(timeline.now().to_micros() + TIMELINE_RESET_LEAD_US);
        snapshot.force_beat_at_time(0.0, at, self.state.settings().quantum());
        timeline.commit_app_timeline(snapshot);
        debug!("[engine] timeline reset");
    }

    pub fn toggle_mode(&self, now: Instant) {
        let mode = self.state.input_mode().next();
        self.state.set_input_mode(mode);
        self.view
            .write_display_temporarily(mode.label(), MODE_MESSAGE_DURATION, now);
        info!("[engine] input mode {:?}", mode);
    }

    /// Commit a new tempo to the timeline and the settings, and put the encoder back on tempo.
    pub fn set_tempo(&self, bpm: f64) {
        let tempo = clamp_tempo(bpm);
        let timeline = self.state.timeline();
        let mut snapshot = timeline.capture_app_timeline();
        snapshot.set_tempo(tempo, timeline.now());
        timeline.commit_app_timeline(snapshot);
        self.state.update_settings(|settings| Settings { tempo, ..settings });
        self.state.set_input_mode(InputMode::Bpm);
        debug!("[engine] tempo {:.1}", tempo);
    }

    pub fn tap(&self, now: Instant) {
        let tempo = self
            .tap_tempo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tap(now);
        if let Some(bpm) = tempo {
            self.set_tempo(bpm);
        }
    }

    /// Apply an encoder rotation to whatever the input mode selects.
    pub fn route_encoder_adjust(&self, amount: f32) {
        let amount = amount.round() as i32;
        if amount == 0 {
            return;
        }
        match self.state.input_mode() {
            InputMode::Bpm => self.tempo_adjust(amount),
            InputMode::Loop => self.loop_adjust(amount),
            InputMode::Clock => self.ppqn_adjust(amount),
        }
    }

    fn tempo_adjust(&self, amount: i32) {
        self.set_tempo(self.state.tempo() + amount as f64);
    }

    fn loop_adjust(&self, amount: i32) {
        let settings = self
            .state
            .update_settings(|settings| settings.with_loop_size_offset(amount));
        debug!("[engine] loop size {}", settings.loop_size);
    }

    fn ppqn_adjust(&self, amount: i32) {
        let settings = self
            .state
            .update_settings(|settings| settings.with_ppqn_index_offset(amount));
        debug!("[engine] ppqn {}", settings.ppqn());
    }
}

impl<T: SharedTimeline> CommandHandler for Controller<T> {
    fn handle(&self, command: Command) {
        match command {
            Command::PlayStop => self.play_stop(),
            Command::TapTempo => self.tap(Instant::now()),
            Command::EncoderRotate(amount) => self.route_encoder_adjust(amount),
            Command::EncoderPress => self.toggle_mode(Instant::now()),
        }
    }
}

/// Everything the engine drives, handed over whole at construction.
pub struct EngineHardware<P, M, E, L> {
    pub clock_out: P,
    pub reset_out: P,
    pub midi_out: M,
    pub expander: E,
    pub interrupt: L,
    pub dispatcher: InputDispatcher,
    pub leds: Box<dyn LedDriver>,
    pub display: Box<dyn SegmentDisplay>,
}

pub struct Engine<T: SharedTimeline> {
    state: Arc<EngineState<T>>,
    view: Arc<MainView>,
    controller: Arc<Controller<T>>,
    processes: Vec<Box<dyn Runnable>>,
}

impl<T: SharedTimeline + 'static> Engine<T> {
    pub fn new<P, M, E, L>(timeline: T, settings: Settings, hardware: EngineHardware<P, M, E, L>) -> Engine<T>
    where
        P: OutputPin + Send + 'static,
        P::Error: Debug,
        M: MidiOut + 'static,
        E: IoExpander + 'static,
        L: InterruptLine + 'static,
    {
        let state = Arc::new(EngineState::new(timeline, settings));
        let view = Arc::new(MainView::new(hardware.leds, hardware.display));
        // restored tempo is up before the view process starts
        view.write_display(&format!("{:.1}", settings.tempo));
        view.update_display(Instant::now());
        let controller = Arc::new(Controller::new(state.clone(), view.clone()));

        let output = OutputProcess::new(
            state.clone(),
            hardware.clock_out,
            hardware.reset_out,
            hardware.midi_out,
        );
        let input = InputDispatchLoop::new(hardware.expander, hardware.interrupt, hardware.dispatcher);
        let processes: Vec<Box<dyn Runnable>> = vec![
            Box::new(PeriodicProcess::new("output", OUTPUT_PERIOD, output).with_priority(OUTPUT_PRIORITY)),
            Box::new(PeriodicProcess::new(
                "view",
                VIEW_PERIOD,
                ViewUpdateProcess::new(state.clone(), view.clone()),
            )),
            Box::new(PeriodicProcess::new(
                "user_input",
                USER_INPUT_PERIOD,
                UserInputProcess::new(input, controller.clone()),
            )),
        ];

        Engine {
            state,
            view,
            controller,
            processes,
        }
    }

    pub fn state(&self) -> Arc<EngineState<T>> {
        self.state.clone()
    }

    pub fn controller(&self) -> Arc<Controller<T>> {
        self.controller.clone()
    }

    pub fn start(&mut self) {
        for process in self.processes.iter_mut() {
            info!("[engine] starting {}", process.name());
            process.run();
        }
    }

    /// Join every process, output first so the lines stop moving before anything else.
    pub fn stop(&mut self) {
        for process in self.processes.iter_mut() {
            process.stop();
        }
        self.view.clear_display();
        self.view.update_display(Instant::now());
        info!("[engine] processes stopped");
    }

    /// Run until something clears `running`, saving changed settings once a second and a final
    /// time on the way out. A process that ends on its own shuts the engine down.
    pub fn run<S: SettingsStore>(&mut self, store: &S) {
        self.start();
        let mut last_saved = self.state.settings();
        let mut last_save = Instant::now();
        while self.state.is_running() {
            thread::sleep(SUPERVISOR_POLL);
            if let Some(process) = self.processes.iter().find(|process| !process.is_running()) {
                error!("[engine] {} ended unexpectedly, shutting down", process.name());
                self.state.shutdown();
            }
            if last_save.elapsed() >= SETTINGS_SAVE_INTERVAL {
                last_save = Instant::now();
                persist(store, &mut last_saved, self.state.settings());
            }
        }
        self.stop();
        persist(store, &mut last_saved, self.state.settings());
    }
}

fn persist<S: SettingsStore>(store: &S, last_saved: &mut Settings, settings: Settings) {
    if settings == *last_saved {
        return;
    }
    match store.save(&settings) {
        Ok(()) => {
            debug!("[engine] settings saved");
            *last_saved = settings;
        }
        Err(error) => warn!("[engine] could not save settings: {}", error),
    }
}
