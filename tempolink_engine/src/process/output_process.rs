/// Drive the clock and reset lines and the MIDI transport from the shared timeline.
use super::{Priority, Process};
use crate::midi::{self, MidiOut};
use crate::quantizer::OutputModel;
use crate::state::{EngineState, PlayState};
use crate::timeline::{Micros, SharedTimeline};

use core::ops::ControlFlow;
use embedded_hal::digital::v2::OutputPin;
use log::{debug, info, warn};
use midi_types::MidiMessage;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const OUTPUT_PERIOD: Duration = Duration::from_micros(500);
pub const OUTPUT_PRIORITY: Priority = Priority::Realtime(90);

/// How long a clock or reset pulse stays high.
pub const PULSE_HOLD: Duration = Duration::from_millis(5);

pub struct OutputProcess<T, P, M>
where
    T: SharedTimeline,
    P: OutputPin,
    M: MidiOut,
{
    state: Arc<EngineState<T>>,
    clock_out: P,
    reset_out: P,
    midi_out: M,
    last_out_time: Option<Micros>,
    clock_high: bool,
    reset_high: bool,
    transport_stopped: bool,
}

impl<T, P, M> OutputProcess<T, P, M>
where
    T: SharedTimeline,
    P: OutputPin,
    P::Error: core::fmt::Debug,
    M: MidiOut,
{
    pub fn new(state: Arc<EngineState<T>>, clock_out: P, reset_out: P, midi_out: M) -> Self {
        let mut output = OutputProcess {
            state,
            clock_out,
            reset_out,
            midi_out,
            last_out_time: None,
            // assume high so the first writes go out
            clock_high: true,
            reset_high: true,
            transport_stopped: true,
        };
        output.set_clock(false);
        output.set_reset(false);
        output
    }

    fn set_clock(&mut self, high: bool) {
        if self.clock_high == high {
            return;
        }
        let result = if high {
            self.clock_out.set_high()
        } else {
            self.clock_out.set_low()
        };
        match result {
            Ok(()) => self.clock_high = high,
            Err(error) => warn!("[output] could not set clock {}: {:?}", high, error),
        }
    }

    fn set_reset(&mut self, high: bool) {
        if self.reset_high == high {
            return;
        }
        let result = if high {
            self.reset_out.set_high()
        } else {
            self.reset_out.set_low()
        };
        match result {
            Ok(()) => self.reset_high = high,
            Err(error) => warn!("[output] could not set reset {}: {:?}", high, error),
        }
    }

    fn send_midi(&mut self, message: MidiMessage) {
        midi::log_message(&message);
        if let Err(error) = self.midi_out.send(&message) {
            warn!("[output] midi send failed: {}", error);
        }
    }

    fn stop_transport(&mut self) {
        if !self.transport_stopped {
            info!("[output] transport stopped");
            self.send_midi(MidiMessage::Stop);
            self.transport_stopped = true;
        }
    }

    fn trigger_outputs(&mut self, model: &OutputModel, play_state: PlayState) {
        let reset_mode = self.state.settings().reset_mode;
        if model.reset_triggered {
            self.set_reset(reset_mode.level_at_reset());
            let queued = self.state.take_queued_start_transport();
            if self.transport_stopped || queued {
                info!("[output] transport started");
                self.send_midi(MidiMessage::Start);
                self.transport_stopped = false;
            }
        }
        if model.clock_triggered {
            self.set_clock(true);
        }
        if model.clock_triggered || model.reset_triggered {
            thread::sleep(PULSE_HOLD);
            if play_state == PlayState::Playing {
                self.set_reset(reset_mode.level_after_hold());
            }
            self.set_clock(false);
        }
    }

    /// Apply one tick's edges for `play_state`. False when a boundary transition lost a race,
    /// in which case nothing was driven.
    fn drive(&mut self, play_state: PlayState, model: &OutputModel) -> bool {
        match play_state {
            PlayState::Stopped => {
                self.stop_transport();
                self.set_clock(false);
                self.set_reset(false);
            }
            PlayState::Cued | PlayState::CuedStop if model.reset_triggered => {
                let next = play_state.at_loop_boundary();
                if !self.state.transition(play_state, next) {
                    return false;
                }
                info!("[output] {:?} -> {:?} at loop boundary", play_state, next);
                match next {
                    PlayState::Playing => self.trigger_outputs(model, next),
                    _ => self.stop_transport(),
                }
            }
            PlayState::Cued => {}
            PlayState::Playing | PlayState::CuedStop => self.trigger_outputs(model, play_state),
        }
        true
    }
}

impl<T, P, M> Process for OutputProcess<T, P, M>
where
    T: SharedTimeline + 'static,
    P: OutputPin + Send + 'static,
    P::Error: core::fmt::Debug,
    M: MidiOut + 'static,
{
    fn process(&mut self) -> ControlFlow<()> {
        let play_state = self.state.play_state();
        let model = self.state.output_model(self.last_out_time);
        self.last_out_time = Some(model.now);

        if !self.drive(play_state, &model) {
            // the controller moved the state under us, act on what it is now
            let current = self.state.play_state();
            debug!("[output] {:?} became {:?} during tick", play_state, current);
            if !self.drive(current, &model) {
                warn!("[output] play state still changing, skipping edges this tick");
            }
        }

        if model.midi_clock_triggered {
            self.send_midi(MidiMessage::TimingClock);
        }
        ControlFlow::Continue(())
    }
}
