/// Wait on the expander interrupt line and hand latched line changes to the registered controls.
use crate::control::{Control, ControlEvent};
use crate::hw::{InterruptLine, IoExpander};

use heapless::Vec;
use log::{debug, trace, warn};
use std::time::{Duration, Instant};
use thiserror::Error;

pub const MAX_CONTROLS: usize = 8;
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlId {
    PlayStop,
    TapTempo,
    Encoder,
    EncoderButton,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputEvent {
    pub source: ControlId,
    pub event: ControlEvent,
}

pub type InputEvents = Vec<InputEvent, MAX_CONTROLS>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("no room for more than {0} controls")]
    TooManyControls(usize),
}

#[derive(Debug, Default)]
pub struct InputDispatcher {
    controls: Vec<(ControlId, Control), MAX_CONTROLS>,
}

impl InputDispatcher {
    pub fn new() -> InputDispatcher {
        InputDispatcher::default()
    }

    pub fn register(&mut self, id: ControlId, control: impl Into<Control>) -> Result<(), InputError> {
        self.controls
            .push((id, control.into()))
            .map_err(|_| InputError::TooManyControls(MAX_CONTROLS))
    }

    /// Every line some control listens to.
    pub fn interest_mask(&self) -> u8 {
        self.controls
            .iter()
            .fold(0, |mask, (_, control)| mask | control.mask())
    }

    pub fn dispatch(&mut self, flag: u8, state: u8, now: Instant) -> InputEvents {
        let mut events = InputEvents::new();
        for (id, control) in self.controls.iter_mut() {
            if let Some(event) = control.handle_interrupt(flag, state, now) {
                // one event per control at most, so this always fits
                let _ = events.push(InputEvent { source: *id, event });
            }
        }
        events
    }
}

pub struct InputDispatchLoop<E: IoExpander, L: InterruptLine> {
    expander: E,
    interrupt: L,
    dispatcher: InputDispatcher,
}

impl<E: IoExpander, L: InterruptLine> InputDispatchLoop<E, L> {
    pub fn new(expander: E, interrupt: L, dispatcher: InputDispatcher) -> InputDispatchLoop<E, L> {
        let mut input = InputDispatchLoop {
            expander,
            interrupt,
            dispatcher,
        };
        // a change latched before we started would hold the line low forever
        input.clear_pending_interrupt();
        input
    }

    fn clear_pending_interrupt(&mut self) {
        if let Err(error) = self.expander.read_gpio() {
            warn!("[input] could not clear pending interrupt: {}", error);
        }
    }

    /// Block until the interrupt line fires or the poll timeout passes, then dispatch whatever
    /// changed. Hardware errors are logged and yield no events.
    pub fn poll(&mut self) -> InputEvents {
        match self.interrupt.wait_for_edge(POLL_TIMEOUT) {
            Ok(true) => {}
            Ok(false) => return InputEvents::new(),
            Err(error) => {
                warn!("[input] interrupt wait failed: {}", error);
                return InputEvents::new();
            }
        }
        let flag = match self.expander.read_interrupt_flag() {
            Ok(flag) => flag,
            Err(error) => {
                warn!("[input] could not read interrupt flag: {}", error);
                self.clear_pending_interrupt();
                return InputEvents::new();
            }
        };
        let state = match self.expander.read_captured_interrupt_state() {
            Ok(state) => state,
            Err(error) => {
                warn!("[input] could not read captured state: {}", error);
                self.clear_pending_interrupt();
                return InputEvents::new();
            }
        };
        trace!("[input] flag={:#010b} state={:#010b}", flag, state);
        let events = self.dispatcher.dispatch(flag, state, Instant::now());
        for event in events.iter() {
            debug!("[input] {:?} {:?}", event.source, event.event);
        }
        events
    }
}
