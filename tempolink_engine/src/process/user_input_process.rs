/// Turn front panel events into engine commands.
use super::Process;
use crate::control::ControlEvent;
use crate::engine::{Command, CommandHandler};
use crate::hw::{InterruptLine, IoExpander};
use crate::input::{ControlId, InputDispatchLoop, InputEvent};

use core::ops::ControlFlow;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// Pause between interrupt waits. The wait itself blocks, so this only paces error retries.
pub const USER_INPUT_PERIOD: Duration = Duration::from_millis(1);

pub fn command_for(event: &InputEvent) -> Option<Command> {
    match (event.source, event.event) {
        (ControlId::PlayStop, ControlEvent::Triggered) => Some(Command::PlayStop),
        (ControlId::TapTempo, ControlEvent::Triggered) => Some(Command::TapTempo),
        (ControlId::EncoderButton, ControlEvent::Triggered) => Some(Command::EncoderPress),
        (ControlId::Encoder, ControlEvent::Rotated(amount)) => Some(Command::EncoderRotate(amount)),
        _ => None,
    }
}

pub struct UserInputProcess<E, L, H>
where
    E: IoExpander,
    L: InterruptLine,
    H: CommandHandler,
{
    input: InputDispatchLoop<E, L>,
    handler: Arc<H>,
}

impl<E, L, H> UserInputProcess<E, L, H>
where
    E: IoExpander,
    L: InterruptLine,
    H: CommandHandler,
{
    pub fn new(input: InputDispatchLoop<E, L>, handler: Arc<H>) -> UserInputProcess<E, L, H> {
        UserInputProcess { input, handler }
    }
}

impl<E, L, H> Process for UserInputProcess<E, L, H>
where
    E: IoExpander + 'static,
    L: InterruptLine + 'static,
    H: CommandHandler + 'static,
{
    fn process(&mut self) -> ControlFlow<()> {
        for event in self.input.poll().iter() {
            if let Some(command) = command_for(event) {
                debug!("[user_input] {:?}", command);
                self.handler.handle(command);
            }
        }
        ControlFlow::Continue(())
    }
}
