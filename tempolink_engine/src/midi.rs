/// MIDI transport and clock output.
use heapless::Vec;
use log::{debug, trace};
use midi_types::MidiMessage;
use thiserror::Error;

const TIMING_CLOCK: u8 = 0xf8;
const START: u8 = 0xfa;
const CONTINUE: u8 = 0xfb;
const STOP: u8 = 0xfc;

pub type MidiBytes = Vec<u8, 3>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MidiError {
    #[error("cannot encode {0}")]
    Unsupported(String),
    #[error("send failed: {0}")]
    Send(String),
}

pub trait MidiOut: Send {
    fn send(&mut self, message: &MidiMessage) -> Result<(), MidiError>;
}

/// Wire bytes for the realtime messages the engine sends.
pub fn encode(message: &MidiMessage) -> Result<MidiBytes, MidiError> {
    let status = match message {
        MidiMessage::TimingClock => TIMING_CLOCK,
        MidiMessage::Start => START,
        MidiMessage::Continue => CONTINUE,
        MidiMessage::Stop => STOP,
        other => return Err(MidiError::Unsupported(format!("{:?}", other))),
    };
    let mut bytes = Vec::new();
    // capacity 3 always holds one status byte
    let _ = bytes.push(status);
    Ok(bytes)
}

pub fn log_message(message: &MidiMessage) {
    match message {
        MidiMessage::TimingClock => trace!("[midi_send] clock"),
        MidiMessage::Start => debug!("[midi_send] start"),
        MidiMessage::Stop => debug!("[midi_send] stop"),
        MidiMessage::Continue => debug!("[midi_send] continue"),
        _ => trace!("[midi_send] UNKNOWN"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_should_produce_realtime_status_bytes() {
        assert_eq!(&[0xf8], encode(&MidiMessage::TimingClock).unwrap().as_slice());
        assert_eq!(&[0xfa], encode(&MidiMessage::Start).unwrap().as_slice());
        assert_eq!(&[0xfb], encode(&MidiMessage::Continue).unwrap().as_slice());
        assert_eq!(&[0xfc], encode(&MidiMessage::Stop).unwrap().as_slice());
    }

    #[test]
    fn encode_should_reject_channel_messages() {
        let note_on = MidiMessage::NoteOn(0.into(), 60.into(), 100.into());
        assert!(matches!(encode(&note_on), Err(MidiError::Unsupported(_))));
    }
}
