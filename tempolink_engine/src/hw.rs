/// Hardware seams the engine drives. Concrete implementations live with the application so the
/// engine can be exercised against fakes on a development host.
use core::fmt::Debug;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HardwareError {
    #[error("bus error: {0}")]
    Bus(String),
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("no channel {0} on this device")]
    InvalidChannel(u8),
}

impl HardwareError {
    pub fn bus<E: Debug>(error: E) -> HardwareError {
        HardwareError::Bus(format!("{:?}", error))
    }

    pub fn gpio<E: Debug>(error: E) -> HardwareError {
        HardwareError::Gpio(format!("{:?}", error))
    }
}

/// Eight-line port expander carrying the front panel controls.
pub trait IoExpander: Send {
    fn read_gpio(&mut self) -> Result<u8, HardwareError>;
    /// Which lines raised the pending interrupt.
    fn read_interrupt_flag(&mut self) -> Result<u8, HardwareError>;
    /// Line levels latched when the interrupt fired. Reading clears the interrupt.
    fn read_captured_interrupt_state(&mut self) -> Result<u8, HardwareError>;
    fn write_pin(&mut self, index: u8, on: bool) -> Result<(), HardwareError>;
    fn write_output(&mut self, output: u8) -> Result<(), HardwareError>;
}

/// Interrupt line from the expander to the host.
pub trait InterruptLine: Send {
    /// Block until the line fires or `timeout` passes. `Ok(false)` means it timed out.
    fn wait_for_edge(&mut self, timeout: Duration) -> Result<bool, HardwareError>;
}

pub trait LedDriver: Send {
    /// `brightness` runs from 0.0 (off) to 1.0 (full).
    fn set_brightness(&mut self, brightness: f32, index: u8) -> Result<(), HardwareError>;
}

pub trait SegmentDisplay: Send {
    /// Show up to four characters. Bit `n` of `dots` lights the point after character `n`.
    fn write_text(&mut self, text: &str, dots: u8) -> Result<(), HardwareError>;
    fn write_segments(&mut self, segments: &[u16]) -> Result<(), HardwareError>;
}
