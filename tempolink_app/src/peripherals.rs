/// Device initialisation and interfacing.
use crate::display::ConsoleDisplay;
use crate::io_expander::{Configuration, Mcp23008};
use crate::led_driver::Pca9635;
use crate::midi::MidirOut;
use crate::Args;

use anyhow::{Context, Result};
use embedded_hal::digital::v2::OutputPin;
use linux_embedded_hal::sysfs_gpio::{Direction, Edge, Pin, PinPoller};
use linux_embedded_hal::I2cdev;
use log::{info, warn};
use std::time::Duration;
use tempolink_engine::control::{Button, RotaryEncoder};
use tempolink_engine::hw::{HardwareError, InterruptLine};
use tempolink_engine::input::{ControlId, InputDispatcher};
use tempolink_engine::EngineHardware;

// expander lines
pub const ENCODER_A_LINE: u8 = 0;
pub const ENCODER_B_LINE: u8 = 1;
pub const ENCODER_BUTTON_LINE: u8 = 2;
pub const PLAY_STOP_LINE: u8 = 3;
pub const TAP_TEMPO_LINE: u8 = 4;

const BUTTON_LINES: u8 = 1 << ENCODER_BUTTON_LINE | 1 << PLAY_STOP_LINE | 1 << TAP_TEMPO_LINE;
const ENCODER_LINES: u8 = 1 << ENCODER_A_LINE | 1 << ENCODER_B_LINE;

pub type Hardware = EngineHardware<ExportedPin, MidirOut, Mcp23008<I2cdev>, InterruptPin>;

/// Sysfs output pin, driven low on export and unexported on drop.
pub struct ExportedPin {
    pin: Pin,
}

impl ExportedPin {
    pub fn output(number: u64) -> Result<ExportedPin> {
        let pin = Pin::new(number);
        pin.export()
            .with_context(|| format!("exporting gpio {}", number))?;
        pin.set_direction(Direction::Low)
            .with_context(|| format!("setting gpio {} as output", number))?;
        Ok(ExportedPin { pin })
    }
}

impl OutputPin for ExportedPin {
    type Error = HardwareError;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.pin.set_value(0).map_err(HardwareError::gpio)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.pin.set_value(1).map_err(HardwareError::gpio)
    }
}

impl Drop for ExportedPin {
    fn drop(&mut self) {
        if let Err(error) = self.pin.unexport() {
            warn!("[gpio] could not unexport {}: {}", self.pin.get_pin_num(), error);
        }
    }
}

/// Falling-edge interrupt input from the expander's open-drain INT line.
pub struct InterruptPin {
    pin: Pin,
    poller: PinPoller,
}

impl InterruptPin {
    pub fn falling_edge(number: u64) -> Result<InterruptPin> {
        let pin = Pin::new(number);
        pin.export()
            .with_context(|| format!("exporting gpio {}", number))?;
        pin.set_direction(Direction::In)
            .with_context(|| format!("setting gpio {} as input", number))?;
        pin.set_edge(Edge::FallingEdge)
            .with_context(|| format!("setting gpio {} edge", number))?;
        let poller = pin
            .get_poller()
            .with_context(|| format!("polling gpio {}", number))?;
        Ok(InterruptPin { pin, poller })
    }
}

impl InterruptLine for InterruptPin {
    fn wait_for_edge(&mut self, timeout: Duration) -> Result<bool, HardwareError> {
        let timeout_ms = timeout.as_millis().min(isize::MAX as u128) as isize;
        self.poller
            .poll(timeout_ms)
            .map(|value| value.is_some())
            .map_err(HardwareError::gpio)
    }
}

impl Drop for InterruptPin {
    fn drop(&mut self) {
        if let Err(error) = self.pin.unexport() {
            warn!("[gpio] could not unexport {}: {}", self.pin.get_pin_num(), error);
        }
    }
}

/// Inputs pulled up and active low, inverted so a pressed button reads as 1. Every line
/// interrupts on change.
pub fn input_configuration() -> Configuration {
    let lines = BUTTON_LINES | ENCODER_LINES;
    Configuration {
        direction: lines,
        input_polarity: lines,
        pull_up_enabled: lines,
        ioc_enabled: lines,
        ..Configuration::default()
    }
}

pub fn controls() -> Result<InputDispatcher> {
    let mut dispatcher = InputDispatcher::new();
    dispatcher.register(ControlId::Encoder, RotaryEncoder::new(ENCODER_A_LINE, ENCODER_B_LINE))?;
    dispatcher.register(ControlId::EncoderButton, Button::new(ENCODER_BUTTON_LINE))?;
    dispatcher.register(ControlId::PlayStop, Button::new(PLAY_STOP_LINE))?;
    dispatcher.register(ControlId::TapTempo, Button::new(TAP_TEMPO_LINE))?;
    Ok(dispatcher)
}

pub fn setup(args: &Args) -> Result<Hardware> {
    let clock_out = ExportedPin::output(args.clock_gpio)?;
    let reset_out = ExportedPin::output(args.reset_gpio)?;
    let interrupt = InterruptPin::falling_edge(args.interrupt_gpio)?;

    let expander_bus = I2cdev::new(&args.i2c_bus)
        .with_context(|| format!("opening {}", args.i2c_bus.display()))?;
    let mut expander = Mcp23008::new(expander_bus, args.expander_address);
    expander
        .configure(&input_configuration())
        .context("configuring io expander")?;

    let led_bus = I2cdev::new(&args.i2c_bus)
        .with_context(|| format!("opening {}", args.i2c_bus.display()))?;
    let mut leds = Pca9635::new(led_bus, args.led_driver_address);
    leds.configure().context("configuring led driver")?;

    let midi_out = MidirOut::connect(args.midi_port.as_deref());
    info!("[init] peripherals ready");

    Ok(EngineHardware {
        clock_out,
        reset_out,
        midi_out,
        expander,
        interrupt,
        dispatcher: controls()?,
        leds: Box::new(leds),
        display: Box::new(ConsoleDisplay::new()),
    })
}
