/// PCA9635 sixteen-channel PWM LED driver.
use core::fmt::Debug;
use embedded_hal::blocking::i2c::Write;
use log::debug;
use tempolink_engine::hw::{HardwareError, LedDriver};

const MODE1: u8 = 0x00;
const PWM0: u8 = 0x02;
const LEDOUT0: u8 = 0x14;
const NUM_CHANNELS: u8 = 16;
// every channel under individual PWM control
const LEDOUT_PWM_ALL: u8 = 0xff;

pub struct Pca9635<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C, E> Pca9635<I2C>
where
    I2C: Write<Error = E>,
    E: Debug,
{
    pub fn new(i2c: I2C, address: u8) -> Pca9635<I2C> {
        Pca9635 { i2c, address }
    }

    /// Wake the oscillator and hand every output to its PWM register.
    pub fn configure(&mut self) -> Result<(), HardwareError> {
        debug!("[leds] configuring {:#04x}", self.address);
        self.write_register(MODE1, 0x00)?;
        for offset in 0..4 {
            self.write_register(LEDOUT0 + offset, LEDOUT_PWM_ALL)?;
        }
        Ok(())
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), HardwareError> {
        self.i2c
            .write(self.address, &[register, value])
            .map_err(HardwareError::bus)
    }

    #[cfg(test)]
    fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C, E> LedDriver for Pca9635<I2C>
where
    I2C: Write<Error = E> + Send,
    E: Debug,
{
    fn set_brightness(&mut self, brightness: f32, index: u8) -> Result<(), HardwareError> {
        if index >= NUM_CHANNELS {
            return Err(HardwareError::InvalidChannel(index));
        }
        let duty = (brightness.clamp(0.0, 1.0) * 255.0) as u8;
        self.write_register(PWM0 + index, duty)
    }
}
