/// MCP23008 eight-line I2C port expander.
use core::fmt::Debug;
use embedded_hal::blocking::i2c::{Write, WriteRead};
use log::debug;
use tempolink_engine::hw::{HardwareError, IoExpander};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register {
    IoDir = 0x00,
    IPol = 0x01,
    GpIntEn = 0x02,
    DefVal = 0x03,
    IntCon = 0x04,
    IoCon = 0x05,
    GpPu = 0x06,
    IntF = 0x07,
    IntCap = 0x08,
    Gpio = 0x09,
    OLat = 0x0a,
}

impl Into<u8> for Register {
    fn into(self) -> u8 {
        self as u8
    }
}

/// Register image written once at startup. A set bit in `direction` makes the line an input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Configuration {
    pub direction: u8,
    pub input_polarity: u8,
    pub pull_up_enabled: u8,
    pub ioc_enabled: u8,
    /// Compare against `default_value` instead of the previous level.
    pub compare_to_default: u8,
    pub default_value: u8,
    pub io_control: u8,
}

impl Default for Configuration {
    fn default() -> Configuration {
        Configuration {
            direction: 0xff,
            input_polarity: 0,
            pull_up_enabled: 0,
            ioc_enabled: 0,
            compare_to_default: 0,
            default_value: 0,
            // open-drain INT, sequential addressing off
            io_control: 0b0010_0100,
        }
    }
}

pub struct Mcp23008<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C, E> Mcp23008<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    E: Debug,
{
    pub fn new(i2c: I2C, address: u8) -> Mcp23008<I2C> {
        Mcp23008 { i2c, address }
    }

    pub fn configure(&mut self, config: &Configuration) -> Result<(), HardwareError> {
        debug!("[expander] configuring {:#04x}: {:?}", self.address, config);
        self.write_register(Register::IoCon, config.io_control)?;
        self.write_register(Register::IoDir, config.direction)?;
        self.write_register(Register::IPol, config.input_polarity)?;
        self.write_register(Register::GpPu, config.pull_up_enabled)?;
        self.write_register(Register::DefVal, config.default_value)?;
        self.write_register(Register::IntCon, config.compare_to_default)?;
        self.write_register(Register::GpIntEn, config.ioc_enabled)?;
        // clear anything latched while unconfigured
        self.read_register(Register::IntCap)?;
        Ok(())
    }

    pub fn read_register(&mut self, register: Register) -> Result<u8, HardwareError> {
        let mut buffer = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register.into()], &mut buffer)
            .map_err(HardwareError::bus)?;
        Ok(buffer[0])
    }

    pub fn write_register(&mut self, register: Register, value: u8) -> Result<(), HardwareError> {
        self.i2c
            .write(self.address, &[register.into(), value])
            .map_err(HardwareError::bus)
    }

    #[cfg(test)]
    fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C, E> IoExpander for Mcp23008<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E> + Send,
    E: Debug,
{
    fn read_gpio(&mut self) -> Result<u8, HardwareError> {
        self.read_register(Register::Gpio)
    }

    fn read_interrupt_flag(&mut self) -> Result<u8, HardwareError> {
        self.read_register(Register::IntF)
    }

    fn read_captured_interrupt_state(&mut self) -> Result<u8, HardwareError> {
        self.read_register(Register::IntCap)
    }

    fn write_pin(&mut self, index: u8, on: bool) -> Result<(), HardwareError> {
        if index > 7 {
            return Err(HardwareError::InvalidChannel(index));
        }
        let latch = self.read_register(Register::OLat)?;
        let latch = if on {
            latch | 1 << index
        } else {
            latch & !(1 << index)
        };
        self.write_register(Register::OLat, latch)
    }

    fn write_output(&mut self, output: u8) -> Result<(), HardwareError> {
        self.write_register(Register::OLat, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct BusError;

    /// Register file behind a fake bus.
    #[derive(Default)]
    struct FakeBus {
        registers: [u8; 11],
        writes: Vec<(u8, u8)>,
        fail: bool,
    }

    impl Write for FakeBus {
        type Error = BusError;

        fn write(&mut self, _address: u8, bytes: &[u8]) -> Result<(), BusError> {
            if self.fail {
                return Err(BusError);
            }
            self.registers[bytes[0] as usize] = bytes[1];
            self.writes.push((bytes[0], bytes[1]));
            Ok(())
        }
    }

    impl WriteRead for FakeBus {
        type Error = BusError;

        fn write_read(&mut self, _address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), BusError> {
            if self.fail {
                return Err(BusError);
            }
            buffer[0] = self.registers[bytes[0] as usize];
            Ok(())
        }
    }

    #[test]
    fn configure_should_write_interrupt_enable_last() {
        let mut expander = Mcp23008::new(FakeBus::default(), 0x20);
        let config = Configuration {
            direction: 0x1f,
            ioc_enabled: 0x1f,
            ..Configuration::default()
        };
        expander.configure(&config).unwrap();
        let bus = expander.release();
        assert_eq!(Some(&(Register::GpIntEn as u8, 0x1f)), bus.writes.last());
        assert_eq!(0x1f, bus.registers[Register::IoDir as usize]);
    }

    #[test]
    fn write_pin_should_only_change_one_latch_bit() {
        let mut bus = FakeBus::default();
        bus.registers[Register::OLat as usize] = 0b1000_0001;
        let mut expander = Mcp23008::new(bus, 0x20);
        expander.write_pin(3, true).unwrap();
        expander.write_pin(0, false).unwrap();
        assert_eq!(0b1000_1000, expander.read_register(Register::OLat).unwrap());
        assert_eq!(Err(HardwareError::InvalidChannel(8)), expander.write_pin(8, true));
    }

    #[test]
    fn interrupt_reads_should_hit_flag_and_capture_registers() {
        let mut bus = FakeBus::default();
        bus.registers[Register::IntF as usize] = 0b100;
        bus.registers[Register::IntCap as usize] = 0b110;
        let mut expander = Mcp23008::new(bus, 0x20);
        assert_eq!(Ok(0b100), expander.read_interrupt_flag());
        assert_eq!(Ok(0b110), expander.read_captured_interrupt_state());
    }

    #[test]
    fn bus_failures_should_surface_as_hardware_errors() {
        let bus = FakeBus {
            fail: true,
            ..FakeBus::default()
        };
        let mut expander = Mcp23008::new(bus, 0x20);
        assert_eq!(Err(HardwareError::Bus("BusError".into())), expander.read_gpio());
    }
}
