mod display;
mod io_expander;
mod led_driver;
mod midi;
mod peripherals;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, LevelFilter};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tempolink_engine::{
    Engine, EngineState, LocalTimeline, MonotonicClock, SettingsFile, SettingsStore, SharedTimeline,
};

/// Clock, reset and MIDI clock source locked to a shared tempo.
#[derive(Debug, Parser)]
#[command(name = "tempolink", version)]
pub struct Args {
    /// Settings file, created on first save
    #[arg(long, default_value = "/var/lib/tempolink/settings.toml")]
    pub settings: PathBuf,

    /// I2C bus carrying the expander and LED driver
    #[arg(long, default_value = "/dev/i2c-1")]
    pub i2c_bus: PathBuf,

    #[arg(long, default_value = "0x20", value_parser = parse_i2c_address)]
    pub expander_address: u8,

    #[arg(long, default_value = "0x60", value_parser = parse_i2c_address)]
    pub led_driver_address: u8,

    /// Sysfs GPIO number of the clock output
    #[arg(long, default_value_t = 17)]
    pub clock_gpio: u64,

    /// Sysfs GPIO number of the reset output
    #[arg(long, default_value_t = 27)]
    pub reset_gpio: u64,

    /// Sysfs GPIO number wired to the expander interrupt
    #[arg(long, default_value_t = 22)]
    pub interrupt_gpio: u64,

    /// Use the first MIDI output whose name contains this
    #[arg(long)]
    pub midi_port: Option<String>,

    /// Overrides RUST_LOG
    #[arg(long)]
    pub log_level: Option<LevelFilter>,
}

fn parse_i2c_address(value: &str) -> Result<u8, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse(),
    };
    match parsed {
        Ok(address) if address <= 0x7f => Ok(address),
        Ok(address) => Err(format!("{:#x} is not a 7-bit address", address)),
        Err(error) => Err(error.to_string()),
    }
}

fn init_logging(level: Option<LevelFilter>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.filter_level(level);
    }
    builder.init();
}

/// Shut the engine down on a termination signal. Returns whether one arrived.
fn watch_signals<T: SharedTimeline + 'static>(state: Arc<EngineState<T>>) -> Result<Arc<AtomicBool>> {
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP]).context("installing signal handlers")?;
    let caught = Arc::new(AtomicBool::new(false));
    let signalled = caught.clone();
    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!("[signal] caught signal {}, shutting down", signal);
                signalled.store(true, Ordering::Release);
                state.shutdown();
            }
        })
        .context("spawning signal thread")?;
    Ok(caught)
}

fn run(args: Args) -> Result<bool> {
    let store = SettingsFile::new(&args.settings);
    let settings = store.load();
    info!(
        "[init] tempo={:.1} loop={} ppqn={} reset_mode={:?}",
        settings.tempo,
        settings.loop_size,
        settings.ppqn(),
        settings.reset_mode
    );

    let hardware = peripherals::setup(&args)?;
    let timeline = LocalTimeline::new(MonotonicClock::new(), settings.tempo);
    let mut engine = Engine::new(timeline, settings, hardware);
    let signalled = watch_signals(engine.state())?;

    info!("[init] running");
    engine.run(&store);
    // releases the exported pins and the MIDI port
    drop(engine);
    Ok(signalled.load(Ordering::Acquire))
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level);
    match run(args) {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::FAILURE,
        Err(error) => {
            error!("[init] {:#}", error);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i2c_address_should_parse_hex_and_decimal() {
        assert_eq!(Ok(0x20), parse_i2c_address("0x20"));
        assert_eq!(Ok(0x60), parse_i2c_address("0X60"));
        assert_eq!(Ok(32), parse_i2c_address("32"));
        assert!(parse_i2c_address("0x80").is_err());
        assert!(parse_i2c_address("bus").is_err());
    }

    #[test]
    fn args_should_default_to_standard_wiring() {
        let args = Args::parse_from(["tempolink"]);
        assert_eq!(0x20, args.expander_address);
        assert_eq!(0x60, args.led_driver_address);
        assert_eq!(None, args.midi_port);
        let args = Args::parse_from(["tempolink", "--log-level", "debug", "--midi-port", "USB"]);
        assert_eq!(Some(LevelFilter::Debug), args.log_level);
        assert_eq!(Some("USB".to_string()), args.midi_port);
    }
}
