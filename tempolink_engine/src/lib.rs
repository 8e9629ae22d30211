//! Clock, reset and MIDI clock engine for a tempo-sync device. Keeps analog pulse outputs and a
//! MIDI clock stream locked to a shared musical timeline, and steers tempo, loop length and
//! clock resolution from a small front panel.

pub mod animation;
pub mod control;
pub mod engine;
pub mod hw;
pub mod input;
pub mod midi;
pub mod process;
pub mod quantizer;
pub mod settings;
pub mod state;
pub mod tap_tempo;
pub mod timeline;
pub mod view;

pub use engine::{Command, CommandHandler, Controller, Engine, EngineHardware};
pub use settings::{ResetMode, Settings, SettingsError, SettingsFile, SettingsStore};
pub use state::{EngineState, InputMode, PlayState};
pub use timeline::{LocalTimeline, Micros, MonotonicClock, SharedTimeline, TimelineSnapshot};
