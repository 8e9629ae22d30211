/// Persistent device settings and the TOML file they are kept in.
use crate::timeline::clamp_tempo;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Selectable clock output resolutions, in pulses per quarter note.
pub const PPQN_OPTIONS: [u32; 6] = [1, 2, 4, 8, 12, 24];

const DEFAULT_TEMPO: f64 = 120.0;
const DEFAULT_LOOP_SIZE: u32 = 4;
const DEFAULT_PPQN_INDEX: usize = 2;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not access settings file: {0}")]
    Io(#[from] io::Error),
    #[error("could not parse settings: {0}")]
    Decode(#[from] toml::de::Error),
    #[error("could not serialize settings: {0}")]
    Encode(#[from] toml::ser::Error),
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid reset mode {0}")]
pub struct InvalidResetMode(pub u8);

/// Behaviour of the reset line around the loop-boundary pulse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ResetMode {
    /// Pulse high on the boundary, low again after the hold.
    #[default]
    ImmediateDrop,
    /// High on the boundary and re-asserted after every clock edge while playing.
    HoldUntilNextEdge,
    /// Low on the boundary edge itself, high after each hold while playing.
    HoldThroughToNextReset,
}

impl ResetMode {
    /// Level driven onto the reset line as the loop boundary fires.
    pub fn level_at_reset(&self) -> bool {
        !matches!(self, ResetMode::HoldThroughToNextReset)
    }

    /// Level driven onto the reset line once the pulse hold elapses while playing.
    pub fn level_after_hold(&self) -> bool {
        !matches!(self, ResetMode::ImmediateDrop)
    }
}

impl Into<u8> for ResetMode {
    fn into(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ResetMode {
    type Error = InvalidResetMode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ResetMode::ImmediateDrop),
            1 => Ok(ResetMode::HoldUntilNextEdge),
            2 => Ok(ResetMode::HoldThroughToNextReset),
            _ => Err(InvalidResetMode(value)),
        }
    }
}

/// Everything the device remembers across restarts. `launch_quant`, `start_stop_sync` and
/// `ap_mode` are carried for the network layer and not interpreted here.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tempo: f64,
    pub loop_size: u32,
    pub launch_quant: u32,
    pub ppqn_index: usize,
    pub reset_mode: ResetMode,
    /// Milliseconds added to the evaluation time of the clock outputs. Negative values let the
    /// outputs run early to cover latency downstream.
    pub delay_compensation: i32,
    pub start_stop_sync: bool,
    pub ap_mode: u8,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            tempo: DEFAULT_TEMPO,
            loop_size: DEFAULT_LOOP_SIZE,
            launch_quant: 0,
            ppqn_index: DEFAULT_PPQN_INDEX,
            reset_mode: ResetMode::default(),
            delay_compensation: 0,
            start_stop_sync: false,
            ap_mode: 0,
        }
    }
}

impl Settings {
    pub fn max_ppqn_index() -> usize {
        PPQN_OPTIONS.len() - 1
    }

    pub fn ppqn(&self) -> u32 {
        PPQN_OPTIONS[self.ppqn_index.min(Self::max_ppqn_index())]
    }

    /// Loop length in beats.
    pub fn quantum(&self) -> f64 {
        self.loop_size.max(1) as f64
    }

    /// Move the PPQN selection by `delta`, stopping at either end of the table.
    pub fn with_ppqn_index_offset(self, delta: i32) -> Settings {
        let index = (self.ppqn_index as i64 + delta as i64).clamp(0, Self::max_ppqn_index() as i64);
        Settings {
            ppqn_index: index as usize,
            ..self
        }
    }

    /// Grow or shrink the loop by `delta` beats, never below one.
    pub fn with_loop_size_offset(self, delta: i32) -> Settings {
        let loop_size = (self.loop_size as i64 + delta as i64).clamp(1, u32::MAX as i64);
        Settings {
            loop_size: loop_size as u32,
            ..self
        }
    }

    /// Pull out-of-range values from a hand-edited file back into range.
    pub fn sanitized(self) -> Settings {
        let tempo = if self.tempo.is_finite() {
            clamp_tempo(self.tempo)
        } else {
            DEFAULT_TEMPO
        };
        Settings {
            tempo,
            loop_size: self.loop_size.max(1),
            ppqn_index: self.ppqn_index.min(Self::max_ppqn_index()),
            ..self
        }
    }
}

pub trait SettingsStore: Send {
    /// Settings from the store, or defaults when there are none or they cannot be read.
    fn load(&self) -> Settings;
    fn save(&self, settings: &Settings) -> Result<(), SettingsError>;
}

#[derive(Clone, Debug)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> SettingsFile {
        SettingsFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Settings, SettingsError> {
        let contents = fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&contents)?)
    }

    fn temporary_path(&self) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(".tmp");
        PathBuf::from(path)
    }
}

impl SettingsStore for SettingsFile {
    fn load(&self) -> Settings {
        match self.read() {
            Ok(settings) => {
                info!("[settings] loaded {}", self.path.display());
                settings.sanitized()
            }
            Err(SettingsError::Io(error)) if error.kind() == io::ErrorKind::NotFound => {
                info!(
                    "[settings] no settings at {}, using defaults",
                    self.path.display()
                );
                Settings::default()
            }
            Err(error) => {
                warn!(
                    "[settings] ignoring {}: {}, using defaults",
                    self.path.display(),
                    error
                );
                Settings::default()
            }
        }
    }

    // written beside the target then renamed so a power cut never leaves half a file
    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let contents = toml::to_string(settings)?;
        let temporary = self.temporary_path();
        fs::write(&temporary, contents)?;
        fs::rename(&temporary, &self.path)?;
        debug!("[settings] saved {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn settings_should_have_expected_defaults() {
        let settings = Settings::default();
        assert_eq!(120.0, settings.tempo);
        assert_eq!(4, settings.loop_size);
        assert_eq!(2, settings.ppqn_index);
        assert_eq!(4, settings.ppqn());
        assert_eq!(4.0, settings.quantum());
        assert_eq!(ResetMode::ImmediateDrop, settings.reset_mode);
        assert_eq!(0, settings.delay_compensation);
    }

    #[test]
    fn reset_mode_should_convert_from_u8() {
        assert_eq!(Ok(ResetMode::ImmediateDrop), ResetMode::try_from(0));
        assert_eq!(Ok(ResetMode::HoldUntilNextEdge), ResetMode::try_from(1));
        assert_eq!(Ok(ResetMode::HoldThroughToNextReset), ResetMode::try_from(2));
        assert_eq!(Err(InvalidResetMode(3)), ResetMode::try_from(3));
    }

    #[test]
    fn reset_mode_should_define_line_levels() {
        assert_eq!(
            (true, false),
            (
                ResetMode::ImmediateDrop.level_at_reset(),
                ResetMode::ImmediateDrop.level_after_hold()
            )
        );
        assert_eq!(
            (true, true),
            (
                ResetMode::HoldUntilNextEdge.level_at_reset(),
                ResetMode::HoldUntilNextEdge.level_after_hold()
            )
        );
        assert_eq!(
            (false, true),
            (
                ResetMode::HoldThroughToNextReset.level_at_reset(),
                ResetMode::HoldThroughToNextReset.level_after_hold()
            )
        );
    }

    #[test]
    fn ppqn_offset_should_clamp_to_table() {
        let last = Settings {
            ppqn_index: Settings::max_ppqn_index(),
            ..Settings::default()
        };
        assert_eq!(Settings::max_ppqn_index(), last.with_ppqn_index_offset(1).ppqn_index);
        assert_eq!(24, last.with_ppqn_index_offset(1).ppqn());
        let first = Settings {
            ppqn_index: 0,
            ..Settings::default()
        };
        assert_eq!(0, first.with_ppqn_index_offset(-3).ppqn_index);
        assert_eq!(3, first.with_ppqn_index_offset(3).ppqn_index);
    }

    #[test]
    fn loop_size_offset_should_not_go_below_one() {
        let settings = Settings {
            loop_size: 1,
            ..Settings::default()
        };
        assert_eq!(1, settings.with_loop_size_offset(-1).loop_size);
        assert_eq!(1, settings.with_loop_size_offset(-40).loop_size);
        assert_eq!(9, settings.with_loop_size_offset(8).loop_size);
    }

    #[test]
    fn sanitized_should_pull_values_into_range() {
        let settings = Settings {
            tempo: 2_000.0,
            loop_size: 0,
            ppqn_index: 17,
            ..Settings::default()
        }
        .sanitized();
        assert_eq!(999.0, settings.tempo);
        assert_eq!(1, settings.loop_size);
        assert_eq!(Settings::max_ppqn_index(), settings.ppqn_index);
        assert_eq!(120.0, Settings { tempo: f64::NAN, ..settings }.sanitized().tempo);
    }

    #[test]
    fn settings_file_should_save_and_load() {
        let dir = tempdir().unwrap();
        let store = SettingsFile::new(dir.path().join("nested").join("settings.toml"));
        let settings = Settings {
            tempo: 98.5,
            loop_size: 8,
            ppqn_index: 5,
            reset_mode: ResetMode::HoldThroughToNextReset,
            delay_compensation: -12,
            start_stop_sync: true,
            ..Settings::default()
        };
        store.save(&settings).unwrap();
        assert_eq!(settings, store.load());
        assert!(!store.temporary_path().exists());
    }

    #[test]
    fn settings_file_should_load_defaults_when_missing() {
        let dir = tempdir().unwrap();
        let store = SettingsFile::new(dir.path().join("settings.toml"));
        assert_eq!(Settings::default(), store.load());
    }

    #[test]
    fn settings_file_should_load_defaults_when_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "tempo = \"fast\"\n[[[").unwrap();
        let store = SettingsFile::new(&path);
        assert!(matches!(store.read(), Err(SettingsError::Decode(_))));
        assert_eq!(Settings::default(), store.load());
    }

    #[test]
    fn settings_file_should_fill_missing_keys_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "tempo = 133.0\nreset_mode = 1\n").unwrap();
        let settings = SettingsFile::new(&path).load();
        assert_eq!(133.0, settings.tempo);
        assert_eq!(ResetMode::HoldUntilNextEdge, settings.reset_mode);
        assert_eq!(4, settings.loop_size);
    }

    #[test]
    fn settings_file_should_reject_unknown_reset_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "reset_mode = 7\n").unwrap();
        let store = SettingsFile::new(&path);
        assert!(store.read().is_err());
        assert_eq!(ResetMode::ImmediateDrop, store.load().reset_mode);
    }
}
