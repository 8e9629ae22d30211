/// Front panel model: the LED ring, the logo light and the four character display.
use crate::animation::{Frame, NUM_ANIM_LEDS};
use crate::hw::{LedDriver, SegmentDisplay};

use core::fmt::{self, Display, Formatter};
use heapless::{String, Vec};
use log::{trace, warn};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const DISPLAY_WIDTH: usize = 4;
pub const LOGO_LED_INDEX: u8 = NUM_ANIM_LEDS as u8;

const LED_COUNT: usize = NUM_ANIM_LEDS + 1;
const MAX_TEMPORARY_MESSAGES: usize = 4;

/// Text as the display hardware sees it: one character per digit, decimal points folded into a
/// bit mask against the digit they follow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayFrame {
    text: String<DISPLAY_WIDTH>,
    dots: u8,
}

impl DisplayFrame {
    pub fn blank() -> DisplayFrame {
        DisplayFrame::from_text("")
    }

    /// Anything past the display width is cut off. "120.0" becomes "1200" with a point on the
    /// third digit.
    pub fn from_text(text: &str) -> DisplayFrame {
        let mut chars: String<DISPLAY_WIDTH> = String::new();
        let mut count = 0;
        let mut dots = 0u8;
        for c in text.chars() {
            if c == '.' && count > 0 && dots & (1 << (count - 1)) == 0 {
                dots |= 1 << (count - 1);
                continue;
            }
            if count == DISPLAY_WIDTH || chars.push(c).is_err() {
                break;
            }
            count += 1;
        }
        while count < DISPLAY_WIDTH && chars.push(' ').is_ok() {
            count += 1;
        }
        DisplayFrame { text: chars, dots }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn dots(&self) -> u8 {
        self.dots
    }
}

impl Display for DisplayFrame {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for (index, c) in self.text.chars().enumerate() {
            write!(f, "{}", c)?;
            if self.dots & (1 << index) != 0 {
                write!(f, ".")?;
            }
        }
        Ok(())
    }
}

struct LedBank {
    driver: Box<dyn LedDriver>,
    levels: [Option<f32>; LED_COUNT],
}

impl LedBank {
    fn set(&mut self, index: usize, brightness: f32) {
        let brightness = brightness.clamp(0.0, 1.0);
        if self.levels[index] == Some(brightness) {
            return;
        }
        match self.driver.set_brightness(brightness, index as u8) {
            Ok(()) => self.levels[index] = Some(brightness),
            Err(error) => warn!("[view] could not set led {}: {}", index, error),
        }
    }
}

#[derive(Clone)]
struct TemporaryMessage {
    frame: DisplayFrame,
    expires_at: Instant,
}

struct DisplayState {
    driver: Box<dyn SegmentDisplay>,
    base: DisplayFrame,
    temporary: Vec<TemporaryMessage, MAX_TEMPORARY_MESSAGES>,
    clear_requested: bool,
    shown: Option<DisplayFrame>,
}

impl DisplayState {
    fn drop_expired(&mut self, now: Instant) {
        while let Some(message) = self.temporary.last() {
            if message.expires_at > now {
                break;
            }
            self.temporary.pop();
        }
    }

    fn flush(&mut self, now: Instant) {
        self.drop_expired(now);
        if self.clear_requested {
            match self.driver.write_segments(&[0; DISPLAY_WIDTH]) {
                Ok(()) => {
                    self.clear_requested = false;
                    self.shown = Some(DisplayFrame::blank());
                }
                Err(error) => {
                    warn!("[view] could not clear display: {}", error);
                    return;
                }
            }
        }
        let wanted = match self.temporary.last() {
            Some(message) => message.frame.clone(),
            None => self.base.clone(),
        };
        if self.shown.as_ref() == Some(&wanted) {
            return;
        }
        trace!("[view] display '{}'", wanted);
        match self.driver.write_text(wanted.text(), wanted.dots()) {
            Ok(()) => self.shown = Some(wanted),
            Err(error) => warn!("[view] could not write display: {}", error),
        }
    }
}

/// Shared by the view process, which animates, and the controller, which posts messages. Writes
/// to the hardware are skipped when they would not change what is shown.
pub struct MainView {
    leds: Mutex<LedBank>,
    display: Mutex<DisplayState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MainView {
    pub fn new(leds: Box<dyn LedDriver>, display: Box<dyn SegmentDisplay>) -> MainView {
        MainView {
            leds: Mutex::new(LedBank {
                driver: leds,
                levels: [None; LED_COUNT],
            }),
            display: Mutex::new(DisplayState {
                driver: display,
                base: DisplayFrame::blank(),
                temporary: Vec::new(),
                clear_requested: false,
                shown: None,
            }),
        }
    }

    pub fn set_animation_leds(&self, frame: &Frame) {
        let mut leds = lock(&self.leds);
        for (index, brightness) in frame.iter().enumerate() {
            leds.set(index, *brightness);
        }
    }

    pub fn clear_animation_leds(&self) {
        self.set_animation_leds(&[0.0; NUM_ANIM_LEDS]);
    }

    /// Logo flashes on each beat and fades out across it.
    pub fn set_logo_light(&self, beat_phase: f64) {
        let brightness = 1.0 - beat_phase.clamp(0.0, 1.0);
        lock(&self.leds).set(LOGO_LED_INDEX as usize, brightness as f32);
    }

    /// Value shown whenever no temporary message is up.
    pub fn set_base_display(&self, frame: DisplayFrame) {
        lock(&self.display).base = frame;
    }

    /// Replace everything on the display, dropping any temporary messages.
    pub fn write_display(&self, text: &str) {
        let mut display = lock(&self.display);
        display.temporary.clear();
        display.base = DisplayFrame::from_text(text);
    }

    /// Show `text` over the base value until `duration` passes. The newest message wins; when it
    /// expires the next one still live shows through.
    pub fn write_display_temporarily(&self, text: &str, duration: Duration, now: Instant) {
        let mut display = lock(&self.display);
        display.drop_expired(now);
        if display.temporary.is_full() {
            display.temporary = display.temporary[1..].iter().cloned().collect();
        }
        let message = TemporaryMessage {
            frame: DisplayFrame::from_text(text),
            expires_at: now + duration,
        };
        // room was made above
        let _ = display.temporary.push(message);
    }

    /// Blank every segment on the next update.
    pub fn clear_display(&self) {
        let mut display = lock(&self.display);
        display.temporary.clear();
        display.base = DisplayFrame::blank();
        display.clear_requested = true;
    }

    pub fn update_display(&self, now: Instant) {
        lock(&self.display).flush(now);
    }
}
