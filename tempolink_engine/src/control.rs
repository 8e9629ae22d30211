/// Front panel controls attached to expander input lines.
use log::trace;
use std::time::{Duration, Instant};

pub const DEFAULT_MIN_REPEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Quadrature steps making up one detent of the encoder.
pub const STEPS_PER_DETENT: i8 = 4;
pub const ACCELERATION_WINDOW: Duration = Duration::from_millis(100);
pub const MAX_ACCELERATION: f32 = 51.0;
/// A partial detent older than this is forgotten.
pub const STALE_STEP_WINDOW: Duration = Duration::from_millis(250);

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlEvent {
    Triggered,
    Rotated(f32),
}

fn line_mask(line: u8) -> u8 {
    1 << (line & 0x07)
}

#[derive(Debug)]
pub enum Control {
    Button(Button),
    RotaryEncoder(RotaryEncoder),
}

impl Control {
    /// Expander lines this control listens to.
    pub fn mask(&self) -> u8 {
        match self {
            Control::Button(button) => button.mask,
            Control::RotaryEncoder(encoder) => encoder.a_mask | encoder.b_mask,
        }
    }

    /// `flag` holds the lines that changed, `state` the levels latched with the interrupt.
    pub fn handle_interrupt(&mut self, flag: u8, state: u8, now: Instant) -> Option<ControlEvent> {
        if flag & self.mask() == 0 {
            return None;
        }
        match self {
            Control::Button(button) => button.handle(flag, state, now),
            Control::RotaryEncoder(encoder) => encoder
                .decode(state & encoder.a_mask != 0, state & encoder.b_mask != 0, now)
                .map(ControlEvent::Rotated),
        }
    }
}

impl From<Button> for Control {
    fn from(button: Button) -> Control {
        Control::Button(button)
    }
}

impl From<RotaryEncoder> for Control {
    fn from(encoder: RotaryEncoder) -> Control {
        Control::RotaryEncoder(encoder)
    }
}

/// Fires when its line turns on, at most once per `min_repeat_interval`.
#[derive(Debug)]
pub struct Button {
    mask: u8,
    min_repeat_interval: Duration,
    last_triggered: Option<Instant>,
}

impl Button {
    pub fn new(line: u8) -> Button {
        Button::with_min_repeat_interval(line, DEFAULT_MIN_REPEAT_INTERVAL)
    }

    pub fn with_min_repeat_interval(line: u8, min_repeat_interval: Duration) -> Button {
        Button {
            mask: line_mask(line),
            min_repeat_interval,
            last_triggered: None,
        }
    }

    fn handle(&mut self, flag: u8, state: u8, now: Instant) -> Option<ControlEvent> {
        // released
        if flag & state & self.mask == 0 {
            return None;
        }
        if let Some(last) = self.last_triggered {
            if now.saturating_duration_since(last) < self.min_repeat_interval {
                trace!("[button] dropped chatter on mask {:#04x}", self.mask);
                return None;
            }
        }
        self.last_triggered = Some(now);
        Some(ControlEvent::Triggered)
    }
}

#[derive(Debug)]
pub struct RotaryEncoder {
    a_mask: u8,
    b_mask: u8,
    last_sequence: u8,
    steps: i8,
    last_step: Option<Instant>,
    last_rotation: Option<Instant>,
}

impl RotaryEncoder {
    /// Encoder at rest, both lines low.
    pub fn new(line_a: u8, line_b: u8) -> RotaryEncoder {
        RotaryEncoder {
            a_mask: line_mask(line_a),
            b_mask: line_mask(line_b),
            last_sequence: 0,
            steps: 0,
            last_step: None,
            last_rotation: None,
        }
    }

    pub fn steps(&self) -> i8 {
        self.steps
    }

    /// Feed the current line levels. Returns a rotation, scaled by acceleration, once a full
    /// detent has been turned in one direction.
    pub fn decode(&mut self, a: bool, b: bool, now: Instant) -> Option<f32> {
        let (a, b) = (a as u8, b as u8);
        let sequence = (a ^ b) | (b << 1);
        let delta = sequence.wrapping_sub(self.last_sequence) & 0b11;
        self.last_sequence = sequence;

        let step = match delta {
            1 => 1,
            3 => -1,
            _ => {
                trace!("[encoder] ignored delta {}", delta);
                return None;
            }
        };
        if let Some(last) = self.last_step {
            if now.saturating_duration_since(last) > STALE_STEP_WINDOW {
                self.steps = 0;
            }
        }
        self.last_step = Some(now);
        self.steps += step;

        if self.steps.abs() < STEPS_PER_DETENT {
            return None;
        }
        let direction = self.steps.signum() as f32;
        self.steps = 0;
        let amount = direction * self.acceleration(now);
        self.last_rotation = Some(now);
        Some(amount)
    }

    fn acceleration(&self, now: Instant) -> f32 {
        let Some(last) = self.last_rotation else {
            return 1.0;
        };
        let elapsed = now.saturating_duration_since(last);
        if elapsed >= ACCELERATION_WINDOW {
            return 1.0;
        }
        let closeness = 1.0 - elapsed.as_secs_f32() / ACCELERATION_WINDOW.as_secs_f32();
        1.0 + closeness * (MAX_ACCELERATION - 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // one detent clockwise as (A, B) levels, starting from rest
    const CLOCKWISE: [(bool, bool); 4] = [(true, false), (true, true), (false, true), (false, false)];
    const COUNTER_CLOCKWISE: [(bool, bool); 4] =
        [(false, true), (true, true), (true, false), (false, false)];

    fn turn(encoder: &mut RotaryEncoder, levels: &[(bool, bool)], now: Instant) -> Vec<f32> {
        levels
            .iter()
            .filter_map(|(a, b)| encoder.decode(*a, *b, now))
            .collect()
    }

    #[test]
    fn button_should_trigger_on_press_only() {
        let now = Instant::now();
        let mut button = Control::from(Button::new(3));
        assert_eq!(0b1000, button.mask());
        assert_eq!(Some(ControlEvent::Triggered), button.handle_interrupt(0b1000, 0b1000, now));
        // release
        assert_eq!(None, button.handle_interrupt(0b1000, 0b0000, now + Duration::from_secs(1)));
        // another line
        assert_eq!(None, button.handle_interrupt(0b0100, 0b1100, now + Duration::from_secs(2)));
    }

    #[test]
    fn button_should_drop_presses_within_repeat_interval() {
        let now = Instant::now();
        let mut button = Control::from(Button::new(0));
        assert_eq!(Some(ControlEvent::Triggered), button.handle_interrupt(1, 1, now));
        assert_eq!(None, button.handle_interrupt(1, 1, now + Duration::from_millis(40)));
        assert_eq!(
            Some(ControlEvent::Triggered),
            button.handle_interrupt(1, 1, now + Duration::from_millis(140))
        );
    }

    #[test]
    fn encoder_should_emit_one_rotation_per_detent() {
        let now = Instant::now();
        let mut encoder = RotaryEncoder::new(0, 1);
        assert_eq!(vec![1.0], turn(&mut encoder, &CLOCKWISE, now));
        let later = now + Duration::from_secs(1);
        assert_eq!(vec![-1.0], turn(&mut encoder, &COUNTER_CLOCKWISE, later));
        assert_eq!(0, encoder.steps());
    }

    #[test]
    fn encoder_should_ignore_noise_deltas() {
        let now = Instant::now();
        let mut encoder = RotaryEncoder::new(0, 1);
        assert_eq!(None, encoder.decode(true, false, now));
        assert_eq!(1, encoder.steps());
        // same levels again, delta 0
        assert_eq!(None, encoder.decode(true, false, now));
        assert_eq!(1, encoder.steps());
        // both lines flip at once, delta 2
        assert_eq!(None, encoder.decode(false, true, now));
        assert_eq!(1, encoder.steps());
    }

    #[test]
    fn encoder_should_forget_stale_partial_detent() {
        let now = Instant::now();
        let mut encoder = RotaryEncoder::new(0, 1);
        assert!(turn(&mut encoder, &CLOCKWISE[..3], now).is_empty());
        assert_eq!(3, encoder.steps());
        let later = now + Duration::from_millis(300);
        assert_eq!(None, encoder.decode(false, false, later));
        assert_eq!(1, encoder.steps());
    }

    #[test]
    fn encoder_should_accelerate_fast_turns() {
        let now = Instant::now();
        let mut encoder = RotaryEncoder::new(0, 1);
        assert_eq!(vec![1.0], turn(&mut encoder, &CLOCKWISE, now));
        let fast = turn(&mut encoder, &CLOCKWISE, now + Duration::from_millis(10));
        assert_eq!(1, fast.len());
        assert!((fast[0] - 46.0).abs() < 1e-3, "got {}", fast[0]);
        let slow = turn(&mut encoder, &CLOCKWISE, now + Duration::from_millis(200));
        assert_eq!(vec![1.0], slow);
    }

    #[test]
    fn encoder_acceleration_should_stay_within_bounds() {
        let start = Instant::now();
        let mut encoder = RotaryEncoder::new(0, 1);
        let mut now = start;
        let mut previous = f32::MAX;
        for gap_ms in [0u64, 5, 20, 50, 99, 100, 150, 400] {
            // turn once to set the reference, then again after the gap
            now += Duration::from_secs(1);
            turn(&mut encoder, &CLOCKWISE, now);
            now += Duration::from_millis(gap_ms);
            let amount = turn(&mut encoder, &CLOCKWISE, now)[0];
            assert!((1.0..=MAX_ACCELERATION).contains(&amount));
            assert!(amount <= previous);
            previous = amount;
        }
    }

    #[test]
    fn encoder_control_should_read_its_own_lines() {
        let now = Instant::now();
        let mut control = Control::from(RotaryEncoder::new(4, 5));
        assert_eq!(0b0011_0000, control.mask());
        let mut events = Vec::new();
        for (a, b) in CLOCKWISE {
            let state = (a as u8) << 4 | (b as u8) << 5;
            events.extend(control.handle_interrupt(0b0011_0000, state, now));
        }
        assert_eq!(vec![ControlEvent::Rotated(1.0)], events);
        assert_eq!(None, control.handle_interrupt(0b0000_0001, 0xff, now));
    }
}
