/// Refresh the LED ring, logo light and display from engine state.
use super::Process;
use crate::animation;
use crate::settings::Settings;
use crate::state::{EngineState, InputMode};
use crate::timeline::SharedTimeline;
use crate::view::{DisplayFrame, MainView};

use core::fmt::Write;
use core::ops::ControlFlow;
use heapless::String;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const VIEW_PERIOD: Duration = Duration::from_millis(15);

/// What the display shows for the parameter the encoder currently adjusts.
pub fn display_value(input_mode: InputMode, settings: &Settings, tempo: f64) -> DisplayFrame {
    let mut text: String<16> = String::new();
    let written = match input_mode {
        InputMode::Bpm => write!(text, "{:>5.1}", tempo),
        InputMode::Loop => write!(text, "{:>4}", settings.loop_size),
        InputMode::Clock => write!(text, "{:>4}", settings.ppqn()),
    };
    match written {
        Ok(()) => DisplayFrame::from_text(&text),
        Err(_) => DisplayFrame::from_text("----"),
    }
}

pub struct ViewUpdateProcess<T: SharedTimeline> {
    state: Arc<EngineState<T>>,
    view: Arc<MainView>,
}

impl<T: SharedTimeline> ViewUpdateProcess<T> {
    pub fn new(state: Arc<EngineState<T>>, view: Arc<MainView>) -> ViewUpdateProcess<T> {
        ViewUpdateProcess { state, view }
    }
}

impl<T: SharedTimeline + 'static> Process for ViewUpdateProcess<T> {
    fn process(&mut self) -> ControlFlow<()> {
        let phase = self.state.normalized_phase();
        self.view.set_logo_light(self.state.beat_phase());
        match animation::frame_for(self.state.play_state(), self.state.num_peers(), phase) {
            Some(frame) => self.view.set_animation_leds(frame),
            None => self.view.clear_animation_leds(),
        }
        self.view.set_base_display(display_value(
            self.state.input_mode(),
            &self.state.settings(),
            self.state.tempo(),
        ));
        self.view.update_display(Instant::now());
        ControlFlow::Continue(())
    }
}
