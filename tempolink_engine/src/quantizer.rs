/// Turn timeline readings into clock, reset and MIDI clock edges.
use crate::settings::Settings;
use crate::timeline::{Micros, TimelineSnapshot};

/// MIDI beat clock always runs at 24 pulses per quarter note, whatever the analog PPQN.
pub const MIDI_CLOCK_PPQN: u32 = 24;

/// What the outputs should do for one evaluation tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutputModel {
    pub now: Micros,
    pub tempo: f64,
    pub clock_triggered: bool,
    pub reset_triggered: bool,
    pub midi_clock_triggered: bool,
}

impl OutputModel {
    fn idle(now: Micros, tempo: f64) -> OutputModel {
        OutputModel {
            now,
            tempo,
            clock_triggered: false,
            reset_triggered: false,
            midi_clock_triggered: false,
        }
    }
}

/// Each clock pulse is a high half and a low half, so a beat holds twice as many edges as pulses.
pub fn edges_per_beat(ppqn: u32) -> i64 {
    ppqn as i64 * 2
}

pub fn edges_per_loop(ppqn: u32, loop_size: u32) -> i64 {
    edges_per_beat(ppqn) * loop_size.max(1) as i64
}

fn edge_index(beats: f64, edges_per_beat: i64) -> i64 {
    (beats * edges_per_beat as f64).floor() as i64
}

fn compensated(time: Micros, delay_compensation_ms: i32) -> Micros {
    let shift_us = delay_compensation_ms as i64 * 1_000;
    Micros::micros(time.to_micros().saturating_add_signed(shift_us))
}

/// Compare the edge position at `now` with the one at `last`. A clock edge fires when an even
/// edge is entered; a reset fires when that edge also starts a loop. The first evaluation, with
/// no `last`, only seeds the comparison.
pub fn quantize<S: TimelineSnapshot>(
    timeline: &S,
    now: Micros,
    last: Option<Micros>,
    settings: &Settings,
) -> OutputModel {
    let mut output = OutputModel::idle(now, timeline.tempo());
    let Some(last) = last else {
        return output;
    };

    let quantum = settings.quantum();
    let beats = timeline.beat_at_time(compensated(now, settings.delay_compensation), quantum);
    let last_beats = timeline.beat_at_time(compensated(last, settings.delay_compensation), quantum);

    let per_beat = edges_per_beat(settings.ppqn());
    let edge = edge_index(beats, per_beat);
    let last_edge = edge_index(last_beats, per_beat);
    output.clock_triggered = edge.rem_euclid(2) == 0 && edge != last_edge;
    output.reset_triggered = output.clock_triggered
        && edge.rem_euclid(edges_per_loop(settings.ppqn(), settings.loop_size)) == 0;

    let midi_per_beat = MIDI_CLOCK_PPQN as i64;
    output.midi_clock_triggered =
        edge_index(beats, midi_per_beat) != edge_index(last_beats, midi_per_beat);
    output
}
