/// LED ring animations, one frame per sixth of the loop.
use crate::state::PlayState;

pub const NUM_ANIM_LEDS: usize = 6;
pub const NUM_ANIM_FRAMES: usize = 6;

pub type Frame = [f32; NUM_ANIM_LEDS];
type Frames = [Frame; NUM_ANIM_FRAMES];

/// Ring fills up towards the boundary where playback will begin.
const CUE_FRAMES: Frames = [
    [0.2, 0.0, 0.0, 0.1, 0.2, 0.3],
    [0.2, 0.2, 0.0, 0.0, 0.1, 0.2],
    [0.2, 0.2, 0.2, 0.0, 0.0, 0.1],
    [0.2, 0.2, 0.2, 0.2, 0.0, 0.0],
    [0.2, 0.2, 0.2, 0.2, 0.2, 0.0],
    [0.2, 0.2, 0.2, 0.2, 0.2, 0.2],
];

const PLAY_FRAMES: Frames = [
    [1.0, 0.1, 0.1, 0.1, 0.1, 0.1],
    [0.1, 1.0, 0.1, 0.1, 0.1, 0.1],
    [0.1, 0.1, 1.0, 0.1, 0.1, 0.1],
    [0.1, 0.1, 0.1, 1.0, 0.1, 0.1],
    [0.1, 0.1, 0.1, 0.1, 1.0, 0.1],
    [0.1, 0.1, 0.1, 0.1, 0.1, 1.0],
];

/// Ring drains away until the stopping boundary.
const CUED_STOP_FRAMES: Frames = [
    [0.0, 0.1, 0.2, 0.3, 0.4, 0.5],
    [0.0, 0.03, 0.1, 0.2, 0.3, 0.4],
    [0.0, 0.0, 0.03, 0.1, 0.2, 0.3],
    [0.0, 0.0, 0.0, 0.03, 0.1, 0.2],
    [0.0, 0.0, 0.0, 0.0, 0.03, 0.1],
    [0.01, 0.0, 0.0, 0.0, 0.0, 0.0],
];

/// Dim chase shown while stopped but sharing a session with peers.
const STOPPED_FRAMES: Frames = [
    [0.05, 0.0, 0.0, 0.02, 0.02, 0.03],
    [0.03, 0.05, 0.0, 0.0, 0.02, 0.02],
    [0.02, 0.03, 0.05, 0.0, 0.0, 0.02],
    [0.02, 0.02, 0.03, 0.05, 0.0, 0.0],
    [0.0, 0.02, 0.02, 0.03, 0.05, 0.0],
    [0.0, 0.0, 0.02, 0.02, 0.03, 0.05],
];

pub fn frame_index(normalized_phase: f64) -> usize {
    let index = (normalized_phase * NUM_ANIM_FRAMES as f64).floor();
    index.clamp(0.0, (NUM_ANIM_FRAMES - 1) as f64) as usize
}

/// Frame to show for the current transport state, or `None` when the ring should be dark.
pub fn frame_for(play_state: PlayState, num_peers: usize, normalized_phase: f64) -> Option<&'static Frame> {
    let frames = match play_state {
        PlayState::Cued => &CUE_FRAMES,
        PlayState::Playing => &PLAY_FRAMES,
        PlayState::CuedStop => &CUED_STOP_FRAMES,
        PlayState::Stopped if num_peers > 0 => &STOPPED_FRAMES,
        PlayState::Stopped => return None,
    };
    Some(&frames[frame_index(normalized_phase)])
}
