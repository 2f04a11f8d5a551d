//! Recorded pose packets for avatar playback.
//!
//! A packet is a time-ordered run of keyframes holding the same inputs the
//! live path consumes (head transform plus both hand states). Playback
//! samples a packet at the avatar's cursor time and feeds the result through
//! the ordinary body/hand update, so recorded and live avatars pose through
//! identical code.

use glam::Quat;

use crate::input::HandInputState;
use crate::transform::Transform;

/// One sampled instant of avatar input.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PacketFrame {
    pub head: Transform,
    pub left_hand: HandInputState,
    pub right_hand: HandInputState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoseKeyframe {
    /// Seconds from packet start. Strictly non-decreasing across the packet.
    pub time: f32,
    pub frame: PacketFrame,
}

/// A recorded, replayable sequence of avatar input frames.
#[derive(Debug, Clone, Default)]
pub struct PosePacket {
    keyframes: Vec<PoseKeyframe>,
}

impl PosePacket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keyframes(keyframes: Vec<PoseKeyframe>) -> Self {
        debug_assert!(
            keyframes.windows(2).all(|w| w[0].time <= w[1].time),
            "packet keyframes must be time-ordered"
        );
        Self { keyframes }
    }

    /// Appends a keyframe. Caller contract: `time` is >= the last recorded
    /// time.
    pub fn record(&mut self, time: f32, frame: PacketFrame) {
        debug_assert!(
            self.keyframes.last().is_none_or(|last| last.time <= time),
            "keyframe at {} recorded after {}",
            time,
            self.keyframes.last().map(|k| k.time).unwrap_or(0.0)
        );
        self.keyframes.push(PoseKeyframe { time, frame });
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// Time of the last keyframe; zero for an empty packet.
    pub fn duration_seconds(&self) -> f32 {
        self.keyframes.last().map(|k| k.time).unwrap_or(0.0)
    }

    /// Samples the packet at `time`, interpolating between the two
    /// surrounding keyframes. Times outside the recorded range clamp to the
    /// first/last frame. Returns `None` for an empty packet.
    pub fn sample(&self, time: f32) -> Option<PacketFrame> {
        let first = self.keyframes.first()?;
        if time <= first.time {
            return Some(first.frame);
        }
        let last = self.keyframes.last()?;
        if time >= last.time {
            return Some(last.frame);
        }
        // Partition point is the first keyframe past `time`; the guards
        // above keep it in 1..len.
        let next = self.keyframes.partition_point(|k| k.time <= time);
        let b = &self.keyframes[next];
        let a = &self.keyframes[next - 1];
        let span = b.time - a.time;
        if span <= f32::EPSILON {
            return Some(b.frame);
        }
        let t = (time - a.time) / span;
        Some(lerp_frame(&a.frame, &b.frame, t))
    }
}

fn lerp_transform(a: &Transform, b: &Transform, t: f32) -> Transform {
    Transform {
        position: a.position.lerp(b.position, t),
        orientation: slerp_shortest(a.orientation, b.orientation, t),
        scale: a.scale.lerp(b.scale, t),
    }
}

fn slerp_shortest(a: Quat, b: Quat, t: f32) -> Quat {
    // Flip to the same hemisphere so playback never spins the long way.
    let b = if a.dot(b) < 0.0 { -b } else { b };
    a.slerp(b, t)
}

fn lerp_hand(a: &HandInputState, b: &HandInputState, t: f32) -> HandInputState {
    // Discrete state snaps to the nearer keyframe; analog values blend.
    let nearer = if t < 0.5 { a } else { b };
    HandInputState {
        transform: lerp_transform(&a.transform, &b.transform, t),
        button_mask: nearer.button_mask,
        touch_mask: nearer.touch_mask,
        joystick_x: a.joystick_x + (b.joystick_x - a.joystick_x) * t,
        joystick_y: a.joystick_y + (b.joystick_y - a.joystick_y) * t,
        index_trigger: a.index_trigger + (b.index_trigger - a.index_trigger) * t,
        hand_trigger: a.hand_trigger + (b.hand_trigger - a.hand_trigger) * t,
        is_active: nearer.is_active,
    }
}

fn lerp_frame(a: &PacketFrame, b: &PacketFrame, t: f32) -> PacketFrame {
    PacketFrame {
        head: lerp_transform(&a.head, &b.head, t),
        left_hand: lerp_hand(&a.left_hand, &b.left_hand, t),
        right_hand: lerp_hand(&a.right_hand, &b.right_hand, t),
    }
}
