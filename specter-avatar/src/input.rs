//! Controller input state fed into the live pose update.
//!
//! The tracking source (external to this crate) fills one
//! [`HandInputState`] per hand each frame; the avatar driver forwards it
//! into hand posing. Button/touch state is a plain bitmask so providers can
//! pass it straight through from their SDK.

use crate::transform::Transform;

/// X/A pressed.
pub const BUTTON_ONE: u32 = 0x0001;
/// Y/B pressed.
pub const BUTTON_TWO: u32 = 0x0002;
/// Select/system pressed.
pub const BUTTON_THREE: u32 = 0x0004;
/// Thumbstick click.
pub const BUTTON_JOYSTICK: u32 = 0x0008;

/// Capacitive touch on X/A.
pub const TOUCH_ONE: u32 = 0x0001;
/// Capacitive touch on Y/B.
pub const TOUCH_TWO: u32 = 0x0002;
/// Capacitive touch on the thumbstick.
pub const TOUCH_JOYSTICK: u32 = 0x0004;
/// Capacitive touch on the thumb rest.
pub const TOUCH_THUMB_REST: u32 = 0x0008;
/// Capacitive touch on the index trigger.
pub const TOUCH_INDEX: u32 = 0x0010;
/// Index finger pointing gesture.
pub const TOUCH_POINTING: u32 = 0x0040;
/// Thumb raised gesture.
pub const TOUCH_THUMB_UP: u32 = 0x0080;

/// Per-hand controller state for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HandInputState {
    /// World-space controller transform from tracking.
    pub transform: Transform,
    /// Pressed buttons, see the `BUTTON_*` bits.
    pub button_mask: u32,
    /// Touched/gesture surfaces, see the `TOUCH_*` bits.
    pub touch_mask: u32,
    pub joystick_x: f32,
    pub joystick_y: f32,
    pub index_trigger: f32,
    pub hand_trigger: f32,
    /// False while the controller is disconnected or untracked.
    pub is_active: bool,
}

impl HandInputState {
    #[inline]
    pub fn button_pressed(&self, bit: u32) -> bool {
        self.button_mask & bit != 0
    }

    #[inline]
    pub fn touched(&self, bit: u32) -> bool {
        self.touch_mask & bit != 0
    }
}
