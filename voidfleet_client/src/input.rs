//! Input handling.
//!
//! In a real client this would integrate with windowing and raw
//! mouse/keyboard. Here devices are reduced to an analog `InputState`, which
//! is turned into the `INPUT` message the server expects. Messages are only
//! produced when the resulting input changes.

use voidfleet_shared::{components::Input, protocol::Message};

/// Analog sticks and buttons at a moment in time. Axes are in `[-1, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub forward: f32,
    pub right: f32,
    pub up: f32,
    /// Positive rolls left.
    pub roll: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub boost: bool,
    pub fire: bool,
    pub aim: bool,
}

/// Stick deflection needed to count as a button press.
pub const DEADZONE: f32 = 0.5;

impl InputState {
    pub fn to_input(self) -> Input {
        let pos = |v: f32| v > DEADZONE;
        let neg = |v: f32| v < -DEADZONE;
        let axis = |v: f32| if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
        Input {
            forward: pos(self.forward),
            backward: neg(self.forward),
            roll_left: pos(self.roll),
            roll_right: neg(self.roll),
            strafe_left: neg(self.right),
            strafe_right: pos(self.right),
            strafe_up: pos(self.up),
            strafe_down: neg(self.up),
            boost: self.boost,
            weapon_primary: self.fire,
            aim: self.aim,
            yaw: axis(self.yaw),
            pitch: axis(self.pitch),
        }
    }
}

/// Deduplicates outgoing input.
#[derive(Debug, Default)]
pub struct InputSender {
    last: Option<Input>,
}

impl InputSender {
    /// Returns the `INPUT` message to send, or `None` if nothing changed.
    pub fn poll(&mut self, state: InputState) -> Option<Message> {
        let input = state.to_input();
        if self.last == Some(input) {
            return None;
        }
        self.last = Some(input);
        Some(Message::Input(input))
    }

    /// Forces the next `poll` to send, e.g. after a reconnect.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Scripted pilot for headless runs: cruises, weaves and fires in bursts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Autopilot;

impl Autopilot {
    pub fn sample(&self, t: f64) -> InputState {
        let phase = t as f32;
        InputState {
            forward: 1.0,
            yaw: (phase * 0.5).sin() * 0.6,
            pitch: (phase * 0.3).cos() * 0.3,
            boost: (t % 10.0) < 2.0,
            fire: (t % 3.0) < 1.0,
            ..InputState::default()
        }
    }
}
