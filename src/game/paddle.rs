//! Paddle movement driven by held keys

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

use super::geometry::Vec3;
use super::{Side, PADDLE_Z};

/// Travel per tick along each axis while a key is held
pub const PADDLE_STEP: f64 = 0.2;
/// Paddle centers stay within `[-PADDLE_LIMIT, PADDLE_LIMIT]` on x and y
pub const PADDLE_LIMIT: f64 = 7.0;
/// Half width of the square paddle face
pub const PADDLE_HALF_EXTENT: f64 = 4.0;

const KEY_COUNT: usize = 8;

/// Keys the server reacts to. The discriminant is the slot in `KeyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    W = 0,
    A = 1,
    S = 2,
    D = 3,
    ArrowUp = 4,
    ArrowLeft = 5,
    ArrowDown = 6,
    ArrowRight = 7,
}

static KEY_TABLE: OnceLock<HashMap<&'static str, Key>> = OnceLock::new();

/// Browser `KeyboardEvent.code` names to key slots, shared by every session
fn key_table() -> &'static HashMap<&'static str, Key> {
    KEY_TABLE.get_or_init(|| {
        HashMap::from([
            ("KeyW", Key::W),
            ("KeyA", Key::A),
            ("KeyS", Key::S),
            ("KeyD", Key::D),
            ("ArrowUp", Key::ArrowUp),
            ("ArrowLeft", Key::ArrowLeft),
            ("ArrowDown", Key::ArrowDown),
            ("ArrowRight", Key::ArrowRight),
        ])
    })
}

pub fn lookup_key(name: &str) -> Option<Key> {
    key_table().get(name).copied()
}

/// One inbound input frame: key name -> held
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct KeyFrame(HashMap<String, bool>);

impl<K: Into<String>> FromIterator<(K, bool)> for KeyFrame {
    fn from_iter<I: IntoIterator<Item = (K, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Held/released flag per mapped key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState([bool; KEY_COUNT]);

impl KeyState {
    /// Build the full key state from a frame. Keys missing from the frame
    /// count as released; unmapped names are ignored.
    pub fn from_frame(frame: &KeyFrame) -> Self {
        let mut held = [false; KEY_COUNT];
        for (name, down) in &frame.0 {
            if let Some(key) = lookup_key(name) {
                held[key as usize] = *down;
            }
        }
        Self(held)
    }

    pub fn is_down(&self, key: Key) -> bool {
        self.0[key as usize]
    }

    /// Step along one axis. `first` wins when both keys are held.
    fn axis(&self, first: (Key, f64), second: (Key, f64)) -> f64 {
        if self.is_down(first.0) {
            first.1
        } else if self.is_down(second.0) {
            second.1
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paddle {
    position: Vec3,
}

impl Paddle {
    /// Paddle at an arbitrary position. Travel limits only apply to moves.
    pub fn at(position: Vec3) -> Self {
        Self { position }
    }

    pub fn home(side: Side) -> Self {
        Self::at(Vec3::new(0.0, 0.0, side.goal_sign() * PADDLE_Z))
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    fn nudge(&mut self, dx: f64, dy: f64) {
        self.position = Vec3::new(
            (self.position.x + dx).clamp(-PADDLE_LIMIT, PADDLE_LIMIT),
            (self.position.y + dy).clamp(-PADDLE_LIMIT, PADDLE_LIMIT),
            self.position.z,
        );
    }

    /// Whether a point's x/y falls on the paddle face
    pub fn covers(&self, point: Vec3) -> bool {
        (point.x - self.position.x).abs() <= PADDLE_HALF_EXTENT
            && (point.y - self.position.y).abs() <= PADDLE_HALF_EXTENT
    }
}

/// Owns both paddles. Left is driven by WASD, right by the arrow keys.
#[derive(Debug, Clone, PartialEq)]
pub struct PaddleController {
    left: Paddle,
    right: Paddle,
}

impl PaddleController {
    pub fn new() -> Self {
        Self::with_paddles(Paddle::home(Side::Left), Paddle::home(Side::Right))
    }

    pub fn with_paddles(left: Paddle, right: Paddle) -> Self {
        Self { left, right }
    }

    pub fn paddle(&self, side: Side) -> &Paddle {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Apply one tick of movement. Per axis the first-checked key wins a
    /// tie: up over down, left over right.
    pub fn move_panels(&mut self, keys: &KeyState) {
        let step = PADDLE_STEP;

        let dy = keys.axis((Key::W, step), (Key::S, -step));
        let dx = keys.axis((Key::A, -step), (Key::D, step));
        self.left.nudge(dx, dy);

        // The right player looks down the opposite z direction, so x is mirrored
        let dy = keys.axis((Key::ArrowUp, step), (Key::ArrowDown, -step));
        let dx = keys.axis((Key::ArrowLeft, step), (Key::ArrowRight, -step));
        self.right.nudge(dx, dy);
    }
}

impl Default for PaddleController {
    fn default() -> Self {
        Self::new()
    }
}
