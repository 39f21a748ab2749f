//! Grab-and-drag interaction derived from successive tracking frames.
//!
//! Closing the tracked hand past the grab threshold re-anchors the drag
//! origin so the dragged object continues from where it was left instead of
//! jumping to the hand's absolute position.

use crate::types::{HandType, TrackingFrame, Vector3};

/// Grab strength above which a hand counts as grabbing.
pub const GRAB_THRESHOLD: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrabState {
    #[default]
    Idle,
    Grabbing,
}

/// Result of feeding one new frame to a [`GrabTracker`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureUpdate {
    pub frame_id: i64,
    pub state: GrabState,
    /// Offset of the dragged object from where it started.
    pub drag_position: Vector3,
    /// True on the frame where Idle turned into Grabbing.
    pub just_grabbed: bool,
}

/// Idle/Grabbing state machine for one hand.
#[derive(Debug, Clone)]
pub struct GrabTracker {
    hand_type: HandType,
    threshold: f32,
    state: GrabState,
    origin: Vector3,
    drag_position: Vector3,
    last_frame_id: Option<i64>,
}

impl Default for GrabTracker {
    fn default() -> Self {
        Self::new(HandType::Right)
    }
}

impl GrabTracker {
    pub fn new(hand_type: HandType) -> Self {
        Self::with_threshold(hand_type, GRAB_THRESHOLD)
    }

    pub fn with_threshold(hand_type: HandType, threshold: f32) -> Self {
        Self {
            hand_type,
            threshold,
            state: GrabState::Idle,
            origin: Vector3::ZERO,
            drag_position: Vector3::ZERO,
            last_frame_id: None,
        }
    }

    pub fn state(&self) -> GrabState {
        self.state
    }

    pub fn is_grabbing(&self) -> bool {
        self.state == GrabState::Grabbing
    }

    pub fn drag_position(&self) -> Vector3 {
        self.drag_position
    }

    pub fn origin(&self) -> Vector3 {
        self.origin
    }

    /// Id of the last frame that was processed.
    pub fn last_frame_id(&self) -> Option<i64> {
        self.last_frame_id
    }

    /// Process `frame`. Returns `None` if it is not newer than the last
    /// processed frame. Without the tracked hand, state and position hold.
    pub fn update(&mut self, frame: &TrackingFrame) -> Option<GestureUpdate> {
        if self.last_frame_id.is_some_and(|last| frame.frame_id <= last) {
            return None;
        }
        self.last_frame_id = Some(frame.frame_id);

        let mut just_grabbed = false;
        if let Some(hand) = frame.hand(self.hand_type) {
            let palm = hand.palm_position;
            let grabbing = hand.grab_strength > self.threshold;
            match (self.state, grabbing) {
                (GrabState::Idle, true) => {
                    self.origin = palm - self.drag_position;
                    self.state = GrabState::Grabbing;
                    just_grabbed = true;
                    log::debug!("Grab started at frame {}", frame.frame_id);
                }
                (GrabState::Grabbing, false) => {
                    self.state = GrabState::Idle;
                    log::debug!("Grab released at frame {}", frame.frame_id);
                }
                _ => {}
            }
            if self.state == GrabState::Grabbing {
                self.drag_position = palm - self.origin;
            }
        }

        Some(GestureUpdate {
            frame_id: frame.frame_id,
            state: self.state,
            drag_position: self.drag_position,
            just_grabbed,
        })
    }
}

/// Screen placement of the dragged marker and the depth slider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPlacement {
    pub marker: (f32, f32),
    pub slider: (f32, f32),
}

/// Maps drag offsets onto a window of the given size, centred on the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
        }
    }
}

impl Viewport {
    /// The marker follows the horizontal plane (x, z); the slider on the right
    /// edge follows height (y).
    pub fn place(&self, drag: Vector3) -> ScreenPlacement {
        ScreenPlacement {
            marker: (drag.x + self.width / 2.0, drag.z + self.height / 2.0),
            slider: (self.width * 0.95, drag.y + self.height / 2.0),
        }
    }
}
