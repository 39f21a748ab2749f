use std::ops::{Add, Sub};

use crate::alloc::Buffer;

/// 3-component vector in millimeters (positions) or ray slopes (projections).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Unit quaternion stored as [w, x, y, z].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandType {
    Left,
    Right,
}

/// One tracked hand. Only meaningful together with its owning frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Hand {
    pub id: u32,
    pub hand_type: HandType,
    pub palm_position: Vector3,
    /// How closed the hand is, in [0, 1].
    pub grab_strength: f32,
}

/// One sampled instant of hand tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingFrame {
    /// Strictly increasing per connection.
    pub frame_id: i64,
    /// Device timestamp in microseconds.
    pub timestamp_us: i64,
    pub hands: Vec<Hand>,
}

impl TrackingFrame {
    /// First hand of the given handedness, if tracked in this frame.
    pub fn hand(&self, hand_type: HandType) -> Option<&Hand> {
        self.hands.iter().find(|h| h.hand_type == hand_type)
    }
}

/// Device identification and capabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub serial: String,
    pub capabilities: Capabilities,
    /// Horizontal and vertical field of view in radians.
    pub h_fov: f32,
    pub v_fov: f32,
    /// Maximum tracking range in micrometers.
    pub range: u32,
}

bitflags::bitflags! {
    /// Capability bitmap reported by the device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const ROBUST_MODE = 1 << 0;
        const IMAGES      = 1 << 1;
        const HEAD_POSE   = 1 << 2;
        const MAP_POINTS  = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Optional event categories the session can ask the service for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PolicyFlags: u32 {
        const BACKGROUND_FRAMES  = 0x0000_0001;
        const IMAGES             = 0x0000_0002;
        const OPTIMIZE_HMD       = 0x0000_0004;
        const ALLOW_PAUSE_RESUME = 0x0000_0008;
        const MAP_POINTS         = 0x0000_0080;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSeverity {
    Unknown,
    Critical,
    Warning,
    Information,
}

impl LogSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            LogSeverity::Critical => "Critical",
            LogSeverity::Warning => "Warning",
            LogSeverity::Information => "Info",
            LogSeverity::Unknown => "",
        }
    }

    pub(crate) fn level(self) -> log::Level {
        match self {
            LogSeverity::Critical => log::Level::Error,
            LogSeverity::Warning => log::Level::Warn,
            LogSeverity::Information => log::Level::Info,
            LogSeverity::Unknown => log::Level::Debug,
        }
    }
}

/// Log line emitted by the tracking service.
#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    pub severity: LogSeverity,
    pub timestamp_us: i64,
    pub message: String,
}

/// Head pose reported in head-mounted mode.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeadPose {
    pub timestamp_us: i64,
    pub position: Vector3,
    pub orientation: Quaternion,
    pub linear_velocity: Vector3,
    pub angular_velocity: Vector3,
}

/// Notice that the set of mapped points changed. Contents are fetched on demand
/// with [`Session::point_mapping`](crate::Session::point_mapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointMappingChange {
    pub frame_id: i64,
    pub timestamp_us: i64,
}

/// Sparse set of tracked point identifiers.
///
/// Identifiers live in a host-allocated buffer that is released when the
/// mapping is dropped.
#[derive(Debug)]
pub struct PointMapping {
    pub frame_id: i64,
    pub timestamp_us: i64,
    ids: Buffer,
}

impl PointMapping {
    /// `ids` holds little-endian u32 identifiers.
    pub fn new(frame_id: i64, timestamp_us: i64, ids: Buffer) -> Self {
        Self {
            frame_id,
            timestamp_us,
            ids,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len() / 4
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.ids
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageProperties {
    pub width: u32,
    pub height: u32,
    /// Bytes per pixel.
    pub bpp: u32,
}

impl ImageProperties {
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.bpp as usize
    }
}

/// One camera image whose pixels live in a host-allocated buffer.
#[derive(Debug)]
pub struct Image {
    pub properties: ImageProperties,
    pub data: Buffer,
}

/// Raw left/right camera pair tied to a tracking frame.
///
/// Move-only: dropping the event releases both buffers through the
/// allocator that produced them.
#[derive(Debug)]
pub struct StereoImageEvent {
    pub frame_id: i64,
    pub timestamp_us: i64,
    pub left: Image,
    pub right: Image,
}
