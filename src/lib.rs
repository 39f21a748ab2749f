//! # leapsense - client core for a hand-tracking sensor
//!
//! Provides:
//! - A [`Session`] that owns the connection to the tracking service and turns
//!   its asynchronous events into a poll-able "latest frame" plus a queue of
//!   forwarded notifications
//! - A host [`Allocator`] shim so image and point-mapping buffers are always
//!   released exactly once
//! - A grab-and-drag [`GrabTracker`] driven by successive frames
//! - Lens undistortion of raw camera images through the device camera model
//!
//! ## Quick Start
//! ```no_run
//! use leapsense::{GrabTracker, Session, SessionConfig, SimulatedSensor};
//! use std::time::Duration;
//!
//! let config = SessionConfig::from_env();
//! let session = Session::open(SimulatedSensor::default(), config).unwrap();
//! session.wait_connected(Duration::from_secs(5)).unwrap();
//!
//! let mut tracker = GrabTracker::default();
//! for _ in 0..100 {
//!     if let Some(update) = session.latest_frame().and_then(|f| tracker.update(&f)) {
//!         println!("drag: {:?}", update.drag_position);
//!     }
//!     std::thread::sleep(Duration::from_millis(10));
//! }
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod alloc;
pub mod backend;
pub mod session;
pub mod gesture;
pub mod undistort;
pub mod sim;

pub use alloc::{Allocator, AllocatorType, Buffer, SystemAllocator};
pub use backend::{Backend, Perspective, Projection};
pub use config::SessionConfig;
pub use error::LeapError;
pub use gesture::{GestureUpdate, GrabState, GrabTracker, Viewport};
pub use session::{Event, EventSink, Notification, Session};
pub use sim::{SimConfig, SimulatedSensor};
pub use types::*;
pub use undistort::{rectify, rectify_stereo, ImageRef, RectifiedImage, RectifyParams};

/// Result type alias for leapsense operations.
pub type Result<T> = std::result::Result<T, LeapError>;
