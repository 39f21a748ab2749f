//! Boundary to the tracking service that actually talks to the device.
//!
//! A [`Backend`] is driven by a [`Session`](crate::Session): it is opened with an
//! [`EventSink`] and pushes events into it from its own thread.

use crate::alloc::Allocator;
use crate::session::EventSink;
use crate::types::{PointMapping, PolicyFlags, Vector3};
use crate::Result;
use std::sync::Arc;

/// Which camera of the stereo pair a projection refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    StereoLeft,
    StereoRight,
}

/// Camera model mapping a rectilinear ray slope to a pixel in the distorted image.
///
/// Implementations must be pure: same input, same output, no side effects.
pub trait Projection: Send + Sync {
    fn rectilinear_to_pixel(&self, perspective: Perspective, ray: Vector3) -> Vector3;
}

impl<F> Projection for F
where
    F: Fn(Perspective, Vector3) -> Vector3 + Send + Sync,
{
    fn rectilinear_to_pixel(&self, perspective: Perspective, ray: Vector3) -> Vector3 {
        self(perspective, ray)
    }
}

/// Connection to a tracking service.
pub trait Backend: Send {
    /// Start connecting. Must return without waiting for the handshake; events
    /// are delivered through `sink` from the backend's own context.
    fn open(&mut self, sink: EventSink) -> Result<()>;

    /// Stop delivering events and release the connection. Called at most once.
    fn close(&mut self);

    /// Request policy changes. Takes effect asynchronously.
    fn set_policy(&mut self, set: PolicyFlags, clear: PolicyFlags) -> Result<()>;

    /// Use `allocator` for every later image or point-mapping buffer.
    fn set_allocator(&mut self, allocator: Arc<dyn Allocator>) -> Result<()>;

    /// Current point mapping, or `None` when no points are mapped.
    fn point_mapping(&self) -> Result<Option<PointMapping>>;

    /// Camera model for the connected device.
    fn projection(&self) -> Arc<dyn Projection>;
}
