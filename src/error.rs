use std::time::Duration;

/// Errors that can occur while talking to the tracking sensor.
#[derive(Debug, thiserror::Error)]
pub enum LeapError {
    #[error("Failed to initialize transport: {0}")]
    TransportInit(String),

    #[error("Session closed")]
    Closed,

    #[error("Timed out after {0:?} waiting for the device handshake")]
    ConnectTimeout(Duration),

    #[error("Backend call failed: {0}")]
    Backend(String),

    #[error("Allocator returned no buffer for {0} bytes")]
    AllocationFailed(usize),

    #[error("Unsupported pixel format: {0} bytes per pixel")]
    UnsupportedPixelFormat(u32),

    #[error("Image buffer holds {len} bytes, {width}x{height} needs {expected}")]
    InvalidImageSize {
        width: usize,
        height: usize,
        expected: usize,
        len: usize,
    },

    #[error("Timeout waiting for data")]
    Timeout,

    #[error("Event stream stopped")]
    StreamStopped,
}
