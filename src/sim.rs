//! In-process stand-in for the tracking service.
//!
//! [`SimulatedSensor`] runs a named worker thread that performs a short
//! handshake, reports a device, and then streams synthetic frames: a right
//! hand circling and periodically closing, plus camera images, point-mapping
//! changes and head poses depending on the requested policy.

use crate::alloc::{Allocator, AllocatorType, Buffer, SystemAllocator};
use crate::backend::{Backend, Perspective, Projection};
use crate::session::{Event, EventSink};
use crate::types::{
    Capabilities, DeviceInfo, Hand, HandType, HeadPose, Image, ImageProperties, LogMessage,
    LogSeverity, PointMapping, PointMappingChange, PolicyFlags, Quaternion, StereoImageEvent,
    TrackingFrame, Vector3,
};
use crate::{LeapError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub serial: String,
    pub handshake_delay: Duration,
    pub frame_interval: Duration,
    pub image_width: u32,
    pub image_height: u32,
    /// Emit images every Nth frame when the image policy is set.
    pub image_every: i64,
    /// Emit a point-mapping change every Nth frame when map points are enabled.
    pub map_points_every: i64,
    /// Emit a device log line every Nth frame.
    pub log_every: i64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            serial: "SIM-000001".into(),
            handshake_delay: Duration::from_millis(50),
            frame_interval: Duration::from_millis(11),
            image_width: 384,
            image_height: 384,
            image_every: 10,
            map_points_every: 30,
            log_every: 600,
        }
    }
}

/// Wide-angle camera with division-model radial distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadialCamera {
    pub width: u32,
    pub height: u32,
    /// Focal length in pixels.
    pub focal: f32,
    pub k1: f32,
    /// Principal point shift between the two cameras, in pixels.
    pub stereo_shift: f32,
}

impl RadialCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            focal: 90.0,
            k1: 0.05,
            stereo_shift: 2.0,
        }
    }
}

impl Projection for RadialCamera {
    fn rectilinear_to_pixel(&self, perspective: Perspective, ray: Vector3) -> Vector3 {
        let shift = match perspective {
            Perspective::StereoLeft => -self.stereo_shift,
            Perspective::StereoRight => self.stereo_shift,
        };
        let r2 = ray.x * ray.x + ray.y * ray.y;
        let d = 1.0 / (1.0 + self.k1 * r2);
        Vector3::new(
            self.width as f32 / 2.0 + shift + self.focal * ray.x * d,
            self.height as f32 / 2.0 + self.focal * ray.y * d,
            0.0,
        )
    }
}

/// Simulated tracking service.
pub struct SimulatedSensor {
    config: SimConfig,
    camera: Arc<RadialCamera>,
    policy: Arc<AtomicU32>,
    allocator: Arc<Mutex<Arc<dyn Allocator>>>,
    frame_id: Arc<AtomicI64>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl SimulatedSensor {
    pub fn new(config: SimConfig) -> Self {
        let camera = Arc::new(RadialCamera::new(config.image_width, config.image_height));
        Self {
            config,
            camera,
            policy: Arc::new(AtomicU32::new(0)),
            allocator: Arc::new(Mutex::new(Arc::new(SystemAllocator))),
            frame_id: Arc::new(AtomicI64::new(0)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    pub fn camera(&self) -> RadialCamera {
        *self.camera
    }
}

impl Backend for SimulatedSensor {
    fn open(&mut self, sink: EventSink) -> Result<()> {
        if self.thread.is_some() {
            return Err(LeapError::TransportInit("Simulated sensor already open".into()));
        }
        let worker = Worker {
            config: self.config.clone(),
            policy: Arc::clone(&self.policy),
            allocator: Arc::clone(&self.allocator),
            frame_id: Arc::clone(&self.frame_id),
            stop_flag: Arc::clone(&self.stop_flag),
            sink,
        };

        let thread = std::thread::Builder::new()
            .name("leapsense-sim".into())
            .spawn(move || worker.run())
            .map_err(|e| LeapError::TransportInit(format!("Failed to spawn sensor thread: {}", e)))?;
        self.thread = Some(thread);
        Ok(())
    }

    fn close(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    fn set_policy(&mut self, set: PolicyFlags, clear: PolicyFlags) -> Result<()> {
        let _ = self
            .policy
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                Some(((PolicyFlags::from_bits_truncate(bits) | set) - clear).bits())
            });
        Ok(())
    }

    fn set_allocator(&mut self, allocator: Arc<dyn Allocator>) -> Result<()> {
        *self.allocator.lock() = allocator;
        Ok(())
    }

    fn point_mapping(&self) -> Result<Option<PointMapping>> {
        let frame_id = self.frame_id.load(Ordering::SeqCst);
        if frame_id == 0 {
            return Ok(None);
        }
        let ids = mapped_points(frame_id);
        let size = ids.len() * 4;
        let allocator = self.allocator.lock().clone();
        let mut buf = Buffer::allocate(&allocator, size, AllocatorType::Uint8)
            .ok_or(LeapError::AllocationFailed(size))?;
        for (chunk, id) in buf.chunks_exact_mut(4).zip(&ids) {
            chunk.copy_from_slice(&id.to_le_bytes());
        }
        Ok(Some(PointMapping::new(frame_id, frame_id * 11_000, buf)))
    }

    fn projection(&self) -> Arc<dyn Projection> {
        self.camera.clone()
    }
}

impl Drop for SimulatedSensor {
    fn drop(&mut self) {
        self.close();
    }
}

fn mapped_points(frame_id: i64) -> Vec<u32> {
    let count = 3 + (frame_id / 30 % 5) as u32;
    (0..count).map(|i| 100 + i * 3).collect()
}

struct Worker {
    config: SimConfig,
    policy: Arc<AtomicU32>,
    allocator: Arc<Mutex<Arc<dyn Allocator>>>,
    frame_id: Arc<AtomicI64>,
    stop_flag: Arc<AtomicBool>,
    sink: EventSink,
}

impl Worker {
    fn stopped(&self) -> bool {
        self.stop_flag.load(Ordering::Relaxed)
    }

    /// Sleep in short steps so close() is not held up by long intervals.
    fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(10)));
        }
    }

    fn run(self) {
        log::info!("Simulated sensor started");
        self.sleep(self.config.handshake_delay);
        if self.stopped() {
            return;
        }

        self.sink.connected();
        self.sink.device_found(DeviceInfo {
            serial: self.config.serial.clone(),
            capabilities: Capabilities::IMAGES | Capabilities::MAP_POINTS | Capabilities::HEAD_POSE,
            h_fov: 2.44,
            v_fov: 2.24,
            range: 470_000,
        });

        let epoch = Instant::now();
        let mut frame_id: i64 = 0;
        while !self.stopped() {
            frame_id += 1;
            self.frame_id.store(frame_id, Ordering::SeqCst);
            let timestamp_us = epoch.elapsed().as_micros() as i64;
            let policy = PolicyFlags::from_bits_truncate(self.policy.load(Ordering::SeqCst));

            self.sink.frame(synthetic_frame(frame_id, timestamp_us));

            if policy.contains(PolicyFlags::IMAGES) && frame_id % self.config.image_every.max(1) == 0 {
                match self.render_images(frame_id, timestamp_us) {
                    Some(images) => {
                        self.sink.images(images);
                    }
                    None => log::warn!("Image allocation failed, skipping frame {}", frame_id),
                }
            }

            if policy.contains(PolicyFlags::MAP_POINTS)
                && frame_id % self.config.map_points_every.max(1) == 0
            {
                self.sink.deliver(Event::PointMappingChanged(PointMappingChange {
                    frame_id,
                    timestamp_us,
                }));
            }

            if policy.contains(PolicyFlags::OPTIMIZE_HMD) && frame_id % 10 == 0 {
                self.sink.deliver(Event::HeadPose(synthetic_head_pose(frame_id, timestamp_us)));
            }

            if self.config.log_every > 0 && frame_id % self.config.log_every == 0 {
                self.sink.deliver(Event::Log(LogMessage {
                    severity: LogSeverity::Information,
                    timestamp_us,
                    message: format!("Tracking at frame {}", frame_id),
                }));
            }

            self.sleep(self.config.frame_interval);
        }
        log::info!("Simulated sensor stopping after {} frames", frame_id);
    }

    fn render_images(&self, frame_id: i64, timestamp_us: i64) -> Option<StereoImageEvent> {
        let allocator = self.allocator.lock().clone();
        let properties = ImageProperties {
            width: self.config.image_width,
            height: self.config.image_height,
            bpp: 1,
        };
        let render = |phase: usize| -> Option<Image> {
            let mut data = Buffer::allocate(&allocator, properties.byte_len(), AllocatorType::Uint8)?;
            checkerboard(&mut data, properties.width as usize, phase);
            Some(Image { properties, data })
        };
        Some(StereoImageEvent {
            frame_id,
            timestamp_us,
            left: render(0)?,
            right: render(2)?,
        })
    }
}

fn checkerboard(data: &mut [u8], width: usize, phase: usize) {
    const SQUARE: usize = 24;
    for (i, px) in data.iter_mut().enumerate() {
        let (x, y) = (i % width + phase, i / width);
        *px = if (x / SQUARE + y / SQUARE) % 2 == 0 { 230 } else { 30 };
    }
}

fn synthetic_frame(frame_id: i64, timestamp_us: i64) -> TrackingFrame {
    let t = frame_id as f32 * 0.011;
    TrackingFrame {
        frame_id,
        timestamp_us,
        hands: vec![
            Hand {
                id: 1,
                hand_type: HandType::Left,
                palm_position: Vector3::new(-150.0, 180.0, 0.0),
                grab_strength: 0.0,
            },
            Hand {
                id: 2,
                hand_type: HandType::Right,
                palm_position: Vector3::new(
                    120.0 * t.cos(),
                    200.0 + 40.0 * (2.0 * t).sin(),
                    120.0 * t.sin(),
                ),
                grab_strength: 0.5 + 0.5 * (0.7 * t).sin(),
            },
        ],
    }
}

fn synthetic_head_pose(frame_id: i64, timestamp_us: i64) -> HeadPose {
    let yaw = frame_id as f32 * 0.001;
    HeadPose {
        timestamp_us,
        position: Vector3::ZERO,
        orientation: Quaternion {
            w: (yaw / 2.0).cos(),
            x: 0.0,
            y: (yaw / 2.0).sin(),
            z: 0.0,
        },
        linear_velocity: Vector3::ZERO,
        angular_velocity: Vector3::new(0.0, 0.09, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::tests::CountingAllocator;
    use crate::config::SessionConfig;
    use crate::session::{Notification, Session};
    use crate::undistort::{rectify_stereo, RectifyParams};
    use approx::assert_relative_eq;

    fn fast() -> SimConfig {
        SimConfig {
            handshake_delay: Duration::from_millis(5),
            frame_interval: Duration::from_millis(1),
            image_width: 64,
            image_height: 64,
            image_every: 2,
            map_points_every: 3,
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_camera_center_maps_to_principal_point() {
        let camera = RadialCamera::new(384, 384);
        let p = camera.rectilinear_to_pixel(Perspective::StereoLeft, Vector3::ZERO);
        assert_relative_eq!(p.x, 190.0);
        assert_relative_eq!(p.y, 192.0);
        let q = camera.rectilinear_to_pixel(Perspective::StereoRight, Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(q.x, 194.0 + 90.0 / 1.05, epsilon = 1e-3);
    }

    #[test]
    fn test_session_connects_and_streams() {
        let session = Session::open(SimulatedSensor::new(fast()), SessionConfig::default()).unwrap();
        session.wait_connected(Duration::from_secs(5)).unwrap();
        assert_eq!(session.device_info().unwrap().serial, "SIM-000001");

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut last = 0;
        while last < 20 && Instant::now() < deadline {
            if let Some(f) = session.latest_frame() {
                assert!(f.frame_id >= last);
                assert!(f.hand(HandType::Right).is_some());
                last = f.frame_id;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(last >= 20);
        session.close();
        assert!(!session.is_connected());
    }

    #[test]
    fn test_images_released_through_installed_allocator() {
        let session = Session::open(SimulatedSensor::new(fast()), SessionConfig::default()).unwrap();
        let counting = Arc::new(CountingAllocator::default());
        session.set_allocator(counting.clone()).unwrap();
        session
            .set_policy(PolicyFlags::IMAGES | PolicyFlags::MAP_POINTS, PolicyFlags::empty())
            .unwrap();
        session.wait_connected(Duration::from_secs(5)).unwrap();

        let projection = session.projection().unwrap();
        let params = RectifyParams {
            width: 32,
            height: 32,
            ..RectifyParams::default()
        };
        let mut rectified = 0;
        let mut mappings = 0;
        let deadline = Instant::now() + Duration::from_secs(5);
        while (rectified < 3 || mappings < 1) && Instant::now() < deadline {
            match session.recv_timeout(Duration::from_millis(100)) {
                Ok(Notification::Images(event)) => {
                    let (left, right) = rectify_stereo(&event, projection.as_ref(), &params).unwrap();
                    assert_eq!(left.data.len(), 32 * 32);
                    assert_eq!(right.data.len(), 32 * 32);
                    rectified += 1;
                }
                Ok(Notification::PointMappingChanged(_)) => {
                    if let Some(mapping) = session.point_mapping().unwrap() {
                        assert!(mapping.len() >= 3);
                        mappings += 1;
                    }
                }
                Ok(_) | Err(LeapError::Timeout) => {}
                Err(e) => panic!("unexpected {}", e),
            }
        }
        assert!(rectified >= 3);
        assert!(mappings >= 1);

        session.close();
        assert!(counting.allocs.load(Ordering::SeqCst) >= 7);
        assert_eq!(
            counting.allocs.load(Ordering::SeqCst),
            counting.deallocs.load(Ordering::SeqCst)
        );
        assert_eq!(counting.live(), 0);
    }

    #[test]
    fn test_close_before_handshake() {
        let config = SimConfig {
            handshake_delay: Duration::from_secs(30),
            ..fast()
        };
        let session = Session::open(SimulatedSensor::new(config), SessionConfig::default()).unwrap();
        let start = Instant::now();
        session.close();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(matches!(
            session.wait_connected(Duration::from_millis(10)),
            Err(LeapError::Closed)
        ));
    }

    #[test]
    fn test_policy_bits() {
        let mut sensor = SimulatedSensor::default();
        sensor
            .set_policy(PolicyFlags::IMAGES | PolicyFlags::MAP_POINTS, PolicyFlags::empty())
            .unwrap();
        sensor.set_policy(PolicyFlags::empty(), PolicyFlags::IMAGES).unwrap();
        assert_eq!(
            PolicyFlags::from_bits_truncate(sensor.policy.load(Ordering::SeqCst)),
            PolicyFlags::MAP_POINTS
        );
        assert!(sensor.point_mapping().unwrap().is_none());
    }

    #[test]
    fn test_wait_connected_without_deadline() {
        let session = Session::open(SimulatedSensor::new(fast()), SessionConfig::default()).unwrap();
        session.wait_connected(Duration::MAX).unwrap();
        assert!(session.is_connected());
    }

    #[test]
    fn test_failed_image_allocation_drops_event() {
        let session = Session::open(SimulatedSensor::new(fast()), SessionConfig::default()).unwrap();
        let counting = Arc::new(CountingAllocator::default());
        counting.fail.store(true, Ordering::SeqCst);
        session.set_allocator(counting.clone()).unwrap();
        session.set_policy(PolicyFlags::IMAGES, PolicyFlags::empty()).unwrap();
        session.wait_connected(Duration::from_secs(5)).unwrap();

        let deadline = Instant::now() + Duration::from_millis(100);
        while Instant::now() < deadline {
            match session.recv_timeout(Duration::from_millis(10)) {
                Ok(Notification::Images(_)) => panic!("image event without buffers"),
                Ok(_) | Err(LeapError::Timeout) => {}
                Err(e) => panic!("unexpected {}", e),
            }
        }
        // frames keep flowing while images are skipped
        assert!(session.latest_frame().is_some());

        session.close();
        assert_eq!(counting.allocs.load(Ordering::SeqCst), 0);
        assert_eq!(counting.deallocs.load(Ordering::SeqCst), 0);
        assert_eq!(counting.live(), 0);
    }

    #[test]
    fn test_point_mapping_allocation_failure() {
        let session = Session::open(SimulatedSensor::new(fast()), SessionConfig::default()).unwrap();
        session.wait_connected(Duration::from_secs(5)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.latest_frame().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(session.latest_frame().is_some());

        let counting = Arc::new(CountingAllocator::default());
        counting.fail.store(true, Ordering::SeqCst);
        session.set_allocator(counting.clone()).unwrap();
        assert!(session.last_error().is_none());

        assert!(matches!(
            session.point_mapping(),
            Err(LeapError::AllocationFailed(n)) if n > 0
        ));
        assert!(session.last_error().unwrap().contains("bytes"));
        assert_eq!(counting.live(), 0);
    }
}
