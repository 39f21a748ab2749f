use crate::alloc::{Allocator, SystemAllocator};
use crate::backend::{Backend, Projection};
use crate::config::SessionConfig;
use crate::types::{
    DeviceInfo, HeadPose, LogMessage, PointMapping, PointMappingChange, PolicyFlags,
    StereoImageEvent, TrackingFrame,
};
use crate::{LeapError, Result};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything a backend can report.
#[derive(Debug)]
pub enum Event {
    /// Handshake with the service completed.
    Connected,
    DeviceFound(DeviceInfo),
    Tracking(TrackingFrame),
    Images(StereoImageEvent),
    PointMappingChanged(PointMappingChange),
    Log(LogMessage),
    HeadPose(HeadPose),
}

/// Events forwarded to the consumer as-is, without being cached.
#[derive(Debug)]
pub enum Notification {
    Log(LogMessage),
    HeadPose(HeadPose),
    PointMappingChanged(PointMappingChange),
    Images(StereoImageEvent),
}

#[derive(Default)]
struct State {
    closed: bool,
    connected: bool,
    latest_frame: Option<Arc<TrackingFrame>>,
    device: Option<DeviceInfo>,
    last_error: Option<String>,
}

struct Shared {
    state: Mutex<State>,
    connected_cv: Condvar,
    notifications: Sender<Notification>,
    frame_log_interval: i64,
}

/// Producer half handed to the backend.
///
/// Delivery never blocks on the consumer: cached entities are replaced under a
/// short lock and forwarded notifications are dropped when the queue is full.
#[derive(Clone)]
pub struct EventSink {
    shared: Arc<Shared>,
}

impl EventSink {
    /// Deliver one event. Returns `false` if the event was discarded (session
    /// closed, stale frame, or full queue); any buffers it owned are released.
    pub fn deliver(&self, event: Event) -> bool {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.closed {
            log::trace!("Session closed, discarding event");
            return false;
        }

        match event {
            Event::Connected => {
                state.connected = true;
                drop(state);
                shared.connected_cv.notify_all();
                log::info!("Connected");
                true
            }
            Event::DeviceFound(info) => {
                let serial = info.serial.clone();
                state.device = Some(info);
                drop(state);
                log::info!("Found device {}", serial);
                true
            }
            Event::Tracking(frame) => {
                if let Some(latest) = &state.latest_frame {
                    if frame.frame_id <= latest.frame_id {
                        log::trace!(
                            "Dropping stale frame {} (latest {})",
                            frame.frame_id,
                            latest.frame_id
                        );
                        return false;
                    }
                }
                let frame_id = frame.frame_id;
                let hands = frame.hands.len();
                state.latest_frame = Some(Arc::new(frame));
                drop(state);
                if shared.frame_log_interval > 0 && frame_id % shared.frame_log_interval == 0 {
                    log::debug!("Frame {} with {} hands", frame_id, hands);
                }
                true
            }
            Event::Log(msg) => {
                let level = msg.severity.level();
                let severity = msg.severity.as_str();
                let timestamp_us = msg.timestamp_us;
                let text = log::log_enabled!(level).then(|| msg.message.clone());
                let sent = Self::forward(shared, Notification::Log(msg));
                drop(state);
                if let Some(text) = text {
                    log::log!(level, "[{}][{}] {}", severity, timestamp_us, text);
                }
                sent
            }
            Event::HeadPose(pose) => Self::forward(shared, Notification::HeadPose(pose)),
            Event::PointMappingChanged(change) => {
                Self::forward(shared, Notification::PointMappingChanged(change))
            }
            Event::Images(images) => Self::forward(shared, Notification::Images(images)),
        }
    }

    /// Sent while the state lock is held so nothing is queued after close.
    fn forward(shared: &Shared, notification: Notification) -> bool {
        match shared.notifications.try_send(notification) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => {
                log::trace!("Notification queue full, dropping notification");
                false
            }
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn connected(&self) -> bool {
        self.deliver(Event::Connected)
    }

    pub fn device_found(&self, info: DeviceInfo) -> bool {
        self.deliver(Event::DeviceFound(info))
    }

    pub fn frame(&self, frame: TrackingFrame) -> bool {
        self.deliver(Event::Tracking(frame))
    }

    pub fn images(&self, images: StereoImageEvent) -> bool {
        self.deliver(Event::Images(images))
    }

    /// True once the owning session has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

/// Live connection to the tracking service.
///
/// Owns the backend for its whole lifetime. The backend delivers events from
/// its own thread; the consumer polls [`latest_frame`](Self::latest_frame) and
/// drains [`Notification`]s. Dropping the session closes it.
pub struct Session {
    shared: Arc<Shared>,
    receiver: Receiver<Notification>,
    backend: Mutex<Box<dyn Backend>>,
    policy: Mutex<PolicyFlags>,
    config: SessionConfig,
}

impl Session {
    /// Start connecting through `backend`. Returns as soon as the backend has
    /// started; use [`wait_connected`](Self::wait_connected) or
    /// [`is_connected`](Self::is_connected) before relying on device data.
    pub fn open<B: Backend + 'static>(backend: B, config: SessionConfig) -> Result<Session> {
        let (sender, receiver) = crossbeam_channel::bounded(config.event_capacity.max(1));
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            connected_cv: Condvar::new(),
            notifications: sender,
            frame_log_interval: i64::try_from(config.frame_log_interval).unwrap_or(i64::MAX),
        });

        let mut backend: Box<dyn Backend> = Box::new(backend);
        backend
            .set_allocator(Arc::new(SystemAllocator))
            .map_err(|e| LeapError::TransportInit(format!("Failed to install allocator: {}", e)))?;

        let sink = EventSink {
            shared: Arc::clone(&shared),
        };
        if let Err(e) = backend.open(sink) {
            shared.state.lock().closed = true;
            log::error!("Failed to open connection: {}", e);
            return Err(match e {
                LeapError::TransportInit(msg) => LeapError::TransportInit(msg),
                other => LeapError::TransportInit(other.to_string()),
            });
        }
        log::info!("Session opened, waiting for handshake");

        let session = Session {
            shared,
            receiver,
            backend: Mutex::new(backend),
            policy: Mutex::new(PolicyFlags::empty()),
            config,
        };

        if !session.config.policy.is_empty() {
            session.set_policy(session.config.policy, PolicyFlags::empty())?;
        }

        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// True once the handshake completed and until close.
    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().connected
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Block until connected, the session closes, or `timeout` elapses.
    pub fn wait_connected(&self, timeout: Duration) -> Result<()> {
        // None when the timeout is too large to represent: wait without a deadline.
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.shared.state.lock();
        loop {
            if state.closed {
                return Err(LeapError::Closed);
            }
            if state.connected {
                return Ok(());
            }
            let Some(deadline) = deadline else {
                self.shared.connected_cv.wait(&mut state);
                continue;
            };
            if self
                .shared
                .connected_cv
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return if state.connected && !state.closed {
                    Ok(())
                } else {
                    Err(LeapError::ConnectTimeout(timeout))
                };
            }
        }
    }

    /// Most recent tracking frame, or `None` before the first one.
    pub fn latest_frame(&self) -> Option<Arc<TrackingFrame>> {
        self.shared.state.lock().latest_frame.clone()
    }

    /// Device reported by the service, or `None` before discovery.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.shared.state.lock().device.clone()
    }

    /// Message of the last failed backend call.
    pub fn last_error(&self) -> Option<String> {
        self.shared.state.lock().last_error.clone()
    }

    /// Policy flags requested so far. The service applies them asynchronously.
    pub fn policy(&self) -> PolicyFlags {
        *self.policy.lock()
    }

    /// Enable `set` and disable `clear`. No confirmation is awaited.
    pub fn set_policy(&self, set: PolicyFlags, clear: PolicyFlags) -> Result<()> {
        self.ensure_open()?;
        self.with_backend(|b| b.set_policy(set, clear))?;
        let mut policy = self.policy.lock();
        *policy = (*policy | set) - clear;
        log::info!("Requested policy {:?}", *policy);
        Ok(())
    }

    /// Install the allocator used for every later image and point-mapping buffer.
    /// Buffers already handed out keep releasing through their own allocator.
    pub fn set_allocator(&self, allocator: Arc<dyn Allocator>) -> Result<()> {
        self.ensure_open()?;
        self.with_backend(|b| b.set_allocator(allocator))
    }

    /// Fetch the current point mapping. Released when the returned value drops.
    pub fn point_mapping(&self) -> Result<Option<PointMapping>> {
        self.ensure_open()?;
        self.with_backend(|b| b.point_mapping())
    }

    /// Camera model of the connected device.
    pub fn projection(&self) -> Result<Arc<dyn Projection>> {
        self.ensure_open()?;
        Ok(self.backend.lock().projection())
    }

    /// Try to receive a notification without blocking.
    pub fn try_recv(&self) -> Option<Notification> {
        self.receiver.try_recv().ok()
    }

    /// Receive a notification with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Notification> {
        if self.is_closed() {
            return Err(LeapError::StreamStopped);
        }
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => LeapError::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => LeapError::StreamStopped,
        })
    }

    /// Receive the next notification, or `StreamStopped` once closed.
    pub fn recv(&self) -> Result<Notification> {
        loop {
            match self.recv_timeout(self.config.poll_interval) {
                Err(LeapError::Timeout) => continue,
                other => return other,
            }
        }
    }

    /// Tear down the connection. Safe to call repeatedly and from any thread;
    /// later calls are no-ops. Queued notifications are dropped, which releases
    /// their buffers.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.connected = false;
        }
        self.shared.connected_cv.notify_all();

        self.backend.lock().close();

        let discarded = self.receiver.try_iter().count();
        log::info!("Session closed ({} pending notifications discarded)", discarded);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(LeapError::Closed)
        } else {
            Ok(())
        }
    }

    fn with_backend<T>(&self, f: impl FnOnce(&mut dyn Backend) -> Result<T>) -> Result<T> {
        let result = f(&mut **self.backend.lock());
        if let Err(e) = &result {
            log::warn!("Backend call failed: {}", e);
            self.shared.state.lock().last_error = Some(e.to_string());
        }
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
