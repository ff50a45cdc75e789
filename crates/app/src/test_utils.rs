use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use soundscan_audio::{
    AudioSource, DeviceDescriptor, LogHandler, PresenceHandler, SourceError, VolumeHandler,
};
use soundscan_broker::{EnqueueError, Enqueuer, PublishError};
use soundscan_protocol::{FlowType, Request};

/// Scripted audio source: a `None` descriptor makes the query fail, and
/// registered handlers can be fired by tests to simulate native
/// notifications.
#[derive(Default)]
pub struct FakeSource {
    pub render: Mutex<Option<DeviceDescriptor>>,
    pub capture: Mutex<Option<DeviceDescriptor>>,
    pub fail_register: AtomicBool,
    pub released: AtomicUsize,
    default_render: Mutex<Option<PresenceHandler>>,
    default_capture: Mutex<Option<PresenceHandler>>,
    render_volume: Mutex<Option<VolumeHandler>>,
    capture_volume: Mutex<Option<VolumeHandler>>,
    log: Mutex<Option<LogHandler>>,
    registered: AtomicBool,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    pub fn fire_default_capture(&self, present: bool) {
        if let Some(handler) = self.default_capture.lock().as_ref() {
            handler(present);
        }
    }

    pub fn fire_capture_volume(&self) {
        if let Some(handler) = self.capture_volume.lock().as_ref() {
            handler();
        }
    }
}

impl AudioSource for FakeSource {
    fn default_render(&self) -> Result<DeviceDescriptor, SourceError> {
        self.render.lock().clone().ok_or(SourceError::QueryFailed {
            flow: FlowType::Render,
            status: -1,
        })
    }

    fn default_capture(&self) -> Result<DeviceDescriptor, SourceError> {
        self.capture.lock().clone().ok_or(SourceError::QueryFailed {
            flow: FlowType::Capture,
            status: -1,
        })
    }

    fn set_default_render_handler(&self, handler: PresenceHandler) {
        *self.default_render.lock() = Some(handler);
    }

    fn set_default_capture_handler(&self, handler: PresenceHandler) {
        *self.default_capture.lock() = Some(handler);
    }

    fn set_render_volume_handler(&self, handler: VolumeHandler) {
        *self.render_volume.lock() = Some(handler);
    }

    fn set_capture_volume_handler(&self, handler: VolumeHandler) {
        *self.capture_volume.lock() = Some(handler);
    }

    fn set_log_handler(&self, handler: LogHandler) {
        *self.log.lock() = Some(handler);
    }

    fn register_callbacks(&self) -> Result<(), SourceError> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(SourceError::RegisterFailed(-5));
        }
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records every enqueued request; optionally rejects them all to
/// exercise failure paths.
pub struct CollectingEnqueuer {
    pub requests: Mutex<Vec<Request>>,
    pub closed: AtomicUsize,
    reject: bool,
}

impl CollectingEnqueuer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            closed: AtomicUsize::new(0),
            reject: false,
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            closed: AtomicUsize::new(0),
            reject: true,
        })
    }
}

#[async_trait]
impl Enqueuer for CollectingEnqueuer {
    async fn enqueue(&self, request: Request) -> Result<(), EnqueueError> {
        if self.reject {
            return Err(EnqueueError::Publish(PublishError::NotConnected));
        }
        self.requests.lock().push(request);
        Ok(())
    }

    async fn close(&self) -> Result<(), EnqueueError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
