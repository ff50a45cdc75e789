use std::sync::Arc;

use thiserror::Error;

use soundscan_foundation::AppError;
use soundscan_protocol::FlowType;

use crate::device::DeviceDescriptor;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Native library initialization failed (status {0})")]
    InitFailed(i32),

    #[error("Callback registration failed (status {0})")]
    RegisterFailed(i32),

    #[error("Default {flow} device query failed (status {status})")]
    QueryFailed { flow: FlowType, status: i32 },

    #[error("Application identity contains a NUL byte")]
    Identity(#[from] std::ffi::NulError),

    #[error("Source already released")]
    Released,

    #[error("No native audio backend on this platform")]
    Unsupported,
}

impl From<SourceError> for AppError {
    fn from(err: SourceError) -> Self {
        AppError::Source(err.to_string())
    }
}

/// Normalized native notification, handed from callback threads to the
/// scanner's event loop. Carries no device data: the receiver re-queries
/// current state, so a stale notice cannot publish stale fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioNotice {
    DefaultChanged { flow: FlowType, present: bool },
    VolumeChanged { flow: FlowType },
}

/// Severity of a log line bridged out of the native backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeLogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

pub type PresenceHandler = Box<dyn Fn(bool) + Send + Sync>;
pub type VolumeHandler = Box<dyn Fn() + Send + Sync>;
pub type LogHandler = Box<dyn Fn(NativeLogLevel, &str) + Send + Sync>;

/// Capability exposed by the native audio subsystem: default-device
/// snapshots plus change subscriptions. One acquisition per process
/// lifetime; `release` is idempotent and also runs on drop. Handlers may
/// be invoked concurrently on threads owned by the native subsystem.
pub trait AudioSource: Send + Sync {
    fn default_render(&self) -> Result<DeviceDescriptor, SourceError>;
    fn default_capture(&self) -> Result<DeviceDescriptor, SourceError>;

    fn set_default_render_handler(&self, handler: PresenceHandler);
    fn set_default_capture_handler(&self, handler: PresenceHandler);
    fn set_render_volume_handler(&self, handler: VolumeHandler);
    fn set_capture_volume_handler(&self, handler: VolumeHandler);
    fn set_log_handler(&self, handler: LogHandler);

    /// Arms the notification callbacks registered above.
    fn register_callbacks(&self) -> Result<(), SourceError>;

    fn release(&self);

    fn default_device(&self, flow: FlowType) -> Result<DeviceDescriptor, SourceError> {
        match flow {
            FlowType::Render => self.default_render(),
            FlowType::Capture => self.default_capture(),
        }
    }
}

impl std::fmt::Debug for dyn AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn AudioSource")
    }
}

/// Acquires the platform's native audio source. Off Windows there is no
/// backend and acquisition fails with `Unsupported`.
#[cfg(windows)]
pub fn acquire_native(app_name: &str, version: &str) -> Result<Arc<dyn AudioSource>, SourceError> {
    let source = crate::native::NativeSource::acquire(app_name, version)?;
    Ok(Arc::new(source))
}

#[cfg(not(windows))]
pub fn acquire_native(
    _app_name: &str,
    _version: &str,
) -> Result<Arc<dyn AudioSource>, SourceError> {
    Err(SourceError::Unsupported)
}
