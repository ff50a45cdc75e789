//! Binding to the vendor sound-scanner library. The library owns all
//! COM/WASAPI concerns; this module only marshals calls and callbacks.
//! Panics must not unwind across the FFI boundary, so every trampoline
//! runs the installed handler under `catch_unwind`.

use std::ffi::{c_char, c_int, c_longlong, c_void, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use soundscan_protocol::FlowType;

use crate::device::DeviceDescriptor;
use crate::source::{
    AudioSource, LogHandler, NativeLogLevel, PresenceHandler, SourceError, VolumeHandler,
};

const SWS_OK: c_int = 0;
const NAME_CAP: usize = 512;

#[repr(C)]
struct SwsDescriptor {
    name: [c_char; NAME_CAP],
    pnp_id: [c_char; NAME_CAP],
    render_volume: c_int,
    capture_volume: c_int,
}

impl SwsDescriptor {
    fn zeroed() -> Self {
        Self {
            name: [0; NAME_CAP],
            pnp_id: [0; NAME_CAP],
            render_volume: 0,
            capture_volume: 0,
        }
    }
}

type PresenceCallback = unsafe extern "C" fn(ctx: *mut c_void, present: c_int);
type VolumeCallback = unsafe extern "C" fn(ctx: *mut c_void);
type LogCallback =
    unsafe extern "C" fn(ctx: *mut c_void, timestamp_ms: c_longlong, level: c_int, message: *const c_char);

#[link(name = "sound_win_scanner")]
extern "C" {
    fn sws_initialize(app_name: *const c_char, version: *const c_char, out: *mut *mut c_void) -> c_int;
    fn sws_uninitialize(handle: *mut c_void) -> c_int;
    fn sws_get_default_render(handle: *mut c_void, out: *mut SwsDescriptor) -> c_int;
    fn sws_get_default_capture(handle: *mut c_void, out: *mut SwsDescriptor) -> c_int;
    fn sws_register_callbacks(handle: *mut c_void) -> c_int;
    fn sws_set_default_render_handler(handle: *mut c_void, cb: PresenceCallback, ctx: *mut c_void);
    fn sws_set_default_capture_handler(handle: *mut c_void, cb: PresenceCallback, ctx: *mut c_void);
    fn sws_set_render_volume_handler(handle: *mut c_void, cb: VolumeCallback, ctx: *mut c_void);
    fn sws_set_capture_volume_handler(handle: *mut c_void, cb: VolumeCallback, ctx: *mut c_void);
    fn sws_set_log_handler(handle: *mut c_void, cb: LogCallback, ctx: *mut c_void);
}

#[derive(Default)]
struct Handlers {
    default_render: Mutex<Option<PresenceHandler>>,
    default_capture: Mutex<Option<PresenceHandler>>,
    render_volume: Mutex<Option<VolumeHandler>>,
    capture_volume: Mutex<Option<VolumeHandler>>,
    log: Mutex<Option<LogHandler>>,
}

/// The process-wide native source. `release` detaches the library exactly
/// once; the handler table outlives the handle so a callback racing the
/// release finds an empty slot instead of freed memory.
pub struct NativeSource {
    handle: AtomicPtr<c_void>,
    handlers: Arc<Handlers>,
}

// The vendor library serializes access to the handle internally and the
// handle itself is an opaque token.
unsafe impl Send for NativeSource {}
unsafe impl Sync for NativeSource {}

impl NativeSource {
    pub fn acquire(app_name: &str, version: &str) -> Result<Self, SourceError> {
        let app_name = CString::new(app_name)?;
        let version = CString::new(version)?;

        let mut handle: *mut c_void = ptr::null_mut();
        let status = unsafe { sws_initialize(app_name.as_ptr(), version.as_ptr(), &mut handle) };
        if status != SWS_OK || handle.is_null() {
            return Err(SourceError::InitFailed(status));
        }

        tracing::info!("Native audio source acquired");
        Ok(Self {
            handle: AtomicPtr::new(handle),
            handlers: Arc::new(Handlers::default()),
        })
    }

    fn handle(&self) -> Result<*mut c_void, SourceError> {
        let handle = self.handle.load(Ordering::Acquire);
        if handle.is_null() {
            return Err(SourceError::Released);
        }
        Ok(handle)
    }

    fn ctx(&self) -> *mut c_void {
        Arc::as_ptr(&self.handlers) as *mut c_void
    }

    fn query(&self, flow: FlowType) -> Result<DeviceDescriptor, SourceError> {
        let handle = self.handle()?;
        let mut raw = SwsDescriptor::zeroed();
        let status = unsafe {
            match flow {
                FlowType::Render => sws_get_default_render(handle, &mut raw),
                FlowType::Capture => sws_get_default_capture(handle, &mut raw),
            }
        };
        if status != SWS_OK {
            return Err(SourceError::QueryFailed { flow, status });
        }

        Ok(DeviceDescriptor {
            name: buffer_to_string(&raw.name),
            pnp_id: buffer_to_string(&raw.pnp_id),
            render_volume: raw.render_volume.max(0) as u32,
            capture_volume: raw.capture_volume.max(0) as u32,
        })
    }
}

impl AudioSource for NativeSource {
    fn default_render(&self) -> Result<DeviceDescriptor, SourceError> {
        self.query(FlowType::Render)
    }

    fn default_capture(&self) -> Result<DeviceDescriptor, SourceError> {
        self.query(FlowType::Capture)
    }

    fn set_default_render_handler(&self, handler: PresenceHandler) {
        *self.handlers.default_render.lock() = Some(handler);
    }

    fn set_default_capture_handler(&self, handler: PresenceHandler) {
        *self.handlers.default_capture.lock() = Some(handler);
    }

    fn set_render_volume_handler(&self, handler: VolumeHandler) {
        *self.handlers.render_volume.lock() = Some(handler);
    }

    fn set_capture_volume_handler(&self, handler: VolumeHandler) {
        *self.handlers.capture_volume.lock() = Some(handler);
    }

    fn set_log_handler(&self, handler: LogHandler) {
        *self.handlers.log.lock() = Some(handler);
    }

    fn register_callbacks(&self) -> Result<(), SourceError> {
        let handle = self.handle()?;
        let ctx = self.ctx();
        unsafe {
            sws_set_default_render_handler(handle, on_default_render, ctx);
            sws_set_default_capture_handler(handle, on_default_capture, ctx);
            sws_set_render_volume_handler(handle, on_render_volume, ctx);
            sws_set_capture_volume_handler(handle, on_capture_volume, ctx);
            sws_set_log_handler(handle, on_log, ctx);
        }

        let status = unsafe { sws_register_callbacks(handle) };
        if status != SWS_OK {
            return Err(SourceError::RegisterFailed(status));
        }
        Ok(())
    }

    fn release(&self) {
        let handle = self.handle.swap(ptr::null_mut(), Ordering::AcqRel);
        if handle.is_null() {
            return;
        }

        let status = unsafe { sws_uninitialize(handle) };
        if status != SWS_OK {
            tracing::warn!("Native source uninitialize returned status {}", status);
        } else {
            tracing::info!("Native audio source released");
        }
    }
}

impl Drop for NativeSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn buffer_to_string(buffer: &[c_char]) -> String {
    // The library NUL-terminates; guard against a full buffer anyway.
    let bytes: &[u8] = unsafe { &*(buffer as *const [c_char] as *const [u8]) };
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).into_owned()
}

fn with_handlers(ctx: *mut c_void, run: impl FnOnce(&Handlers)) {
    if ctx.is_null() {
        return;
    }
    let handlers = unsafe { &*(ctx as *const Handlers) };
    if panic::catch_unwind(AssertUnwindSafe(|| run(handlers))).is_err() {
        tracing::error!("Panic in native notification handler");
    }
}

unsafe extern "C" fn on_default_render(ctx: *mut c_void, present: c_int) {
    with_handlers(ctx, |h| {
        if let Some(handler) = h.default_render.lock().as_ref() {
            handler(present != 0);
        }
    });
}

unsafe extern "C" fn on_default_capture(ctx: *mut c_void, present: c_int) {
    with_handlers(ctx, |h| {
        if let Some(handler) = h.default_capture.lock().as_ref() {
            handler(present != 0);
        }
    });
}

unsafe extern "C" fn on_render_volume(ctx: *mut c_void) {
    with_handlers(ctx, |h| {
        if let Some(handler) = h.render_volume.lock().as_ref() {
            handler();
        }
    });
}

unsafe extern "C" fn on_capture_volume(ctx: *mut c_void) {
    with_handlers(ctx, |h| {
        if let Some(handler) = h.capture_volume.lock().as_ref() {
            handler();
        }
    });
}

unsafe extern "C" fn on_log(ctx: *mut c_void, _timestamp_ms: c_longlong, level: c_int, message: *const c_char) {
    if message.is_null() {
        return;
    }
    let text = CStr::from_ptr(message).to_string_lossy();
    let level = match level {
        0 => NativeLogLevel::Debug,
        1 => NativeLogLevel::Info,
        2 => NativeLogLevel::Warn,
        _ => NativeLogLevel::Error,
    };
    with_handlers(ctx, |h| {
        if let Some(handler) = h.log.lock().as_ref() {
            handler(level, &text);
        }
    });
}
