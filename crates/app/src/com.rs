use anyhow::Context;
use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};

/// Process-scoped COM initialization. Notifications arrive on native
/// worker threads, so the multithreaded apartment is required.
pub struct ComGuard(());

impl ComGuard {
    pub fn initialize() -> anyhow::Result<Self> {
        unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) }
            .ok()
            .context("COM initialization failed")?;
        Ok(Self(()))
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe { CoUninitialize() };
    }
}
