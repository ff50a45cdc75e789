/// Snapshot of a default device at query time. Never cached: the native
/// source is the source of truth and may change between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: String,
    /// Plug-and-play hardware id; empty means no device present.
    pub pnp_id: String,
    pub render_volume: u32,
    pub capture_volume: u32,
}

impl DeviceDescriptor {
    pub fn is_present(&self) -> bool {
        !self.pnp_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pnp_id_means_no_device() {
        let desc = DeviceDescriptor {
            name: String::new(),
            pnp_id: String::new(),
            render_volume: 0,
            capture_volume: 0,
        };
        assert!(!desc.is_present());

        let desc = DeviceDescriptor {
            name: "Speakers".to_string(),
            pnp_id: "HDAUDIO\\0".to_string(),
            render_volume: 30,
            capture_volume: 0,
        };
        assert!(desc.is_present());
    }
}
