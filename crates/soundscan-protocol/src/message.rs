use std::fmt;

/// Message kinds this service emits. The wire codes live in a protocol
/// shared with other device scanners; codes 3-6 belong to this service.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    VolumeRenderChanged = 3,
    VolumeCaptureChanged = 4,
    DefaultRenderChanged = 5,
    DefaultCaptureChanged = 6,
}

impl MessageType {
    pub fn wire_code(self) -> u8 {
        self as u8
    }

    /// Stable label carried in the `device_message_type` field.
    pub fn label(self) -> &'static str {
        match self {
            MessageType::VolumeRenderChanged => "render_volume_changed",
            MessageType::VolumeCaptureChanged => "capture_volume_changed",
            MessageType::DefaultRenderChanged => "default_render_changed",
            MessageType::DefaultCaptureChanged => "default_capture_changed",
        }
    }

    pub fn default_changed(flow: FlowType) -> Self {
        match flow {
            FlowType::Render => MessageType::DefaultRenderChanged,
            FlowType::Capture => MessageType::DefaultCaptureChanged,
        }
    }

    pub fn volume_changed(flow: FlowType) -> Self {
        match flow {
            FlowType::Render => MessageType::VolumeRenderChanged,
            FlowType::Capture => MessageType::VolumeCaptureChanged,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Audio direction: render (playback) or capture (recording).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowType {
    Render,
    Capture,
}

impl FlowType {
    pub fn label(self) -> &'static str {
        match self {
            FlowType::Render => "render",
            FlowType::Capture => "capture",
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_match_shared_protocol() {
        assert_eq!(MessageType::VolumeRenderChanged.wire_code(), 3);
        assert_eq!(MessageType::VolumeCaptureChanged.wire_code(), 4);
        assert_eq!(MessageType::DefaultRenderChanged.wire_code(), 5);
        assert_eq!(MessageType::DefaultCaptureChanged.wire_code(), 6);
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(
            MessageType::DefaultCaptureChanged.label(),
            "default_capture_changed"
        );
        assert_eq!(
            MessageType::VolumeCaptureChanged.label(),
            "capture_volume_changed"
        );
        assert_eq!(
            MessageType::DefaultRenderChanged.label(),
            "default_render_changed"
        );
        assert_eq!(
            MessageType::VolumeRenderChanged.label(),
            "render_volume_changed"
        );
    }

    #[test]
    fn flow_selects_message_type() {
        assert_eq!(
            MessageType::default_changed(FlowType::Render),
            MessageType::DefaultRenderChanged
        );
        assert_eq!(
            MessageType::volume_changed(FlowType::Capture),
            MessageType::VolumeCaptureChanged
        );
    }

    #[test]
    fn flow_labels() {
        assert_eq!(FlowType::Render.label(), "render");
        assert_eq!(FlowType::Capture.to_string(), "capture");
    }
}
