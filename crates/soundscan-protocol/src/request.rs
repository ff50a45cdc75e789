use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::message::{FlowType, MessageType};

pub const REQUEST_POST_DEVICE: &str = "post_device";
pub const REQUEST_PUT_VOLUME_CHANGE: &str = "put_volume_change";

/// Wire field keys. Consumers match on these exact strings.
pub mod field {
    pub const DEVICE_MESSAGE_TYPE: &str = "device_message_type";
    pub const UPDATE_DATE: &str = "update_date";
    pub const FLOW_TYPE: &str = "flow_type";
    pub const NAME: &str = "name";
    pub const PNP_ID: &str = "pnp_id";
    pub const RENDER_VOLUME: &str = "render_volume";
    pub const CAPTURE_VOLUME: &str = "capture_volume";
    pub const VOLUME: &str = "volume";
}

/// Full device snapshot for a `post_device` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDeviceFields {
    pub message_type: MessageType,
    pub flow: FlowType,
    pub name: String,
    pub pnp_id: String,
    pub render_volume: u32,
    pub capture_volume: u32,
}

/// Single-flow volume update for a `put_volume_change` request.
/// `pnp_id` is omitted on the wire when the device reported none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeChangeFields {
    pub message_type: MessageType,
    pub volume: u32,
    pub pnp_id: Option<String>,
}

impl VolumeChangeFields {
    pub fn new(message_type: MessageType, volume: u32, pnp_id: &str) -> Self {
        Self {
            message_type,
            volume,
            pnp_id: (!pnp_id.is_empty()).then(|| pnp_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    PostDevice(PostDeviceFields),
    VolumeChange(VolumeChangeFields),
}

/// A normalized event on its way to an enqueuer. The body is typed so a
/// malformed field set cannot be constructed; the string map only exists
/// at the wire boundary. `timestamp` records event detection;
/// `update_date` is stamped by the enqueuer at publish-attempt time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    body: RequestBody,
    timestamp: DateTime<Utc>,
}

impl Request {
    pub fn post_device(fields: PostDeviceFields) -> Self {
        Self {
            body: RequestBody::PostDevice(fields),
            timestamp: Utc::now(),
        }
    }

    pub fn put_volume_change(fields: VolumeChangeFields) -> Self {
        Self {
            body: RequestBody::VolumeChange(fields),
            timestamp: Utc::now(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self.body {
            RequestBody::PostDevice(_) => REQUEST_POST_DEVICE,
            RequestBody::VolumeChange(_) => REQUEST_PUT_VOLUME_CHANGE,
        }
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn message_type(&self) -> MessageType {
        match &self.body {
            RequestBody::PostDevice(f) => f.message_type,
            RequestBody::VolumeChange(f) => f.message_type,
        }
    }

    /// Renders the exact wire field map, stamping `update_date`.
    pub fn wire_fields(&self, update_date: DateTime<Utc>) -> BTreeMap<&'static str, String> {
        let update_date = update_date.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut fields = BTreeMap::new();
        match &self.body {
            RequestBody::PostDevice(f) => {
                fields.insert(field::DEVICE_MESSAGE_TYPE, f.message_type.label().to_string());
                fields.insert(field::UPDATE_DATE, update_date);
                fields.insert(field::FLOW_TYPE, f.flow.label().to_string());
                fields.insert(field::NAME, f.name.clone());
                fields.insert(field::PNP_ID, f.pnp_id.clone());
                fields.insert(field::RENDER_VOLUME, f.render_volume.to_string());
                fields.insert(field::CAPTURE_VOLUME, f.capture_volume.to_string());
            }
            RequestBody::VolumeChange(f) => {
                fields.insert(field::DEVICE_MESSAGE_TYPE, f.message_type.label().to_string());
                fields.insert(field::UPDATE_DATE, update_date);
                fields.insert(field::VOLUME, f.volume.to_string());
                if let Some(pnp_id) = &f.pnp_id {
                    fields.insert(field::PNP_ID, pnp_id.clone());
                }
            }
        }
        fields
    }

    /// Serializes the outgoing message body.
    pub fn wire_body(&self, update_date: DateTime<Utc>) -> serde_json::Result<Vec<u8>> {
        let body = WireBody {
            name: self.name(),
            fields: self.wire_fields(update_date),
        };
        serde_json::to_vec(&body)
    }
}

#[derive(Serialize)]
struct WireBody<'a> {
    name: &'a str,
    fields: BTreeMap<&'static str, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post_device_request() -> Request {
        Request::post_device(PostDeviceFields {
            message_type: MessageType::DefaultCaptureChanged,
            flow: FlowType::Capture,
            name: "Mic".to_string(),
            pnp_id: "HDAUDIO\\1".to_string(),
            render_volume: 66,
            capture_volume: 42,
        })
    }

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn post_device_has_exactly_the_seven_keys() {
        let fields = post_device_request().wire_fields(stamp());

        let keys: Vec<&str> = fields.keys().copied().collect();
        let mut expected = vec![
            field::DEVICE_MESSAGE_TYPE,
            field::UPDATE_DATE,
            field::FLOW_TYPE,
            field::NAME,
            field::PNP_ID,
            field::RENDER_VOLUME,
            field::CAPTURE_VOLUME,
        ];
        expected.sort_unstable();
        assert_eq!(keys, expected);

        assert_eq!(fields[field::DEVICE_MESSAGE_TYPE], "default_capture_changed");
        assert_eq!(fields[field::FLOW_TYPE], "capture");
        assert_eq!(fields[field::CAPTURE_VOLUME], "42");
        assert_eq!(fields[field::RENDER_VOLUME], "66");
    }

    #[test]
    fn update_date_is_rfc3339_utc() {
        let fields = post_device_request().wire_fields(stamp());
        assert_eq!(fields[field::UPDATE_DATE], "2026-03-14T09:26:53Z");
    }

    #[test]
    fn volume_change_with_pnp_id() {
        let req = Request::put_volume_change(VolumeChangeFields::new(
            MessageType::VolumeCaptureChanged,
            10,
            "HDAUDIO\\1",
        ));
        let fields = req.wire_fields(stamp());

        let keys: Vec<&str> = fields.keys().copied().collect();
        let mut expected = vec![
            field::DEVICE_MESSAGE_TYPE,
            field::UPDATE_DATE,
            field::VOLUME,
            field::PNP_ID,
        ];
        expected.sort_unstable();
        assert_eq!(keys, expected);

        assert_eq!(fields[field::DEVICE_MESSAGE_TYPE], "capture_volume_changed");
        assert_eq!(fields[field::VOLUME], "10");
        assert_eq!(fields[field::PNP_ID], "HDAUDIO\\1");
    }

    #[test]
    fn volume_change_omits_empty_pnp_id() {
        let req = Request::put_volume_change(VolumeChangeFields::new(
            MessageType::VolumeRenderChanged,
            55,
            "",
        ));
        let fields = req.wire_fields(stamp());

        assert!(!fields.contains_key(field::PNP_ID));
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn request_names() {
        assert_eq!(post_device_request().name(), "post_device");
        let req = Request::put_volume_change(VolumeChangeFields::new(
            MessageType::VolumeRenderChanged,
            0,
            "",
        ));
        assert_eq!(req.name(), "put_volume_change");
    }

    #[test]
    fn wire_body_is_a_named_json_object() {
        let body = post_device_request().wire_body(stamp()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["name"], "post_device");
        assert_eq!(value["fields"]["device_message_type"], "default_capture_changed");
        assert_eq!(value["fields"]["name"], "Mic");
        assert!(value["fields"].as_object().unwrap().len() == 7);
    }
}
