use std::sync::Arc;

use soundscan_audio::{AudioNotice, AudioSource};
use soundscan_broker::Enqueuer;
use soundscan_protocol::{FlowType, MessageType, PostDeviceFields, Request, VolumeChangeFields};

/// Turns one native notification (or an explicit startup query) into zero
/// or one request. Failures end here: a bad read or a failed enqueue is
/// logged and the bridge keeps running on the next notification.
pub struct EventTranslator {
    source: Arc<dyn AudioSource>,
    enqueuer: Arc<dyn Enqueuer>,
}

impl EventTranslator {
    pub fn new(source: Arc<dyn AudioSource>, enqueuer: Arc<dyn Enqueuer>) -> Self {
        Self { source, enqueuer }
    }

    pub async fn handle(&self, notice: AudioNotice) {
        match notice {
            AudioNotice::DefaultChanged { flow, present } => {
                if present {
                    self.post_default_device(flow).await;
                } else {
                    // Removal has no downstream message yet; log only.
                    tracing::info!(%flow, "Default device removed");
                }
            }
            AudioNotice::VolumeChanged { flow } => self.post_volume_change(flow).await,
        }
    }

    /// Queries the current default device for `flow` and posts a full
    /// snapshot. Emits nothing when no device is present.
    pub async fn post_default_device(&self, flow: FlowType) {
        let desc = match self.source.default_device(flow) {
            Ok(desc) => desc,
            Err(error) => {
                tracing::error!(%flow, "Default device changed, cannot read it: {}", error);
                return;
            }
        };
        if !desc.is_present() {
            tracing::info!(%flow, "No default device present");
            return;
        }

        tracing::info!(
            %flow,
            name = %desc.name,
            pnp_id = %desc.pnp_id,
            render_volume = desc.render_volume,
            capture_volume = desc.capture_volume,
            "Default device changed"
        );
        let request = Request::post_device(PostDeviceFields {
            message_type: MessageType::default_changed(flow),
            flow,
            name: desc.name,
            pnp_id: desc.pnp_id,
            render_volume: desc.render_volume,
            capture_volume: desc.capture_volume,
        });
        self.enqueue(request).await;
    }

    async fn post_volume_change(&self, flow: FlowType) {
        let desc = match self.source.default_device(flow) {
            Ok(desc) => desc,
            Err(error) => {
                tracing::error!(%flow, "Volume changed, cannot read the device: {}", error);
                return;
            }
        };
        let volume = match flow {
            FlowType::Render => desc.render_volume,
            FlowType::Capture => desc.capture_volume,
        };

        tracing::info!(
            %flow,
            name = %desc.name,
            pnp_id = %desc.pnp_id,
            volume,
            "Volume changed"
        );
        let request = Request::put_volume_change(VolumeChangeFields::new(
            MessageType::volume_changed(flow),
            volume,
            &desc.pnp_id,
        ));
        self.enqueue(request).await;
    }

    async fn enqueue(&self, request: Request) {
        if let Err(error) = self.enqueuer.enqueue(request).await {
            tracing::error!("Enqueue failed: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CollectingEnqueuer, FakeSource};
    use soundscan_audio::DeviceDescriptor;
    use soundscan_protocol::{field, RequestBody};

    fn translator(
        source: &Arc<FakeSource>,
        enqueuer: &Arc<CollectingEnqueuer>,
    ) -> EventTranslator {
        EventTranslator::new(
            Arc::clone(source) as Arc<dyn AudioSource>,
            Arc::clone(enqueuer) as Arc<dyn Enqueuer>,
        )
    }

    #[tokio::test]
    async fn empty_pnp_id_emits_nothing() {
        let source = FakeSource::new();
        *source.render.lock() = Some(DeviceDescriptor {
            name: "Ghost".to_string(),
            pnp_id: String::new(),
            render_volume: 10,
            capture_volume: 0,
        });
        let enqueuer = CollectingEnqueuer::new();
        let translator = translator(&source, &enqueuer);

        translator.post_default_device(FlowType::Render).await;
        translator
            .handle(AudioNotice::DefaultChanged {
                flow: FlowType::Render,
                present: true,
            })
            .await;

        assert!(enqueuer.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn removal_is_logged_only() {
        let source = FakeSource::new();
        let enqueuer = CollectingEnqueuer::new();
        let translator = translator(&source, &enqueuer);

        translator
            .handle(AudioNotice::DefaultChanged {
                flow: FlowType::Capture,
                present: false,
            })
            .await;

        assert!(enqueuer.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn query_failure_emits_nothing() {
        // FakeSource with no descriptor configured fails the query
        let source = FakeSource::new();
        let enqueuer = CollectingEnqueuer::new();
        let translator = translator(&source, &enqueuer);

        translator.post_default_device(FlowType::Render).await;
        translator
            .handle(AudioNotice::VolumeChanged {
                flow: FlowType::Capture,
            })
            .await;

        assert!(enqueuer.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn volume_change_carries_single_flow_volume() {
        let source = FakeSource::new();
        *source.capture.lock() = Some(DeviceDescriptor {
            name: "Mic".to_string(),
            pnp_id: "HDAUDIO\\1".to_string(),
            render_volume: 99,
            capture_volume: 10,
        });
        let enqueuer = CollectingEnqueuer::new();
        let translator = translator(&source, &enqueuer);

        translator
            .handle(AudioNotice::VolumeChanged {
                flow: FlowType::Capture,
            })
            .await;

        let requests = enqueuer.requests.lock();
        assert_eq!(requests.len(), 1);
        let fields = requests[0].wire_fields(chrono::Utc::now());
        assert_eq!(fields[field::DEVICE_MESSAGE_TYPE], "capture_volume_changed");
        assert_eq!(fields[field::VOLUME], "10");
        assert_eq!(fields[field::PNP_ID], "HDAUDIO\\1");
        assert!(!fields.contains_key(field::RENDER_VOLUME));
    }

    #[tokio::test]
    async fn volume_change_without_device_id_omits_pnp_id() {
        let source = FakeSource::new();
        *source.render.lock() = Some(DeviceDescriptor {
            name: "Speakers".to_string(),
            pnp_id: String::new(),
            render_volume: 55,
            capture_volume: 0,
        });
        let enqueuer = CollectingEnqueuer::new();
        let translator = translator(&source, &enqueuer);

        translator
            .handle(AudioNotice::VolumeChanged {
                flow: FlowType::Render,
            })
            .await;

        let requests = enqueuer.requests.lock();
        assert_eq!(requests.len(), 1);
        match requests[0].body() {
            RequestBody::VolumeChange(fields) => {
                assert_eq!(fields.volume, 55);
                assert!(fields.pnp_id.is_none());
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[tokio::test]
    async fn enqueue_failure_does_not_propagate() {
        let source = FakeSource::new();
        *source.render.lock() = Some(DeviceDescriptor {
            name: "Speakers".to_string(),
            pnp_id: "HDAUDIO\\0".to_string(),
            render_volume: 20,
            capture_volume: 0,
        });
        let enqueuer = CollectingEnqueuer::rejecting();
        let translator = translator(&source, &enqueuer);

        // must not panic or error upward
        translator.post_default_device(FlowType::Render).await;
        assert!(enqueuer.requests.lock().is_empty());
    }
}
