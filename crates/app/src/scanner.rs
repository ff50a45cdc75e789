use std::sync::Arc;

use tokio::sync::mpsc;

use soundscan_audio::{AudioNotice, AudioSource, NativeLogLevel};
use soundscan_broker::Enqueuer;
use soundscan_foundation::{AppError, ScannerState, ShutdownGuard, StateMachine};
use soundscan_protocol::FlowType;

use crate::translator::EventTranslator;

/// Bound on notices queued between native callback threads and the event
/// loop. Overflow drops the notice; the next notification re-reads
/// current state anyway.
const NOTICE_CAPACITY: usize = 64;

/// Orchestrates the bridge: acquires callbacks on the native source,
/// posts the initial device snapshots, then reacts to notifications
/// until the lifecycle host cancels. Terminal once stopped; a new
/// instance is required to run again.
pub struct ScannerService {
    source: Arc<dyn AudioSource>,
    enqueuer: Arc<dyn Enqueuer>,
    state: StateMachine,
}

impl ScannerService {
    pub fn new(source: Arc<dyn AudioSource>, enqueuer: Arc<dyn Enqueuer>) -> Self {
        Self {
            source,
            enqueuer,
            state: StateMachine::new(),
        }
    }

    pub fn state(&self) -> ScannerState {
        self.state.current()
    }

    pub async fn run(&self, shutdown: &ShutdownGuard) -> Result<(), AppError> {
        self.state.transition(ScannerState::Starting)?;

        let (notice_tx, mut notice_rx) = mpsc::channel(NOTICE_CAPACITY);
        install_handlers(self.source.as_ref(), notice_tx);
        if let Err(error) = self.source.register_callbacks() {
            tracing::error!("Callback registration failed: {}", error);
            self.source.release();
            if let Err(close_error) = self.enqueuer.close().await {
                tracing::error!("Enqueuer close failed: {}", close_error);
            }
            self.state.transition(ScannerState::Stopped)?;
            return Err(error.into());
        }

        self.state.transition(ScannerState::Running)?;
        let translator =
            EventTranslator::new(Arc::clone(&self.source), Arc::clone(&self.enqueuer));

        // Post the current defaults so consumers start from a known state.
        // Failures here are logged by the translator; the service keeps
        // waiting for future notifications.
        translator.post_default_device(FlowType::Render).await;
        translator.post_default_device(FlowType::Capture).await;

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                notice = notice_rx.recv() => match notice {
                    Some(notice) => translator.handle(notice).await,
                    None => break,
                },
            }
        }

        self.shutdown().await
    }

    async fn shutdown(&self) -> Result<(), AppError> {
        if matches!(
            self.state.current(),
            ScannerState::ShuttingDown | ScannerState::Stopped
        ) {
            return Ok(());
        }

        self.state.transition(ScannerState::ShuttingDown)?;
        self.source.release();
        if let Err(error) = self.enqueuer.close().await {
            tracing::error!("Enqueuer close failed: {}", error);
        }
        self.state.transition(ScannerState::Stopped)?;
        tracing::info!("Scanner stopped");
        Ok(())
    }
}

/// Wires the native callbacks to the notice channel and bridges native
/// log lines into tracing. Callbacks run on threads owned by the native
/// subsystem, so they only hand off and return.
fn install_handlers(source: &dyn AudioSource, notices: mpsc::Sender<AudioNotice>) {
    let tx = notices.clone();
    source.set_default_render_handler(Box::new(move |present| {
        forward(
            &tx,
            AudioNotice::DefaultChanged {
                flow: FlowType::Render,
                present,
            },
        );
    }));

    let tx = notices.clone();
    source.set_default_capture_handler(Box::new(move |present| {
        forward(
            &tx,
            AudioNotice::DefaultChanged {
                flow: FlowType::Capture,
                present,
            },
        );
    }));

    let tx = notices.clone();
    source.set_render_volume_handler(Box::new(move || {
        forward(
            &tx,
            AudioNotice::VolumeChanged {
                flow: FlowType::Render,
            },
        );
    }));

    let tx = notices;
    source.set_capture_volume_handler(Box::new(move || {
        forward(
            &tx,
            AudioNotice::VolumeChanged {
                flow: FlowType::Capture,
            },
        );
    }));

    source.set_log_handler(Box::new(|level, message| match level {
        NativeLogLevel::Debug => tracing::debug!(target: "native", "{}", message),
        NativeLogLevel::Info => tracing::info!(target: "native", "{}", message),
        NativeLogLevel::Warn => tracing::warn!(target: "native", "{}", message),
        NativeLogLevel::Error => tracing::error!(target: "native", "{}", message),
    }));
}

fn forward(tx: &mpsc::Sender<AudioNotice>, notice: AudioNotice) {
    if tx.try_send(notice).is_err() {
        tracing::warn!(?notice, "Notice channel full, dropping notification");
    }
}
