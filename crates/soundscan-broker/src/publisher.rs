use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::BrokerConfig;

/// Upper bound on a single publish, broker confirm included.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
/// Grace period for releasing broker resources on close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

const BACKOFF_INITIAL: Duration = Duration::from_millis(500);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Not connected to broker")]
    NotConnected,

    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("Broker rejected the message")]
    Nack,

    #[error("Broker error: {0}")]
    Broker(#[from] lapin::Error),
}

pub(crate) type DropSignal = Box<dyn Fn() + Send + Sync>;

/// One established session with the broker: a confirm-mode channel over
/// a dedicated connection, with the exchange/queue topology declared.
#[async_trait]
pub(crate) trait AmqpTransport: Send + Sync {
    async fn publish(&self, payload: &[u8]) -> Result<(), PublishError>;
    async fn close(&self);
}

#[async_trait]
pub(crate) trait AmqpConnector: Send + Sync {
    async fn connect(&self, on_drop: DropSignal) -> Result<Box<dyn AmqpTransport>, PublishError>;
}

struct LapinTransport {
    connection: Connection,
    channel: Channel,
    exchange: String,
    routing_key: String,
}

#[async_trait]
impl AmqpTransport for LapinTransport {
    async fn publish(&self, payload: &[u8]) -> Result<(), PublishError> {
        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2),
            )
            .await?
            .await?;

        match confirm {
            Confirmation::Nack(_) => Err(PublishError::Nack),
            _ => Ok(()),
        }
    }

    async fn close(&self) {
        if let Err(e) = self.channel.close(200, "shutting down").await {
            tracing::debug!("Channel close failed: {}", e);
        }
        if let Err(e) = self.connection.close(200, "shutting down").await {
            tracing::debug!("Connection close failed: {}", e);
        }
    }
}

struct LapinConnector {
    config: BrokerConfig,
}

#[async_trait]
impl AmqpConnector for LapinConnector {
    async fn connect(&self, on_drop: DropSignal) -> Result<Box<dyn AmqpTransport>, PublishError> {
        let cfg = &self.config;
        let connection =
            Connection::connect(&cfg.amqp_uri(), ConnectionProperties::default()).await?;
        connection.on_error(move |error| {
            tracing::warn!("Broker connection error: {}", error);
            on_drop();
        });

        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        channel
            .exchange_declare(
                &cfg.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_declare(
                &cfg.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                &cfg.queue,
                &cfg.exchange,
                &cfg.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(
            exchange = %cfg.exchange,
            queue = %cfg.queue,
            routing_key = %cfg.routing_key,
            "Connected to broker"
        );
        Ok(Box::new(LapinTransport {
            connection,
            channel,
            exchange: cfg.exchange.clone(),
            routing_key: cfg.routing_key.clone(),
        }))
    }
}

struct Inner {
    connector: Box<dyn AmqpConnector>,
    transport: RwLock<Option<Box<dyn AmqpTransport>>>,
    connected: AtomicBool,
    lost: Notify,
    closing: AtomicBool,
}

impl Inner {
    fn mark_lost(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            self.lost.notify_one();
        }
    }

    fn drop_signal(inner: &Arc<Inner>) -> DropSignal {
        let weak: Weak<Inner> = Arc::downgrade(inner);
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.mark_lost();
            }
        })
    }

    /// Re-establishes the session with exponential backoff. Runs until
    /// it succeeds or the publisher is closing.
    async fn reconnect(inner: &Arc<Inner>) {
        let mut backoff = Backoff::new();
        while !inner.closing.load(Ordering::Acquire) {
            match inner.connector.connect(Inner::drop_signal(inner)).await {
                Ok(transport) => {
                    *inner.transport.write().await = Some(transport);
                    inner.connected.store(true, Ordering::Release);
                    tracing::info!("Broker connection restored");
                    return;
                }
                Err(error) => {
                    let delay = backoff.next_delay();
                    tracing::warn!("Broker reconnect failed: {}; retrying in {:?}", error, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn run_monitor(self: Arc<Self>) {
        loop {
            self.lost.notified().await;
            if self.closing.load(Ordering::Acquire) {
                return;
            }
            tracing::warn!("Broker connection lost; reconnecting");
            Inner::reconnect(&self).await;
        }
    }
}

/// Owns the broker connection lifecycle. Publishes fail fast while the
/// connection is down; a background task restores it with bounded
/// exponential backoff. A message in flight during a drop is not
/// retried: the caller logs the failure and the next notification
/// carries current state.
pub struct BrokerPublisher {
    inner: Arc<Inner>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl BrokerPublisher {
    /// Connects, declares the topology, and starts the reconnect monitor.
    /// A failure here is a startup failure; reconnection only covers
    /// drops after a successful start.
    pub async fn connect(config: BrokerConfig) -> Result<Self, PublishError> {
        Self::with_connector(Box::new(LapinConnector { config })).await
    }

    pub(crate) async fn with_connector(
        connector: Box<dyn AmqpConnector>,
    ) -> Result<Self, PublishError> {
        let inner = Arc::new(Inner {
            connector,
            transport: RwLock::new(None),
            connected: AtomicBool::new(false),
            lost: Notify::new(),
            closing: AtomicBool::new(false),
        });

        let transport = inner.connector.connect(Inner::drop_signal(&inner)).await?;
        *inner.transport.write().await = Some(transport);
        inner.connected.store(true, Ordering::Release);

        let monitor = tokio::spawn(Arc::clone(&inner).run_monitor());
        Ok(Self {
            inner,
            monitor: Mutex::new(Some(monitor)),
        })
    }

    /// Publishes one serialized request. At-least-once on `Ok`: the
    /// broker confirmed acceptance within the publish bound.
    pub async fn publish(&self, payload: &[u8]) -> Result<(), PublishError> {
        if !self.inner.connected.load(Ordering::Acquire) {
            return Err(PublishError::NotConnected);
        }

        let guard = self.inner.transport.read().await;
        let transport = guard.as_ref().ok_or(PublishError::NotConnected)?;

        match timeout(PUBLISH_TIMEOUT, transport.publish(payload)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => {
                self.inner.mark_lost();
                Err(error)
            }
            Err(_) => {
                self.inner.mark_lost();
                Err(PublishError::Timeout(PUBLISH_TIMEOUT))
            }
        }
    }

    /// Stops the reconnect monitor and releases broker resources.
    /// Idempotent; never errors past logging.
    pub async fn close(&self) -> Result<(), PublishError> {
        if self.inner.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.inner.connected.store(false, Ordering::Release);
        self.inner.lost.notify_one();
        let monitor = self.monitor.lock().take();
        if let Some(monitor) = monitor {
            if timeout(CLOSE_TIMEOUT, monitor).await.is_err() {
                tracing::warn!("Reconnect monitor did not stop within grace period");
            }
        }

        if let Some(transport) = self.inner.transport.write().await.take() {
            if timeout(CLOSE_TIMEOUT, transport.close()).await.is_err() {
                tracing::warn!("Broker close did not finish within grace period");
            }
        }
        Ok(())
    }
}

struct Backoff {
    next: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            next: BACKOFF_INITIAL,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (delay * 2).min(BACKOFF_MAX);
        delay
    }
}
