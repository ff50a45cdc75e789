use std::sync::Arc;

use anyhow::Context;

use soundscan_broker::{
    BrokerConfig, BrokerEnqueuer, BrokerPublisher, Enqueuer, EnqueuerMode, NullEnqueuer,
};

/// Builds the request sink selected by `WIN_SOUND_ENQUEUER`. With the
/// null sink no broker variable is read and no connection is attempted.
pub async fn build_enqueuer() -> anyhow::Result<Arc<dyn Enqueuer>> {
    match EnqueuerMode::from_env().context("enqueuer selection")? {
        EnqueuerMode::Empty => {
            tracing::info!("Broker disabled; requests will be logged and dropped");
            Ok(Arc::new(NullEnqueuer))
        }
        EnqueuerMode::RabbitMq => {
            let config = BrokerConfig::from_env().context("broker configuration")?;
            tracing::info!(?config, "Connecting to broker");
            let publisher = BrokerPublisher::connect(config)
                .await
                .context("broker connection")?;
            Ok(Arc::new(BrokerEnqueuer::new(publisher)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use soundscan_broker::config::{ENV_ENQUEUER, ENV_HOST};
    use std::env;
    use std::time::{Duration, Instant};

    #[tokio::test]
    #[serial]
    async fn empty_mode_never_touches_the_broker() {
        env::set_var(ENV_ENQUEUER, "empty");
        // a connection attempt against this host would not return quickly
        env::set_var(ENV_HOST, "203.0.113.1");

        let started = Instant::now();
        let enqueuer = build_enqueuer().await.unwrap();
        assert!(
            started.elapsed() < Duration::from_millis(200),
            "null enqueuer must come up without network activity"
        );
        enqueuer.close().await.unwrap();

        env::remove_var(ENV_ENQUEUER);
        env::remove_var(ENV_HOST);
    }

    #[tokio::test]
    #[serial]
    async fn unsupported_mode_is_a_startup_error() {
        env::set_var(ENV_ENQUEUER, "kafka");
        let err = build_enqueuer().await.unwrap_err();
        assert!(err.to_string().contains("enqueuer selection"));
        env::remove_var(ENV_ENQUEUER);
    }
}
