use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use soundscan_app::scanner::ScannerService;
use soundscan_app::{setup, APP_NAME, VERSION};
use soundscan_foundation::ShutdownHandler;

#[derive(Parser, Debug)]
#[command(
    name = "soundscan",
    version,
    about = "Publishes default sound-device events to a message broker"
)]
struct Cli {
    /// Directory for the rolling log file; stdout only when unset.
    #[arg(long, env = "WIN_SOUND_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

fn init_logging(log_dir: Option<&Path>) -> anyhow::Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).context("create log directory")?;
            let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, "soundscan.log");
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_writer(std::io::stdout.and(non_blocking_file))
                .with_env_filter(log_level)
                .init();
            std::mem::forget(guard);
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(log_level).init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_dir.as_deref())?;
    tracing::info!("Starting {} {}", APP_NAME, VERSION);

    // COM brackets the whole service lifetime and is released on every
    // exit path, including startup failures below.
    #[cfg(windows)]
    let _com = soundscan_app::com::ComGuard::initialize()?;

    let enqueuer = setup::build_enqueuer().await?;
    let source = soundscan_audio::acquire_native(APP_NAME, VERSION)
        .context("acquire native audio source")?;

    let shutdown = ShutdownHandler::new().install().await;
    let scanner = ScannerService::new(source, enqueuer);
    scanner.run(&shutdown).await?;
    Ok(())
}
