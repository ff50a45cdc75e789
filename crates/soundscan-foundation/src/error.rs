use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Native audio source error: {0}")]
    Source(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: String, to: String },

    #[error("Shutdown requested")]
    ShutdownRequested,

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}
