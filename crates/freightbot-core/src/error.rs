//! Error taxonomy. Transient failures (store, transport) are retried by the
//! scheduler on a later tick; configuration problems are fatal at startup
//! only and never surface at runtime.

use thiserror::Error;

/// All errors produced inside the Freightbot workspace.
#[derive(Error, Debug)]
pub enum FreightBotError {
    /// Required configuration is missing or malformed. Fatal at startup.
    #[error("Config error: {0}")]
    Config(String),

    /// The backing store cannot be reached or a query failed. Transient:
    /// pending notification records stay retryable on the next tick.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A single message could not be delivered. Isolated per item; the
    /// record stays unsent and re-surfaces next tick.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Report rendering failed.
    #[error("Report error: {0}")]
    Report(String),

    /// The upstream sync service rejected or garbled an exchange.
    #[error("Sync error: {0}")]
    Sync(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FreightBotError>;
