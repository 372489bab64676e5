use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed startup configuration. Fatal: the process must
    /// not reach the event loop.
    #[error("configuration: {0}")]
    Config(String),

    #[error("persistence: {0}")]
    Persistence(#[from] sqlx::Error),
}

/// A single recipient could not be reached. Carries the platform's reason
/// string; consumed by the relay engine, never escalated past eviction.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct DeliveryError(pub String);
