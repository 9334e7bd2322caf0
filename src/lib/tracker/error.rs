use super::types::TargetId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Already tracking: {0}")]
    AlreadyTracking(TargetId),

    #[error("Not tracking: {0}")]
    NotTracking(TargetId),

    #[error("Session for {0} ended unexpectedly")]
    SessionLost(TargetId),
}
