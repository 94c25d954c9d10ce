use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {0} has already finished")]
    AlreadyFinished(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid format '{0}', expected 'video' or 'audio'")]
    InvalidFormat(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
