use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("parameter store: {0}")]
    Store(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
