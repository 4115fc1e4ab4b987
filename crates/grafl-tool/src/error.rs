use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Runtime(#[from] grafl_runtime::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// An environment variable or option could not be interpreted.
    #[error("invalid option: {0}")]
    InvalidOption(String),
}

pub type Result<T> = std::result::Result<T, Error>;
