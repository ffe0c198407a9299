use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShaperError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ShaperError>;
