use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot open input device {}: {source}", path.display())]
    Device {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Input device closed: {0}")]
    DeviceClosed(String),

    #[error("No pointer input device found")]
    NoDevice,

    #[error("Click failed: {0}")]
    Click(String),
}

pub type Result<T> = std::result::Result<T, Error>;
