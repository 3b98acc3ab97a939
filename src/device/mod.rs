pub mod manager;

pub use manager::DeviceManager;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("A flash or erase operation is already in progress")]
    OperationInProgress,

    #[error("Serial error: {0}")]
    SerialError(#[from] crate::serial::SerialError),

    #[error("Flash error: {0}")]
    FlashError(#[from] crate::flash::FlashError),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
