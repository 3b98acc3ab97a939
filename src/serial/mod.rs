pub mod channel;

pub use channel::SerialChannel;

use serde::{Deserialize, Serialize};
use serialport::SerialPortType;

/// A serial port currently visible to the operating system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub port_name: String,
    pub description: Option<String>,
}

/// Enumerate the serial ports currently present.
///
/// Produces a fresh listing on every call; an empty vec means nothing is
/// attached, which is not an error.
pub fn list_ports() -> Result<Vec<PortDescriptor>> {
    let ports = serialport::available_ports()?;
    let mut descriptors = Vec::new();

    for port in ports {
        let description = match &port.port_type {
            SerialPortType::UsbPort(usb_info) => usb_info
                .product
                .clone()
                .or_else(|| usb_info.manufacturer.clone()),
            _ => None,
        };
        descriptors.push(PortDescriptor {
            port_name: port.port_name.clone(),
            description,
        });
    }

    log::debug!("Enumerated {} serial ports", descriptors.len());
    Ok(descriptors)
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Port unavailable: {0}")]
    PortUnavailable(String),

    #[error("Port not open")]
    NotOpen,

    #[error("Communication timeout")]
    Timeout,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
