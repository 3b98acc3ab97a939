//! Flash/monitor orchestration for ESP32-class serial devices.
//!
//! Firmware images are pushed through an external flashing tool while the
//! device's runtime log is streamed over the same serial port, which only
//! one owner may hold at a time. [`DeviceManager`] mediates that handoff;
//! UI hosts drive it with requests and consume its [`CoreEvent`] stream.

pub mod device;
pub mod events;
pub mod flash;
pub mod monitor;
pub mod provision;
pub mod serial;

pub use device::DeviceManager;
pub use events::{CoreEvent, LogLine};
pub use flash::{FlashImage, FlashJob, ToolOptions};
pub use monitor::MonitorOptions;
pub use provision::ProvisionReply;
pub use serial::{list_ports, PortDescriptor, SerialChannel};
