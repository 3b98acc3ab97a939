use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::provision::ProvisionReply;

/// One complete decoded line of device log output, together with the raw
/// chunk it was extracted from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub port: String,
    pub text: String,
    pub raw: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

/// Typed event stream consumed by the UI host.
///
/// Every background activity reports through this stream; subscribers that
/// fall behind lose the oldest events, never the emitting task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CoreEvent {
    /// A monitor session started polling the port.
    MonitorOpened { port: String },
    /// A monitor session released the port.
    MonitorClosed { port: String },
    /// A complete line of device log output.
    Log(LogLine),
    /// The monitor hit an I/O fault and stopped; the port is released.
    MonitorFault { port: String, message: String },
    /// The configured error marker appeared in the log stream.
    ErrorMarker { port: String, marker: String },
    /// One line of external tool output, forwarded verbatim.
    FlashOutput { job_id: Uuid, line: String },
    /// Percent-complete extracted from the tool's output.
    FlashProgress { job_id: Uuid, percent: u8 },
    /// Terminal resolution of a flash or erase operation.
    FlashFinished {
        job_id: Uuid,
        success: bool,
        message: String,
    },
    /// Outcome of a hardware reset pulse.
    DeviceRestarted {
        port: String,
        success: bool,
        message: String,
    },
    /// The device acknowledged (or rejected) a Wi-Fi credential write.
    WifiProvisioned { port: String, reply: ProvisionReply },
}
