//! Wi-Fi credential hand-over to the device over its serial console.
//!
//! A single newline-terminated `SSID=<ssid>,PASS=<password>` line is written
//! after opening the port; the firmware acknowledges with `OK` or `ERROR` on
//! the same channel within a few seconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::serial::{Result, SerialChannel};

/// How long to wait for the device to acknowledge credentials.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// The device's acknowledgement of a credential write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisionReply {
    Accepted,
    Rejected,
    Unrecognized(String),
}

/// Build the single-line credential payload the firmware expects.
pub fn credential_line(ssid: &str, password: &str) -> String {
    format!("SSID={},PASS={}", ssid, password)
}

/// Classify the device's acknowledgement line.
pub fn classify_reply(line: &str) -> ProvisionReply {
    match line.trim() {
        "OK" => ProvisionReply::Accepted,
        "ERROR" => ProvisionReply::Rejected,
        other => ProvisionReply::Unrecognized(other.to_string()),
    }
}

/// Send credentials over an open channel and wait for the acknowledgement.
pub async fn send_credentials(
    channel: &mut SerialChannel,
    ssid: &str,
    password: &str,
) -> Result<ProvisionReply> {
    channel.write_line(&credential_line(ssid, password))?;
    let reply = channel.read_line_timeout(REPLY_TIMEOUT).await?;

    let classified = classify_reply(&reply);
    match &classified {
        ProvisionReply::Accepted => log::info!("Device accepted Wi-Fi credentials"),
        ProvisionReply::Rejected => log::warn!("Device rejected Wi-Fi credentials"),
        ProvisionReply::Unrecognized(text) => {
            log::warn!("Unrecognized provisioning reply: {}", text)
        }
    }
    Ok(classified)
}
