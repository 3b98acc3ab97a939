pub mod tool;

pub use tool::{erase_args, flash_args, run_erase, run_flash};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Baud rate handed to the external flashing tool.
pub const FLASH_BAUD: u32 = 921_600;

/// Flash offsets of the standard ESP-IDF image layout.
pub const BOOTLOADER_OFFSET: u32 = 0x0;
pub const PARTITION_TABLE_OFFSET: u32 = 0x8000;
pub const APPLICATION_OFFSET: u32 = 0x10000;

/// One image to write at a fixed flash offset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashImage {
    pub offset: u32,
    pub path: PathBuf,
}

/// Immutable description of one flashing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashJob {
    pub id: Uuid,
    pub chip: String,
    pub port: String,
    pub baud: u32,
    pub images: Vec<FlashImage>,
}

impl FlashJob {
    pub fn new(chip: &str, port: &str, images: Vec<FlashImage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            chip: chip.to_string(),
            port: port.to_string(),
            baud: FLASH_BAUD,
            images,
        }
    }

    /// Standard bootloader / partition table / application layout.
    pub fn standard_layout(
        chip: &str,
        port: &str,
        bootloader: PathBuf,
        partition_table: PathBuf,
        application: PathBuf,
    ) -> Self {
        Self::new(
            chip,
            port,
            vec![
                FlashImage {
                    offset: BOOTLOADER_OFFSET,
                    path: bootloader,
                },
                FlashImage {
                    offset: PARTITION_TABLE_OFFSET,
                    path: partition_table,
                },
                FlashImage {
                    offset: APPLICATION_OFFSET,
                    path: application,
                },
            ],
        )
    }

    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }
}

/// How the external flashing tool is invoked.
#[derive(Debug, Clone)]
pub struct ToolOptions {
    /// Program name or path of the flashing tool.
    pub program: String,
    /// Pass `-z` so the tool compresses image transfers.
    pub compress: bool,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            program: "esptool.py".to_string(),
            compress: true,
        }
    }
}

/// Extract the percent-complete token from one line of tool output.
///
/// Matches the `Writing at 0x00010000... (42 %)` shape; any other line
/// yields `None`, which is not an error.
pub fn parse_progress(line: &str) -> Option<u8> {
    if !line.contains("Writing at") {
        return None;
    }

    let open = line.rfind('(')?;
    let rest = &line[open + 1..];
    let close = rest.find(')')?;
    let token = rest[..close].trim().trim_end_matches('%').trim_end();

    let percent: u8 = token.parse().ok()?;
    (percent <= 100).then_some(percent)
}

#[derive(Debug, thiserror::Error)]
pub enum FlashError {
    #[error("Firmware image not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    #[error("{tool} exited with code {code}: {stderr}")]
    ExitFailure {
        tool: String,
        code: i32,
        stderr: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FlashError>;
