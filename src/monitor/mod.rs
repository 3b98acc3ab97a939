pub mod reader;

pub use reader::LogMonitor;

use std::time::Duration;

/// Baud rate of the device's log console.
pub const MONITOR_BAUD: u32 = 115_200;

/// Interval between polls of the serial input buffer.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Marker printed by the firmware when the camera fails to come up.
pub const DEFAULT_ERROR_MARKER: &str = "MAIN: Camera initialization failed!";

/// Tuning for one monitor session.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub baud_rate: u32,
    pub poll_interval: Duration,
    /// Substring of the log stream that raises an [`ErrorMarker`] event.
    ///
    /// [`ErrorMarker`]: crate::events::CoreEvent::ErrorMarker
    pub error_marker: String,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            baud_rate: MONITOR_BAUD,
            poll_interval: POLL_INTERVAL,
            error_marker: DEFAULT_ERROR_MARKER.to_string(),
        }
    }
}

/// Reassembles newline-terminated lines from arbitrarily split byte chunks.
///
/// Bytes are decoded permissively; the trailing unterminated fragment is
/// retained across calls, so no input byte is dropped or duplicated.
#[derive(Debug, Default)]
pub struct LineAssembler {
    partial: String,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the lines it completed, in stream order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.push_str(&String::from_utf8_lossy(chunk));

        let mut lines = Vec::new();
        while let Some(pos) = self.partial.find('\n') {
            let mut line: String = self.partial.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// Trailing bytes not yet terminated by a newline.
    pub fn fragment(&self) -> &str {
        &self.partial
    }
}

/// Watches a byte stream for a fixed marker, across chunk boundaries.
///
/// Fires at most once per session; the stream keeps being consumed after a
/// match so the carried tail stays bounded by the marker length.
#[derive(Debug)]
pub struct MarkerScanner {
    marker: Vec<u8>,
    tail: Vec<u8>,
    seen: bool,
}

impl MarkerScanner {
    pub fn new(marker: &str) -> Self {
        Self {
            marker: marker.as_bytes().to_vec(),
            tail: Vec::new(),
            seen: false,
        }
    }

    /// Returns true the first time the marker is observed.
    pub fn scan(&mut self, chunk: &[u8]) -> bool {
        if self.seen || self.marker.is_empty() {
            return false;
        }

        let mut window = std::mem::take(&mut self.tail);
        window.extend_from_slice(chunk);

        if window.windows(self.marker.len()).any(|w| w == self.marker) {
            self.seen = true;
            return true;
        }

        let keep = (self.marker.len() - 1).min(window.len());
        self.tail = window.split_off(window.len() - keep);
        false
    }

    pub fn seen(&self) -> bool {
        self.seen
    }
}
