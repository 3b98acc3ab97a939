use std::time::{Duration, Instant};

use serialport::SerialPort;

use super::{Result, SerialError};

/// Exclusive handle to one serial port.
///
/// At most one port is held at a time; opening while a port is already held
/// releases the previous handle first. Exclusivity across processes is
/// enforced by the OS and surfaces as [`SerialError::PortUnavailable`].
pub struct SerialChannel {
    port: Option<Box<dyn SerialPort>>,
    port_name: Option<String>,
    baud_rate: u32,
}

impl SerialChannel {
    pub fn new() -> Self {
        Self {
            port: None,
            port_name: None,
            baud_rate: 0,
        }
    }

    /// Acquire the port at the given baud rate.
    pub fn open(&mut self, port_name: &str, baud_rate: u32, read_timeout: Duration) -> Result<()> {
        self.close();

        let port = serialport::new(port_name, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|e| SerialError::PortUnavailable(format!("{}: {}", port_name, e)))?;

        self.port = Some(port);
        self.port_name = Some(port_name.to_string());
        self.baud_rate = baud_rate;

        log::info!("Opened {} at {} baud", port_name, baud_rate);
        Ok(())
    }

    /// Release the port. Safe to call on an already-closed channel.
    pub fn close(&mut self) {
        if let Some(name) = &self.port_name {
            log::info!("Closed {}", name);
        }
        self.port = None;
        self.port_name = None;
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Non-blocking best-effort read of whatever is currently buffered.
    ///
    /// Returns an empty vec when nothing is pending; this is the polling
    /// primitive the monitor loop is built on, not a blocking read.
    pub fn read_available(&mut self) -> Result<Vec<u8>> {
        let port = self.port.as_mut().ok_or(SerialError::NotOpen)?;

        let pending = port.bytes_to_read()? as usize;
        if pending == 0 {
            return Ok(Vec::new());
        }

        let mut buffer = vec![0u8; pending];
        match port.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                Ok(buffer)
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(SerialError::IoError(e)),
        }
    }

    /// Write raw bytes and flush.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(SerialError::NotOpen)?;
        port.write_all(data).map_err(SerialError::IoError)?;
        port.flush().map_err(SerialError::IoError)?;
        Ok(())
    }

    /// Write a newline-terminated line, the framing the firmware expects.
    pub fn write_line(&mut self, text: &str) -> Result<()> {
        self.write(format!("{}\n", text).as_bytes())
    }

    /// Read one line, polling until a newline arrives or the deadline passes.
    pub async fn read_line_timeout(&mut self, deadline: Duration) -> Result<String> {
        let started = Instant::now();
        let mut collected = String::new();

        loop {
            let chunk = self.read_available()?;
            if !chunk.is_empty() {
                collected.push_str(&String::from_utf8_lossy(&chunk));
                if let Some(pos) = collected.find('\n') {
                    return Ok(collected[..pos].trim_end_matches('\r').to_string());
                }
            }

            if started.elapsed() >= deadline {
                return Err(SerialError::Timeout);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Hardware-reset the attached device: DTR low for `low_duration`, then
    /// high again. The session must be held exclusively for the pulse.
    pub async fn pulse_reset(&mut self, low_duration: Duration) -> Result<()> {
        let port = self.port.as_mut().ok_or(SerialError::NotOpen)?;

        port.write_data_terminal_ready(false)?;
        tokio::time::sleep(low_duration).await;
        port.write_data_terminal_ready(true)?;

        log::info!(
            "Reset pulse on {} ({} ms low)",
            self.port_name.as_deref().unwrap_or("?"),
            low_duration.as_millis()
        );
        Ok(())
    }
}

impl Default for SerialChannel {
    fn default() -> Self {
        Self::new()
    }
}
