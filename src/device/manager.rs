use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::events::CoreEvent;
use crate::flash::{run_erase, run_flash, FlashError, FlashJob, ToolOptions};
use crate::monitor::{LogMonitor, MonitorOptions};
use crate::provision::{self, ProvisionReply};
use crate::serial::{self, PortDescriptor, SerialChannel};

use super::{DeviceError, Result};

/// Duration the DTR line is held low during a device restart.
const RESET_PULSE: Duration = Duration::from_millis(100);

/// Read timeout configured on sessions the manager opens.
const READ_TIMEOUT: Duration = Duration::from_secs(1);

const EVENT_CAPACITY: usize = 256;

/// Mediates ownership of the serial port between the log monitor and
/// flash/erase operations.
///
/// At most one of the two holds the port at any instant: the monitor is
/// stopped and joined before the external tool starts, and brought back up
/// once the tool resolves. One flash or erase may be in flight at a time;
/// a second request is rejected immediately rather than queued. Cloning
/// yields another handle onto the same manager.
#[derive(Clone)]
pub struct DeviceManager {
    events_tx: broadcast::Sender<CoreEvent>,
    monitor: Arc<Mutex<Option<LogMonitor>>>,
    flashing: Arc<AtomicBool>,
    tool_options: ToolOptions,
    monitor_options: MonitorOptions,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self::with_options(ToolOptions::default(), MonitorOptions::default())
    }

    pub fn with_options(tool_options: ToolOptions, monitor_options: MonitorOptions) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            events_tx,
            monitor: Arc::new(Mutex::new(None)),
            flashing: Arc::new(AtomicBool::new(false)),
            tool_options,
            monitor_options,
        }
    }

    /// Subscribe to the typed event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.events_tx.subscribe()
    }

    /// List serial ports currently visible to the OS.
    pub fn list_ports(&self) -> serial::Result<Vec<PortDescriptor>> {
        serial::list_ports()
    }

    pub async fn is_monitoring(&self) -> bool {
        self.monitor.lock().await.is_some()
    }

    /// Port held by the running monitor, if any.
    pub async fn monitor_port(&self) -> Option<String> {
        self.monitor
            .lock()
            .await
            .as_ref()
            .map(|m| m.port_name().to_string())
    }

    pub fn is_flashing(&self) -> bool {
        self.flashing.load(Ordering::SeqCst)
    }

    /// Start the log monitor on `port`, stopping any existing one first.
    pub async fn open_monitor(&self, port: &str) -> Result<()> {
        self.stop_monitor().await;
        self.start_monitor(port).await
    }

    /// Stop the monitor and wait for it to release the port. No-op when
    /// none is running.
    pub async fn close_monitor(&self) {
        self.stop_monitor().await;
    }

    /// Run a flashing job in the background.
    ///
    /// Rejects with [`DeviceError::OperationInProgress`] while a flash or
    /// erase is in flight. The port is handed off from the monitor before
    /// the tool starts; after the job resolves (success or failure) the
    /// busy flag clears and the monitor reopens on the same port,
    /// best-effort. The terminal outcome arrives as a
    /// [`CoreEvent::FlashFinished`] event.
    pub async fn start_flash(&self, job: FlashJob) -> Result<Uuid> {
        if self.flashing.swap(true, Ordering::SeqCst) {
            return Err(DeviceError::OperationInProgress);
        }

        self.stop_monitor().await;

        let job_id = job.id;
        let port = job.port.clone();
        let tool_options = self.tool_options.clone();
        let events = self.events_tx.clone();
        let manager = self.clone();

        log::info!("Starting flash job {} on {}", job_id, port);
        tokio::spawn(async move {
            let result = run_flash(&job, &tool_options, &events).await;
            manager.finish_operation(job_id, &port, result).await;
        });

        Ok(job_id)
    }

    /// Run a full chip erase in the background. Same ownership handoff and
    /// busy-flag policy as [`Self::start_flash`].
    pub async fn start_erase(&self, port: &str, chip: &str) -> Result<Uuid> {
        if self.flashing.swap(true, Ordering::SeqCst) {
            return Err(DeviceError::OperationInProgress);
        }

        self.stop_monitor().await;

        let job_id = Uuid::new_v4();
        let port = port.to_string();
        let chip = chip.to_string();
        let tool_options = self.tool_options.clone();
        let events = self.events_tx.clone();
        let manager = self.clone();

        log::info!("Starting erase job {} on {}", job_id, port);
        tokio::spawn(async move {
            let result = run_erase(job_id, &chip, &port, &tool_options, &events).await;
            manager.finish_operation(job_id, &port, result).await;
        });

        Ok(job_id)
    }

    /// Pulse the reset line, then bring the monitor back up.
    ///
    /// A failed pulse is reported through the event stream but does not
    /// prevent the reopen attempt.
    pub async fn restart_device(&self, port: &str) -> Result<()> {
        self.stop_monitor().await;

        let (success, message) = match self.pulse_reset(port).await {
            Ok(()) => (true, format!("Device on {} restarted", port)),
            Err(e) => {
                log::warn!("Reset pulse on {} failed: {}", port, e);
                (false, e.to_string())
            }
        };
        let _ = self.events_tx.send(CoreEvent::DeviceRestarted {
            port: port.to_string(),
            success,
            message,
        });

        self.start_monitor(port).await
    }

    /// Send Wi-Fi credentials to the device and report its acknowledgement.
    ///
    /// The monitor is stopped for the duration of the exchange and brought
    /// back afterwards if one was running when the call was made.
    pub async fn provision_wifi(
        &self,
        port: &str,
        ssid: &str,
        password: &str,
    ) -> Result<ProvisionReply> {
        let was_monitoring = self.is_monitoring().await;
        self.stop_monitor().await;

        let result = self.exchange_credentials(port, ssid, password).await;

        if let Ok(reply) = &result {
            let _ = self.events_tx.send(CoreEvent::WifiProvisioned {
                port: port.to_string(),
                reply: reply.clone(),
            });
        }

        if was_monitoring {
            if let Err(e) = self.start_monitor(port).await {
                log::warn!(
                    "Could not reopen monitor on {} after provisioning: {}",
                    port,
                    e
                );
            }
        }

        result.map_err(DeviceError::from)
    }

    async fn exchange_credentials(
        &self,
        port: &str,
        ssid: &str,
        password: &str,
    ) -> serial::Result<ProvisionReply> {
        let mut channel = SerialChannel::new();
        channel.open(
            port,
            self.monitor_options.baud_rate,
            provision::REPLY_TIMEOUT,
        )?;
        let result = provision::send_credentials(&mut channel, ssid, password).await;
        channel.close();
        result
    }

    async fn start_monitor(&self, port: &str) -> Result<()> {
        let mut channel = SerialChannel::new();
        channel.open(port, self.monitor_options.baud_rate, READ_TIMEOUT)?;

        let monitor = LogMonitor::start(
            channel,
            self.monitor_options.clone(),
            self.events_tx.clone(),
        );
        *self.monitor.lock().await = Some(monitor);
        Ok(())
    }

    async fn stop_monitor(&self) {
        let monitor = self.monitor.lock().await.take();
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }
    }

    async fn pulse_reset(&self, port: &str) -> serial::Result<()> {
        let mut channel = SerialChannel::new();
        channel.open(port, self.monitor_options.baud_rate, READ_TIMEOUT)?;
        let result = channel.pulse_reset(RESET_PULSE).await;
        channel.close();
        result
    }

    /// Terminal bookkeeping shared by flash and erase: emit the outcome,
    /// clear the busy flag, hand the port back to the monitor.
    async fn finish_operation(
        &self,
        job_id: Uuid,
        port: &str,
        result: std::result::Result<String, FlashError>,
    ) {
        let (success, message) = match result {
            Ok(message) => (true, message),
            Err(e) => (false, e.to_string()),
        };
        if success {
            log::info!("Job {} on {} succeeded", job_id, port);
        } else {
            log::error!("Job {} on {} failed: {}", job_id, port, message);
        }

        self.flashing.store(false, Ordering::SeqCst);
        let _ = self.events_tx.send(CoreEvent::FlashFinished {
            job_id,
            success,
            message,
        });

        // Reopen failure is reported, not escalated; the operator may simply
        // have unplugged the device.
        if let Err(e) = self.start_monitor(port).await {
            log::warn!(
                "Could not reopen monitor on {} after job {}: {}",
                port,
                job_id,
                e
            );
            let _ = self.events_tx.send(CoreEvent::MonitorFault {
                port: port.to_string(),
                message: e.to_string(),
            });
        }
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
