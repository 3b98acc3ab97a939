use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout};

use crate::events::{CoreEvent, LogLine};
use crate::serial::SerialChannel;

use super::{LineAssembler, MarkerScanner, MonitorOptions};

/// Bound on waiting for the polling task to observe a stop request.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to one running monitor session.
///
/// Lifecycle is `start` -> running -> `stop` -> stopped: the polling task
/// owns the serial channel and closes it on the way out, and `stop` consumes
/// the handle, so a stopped monitor cannot be restarted. Construct a fresh
/// one to resume reading.
pub struct LogMonitor {
    port_name: String,
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl LogMonitor {
    /// Take ownership of an open channel and start the polling loop.
    pub fn start(
        channel: SerialChannel,
        options: MonitorOptions,
        events: broadcast::Sender<CoreEvent>,
    ) -> Self {
        let port_name = channel.port_name().unwrap_or_default().to_string();
        let (stop_tx, stop_rx) = mpsc::channel(1);

        let task_port = port_name.clone();
        let task = tokio::spawn(async move {
            poll_loop(channel, options, events, stop_rx, task_port).await;
        });

        log::info!("Monitor started on {}", port_name);
        Self {
            port_name,
            stop_tx,
            task,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Request the loop to stop and wait for it to release the port.
    ///
    /// The stop is cooperative: the task observes it at the next poll
    /// boundary. The join wait is bounded; a task that never yields is
    /// reported as a stuck handoff instead of hanging the caller.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(()).await;
        if timeout(STOP_JOIN_TIMEOUT, self.task).await.is_err() {
            log::warn!(
                "Monitor on {} did not stop within {:?}",
                self.port_name,
                STOP_JOIN_TIMEOUT
            );
        } else {
            log::info!("Monitor stopped on {}", self.port_name);
        }
    }
}

async fn poll_loop(
    mut channel: SerialChannel,
    options: MonitorOptions,
    events: broadcast::Sender<CoreEvent>,
    mut stop_rx: mpsc::Receiver<()>,
    port: String,
) {
    let mut assembler = LineAssembler::new();
    let mut scanner = MarkerScanner::new(&options.error_marker);

    let _ = events.send(CoreEvent::MonitorOpened { port: port.clone() });

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                log::debug!("Monitor on {} received stop request", port);
                break;
            }
            _ = sleep(options.poll_interval) => {
                match channel.read_available() {
                    Ok(chunk) if !chunk.is_empty() => {
                        if scanner.scan(&chunk) {
                            log::warn!("Error marker seen on {}", port);
                            let _ = events.send(CoreEvent::ErrorMarker {
                                port: port.clone(),
                                marker: options.error_marker.clone(),
                            });
                        }
                        for text in assembler.push(&chunk) {
                            let _ = events.send(CoreEvent::Log(LogLine {
                                port: port.clone(),
                                text,
                                raw: chunk.clone(),
                                received_at: Utc::now(),
                            }));
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("Serial read failed on {}: {}", port, e);
                        let _ = events.send(CoreEvent::MonitorFault {
                            port: port.clone(),
                            message: e.to_string(),
                        });
                        break;
                    }
                }
            }
        }
    }

    channel.close();
    let _ = events.send(CoreEvent::MonitorClosed { port });
}
