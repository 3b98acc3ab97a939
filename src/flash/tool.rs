use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::events::CoreEvent;

use super::{parse_progress, FlashError, FlashJob, Result, ToolOptions};

/// Argument list for a `write_flash` invocation.
pub fn flash_args(job: &FlashJob, options: &ToolOptions) -> Vec<String> {
    let mut args = vec![
        "--chip".to_string(),
        job.chip.clone(),
        "--port".to_string(),
        job.port.clone(),
        "--baud".to_string(),
        job.baud.to_string(),
        "--before".to_string(),
        "default_reset".to_string(),
        "--after".to_string(),
        "hard_reset".to_string(),
        "write_flash".to_string(),
    ];
    if options.compress {
        args.push("-z".to_string());
    }
    for image in &job.images {
        args.push(format!("{:#06x}", image.offset));
        args.push(image.path.display().to_string());
    }
    args
}

/// Argument list for an `erase_flash` invocation.
pub fn erase_args(chip: &str, port: &str) -> Vec<String> {
    vec![
        "--chip".to_string(),
        chip.to_string(),
        "--port".to_string(),
        port.to_string(),
        "erase_flash".to_string(),
    ]
}

/// Run one flashing job to completion, streaming tool output as events.
///
/// Image paths are checked before anything is spawned; a missing file
/// resolves as [`FlashError::FileNotFound`] without touching the port.
/// The caller must have released any serial session on the target port.
pub async fn run_flash(
    job: &FlashJob,
    options: &ToolOptions,
    events: &broadcast::Sender<CoreEvent>,
) -> Result<String> {
    for image in &job.images {
        if !image.path.exists() {
            return Err(FlashError::FileNotFound(image.path.clone()));
        }
    }

    let args = flash_args(job, options);
    supervise(job.id, &options.program, &args, true, events).await?;
    Ok("Flashing completed successfully".to_string())
}

/// Run a full chip erase. Same supervision as flashing, no progress parsing.
pub async fn run_erase(
    job_id: Uuid,
    chip: &str,
    port: &str,
    options: &ToolOptions,
    events: &broadcast::Sender<CoreEvent>,
) -> Result<String> {
    let args = erase_args(chip, port);
    supervise(job_id, &options.program, &args, false, events).await?;
    Ok("Erase completed successfully".to_string())
}

/// Spawn the tool, forward its stdout line-by-line, and resolve from the
/// exit status with captured stderr attached to failures.
async fn supervise(
    job_id: Uuid,
    program: &str,
    args: &[String],
    parse_percent: bool,
    events: &broadcast::Sender<CoreEvent>,
) -> Result<()> {
    log::info!("Running {} {}", program, args.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| FlashError::Spawn {
            tool: program.to_string(),
            source: e,
        })?;

    // Drain stderr concurrently so a chatty tool cannot fill the pipe and
    // stall before we get to it.
    let stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut text = String::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_string(&mut text).await;
        }
        text
    });

    let mut last_percent: Option<u8> = None;
    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let _ = events.send(CoreEvent::FlashOutput {
                        job_id,
                        line: line.clone(),
                    });
                    if parse_percent {
                        if let Some(percent) = parse_progress(&line) {
                            // The tool may re-report earlier addresses; keep
                            // the emitted sequence non-decreasing.
                            if last_percent.map_or(true, |prev| percent >= prev) {
                                last_percent = Some(percent);
                                let _ = events.send(CoreEvent::FlashProgress { job_id, percent });
                            }
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Lost {} output stream: {}", program, e);
                    break;
                }
            }
        }
    }

    let status = child.wait().await?;
    let stderr_text = stderr_task.await.unwrap_or_default();

    if status.success() {
        log::info!("{} finished", program);
        Ok(())
    } else {
        let code = status.code().unwrap_or(-1);
        log::error!("{} exited with code {}", program, code);
        Err(FlashError::ExitFailure {
            tool: program.to_string(),
            code,
            stderr: stderr_text.trim().to_string(),
        })
    }
}
