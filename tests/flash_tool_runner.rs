#![cfg(unix)]

//! Runs the supervisor against stub tool scripts instead of a real esptool.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use tokio::sync::broadcast;

use flashbridge::events::CoreEvent;
use flashbridge::flash::{run_erase, run_flash, FlashError, FlashImage, FlashJob, ToolOptions};

fn stub_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("flashbridge-runner-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn stub_tool(name: &str, body: &str) -> ToolOptions {
    let path = stub_dir().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    ToolOptions {
        program: path.display().to_string(),
        compress: true,
    }
}

fn dummy_image(name: &str) -> PathBuf {
    let path = stub_dir().join(name);
    std::fs::write(&path, b"\xe9 firmware").unwrap();
    path
}

fn job_with_image(image: PathBuf) -> FlashJob {
    FlashJob::new(
        "esp32s3",
        "/dev/ttyFB0",
        vec![FlashImage {
            offset: 0x10000,
            path: image,
        }],
    )
}

fn drain(rx: &mut broadcast::Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn zero_exit_resolves_success() {
    let options = stub_tool("tool-ok.sh", "echo 'Chip is ESP32-S3'\nexit 0");
    let (tx, mut rx) = broadcast::channel(64);

    let message = run_flash(&job_with_image(dummy_image("ok.bin")), &options, &tx)
        .await
        .unwrap();
    assert!(message.contains("completed"));

    let forwarded = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, CoreEvent::FlashOutput { .. }))
        .count();
    assert_eq!(forwarded, 1);
}

#[tokio::test]
async fn nonzero_exit_attaches_stderr() {
    let options = stub_tool("tool-fail.sh", "echo 'A fatal error occurred' >&2\nexit 2");
    let (tx, _rx) = broadcast::channel(64);

    let err = run_flash(&job_with_image(dummy_image("fail.bin")), &options, &tx)
        .await
        .unwrap_err();
    match err {
        FlashError::ExitFailure { code, stderr, .. } => {
            assert_eq!(code, 2);
            assert!(stderr.contains("A fatal error occurred"));
        }
        other => panic!("expected ExitFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_image_resolves_before_any_spawn() {
    let options = stub_tool("tool-spy.sh", "touch \"$0.ran\"\nexit 0");
    let (tx, _rx) = broadcast::channel(64);

    let job = job_with_image("/nonexistent/firmware.bin".into());
    let err = run_flash(&job, &options, &tx).await.unwrap_err();
    assert!(matches!(err, FlashError::FileNotFound(_)));
    assert!(!PathBuf::from(format!("{}.ran", options.program)).exists());
}

#[tokio::test]
async fn spawn_failure_is_reported_not_propagated() {
    let options = ToolOptions {
        program: "/nonexistent/esptool".to_string(),
        compress: true,
    };
    let (tx, _rx) = broadcast::channel(64);

    let err = run_flash(&job_with_image(dummy_image("spawn.bin")), &options, &tx)
        .await
        .unwrap_err();
    assert!(matches!(err, FlashError::Spawn { .. }));
}

#[tokio::test]
async fn progress_stream_is_monotone_non_decreasing() {
    let options = stub_tool(
        "tool-progress.sh",
        concat!(
            "echo 'Compressed 571392 bytes to 330753...'\n",
            "echo 'Writing at 0x00010000... (10 %)'\n",
            "echo 'Writing at 0x00020000... (55 %)'\n",
            "echo 'Writing at 0x00018000... (40 %)'\n",
            "echo 'Writing at 0x00030000... (90 %)'\n",
            "echo 'Hash of data verified.'\n",
            "exit 0"
        ),
    );
    let (tx, mut rx) = broadcast::channel(64);

    run_flash(&job_with_image(dummy_image("progress.bin")), &options, &tx)
        .await
        .unwrap();

    let percents: Vec<u8> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            CoreEvent::FlashProgress { percent, .. } => Some(percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![10, 55, 90]);
}

#[tokio::test]
async fn erase_streams_output_without_progress() {
    let options = stub_tool(
        "tool-erase.sh",
        "echo 'Erasing flash (this may take a while)...'\necho 'Writing at 0x00000000... (50 %)'\nexit 0",
    );
    let (tx, mut rx) = broadcast::channel(64);

    let job_id = uuid::Uuid::new_v4();
    let message = run_erase(job_id, "esp32s3", "/dev/ttyFB0", &options, &tx)
        .await
        .unwrap();
    assert!(message.contains("Erase"));

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, CoreEvent::FlashOutput { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, CoreEvent::FlashProgress { .. })));
}
