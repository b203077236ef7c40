use super::orchestrator::resolve_csv_path;
use super::runtime::request_shutdown;
use super::*;
use crate::buttons::{ButtonPins, InertPins};
use crate::camera::{CameraCall, MockCamera, MockCameraHandle};
use crate::config::{CameraKind, FieldcamConfig};
use crate::ui::UiPage;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

struct TestHarness {
    app: FieldcamApp,
    camera: MockCameraHandle,
    _media: TempDir,
    _home: TempDir,
}

fn harness() -> TestHarness {
    harness_with(Box::new(InertPins), |_| {})
}

fn harness_with(
    pins: Box<dyn ButtonPins>,
    tweak: impl FnOnce(&mut FieldcamConfig),
) -> TestHarness {
    let media = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();
    std::fs::create_dir(media.path().join("card0")).unwrap();

    let mut config = FieldcamConfig::default();
    config.camera.kind = CameraKind::Mock;
    config.recording.pause_before_record_seconds = 0;
    config.recording.segment_duration_seconds = 3600;
    config.recording.avg_video_file_size_mb = 1;
    config.recording.file_size_safety_factor = 1.0;
    config.recording.reserved_storage_mb = 1;
    config.storage.media_root = media.path().to_string_lossy().into_owned();
    config.storage.home_dir = home.path().to_string_lossy().into_owned();
    config.system.tick_interval_ms = 20;
    config.system.button_poll_interval_ms = 10;
    tweak(&mut config);

    let camera = MockCamera::new();
    let handle = camera.handle();
    let app = FieldcamApp::assemble(config, Box::new(camera), pins);

    TestHarness {
        app,
        camera: handle,
        _media: media,
        _home: home,
    }
}

struct ScriptedPins {
    mode: Arc<Mutex<VecDeque<bool>>>,
}

impl ButtonPins for ScriptedPins {
    fn mode_pressed(&mut self) -> bool {
        self.mode.lock().pop_front().unwrap_or(false)
    }

    fn function_pressed(&mut self) -> bool {
        false
    }
}

#[tokio::test]
async fn services_record_and_shut_down_cleanly() {
    let mut harness = harness();
    let mut status_rx = harness.app.status_receiver();
    harness.app.start();

    let started = timeout(Duration::from_secs(3), async {
        loop {
            if status_rx.borrow_and_update().recording {
                break;
            }
            status_rx.changed().await.unwrap();
        }
    })
    .await;
    assert!(started.is_ok(), "recorder never started");

    let destination = status_rx.borrow().destination.clone().unwrap();
    assert!(destination.exists());

    let exit_code = harness.app.shutdown().await.unwrap();
    assert_eq!(exit_code, 0);

    let calls = harness.camera.calls();
    assert!(calls
        .iter()
        .any(|call| matches!(call, CameraCall::StopRecording)));
    assert!(matches!(calls.last(), Some(CameraCall::Release)));
}

#[tokio::test]
async fn run_honours_shutdown_requests() {
    let mut harness = harness();
    harness.app.start();

    let slot = Arc::clone(&harness.app.shutdown_sender);
    tokio::spawn(async move {
        sleep(Duration::from_millis(50)).await;
        request_shutdown(&slot, ShutdownReason::Operator).await;
    });

    let exit_code = harness.app.run().await.unwrap();
    assert_eq!(exit_code, 0);
}

#[tokio::test]
async fn telemetry_loop_appends_rows() {
    let mut harness = harness_with(Box::new(InertPins), |config| {
        config.telemetry.enabled = true;
        config.telemetry.csv_path = "power/solar.csv".to_string();
        config.telemetry.interval_seconds = 1;
    });
    let csv = harness.app.solar_csv.clone();
    harness.app.start();

    let logged = timeout(Duration::from_secs(3), async {
        loop {
            let rows = std::fs::read_to_string(&csv)
                .map(|contents| contents.lines().count())
                .unwrap_or(0);
            if rows >= 2 {
                break;
            }
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(logged.is_ok(), "telemetry rows never appeared");

    let contents = std::fs::read_to_string(&csv).unwrap();
    assert!(contents.starts_with("Date,Time,"));
    assert!(contents.contains("USB PORT ERROR"));

    harness.app.shutdown().await.unwrap();
}

#[test]
fn relative_csv_paths_land_in_home() {
    let home = Path::new("/var/lib/fieldcam");
    assert_eq!(
        resolve_csv_path("solar.csv", home),
        Path::new("/var/lib/fieldcam/solar.csv")
    );
    assert_eq!(
        resolve_csv_path("/data/solar.csv", home),
        Path::new("/data/solar.csv")
    );
}

#[tokio::test]
async fn panel_buttons_drive_the_page_cycle() {
    let mode = Arc::new(Mutex::new(VecDeque::from(vec![true])));
    let pins = ScriptedPins {
        mode: Arc::clone(&mode),
    };
    let mut harness = harness_with(Box::new(pins), |_| {});
    let buttons = Arc::clone(&harness.app.buttons);
    harness.app.start();

    let advanced = timeout(Duration::from_secs(3), async {
        loop {
            if buttons.lock().await.page() == UiPage::Solar {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(advanced.is_ok(), "mode button press never advanced the page");

    harness.app.shutdown().await.unwrap();
}
