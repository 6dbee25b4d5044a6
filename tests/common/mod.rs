//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use camera_session::hardware::simulated::{SimulatedCamera, SimulatedSurface, SimulatedSurfaces};
use camera_session::hardware::PreviewTarget;
use camera_session::{CaptureSessionController, SessionConfig, SessionEvent};
use crossbeam_channel::{unbounded, Receiver};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub struct Fixture {
    pub camera: SimulatedCamera,
    pub surface: Arc<SimulatedSurface>,
    pub controller: CaptureSessionController,
    pub events: Receiver<SessionEvent>,
    pub dir: tempfile::TempDir,
}

pub fn test_config(dir: &Path) -> SessionConfig {
    SessionConfig {
        settle_delay_ms: 5,
        ..SessionConfig::with_output_dir(dir)
    }
}

pub fn fixture(camera_name: &str) -> Fixture {
    fixture_with(camera_name, test_config)
}

/// Fixture whose session config is built from the temp directory.
pub fn fixture_with(camera_name: &str, config: impl FnOnce(&Path) -> SessionConfig) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let camera = SimulatedCamera::with_default_cameras();
    let surfaces = SimulatedSurfaces::new();
    let surface = surfaces.allocate();
    let (tx, events) = unbounded();
    let controller = CaptureSessionController::new(
        camera_name.into(),
        PreviewTarget::new(surface.clone()),
        Arc::new(camera.clone()),
        Arc::new(camera.clone()),
        Arc::new(tx),
        config(dir.path()),
    );
    Fixture {
        camera,
        surface,
        controller,
        events,
        dir,
    }
}

/// Next event, failing the test on timeout.
pub fn next_event(events: &Receiver<SessionEvent>) -> SessionEvent {
    events
        .recv_timeout(TIMEOUT)
        .expect("no session event within timeout")
}

/// Waits for `initialized`, failing on anything else.
pub fn expect_initialized(events: &Receiver<SessionEvent>) -> (u32, u32) {
    match next_event(events) {
        SessionEvent::Initialized {
            preview_width,
            preview_height,
        } => (preview_width, preview_height),
        other => panic!("expected initialized, got {other:?}"),
    }
}

pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Whether `name` looks like `IMG_yyyy_MM_dd_HH_mm_ss_SSS.jpg`.
pub fn is_capture_name(name: &str) -> bool {
    let Some(stem) = name
        .strip_prefix("IMG_")
        .and_then(|rest| rest.strip_suffix(".jpg"))
    else {
        return false;
    };
    let fields: Vec<&str> = stem.split('_').collect();
    let widths = [4, 2, 2, 2, 2, 2, 3];
    fields.len() == widths.len()
        && fields
            .iter()
            .zip(widths)
            .all(|(field, width)| field.len() == width && field.bytes().all(|b| b.is_ascii_digit()))
}
