//! Command surface end to end: create, initialize, takePicture, dispose.

mod common;

use camera_session::hardware::simulated::{SimulatedCamera, SimulatedSurfaces};
use camera_session::metrics::MetricsRegistry;
use camera_session::{CameraService, ServiceError, SessionEvent, SessionEventSink, StateKind};
use common::{expect_initialized, is_capture_name, next_event, test_config, wait_until, TIMEOUT};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, OnceLock, Weak};

struct Setup {
    service: CameraService,
    camera: SimulatedCamera,
    surfaces: Arc<SimulatedSurfaces>,
    events: Receiver<SessionEvent>,
    _dir: tempfile::TempDir,
}

fn setup() -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let camera = SimulatedCamera::with_default_cameras();
    let surfaces = Arc::new(SimulatedSurfaces::new());
    let (tx, events) = unbounded();
    let service = CameraService::new(
        Arc::new(camera.clone()),
        Arc::new(camera.clone()),
        surfaces.clone(),
        Arc::new(tx),
        test_config(dir.path()),
    );
    Setup {
        service,
        camera,
        surfaces,
        events,
        _dir: dir,
    }
}

#[test]
fn test_initialize_before_create_is_camera_not_found() {
    let s = setup();
    let err = s.service.initialize().unwrap_err();

    assert_eq!(err.code(), "cameraNotFound");
    assert_eq!(
        err.to_string(),
        "Camera not found. Please call the 'create' method before calling 'initialize'."
    );
    assert!(s.camera.calls().is_empty());
}

#[test]
fn test_create_initialize_take_picture() {
    let s = setup();
    s.service.create("0").unwrap();
    s.service.initialize().unwrap();
    assert_eq!(expect_initialized(&s.events), (4032, 3024));

    for _ in 0..2 {
        let path = s
            .service
            .take_picture()
            .unwrap()
            .wait_timeout(TIMEOUT)
            .expect("capture did not finish")
            .unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(is_capture_name(name), "unexpected file name {name}");
        assert!(path.exists());
    }
    assert_eq!(s.service.state(), Some(StateKind::SessionReady));
    assert_eq!(s.service.snapshot().unwrap().stats.captures_succeeded, 2);
}

#[test]
fn test_take_picture_before_initialize_is_invalid_state() {
    let s = setup();
    s.service.create("0").unwrap();

    let err = s.service.take_picture().unwrap_err();
    assert_eq!(err.code(), "invalidState");
    assert!(matches!(err, ServiceError::Session(_)));
}

#[test]
fn test_dispose_is_idempotent_and_releases_surface() {
    let s = setup();
    let surface_id = s.service.create("1").unwrap();
    s.service.initialize().unwrap();
    expect_initialized(&s.events);

    s.service.pause_preview().unwrap();
    s.service.dispose().unwrap();
    assert_eq!(next_event(&s.events), SessionEvent::Closing);

    let surface = s.surfaces.get(surface_id).unwrap();
    wait_until(|| surface.is_released());
    assert_eq!(s.camera.open_device_count(), 0);

    assert!(s.service.dispose().is_ok());
    assert!(s.service.resume_preview().is_ok());
    assert_eq!(s.service.state(), None);
}

#[test]
fn test_access_denied_reports_error() {
    let s = setup();
    s.camera.deny_access(true);
    s.service.create("0").unwrap();
    s.service.initialize().unwrap();

    match next_event(&s.events) {
        SessionEvent::Error { description } => {
            assert!(description.unwrap().contains("denied"));
        }
        other => panic!("expected error, got {other:?}"),
    }
    wait_until(|| s.service.state() == Some(StateKind::Closed));
}

/// Reads the service state back from inside each notification.
struct StateReadingSink {
    service: OnceLock<Weak<CameraService>>,
    seen: Sender<(&'static str, Option<StateKind>)>,
}

impl StateReadingSink {
    fn record(&self, event: &'static str) {
        let state = self
            .service
            .get()
            .and_then(Weak::upgrade)
            .and_then(|service| service.state());
        let _ = self.seen.send((event, state));
    }
}

impl SessionEventSink for StateReadingSink {
    fn on_initialized(&self, _preview_width: u32, _preview_height: u32) {
        self.record("initialized");
    }

    fn on_closing(&self) {
        self.record("closing");
    }

    fn on_error(&self, _description: Option<&str>) {
        self.record("error");
    }
}

#[test]
fn test_sink_can_query_service_during_notifications() {
    let dir = tempfile::tempdir().unwrap();
    let camera = SimulatedCamera::with_default_cameras();
    let (tx, seen) = unbounded();
    let sink = Arc::new(StateReadingSink {
        service: OnceLock::new(),
        seen: tx,
    });
    let service = Arc::new(CameraService::new(
        Arc::new(camera.clone()),
        Arc::new(camera.clone()),
        Arc::new(SimulatedSurfaces::new()),
        sink.clone(),
        test_config(dir.path()),
    ));
    assert!(sink.service.set(Arc::downgrade(&service)).is_ok());

    service.create("0").unwrap();
    service.initialize().unwrap();
    assert_eq!(
        seen.recv_timeout(TIMEOUT),
        Ok(("initialized", Some(StateKind::SessionReady)))
    );
    // The device queue is still live after the callback.
    assert!(service
        .take_picture()
        .unwrap()
        .wait_timeout(TIMEOUT)
        .is_some());

    service.dispose().unwrap();
    assert_eq!(seen.recv_timeout(TIMEOUT), Ok(("closing", None)));
    wait_until(|| camera.open_device_count() == 0);
}

#[test]
fn test_counters_survive_create() {
    let s = setup();
    let registry = MetricsRegistry::new().unwrap();

    s.service.create("0").unwrap();
    s.service.initialize().unwrap();
    expect_initialized(&s.events);
    let first = s.service.take_picture().unwrap().wait_timeout(TIMEOUT);
    assert!(matches!(first, Some(Ok(_))));
    registry.update(&s.service.snapshot().unwrap());

    s.service.create("1").unwrap();
    assert_eq!(next_event(&s.events), SessionEvent::Closing);
    let carried = s.service.snapshot().unwrap();
    assert_eq!(carried.state, StateKind::Closed);
    assert_eq!(carried.stats.opens, 1);
    assert_eq!(carried.stats.captures_succeeded, 1);

    s.service.initialize().unwrap();
    expect_initialized(&s.events);
    let second = s.service.take_picture().unwrap().wait_timeout(TIMEOUT);
    assert!(matches!(second, Some(Ok(_))));
    registry.update(&s.service.snapshot().unwrap());

    let output = registry.encode().unwrap();
    assert!(output.contains("camera_session_opens_total 2"));
    assert!(output.contains("camera_session_captures_total 2"));
}
