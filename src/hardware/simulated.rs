//! Simulated camera stack for demos and tests.
//!
//! Behaves like a well-mannered platform backend: open and configure
//! complete through callbacks, still captures deliver a small JPEG into
//! the session's still output. Faults can be injected and every hardware
//! call is recorded for inspection. Open and configure callbacks can be
//! deferred and fired later to reproduce slow hardware.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::{
    CameraBackend, CameraDevice, CaptureRequest, CaptureRequestKind, CaptureSession,
    DecodeError, DeviceCallbacks, FrameProducer, HardwareError, RenderSurface, SessionCallbacks,
    SessionOutputs,
};
use crate::capabilities::{
    CameraCapabilities, CameraIdentity, CapabilitiesProvider, LensFacing, Size,
};
use crate::session::{DeviceErrorCode, SessionError};

/// A hardware call observed by the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareCall {
    /// `open_device` for a camera.
    OpenDevice(CameraIdentity),
    /// `create_capture_session` on a device.
    CreateSession { device: u64 },
    /// Repeating request installed.
    SetRepeating { device: u64, request: CaptureRequest },
    /// Repeating request cancelled.
    StopRepeating { device: u64 },
    /// One-shot request submitted.
    Capture { device: u64, request: CaptureRequest },
    /// Session released.
    CloseSession { device: u64 },
    /// Device released.
    CloseDevice { device: u64 },
}

#[derive(Default)]
struct Faults {
    deny_access: bool,
    open_error: Option<DeviceErrorCode>,
    configure_failures: u32,
    decode_failures: u32,
    hold_frames: bool,
    defer_callbacks: bool,
}

#[derive(Default)]
struct SimState {
    cameras: HashMap<CameraIdentity, CameraCapabilities>,
    faults: Faults,
    calls: Vec<HardwareCall>,
    next_device: u64,
    open_devices: HashSet<u64>,
    released_devices: Vec<u64>,
    /// Callbacks of every open attempt; index is generation order.
    device_callbacks: Vec<DeviceCallbacks>,
    deferred_opens: VecDeque<DeviceCallbacks>,
    deferred_sessions: VecDeque<(SessionCallbacks, u64, FrameProducer)>,
    configure_gate: Option<Receiver<()>>,
    /// Still output of the most recent session.
    last_still: Option<FrameProducer>,
    held_frames: Vec<FrameProducer>,
}

/// Simulated camera backend and capabilities provider.
#[derive(Clone, Default)]
pub struct SimulatedCamera {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedCamera {
    /// Creates a backend with no cameras.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend with camera `"0"` (back) and `"1"` (front).
    pub fn with_default_cameras() -> Self {
        let sizes = vec![
            Size::new(640, 480),
            Size::new(1280, 720),
            Size::new(1920, 1080),
            Size::new(4032, 3024),
        ];
        Self::new()
            .with_camera(
                "0",
                CameraCapabilities {
                    sensor_orientation: 90,
                    lens_facing: LensFacing::Back,
                    available_still_sizes: sizes.clone(),
                },
            )
            .with_camera(
                "1",
                CameraCapabilities {
                    sensor_orientation: 270,
                    lens_facing: LensFacing::Front,
                    available_still_sizes: sizes,
                },
            )
    }

    /// Registers a camera.
    pub fn with_camera(self, name: &str, capabilities: CameraCapabilities) -> Self {
        self.state
            .lock()
            .cameras
            .insert(CameraIdentity::new(name), capabilities);
        self
    }

    /// Makes `open_device` fail synchronously with an access error.
    pub fn deny_access(&self, deny: bool) {
        self.state.lock().faults.deny_access = deny;
    }

    /// Makes the next open report `code` instead of opening.
    pub fn fail_next_open(&self, code: DeviceErrorCode) {
        self.state.lock().faults.open_error = Some(code);
    }

    /// Makes the next `count` session configurations fail.
    pub fn fail_next_configures(&self, count: u32) {
        self.state.lock().faults.configure_failures = count;
    }

    /// Makes the next `count` still captures deliver a decode error.
    pub fn fail_next_decodes(&self, count: u32) {
        self.state.lock().faults.decode_failures = count;
    }

    /// While set, still captures are accepted but no frame is delivered.
    pub fn hold_frames(&self, hold: bool) {
        let held = {
            let mut state = self.state.lock();
            state.faults.hold_frames = hold;
            if hold {
                Vec::new()
            } else {
                std::mem::take(&mut state.held_frames)
            }
        };
        for producer in held {
            let _ = producer.submit(Ok(synthetic_jpeg()));
        }
    }

    /// While set, open and configure succeed but their callbacks wait for
    /// [`complete_open`](Self::complete_open) and
    /// [`complete_configure`](Self::complete_configure).
    pub fn defer_callbacks(&self, defer: bool) {
        self.state.lock().faults.defer_callbacks = defer;
    }

    /// Delivers the oldest deferred open. Returns false if none is pending.
    pub fn complete_open(&self) -> bool {
        let (callbacks, id) = {
            let mut state = self.state.lock();
            let Some(callbacks) = state.deferred_opens.pop_front() else {
                return false;
            };
            state.next_device += 1;
            let id = state.next_device;
            state.open_devices.insert(id);
            (callbacks, id)
        };
        callbacks.opened(Box::new(SimulatedDevice {
            id,
            camera: self.clone(),
        }));
        true
    }

    /// Delivers the oldest deferred session configuration. Returns false if none is pending.
    pub fn complete_configure(&self) -> bool {
        let Some((callbacks, device, still)) = self.state.lock().deferred_sessions.pop_front()
        else {
            return false;
        };
        callbacks.configured(Box::new(SimulatedSession {
            device,
            camera: self.clone(),
            still,
            repeating: false,
        }));
        true
    }

    /// Makes the next `create_capture_session` block until the returned
    /// sender fires or is dropped.
    pub fn gate_configure(&self) -> Sender<()> {
        let (release, gate) = bounded(0);
        self.state.lock().configure_gate = Some(gate);
        release
    }

    /// Pushes a frame nobody asked for into the latest session's still output.
    pub fn push_unrequested_frame(&self) -> bool {
        let still = self.state.lock().last_still.clone();
        still.is_some_and(|still| still.submit(Ok(synthetic_jpeg())).is_ok())
    }

    /// Fires a disconnect on the most recently opened device.
    pub fn disconnect(&self) {
        let callbacks = self.state.lock().device_callbacks.last().cloned();
        if let Some(callbacks) = callbacks {
            callbacks.disconnected();
        }
    }

    /// Fires a runtime error on the most recently opened device.
    pub fn raise_error(&self, code: DeviceErrorCode) {
        let callbacks = self.state.lock().device_callbacks.last().cloned();
        if let Some(callbacks) = callbacks {
            callbacks.error(code);
        }
    }

    /// Fires a disconnect and an error through the callbacks of the
    /// `attempt`-th open (1-based), as a late report about an old device.
    pub fn fail_earlier_open(&self, attempt: usize, code: DeviceErrorCode) {
        let callbacks = attempt
            .checked_sub(1)
            .and_then(|i| self.state.lock().device_callbacks.get(i).cloned());
        if let Some(callbacks) = callbacks {
            callbacks.error(code);
            callbacks.disconnected();
        }
    }

    /// All recorded hardware calls, in order.
    pub fn calls(&self) -> Vec<HardwareCall> {
        self.state.lock().calls.clone()
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&HardwareCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Devices currently open.
    pub fn open_device_count(&self) -> usize {
        self.state.lock().open_devices.len()
    }

    /// Device ids in release order. A device appearing twice was double-closed.
    pub fn released_devices(&self) -> Vec<u64> {
        self.state.lock().released_devices.clone()
    }

    fn record(&self, call: HardwareCall) {
        tracing::trace!(?call, "Simulated hardware call");
        self.state.lock().calls.push(call);
    }
}

impl CameraBackend for SimulatedCamera {
    fn open_device(
        &self,
        camera: &CameraIdentity,
        callbacks: DeviceCallbacks,
    ) -> Result<(), HardwareError> {
        self.record(HardwareCall::OpenDevice(camera.clone()));

        let mut state = self.state.lock();
        if state.faults.deny_access {
            return Err(HardwareError::Access(format!("access to camera {camera} denied")));
        }
        if !state.cameras.contains_key(camera) {
            return Err(HardwareError::Access(format!("no camera named {camera}")));
        }
        state.device_callbacks.push(callbacks.clone());

        if let Some(code) = state.faults.open_error.take() {
            drop(state);
            callbacks.error(code);
            return Ok(());
        }
        if state.faults.defer_callbacks {
            state.deferred_opens.push_back(callbacks);
            return Ok(());
        }

        state.next_device += 1;
        let id = state.next_device;
        state.open_devices.insert(id);
        drop(state);

        callbacks.opened(Box::new(SimulatedDevice {
            id,
            camera: self.clone(),
        }));
        Ok(())
    }
}

impl CapabilitiesProvider for SimulatedCamera {
    fn capabilities(&self, camera: &CameraIdentity) -> Result<CameraCapabilities, SessionError> {
        self.state
            .lock()
            .cameras
            .get(camera)
            .cloned()
            .ok_or_else(|| SessionError::DeviceAccess(format!("no camera named {camera}")))
    }
}

struct SimulatedDevice {
    id: u64,
    camera: SimulatedCamera,
}

impl CameraDevice for SimulatedDevice {
    fn create_capture_session(
        &mut self,
        outputs: SessionOutputs,
        callbacks: SessionCallbacks,
    ) -> Result<(), HardwareError> {
        self.camera
            .record(HardwareCall::CreateSession { device: self.id });

        let (fail, deferred, gate) = {
            let mut state = self.camera.state.lock();
            if !state.open_devices.contains(&self.id) {
                return Err(HardwareError::IllegalState("device is closed".into()));
            }
            let fail = state.faults.configure_failures > 0;
            if fail {
                state.faults.configure_failures -= 1;
            }
            state.last_still = Some(outputs.still.clone());
            let deferred = !fail && state.faults.defer_callbacks;
            if deferred {
                state
                    .deferred_sessions
                    .push_back((callbacks.clone(), self.id, outputs.still.clone()));
            }
            (fail, deferred, state.configure_gate.take())
        };

        if let Some(gate) = gate {
            // Returns on release or when the sender is dropped.
            let _ = gate.recv();
        }
        if deferred {
            return Ok(());
        }
        if fail {
            callbacks.configure_failed();
        } else {
            callbacks.configured(Box::new(SimulatedSession {
                device: self.id,
                camera: self.camera.clone(),
                still: outputs.still,
                repeating: false,
            }));
        }
        Ok(())
    }

    fn close(self: Box<Self>) {
        self.camera
            .record(HardwareCall::CloseDevice { device: self.id });
        let mut state = self.camera.state.lock();
        state.open_devices.remove(&self.id);
        state.released_devices.push(self.id);
    }
}

struct SimulatedSession {
    device: u64,
    camera: SimulatedCamera,
    still: FrameProducer,
    repeating: bool,
}

impl SimulatedSession {
    fn check_open(&self) -> Result<(), HardwareError> {
        if self.camera.state.lock().open_devices.contains(&self.device) {
            Ok(())
        } else {
            Err(HardwareError::IllegalState("session's device is closed".into()))
        }
    }
}

impl CaptureSession for SimulatedSession {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<(), HardwareError> {
        self.check_open()?;
        self.camera.record(HardwareCall::SetRepeating {
            device: self.device,
            request: *request,
        });
        self.repeating = true;
        Ok(())
    }

    fn stop_repeating(&mut self) -> Result<(), HardwareError> {
        self.check_open()?;
        self.camera
            .record(HardwareCall::StopRepeating { device: self.device });
        self.repeating = false;
        Ok(())
    }

    fn capture(&mut self, request: &CaptureRequest) -> Result<(), HardwareError> {
        self.check_open()?;
        if request.kind != CaptureRequestKind::StillCapture {
            return Err(HardwareError::IllegalState("capture expects a still request".into()));
        }
        self.camera.record(HardwareCall::Capture {
            device: self.device,
            request: *request,
        });

        let frame = {
            let mut state = self.camera.state.lock();
            if state.faults.hold_frames {
                state.held_frames.push(self.still.clone());
                return Ok(());
            }
            if state.faults.decode_failures > 0 {
                state.faults.decode_failures -= 1;
                Err(DecodeError("corrupt sensor buffer".into()))
            } else {
                Ok(synthetic_jpeg())
            }
        };

        // Delivered from a separate thread, as the image reader would.
        let still = self.still.clone();
        std::thread::spawn(move || {
            if let Err(e) = still.submit(frame) {
                tracing::warn!(error = %e, "Simulated frame dropped");
            }
        });
        Ok(())
    }

    fn close(self: Box<Self>) {
        self.camera
            .record(HardwareCall::CloseSession { device: self.device });
    }
}

/// Smallest well-formed JPEG header the writer will accept.
fn synthetic_jpeg() -> Vec<u8> {
    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    jpeg.extend_from_slice(b"JFIF\0");
    jpeg.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

/// In-memory render surface.
pub struct SimulatedSurface {
    id: u64,
    buffer_size: Mutex<Option<Size>>,
    released: AtomicBool,
}

impl SimulatedSurface {
    /// Creates a surface with the given id.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            buffer_size: Mutex::new(None),
            released: AtomicBool::new(false),
        }
    }

    /// Buffer size last set by the session.
    pub fn buffer_size(&self) -> Option<Size> {
        *self.buffer_size.lock()
    }

    /// Whether the session has released the surface.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl RenderSurface for SimulatedSurface {
    fn id(&self) -> u64 {
        self.id
    }

    fn set_buffer_size(&self, size: Size) {
        *self.buffer_size.lock() = Some(size);
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Hands out simulated surfaces with increasing ids.
#[derive(Default)]
pub struct SimulatedSurfaces {
    next_id: AtomicU64,
    created: Mutex<Vec<Arc<SimulatedSurface>>>,
}

impl SimulatedSurfaces {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new surface.
    pub fn allocate(&self) -> Arc<SimulatedSurface> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let surface = Arc::new(SimulatedSurface::new(id));
        self.created.lock().push(Arc::clone(&surface));
        surface
    }

    /// Surface with `id`, if it was allocated here.
    pub fn get(&self, id: u64) -> Option<Arc<SimulatedSurface>> {
        self.created.lock().iter().find(|s| s.id == id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{HardwareEvent, OutputSink, PreviewTarget};
    use crate::session::FocusPolicy;
    use crossbeam_channel::unbounded;

    fn capture_events() -> (DeviceCallbacks, crossbeam_channel::Receiver<HardwareEvent>) {
        let (tx, rx) = unbounded();
        let poster: crate::hardware::EventPoster = Arc::new(move |event| {
            let _ = tx.send(event);
        });
        (DeviceCallbacks::new(1, poster), rx)
    }

    #[test]
    fn test_open_delivers_device() {
        let camera = SimulatedCamera::with_default_cameras();
        let (callbacks, events) = capture_events();

        camera.open_device(&"0".into(), callbacks).unwrap();

        assert!(matches!(
            events.try_recv(),
            Ok(HardwareEvent::DeviceOpened { generation: 1, .. })
        ));
        assert_eq!(camera.open_device_count(), 1);
    }

    #[test]
    fn test_deferred_open_waits_for_completion() {
        let camera = SimulatedCamera::with_default_cameras();
        camera.defer_callbacks(true);
        let (callbacks, events) = capture_events();

        camera.open_device(&"0".into(), callbacks).unwrap();
        assert!(events.try_recv().is_err());
        assert_eq!(camera.open_device_count(), 0);

        assert!(camera.complete_open());
        assert!(matches!(
            events.try_recv(),
            Ok(HardwareEvent::DeviceOpened { generation: 1, .. })
        ));
        assert!(!camera.complete_open());
        assert!(!camera.complete_configure());
    }

    #[test]
    fn test_unknown_camera_is_access_error() {
        let camera = SimulatedCamera::new();
        let (callbacks, _events) = capture_events();
        assert!(matches!(
            camera.open_device(&"9".into(), callbacks),
            Err(HardwareError::Access(_))
        ));
    }

    #[test]
    fn test_injected_open_error() {
        let camera = SimulatedCamera::with_default_cameras();
        camera.fail_next_open(DeviceErrorCode::MaxCamerasInUse);
        let (callbacks, events) = capture_events();

        camera.open_device(&"0".into(), callbacks).unwrap();

        assert!(matches!(
            events.try_recv(),
            Ok(HardwareEvent::DeviceError {
                code: DeviceErrorCode::MaxCamerasInUse,
                ..
            })
        ));
        assert_eq!(camera.open_device_count(), 0);
    }

    #[test]
    fn test_session_calls_fail_after_device_close() {
        let camera = SimulatedCamera::with_default_cameras();
        let (callbacks, events) = capture_events();
        camera.open_device(&"0".into(), callbacks.clone()).unwrap();
        let Ok(HardwareEvent::DeviceOpened { mut device, .. }) = events.try_recv() else {
            panic!("expected device");
        };

        let sink = OutputSink::new(Size::new(640, 480));
        let surfaces = SimulatedSurfaces::new();
        let outputs = SessionOutputs {
            preview: PreviewTarget::new(surfaces.allocate()),
            still: sink.producer(),
        };
        let (session_tx, session_rx) = unbounded();
        let poster: crate::hardware::EventPoster = Arc::new(move |event| {
            let _ = session_tx.send(event);
        });
        device
            .create_capture_session(outputs, SessionCallbacks::new(1, poster))
            .unwrap();
        let Ok(HardwareEvent::SessionConfigured { mut session, .. }) = session_rx.try_recv() else {
            panic!("expected session");
        };

        device.close();
        assert!(session
            .set_repeating_request(&CaptureRequest::preview(FocusPolicy::Fixed))
            .is_err());
        assert_eq!(camera.released_devices(), vec![1]);
    }
}
