//! The camera session state machine.
//!
//! Client commands, device callbacks and image-ready notifications all
//! arrive as [`Event`]s on the session's device queue, so every state
//! transition is totally ordered. The image queue decodes and writes
//! stills and reports back with an explicit post, never a direct call.
//!
//! ```text
//! Closed --open--> Opening --opened--> ConfiguringSession --configured--> SessionReady
//!                                         |                                 |    ^
//!                                  configure failed                   capture |    | image stored
//!                                         v                                 v    |
//!                                       Opened                           Capturing
//! ```

use parking_lot::Mutex;
use serde::Serialize;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::state::{ActiveSession, OpenDevice, PreviewStream, SessionState};
use super::{
    CaptureOutcome, CaptureTicket, PendingResult, SessionConfig, SessionError, SessionEventSink,
    StateKind,
};
use crate::capabilities::{
    resolve_output_size, CameraIdentity, CapabilitiesProvider, Size,
};
use crate::executor::{ExecutionContext, QueueHandle};
use crate::hardware::{
    CameraBackend, CameraDevice, CaptureRequest, DeviceCallbacks, EventPoster, HardwareEvent,
    OutputSink, PreviewTarget, SessionCallbacks, SessionOutputs, StillFrame,
};
use crate::orientation::{exif_orientation, ExifOrientation};
use crate::storage::StillCaptureFileWriter;

/// Counters accumulated over the controller's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Device-open attempts.
    pub opens: u64,
    /// Stills written successfully.
    pub captures_succeeded: u64,
    /// Stills that resolved with an error.
    pub captures_failed: u64,
    /// Device errors reported by the hardware.
    pub device_errors: u64,
    /// Failed session configurations.
    pub configure_failures: u64,
}

impl SessionStats {
    /// Adds another set of counters to this one.
    pub fn accumulate(&mut self, other: &SessionStats) {
        self.opens += other.opens;
        self.captures_succeeded += other.captures_succeeded;
        self.captures_failed += other.captures_failed;
        self.device_errors += other.device_errors;
        self.configure_failures += other.configure_failures;
    }
}

enum Event {
    Open,
    Capture(PendingResult),
    PausePreview,
    ResumePreview,
    Close { dispose: bool },
    ArmPreview { generation: u64 },
    CaptureFinished { generation: u64, outcome: CaptureOutcome },
    Hardware(HardwareEvent),
}

/// A client notification raised by a transition.
///
/// Queued on the core and delivered after its lock is released, so a
/// sink may call back into the controller.
#[derive(Debug)]
enum Notice {
    Initialized(Size),
    Closing,
    Error(String),
}

impl Notice {
    fn deliver(self, sink: &dyn SessionEventSink) {
        match self {
            Self::Initialized(size) => sink.on_initialized(size.width, size.height),
            Self::Closing => sink.on_closing(),
            Self::Error(description) => sink.on_error(Some(&description)),
        }
    }
}

struct Core {
    state: SessionState,
    generation: u64,
    preview: Option<PreviewTarget>,
    preview_paused: bool,
    stats: SessionStats,
    notices: Vec<Notice>,
}

impl Core {
    fn error(&mut self, description: impl Into<String>) {
        self.notices.push(Notice::Error(description.into()));
    }
}

struct Shared {
    camera: CameraIdentity,
    config: SessionConfig,
    backend: Arc<dyn CameraBackend>,
    capabilities: Arc<dyn CapabilitiesProvider>,
    events: Arc<dyn SessionEventSink>,
    writer: StillCaptureFileWriter,
    disposed: AtomicBool,
    context: Mutex<Option<ExecutionContext>>,
    core: Mutex<Core>,
}

/// Controller for one logical camera session.
///
/// Every operation returns immediately; results arrive through the
/// [`SessionEventSink`] or a [`CaptureTicket`]. Dropping the controller
/// disposes it.
pub struct CaptureSessionController {
    shared: Arc<Shared>,
}

impl CaptureSessionController {
    /// Creates a closed controller bound to `camera` and the caller's preview surface.
    pub fn new(
        camera: CameraIdentity,
        preview: PreviewTarget,
        backend: Arc<dyn CameraBackend>,
        capabilities: Arc<dyn CapabilitiesProvider>,
        events: Arc<dyn SessionEventSink>,
        config: SessionConfig,
    ) -> Self {
        let writer = StillCaptureFileWriter::new(config.output_dir.clone());
        Self {
            shared: Arc::new(Shared {
                camera,
                config,
                backend,
                capabilities,
                events,
                writer,
                disposed: AtomicBool::new(false),
                context: Mutex::new(None),
                core: Mutex::new(Core {
                    state: SessionState::Closed,
                    generation: 0,
                    preview: Some(preview),
                    preview_paused: false,
                    stats: SessionStats::default(),
                    notices: Vec::new(),
                }),
            }),
        }
    }

    /// Camera this controller drives.
    pub fn camera(&self) -> &CameraIdentity {
        &self.shared.camera
    }

    /// Current state.
    pub fn state(&self) -> StateKind {
        self.shared.core.lock().state.kind()
    }

    /// Lifetime counters.
    pub fn stats(&self) -> SessionStats {
        self.shared.core.lock().stats
    }

    /// Whether the client has paused the preview.
    pub fn is_preview_paused(&self) -> bool {
        self.shared.core.lock().preview_paused
    }

    /// Output size the session uses, from static capabilities.
    pub fn preview_size(&self) -> Result<Size, SessionError> {
        let capabilities = self.shared.capabilities.capabilities(&self.shared.camera)?;
        resolve_output_size(
            &capabilities.available_still_sizes,
            &self.shared.config.size_policy,
        )
    }

    /// Opens the device and configures the session.
    ///
    /// Completion is signalled by `on_initialized`; failures by `on_error`.
    /// From `Opened` (after a configuration failure) this retries
    /// configuration on the held device.
    pub fn open(&self) -> Result<(), SessionError> {
        if self.shared.disposed.load(Ordering::SeqCst) {
            return Err(SessionError::InvalidState {
                operation: "open",
                state: StateKind::Closed,
            });
        }
        self.shared.post_device(Event::Open, true)?;
        Ok(())
    }

    /// Takes a still picture.
    ///
    /// Fails immediately when the session has no queues (never opened, or
    /// closed). Otherwise the ticket resolves with the written file, or
    /// with `InvalidState` if the session was not ready.
    pub fn take_picture(&self) -> Result<CaptureTicket, SessionError> {
        let (pending, ticket) = PendingResult::channel();
        if self.shared.post_device(Event::Capture(pending), false)? {
            Ok(ticket)
        } else {
            Err(SessionError::InvalidState {
                operation: "takePicture",
                state: self.state(),
            })
        }
    }

    /// Stops the repeating preview request.
    pub fn pause_preview(&self) -> Result<(), SessionError> {
        self.post_if_running(Event::PausePreview)
    }

    /// Re-arms the repeating preview request.
    pub fn resume_preview(&self) -> Result<(), SessionError> {
        self.post_if_running(Event::ResumePreview)
    }

    /// Releases all hardware handles and both queues. The preview surface is kept.
    pub fn close(&self) -> Result<(), SessionError> {
        self.post_if_running(Event::Close { dispose: false })
    }

    /// Closes the session and releases the preview surface. Terminal.
    pub fn dispose(&self) -> Result<(), SessionError> {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!(camera = %self.shared.camera, "Disposing camera session");

        if let Ok(true) = self.shared.post_device(Event::Close { dispose: true }, false) {
            return Ok(());
        }
        // No queue: nothing is open, only the surface remains.
        if let Some(preview) = self.shared.core.lock().preview.take() {
            preview.surface().release();
        }
        Ok(())
    }

    fn post_if_running(&self, event: Event) -> Result<(), SessionError> {
        self.shared.post_device(event, false).map(|_| ())
    }
}

impl Drop for CaptureSessionController {
    fn drop(&mut self) {
        let _ = self.dispose();
    }
}

impl std::fmt::Debug for CaptureSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSessionController")
            .field("camera", &self.shared.camera)
            .field("state", &self.state())
            .finish()
    }
}

impl Shared {
    fn start_queues(&self) -> Result<QueueHandle, SessionError> {
        let mut context = self.context.lock();
        if let Some(context) = context.as_ref() {
            return Ok(context.device());
        }
        let started = ExecutionContext::start(&format!("camera-{}", self.camera))?;
        let queue = started.device();
        *context = Some(started);
        Ok(queue)
    }

    fn device_queue(&self) -> Option<QueueHandle> {
        self.context.lock().as_ref().map(ExecutionContext::device)
    }

    fn release_queues(&self) {
        let context = self.context.lock().take();
        if let Some(context) = context {
            context.shutdown();
        }
    }

    /// Posts a client command to the device queue.
    ///
    /// Runs under the context lock, so a command either precedes the
    /// queue's shutdown or lands on a fresh queue. Returns `false` when
    /// there are no queues and `start` is unset.
    fn post_device(self: &Arc<Self>, event: Event, start: bool) -> Result<bool, SessionError> {
        let mut context = self.context.lock();
        if context.is_none() {
            if !start {
                return Ok(false);
            }
            *context = Some(ExecutionContext::start(&format!("camera-{}", self.camera))?);
        }
        let Some(context) = context.as_ref() else {
            return Ok(false);
        };
        let shared = Arc::clone(self);
        context.device().post(move || shared.dispatch(event))?;
        Ok(true)
    }

    /// Callback sink for hardware handles. Holds the controller weakly.
    fn poster(self: &Arc<Self>, queue: QueueHandle) -> EventPoster {
        let weak = Arc::downgrade(self);
        Arc::new(move |event: HardwareEvent| {
            let mut in_flight = InFlight(Some(event));
            let weak = weak.clone();
            let posted = queue.post(move || {
                if let Some(shared) = weak.upgrade() {
                    if let Some(event) = in_flight.0.take() {
                        shared.dispatch(Event::Hardware(event));
                    }
                }
            });
            if posted.is_err() {
                tracing::debug!("Hardware event after queue shutdown; handles released");
            }
        })
    }

    fn dispatch(self: &Arc<Self>, event: Event) {
        let mut guard = self.core.lock();
        let core = &mut *guard;
        self.apply(core, event);
        let notices = mem::take(&mut core.notices);
        drop(guard);

        for notice in notices {
            notice.deliver(self.events.as_ref());
        }
    }

    fn apply(self: &Arc<Self>, core: &mut Core, event: Event) {
        match event {
            Event::Open => self.handle_open(core),
            Event::Capture(pending) => self.handle_capture(core, pending),
            Event::PausePreview => self.handle_pause(core),
            Event::ResumePreview => self.handle_resume(core),
            Event::Close { dispose } => self.handle_close(core, dispose),
            Event::ArmPreview { generation } => self.handle_arm_preview(core, generation),
            Event::CaptureFinished {
                generation,
                outcome,
            } => self.handle_capture_finished(core, generation, outcome),
            Event::Hardware(event) => self.handle_hardware(core, event),
        }
    }

    fn handle_open(self: &Arc<Self>, core: &mut Core) {
        match mem::replace(&mut core.state, SessionState::Closing) {
            SessionState::Closed => {}
            SessionState::Opened(device) => {
                tracing::info!(camera = %self.camera, "Retrying session configuration");
                self.configure_session(core, device);
                return;
            }
            other => {
                tracing::debug!(camera = %self.camera, state = %other.kind(), "Open ignored");
                core.state = other;
                return;
            }
        }
        core.state = SessionState::Closed;

        if core.preview.is_none() {
            core.error("The preview surface has been released.");
            return;
        }
        let queue = match self.start_queues() {
            Ok(queue) => queue,
            Err(e) => {
                core.error(e.to_string());
                return;
            }
        };

        core.generation += 1;
        core.stats.opens += 1;
        let generation = core.generation;
        core.state = SessionState::Opening { generation };
        tracing::info!(camera = %self.camera, generation, "Opening camera device");

        let callbacks = DeviceCallbacks::new(generation, self.poster(queue));
        if let Err(e) = self.backend.open_device(&self.camera, callbacks) {
            tracing::error!(camera = %self.camera, error = %e, "Camera open rejected");
            core.state = SessionState::Closed;
            core.error(SessionError::from(e).to_string());
            self.release_queues();
        }
    }

    fn handle_hardware(self: &Arc<Self>, core: &mut Core, event: HardwareEvent) {
        match event {
            HardwareEvent::DeviceOpened { generation, device } => {
                if matches!(core.state, SessionState::Opening { generation: g } if g == generation)
                {
                    self.on_device_opened(core, generation, device);
                } else {
                    tracing::warn!(generation, "Device opened for a stale request; closing it");
                    device.close();
                }
            }
            HardwareEvent::DeviceDisconnected { generation } => {
                if core.state.generation() != Some(generation) {
                    tracing::debug!(generation, "Stale disconnect ignored");
                    return;
                }
                tracing::warn!(camera = %self.camera, generation, "Camera disconnected");
                let previous = teardown(core);
                if previous != StateKind::Opening {
                    core.notices.push(Notice::Closing);
                }
                self.release_queues();
            }
            HardwareEvent::DeviceError { generation, code } => {
                if core.state.generation() != Some(generation) {
                    tracing::debug!(generation, ?code, "Stale device error ignored");
                    return;
                }
                tracing::error!(camera = %self.camera, ?code, "Camera device error");
                core.stats.device_errors += 1;
                teardown(core);
                core.error(code.description());
                self.release_queues();
            }
            HardwareEvent::SessionConfigured {
                generation,
                session,
            } => match mem::replace(&mut core.state, SessionState::Closing) {
                SessionState::ConfiguringSession(device) if device.generation == generation => {
                    let size = device.output.size();
                    let preview = if core.preview_paused {
                        PreviewStream::Stopped
                    } else {
                        PreviewStream::Settling
                    };
                    core.state = SessionState::SessionReady {
                        device,
                        session: ActiveSession { session, preview },
                    };
                    tracing::info!(camera = %self.camera, generation, %size, "Capture session configured");
                    core.notices.push(Notice::Initialized(size));
                    if preview == PreviewStream::Settling {
                        self.schedule_preview(generation);
                    }
                }
                other => {
                    core.state = other;
                    session.close();
                    if generation == core.generation {
                        core.error("The camera was closed during configuration.");
                    } else {
                        tracing::debug!(generation, "Stale session configured; closed");
                    }
                }
            },
            HardwareEvent::SessionConfigureFailed { generation } => {
                match mem::replace(&mut core.state, SessionState::Closing) {
                    SessionState::ConfiguringSession(device) if device.generation == generation => {
                        tracing::warn!(camera = %self.camera, generation, "Session configuration failed");
                        core.stats.configure_failures += 1;
                        core.state = SessionState::Opened(device);
                        core.error("Failed to configure camera session.");
                    }
                    other => {
                        core.state = other;
                        tracing::debug!(generation, "Stale configure failure ignored");
                    }
                }
            }
        }
    }

    fn on_device_opened(
        self: &Arc<Self>,
        core: &mut Core,
        generation: u64,
        device: Box<dyn CameraDevice>,
    ) {
        let resolved = self.capabilities.capabilities(&self.camera).and_then(|caps| {
            resolve_output_size(&caps.available_still_sizes, &self.config.size_policy)
                .map(|size| (caps, size))
        });
        let (capabilities, size) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::error!(camera = %self.camera, error = %e, "Cannot use opened camera");
                device.close();
                core.state = SessionState::Closed;
                core.error(e.to_string());
                self.release_queues();
                return;
            }
        };

        if let Some(preview) = &core.preview {
            preview.surface().set_buffer_size(size);
        }
        tracing::info!(camera = %self.camera, generation, %size, "Camera device opened");

        self.configure_session(
            core,
            OpenDevice {
                generation,
                device,
                output: OutputSink::new(size),
                capabilities,
            },
        );
    }

    fn configure_session(self: &Arc<Self>, core: &mut Core, mut open: OpenDevice) {
        let (Some(preview), Some(queue)) = (core.preview.clone(), self.device_queue()) else {
            open.release();
            core.state = SessionState::Closed;
            return;
        };

        let outputs = SessionOutputs {
            preview,
            still: open.output.producer(),
        };
        let callbacks = SessionCallbacks::new(open.generation, self.poster(queue));
        match open.device.create_capture_session(outputs, callbacks) {
            Ok(()) => core.state = SessionState::ConfiguringSession(open),
            Err(e) => {
                tracing::warn!(camera = %self.camera, error = %e, "Session configuration rejected");
                core.stats.configure_failures += 1;
                core.state = SessionState::Opened(open);
                core.error(SessionError::SessionConfiguration(e.to_string()).to_string());
            }
        }
    }

    /// Arms the repeating preview after the settle delay.
    fn schedule_preview(self: &Arc<Self>, generation: u64) {
        let Some(queue) = self.device_queue() else {
            return;
        };
        let shared = Arc::clone(self);
        let delay = self.config.settle_delay();
        if let Err(e) = queue.post_delayed(delay, move || {
            shared.dispatch(Event::ArmPreview { generation });
        }) {
            tracing::debug!(error = %e, "Preview arm not scheduled");
        }
    }

    fn handle_arm_preview(&self, core: &mut Core, generation: u64) {
        let Core {
            state,
            preview_paused,
            notices,
            ..
        } = core;
        if let SessionState::SessionReady { device, session } = state {
            if device.generation == generation
                && session.preview == PreviewStream::Settling
                && !*preview_paused
            {
                self.start_repeating(session, notices);
            }
        }
    }

    fn start_repeating(&self, session: &mut ActiveSession, notices: &mut Vec<Notice>) {
        let request = CaptureRequest::preview(self.config.focus_policy);
        match session.session.set_repeating_request(&request) {
            Ok(()) => {
                session.preview = PreviewStream::Streaming;
                tracing::debug!(camera = %self.camera, "Repeating preview request armed");
            }
            Err(e) => {
                session.preview = PreviewStream::Stopped;
                tracing::error!(camera = %self.camera, error = %e, "Failed to arm preview");
                notices.push(Notice::Error(e.to_string()));
            }
        }
    }

    fn handle_capture(self: &Arc<Self>, core: &mut Core, pending: PendingResult) {
        let (device, mut session) = match mem::replace(&mut core.state, SessionState::Closing) {
            SessionState::SessionReady { device, session } => (device, session),
            other => {
                let state = other.kind();
                core.state = other;
                tracing::debug!(camera = %self.camera, %state, "Capture rejected");
                pending.resolve(Err(SessionError::InvalidState {
                    operation: "takePicture",
                    state,
                }));
                return;
            }
        };

        let was_streaming = session.preview == PreviewStream::Streaming;
        if was_streaming {
            if let Err(e) = session.session.stop_repeating() {
                core.state = SessionState::SessionReady { device, session };
                pending.resolve(Err(e.into()));
                return;
            }
        }
        session.preview = PreviewStream::Stopped;

        let rotation = self
            .config
            .rotation_degrees
            .unwrap_or_else(|| device.capabilities.rotation_degrees());
        let orientation = exif_orientation(rotation, device.capabilities.lens_facing.is_mirrored());

        // The slot holds one frame; a leftover would block this capture's.
        if device.output.reader().acquire_next().is_some() {
            tracing::debug!(camera = %self.camera, "Discarded unrequested still frame");
        }
        let armed = self.install_image_listener(&device, orientation).and_then(|()| {
            session
                .session
                .capture(&CaptureRequest::still(self.config.focus_policy))
                .map_err(SessionError::from)
        });

        match armed {
            Ok(()) => {
                tracing::debug!(camera = %self.camera, ?orientation, "Still capture requested");
                core.state = SessionState::Capturing {
                    device,
                    session,
                    pending,
                };
            }
            Err(e) => {
                tracing::warn!(camera = %self.camera, error = %e, "Still capture not started");
                device.output.clear_listener();
                core.stats.captures_failed += 1;
                pending.resolve(Err(e));
                if was_streaming && !core.preview_paused {
                    self.start_repeating(&mut session, &mut core.notices);
                }
                core.state = SessionState::SessionReady { device, session };
            }
        }
    }

    /// Routes the next still frame through the image queue and back.
    fn install_image_listener(
        self: &Arc<Self>,
        device: &OpenDevice,
        orientation: ExifOrientation,
    ) -> Result<(), SessionError> {
        let (image_queue, device_queue) = {
            let context = self.context.lock();
            let context = context
                .as_ref()
                .ok_or_else(|| SessionError::Executor("session queues are shut down".into()))?;
            (context.image(), context.device())
        };

        let reader = device.output.reader();
        let writer = self.writer.clone();
        let generation = device.generation;
        let weak = Arc::downgrade(self);

        device.output.set_listener(move || {
            let reader = reader.clone();
            let writer = writer.clone();
            let device_queue = device_queue.clone();
            let weak = weak.clone();
            let posted = image_queue.post(move || {
                let Some(frame) = reader.acquire_next() else {
                    tracing::debug!("Image available but slot empty");
                    return;
                };
                let outcome = store_frame(&writer, frame, orientation);
                let reported = device_queue.post(move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.dispatch(Event::CaptureFinished {
                            generation,
                            outcome,
                        });
                    }
                });
                if reported.is_err() {
                    tracing::warn!("Capture finished after the session closed");
                }
            });
            if posted.is_err() {
                tracing::warn!("Image available after the image queue shut down");
            }
        });
        Ok(())
    }

    fn handle_capture_finished(
        self: &Arc<Self>,
        core: &mut Core,
        generation: u64,
        outcome: CaptureOutcome,
    ) {
        match mem::replace(&mut core.state, SessionState::Closing) {
            SessionState::Capturing {
                device,
                mut session,
                pending,
            } if device.generation == generation => {
                device.output.clear_listener();
                let succeeded = outcome.is_ok();
                match &outcome {
                    Ok(path) => {
                        core.stats.captures_succeeded += 1;
                        tracing::info!(camera = %self.camera, path = %path.display(), "Picture taken");
                    }
                    Err(e) => {
                        core.stats.captures_failed += 1;
                        tracing::warn!(camera = %self.camera, error = %e, "Picture failed");
                    }
                }
                pending.resolve(outcome);

                // Only a successful capture restarts the preview on its own.
                let restart = succeeded && !core.preview_paused;
                session.preview = if restart {
                    PreviewStream::Settling
                } else {
                    PreviewStream::Stopped
                };
                core.state = SessionState::SessionReady { device, session };
                if restart {
                    self.schedule_preview(generation);
                }
            }
            other => {
                core.state = other;
                tracing::debug!(generation, "Capture result for a closed session discarded");
            }
        }
    }

    fn handle_pause(&self, core: &mut Core) {
        core.preview_paused = true;
        if let SessionState::SessionReady { session, .. } = &mut core.state {
            if session.preview == PreviewStream::Streaming {
                if let Err(e) = session.session.stop_repeating() {
                    core.notices.push(Notice::Error(e.to_string()));
                }
            }
            session.preview = PreviewStream::Stopped;
        }
        tracing::debug!(camera = %self.camera, "Preview paused");
    }

    fn handle_resume(&self, core: &mut Core) {
        core.preview_paused = false;
        if let SessionState::SessionReady { session, .. } = &mut core.state {
            if session.preview != PreviewStream::Streaming {
                self.start_repeating(session, &mut core.notices);
            }
        }
        tracing::debug!(camera = %self.camera, "Preview resumed");
    }

    fn handle_close(&self, core: &mut Core, dispose: bool) {
        let previous = teardown(core);
        core.preview_paused = false;
        if previous != StateKind::Closed {
            tracing::info!(camera = %self.camera, from = %previous, "Camera session closed");
            core.notices.push(Notice::Closing);
        }
        if dispose {
            if let Some(preview) = core.preview.take() {
                preview.surface().release();
            }
        }
        self.release_queues();
    }
}

/// Releases every handle and leaves the core `Closed`. Returns the prior state.
fn teardown(core: &mut Core) -> StateKind {
    let state = mem::replace(&mut core.state, SessionState::Closing);
    let previous = state.kind();
    state.release();
    core.state = SessionState::Closed;
    previous
}

/// A hardware event on its way to the device queue.
///
/// Dropped undelivered (queue gone, controller gone), it closes any
/// handle it carries.
struct InFlight(Option<HardwareEvent>);

impl Drop for InFlight {
    fn drop(&mut self) {
        match self.0.take() {
            Some(HardwareEvent::DeviceOpened { device, .. }) => device.close(),
            Some(HardwareEvent::SessionConfigured { session, .. }) => session.close(),
            _ => {}
        }
    }
}

fn store_frame(
    writer: &StillCaptureFileWriter,
    frame: StillFrame,
    orientation: ExifOrientation,
) -> CaptureOutcome {
    let bytes = frame.map_err(|e| SessionError::CaptureIo(e.to_string()))?;
    writer
        .write(&bytes, orientation)
        .map_err(|e| SessionError::CaptureIo(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::simulated::{HardwareCall, SimulatedCamera, SimulatedSurfaces};
    use crate::session::SessionEvent;
    use crossbeam_channel::{unbounded, Receiver};
    use std::time::{Duration, Instant};

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct Harness {
        camera: SimulatedCamera,
        controller: CaptureSessionController,
        events: Receiver<SessionEvent>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let camera = SimulatedCamera::with_default_cameras();
        let surfaces = SimulatedSurfaces::new();
        let (tx, events) = unbounded();
        let config = SessionConfig {
            settle_delay_ms: 5,
            ..SessionConfig::with_output_dir(dir.path())
        };
        let controller = CaptureSessionController::new(
            "0".into(),
            PreviewTarget::new(surfaces.allocate()),
            Arc::new(camera.clone()),
            Arc::new(camera.clone()),
            Arc::new(tx),
            config,
        );
        Harness {
            camera,
            controller,
            events,
            _dir: dir,
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + TIMEOUT;
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_open_reaches_session_ready() {
        let h = harness();
        h.controller.open().unwrap();

        let event = h.events.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(
            event,
            SessionEvent::Initialized {
                preview_width: 4032,
                preview_height: 3024
            }
        );
        assert_eq!(h.controller.state(), StateKind::SessionReady);
        wait_until(|| {
            h.camera
                .count_calls(|c| matches!(c, HardwareCall::SetRepeating { .. }))
                == 1
        });
    }

    #[test]
    fn test_capture_before_open_is_invalid() {
        let h = harness();
        assert!(matches!(
            h.controller.take_picture(),
            Err(SessionError::InvalidState {
                state: StateKind::Closed,
                ..
            })
        ));
        assert!(h.camera.calls().is_empty());
    }

    #[test]
    fn test_close_releases_device_once() {
        let h = harness();
        h.controller.open().unwrap();
        h.events.recv_timeout(TIMEOUT).unwrap();
        h.controller.close().unwrap();
        wait_until(|| h.controller.state() == StateKind::Closed);

        assert_eq!(h.camera.open_device_count(), 0);
        assert_eq!(h.camera.released_devices(), vec![1]);
    }
}
