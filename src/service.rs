//! Command surface over a single camera session.
//!
//! `CameraService` is the typed API a command dispatcher calls. It holds
//! at most one [`CaptureSessionController`] at a time; `create` replaces
//! it and the remaining commands act on it.

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

use crate::capabilities::{CameraIdentity, CapabilitiesProvider, Size};
use crate::hardware::simulated::SimulatedSurfaces;
use crate::hardware::{CameraBackend, PreviewTarget, RenderSurface};
use crate::metrics::MetricsSnapshot;
use crate::session::{
    CaptureSessionController, CaptureTicket, SessionConfig, SessionError, SessionEventSink,
    SessionStats, StateKind,
};

/// Errors returned by [`CameraService`] commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("Camera not found. Please call the 'create' method before calling 'initialize'.")]
    CameraNotFound,
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ServiceError {
    /// Stable error code used by the command layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CameraNotFound => "cameraNotFound",
            Self::Session(e) => e.code(),
        }
    }
}

/// Source of client render surfaces for new sessions.
pub trait SurfaceRegistry: Send + Sync {
    /// Allocates a fresh surface.
    fn create_surface(&self) -> Arc<dyn RenderSurface>;
}

impl SurfaceRegistry for SimulatedSurfaces {
    fn create_surface(&self) -> Arc<dyn RenderSurface> {
        self.allocate()
    }
}

/// The current controller plus the counters of every controller it replaced.
#[derive(Default)]
struct Slot {
    controller: Option<CaptureSessionController>,
    retired: SessionStats,
}

impl Slot {
    fn retire(&mut self) -> Option<CaptureSessionController> {
        let controller = self.controller.take()?;
        self.retired.accumulate(&controller.stats());
        Some(controller)
    }
}

/// The command surface: `create`, `initialize`, `take_picture` and friends.
pub struct CameraService {
    backend: Arc<dyn CameraBackend>,
    capabilities: Arc<dyn CapabilitiesProvider>,
    surfaces: Arc<dyn SurfaceRegistry>,
    events: Arc<dyn SessionEventSink>,
    config: SessionConfig,
    slot: Mutex<Slot>,
}

impl CameraService {
    /// Creates a service with no camera.
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        capabilities: Arc<dyn CapabilitiesProvider>,
        surfaces: Arc<dyn SurfaceRegistry>,
        events: Arc<dyn SessionEventSink>,
        config: SessionConfig,
    ) -> Self {
        Self {
            backend,
            capabilities,
            surfaces,
            events,
            config,
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Binds a new session to `camera` and returns its preview surface id.
    ///
    /// Any previously created session is disposed first.
    pub fn create(&self, camera: impl Into<CameraIdentity>) -> Result<u64, ServiceError> {
        let camera = camera.into();
        let mut slot = self.slot.lock();
        if let Some(previous) = slot.retire() {
            tracing::info!(camera = %previous.camera(), "Replacing existing camera session");
            previous.dispose()?;
        }

        let surface = self.surfaces.create_surface();
        let surface_id = surface.id();
        slot.controller = Some(CaptureSessionController::new(
            camera.clone(),
            PreviewTarget::new(surface),
            Arc::clone(&self.backend),
            Arc::clone(&self.capabilities),
            Arc::clone(&self.events),
            self.config.clone(),
        ));
        tracing::info!(%camera, surface_id, "Camera session created");
        Ok(surface_id)
    }

    /// Opens the camera. Completion arrives as `on_initialized`.
    pub fn initialize(&self) -> Result<(), ServiceError> {
        self.with_controller(|c| c.open())
    }

    /// Output size the session will use.
    pub fn preview_size(&self) -> Result<Size, ServiceError> {
        self.with_controller(|c| c.preview_size())
    }

    /// Takes a still picture; the ticket resolves with the file path.
    pub fn take_picture(&self) -> Result<CaptureTicket, ServiceError> {
        self.with_controller(|c| c.take_picture())
    }

    /// Pauses the preview. No-op without a session.
    pub fn pause_preview(&self) -> Result<(), ServiceError> {
        self.if_created(|c| c.pause_preview())
    }

    /// Resumes the preview. No-op without a session.
    pub fn resume_preview(&self) -> Result<(), ServiceError> {
        self.if_created(|c| c.resume_preview())
    }

    /// Disposes the session. No-op without a session.
    pub fn dispose(&self) -> Result<(), ServiceError> {
        let controller = self.slot.lock().retire();
        match controller {
            Some(controller) => Ok(controller.dispose()?),
            None => Ok(()),
        }
    }

    /// State of the current session, if one was created.
    pub fn state(&self) -> Option<StateKind> {
        self.slot.lock().controller.as_ref().map(|c| c.state())
    }

    /// Metrics view of the current session, if one was created.
    ///
    /// Counters include every session this service created before it.
    pub fn snapshot(&self) -> Option<MetricsSnapshot> {
        let slot = self.slot.lock();
        let mut snapshot = MetricsSnapshot::from_controller(slot.controller.as_ref()?);
        snapshot.stats.accumulate(&slot.retired);
        Some(snapshot)
    }

    fn with_controller<T>(
        &self,
        f: impl FnOnce(&CaptureSessionController) -> Result<T, SessionError>,
    ) -> Result<T, ServiceError> {
        let slot = self.slot.lock();
        let controller = slot
            .controller
            .as_ref()
            .ok_or(ServiceError::CameraNotFound)?;
        Ok(f(controller)?)
    }

    fn if_created(
        &self,
        f: impl FnOnce(&CaptureSessionController) -> Result<(), SessionError>,
    ) -> Result<(), ServiceError> {
        match self.slot.lock().controller.as_ref() {
            Some(controller) => Ok(f(controller)?),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::simulated::SimulatedCamera;
    use crate::session::LoggingSink;

    fn service() -> (CameraService, Arc<SimulatedSurfaces>) {
        let camera = SimulatedCamera::with_default_cameras();
        let surfaces = Arc::new(SimulatedSurfaces::new());
        let service = CameraService::new(
            Arc::new(camera.clone()),
            Arc::new(camera),
            surfaces.clone(),
            Arc::new(LoggingSink),
            SessionConfig::default(),
        );
        (service, surfaces)
    }

    #[test]
    fn test_commands_before_create() {
        let (service, _) = service();

        let err = service.initialize().unwrap_err();
        assert_eq!(err, ServiceError::CameraNotFound);
        assert_eq!(err.code(), "cameraNotFound");
        assert!(service.take_picture().is_err());

        assert!(service.pause_preview().is_ok());
        assert!(service.resume_preview().is_ok());
        assert!(service.dispose().is_ok());
        assert_eq!(service.state(), None);
    }

    #[test]
    fn test_create_replaces_previous_session() {
        let (service, surfaces) = service();

        let first = service.create("0").unwrap();
        let second = service.create("1").unwrap();
        assert_ne!(first, second);

        assert!(surfaces.get(first).unwrap().is_released());
        assert!(!surfaces.get(second).unwrap().is_released());
        assert_eq!(service.state(), Some(StateKind::Closed));
    }

    #[test]
    fn test_preview_size_without_open() {
        let (service, _) = service();
        service.create("0").unwrap();
        assert_eq!(service.preview_size().unwrap(), Size::new(4032, 3024));
    }
}
