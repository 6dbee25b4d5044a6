//! Caller-owned preview surface.

use std::sync::Arc;

use crate::capabilities::Size;

/// A render surface owned by the client (e.g. a UI texture).
pub trait RenderSurface: Send + Sync {
    /// Identifier the client uses to refer to this surface.
    fn id(&self) -> u64;

    /// Sets the default buffer size frames are rendered at.
    fn set_buffer_size(&self, size: Size);

    /// Returns the surface to its owner. Called once, on dispose.
    fn release(&self);
}

/// Borrowed reference to a client's render surface.
#[derive(Clone)]
pub struct PreviewTarget(Arc<dyn RenderSurface>);

impl PreviewTarget {
    /// Wraps a client surface.
    pub fn new(surface: Arc<dyn RenderSurface>) -> Self {
        Self(surface)
    }

    /// Surface identifier.
    pub fn id(&self) -> u64 {
        self.0.id()
    }

    /// The underlying surface.
    pub fn surface(&self) -> &dyn RenderSurface {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for PreviewTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PreviewTarget").field(&self.0.id()).finish()
    }
}
