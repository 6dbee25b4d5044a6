//! Camera identity and characteristics types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::session::SessionError;

/// Opaque device selector supplied at session creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraIdentity(String);

impl CameraIdentity {
    /// Creates an identity from a platform camera name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the raw device selector.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CameraIdentity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Pixel dimensions of an output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Creates a size from width and height.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel area, widened so that large sensors cannot overflow.
    #[inline]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Direction the lens faces relative to the device screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LensFacing {
    /// Same side as the screen. Output is mirrored.
    Front,
    /// Opposite side from the screen.
    Back,
    /// Externally attached camera.
    External,
}

impl LensFacing {
    /// Whether captured images from this lens are mirrored.
    #[inline]
    pub fn is_mirrored(self) -> bool {
        matches!(self, Self::Front)
    }
}

/// Static characteristics of a single camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraCapabilities {
    /// Clockwise rotation of the sensor relative to the device's natural orientation.
    pub sensor_orientation: u32,
    /// Lens facing.
    pub lens_facing: LensFacing,
    /// Supported still-image (JPEG) output sizes.
    pub available_still_sizes: Vec<Size>,
}

impl CameraCapabilities {
    /// Rotation snapped to the quarter turns an orientation tag can express.
    pub fn rotation_degrees(&self) -> u32 {
        ((self.sensor_orientation + 45) / 90 % 4) * 90
    }
}

/// Read-only characteristics lookup provided by the platform.
pub trait CapabilitiesProvider: Send + Sync {
    /// Returns the static characteristics of the given camera.
    ///
    /// Failure to query the camera surfaces as [`SessionError::DeviceAccess`].
    fn capabilities(&self, camera: &CameraIdentity) -> Result<CameraCapabilities, SessionError>;
}
