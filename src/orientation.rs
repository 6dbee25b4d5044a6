//! EXIF orientation tags for captured stills.

use serde::{Deserialize, Serialize};

/// EXIF `Orientation` (tag 0x0112) values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ExifOrientation {
    /// Orientation could not be determined.
    Undefined = 0,
    /// Top-left, no transform.
    Normal = 1,
    /// Mirrored along the vertical axis.
    FlipHorizontal = 2,
    /// Rotated 180 degrees.
    Rotate180 = 3,
    /// Mirrored along the horizontal axis.
    FlipVertical = 4,
    /// Mirrored along the top-left to bottom-right diagonal.
    Transpose = 5,
    /// Rotated 90 degrees clockwise.
    Rotate90 = 6,
    /// Mirrored along the top-right to bottom-left diagonal.
    Transverse = 7,
    /// Rotated 270 degrees clockwise.
    Rotate270 = 8,
}

impl ExifOrientation {
    /// Numeric value written into the EXIF IFD.
    #[inline]
    pub fn tag_value(self) -> u16 {
        self as u16
    }
}

/// Maps a clockwise rotation and mirroring flag to its orientation tag.
///
/// Rotations outside `{0, 90, 180, 270}` yield [`ExifOrientation::Undefined`].
pub fn exif_orientation(rotation_degrees: u32, mirrored: bool) -> ExifOrientation {
    match (rotation_degrees, mirrored) {
        (0, false) => ExifOrientation::Normal,
        (0, true) => ExifOrientation::FlipHorizontal,
        (90, false) => ExifOrientation::Rotate90,
        (90, true) => ExifOrientation::Transpose,
        (180, false) => ExifOrientation::Rotate180,
        (180, true) => ExifOrientation::FlipVertical,
        (270, false) => ExifOrientation::Rotate270,
        (270, true) => ExifOrientation::Transverse,
        _ => ExifOrientation::Undefined,
    }
}
