//! Persistence of captured still images.
//!
//! Encoder output is already a final JPEG, so storage is a two-phase
//! write: raw bytes land on disk first, then only the orientation
//! metadata is patched in a second pass.

mod exif;
mod writer;

pub use exif::stamp_orientation;
pub use writer::{capture_file_name, StillCaptureFileWriter, StorageError};
