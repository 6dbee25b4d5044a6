//! Static camera characteristics and output-size selection.
//!
//! Capabilities are a read-only lookup owned by the platform. The
//! controller fetches them once per `open` and derives the still-image
//! output size from them through a [`SizePolicy`].

mod resolver;
mod types;

pub use resolver::{resolve_output_size, SizePolicy};
pub use types::{CameraCapabilities, CameraIdentity, CapabilitiesProvider, LensFacing, Size};
