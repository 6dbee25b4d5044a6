//! Camera Session Library
//!
//! Drives a single camera device through its lifecycle: open, session
//! configuration, live preview, still capture to disk, and teardown.
//! Hardware callbacks and client commands are serialized onto one
//! device queue so session state is never touched concurrently.
//!
//! # Architecture
//!
//! ```text
//! service → session controller → hardware seam (backend, device, session)
//!                  │                     │
//!                  │               still output
//!                  ↓                     ↓
//!            device queue  ←──────  image queue → storage (JPEG + EXIF)
//! ```
//!
//! # Design Principles
//!
//! - **Handles live in states**: a capture session exists only in the states where it is valid
//! - **Release exactly once**: closing consumes the handle
//! - **No blocking commands**: results arrive as notifications or capture tickets
//! - **Stale callbacks are harmless**: every open carries a generation number
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use camera_session::{
//!     hardware::simulated::{SimulatedCamera, SimulatedSurfaces},
//!     CameraService, LoggingSink, SessionConfig,
//! };
//!
//! let camera = SimulatedCamera::with_default_cameras();
//! let service = CameraService::new(
//!     Arc::new(camera.clone()),
//!     Arc::new(camera),
//!     Arc::new(SimulatedSurfaces::new()),
//!     Arc::new(LoggingSink),
//!     SessionConfig::default(),
//! );
//!
//! service.create("0").unwrap();
//! service.initialize().unwrap();
//! std::thread::sleep(Duration::from_millis(100));
//!
//! let ticket = service.take_picture().unwrap();
//! println!("saved to {:?}", ticket.wait());
//! service.dispose().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capabilities;
pub mod executor;
pub mod hardware;
pub mod metrics;
pub mod orientation;
pub mod service;
pub mod session;
pub mod storage;

// Re-export commonly used types at crate root
pub use capabilities::{CameraCapabilities, CameraIdentity, LensFacing, Size, SizePolicy};
pub use orientation::{exif_orientation, ExifOrientation};
pub use service::{CameraService, ServiceError, SurfaceRegistry};
pub use session::{
    CaptureSessionController, CaptureTicket, DeviceErrorCode, FileConfig, FocusPolicy,
    LoggingSink, SessionConfig, SessionError, SessionEvent, SessionEventSink, StateKind,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
