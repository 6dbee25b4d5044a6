//! Background execution substrate.
//!
//! A session runs on two independent serial queues: one for device and
//! session state, one for image availability and file writes. Each queue
//! is a dedicated thread processing tasks strictly in order.

mod context;
mod queue;

pub use context::ExecutionContext;
pub use queue::{ExecutorError, QueueHandle, SerialQueue, Task};
