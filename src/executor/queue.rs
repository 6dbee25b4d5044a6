//! Single-threaded, strictly ordered task queue.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Unit of work executed on a queue thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Errors that can occur when starting or posting to a queue.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to spawn queue thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("queue {0} has been shut down")]
    Closed(String),
}

enum Message {
    Run(Task),
    RunAt(Instant, Task),
    Quit,
}

/// Task waiting for its due time. Ties run in submission order.
struct Scheduled {
    due: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed so the max-heap yields the earliest task.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Cloneable posting end of a [`SerialQueue`].
#[derive(Clone)]
pub struct QueueHandle {
    name: Arc<str>,
    sender: Sender<Message>,
    thread_id: ThreadId,
}

impl QueueHandle {
    /// Appends a task to the queue.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) -> Result<(), ExecutorError> {
        self.send(Message::Run(Box::new(task)))
    }

    /// Schedules a task to run no earlier than `delay` from now.
    pub fn post_delayed(
        &self,
        delay: Duration,
        task: impl FnOnce() + Send + 'static,
    ) -> Result<(), ExecutorError> {
        self.send(Message::RunAt(Instant::now() + delay, Box::new(task)))
    }

    /// Whether the caller is running on this queue's thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Queue name, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, message: Message) -> Result<(), ExecutorError> {
        self.sender
            .send(message)
            .map_err(|_| ExecutorError::Closed(self.name.to_string()))
    }
}

impl std::fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle").field("name", &self.name).finish()
    }
}

/// A dedicated thread running posted tasks one at a time, in order.
///
/// Shutdown is "safe": tasks already due when the quit request is
/// processed still run; delayed tasks that are not yet due are dropped.
pub struct SerialQueue {
    handle: QueueHandle,
    thread: Option<JoinHandle<()>>,
}

impl SerialQueue {
    /// Spawns the queue thread.
    pub fn spawn(name: &str) -> Result<Self, ExecutorError> {
        let (sender, receiver) = unbounded();
        let thread_name = name.to_string();
        let thread = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || run_queue(&thread_name, &receiver))
            .map_err(|source| ExecutorError::Spawn {
                name: name.to_string(),
                source,
            })?;

        tracing::debug!(queue = name, "Serial queue started");

        Ok(Self {
            handle: QueueHandle {
                name: Arc::from(name),
                sender,
                thread_id: thread.thread().id(),
            },
            thread: Some(thread),
        })
    }

    /// Returns a posting handle.
    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    /// Requests shutdown without waiting for the thread to exit.
    pub fn quit_safely(&self) {
        // Already-closed queues have nothing left to stop.
        let _ = self.handle.send(Message::Quit);
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.quit_safely();
        if let Some(thread) = self.thread.take() {
            // A queue torn down from one of its own tasks cannot wait for itself.
            if self.handle.is_current() {
                return;
            }
            if thread.join().is_err() {
                tracing::error!(queue = %self.handle.name, "Queue thread panicked");
            }
        }
    }
}

fn run_queue(name: &str, receiver: &Receiver<Message>) {
    let mut scheduled: BinaryHeap<Scheduled> = BinaryHeap::new();
    let mut seq = 0u64;

    loop {
        if let Some(next) = scheduled.peek() {
            if next.due <= Instant::now() {
                if let Some(item) = scheduled.pop() {
                    execute(name, item.task);
                }
                continue;
            }
        }

        let message = match scheduled.peek() {
            Some(next) => match receiver.recv_deadline(next.due) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => Message::Quit,
            },
            None => receiver.recv().unwrap_or(Message::Quit),
        };

        seq += 1;
        match message {
            Message::Run(task) => scheduled.push(Scheduled {
                due: Instant::now(),
                seq,
                task,
            }),
            Message::RunAt(due, task) => scheduled.push(Scheduled { due, seq, task }),
            Message::Quit => {
                let now = Instant::now();
                let mut due: Vec<Scheduled> = Vec::new();
                let mut dropped = 0usize;
                while let Some(item) = scheduled.pop() {
                    if item.due <= now {
                        due.push(item);
                    } else {
                        dropped += 1;
                    }
                }
                for item in due {
                    execute(name, item.task);
                }
                tracing::debug!(queue = name, dropped_delayed = dropped, "Serial queue stopped");
                return;
            }
        }
    }
}

fn execute(name: &str, task: Task) {
    if catch_unwind(AssertUnwindSafe(task)).is_err() {
        tracing::error!(queue = name, "Task panicked; queue continues");
    }
}
