//! The sync module provides the threading and synchronization primitives render commands flow through.
//!
//! - The [`command_queue`] module provides the drain-to-empty queue render commands are recorded into.
//! - The [`thread`] module provides a named, joinable OS thread.
//! - The [`render_thread`] module hands command queues from the application thread to the render thread.
//! - The [`fence`] module provides a wrapper around `VkFence` objects, used for CPU-GPU sync.

pub mod command_queue;
pub mod fence;
pub mod render_thread;
pub mod thread;
