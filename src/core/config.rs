//! Exposes all structs needed to store renderer settings.

use crate::{OverflowPolicy, ThreadingPolicy};

/// Default amount of frames in flight. Clamped to the swapchain image count when the renderer is created.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 3;

/// Default byte capacity of each of the two render command queues (10 MiB).
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 10 * 1024 * 1024;

/// Default byte capacity of each per-frame retirement queue (1 MiB).
pub const DEFAULT_RETIREMENT_QUEUE_CAPACITY: usize = 1024 * 1024;

/// Settings used to create a [`Renderer`](crate::Renderer).
#[derive(Debug, Clone)]
pub struct RendererSettings {
    /// Renderer name. Used as the name of the render thread.
    pub name: String,
    /// Requested amount of frames in flight. A frame in flight is a frame that is rendering on the GPU or scheduled to do so.
    /// The effective amount never exceeds the swapchain image count.
    pub frames_in_flight: usize,
    /// Whether render commands run on a dedicated render thread or inline on the submitting thread.
    pub threading: ThreadingPolicy,
    /// Initial capacity in bytes of each render command queue.
    pub command_queue_capacity: usize,
    /// Initial capacity in bytes of each per-frame retirement queue.
    pub retirement_queue_capacity: usize,
    /// What happens when a command does not fit in a queue.
    pub overflow_policy: OverflowPolicy,
}

impl Default for RendererSettings {
    fn default() -> Self {
        RendererBuilder::new().build()
    }
}

/// The renderer builder is a convenience struct to easily create [`RendererSettings`].
///
/// For information about each of the fields, see [`RendererSettings`]
/// # Example
/// ```
/// # use tandem::*;
/// let settings = RendererBuilder::new()
///     .name("Render Thread")
///     .frames_in_flight(2)
///     .threading(ThreadingPolicy::MultiThreaded)
///     .overflow_policy(OverflowPolicy::Fail)
///     .build();
/// ```
#[derive(Debug)]
pub struct RendererBuilder {
    inner: RendererSettings,
}

impl Default for RendererBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RendererBuilder {
    /// Create a new renderer builder with default settings.
    pub fn new() -> Self {
        RendererBuilder {
            inner: RendererSettings {
                name: String::from("Render Thread"),
                frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
                threading: ThreadingPolicy::MultiThreaded,
                command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
                retirement_queue_capacity: DEFAULT_RETIREMENT_QUEUE_CAPACITY,
                overflow_policy: OverflowPolicy::Grow,
            },
        }
    }

    /// Sets the renderer name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    /// Sets the requested amount of frames in flight.
    pub fn frames_in_flight(mut self, count: usize) -> Self {
        self.inner.frames_in_flight = count;
        self
    }

    /// Sets the threading policy.
    pub fn threading(mut self, policy: ThreadingPolicy) -> Self {
        self.inner.threading = policy;
        self
    }

    /// Initial byte capacity of the render command queues.
    pub fn command_queue_capacity(mut self, bytes: usize) -> Self {
        self.inner.command_queue_capacity = bytes;
        self
    }

    /// Initial byte capacity of the per-frame retirement queues.
    pub fn retirement_queue_capacity(mut self, bytes: usize) -> Self {
        self.inner.retirement_queue_capacity = bytes;
        self
    }

    /// Sets the overflow policy used by every queue the renderer creates.
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.inner.overflow_policy = policy;
        self
    }

    /// Build the resulting renderer settings.
    pub fn build(self) -> RendererSettings {
        self.inner
    }
}
