//! Exposes the tandem error type

use std::sync::PoisonError;

use ash;
use thiserror::Error;

/// Error type that tandem can return.
#[derive(Error, Debug)]
pub enum Error {
    /// A command did not fit in a command queue using [`OverflowPolicy::Fail`](crate::OverflowPolicy::Fail).
    #[error("Command queue overflow: `{requested}` bytes requested, but the capacity is `{capacity}` bytes.")]
    CommandQueueOverflow {
        /// Capacity of the queue in bytes.
        capacity: usize,
        /// Total size in bytes the queue would need to hold the new command.
        requested: usize,
    },
    /// Zero frames in flight were requested.
    #[error("Invalid number of frames in flight: `{0}`")]
    InvalidFramesInFlight(usize),
    /// The frame target cannot provide enough per-frame slots for the requested amount of frames in flight.
    #[error("Requested `{requested}` frames in flight, but the frame target only has `{available}` frame slots.")]
    NotEnoughFrameSlots {
        /// Frames in flight requested by the renderer.
        requested: usize,
        /// Frame slots provided by the frame target.
        available: usize,
    },
    /// A coordination call that requires a running render thread was made before [`RenderThread::run()`](crate::RenderThread::run).
    #[error("The render thread is not running.")]
    RenderThreadNotRunning,
    /// [`RenderThread::run()`](crate::RenderThread::run) was called twice.
    #[error("The render thread is already running.")]
    RenderThreadAlreadyRunning,
    /// The render thread has shut down and no longer accepts work.
    #[error("The render thread has been joined.")]
    RenderThreadJoined,
    /// A named thread panicked before it could be joined.
    #[error("Thread `{0}` panicked.")]
    ThreadPanicked(String),
    /// The operating system refused to spawn a thread.
    #[error("Failed to spawn thread: `{0}`")]
    ThreadSpawn(std::io::Error),
    /// [`FramePacer::present()`](crate::FramePacer::present) was called without a matching
    /// [`FramePacer::begin_frame()`](crate::FramePacer::begin_frame).
    #[error("No frame in flight. Call begin_frame() before present().")]
    NoFrameInFlight,
    /// The swapchain was still out of date after being recreated.
    #[error("Swapchain is out of date after recreation.")]
    SwapchainOutOfDate,
    /// Generic Vulkan error type.
    #[error("Vulkan error: `{0}`")]
    VkError(ash::vk::Result),
    /// Poisoned mutex
    #[error("Poisoned mutex")]
    PoisonError,
    /// Uncategorized error.
    #[error("Uncategorized error: `{0}`")]
    Uncategorized(&'static str),
}

impl From<ash::vk::Result> for Error {
    fn from(value: ash::vk::Result) -> Self {
        Error::VkError(value)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::ThreadSpawn(value)
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::PoisonError
    }
}

/// Reports an unrecoverable failure on the render thread. A frame that failed halfway cannot be continued,
/// so this logs the error and panics. On a [`MultiThreaded`](crate::ThreadingPolicy::MultiThreaded) render
/// thread the panic aborts the process, otherwise it unwinds into the caller.
pub(crate) fn fatal(what: &str, err: anyhow::Error) -> ! {
    error!("Fatal error during {what}: {err:?}");
    panic!("fatal error during {what}: {err}");
}
