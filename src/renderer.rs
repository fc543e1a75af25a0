//! The [`Renderer`] ties the render thread, frame pacing and resource retirement together.
//!
//! The application thread records render commands with [`Renderer::submit()`] and finishes each frame with
//! [`Renderer::frame()`]. Commands receive the [`FramePacer`] of the render thread, through which they can record GPU
//! work for the current frame slot and retire resources.
//!
//! # Example
//! ```
//! # use tandem::*;
//! # fn example<T: FrameTarget + 'static>(target: T) -> anyhow::Result<()> {
//! let registry = LiveRegistry::new();
//! let settings = RendererBuilder::new().frames_in_flight(2).build();
//! let mut renderer = Renderer::new(settings, target, registry.clone())?;
//! renderer.run()?;
//!
//! let mesh = registry.create(String::from("mesh"));
//! for _ in 0..3 {
//!     let mesh = mesh.clone();
//!     renderer.frame(move |pacer| {
//!         // Record a draw of `mesh` for `pacer.current_slot()`.
//!         let _ = (&mesh, pacer.current_slot());
//!     })?;
//! }
//! renderer.terminate()?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;

use crate::core::error::fatal;
use crate::{
    Error, FramePacer, FrameTarget, LiveRegistry, RenderThread, RendererSettings, ResourceReleaser, ThreadState,
};

/// Owns the render thread and everything it drives.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct Renderer<T: FrameTarget + 'static> {
    thread: RenderThread<FramePacer<T>>,
    releaser: ResourceReleaser,
    registry: LiveRegistry,
    settings: RendererSettings,
}

impl<T: FrameTarget + 'static> Renderer<T> {
    /// Create a renderer presenting to `target`. The render thread is not started until [`Renderer::run()`].
    ///
    /// The amount of frames in flight is clamped to the swapchain image count.
    /// # Errors
    /// * Fails with [`Error::InvalidFramesInFlight`] if zero frames in flight are requested.
    /// * Fails with [`Error::NotEnoughFrameSlots`] if `target` cannot provide a slot per frame in flight.
    pub fn new(mut settings: RendererSettings, target: T, registry: LiveRegistry) -> Result<Self> {
        let requested = settings.frames_in_flight;
        if requested == 0 {
            return Err(Error::InvalidFramesInFlight(requested).into());
        }
        let image_count = target.image_count();
        if image_count != 0 && image_count < requested {
            info!("Requested {requested} frames in flight but the swapchain only has {image_count} images, using {image_count}");
            settings.frames_in_flight = image_count;
        }

        let pacer = FramePacer::new(
            target,
            settings.frames_in_flight,
            settings.retirement_queue_capacity,
            settings.overflow_policy,
        )?;
        let releaser = pacer.releaser();
        let thread = RenderThread::new(
            settings.threading,
            settings.name.clone(),
            pacer,
            settings.command_queue_capacity,
            settings.overflow_policy,
        );

        Ok(Renderer {
            thread,
            releaser,
            registry,
            settings,
        })
    }

    /// Start the render thread.
    pub fn run(&mut self) -> Result<()> {
        self.thread.run()
    }

    /// Queue a render command for the frame currently being recorded.
    pub fn submit<F>(&mut self, func: F) -> Result<()>
    where
        F: FnOnce(&mut FramePacer<T>) + Send + 'static, {
        self.thread.submit(func)
    }

    /// Retire a resource. `func` runs once the GPU finished every frame that may still use it.
    ///
    /// On the render thread, while a frame is being recorded, the resource is retired with the current frame slot right
    /// away. Otherwise it is retired with the slot of the next frame the render thread presents.
    pub fn submit_resource_free(&mut self, func: impl FnOnce() + Send + 'static) -> Result<()> {
        if self.thread.is_render_thread() {
            if let Some(pacer) = self.thread.context_mut() {
                // Between frames, commands queued for the next frame may still use the resource.
                if pacer.current_image().is_some() {
                    return pacer.submit_resource_free(func);
                }
            }
        }
        self.releaser.release(func);
        Ok(())
    }

    /// Obtain a handle that retires resources from any thread.
    pub fn releaser(&self) -> ResourceReleaser {
        self.releaser.clone()
    }

    /// The registry shared objects for this renderer are tracked in.
    pub fn registry(&self) -> &LiveRegistry {
        &self.registry
    }

    /// Queue the start of a new frame on the render thread.
    pub fn begin_frame(&mut self) -> Result<()> {
        self.submit(|pacer| {
            if let Err(err) = pacer.begin_frame() {
                fatal("begin frame", err);
            }
        })
    }

    /// Queue presenting the current frame on the render thread.
    pub fn present(&mut self) -> Result<()> {
        self.submit(|pacer| {
            if let Err(err) = pacer.present() {
                fatal("present frame", err);
            }
        })
    }

    /// Advance the application by one frame.
    ///
    /// Waits until the render thread finished the previous frame, hands it everything recorded since then and queues
    /// the next frame: begin, `record` and present. The commands queued here run on the next call.
    pub fn frame<F>(&mut self, record: F) -> Result<()>
    where
        F: FnOnce(&mut FramePacer<T>) + Send + 'static, {
        self.thread.block_until_render_complete()?;
        self.thread.next_frame()?;
        self.thread.kick()?;

        self.begin_frame()?;
        self.submit(record)?;
        self.present()
    }

    /// See [`RenderThread::next_frame()`].
    pub fn next_frame(&mut self) -> Result<()> {
        self.thread.next_frame()
    }

    /// See [`RenderThread::kick()`].
    pub fn kick(&mut self) -> Result<()> {
        self.thread.kick()
    }

    /// See [`RenderThread::block_until_render_complete()`].
    pub fn block_until_render_complete(&self) -> Result<()> {
        self.thread.block_until_render_complete()
    }

    /// See [`RenderThread::pump()`].
    pub fn pump(&mut self) -> Result<()> {
        self.thread.pump()
    }

    /// Shut the renderer down. Everything submitted so far is executed, all retired resources are destroyed once the
    /// device is idle, then the render thread is joined. Does nothing if the renderer is not running.
    pub fn terminate(&mut self) -> Result<()> {
        if !self.thread.is_running() {
            return Ok(());
        }
        self.submit(|pacer| {
            if let Err(err) = pacer.flush() {
                fatal("flush retired resources", err);
            }
        })?;
        self.thread.terminate()
    }

    /// Whether the calling thread is the one executing render commands.
    pub fn is_render_thread(&self) -> bool {
        self.thread.is_render_thread()
    }

    /// Whether [`Renderer::run()`] was called and the renderer was not terminated yet.
    pub fn is_running(&self) -> bool {
        self.thread.is_running()
    }

    /// Hand-off state of the render thread.
    pub fn state(&self) -> ThreadState {
        self.thread.state()
    }

    /// Amount of frames the application finished so far.
    pub fn app_frame(&self) -> u64 {
        self.thread.app_frame()
    }

    /// Settings this renderer was created with, with the effective amount of frames in flight.
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    /// Access the frame pacer while no render thread owns it. See [`RenderThread::context_mut()`].
    pub fn pacer_mut(&mut self) -> Option<&mut FramePacer<T>> {
        self.thread.context_mut()
    }
}

impl<T: FrameTarget + 'static> Drop for Renderer<T> {
    fn drop(&mut self) {
        if let Err(err) = self.terminate() {
            error!("Failed to terminate renderer `{}`: {err}", self.settings.name);
        }
    }
}
