//! Contains the logic responsible for pacing frames and deciding when retired resources can be destroyed.
//!
//! A frame is started with [`FramePacer::begin_frame()`] and finished with [`FramePacer::present()`]. In between,
//! work for the frame is recorded for the current frame slot. There are as many slots as there are frames in flight,
//! and they are used round-robin:
//!
//! * `begin_frame()` destroys everything that was retired the previous time the current slot was used, then acquires
//!   a swapchain image.
//! * `present()` submits and presents the frame, moves on to the next slot and waits on that slot's fence. Once it
//!   returns, the GPU is done with everything the new slot was used for, including the resources retired with it.
//!
//! # Example
//! ```
//! # use tandem::*;
//! # fn example<T: FrameTarget>(target: T) -> anyhow::Result<()> {
//! let mut pacer = FramePacer::new(target, 2, 1024, OverflowPolicy::Grow)?;
//! loop {
//!     pacer.frame(|pacer, image| {
//!         // Record this frame's work for `pacer.current_slot()`, rendering to `image`.
//!         Ok(())
//!     })?;
//! #   break;
//! }
//! pacer.flush()?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;

use crate::{AcquiredImage, Error, FrameTarget, OverflowPolicy, PresentStatus, ResourceReleaser, ResourceRetirement};

/// Responsible for presentation, frame-frame synchronization and retirement of per-frame resources.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct FramePacer<T: FrameTarget> {
    #[derivative(Debug = "ignore")]
    target: T,
    retirement: ResourceRetirement,
    current_slot: usize,
    current_image: Option<u32>,
    frames_presented: u64,
}

impl<T: FrameTarget> FramePacer<T> {
    /// Initialize the frame pacer with `frames_in_flight` frame slots, each with its own retirement queue.
    /// # Errors
    /// * Fails with [`Error::InvalidFramesInFlight`] if `frames_in_flight` is zero.
    /// * Fails with [`Error::NotEnoughFrameSlots`] if the target provides fewer slots than requested.
    pub fn new(target: T, frames_in_flight: usize, retirement_capacity: usize, policy: OverflowPolicy) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(Error::InvalidFramesInFlight(frames_in_flight).into());
        }
        if target.slot_count() < frames_in_flight {
            return Err(Error::NotEnoughFrameSlots {
                requested: frames_in_flight,
                available: target.slot_count(),
            }
            .into());
        }

        Ok(FramePacer {
            target,
            retirement: ResourceRetirement::new(frames_in_flight, retirement_capacity, policy)?,
            current_slot: 0,
            current_image: None,
            frames_presented: 0,
        })
    }

    fn acquire(&mut self) -> Result<u32> {
        let AcquiredImage {
            index,
            resize_required,
        } = self.target.acquire_image(self.current_slot)?;
        if !resize_required {
            return Ok(index);
        }

        debug!("Swapchain out of date while acquiring, recreating");
        self.target.recreate()?;
        // Only retry once, a swapchain that is out of date right after recreation will not recover by itself.
        let AcquiredImage {
            index,
            resize_required,
        } = self.target.acquire_image(self.current_slot)?;
        if resize_required {
            return Err(Error::SwapchainOutOfDate.into());
        }
        Ok(index)
    }

    /// Start a new frame and return the index of the swapchain image it renders to.
    ///
    /// Everything retired the last time the current slot was used is destroyed before the image is acquired. Calling
    /// this again before [`FramePacer::present()`] returns the image that was already acquired.
    /// # Errors
    /// * Fails with [`Error::SwapchainOutOfDate`] if the swapchain is still out of date after recreating it.
    pub fn begin_frame(&mut self) -> Result<u32> {
        if let Some(image) = self.current_image {
            debug!("begin_frame() called twice without present()");
            return Ok(image);
        }

        self.retirement.execute(self.current_slot);
        let image = self.acquire()?;
        self.current_image = Some(image);
        Ok(image)
    }

    /// Submit and present the current frame, then advance to the next frame slot and wait until the GPU finished the
    /// work last submitted with it.
    ///
    /// Resources released through a [`ResourceReleaser`] since the previous present are retired with the slot of the
    /// frame being presented.
    /// # Errors
    /// * Fails with [`Error::NoFrameInFlight`] if no frame was started with [`FramePacer::begin_frame()`].
    pub fn present(&mut self) -> Result<()> {
        let image = self.current_image.take().ok_or(Error::NoFrameInFlight)?;
        self.target.submit(self.current_slot, image)?;
        if self.target.present(self.current_slot, image)? == PresentStatus::OutOfDate {
            debug!("Swapchain out of date while presenting, recreating");
            self.target.recreate()?;
        }

        self.retirement.collect(self.current_slot)?;
        self.current_slot = (self.current_slot + 1) % self.retirement.slot_count();
        self.frames_presented += 1;
        self.target.wait_for_slot(self.current_slot)
    }

    /// Run one whole frame: [`FramePacer::begin_frame()`], then `f` with the acquired image index, then
    /// [`FramePacer::present()`].
    pub fn frame<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self, u32) -> Result<()>, {
        let image = self.begin_frame()?;
        f(self, image)?;
        self.present()
    }

    /// Retire a resource. `func` runs once the GPU finished every frame that may still use the resource.
    ///
    /// While a frame is being recorded the resource is retired with the current slot. Between [`FramePacer::present()`]
    /// and the next [`FramePacer::begin_frame()`] it is retired with the slot that was just presented, since the current
    /// slot is about to begin and would destroy it before the presented frame finished.
    /// # Errors
    /// * Fails if the retirement queue is full and uses [`OverflowPolicy::Fail`].
    pub fn submit_resource_free(&mut self, func: impl FnOnce() + Send + 'static) -> Result<()> {
        let slot = match self.current_image {
            Some(_) => self.current_slot,
            None => self.last_presented_slot(),
        };
        self.retirement.push(slot, func)
    }

    fn last_presented_slot(&self) -> usize {
        let slots = self.retirement.slot_count();
        (self.current_slot + slots - 1) % slots
    }

    /// Obtain a handle that retires resources from any thread.
    pub fn releaser(&self) -> ResourceReleaser {
        self.retirement.releaser()
    }

    /// Wait for the device to go idle and destroy every retired resource, regardless of its frame slot.
    pub fn flush(&mut self) -> Result<()> {
        self.target.wait_idle()?;
        self.retirement.flush();
        Ok(())
    }

    /// The frame slot currently being recorded.
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// The swapchain image acquired for the current frame, if a frame was started.
    pub fn current_image(&self) -> Option<u32> {
        self.current_image
    }

    /// Amount of frame slots, the maximum amount of frames the GPU can be working on at once.
    pub fn frames_in_flight(&self) -> usize {
        self.retirement.slot_count()
    }

    /// Amount of frames presented so far.
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Amount of resources waiting to be destroyed when `slot` is reused.
    /// # Panics
    /// * Panics if `slot` is not smaller than [`FramePacer::frames_in_flight()`].
    pub fn pending_frees(&self, slot: usize) -> usize {
        self.retirement.pending(slot)
    }

    /// The frame target this pacer presents to.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Mutable access to the frame target, for example to record into [`VkFrameTarget::command_buffer()`](crate::VkFrameTarget::command_buffer).
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }
}

impl<T: FrameTarget> Drop for FramePacer<T> {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            error!("Failed to flush retired resources: {err}");
        }
    }
}
