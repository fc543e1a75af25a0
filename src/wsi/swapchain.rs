//! The swapchain side of frame pacing.
//!
//! The [`FramePacer`](crate::FramePacer) does not create or own any Vulkan presentation objects itself. It drives a
//! [`FrameTarget`], which acquires images, submits and presents frames, and waits on per-slot fences.
//! [`VkFrameTarget`] implements this for a `VkSwapchainKHR` whose construction is left to the caller.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;

use crate::{Error, Fence};

/// Result of acquiring a swapchain image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Index of the acquired swapchain image. Meaningless if `resize_required` is set.
    pub index: u32,
    /// The swapchain is out of date and must be recreated before an image can be acquired.
    pub resize_required: bool,
}

/// Outcome of presenting a frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PresentStatus {
    /// The frame was presented.
    Presented,
    /// The swapchain no longer matches the surface and must be recreated.
    OutOfDate,
}

/// Presentation collaborator driven by the [`FramePacer`](crate::FramePacer).
///
/// Every method taking a `slot` refers to one of the per-frame slots, in `[0, slot_count())`. Each slot owns a fence
/// that is signaled when the work submitted with it has finished on the GPU.
pub trait FrameTarget: Send {
    /// Amount of images in the swapchain.
    fn image_count(&self) -> usize;
    /// Amount of per-frame slots this target can provide.
    fn slot_count(&self) -> usize;
    /// Block until all work submitted with `slot` has finished.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;
    /// Acquire the next swapchain image for `slot`.
    fn acquire_image(&mut self, slot: usize) -> Result<AcquiredImage>;
    /// Recreate the swapchain and everything that depends on it.
    fn recreate(&mut self) -> Result<()>;
    /// Submit the work recorded for `slot`, rendering to `image`. Signals the fence of `slot` on completion.
    fn submit(&mut self, slot: usize, image: u32) -> Result<()>;
    /// Present `image` once the work submitted for `slot` is done.
    fn present(&mut self, slot: usize, image: u32) -> Result<PresentStatus>;
    /// Block until the device is idle.
    fn wait_idle(&mut self) -> Result<()>;
}

/// Information stored for each frame slot.
#[derive(Debug)]
struct PerFrame {
    /// Signaled by the GPU when all commands for this slot have been processed.
    fence: Fence,
    /// Signaled by the GPU when the acquired swapchain image is ready to be rendered to.
    image_ready: vk::Semaphore,
    /// Signaled by the GPU when the slot's command buffer finished. Presenting waits on this.
    render_finished: vk::Semaphore,
    command_buffer: vk::CommandBuffer,
}

impl PerFrame {
    fn new(device: &ash::Device, command_buffer: vk::CommandBuffer) -> Result<Self> {
        let fence = Fence::new(device.clone(), true)?;
        let info = vk::SemaphoreCreateInfo::default();
        let image_ready = unsafe { device.create_semaphore(&info, None)? };
        let render_finished = match unsafe { device.create_semaphore(&info, None) } {
            Ok(semaphore) => semaphore,
            Err(err) => {
                unsafe { device.destroy_semaphore(image_ready, None) };
                return Err(Error::from(err).into());
            }
        };
        Ok(PerFrame {
            fence,
            image_ready,
            render_finished,
            command_buffer,
        })
    }

    /// The fence destroys itself, only the semaphores need the device.
    unsafe fn destroy_semaphores(&self, device: &ash::Device) {
        device.destroy_semaphore(self.image_ready, None);
        device.destroy_semaphore(self.render_finished, None);
    }
}

type RecreateFn = Box<dyn FnMut(vk::SwapchainKHR) -> Result<(vk::SwapchainKHR, usize)> + Send>;

/// [`FrameTarget`] backed by a `VkSwapchainKHR`.
///
/// The swapchain and the per-slot command buffers are created by the caller. Recreation is delegated to a callback
/// that receives the old swapchain and returns the new one together with its image count. The callback is only invoked
/// while the device is idle.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct VkFrameTarget {
    #[derivative(Debug = "ignore")]
    device: ash::Device,
    #[derivative(Debug = "ignore")]
    functions: ash::extensions::khr::Swapchain,
    handle: vk::SwapchainKHR,
    image_count: usize,
    queue: Arc<Mutex<vk::Queue>>,
    per_frame: Vec<PerFrame>,
    #[derivative(Debug = "ignore")]
    recreate_fn: RecreateFn,
}

impl VkFrameTarget {
    /// Create a frame target with one slot per command buffer. Fences are created signaled, so the first use of each
    /// slot does not wait.
    /// `queue` must support both graphics and presentation. It is shared behind a mutex with any other thread
    /// submitting to it.
    pub fn new(
        device: ash::Device,
        functions: ash::extensions::khr::Swapchain,
        swapchain: vk::SwapchainKHR,
        image_count: usize,
        queue: Arc<Mutex<vk::Queue>>,
        command_buffers: Vec<vk::CommandBuffer>,
        recreate: impl FnMut(vk::SwapchainKHR) -> Result<(vk::SwapchainKHR, usize)> + Send + 'static,
    ) -> Result<Self> {
        let mut target = VkFrameTarget {
            device,
            functions,
            handle: swapchain,
            image_count,
            queue,
            per_frame: Vec::with_capacity(command_buffers.len()),
            recreate_fn: Box::new(recreate),
        };
        // Slots created before a failure are destroyed together with `target`.
        for command_buffer in command_buffers {
            let frame = PerFrame::new(&target.device, command_buffer)?;
            target.per_frame.push(frame);
        }
        Ok(target)
    }

    /// The command buffer that is submitted for `slot`. Record into it between
    /// [`FramePacer::begin_frame()`](crate::FramePacer::begin_frame) and [`FramePacer::present()`](crate::FramePacer::present).
    pub fn command_buffer(&self, slot: usize) -> vk::CommandBuffer {
        self.per_frame[slot].command_buffer
    }

    /// Unsafe access to the underlying swapchain handle.
    /// # Safety
    /// * The handle is invalidated by a recreation.
    pub unsafe fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }
}

impl FrameTarget for VkFrameTarget {
    fn image_count(&self) -> usize {
        self.image_count
    }

    fn slot_count(&self) -> usize {
        self.per_frame.len()
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        Ok(self.per_frame[slot].fence.wait()?)
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquiredImage> {
        let frame = &self.per_frame[slot];
        let result = unsafe {
            self.functions.acquire_next_image(
                self.handle,
                u64::MAX,
                frame.image_ready,
                vk::Fence::null(),
            )
        };

        match result {
            // Suboptimal images can still be rendered to, present() reports them.
            Ok((index, _)) => Ok(AcquiredImage {
                index,
                resize_required: false,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquiredImage {
                index: 0,
                resize_required: true,
            }),
            Err(err) => Err(Error::from(err).into()),
        }
    }

    fn recreate(&mut self) -> Result<()> {
        unsafe { self.device.device_wait_idle()? };
        let (handle, image_count) = (self.recreate_fn)(self.handle)?;
        self.handle = handle;
        self.image_count = image_count;
        Ok(())
    }

    fn submit(&mut self, slot: usize, _image: u32) -> Result<()> {
        let frame = &self.per_frame[slot];
        frame.fence.reset()?;

        let wait_semaphores = [frame.image_ready];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer];
        let signal_semaphores = [frame.render_finished];
        let info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        let queue = self.queue.lock().map_err(|_| Error::PoisonError)?;
        unsafe {
            self.device
                .queue_submit(*queue, std::slice::from_ref(&info), frame.fence.handle())?
        };
        Ok(())
    }

    fn present(&mut self, slot: usize, image: u32) -> Result<PresentStatus> {
        let frame = &self.per_frame[slot];
        let wait_semaphores = [frame.render_finished];
        let swapchains = [self.handle];
        let image_indices = [image];
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices)
            .build();

        let queue = self.queue.lock().map_err(|_| Error::PoisonError)?;
        match unsafe { self.functions.queue_present(*queue, &info) } {
            Ok(false) => Ok(PresentStatus::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(err) => Err(Error::from(err).into()),
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for VkFrameTarget {
    fn drop(&mut self) {
        // Semaphores may still be waited on by the last submitted frames.
        if let Err(err) = unsafe { self.device.device_wait_idle() } {
            error!("Failed to wait for device idle before destroying frame slots: {err}");
        }
        for frame in &self.per_frame {
            unsafe { frame.destroy_semaphores(&self.device) };
        }
    }
}
