use std::slice;

use ash::prelude::VkResult;
use ash::vk;

/// Wrapper around a [`VkFence`](vk::Fence) object. Fences are used for CPU-GPU sync.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Fence {
    #[derivative(Debug = "ignore")]
    device: ash::Device,
    handle: vk::Fence,
}

impl Fence {
    /// Create a new fence, possibly in the signaled status.
    pub fn new(device: ash::Device, signaled: bool) -> VkResult<Self> {
        let info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
        };
        Ok(Fence {
            handle: unsafe { device.create_fence(&info, None)? },
            device,
        })
    }

    /// Waits for the fence to be signaled with no timeout. Note that this is a blocking call.
    pub fn wait(&self) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(slice::from_ref(&self.handle), true, u64::MAX) }
    }

    /// Resets a fence to the unsignaled status.
    pub fn reset(&self) -> VkResult<()> {
        unsafe { self.device.reset_fences(slice::from_ref(&self.handle)) }
    }

    /// Whether the fence is currently signaled. Does not block.
    pub fn is_signaled(&self) -> VkResult<bool> {
        unsafe { self.device.get_fence_status(self.handle) }
    }

    /// Get unsafe access to the underlying `VkFence` object.
    /// # Safety
    /// Any vulkan calls that mutate the fence may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::Fence {
        self.handle
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.handle, None);
        }
    }
}
