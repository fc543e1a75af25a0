//! Exposes [`DeviceResource`], an owned native handle whose destruction goes through frame retirement.
//!
//! Dropping a `DeviceResource` never destroys its handle right away. The destructor is sent to the
//! [`ResourceRetirement`](crate::ResourceRetirement) of the renderer and runs once every frame that may have
//! referenced the handle has finished on the GPU. Wrap it in a [`Ref`](crate::Ref) to share it between threads and
//! render commands.
//!
//! # Example
//! ```no_run
//! # use tandem::*;
//! # use ash::vk;
//! # fn example(device: ash::Device, buffer: vk::Buffer, renderer: &Renderer<VkFrameTarget>) {
//! let buffer = renderer.registry().create(DeviceResource::vulkan(device, buffer, renderer.releaser()));
//! // Keep the buffer alive until the command ran on the render thread.
//! let captured = buffer.clone();
//! drop(buffer);
//! # }
//! ```

use ash::vk;

use crate::ResourceReleaser;

/// Native handle types that can destroy themselves through an [`ash::Device`].
pub trait VkDestroy: Copy + Send + 'static {
    /// Destroy the handle.
    /// # Safety
    /// The handle must have been created from `device` and must no longer be in use by the GPU.
    unsafe fn destroy(self, device: &ash::Device);
}

macro_rules! impl_vk_destroy {
    ($($handle:ty => $func:ident),* $(,)?) => {
        $(
            impl VkDestroy for $handle {
                unsafe fn destroy(self, device: &ash::Device) {
                    device.$func(self, None);
                }
            }
        )*
    };
}

impl_vk_destroy! {
    vk::Buffer => destroy_buffer,
    vk::Image => destroy_image,
    vk::ImageView => destroy_image_view,
    vk::Sampler => destroy_sampler,
    vk::Pipeline => destroy_pipeline,
    vk::PipelineLayout => destroy_pipeline_layout,
    vk::DescriptorPool => destroy_descriptor_pool,
    vk::DescriptorSetLayout => destroy_descriptor_set_layout,
    vk::Framebuffer => destroy_framebuffer,
    vk::RenderPass => destroy_render_pass,
    vk::ShaderModule => destroy_shader_module,
}

type DestroyFn<H> = Box<dyn FnOnce(H) + Send + Sync>;

/// Owns one native handle and retires it when dropped.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DeviceResource<H: Copy + Send + 'static> {
    handle: H,
    #[derivative(Debug = "ignore")]
    destroy: Option<DestroyFn<H>>,
    releaser: ResourceReleaser,
}

impl<H: Copy + Send + 'static> DeviceResource<H> {
    /// Take ownership of `handle`. `destroy` is called with the handle once it is safe to destroy.
    pub fn new(handle: H, releaser: ResourceReleaser, destroy: impl FnOnce(H) + Send + Sync + 'static) -> Self {
        #[cfg(feature = "log-objects")]
        trace!("Created device resource {}", std::any::type_name::<H>());
        DeviceResource {
            handle,
            destroy: Some(Box::new(destroy)),
            releaser,
        }
    }

    /// Get the native handle.
    /// The handle stays valid for as long as this object lives.
    pub fn handle(&self) -> H {
        self.handle
    }
}

impl<H: VkDestroy> DeviceResource<H> {
    /// Take ownership of a Vulkan handle created from `device`.
    pub fn vulkan(device: ash::Device, handle: H, releaser: ResourceReleaser) -> Self {
        // SAFETY: The handle was created from this device, and retirement only calls this once the GPU is done with it.
        Self::new(handle, releaser, move |handle| unsafe { handle.destroy(&device) })
    }
}

impl<H: Copy + Send + 'static> Drop for DeviceResource<H> {
    fn drop(&mut self) {
        if let Some(destroy) = self.destroy.take() {
            let handle = self.handle;
            self.releaser.release(move || {
                #[cfg(feature = "log-objects")]
                trace!("Destroying device resource {}", std::any::type_name::<H>());
                destroy(handle)
            });
        }
    }
}

static_assertions::assert_impl_all!(DeviceResource<vk::Buffer>: Send, Sync);
