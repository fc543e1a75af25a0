//! Cross-thread render command submission and frame resource lifetime for Vulkan renderers.
//!
//! Tandem lets an application thread describe GPU work without ever stalling on the GPU. Render commands are
//! recorded as closures, handed to a render thread once per frame, and executed there while the application thread
//! already records the next frame. GPU resources are never destroyed while a frame that may still use them is in
//! flight.
//!
//! To get started, the easiest way is to simply
//! ```
//! // Import types under a namespace.
//! use tandem::prelude as td;
//!
//! // Or, if you dont care about using the types under a namespace
//! use tandem::prelude::*;
//! ```
//!
//! # Example
//!
//! First, create the registry shared objects are tracked in and define [`RendererSettings`](crate::RendererSettings)
//! through the [`RendererBuilder`](crate::RendererBuilder).
//! ```
//! use tandem::prelude::*;
//!
//! let registry = LiveRegistry::new();
//! let settings = RendererBuilder::new()
//!     .name("Render Thread")
//!     .frames_in_flight(2)
//!     .threading(ThreadingPolicy::MultiThreaded)
//!     .build();
//! ```
//! The renderer presents to a [`FrameTarget`](crate::FrameTarget). [`VkFrameTarget`](crate::VkFrameTarget)
//! implements it for an existing `VkSwapchainKHR`.
//! ```no_run
//! # use tandem::prelude::*;
//! # use std::sync::{Arc, Mutex};
//! # fn example(device: ash::Device, functions: ash::extensions::khr::Swapchain, swapchain: vk::SwapchainKHR,
//! #            queue: vk::Queue, command_buffers: Vec<vk::CommandBuffer>, settings: RendererSettings,
//! #            registry: LiveRegistry) -> anyhow::Result<()> {
//! let target = VkFrameTarget::new(device, functions, swapchain, 3, Arc::new(Mutex::new(queue)), command_buffers, |old| {
//!     // Recreate the swapchain from `old` and return it with its image count.
//!     Ok((old, 3))
//! })?;
//! let mut renderer = Renderer::new(settings, target, registry)?;
//! renderer.run()?;
//! loop {
//!     renderer.frame(|pacer| {
//!         let cmd = pacer.target().command_buffer(pacer.current_slot());
//!         // Record into `cmd`.
//!     })?;
//! #   break;
//! }
//! renderer.terminate()?;
//! # Ok(())
//! # }
//! ```
//! For further example code, check out the following modules
//! - [`sync`] for command queues and the render thread.
//! - [`wsi`] for frame pacing and presentation.
//! - [`resource`] for shared ownership and resource retirement.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod core;
pub mod renderer;
pub mod resource;
pub mod sync;
pub mod wsi;
