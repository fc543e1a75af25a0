pub use ash::vk;

pub use crate::core::config::*;
pub use crate::core::error::Error;

pub use crate::sync::command_queue::*;
pub use crate::sync::fence::*;
pub use crate::sync::render_thread::*;
pub use crate::sync::thread::*;

pub use crate::resource::device_resource::*;
pub use crate::resource::reference::*;
pub use crate::resource::retirement::*;

pub use crate::wsi::frame::*;
pub use crate::wsi::swapchain::*;

pub use crate::renderer::Renderer;
