//! The wsi module provides frame pacing and presentation to a swapchain.

pub mod frame;
pub mod swapchain;
