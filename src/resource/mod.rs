//! Exposes shared ownership of render objects and the deferred destruction of GPU resources.

pub mod device_resource;
pub mod reference;
pub mod retirement;
