//! "Contexts" group the renderer's state by concern. Each one is generic over, or driven
//! through, the `RenderBackend` it was created with.

pub mod device_ctx;
pub mod frame_ctx;
pub mod pipeline_ctx;
pub mod resource_ctx;
