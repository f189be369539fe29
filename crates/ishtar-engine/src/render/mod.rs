//! GPU presentation subsystem.
//!
//! The blit renderer copies canvas pixel data into a screen texture and
//! draws it into the acquired frame. It owns its GPU resources (pipeline,
//! texture, buffers) and recreates them lazily when the surface format or
//! blend mode changes.
//!
//! Convention:
//! - CPU geometry is in physical pixels (top-left origin, +Y down).
//! - The vertex shader converts to NDC using a viewport uniform.

mod blit;
mod ctx;

pub use blit::CanvasRenderer;
pub use ctx::{RenderCtx, RenderTarget};
