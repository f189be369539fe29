//! GPU device management.
//!
//! This module is responsible for:
//! - ranking enumerated adapters and selecting the best one
//! - the headless compute context (device/queue + compiled kernel program)
//! - the windowed surface context (swapchain, frames, encoders)

mod compute;
mod screen;
mod select;

pub use compute::{ComputeContext, ComputeInit};
pub use screen::{Screen, ScreenFrame, ScreenInit, SurfaceErrorAction};
pub use select::{AdapterProfile, select_adapter};
