//! Ishtar engine crate.
//!
//! Boilerplate-reduction layer over the GPU runtime: scored adapter
//! selection, kernel program setup, and a CPU pixel canvas that compute
//! kernels shade and a blit renderer presents to a window surface.

pub mod device;
pub mod canvas;
pub mod render;
pub mod window;
pub mod core;
pub mod time;

pub mod logging;
pub mod coords;
