//! Coordinate and color types shared by the renderers.
//!
//! Canonical CPU space for blitting:
//! - Physical pixels
//! - Origin top-left
//! - +X right, +Y down
//!
//! Renderers convert to NDC in shaders using a viewport uniform.

mod color;
mod viewport;

pub use color::ColorRgba;
pub use viewport::Viewport;
