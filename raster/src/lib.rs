//! Tile-parallel software rasterizer
//!
//! Turns transformed triangle geometry into shaded pixels on the CPU. The
//! pipeline is fixed: vertex shader, homogeneous clip, screen-space binning
//! into 64x64 tiles, fixed-point half-space rasterization into per-tile
//! fragment queues, then a 4-wide fragment shading pass that writes the color
//! and depth surfaces. A pool of worker threads runs the whole pipeline per
//! draw batch, synchronized by a condition variable at the idle edge and by
//! spin barriers inside a batch.

mod arena;
mod binning;
mod clip;
mod context;
mod error;
mod fragment;
mod internal;
mod rasterizer;
mod renderer;
mod shade;
mod shader;
mod simd;
mod target;
mod threads;
mod tile;
mod vertex;

pub use context::{CullMode, FillMode, Transform};
pub use error::RasterError;
pub use renderer::Renderer;
pub use shader::{
    ColorQuad, FragmentQuad, Light, LightKind, Material, ShaderGlobals, ShaderProgram, MAX_LIGHTS,
};
pub use simd::{CoverageMask, Float4};
pub use target::{ClearFlags, TargetFlags, TargetId, MAX_RENDER_TARGETS};
pub use tile::TILE_SIZE;
pub use vertex::{TransformedVertex, Vertex, MAX_VARYINGS};
