//! Vertex formats for the triangle pipeline

use glam::{Vec2, Vec4};

/// Compile-time ceiling on interpolated attributes per vertex.
pub const MAX_VARYINGS: usize = 12;

/// An input vertex handed to the vertex shader
#[derive(Debug, Clone, Copy)]
pub struct Vertex {
    pub position: Vec4,
    pub color: Vec4,
    pub normal: Vec4,
    pub uv: Vec2,
}

impl Vertex {
    pub const fn new(position: Vec4, color: Vec4, normal: Vec4, uv: Vec2) -> Self {
        Self {
            position,
            color,
            normal,
            uv,
        }
    }

    /// A vertex with just position and color
    pub const fn pos_color(position: Vec4, color: Vec4) -> Self {
        Self {
            position,
            color,
            normal: Vec4::Y,
            uv: Vec2::ZERO,
        }
    }
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: Vec4::W,
            color: Vec4::ONE,
            normal: Vec4::Y,
            uv: Vec2::ZERO,
        }
    }
}

/// A vertex produced by the vertex shader
///
/// The position is in clip space until the perspective divide, after which x
/// and y are screen coordinates and w holds the inverse of the original w.
/// z is unused past the clip stage; the depth convention is inverse-W.
#[derive(Debug, Clone, Copy)]
pub struct TransformedVertex {
    pub position: Vec4,
    pub varyings: [f32; MAX_VARYINGS],
}

impl TransformedVertex {
    pub const EMPTY: Self = Self {
        position: Vec4::ZERO,
        varyings: [0.0; MAX_VARYINGS],
    };
}

impl Default for TransformedVertex {
    fn default() -> Self {
        Self::EMPTY
    }
}
