//! Shader invocation contract and shader globals
//!
//! The rasterizer never looks inside a shader. It calls `transform_vertex`
//! once per source vertex (through the per-thread vertex cache) and
//! `shade_fragment` once per 4-pixel group with perspective-corrected
//! varyings already in place.

use crate::simd::Float4;
use crate::vertex::{TransformedVertex, Vertex, MAX_VARYINGS};
use glam::{Mat4, Vec4};
use std::sync::Arc;
use surface::Surface;

/// Number of light slots in the shader globals.
pub const MAX_LIGHTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightKind {
    #[default]
    Ambient,
    Point,
    Directional,
    Spot,
}

/// One light slot
#[derive(Debug, Clone, Copy)]
pub struct Light {
    pub kind: LightKind,
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub position: Vec4,
    pub direction: Vec4,
    pub range: f32,
    pub falloff: f32,
    pub attenuation: [f32; 3],
    pub theta: f32,
    pub phi: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            kind: LightKind::Ambient,
            ambient: Vec4::ZERO,
            diffuse: Vec4::ZERO,
            specular: Vec4::ZERO,
            position: Vec4::W,
            direction: Vec4::ZERO,
            range: 0.0,
            falloff: 0.0,
            attenuation: [1.0, 0.0, 0.0],
            theta: 0.0,
            phi: 0.0,
        }
    }
}

/// Surface material
#[derive(Debug, Clone, Copy)]
pub struct Material {
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub emissive: Vec4,
    pub power: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: Vec4::ZERO,
            diffuse: Vec4::ZERO,
            specular: Vec4::ZERO,
            emissive: Vec4::ZERO,
            power: 0.0,
        }
    }
}

/// Read-only state visible to both shader stages
///
/// Mutated only through the renderer's setters, which force a full idle wait
/// first, so shaders always observe a quiescent snapshot.
pub struct ShaderGlobals {
    pub texture: Option<Arc<Surface>>,

    pub world: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    /// projection * view * world, refreshed per draw call.
    pub wvp: Mat4,
    pub view_inv: Mat4,

    pub material: Material,

    pub lights: [Light; MAX_LIGHTS],
    pub lights_enabled: [bool; MAX_LIGHTS],

    // Light * material colors, premultiplied per draw call.
    pub ml_ambient: [Vec4; MAX_LIGHTS],
    pub ml_diffuse: [Vec4; MAX_LIGHTS],
    pub ml_specular: [Vec4; MAX_LIGHTS],
}

impl Default for ShaderGlobals {
    fn default() -> Self {
        Self {
            texture: None,
            world: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            wvp: Mat4::IDENTITY,
            view_inv: Mat4::IDENTITY,
            material: Material::default(),
            lights: [Light::default(); MAX_LIGHTS],
            lights_enabled: [false; MAX_LIGHTS],
            ml_ambient: [Vec4::ZERO; MAX_LIGHTS],
            ml_diffuse: [Vec4::ZERO; MAX_LIGHTS],
            ml_specular: [Vec4::ZERO; MAX_LIGHTS],
        }
    }
}

/// RGB output of one 4-pixel shading group, each channel in 0..1
#[derive(Debug, Clone, Copy)]
pub struct ColorQuad {
    pub r: Float4,
    pub g: Float4,
    pub b: Float4,
}

impl Default for ColorQuad {
    fn default() -> Self {
        Self {
            r: Float4::ZERO,
            g: Float4::ZERO,
            b: Float4::ZERO,
        }
    }
}

/// In/out block of one fragment-shader invocation
pub struct FragmentQuad {
    /// Perspective-corrected varyings, one [`Float4`] per active attribute.
    pub varyings: [Float4; MAX_VARYINGS],
    pub output: ColorQuad,
}

impl Default for FragmentQuad {
    fn default() -> Self {
        Self {
            varyings: [Float4::ZERO; MAX_VARYINGS],
            output: ColorQuad::default(),
        }
    }
}

/// A caller-supplied shader pair
pub trait ShaderProgram: Send + Sync {
    /// Transform one input vertex into clip space and fill its varyings.
    fn transform_vertex(
        &self,
        globals: &ShaderGlobals,
        input: &Vertex,
        out: &mut TransformedVertex,
    );

    /// Shade one 4-pixel group. Lanes masked out by coverage or the depth
    /// test are discarded by the caller after the fact, so the shader may
    /// compute all four freely.
    fn shade_fragment(&self, globals: &ShaderGlobals, quad: &mut FragmentQuad);
}
