//! Render context: the per-renderer state block

use crate::shader::{ShaderGlobals, ShaderProgram};
use std::sync::Arc;

/// Which triangle winding gets culled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    #[default]
    None,
    Ccw,
    Cw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wire,
}

/// Transform slots settable through the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    World,
    View,
    Projection,
}

/// All mutable rendering state
///
/// Single writer when quiesced: every setter waits for the worker pool to go
/// idle before touching a field, and workers only read.
pub struct RenderContext {
    pub cull_mode: CullMode,
    pub fill_mode: FillMode,
    pub depth_enabled: bool,
    pub color_enabled: bool,

    pub num_varyings: usize,
    pub shader: Option<Arc<dyn ShaderProgram>>,

    pub globals: ShaderGlobals,
}

impl RenderContext {
    pub fn new() -> Self {
        Self {
            cull_mode: CullMode::None,
            fill_mode: FillMode::Solid,
            depth_enabled: true,
            color_enabled: true,
            num_varyings: 0,
            shader: None,
            globals: ShaderGlobals::default(),
        }
    }
}
