//! Public renderer handle
//!
//! Owns the shared core and the worker pool. Every state setter forces a
//! full idle wait first, making the context single-writer-when-quiesced; no
//! lock guards the hot path.

use crate::context::{CullMode, FillMode, RenderContext, Transform};
use crate::error::RasterError;
use crate::internal::{RenderCore, MAX_BATCH_INDICES};
use crate::shader::{Light, Material, ShaderProgram, MAX_LIGHTS};
use crate::target::{ClearFlags, RenderTarget, TargetFlags, TargetId, MAX_RENDER_TARGETS};
use crate::threads::spawn_workers;
use crate::vertex::{Vertex, MAX_VARYINGS};
use glam::Mat4;
use std::sync::Arc;
use std::thread::JoinHandle;
use surface::Surface;

pub struct Renderer {
    core: Arc<RenderCore>,
    workers: Vec<JoinHandle<()>>,
}

impl Renderer {
    /// Bring up the renderer with a default render target and a fixed pool
    /// of `num_threads` workers (the calling thread counts as one).
    pub fn new(
        target: Surface,
        flags: TargetFlags,
        num_threads: usize,
    ) -> Result<Self, RasterError> {
        let num_threads = num_threads.max(1);
        let core = Arc::new(RenderCore::new(num_threads));

        let rt = RenderTarget::new(target, flags, num_threads, core.face_capacity())?;
        // Safety: no workers exist yet.
        unsafe { core.targets_mut() }.push(rt);

        let workers = if num_threads > 1 {
            spawn_workers(&core)
        } else {
            Vec::new()
        };

        log::info!("renderer up: {} threads", num_threads);
        Ok(Self { core, workers })
    }

    #[inline]
    fn sync(&self) {
        self.core.sync.wait_idle();
    }

    /// Quiesce the pool and hand out the context for mutation.
    fn ctx_mut(&mut self) -> &mut RenderContext {
        self.sync();
        // Safety: pool idle, exclusive through &mut self.
        unsafe { self.core.ctx_mut() }
    }

    // ---- render targets ------------------------------------------------

    /// Create an additional render target; id 0 is the default target.
    pub fn create_render_target(
        &mut self,
        target: Surface,
        flags: TargetFlags,
    ) -> Result<TargetId, RasterError> {
        self.sync();
        if self.core.num_targets() == MAX_RENDER_TARGETS {
            return Err(RasterError::MaxTargets);
        }
        let rt = RenderTarget::new(
            target,
            flags,
            self.core.num_threads,
            self.core.face_capacity(),
        )?;
        // Safety: pool idle.
        let targets = unsafe { self.core.targets_mut() };
        targets.push(rt);
        Ok((targets.len() - 1) as TargetId)
    }

    pub fn set_render_target(&mut self, id: TargetId) {
        self.sync();
        if (id as usize) < self.core.num_targets() {
            self.core.set_current_target(id as usize);
        }
    }

    /// Depth surface of a target, for shadow-map style sampling.
    pub fn render_target_depth(&self, id: TargetId) -> Option<Arc<Surface>> {
        self.core.target_at(id as usize)?.depth.clone()
    }

    /// Color surface of the active target.
    pub fn color_surface(&self) -> Arc<Surface> {
        self.core.target().color.clone()
    }

    // ---- render state --------------------------------------------------

    pub fn set_transform(&mut self, which: Transform, matrix: Mat4) {
        let ctx = self.ctx_mut();
        match which {
            Transform::World => ctx.globals.world = matrix,
            Transform::View => {
                ctx.globals.view = matrix;
                ctx.globals.view_inv = matrix.inverse();
            }
            Transform::Projection => ctx.globals.projection = matrix,
        }
    }

    pub fn set_cull_mode(&mut self, mode: CullMode) {
        self.ctx_mut().cull_mode = mode;
    }

    pub fn set_fill_mode(&mut self, mode: FillMode) {
        self.ctx_mut().fill_mode = mode;
    }

    pub fn set_texture(&mut self, texture: Option<Arc<Surface>>) {
        self.ctx_mut().globals.texture = texture;
    }

    pub fn set_material(&mut self, material: &Material) {
        self.ctx_mut().globals.material = *material;
    }

    pub fn set_light(&mut self, slot: usize, light: &Light) {
        if slot < MAX_LIGHTS {
            self.ctx_mut().globals.lights[slot] = *light;
        }
    }

    pub fn set_light_enabled(&mut self, slot: usize, on: bool) {
        if slot < MAX_LIGHTS {
            self.ctx_mut().globals.lights_enabled[slot] = on;
        }
    }

    /// Enable the depth test and depth writes. Ignored when the active
    /// target has no depth surface.
    pub fn set_depth_enabled(&mut self, on: bool) {
        self.sync();
        if on && self.core.target().depth.is_none() {
            return;
        }
        // Safety: pool idle, exclusive through &mut self.
        unsafe { self.core.ctx_mut() }.depth_enabled = on;
    }

    /// Toggle color writes; disable for depth-only (shadow map) passes.
    pub fn set_color_write_enabled(&mut self, on: bool) {
        self.ctx_mut().color_enabled = on;
    }

    /// Number of varyings interpolated per vertex, at most [`MAX_VARYINGS`].
    pub fn set_num_varyings(&mut self, count: usize) {
        assert!(count <= MAX_VARYINGS, "varying count over the ceiling");
        self.ctx_mut().num_varyings = count;
    }

    pub fn set_shader(&mut self, shader: Arc<dyn ShaderProgram>) {
        self.ctx_mut().shader = Some(shader);
    }

    // ---- frame bracket -------------------------------------------------

    pub fn begin_scene(&mut self) {
        self.sync();
        let target = self.core.target();
        target.color.lock();
        if let Some(d) = &target.depth {
            d.lock();
        }
    }

    /// Fill the selected buffers. Depth clears to 0.0 so any inverse-W
    /// passes the first test.
    pub fn clear(&mut self, flags: ClearFlags, color: u32) {
        self.sync();
        let target = self.core.target();
        if flags.contains(ClearFlags::COLOR) {
            target.color.fill(color);
        }
        if flags.contains(ClearFlags::DEPTH) {
            if let Some(d) = &target.depth {
                d.fill(0);
            }
        }
    }

    pub fn end_scene(&mut self) {
        self.sync();
        let target = self.core.target();
        target.color.unlock();
        if let Some(d) = &target.depth {
            d.unlock();
        }
    }

    /// Wait out the frame and hand back the finished color surface.
    pub fn present(&mut self) -> Arc<Surface> {
        self.sync();
        self.core.target().color.clone()
    }

    // ---- drawing -------------------------------------------------------

    /// Draw indexed triangles. `indices.len()` must be a multiple of 3; a
    /// trailing remainder is ignored. Dispatches in batches capped at the
    /// internal index limit and returns with the pool idle, so the borrowed
    /// slices are released by the time this returns.
    pub fn draw_triangles(&mut self, vertices: &[Vertex], indices: &[u32]) {
        debug_assert_eq!(indices.len() % 3, 0, "index count not a multiple of 3");
        let n = indices.len() - indices.len() % 3;
        if n == 0 {
            return;
        }

        self.sync();
        // Safety: pool idle, exclusive through &mut self.
        let ctx = unsafe { self.core.ctx_mut() };
        if ctx.shader.is_none() {
            log::debug!("draw_triangles with no shader bound");
            return;
        }

        // Per-draw refresh: combined transform and premultiplied
        // light * material colors.
        let globals = &mut ctx.globals;
        globals.wvp = globals.projection * globals.view * globals.world;
        for i in 0..MAX_LIGHTS {
            if globals.lights_enabled[i] {
                globals.ml_ambient[i] = globals.lights[i].ambient * globals.material.ambient;
                globals.ml_diffuse[i] = globals.lights[i].diffuse * globals.material.diffuse;
                globals.ml_specular[i] = globals.lights[i].specular * globals.material.specular;
            }
        }

        self.core.clear_vertex_caches();

        let mut cur = 0;
        while cur < n {
            let count = (n - cur).min(MAX_BATCH_INDICES);
            self.core.draw_batch(vertices, &indices[cur..cur + count]);
            cur += count;
        }

        self.sync();
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.sync();
        self.core
            .sync
            .shutdown
            .store(true, core::sync::atomic::Ordering::Release);
        {
            let _guard = self.core.sync.wake_guard();
            self.core.sync.wake_cond.notify_all();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        log::info!("renderer down");
    }
}
