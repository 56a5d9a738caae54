//! Fragment shading loop
//!
//! Drains a tile's fragment queue into the color and depth surfaces, 4
//! pixels at a time. Interpolants are rebuilt from the face's cached start
//! values and gradients, divided by interpolated inverse-W for perspective
//! correction, and stored through lane masks so untouched neighbors survive.
//!
//! The depth buffer holds inverse-W directly; `new >= stored` passes, so
//! larger inverse-W (closer to the camera) wins regardless of order.

use crate::binning::TransformedFace;
use crate::context::RenderContext;
use crate::fragment::{FragmentBuffer, FragmentKind};
use crate::internal::RenderCore;
use crate::shader::{ColorQuad, FragmentQuad, ShaderProgram};
use crate::simd::{CoverageMask, Float4};
use crate::target::RenderTarget;
use crate::tile::TILE_SIZE;
use crate::vertex::MAX_VARYINGS;
use surface::PixelFormat;

/// Shade and clear one tile's fragment queue.
///
/// The (color, depth) enables pick one of four loop flavors, mirroring the
/// write masks the caller configured.
pub(crate) fn render_fragments(core: &RenderCore, target: &RenderTarget, fb: &mut FragmentBuffer) {
    // Safety: the context is frozen for the whole dispatch.
    let ctx = unsafe { core.ctx() };
    let color = ctx.color_enabled;
    let depth = ctx.depth_enabled && target.depth.is_some();

    match (color, depth) {
        (true, true) => render_inner::<true, true>(core, ctx, target, fb),
        (true, false) => render_inner::<true, false>(core, ctx, target, fb),
        (false, true) => render_inner::<false, true>(core, ctx, target, fb),
        (false, false) => render_inner::<false, false>(core, ctx, target, fb),
    }

    fb.clear();
}

/// Incremental interpolants of one 8x8 block: two 4-pixel groups per row
struct BlockInterp {
    w0: Float4,
    w1: Float4,
    wdy: Float4,
    v0: [Float4; MAX_VARYINGS],
    v1: [Float4; MAX_VARYINGS],
    vdy: [Float4; MAX_VARYINGS],
}

impl BlockInterp {
    #[inline]
    fn setup(face: &TransformedFace, bx: usize, by: usize, n_var: usize, color: bool) -> Self {
        let dxs = bx as f32 - face.v0x;
        let dys = by as f32 - face.v0y;

        let base = face.v0w + face.dw.x * dxs + face.dw.y * dys;
        let dx = Float4::splat(face.dw.x);
        let w0 = Float4::splat(base) + dx * Float4::STEP;
        let w1 = w0 + dx * 4.0;

        let mut it = Self {
            w0,
            w1,
            wdy: Float4::splat(face.dw.y),
            v0: [Float4::ZERO; MAX_VARYINGS],
            v1: [Float4::ZERO; MAX_VARYINGS],
            vdy: [Float4::ZERO; MAX_VARYINGS],
        };

        if color {
            for i in 0..n_var {
                let d = face.dv[i];
                let base = face.v0v[i] + d.x * dxs + d.y * dys;
                let dx = Float4::splat(d.x);
                it.v0[i] = Float4::splat(base) + dx * Float4::STEP;
                it.v1[i] = it.v0[i] + dx * 4.0;
                it.vdy[i] = Float4::splat(d.y);
            }
        }
        it
    }

    #[inline]
    fn step_y(&mut self, n_var: usize, color: bool) {
        self.w0 = self.w0 + self.wdy;
        self.w1 = self.w1 + self.wdy;
        if color {
            for i in 0..n_var {
                self.v0[i] = self.v0[i] + self.vdy[i];
                self.v1[i] = self.v1[i] + self.vdy[i];
            }
        }
    }
}

fn render_inner<const COLOR: bool, const DEPTH: bool>(
    core: &RenderCore,
    ctx: &RenderContext,
    target: &RenderTarget,
    fb: &FragmentBuffer,
) {
    let Some(shader) = ctx.shader.as_deref() else {
        return;
    };
    let n_var = ctx.num_varyings;

    let surf = &*target.color;
    let cb_base = surf.base_ptr();
    let cb_pitch = surf.pitch();
    let fmt = surf.format();
    let surf_w = surf.width();
    let surf_h = surf.height();

    let (db_base, db_pitch) = match target.depth.as_deref() {
        Some(d) => (d.base_ptr() as *mut f32, d.pitch()),
        None => (core::ptr::null_mut(), 0),
    };

    let mut quad = FragmentQuad::default();

    for e in 0..fb.len() {
        let frag = *fb.get(e);
        // Safety: face arenas are immutable once shading runs.
        let face = unsafe { core.arena(frag.thread as usize).face(frag.face) };
        let (fx, fy) = (frag.x as usize, frag.y as usize);

        match frag.kind {
            FragmentKind::BlockMask => {
                let dxs = fx as f32 - face.v0x;
                let dys = fy as f32 - face.v0y;
                let base = face.v0w + face.dw.x * dxs + face.dw.y * dys;
                let w = Float4::splat(base) + Float4::splat(face.dw.x) * Float4::STEP;

                let mut varyings = [Float4::ZERO; MAX_VARYINGS];
                if COLOR {
                    for i in 0..n_var {
                        let d = face.dv[i];
                        let vbase = face.v0v[i] + d.x * dxs + d.y * dys;
                        varyings[i] = Float4::splat(vbase) + Float4::splat(d.x) * Float4::STEP;
                    }
                }

                // Safety: group origins stay inside the padded allocations.
                let cptr = unsafe { cb_base.add(fy * cb_pitch + fx) };
                let dptr = if DEPTH {
                    unsafe { db_base.add(fy * db_pitch + fx) }
                } else {
                    core::ptr::null_mut()
                };

                shade_group::<COLOR, DEPTH>(
                    shader,
                    ctx,
                    &mut quad,
                    w,
                    &varyings,
                    CoverageMask::from_bits(frag.mask as u32),
                    cptr,
                    dptr,
                    fmt,
                    n_var,
                );
            }
            FragmentKind::Block => {
                shade_block::<COLOR, DEPTH>(
                    shader, ctx, &mut quad, face, fx, fy, cb_base, cb_pitch, db_base, db_pitch,
                    fmt, n_var,
                );
            }
            FragmentKind::Tile => {
                // Whole tile trivially covered; walk its blocks. Ragged
                // tiles run partial block rows into the surface padding.
                let tw = TILE_SIZE.min(surf_w - fx);
                let th = TILE_SIZE.min(surf_h - fy);
                let mut by = fy;
                while by < fy + th {
                    let mut bx = fx;
                    while bx < fx + tw {
                        shade_block::<COLOR, DEPTH>(
                            shader, ctx, &mut quad, face, bx, by, cb_base, cb_pitch, db_base,
                            db_pitch, fmt, n_var,
                        );
                        bx += 8;
                    }
                    by += 8;
                }
            }
        }
    }
}

/// Shade one fully covered 8x8 block
#[allow(clippy::too_many_arguments)]
fn shade_block<const COLOR: bool, const DEPTH: bool>(
    shader: &dyn ShaderProgram,
    ctx: &RenderContext,
    quad: &mut FragmentQuad,
    face: &TransformedFace,
    bx: usize,
    by: usize,
    cb_base: *mut u32,
    cb_pitch: usize,
    db_base: *mut f32,
    db_pitch: usize,
    fmt: PixelFormat,
    n_var: usize,
) {
    let mut it = BlockInterp::setup(face, bx, by, n_var, COLOR);

    // Safety: block rows stay inside the padded allocations.
    let mut cptr = unsafe { cb_base.add(by * cb_pitch + bx) };
    let mut dptr = if DEPTH {
        unsafe { db_base.add(by * db_pitch + bx) }
    } else {
        core::ptr::null_mut()
    };

    for _ in 0..8 {
        shade_group::<COLOR, DEPTH>(
            shader,
            ctx,
            quad,
            it.w0,
            &it.v0,
            CoverageMask::FULL,
            cptr,
            dptr,
            fmt,
            n_var,
        );
        shade_group::<COLOR, DEPTH>(
            shader,
            ctx,
            quad,
            it.w1,
            &it.v1,
            CoverageMask::FULL,
            unsafe { cptr.add(4) },
            if DEPTH { unsafe { dptr.add(4) } } else { dptr },
            fmt,
            n_var,
        );

        it.step_y(n_var, COLOR);
        cptr = unsafe { cptr.add(cb_pitch) };
        if DEPTH {
            dptr = unsafe { dptr.add(db_pitch) };
        }
    }
}

/// Depth-test, shade, and store one 4-pixel group through its lane mask.
#[allow(clippy::too_many_arguments)]
#[inline]
fn shade_group<const COLOR: bool, const DEPTH: bool>(
    shader: &dyn ShaderProgram,
    ctx: &RenderContext,
    quad: &mut FragmentQuad,
    w: Float4,
    varyings: &[Float4; MAX_VARYINGS],
    cov: CoverageMask,
    cptr: *mut u32,
    dptr: *mut f32,
    fmt: PixelFormat,
    n_var: usize,
) {
    let mut mask = cov;

    let stored = if DEPTH {
        // Safety: the caller guarantees 4 lanes of valid depth words.
        let d = Float4::from_array(unsafe { core::ptr::read_unaligned(dptr as *const [f32; 4]) });
        mask = mask & w.ge(d);
        if !mask.any() {
            return;
        }
        d
    } else {
        if !mask.any() {
            return;
        }
        Float4::ZERO
    };

    if COLOR {
        // Perspective correction: varyings were premultiplied by inverse-W
        // at setup, so dividing by interpolated inverse-W restores them.
        let inv = w.recip();
        for i in 0..n_var {
            quad.varyings[i] = varyings[i] * inv;
        }
        shader.shade_fragment(&ctx.globals, quad);

        let packed = pack_quad(&quad.output, fmt);
        // Safety: 4 lanes of valid color words.
        let old = unsafe { core::ptr::read_unaligned(cptr as *const [u32; 4]) };
        let merged = mask.select_words(packed, old);
        unsafe { core::ptr::write_unaligned(cptr as *mut [u32; 4], merged) };
    }

    if DEPTH {
        let merged = mask.select(w, stored);
        // Safety: same lanes as the read above.
        unsafe { core::ptr::write_unaligned(dptr as *mut [f32; 4], merged.to_array()) };
    }
}

/// Clamp-scale shader output to 8-bit channels and pack per the format
#[inline]
fn pack_quad(out: &ColorQuad, fmt: PixelFormat) -> [u32; 4] {
    let max = Float4::splat(255.0);
    let r = (out.r * 255.0).min(max).max(Float4::ZERO).to_array();
    let g = (out.g * 255.0).min(max).max(Float4::ZERO).to_array();
    let b = (out.b * 255.0).min(max).max(Float4::ZERO).to_array();

    let mut packed = [0u32; 4];
    for i in 0..4 {
        packed[i] = ((r[i].round() as u32) << fmt.r_shift)
            | ((g[i].round() as u32) << fmt.g_shift)
            | ((b[i].round() as u32) << fmt.b_shift);
    }
    packed
}
