//! Triangle insertion: culling, raster derivatives, and tile binning

use crate::context::CullMode;
use crate::internal::RenderCore;
use crate::tile::TILE_SHIFT;
use crate::vertex::{TransformedVertex, MAX_VARYINGS};
use core::sync::atomic::Ordering;
use glam::Vec2;

/// Fractional bits of the rasterizer's fixed-point coordinates (28.4, one
/// sixteenth of a pixel).
pub(crate) const FP_SHIFT: i32 = 4;

#[inline]
pub(crate) fn iround(v: f32) -> i32 {
    v.round() as i32
}

/// Per-triangle rasterization state, derived once at insertion
///
/// Lives in the inserting thread's face arena until that arena is reset at
/// the next batch. `verts` indexes the three winding-normalized vertices in
/// the same arena.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TransformedFace {
    pub verts: u32,

    // Start values at vertex 0 for interpolation: screen position, inverse-W,
    // and every varying premultiplied by inverse-W.
    pub v0x: f32,
    pub v0y: f32,
    pub v0w: f32,
    pub v0v: [f32; MAX_VARYINGS],

    /// 28.4 fixed-point screen coordinates of the three vertices.
    pub fp: [[i32; 2]; 3],

    /// Half-space edge constants, fill-convention corrected.
    pub c: [i32; 3],

    /// Fixed-point bounding box.
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,

    /// Screen-space gradient of inverse-W.
    pub dw: Vec2,
    /// Screen-space gradients of the premultiplied varyings.
    pub dv: [Vec2; MAX_VARYINGS],
}

/// Gradient of one attribute plane over the triangle
#[inline]
fn gradient(c: f32, di21: f32, di31: f32, dx21: f32, dx31: f32, dy21: f32, dy31: f32) -> Vec2 {
    let a = di31 * dy21 - di21 * dy31;
    let b = dx31 * di21 - dx21 * di31;
    Vec2::new(-a / c, -b / c)
}

/// Backface-cull and winding-normalize a screen-space triangle.
///
/// Accepted triangles come back with a consistent half-space sign convention
/// (second and third vertices swapped when the input winding is reversed).
pub(crate) fn cull_and_order<'a>(
    v0: &'a TransformedVertex,
    v1: &'a TransformedVertex,
    v2: &'a TransformedVertex,
    mode: CullMode,
) -> Option<(
    &'a TransformedVertex,
    &'a TransformedVertex,
    &'a TransformedVertex,
)> {
    let d1x = v2.position.x - v0.position.x;
    let d1y = v2.position.y - v0.position.y;
    let d2x = v2.position.x - v1.position.x;
    let d2y = v2.position.y - v1.position.y;
    let value = d1x * d2y - d1y * d2x;

    match mode {
        CullMode::Ccw if value > 0.0 => return None,
        CullMode::Cw if value < 0.0 => return None,
        _ => {}
    }

    if value > 0.0 {
        Some((v0, v2, v1))
    } else {
        Some((v0, v1, v2))
    }
}

/// Derive the full rasterization state of one ordered triangle.
///
/// Returns None for degenerate (zero screen area) triangles, which would
/// otherwise divide by zero in the gradient solver.
pub(crate) fn setup_face(
    v0: &TransformedVertex,
    v1: &TransformedVertex,
    v2: &TransformedVertex,
    num_varyings: usize,
) -> Option<TransformedFace> {
    let (p0, p1, p2) = (v0.position, v1.position, v2.position);

    // Interpolation determinant; zero means no area to interpolate over.
    let dx21 = p1.x - p0.x;
    let dx31 = p2.x - p0.x;
    let dy21 = p1.y - p0.y;
    let dy31 = p2.y - p0.y;
    let interp_c = dx21 * dy31 - dx31 * dy21;
    if interp_c == 0.0 {
        return None;
    }

    let mut face = TransformedFace {
        verts: 0,
        v0x: p0.x,
        v0y: p0.y,
        v0w: p0.w,
        v0v: [0.0; MAX_VARYINGS],
        fp: [
            [iround(16.0 * p0.x), iround(16.0 * p0.y)],
            [iround(16.0 * p1.x), iround(16.0 * p1.y)],
            [iround(16.0 * p2.x), iround(16.0 * p2.y)],
        ],
        c: [0; 3],
        min_x: 0,
        max_x: 0,
        min_y: 0,
        max_y: 0,
        dw: Vec2::ZERO,
        dv: [Vec2::ZERO; MAX_VARYINGS],
    };

    for i in 0..num_varyings {
        face.v0v[i] = p0.w * v0.varyings[i];
    }

    face.dw = gradient(interp_c, p1.w - p0.w, p2.w - p0.w, dx21, dx31, dy21, dy31);
    for i in 0..num_varyings {
        let a0 = v0.varyings[i] * p0.w;
        let a1 = v1.varyings[i] * p1.w;
        let a2 = v2.varyings[i] * p2.w;
        face.dv[i] = gradient(interp_c, a1 - a0, a2 - a0, dx21, dx31, dy21, dy31);
    }

    // Integer edge deltas.
    let dx12 = face.fp[0][0] - face.fp[1][0];
    let dx23 = face.fp[1][0] - face.fp[2][0];
    let dx31 = face.fp[2][0] - face.fp[0][0];
    let dy12 = face.fp[0][1] - face.fp[1][1];
    let dy23 = face.fp[1][1] - face.fp[2][1];
    let dy31 = face.fp[2][1] - face.fp[0][1];

    // Half-space constants at each defining vertex.
    face.c[0] = dy12 * face.fp[0][0] - dx12 * face.fp[0][1];
    face.c[1] = dy23 * face.fp[1][0] - dx23 * face.fp[1][1];
    face.c[2] = dy31 * face.fp[2][0] - dx31 * face.fp[2][1];

    // Fill convention: shared edges rasterize exactly once. A left or
    // top-touching edge gains one subpixel unit so its boundary pixels count
    // as inside.
    if dy12 < 0 || (dy12 == 0 && dx12 > 0) {
        face.c[0] += 1;
    }
    if dy23 < 0 || (dy23 == 0 && dx23 > 0) {
        face.c[1] += 1;
    }
    if dy31 < 0 || (dy31 == 0 && dx31 > 0) {
        face.c[2] += 1;
    }

    face.min_x = face.fp[0][0].min(face.fp[1][0]).min(face.fp[2][0]);
    face.max_x = face.fp[0][0].max(face.fp[1][0]).max(face.fp[2][0]);
    face.min_y = face.fp[0][1].min(face.fp[1][1]).min(face.fp[2][1]);
    face.max_y = face.fp[0][1].max(face.fp[1][1]).max(face.fp[2][1]);

    Some(face)
}

/// 4-bit inside mask of one edge at four tile corners
#[inline]
fn corner_mask(c: i32, dx: i32, dy: i32, x0: i32, x1: i32, y0: i32, y1: i32) -> u32 {
    let m00 = (c + dx * y0 - dy * x0 > 0) as u32;
    let m10 = (c + dx * y0 - dy * x1 > 0) as u32;
    let m01 = (c + dx * y1 - dy * x0 > 0) as u32;
    let m11 = (c + dx * y1 - dy * x1 > 0) as u32;
    m00 | (m10 << 1) | (m01 << 2) | (m11 << 3)
}

/// Cull, derive, store, and bin one post-divide screen-space triangle.
pub(crate) fn insert_triangle(
    core: &RenderCore,
    tid: usize,
    v0: &TransformedVertex,
    v1: &TransformedVertex,
    v2: &TransformedVertex,
) {
    // Safety: the context is immutable for the duration of the batch.
    let ctx = unsafe { core.ctx() };

    let Some((v0, v1, v2)) = cull_and_order(v0, v1, v2, ctx.cull_mode) else {
        return;
    };
    let Some(face) = setup_face(v0, v1, v2, ctx.num_varyings) else {
        return;
    };

    // Safety: tid is this thread's own arena slot.
    let Some(face_idx) = (unsafe { core.arena(tid).push_face(face, v0, v1, v2) }) else {
        return;
    };

    bin_face(core, tid, face_idx, &face);
}

/// Register a face in every tile its bounding box overlaps, enqueuing tiles
/// whose dirty count rises from zero.
fn bin_face(core: &RenderCore, tid: usize, face_idx: u32, face: &TransformedFace) {
    let target = core.target();

    let min_ix = ((face.min_x >> FP_SHIFT) >> TILE_SHIFT).max(0);
    let max_ix = ((face.max_x >> FP_SHIFT) >> TILE_SHIFT).min(target.tiles_x as i32 - 1);
    let min_iy = ((face.min_y >> FP_SHIFT) >> TILE_SHIFT).max(0);
    let max_iy = ((face.max_y >> FP_SHIFT) >> TILE_SHIFT).min(target.tiles_y as i32 - 1);
    if min_ix > max_ix || min_iy > max_iy {
        return;
    }

    // Small triangles register directly; the corner test costs more than the
    // per-pixel work it could save.
    let small = max_ix - min_ix <= 1 || max_iy - min_iy <= 1;

    let dx12 = face.fp[0][0] - face.fp[1][0];
    let dx23 = face.fp[1][0] - face.fp[2][0];
    let dx31 = face.fp[2][0] - face.fp[0][0];
    let dy12 = face.fp[0][1] - face.fp[1][1];
    let dy23 = face.fp[1][1] - face.fp[2][1];
    let dy31 = face.fp[2][1] - face.fp[0][1];

    for y in min_iy..=max_iy {
        for x in min_ix..=max_ix {
            let trivial = if small {
                false
            } else {
                // Tile corners in fixed point, inclusive.
                let x0 = x << (TILE_SHIFT as i32 + FP_SHIFT);
                let x1 = ((x + 1) << (TILE_SHIFT as i32 + FP_SHIFT)) - 1;
                let y0 = y << (TILE_SHIFT as i32 + FP_SHIFT);
                let y1 = ((y + 1) << (TILE_SHIFT as i32 + FP_SHIFT)) - 1;

                let a = corner_mask(face.c[0], dx12, dy12, x0, x1, y0, y1);
                let b = corner_mask(face.c[1], dx23, dy23, x0, x1, y0, y1);
                let c = corner_mask(face.c[2], dx31, dy31, x0, x1, y0, y1);

                // All corners outside one edge: the tile cannot be touched.
                if a == 0x0 || b == 0x0 || c == 0x0 {
                    continue;
                }
                a == 0xF && b == 0xF && c == 0xF
            };

            let tile_idx = (y * target.tiles_x as i32 + x) as usize;
            if target.tile(tile_idx).push_face(tid, face_idx, trivial) {
                let slot = core.sync.jobs_end.fetch_add(1, Ordering::AcqRel) as usize;
                // Safety: slot is unique this frame by the atomic increment.
                unsafe { target.jobs.set(slot, tile_idx as u32) };
            }
        }
    }
}
