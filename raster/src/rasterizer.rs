//! Fixed-point half-space rasterizer
//!
//! Walks a face's bounding box in 8x8 pixel blocks. Blocks fully outside any
//! edge are skipped, fully covered blocks emit a single block fragment, and
//! partial blocks are scanned 4 pixels at a time with incrementally stepped
//! edge functions, emitting coverage-mask fragments.

use crate::binning::{TransformedFace, FP_SHIFT};
use crate::fragment::{Fragment, FragmentBuffer, FragmentKind};
use crate::simd::Int4;
use surface::Surface;

/// Rasterize one face into `fb`, restricted to a tile rectangle.
///
/// `tile_x`/`tile_y` are the tile origin and `tile_w`/`tile_h` the extent of
/// its last pixel, all in 28.4 fixed point (matching the face coordinates).
pub(crate) fn rasterize_solid(
    face: &TransformedFace,
    thread: u8,
    face_idx: u32,
    fb: &mut FragmentBuffer,
    tile_x: i32,
    tile_y: i32,
    tile_w: i32,
    tile_h: i32,
) {
    // Edge deltas from the 28.4 coordinates.
    let dx12 = face.fp[0][0] - face.fp[1][0];
    let dx23 = face.fp[1][0] - face.fp[2][0];
    let dx31 = face.fp[2][0] - face.fp[0][0];
    let dy12 = face.fp[0][1] - face.fp[1][1];
    let dy23 = face.fp[1][1] - face.fp[2][1];
    let dy31 = face.fp[2][1] - face.fp[0][1];

    // Whole-pixel steps of each edge function.
    let fdx12 = dx12 << FP_SHIFT;
    let fdx23 = dx23 << FP_SHIFT;
    let fdx31 = dx31 << FP_SHIFT;
    let fdy12 = dy12 << FP_SHIFT;
    let fdy23 = dy23 << FP_SHIFT;
    let fdy31 = dy31 << FP_SHIFT;

    // Lane offsets of a 4-pixel group and the 4-pixel advance.
    let off12 = Int4::new(0, fdy12, 2 * fdy12, 3 * fdy12);
    let off23 = Int4::new(0, fdy23, 2 * fdy23, 3 * fdy23);
    let off31 = Int4::new(0, fdy31, 2 * fdy31, 3 * fdy31);
    let step12 = Int4::splat(fdy12 << 2);
    let step23 = Int4::splat(fdy23 << 2);
    let step31 = Int4::splat(fdy31 << 2);

    // Pixel bounds of the face clipped to the tile.
    let minx = (face.min_x.max(tile_x) + 0xF) >> FP_SHIFT;
    let maxx = (face.max_x.min(tile_x + tile_w) + 0xF) >> FP_SHIFT;
    let miny = (face.min_y.max(tile_y) + 0xF) >> FP_SHIFT;
    let maxy = (face.max_y.min(tile_y + tile_h) + 0xF) >> FP_SHIFT;

    // Block size, 8x8.
    const Q: i32 = 8;

    // Snap to the block grid. Tiles are block-aligned, so this never leaves
    // the tile.
    let minx = minx & !(Q - 1);
    let miny = miny & !(Q - 1);

    let mut y = miny;
    while y < maxy {
        let mut x = minx;
        while x < maxx {
            // Block corners in fixed point.
            let x0 = x << FP_SHIFT;
            let x1 = (x + Q - 1) << FP_SHIFT;
            let y0 = y << FP_SHIFT;
            let y1 = (y + Q - 1) << FP_SHIFT;

            let a = corner_mask(face.c[0], dx12, dy12, x0, x1, y0, y1);
            let b = corner_mask(face.c[1], dx23, dy23, x0, x1, y0, y1);
            let c = corner_mask(face.c[2], dx31, dy31, x0, x1, y0, y1);

            // Outside one edge entirely: nothing in this block.
            if a == 0x0 || b == 0x0 || c == 0x0 {
                x += Q;
                continue;
            }

            if a == 0xF && b == 0xF && c == 0xF {
                // Fully covered block, one fragment for all 64 pixels.
                fb.push(Fragment {
                    kind: FragmentKind::Block,
                    thread,
                    face: face_idx,
                    x: x as u16,
                    y: y as u16,
                    mask: 0,
                });
            } else {
                // Partial block: step the edge functions down the scanlines.
                let mut cy1 = face.c[0] + dx12 * y0 - dy12 * x0;
                let mut cy2 = face.c[1] + dx23 * y0 - dy23 * x0;
                let mut cy3 = face.c[2] + dx31 * y0 - dy31 * x0;

                for iy in y..y + Q {
                    // First 4-pixel group.
                    let e1 = Int4::splat(cy1) - off12;
                    let e2 = Int4::splat(cy2) - off23;
                    let e3 = Int4::splat(cy3) - off31;
                    let mask = e1.gt_zero() & e2.gt_zero() & e3.gt_zero();
                    if mask.any() {
                        fb.push(Fragment {
                            kind: FragmentKind::BlockMask,
                            thread,
                            face: face_idx,
                            x: x as u16,
                            y: iy as u16,
                            mask: mask.0 as u8,
                        });
                    }

                    // Second group, 4 pixels to the right.
                    let e1 = e1 - step12;
                    let e2 = e2 - step23;
                    let e3 = e3 - step31;
                    let mask = e1.gt_zero() & e2.gt_zero() & e3.gt_zero();
                    if mask.any() {
                        fb.push(Fragment {
                            kind: FragmentKind::BlockMask,
                            thread,
                            face: face_idx,
                            x: (x + 4) as u16,
                            y: iy as u16,
                            mask: mask.0 as u8,
                        });
                    }

                    cy1 += fdx12;
                    cy2 += fdx23;
                    cy3 += fdx31;
                }
            }
            x += Q;
        }
        y += Q;
    }
}

#[inline]
fn corner_mask(c: i32, dx: i32, dy: i32, x0: i32, x1: i32, y0: i32, y1: i32) -> u32 {
    let m00 = (c + dx * y0 - dy * x0 > 0) as u32;
    let m10 = (c + dx * y0 - dy * x1 > 0) as u32;
    let m01 = (c + dx * y1 - dy * x0 > 0) as u32;
    let m11 = (c + dx * y1 - dy * x1 > 0) as u32;
    m00 | (m10 << 1) | (m01 << 2) | (m11 << 3)
}

/// Draw a line with Bresenham stepping, plotting only inside the clip
/// rectangle (inclusive pixel bounds). Used by the wireframe fill mode.
pub(crate) fn draw_line(
    surface: &Surface,
    clip: (i32, i32, i32, i32),
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    color: u32,
) {
    let (cx0, cy0, cx1, cy1) = clip;

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    let mut x = x0;
    let mut y = y0;

    loop {
        if x >= cx0 && x <= cx1 && y >= cy0 && y <= cy1 {
            surface.put_pixel(x as usize, y as usize, color);
        }

        if x == x1 && y == y1 {
            break;
        }

        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Outline one face onto the color surface, clipped to a tile rectangle.
pub(crate) fn draw_wire_face(
    surface: &Surface,
    clip: (i32, i32, i32, i32),
    points: [(f32, f32); 3],
    color: u32,
) {
    let px: [(i32, i32); 3] = [
        (points[0].0 as i32, points[0].1 as i32),
        (points[1].0 as i32, points[1].1 as i32),
        (points[2].0 as i32, points[2].1 as i32),
    ];
    draw_line(surface, clip, px[0].0, px[0].1, px[1].0, px[1].1, color);
    draw_line(surface, clip, px[1].0, px[1].1, px[2].0, px[2].1, color);
    draw_line(surface, clip, px[2].0, px[2].1, px[0].0, px[0].1, color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binning::setup_face;
    use crate::fragment::FragmentKind;
    use crate::vertex::TransformedVertex;
    use glam::Vec4;

    fn vert(x: f32, y: f32) -> TransformedVertex {
        let mut v = TransformedVertex::EMPTY;
        v.position = Vec4::new(x, y, 0.0, 1.0);
        v
    }

    /// Expand a fragment stream into a per-pixel coverage grid.
    fn coverage(fb: &FragmentBuffer, w: usize, h: usize) -> Vec<Vec<u32>> {
        let mut grid = vec![vec![0u32; w]; h];
        for e in 0..fb.len() {
            let f = fb.get(e);
            match f.kind {
                FragmentKind::Block => {
                    for y in 0..8 {
                        for x in 0..8 {
                            grid[f.y as usize + y][f.x as usize + x] += 1;
                        }
                    }
                }
                FragmentKind::BlockMask => {
                    for lane in 0..4 {
                        if f.mask & (1 << lane) != 0 {
                            grid[f.y as usize][f.x as usize + lane] += 1;
                        }
                    }
                }
                FragmentKind::Tile => unreachable!("bin-time fragment in rasterizer test"),
            }
        }
        grid
    }

    /// Reference per-pixel half-space evaluation of one face.
    fn reference_inside(face: &crate::binning::TransformedFace, px: i32, py: i32) -> bool {
        let dx12 = face.fp[0][0] - face.fp[1][0];
        let dx23 = face.fp[1][0] - face.fp[2][0];
        let dx31 = face.fp[2][0] - face.fp[0][0];
        let dy12 = face.fp[0][1] - face.fp[1][1];
        let dy23 = face.fp[1][1] - face.fp[2][1];
        let dy31 = face.fp[2][1] - face.fp[0][1];
        let (x, y) = (px << FP_SHIFT, py << FP_SHIFT);
        face.c[0] + dx12 * y - dy12 * x > 0
            && face.c[1] + dx23 * y - dy23 * x > 0
            && face.c[2] + dx31 * y - dy31 * x > 0
    }

    fn rasterize_to_grid(tris: &[[(f32, f32); 3]]) -> Vec<Vec<u32>> {
        let mut fb = FragmentBuffer::new();
        for t in tris {
            let v = [vert(t[0].0, t[0].1), vert(t[1].0, t[1].1), vert(t[2].0, t[2].1)];
            let (v0, v1, v2) =
                crate::binning::cull_and_order(&v[0], &v[1], &v[2], crate::context::CullMode::None)
                    .unwrap();
            let face = setup_face(v0, v1, v2, 0).unwrap();
            fb.reserve_face();
            rasterize_solid(&face, 0, 0, &mut fb, 0, 0, 63 << 4, 63 << 4);
        }
        coverage(&fb, 64, 64)
    }

    #[test]
    fn shared_edge_pixels_rasterize_exactly_once() {
        // Two triangles sharing the diagonal of the square [0,10)x[0,10).
        let grid = rasterize_to_grid(&[
            [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)],
            [(10.0, 0.0), (10.0, 10.0), (0.0, 10.0)],
        ]);

        for y in 0..64 {
            for x in 0..64 {
                let expect = u32::from(x < 10 && y < 10);
                assert_eq!(grid[y][x], expect, "pixel ({x},{y})");
            }
        }
    }

    #[test]
    fn coverage_matches_reference_per_pixel() {
        let tris: [[(f32, f32); 3]; 3] = [
            [(3.2, 1.7), (60.9, 10.4), (20.0, 55.5)],
            [(0.0, 0.0), (63.0, 0.0), (0.0, 63.0)],
            [(31.5, 2.25), (33.75, 40.0), (5.0, 38.0)],
        ];

        for t in &tris {
            let v = [vert(t[0].0, t[0].1), vert(t[1].0, t[1].1), vert(t[2].0, t[2].1)];
            let (v0, v1, v2) =
                crate::binning::cull_and_order(&v[0], &v[1], &v[2], crate::context::CullMode::None)
                    .unwrap();
            let face = setup_face(v0, v1, v2, 0).unwrap();
            let mut fb = FragmentBuffer::new();
            fb.reserve_face();
            rasterize_solid(&face, 0, 0, &mut fb, 0, 0, 63 << 4, 63 << 4);
            let grid = coverage(&fb, 64, 64);

            for y in 0..64 {
                for x in 0..64 {
                    let expect = u32::from(reference_inside(&face, x as i32, y as i32));
                    assert_eq!(grid[y][x], expect, "pixel ({x},{y})");
                }
            }
        }
    }

    #[test]
    fn fragments_respect_the_tile_rectangle() {
        // A face overlapping two tile columns, rasterized against tile 1
        // only: nothing may land left of x = 64.
        let v = [vert(32.0, 8.0), vert(96.0, 8.0), vert(96.0, 40.0)];
        let (v0, v1, v2) =
            crate::binning::cull_and_order(&v[0], &v[1], &v[2], crate::context::CullMode::None)
                .unwrap();
        let face = setup_face(v0, v1, v2, 0).unwrap();
        let mut fb = FragmentBuffer::new();
        fb.reserve_face();
        rasterize_solid(&face, 0, 0, &mut fb, 64 << 4, 0, 63 << 4, 63 << 4);
        assert!(fb.len() > 0);
        for e in 0..fb.len() {
            let f = fb.get(e);
            assert!(f.x >= 64, "fragment at x {}", f.x);
            assert!(f.x < 128 && f.y < 64);
        }
    }
}
