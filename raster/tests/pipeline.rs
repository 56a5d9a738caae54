//! End-to-end pipeline tests against the public API

use glam::Vec4;
use raster::{
    ClearFlags, CullMode, Renderer, ShaderGlobals, ShaderProgram, TargetFlags, TransformedVertex,
    Vertex,
};
use std::sync::Arc;
use surface::{PixelFormat, Surface};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Pass-through shader: clip position comes in premultiplied by w, color
/// rides in varyings 0..3.
struct ColorShader;

impl ShaderProgram for ColorShader {
    fn transform_vertex(&self, g: &ShaderGlobals, input: &Vertex, out: &mut TransformedVertex) {
        out.position = g.wvp * input.position;
        out.varyings[0] = input.color.x;
        out.varyings[1] = input.color.y;
        out.varyings[2] = input.color.z;
    }

    fn shade_fragment(&self, _g: &ShaderGlobals, quad: &mut raster::FragmentQuad) {
        quad.output.r = quad.varyings[0];
        quad.output.g = quad.varyings[1];
        quad.output.b = quad.varyings[2];
    }
}

/// Build a clip-space vertex that lands on screen pixel (px, py) of a
/// width x height target after the perspective divide, with the given w.
fn vert(px: f32, py: f32, w: f32, rgb: [f32; 3], width: f32, height: f32) -> Vertex {
    let hw = 0.5 * width - 0.5;
    let hh = 0.5 * height - 0.5;
    let ndc_x = (px - hw) / hw;
    let ndc_y = (hh - py) / hh;
    Vertex::pos_color(
        Vec4::new(ndc_x * w, ndc_y * w, 0.0, w),
        Vec4::new(rgb[0], rgb[1], rgb[2], 1.0),
    )
}

fn renderer(width: usize, height: usize, flags: TargetFlags, threads: usize) -> Renderer {
    init_logs();
    let surface = Surface::new(width, height, PixelFormat::XRGB8888);
    let mut r = Renderer::new(surface, flags, threads).unwrap();
    r.set_shader(Arc::new(ColorShader));
    r.set_num_varyings(3);
    r.set_cull_mode(CullMode::None);
    r
}

const RED: [f32; 3] = [1.0, 0.0, 0.0];
const GREEN: [f32; 3] = [0.0, 1.0, 0.0];

#[test]
fn flat_quad_fills_exactly_one_tile() {
    let mut r = renderer(128, 128, TargetFlags::DEPTH, 1);
    r.begin_scene();
    r.clear(ClearFlags::COLOR | ClearFlags::DEPTH, 0);

    let (w, h) = (128.0, 128.0);
    let verts = [
        vert(0.0, 0.0, 1.0, RED, w, h),
        vert(64.0, 0.0, 1.0, RED, w, h),
        vert(64.0, 64.0, 1.0, RED, w, h),
        vert(0.0, 64.0, 1.0, RED, w, h),
    ];
    let indices = [0u32, 1, 2, 0, 2, 3];
    r.draw_triangles(&verts, &indices);
    r.end_scene();
    let surface = r.present();

    for y in 0..128 {
        for x in 0..128 {
            let expect = if x < 64 && y < 64 { 0xFF0000 } else { 0 };
            assert_eq!(surface.get_pixel(x, y), expect, "pixel ({x},{y})");
        }
    }
}

#[test]
fn depth_test_keeps_the_nearer_triangle() {
    let (w, h) = (64.0, 64.0);
    let near = [
        vert(8.0, 8.0, 1.0, RED, w, h),
        vert(56.0, 8.0, 1.0, RED, w, h),
        vert(8.0, 56.0, 1.0, RED, w, h),
    ];
    // Same footprint, twice as far (half the inverse-W).
    let far = [
        vert(8.0, 8.0, 2.0, GREEN, w, h),
        vert(56.0, 8.0, 2.0, GREEN, w, h),
        vert(8.0, 56.0, 2.0, GREEN, w, h),
    ];
    let idx = [0u32, 1, 2];

    let mut order_a = Vec::new();
    let mut order_b = Vec::new();
    for (grid, first, second) in [(&mut order_a, &near, &far), (&mut order_b, &far, &near)] {
        let mut r = renderer(64, 64, TargetFlags::DEPTH, 1);
        r.begin_scene();
        r.clear(ClearFlags::COLOR | ClearFlags::DEPTH, 0);
        r.draw_triangles(first, &idx);
        r.draw_triangles(second, &idx);
        r.end_scene();
        let s = r.present();
        for y in 0..64 {
            for x in 0..64 {
                grid.push(s.get_pixel(x, y));
            }
        }
    }

    assert_eq!(order_a, order_b);
    // Interior sample is red either way.
    assert_eq!(order_a[20 * 64 + 20], 0xFF0000);
}

/// Reference edge-function evaluation replicating the rasterizer's
/// fixed-point convention.
fn reference_inside(tri: &[(f32, f32); 3], px: i32, py: i32) -> bool {
    let fp: Vec<(i32, i32)> = tri
        .iter()
        .map(|p| ((16.0 * p.0).round() as i32, (16.0 * p.1).round() as i32))
        .collect();
    let (p0, mut p1, mut p2) = (fp[0], fp[1], fp[2]);

    // Winding normalization, as the insertion step does.
    let d1x = p2.0 - p0.0;
    let d1y = p2.1 - p0.1;
    let d2x = p2.0 - p1.0;
    let d2y = p2.1 - p1.1;
    if d1x * d2y - d1y * d2x > 0 {
        core::mem::swap(&mut p1, &mut p2);
    }

    let edges = [(p0, p1), (p1, p2), (p2, p0)];
    for ((ax, ay), (bx, by)) in edges {
        let dx = ax - bx;
        let dy = ay - by;
        let mut c = dy * ax - dx * ay;
        if dy < 0 || (dy == 0 && dx > 0) {
            c += 1;
        }
        if c + dx * (py << 4) - dy * (px << 4) <= 0 {
            return false;
        }
    }
    true
}

#[test]
fn triangle_straddling_four_tiles_is_seamless() {
    let tri = [(20.0, 30.0), (110.0, 50.0), (40.0, 110.0)];
    let (w, h) = (128.0, 128.0);
    let verts = [
        vert(tri[0].0, tri[0].1, 1.0, RED, w, h),
        vert(tri[1].0, tri[1].1, 1.0, RED, w, h),
        vert(tri[2].0, tri[2].1, 1.0, RED, w, h),
    ];

    let mut r = renderer(128, 128, TargetFlags::DEPTH, 1);
    r.begin_scene();
    r.clear(ClearFlags::COLOR | ClearFlags::DEPTH, 0);
    r.draw_triangles(&verts, &[0, 1, 2]);
    r.end_scene();
    let s = r.present();

    let mut drawn = 0;
    for y in 0..128 {
        for x in 0..128 {
            let expect = if reference_inside(&tri, x as i32, y as i32) {
                0xFF0000
            } else {
                0
            };
            assert_eq!(s.get_pixel(x, y), expect, "pixel ({x},{y})");
            if expect != 0 {
                drawn += 1;
            }
        }
    }
    // The triangle genuinely touches all four tiles of the 2x2 grid.
    assert!(drawn > 2000);
    for (tx, ty) in [(30, 40), (70, 45), (35, 70), (66, 66)] {
        assert!(reference_inside(&tri, tx, ty));
    }
}

fn checker_scene(w: f32, h: f32) -> (Vec<Vertex>, Vec<u32>) {
    let mut verts = Vec::new();
    let mut indices = Vec::new();
    // A spread of overlapping triangles at varying depths and positions,
    // crossing many tile boundaries.
    let mut push = |tri: [(f32, f32); 3], depth_w: f32, rgb: [f32; 3]| {
        let base = verts.len() as u32;
        for p in tri {
            verts.push(vert(p.0, p.1, depth_w, rgb, w, h));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2]);
    };

    let mut k = 0u32;
    for row in 0..4 {
        for col in 0..5 {
            let x = col as f32 * 48.0 + 5.0;
            let y = row as f32 * 44.0 + 3.0;
            let depth_w = 1.0 + (k % 3) as f32;
            let rgb = [
                (k % 2) as f32,
                ((k / 2) % 2) as f32,
                ((k / 4) % 2) as f32 * 0.5 + 0.25,
            ];
            push([(x, y + 40.0), (x + 44.0, y + 12.0), (x + 20.0, y)], depth_w, rgb);
            k += 1;
        }
    }
    (verts, indices)
}

#[test]
fn one_and_four_threads_render_identically() {
    let (verts, indices) = checker_scene(256.0, 192.0);

    let mut frames = Vec::new();
    for threads in [1usize, 4] {
        let mut r = renderer(256, 192, TargetFlags::DEPTH, threads);
        r.begin_scene();
        r.clear(ClearFlags::COLOR | ClearFlags::DEPTH, 0x101010);
        r.draw_triangles(&verts, &indices);
        r.end_scene();
        let s = r.present();

        let mut frame = Vec::with_capacity(256 * 192);
        for y in 0..192 {
            for x in 0..256 {
                frame.push(s.get_pixel(x, y));
            }
        }
        frames.push(frame);
    }

    assert_eq!(frames[0], frames[1]);
    // The scene drew something besides the clear color.
    assert!(frames[0].iter().any(|&p| p != 0x101010));
}

#[test]
fn depth_only_pass_populates_the_shadow_map() {
    let mut r = renderer(64, 64, TargetFlags::empty(), 1);

    // A dedicated depth-capable target, like a shadow map.
    let shadow = Surface::new(64, 64, PixelFormat::XRGB8888);
    let shadow_id = r.create_render_target(shadow, TargetFlags::DEPTH).unwrap();
    r.set_render_target(shadow_id);
    r.set_color_write_enabled(false);

    r.begin_scene();
    r.clear(ClearFlags::COLOR | ClearFlags::DEPTH, 0);
    let (w, h) = (64.0, 64.0);
    let verts = [
        vert(0.0, 0.0, 1.0, RED, w, h),
        vert(63.0, 0.0, 1.0, RED, w, h),
        vert(0.0, 63.0, 1.0, RED, w, h),
    ];
    r.draw_triangles(&verts, &[0, 1, 2]);
    r.end_scene();
    let color = r.present();

    // Color writes were off.
    assert_eq!(color.get_pixel(10, 10), 0);

    // Depth carries inverse-W of the covered pixels.
    let depth = r.render_target_depth(shadow_id).unwrap();
    assert_eq!(depth.depth_at(10, 10), 1.0);
    assert_eq!(depth.depth_at(63, 63), 0.0);
}

#[test]
fn clipped_geometry_still_renders_inside_the_frustum() {
    // One vertex far off the right edge; clipping must keep the on-screen
    // part and drop nothing inside.
    let (w, h) = (128.0, 128.0);
    let verts = [
        vert(10.0, 10.0, 1.0, RED, w, h),
        vert(300.0, 40.0, 1.0, RED, w, h),
        vert(10.0, 90.0, 1.0, RED, w, h),
    ];

    let mut r = renderer(128, 128, TargetFlags::DEPTH, 2);
    r.begin_scene();
    r.clear(ClearFlags::COLOR | ClearFlags::DEPTH, 0);
    r.draw_triangles(&verts, &[0, 1, 2]);
    r.end_scene();
    let s = r.present();

    // Well inside the original triangle and the frustum.
    assert_eq!(s.get_pixel(15, 45), 0xFF0000);
    // Nothing wrapped around or leaked outside.
    assert_eq!(s.get_pixel(120, 120), 0);
    for y in 0..128 {
        assert_eq!(s.get_pixel(127, y), 0, "rightmost column, row {y}");
    }
}

#[test]
fn large_triangle_covers_whole_tiles_correctly() {
    // Spans a 4x4 tile grid, so binning takes the corner-test path and
    // interior tiles go through whole-tile trivial acceptance.
    let tri = [(4.0, 4.0), (250.0, 10.0), (20.0, 250.0)];
    let (w, h) = (256.0, 256.0);
    let verts = [
        vert(tri[0].0, tri[0].1, 1.0, RED, w, h),
        vert(tri[1].0, tri[1].1, 1.0, RED, w, h),
        vert(tri[2].0, tri[2].1, 1.0, RED, w, h),
    ];

    for threads in [1usize, 3] {
        let mut r = renderer(256, 256, TargetFlags::DEPTH, threads);
        r.begin_scene();
        r.clear(ClearFlags::COLOR | ClearFlags::DEPTH, 0);
        r.draw_triangles(&verts, &[0, 1, 2]);
        r.end_scene();
        let s = r.present();

        for y in 0..256 {
            for x in 0..256 {
                let expect = if reference_inside(&tri, x as i32, y as i32) {
                    0xFF0000
                } else {
                    0
                };
                assert_eq!(s.get_pixel(x, y), expect, "pixel ({x},{y}), {threads} threads");
            }
        }
        // At least one interior tile is fully covered, so the trivial-accept
        // path really ran.
        assert!(reference_inside(&tri, 64, 64) && reference_inside(&tri, 127, 127));
    }
}

#[test]
fn wireframe_mode_outlines_without_filling() {
    use raster::FillMode;

    let (w, h) = (128.0, 128.0);
    let verts = [
        vert(16.0, 16.0, 1.0, RED, w, h),
        vert(100.0, 20.0, 1.0, RED, w, h),
        vert(40.0, 100.0, 1.0, RED, w, h),
    ];

    let mut r = renderer(128, 128, TargetFlags::DEPTH, 1);
    r.set_fill_mode(FillMode::Wire);
    r.begin_scene();
    r.clear(ClearFlags::COLOR | ClearFlags::DEPTH, 0);
    r.draw_triangles(&verts, &[0, 1, 2]);
    r.end_scene();
    let s = r.present();

    let white = 0xFFFFFF;
    let mut outlined = 0;
    for y in 0..128 {
        for x in 0..128 {
            if s.get_pixel(x, y) == white {
                outlined += 1;
                // Everything plotted stays inside the triangle's bounds.
                assert!((15..=101).contains(&x) && (15..=101).contains(&y));
            }
        }
    }
    assert!(outlined > 100, "only {outlined} outline pixels");
    // The interior is untouched.
    assert_eq!(s.get_pixel(45, 40), 0);
}
