//! Shared render core and the three per-batch pipeline phases
//!
//! One [`RenderCore`] is shared by the main thread and every worker. Interior
//! mutability follows the phase discipline: the context, targets, and batch
//! descriptor are written only while the pool is idle; per-thread arenas are
//! written only by their owner during the vertex phase; tiles are claimed
//! exclusively through the atomic job cursors.

use crate::arena::{ThreadArena, VERTEX_CACHE_SIZE};
use crate::binning::{self, FP_SHIFT};
use crate::clip::{self, CLIP_SLOTS};
use crate::context::{FillMode, RenderContext};
use crate::fragment::{Fragment, FragmentKind};
use crate::rasterizer;
use crate::shade;
use crate::target::RenderTarget;
use crate::threads::{FrameSync, STATE_RASTER, STATE_VERTEX};
use crate::vertex::{TransformedVertex, Vertex};
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Index ceiling of one dispatch cycle; larger draw calls are split.
pub(crate) const MAX_BATCH_INDICES: usize = 18_000;

/// Clipping can fan one triangle into several; arenas are sized for this
/// worst-practical amplification of the batch cap.
pub(crate) const CLIP_AMPLIFY: usize = 5;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Partition {
    pub start: usize,
    pub end: usize,
}

/// The in-flight draw batch, shared with workers as raw parts
///
/// The slices behind these pointers are owned by the caller of
/// `draw_triangles`, which does not return until the pool is idle again.
pub(crate) struct Batch {
    vertices: *const Vertex,
    num_vertices: usize,
    indices: *const u32,
    num_indices: usize,
}

impl Batch {
    fn empty() -> Self {
        Self {
            vertices: core::ptr::NonNull::<Vertex>::dangling().as_ptr(),
            num_vertices: 0,
            indices: core::ptr::NonNull::<u32>::dangling().as_ptr(),
            num_indices: 0,
        }
    }

    /// # Safety
    /// Valid only between dispatch and the end of the batch.
    #[inline]
    unsafe fn slices<'a>(&self) -> (&'a [Vertex], &'a [u32]) {
        unsafe {
            (
                core::slice::from_raw_parts(self.vertices, self.num_vertices),
                core::slice::from_raw_parts(self.indices, self.num_indices),
            )
        }
    }
}

pub(crate) struct RenderCore {
    ctx: UnsafeCell<RenderContext>,
    targets: UnsafeCell<Vec<RenderTarget>>,
    current: AtomicUsize,

    arenas: Box<[ThreadArena]>,
    batch: UnsafeCell<Batch>,
    partitions: UnsafeCell<Box<[Partition]>>,

    pub sync: FrameSync,
    pub num_threads: usize,
}

// Safety: every UnsafeCell field is governed by the phase discipline in the
// module docs; the remaining fields are atomics or immutable after init.
unsafe impl Send for RenderCore {}
unsafe impl Sync for RenderCore {}

impl RenderCore {
    pub fn new(num_threads: usize) -> Self {
        let vertex_capacity = MAX_BATCH_INDICES * CLIP_AMPLIFY / num_threads;
        Self {
            ctx: UnsafeCell::new(RenderContext::new()),
            targets: UnsafeCell::new(Vec::new()),
            current: AtomicUsize::new(0),
            arenas: (0..num_threads)
                .map(|_| ThreadArena::new(vertex_capacity))
                .collect(),
            batch: UnsafeCell::new(Batch::empty()),
            partitions: UnsafeCell::new(
                vec![Partition { start: 0, end: 0 }; num_threads].into_boxed_slice(),
            ),
            sync: FrameSync::new(),
            num_threads,
        }
    }

    /// # Safety
    /// The context is mutated only while the pool is idle; readers must be
    /// inside a batch (where it is frozen) or on the main thread.
    #[inline]
    pub unsafe fn ctx(&self) -> &RenderContext {
        unsafe { &*self.ctx.get() }
    }

    /// # Safety
    /// Main thread only, and only after a full idle wait.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn ctx_mut(&self) -> &mut RenderContext {
        unsafe { &mut *self.ctx.get() }
    }

    /// The active render target.
    ///
    /// Targets are created and switched only while the pool is idle, so the
    /// reference stays valid for the duration of a batch.
    #[inline]
    pub fn target(&self) -> &RenderTarget {
        // Safety: see above.
        unsafe { &(&(*self.targets.get()))[self.current.load(Ordering::Acquire)] }
    }

    /// # Safety
    /// Main thread only, while the pool is idle.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn targets_mut(&self) -> &mut Vec<RenderTarget> {
        unsafe { &mut *self.targets.get() }
    }

    #[inline]
    pub fn num_targets(&self) -> usize {
        // Safety: the Vec is only mutated while idle.
        unsafe { (*self.targets.get()).len() }
    }

    /// Read access to an arbitrary target.
    #[inline]
    pub fn target_at(&self, id: usize) -> Option<&RenderTarget> {
        // Safety: the Vec is only mutated while idle.
        unsafe { (&(*self.targets.get())).get(id) }
    }

    #[inline]
    pub fn set_current_target(&self, id: usize) {
        self.current.store(id, Ordering::Release);
    }

    #[inline]
    pub fn arena(&self, tid: usize) -> &ThreadArena {
        &self.arenas[tid]
    }

    pub fn face_capacity(&self) -> usize {
        self.arenas[0].face_capacity()
    }

    /// Clear every thread's vertex cache (main thread, pool idle).
    pub fn clear_vertex_caches(&self) {
        for arena in self.arenas.iter() {
            // Safety: pool is idle, the main thread is the only accessor.
            unsafe { arena.clear_cache() };
        }
    }

    // ---- dispatch ------------------------------------------------------

    /// Run one batch through the full pipeline, parallel when worthwhile.
    pub fn draw_batch(&self, vertices: &[Vertex], indices: &[u32]) {
        self.sync.wait_idle();

        // Safety: pool idle, single writer.
        unsafe {
            *self.batch.get() = Batch {
                vertices: vertices.as_ptr(),
                num_vertices: vertices.len(),
                indices: indices.as_ptr(),
                num_indices: indices.len(),
            };
        }
        self.sync.reset_jobs();

        if self.num_threads > 1 && indices.len() / (3 * self.num_threads) > 0 {
            self.dispatch_parallel(indices.len());
        } else {
            self.dispatch_serial(indices.len());
        }
    }

    /// Split the index range evenly by triangle count, leftovers going one
    /// triangle apiece to the earliest threads.
    fn partition(&self, num_indices: usize) {
        // Safety: pool idle at dispatch time.
        let parts = unsafe { &mut *self.partitions.get() };
        let n = self.num_threads;
        let per = (num_indices / (3 * n)) * 3;
        let mut extra = (num_indices % (3 * n)) / 3;

        let mut start = 0;
        for p in parts.iter_mut() {
            let mut end = start + per;
            if extra > 0 {
                end += 3;
                extra -= 1;
            }
            *p = Partition { start, end };
            start = end;
        }
    }

    /// Single-thread degenerate path: all three phases inline, no
    /// synchronization.
    fn dispatch_serial(&self, num_indices: usize) {
        // Safety: pool idle at dispatch time.
        let parts = unsafe { &mut *self.partitions.get() };
        parts[0] = Partition {
            start: 0,
            end: num_indices,
        };

        // Safety: thread 0's own arena.
        unsafe { self.arena(0).reset() };
        self.process_vertices(0);
        self.process_tiles(0);
        self.process_fragments(0);
    }

    fn dispatch_parallel(&self, num_indices: usize) {
        self.partition(num_indices);

        self.sync.working.store(self.num_threads as u32, Ordering::Release);
        {
            let _guard = self.sync.wake_guard();
            self.sync.state.store(STATE_VERTEX, Ordering::Release);
            self.sync.wake_cond.notify_all();
        }

        // The dispatching thread doubles as worker 0.
        // Safety: thread 0's own arena.
        unsafe { self.arena(0).reset() };
        self.process_vertices(0);
        self.vertex_barrier();
        self.process_tiles(0);
        self.process_fragments(0);

        self.sync.working.fetch_sub(1, Ordering::AcqRel);
    }

    /// Double-checked barrier between the vertex and raster phases. The last
    /// thread re-arms the working counter and flips the state; the rest
    /// spin, since the wait is sub-millisecond and they are already hot.
    pub(crate) fn vertex_barrier(&self) {
        if self.sync.working.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.sync
                .working
                .store(self.num_threads as u32, Ordering::Release);
            self.sync.state.store(STATE_RASTER, Ordering::Release);
        } else {
            while self.sync.state.load(Ordering::Acquire) == STATE_VERTEX {
                core::hint::spin_loop();
            }
        }
    }

    // ---- phases --------------------------------------------------------

    /// Vertex phase: transform, clip, and bin this thread's partition.
    pub(crate) fn process_vertices(&self, tid: usize) {
        // Safety: context and batch are frozen for the whole dispatch.
        let ctx = unsafe { self.ctx() };
        let Some(shader) = ctx.shader.as_deref() else {
            return;
        };
        let batch = unsafe { &*self.batch.get() };
        let (vertices, indices) = unsafe { batch.slices() };
        let part = unsafe { (*self.partitions.get())[tid] };

        let target = self.target();
        let width = target.color.width() as f32;
        let height = target.color.height() as f32;

        let mut scratch = [TransformedVertex::EMPTY; CLIP_SLOTS];
        let mut i = part.start;
        while i + 3 <= part.end {
            for k in 0..3 {
                let idx = indices[i + k];
                let out = &mut scratch[k];

                // Safety: tid owns this cache during the vertex phase.
                let cache = unsafe { self.arena(tid).cache() };
                let entry = &mut cache[idx as usize & (VERTEX_CACHE_SIZE - 1)];
                if entry.tag == idx {
                    *out = entry.vertex;
                } else {
                    entry.tag = idx;
                    shader.transform_vertex(&ctx.globals, &vertices[idx as usize], out);
                    entry.vertex = *out;
                }
            }

            let list = clip::clip_triangle(&mut scratch, ctx.num_varyings);
            if list.len >= 3 {
                for k in 0..list.len {
                    clip::to_screen(&mut scratch[list.idx[k] as usize], width, height);
                }
                // Fan around the first surviving vertex.
                let i0 = list.idx[0] as usize;
                for k in 2..list.len {
                    binning::insert_triangle(
                        self,
                        tid,
                        &scratch[i0],
                        &scratch[list.idx[k - 1] as usize],
                        &scratch[list.idx[k] as usize],
                    );
                }
            }

            i += 3;
        }
    }

    /// Raster phase: claim dirty tiles and turn their bins into fragments.
    pub(crate) fn process_tiles(&self, _tid: usize) {
        // Safety: context is frozen for the whole dispatch.
        let ctx = unsafe { self.ctx() };
        let target = self.target();

        loop {
            let slot = self.sync.jobs_rt.fetch_add(1, Ordering::AcqRel);
            if slot >= self.sync.jobs_end.load(Ordering::Acquire) {
                break;
            }
            // Safety: enqueues finished at the vertex barrier.
            let tile_idx = unsafe { target.jobs.get(slot as usize) } as usize;
            let tile = target.tile(tile_idx);

            match ctx.fill_mode {
                FillMode::Solid => {
                    // Tile rectangle in fixed point; width and height address
                    // the last pixel like the face bounding box does.
                    let tx = (tile.x as i32) << FP_SHIFT;
                    let ty = (tile.y as i32) << FP_SHIFT;
                    let tw = (tile.width as i32 - 1) << FP_SHIFT;
                    let th = (tile.height as i32 - 1) << FP_SHIFT;

                    // Safety: this thread holds the raster claim on the tile.
                    let fb = unsafe { tile.frags() };
                    fb.clear();

                    for t in 0..self.num_threads {
                        let faces = unsafe { tile.faces_mut(t) };
                        let accept = unsafe { tile.accept(t) };
                        for &face_idx in faces.iter() {
                            fb.reserve_face();
                            if accept[face_idx as usize] != 0 {
                                // Whole tile trivially covered at bin time.
                                fb.push(Fragment {
                                    kind: FragmentKind::Tile,
                                    thread: t as u8,
                                    face: face_idx,
                                    x: tile.x,
                                    y: tile.y,
                                    mask: 0,
                                });
                            } else {
                                // Safety: arenas are immutable after the
                                // vertex barrier.
                                let face = unsafe { self.arena(t).face(face_idx) };
                                rasterizer::rasterize_solid(
                                    face, t as u8, face_idx, fb, tx, ty, tw, th,
                                );
                            }
                        }
                        faces.clear();
                    }
                }
                FillMode::Wire => {
                    let clip_rect = (
                        tile.x as i32,
                        tile.y as i32,
                        tile.x as i32 + tile.width as i32 - 1,
                        tile.y as i32 + tile.height as i32 - 1,
                    );
                    let color = target.color.format().pack(255, 255, 255);

                    for t in 0..self.num_threads {
                        let faces = unsafe { tile.faces_mut(t) };
                        for &face_idx in faces.iter() {
                            let face = unsafe { self.arena(t).face(face_idx) };
                            let mut pts = [(0.0f32, 0.0f32); 3];
                            for (k, p) in pts.iter_mut().enumerate() {
                                let v = unsafe { self.arena(t).vertex(face.verts + k as u32) };
                                *p = (v.position.x, v.position.y);
                            }
                            rasterizer::draw_wire_face(&target.color, clip_rect, pts, color);
                        }
                        faces.clear();
                    }
                    unsafe { tile.frags() }.clear();
                }
            }

            tile.dirty.store(0, Ordering::Release);
        }
    }

    /// Shading phase: claim tiles on an independent cursor and drain their
    /// fragment queues into the surfaces.
    pub(crate) fn process_fragments(&self, _tid: usize) {
        let target = self.target();

        loop {
            let slot = self.sync.jobs_ft.fetch_add(1, Ordering::AcqRel);
            if slot >= self.sync.jobs_end.load(Ordering::Acquire) {
                break;
            }
            let tile_idx = unsafe { target.jobs.get(slot as usize) } as usize;
            let tile = target.tile(tile_idx);

            // Another thread may still be rasterizing this tile.
            while tile.dirty.load(Ordering::Acquire) != 0 {
                core::hint::spin_loop();
            }

            // Safety: dirty == 0 means rasterization released the tile; the
            // job cursor makes this thread its only shader.
            let fb = unsafe { tile.frags() };
            shade::render_fragments(self, target, fb);
        }
    }
}
