//! Per-thread frame arenas
//!
//! Each worker owns a vertex arena, a face arena, and a small direct-mapped
//! vertex cache. Arenas are filled during the vertex phase by the owning
//! thread only, then read by any thread during rasterization and shading
//! (the phase barrier makes them immutable by that point). Capacities are
//! fixed per batch; overflow drops the triangle (debug builds assert).

use crate::binning::TransformedFace;
use crate::vertex::TransformedVertex;
use core::cell::UnsafeCell;

/// Entries in the direct-mapped vertex cache (power of two).
pub(crate) const VERTEX_CACHE_SIZE: usize = 32;

/// Cache tag meaning "slot empty".
pub(crate) const CACHE_EMPTY: u32 = u32::MAX;

#[derive(Clone, Copy)]
pub(crate) struct VertexCacheEntry {
    pub tag: u32,
    pub vertex: TransformedVertex,
}

impl VertexCacheEntry {
    const EMPTY: Self = Self {
        tag: CACHE_EMPTY,
        vertex: TransformedVertex::EMPTY,
    };
}

pub(crate) struct ThreadArena {
    verts: UnsafeCell<Vec<TransformedVertex>>,
    faces: UnsafeCell<Vec<TransformedFace>>,
    cache: UnsafeCell<[VertexCacheEntry; VERTEX_CACHE_SIZE]>,
}

// Safety: the owning thread is the only writer, and only during the vertex
// phase; cross-thread readers run after the phase barrier, which orders the
// writes before the reads.
unsafe impl Sync for ThreadArena {}

impl ThreadArena {
    pub fn new(vertex_capacity: usize) -> Self {
        Self {
            verts: UnsafeCell::new(Vec::with_capacity(vertex_capacity)),
            faces: UnsafeCell::new(Vec::with_capacity(vertex_capacity / 3)),
            cache: UnsafeCell::new([VertexCacheEntry::EMPTY; VERTEX_CACHE_SIZE]),
        }
    }

    #[inline]
    pub fn face_capacity(&self) -> usize {
        // Safety: capacity is fixed at construction; reading it cannot race.
        unsafe { (*self.faces.get()).capacity() }
    }

    /// Reset the arena cursors for a new batch.
    ///
    /// # Safety
    /// Owning thread only, and no other thread may still hold references
    /// from the previous batch (guaranteed by the idle wait before dispatch).
    #[inline]
    pub unsafe fn reset(&self) {
        unsafe {
            (*self.verts.get()).clear();
            (*self.faces.get()).clear();
        }
    }

    /// # Safety
    /// Owning thread only (or the main thread while the pool is idle).
    #[inline]
    pub unsafe fn clear_cache(&self) {
        let cache = unsafe { &mut *self.cache.get() };
        for entry in cache.iter_mut() {
            entry.tag = CACHE_EMPTY;
        }
    }

    /// # Safety
    /// Owning thread only, vertex phase only.
    #[inline]
    pub unsafe fn cache(&self) -> &mut [VertexCacheEntry; VERTEX_CACHE_SIZE] {
        unsafe { &mut *self.cache.get() }
    }

    /// Append a face and its three (already winding-normalized) vertices.
    /// Returns the face index, or None when the arena is full and the
    /// triangle is dropped.
    ///
    /// # Safety
    /// Owning thread only, vertex phase only.
    pub unsafe fn push_face(
        &self,
        mut face: TransformedFace,
        v0: &TransformedVertex,
        v1: &TransformedVertex,
        v2: &TransformedVertex,
    ) -> Option<u32> {
        let verts = unsafe { &mut *self.verts.get() };
        let faces = unsafe { &mut *self.faces.get() };
        if faces.len() == faces.capacity() || verts.capacity() - verts.len() < 3 {
            debug_assert!(false, "face arena saturated");
            return None;
        }

        face.verts = verts.len() as u32;
        verts.push(*v0);
        verts.push(*v1);
        verts.push(*v2);

        let idx = faces.len() as u32;
        faces.push(face);
        Some(idx)
    }

    /// # Safety
    /// Valid after the vertex phase barrier, or from the owning thread.
    #[inline]
    pub unsafe fn face(&self, idx: u32) -> &TransformedFace {
        unsafe { &(&(*self.faces.get()))[idx as usize] }
    }

    /// # Safety
    /// Valid after the vertex phase barrier, or from the owning thread.
    #[inline]
    pub unsafe fn vertex(&self, idx: u32) -> &TransformedVertex {
        unsafe { &(&(*self.verts.get()))[idx as usize] }
    }
}
