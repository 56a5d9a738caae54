//! Screen tiles, per-thread bins, and the per-target job queue

use crate::fragment::FragmentBuffer;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, Ordering};

/// Tile edge in pixels (64x64 keeps a tile's working set in L1).
pub const TILE_SIZE: usize = 64;
pub const TILE_SHIFT: u32 = 6;

/// One thread's bin on one tile
///
/// `faces` holds indices into the owning thread's face arena; `accept` holds
/// one byte per face-arena slot, nonzero when the face trivially covers the
/// whole tile. Both are written only by the owning thread during the vertex
/// phase and read during the raster phase, after the phase barrier.
struct TileBin {
    faces: UnsafeCell<Vec<u32>>,
    accept: UnsafeCell<Box<[u8]>>,
}

impl TileBin {
    fn new(face_capacity: usize) -> Self {
        Self {
            faces: UnsafeCell::new(Vec::with_capacity(face_capacity)),
            accept: UnsafeCell::new(vec![0u8; face_capacity].into_boxed_slice()),
        }
    }
}

/// A fixed screen-space rectangle of the render target
pub(crate) struct Tile {
    pub x: u16,
    pub y: u16,
    /// Actual extent; the last row and column of the grid may be ragged.
    pub width: u16,
    pub height: u16,

    /// Registration count this frame. Driven up during binning, stored back
    /// to zero exactly once when the tile finishes rasterizing.
    pub dirty: AtomicU32,

    bins: Box<[TileBin]>,
    frags: UnsafeCell<FragmentBuffer>,
}

// Safety: bins are single-writer per owning thread during the vertex phase;
// the raster and shading phases gain exclusive access to a tile through the
// atomic job cursors and the dirty handshake. The phase barrier between
// vertex and raster provides the happens-before edge for cross-thread reads.
unsafe impl Sync for Tile {}

impl Tile {
    pub fn new(x: u16, y: u16, width: u16, height: u16, threads: usize, face_capacity: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
            dirty: AtomicU32::new(0),
            bins: (0..threads).map(|_| TileBin::new(face_capacity)).collect(),
            frags: UnsafeCell::new(FragmentBuffer::new()),
        }
    }

    /// Register a face in `thread`'s bin. Returns true when this registration
    /// took the dirty count from 0 to 1, in which case the caller must
    /// enqueue the tile. A full bin drops the face (capacity contract, same
    /// policy as the arenas) and leaves dirty untouched.
    #[inline]
    pub fn push_face(&self, thread: usize, face: u32, trivial: bool) -> bool {
        // Safety: only the owning thread writes its bin during the vertex
        // phase.
        let faces = unsafe { &mut *self.bins[thread].faces.get() };
        if faces.len() == faces.capacity() {
            debug_assert!(false, "tile bin saturated");
            return false;
        }
        faces.push(face);
        let accept = unsafe { &mut *self.bins[thread].accept.get() };
        accept[face as usize] = trivial as u8;
        self.dirty.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// # Safety
    /// Caller must hold the raster-phase claim on this tile.
    #[inline]
    pub unsafe fn faces_mut(&self, thread: usize) -> &mut Vec<u32> {
        unsafe { &mut *self.bins[thread].faces.get() }
    }

    /// # Safety
    /// Caller must hold the raster-phase claim on this tile.
    #[inline]
    pub unsafe fn accept(&self, thread: usize) -> &[u8] {
        unsafe { &*self.bins[thread].accept.get() }
    }

    /// # Safety
    /// Caller must hold the raster-phase claim or have observed dirty == 0
    /// after claiming the tile for shading.
    #[inline]
    pub unsafe fn frags(&self) -> &mut FragmentBuffer {
        unsafe { &mut *self.frags.get() }
    }
}

/// Per-target list of dirty tile indices, one slot per tile
///
/// Slots are written through unique indices handed out by an atomic cursor
/// during binning and read back during the raster and shading phases, which
/// start only after the phase barrier.
pub(crate) struct JobQueue {
    slots: UnsafeCell<Box<[u32]>>,
}

unsafe impl Sync for JobQueue {}

impl JobQueue {
    pub fn new(tiles: usize) -> Self {
        Self {
            slots: UnsafeCell::new(vec![0u32; tiles].into_boxed_slice()),
        }
    }

    /// # Safety
    /// `idx` must be unique per frame (from the enqueue cursor).
    #[inline]
    pub unsafe fn set(&self, idx: usize, tile: u32) {
        let slots = unsafe { &mut *self.slots.get() };
        debug_assert!(idx < slots.len(), "job queue overflow");
        if idx < slots.len() {
            slots[idx] = tile;
        }
    }

    /// # Safety
    /// Caller must run after the vertex phase barrier.
    #[inline]
    pub unsafe fn get(&self, idx: usize) -> u32 {
        unsafe { (*self.slots.get())[idx] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::Ordering;

    #[test]
    fn first_registration_reports_enqueue() {
        let tile = Tile::new(0, 0, 64, 64, 2, 16);
        assert!(tile.push_face(0, 3, false));
        assert!(!tile.push_face(1, 5, true));
        assert_eq!(tile.dirty.load(Ordering::Acquire), 2);
        unsafe {
            assert_eq!(tile.faces_mut(0).as_slice(), &[3]);
            assert_eq!(tile.accept(1)[5], 1);
            assert_eq!(tile.accept(0)[3], 0);
        }
    }
}
