//! Deferred fragment records and the segmented per-tile queue

/// Fragments per independently allocated segment.
pub(crate) const FRAGMENT_SEGMENT_SIZE: usize = 2048;

/// Ceiling on segments per tile. Capacity never grows past
/// `FRAGMENT_SEGMENT_SIZE * FRAGMENT_MAX_SEGMENTS` records.
pub(crate) const FRAGMENT_MAX_SEGMENTS: usize = 12;

/// Worst-case records a single face can emit on one tile: 16 masked groups
/// per 8x8 block times 64 blocks.
pub(crate) const FRAGMENT_FACE_MAX: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FragmentKind {
    /// The face trivially covers the whole tile; no per-pixel masking.
    Tile,
    /// The face trivially covers one 8x8 block.
    Block,
    /// A 4-pixel group with a partial coverage mask.
    BlockMask,
}

/// One deferred shading work item
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fragment {
    pub kind: FragmentKind,
    /// Thread whose face arena holds `face`.
    pub thread: u8,
    pub face: u32,
    /// Absolute pixel coordinates of the tile, block, or group origin.
    pub x: u16,
    pub y: u16,
    /// Coverage bits for [`FragmentKind::BlockMask`].
    pub mask: u8,
}

impl Fragment {
    pub const EMPTY: Self = Self {
        kind: FragmentKind::Tile,
        thread: 0,
        face: 0,
        x: 0,
        y: 0,
        mask: 0,
    };
}

/// A growable, segmented queue of fragments
///
/// Segments are allocated on demand and never freed or moved mid-frame, so a
/// logical index stays valid for the whole frame. `clear` resets the length
/// without touching the segments; memory is only released when the owning
/// tile is dropped at target teardown.
///
/// Exceeding the segment ceiling is a capacity contract violation: debug
/// builds assert, release builds drop the excess fragments.
pub(crate) struct FragmentBuffer {
    segments: Vec<Box<[Fragment]>>,
    len: usize,
}

impl FragmentBuffer {
    pub fn new() -> Self {
        let mut fb = Self {
            segments: Vec::with_capacity(FRAGMENT_MAX_SEGMENTS),
            len: 0,
        };
        // Initial segment, so the first reserve check has headroom to count.
        fb.segments
            .push(vec![Fragment::EMPTY; FRAGMENT_SEGMENT_SIZE].into_boxed_slice());
        fb
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.segments.len() * FRAGMENT_SEGMENT_SIZE
    }

    /// Grow by one segment when the remaining headroom could not hold the
    /// worst case of one more face. Called between faces, never mid-face, so
    /// `push` stays check-free on the hot path.
    pub fn reserve_face(&mut self) {
        if self.capacity() - self.len < FRAGMENT_FACE_MAX
            && self.segments.len() < FRAGMENT_MAX_SEGMENTS
        {
            self.segments
                .push(vec![Fragment::EMPTY; FRAGMENT_SEGMENT_SIZE].into_boxed_slice());
        }
    }

    #[inline]
    pub fn push(&mut self, frag: Fragment) {
        if self.len == self.capacity() {
            debug_assert!(false, "fragment buffer saturated");
            return;
        }
        self.segments[self.len / FRAGMENT_SEGMENT_SIZE][self.len % FRAGMENT_SEGMENT_SIZE] = frag;
        self.len += 1;
    }

    /// Random access by logical index
    #[inline]
    pub fn get(&self, idx: usize) -> &Fragment {
        &self.segments[idx / FRAGMENT_SEGMENT_SIZE][idx % FRAGMENT_SEGMENT_SIZE]
    }

    /// Logical reset; segments stay allocated
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(face: u32) -> Fragment {
        Fragment {
            kind: FragmentKind::Block,
            thread: 0,
            face,
            x: 0,
            y: 0,
            mask: 0,
        }
    }

    #[test]
    fn grows_by_segments_and_indexes_across_them() {
        let mut fb = FragmentBuffer::new();
        assert_eq!(fb.capacity(), FRAGMENT_SEGMENT_SIZE);

        let total = FRAGMENT_SEGMENT_SIZE + 10;
        for i in 0..total {
            if i % 64 == 0 {
                fb.reserve_face();
            }
            fb.push(frag(i as u32));
        }
        assert_eq!(fb.len(), total);
        assert!(fb.capacity() >= total);
        assert_eq!(fb.get(0).face, 0);
        assert_eq!(fb.get(FRAGMENT_SEGMENT_SIZE).face, FRAGMENT_SEGMENT_SIZE as u32);
        assert_eq!(fb.get(total - 1).face, (total - 1) as u32);
    }

    #[test]
    fn clear_is_logical() {
        let mut fb = FragmentBuffer::new();
        fb.reserve_face();
        fb.push(frag(7));
        let cap = fb.capacity();
        fb.clear();
        assert_eq!(fb.len(), 0);
        assert_eq!(fb.capacity(), cap);
    }

    #[test]
    fn reserve_keeps_face_headroom() {
        let mut fb = FragmentBuffer::new();
        // Fill right up to the reserve threshold and confirm headroom after.
        while fb.capacity() - fb.len() >= FRAGMENT_FACE_MAX {
            fb.push(frag(0));
        }
        fb.reserve_face();
        assert!(fb.capacity() - fb.len() >= FRAGMENT_FACE_MAX);
    }
}
