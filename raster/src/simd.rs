//! 4-wide lane types for the fragment pipeline
//!
//! [`Float4`] is four packed floats (one per pixel of a shading group) and
//! [`CoverageMask`] is the matching 4-bit lane mask. The masked select
//! operations encode the read-modify-write stores of the shading loop: a lane
//! whose mask bit is clear keeps the value already in the buffer.

use core::ops::{Add, BitAnd, Mul, Sub};
use glam::{BVec4A, Vec4};

/// Four packed f32 lanes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Float4(pub(crate) Vec4);

impl Float4 {
    pub const ZERO: Self = Self(Vec4::ZERO);

    /// Lane offsets 0, 1, 2, 3 of a pixel group
    pub const STEP: Self = Self(Vec4::new(0.0, 1.0, 2.0, 3.0));

    #[inline]
    pub fn splat(v: f32) -> Self {
        Self(Vec4::splat(v))
    }

    #[inline]
    pub fn new(a: f32, b: f32, c: f32, d: f32) -> Self {
        Self(Vec4::new(a, b, c, d))
    }

    #[inline]
    pub fn from_array(a: [f32; 4]) -> Self {
        Self(Vec4::from_array(a))
    }

    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        self.0.to_array()
    }

    /// Lane-wise reciprocal (perspective divide)
    #[inline]
    pub fn recip(self) -> Self {
        Self(self.0.recip())
    }

    #[inline]
    pub fn min(self, rhs: Self) -> Self {
        Self(self.0.min(rhs.0))
    }

    #[inline]
    pub fn max(self, rhs: Self) -> Self {
        Self(self.0.max(rhs.0))
    }

    /// Lane mask of `self >= rhs`
    #[inline]
    pub fn ge(self, rhs: Self) -> CoverageMask {
        CoverageMask(self.0.cmpge(rhs.0).bitmask() & 0xF)
    }
}

impl Add for Float4 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Float4 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Mul for Float4 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self(self.0 * rhs.0)
    }
}

impl Mul<f32> for Float4 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: f32) -> Self {
        Self(self.0 * rhs)
    }
}

/// Four packed i32 lanes for incremental edge-function evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Int4(pub [i32; 4]);

impl Int4 {
    #[inline]
    pub fn splat(v: i32) -> Self {
        Self([v; 4])
    }

    #[inline]
    pub fn new(a: i32, b: i32, c: i32, d: i32) -> Self {
        Self([a, b, c, d])
    }

    /// Lane mask of `self > 0` (half-space inside test)
    #[inline]
    pub fn gt_zero(self) -> CoverageMask {
        let m = ((self.0[0] > 0) as u32)
            | (((self.0[1] > 0) as u32) << 1)
            | (((self.0[2] > 0) as u32) << 2)
            | (((self.0[3] > 0) as u32) << 3);
        CoverageMask(m)
    }
}

impl Sub for Int4 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self([
            self.0[0] - rhs.0[0],
            self.0[1] - rhs.0[1],
            self.0[2] - rhs.0[2],
            self.0[3] - rhs.0[3],
        ])
    }
}

/// A 4-bit lane mask, bit i covering pixel x + i of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageMask(pub u32);

impl CoverageMask {
    pub const NONE: Self = Self(0);
    pub const FULL: Self = Self(0xF);

    #[inline]
    pub fn from_bits(bits: u32) -> Self {
        Self(bits & 0xF)
    }

    #[inline]
    pub fn any(self) -> bool {
        self.0 != 0
    }

    #[inline]
    pub fn test(self, lane: usize) -> bool {
        self.0 & (1 << lane) != 0
    }

    #[inline]
    fn to_bvec(self) -> BVec4A {
        BVec4A::new(self.test(0), self.test(1), self.test(2), self.test(3))
    }

    /// Per-lane `mask ? a : b` over packed floats
    #[inline]
    pub fn select(self, a: Float4, b: Float4) -> Float4 {
        Float4(Vec4::select(self.to_bvec(), a.0, b.0))
    }

    /// Per-lane `mask ? a : b` over pixel words
    #[inline]
    pub fn select_words(self, a: [u32; 4], b: [u32; 4]) -> [u32; 4] {
        [
            if self.test(0) { a[0] } else { b[0] },
            if self.test(1) { a[1] } else { b[1] },
            if self.test(2) { a[2] } else { b[2] },
            if self.test(3) { a[3] } else { b[3] },
        ]
    }
}

impl BitAnd for CoverageMask {
    type Output = Self;
    #[inline]
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ge_produces_lane_bits() {
        let a = Float4::new(1.0, 0.0, 2.0, -1.0);
        let b = Float4::splat(0.5);
        assert_eq!(a.ge(b), CoverageMask(0b0101));
    }

    #[test]
    fn masked_select_merges_lanes() {
        let m = CoverageMask(0b1010);
        let a = Float4::splat(1.0);
        let b = Float4::splat(2.0);
        assert_eq!(m.select(a, b).to_array(), [2.0, 1.0, 2.0, 1.0]);
        assert_eq!(
            m.select_words([9, 9, 9, 9], [3, 3, 3, 3]),
            [3, 9, 3, 9]
        );
    }

    #[test]
    fn int_lanes_track_edge_steps() {
        // Edge value cy stepped by -fdy per lane, as the scanline loop does.
        let cy = 10;
        let fdy = 4;
        let e = Int4::splat(cy) - Int4::new(0, fdy, 2 * fdy, 3 * fdy);
        assert_eq!(e, Int4::new(10, 6, 2, -2));
        assert_eq!(e.gt_zero(), CoverageMask(0b0111));
    }
}
