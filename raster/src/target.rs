//! Render targets: surfaces plus their tile grid and job queue

use crate::error::RasterError;
use crate::tile::{JobQueue, Tile, TILE_SIZE};
use bitflags::bitflags;
use std::sync::Arc;
use surface::Surface;

/// Ceiling on coexisting render targets.
pub const MAX_RENDER_TARGETS: usize = 16;

/// Identifier returned by render-target creation.
pub type TargetId = u32;

bitflags! {
    /// Render-target creation flags
    pub struct TargetFlags: u32 {
        /// Allocate a depth surface alongside the color surface.
        const DEPTH = 0x1;
    }
}

bitflags! {
    /// Buffer selection for `clear`
    pub struct ClearFlags: u32 {
        const DEPTH = 0x1;
        const COLOR = 0x2;
    }
}

/// A color surface, optional depth surface, and the tiling over them
pub(crate) struct RenderTarget {
    pub color: Arc<Surface>,
    pub depth: Option<Arc<Surface>>,

    pub tiles_x: u32,
    pub tiles_y: u32,
    pub tiles: Box<[Tile]>,

    pub jobs: JobQueue,
}

impl RenderTarget {
    pub fn new(
        color: Surface,
        flags: TargetFlags,
        threads: usize,
        face_capacity: usize,
    ) -> Result<Self, RasterError> {
        let (w, h) = (color.width(), color.height());
        if w == 0 || h == 0 {
            return Err(RasterError::NullTarget);
        }

        let tiles_x = w.div_ceil(TILE_SIZE) as u32;
        let tiles_y = h.div_ceil(TILE_SIZE) as u32;

        let mut tiles = Vec::with_capacity((tiles_x * tiles_y) as usize);
        for ty in 0..tiles_y as usize {
            for tx in 0..tiles_x as usize {
                let x = tx * TILE_SIZE;
                let y = ty * TILE_SIZE;
                tiles.push(Tile::new(
                    x as u16,
                    y as u16,
                    TILE_SIZE.min(w - x) as u16,
                    TILE_SIZE.min(h - y) as u16,
                    threads,
                    face_capacity,
                ));
            }
        }

        let depth = if flags.contains(TargetFlags::DEPTH) {
            Some(Arc::new(Surface::new_depth(w, h)))
        } else {
            None
        };

        log::info!(
            "render target {}x{}, {}x{} tiles, depth: {}",
            w,
            h,
            tiles_x,
            tiles_y,
            depth.is_some()
        );

        let jobs = JobQueue::new(tiles.len());
        Ok(Self {
            color: Arc::new(color),
            depth,
            tiles_x,
            tiles_y,
            tiles: tiles.into_boxed_slice(),
            jobs,
        })
    }

    #[inline]
    pub fn tile(&self, idx: usize) -> &Tile {
        &self.tiles[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surface::PixelFormat;

    #[test]
    fn ragged_grid_dimensions() {
        let s = Surface::new(130, 70, PixelFormat::XRGB8888);
        let rt = RenderTarget::new(s, TargetFlags::DEPTH, 1, 8).unwrap();
        assert_eq!((rt.tiles_x, rt.tiles_y), (3, 2));
        // Last column and row keep only the leftover pixels.
        let last = rt.tile((rt.tiles_x * rt.tiles_y - 1) as usize);
        assert_eq!((last.x, last.y), (128, 64));
        assert_eq!((last.width, last.height), (2, 6));
        assert!(rt.depth.is_some());
    }

    #[test]
    fn zero_area_surface_is_rejected() {
        let s = Surface::new(0, 64, PixelFormat::XRGB8888);
        match RenderTarget::new(s, TargetFlags::empty(), 1, 8) {
            Err(RasterError::NullTarget) => {}
            _ => panic!("expected NullTarget"),
        }
    }
}
