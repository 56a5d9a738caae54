//! Error taxonomy of the initialization boundary

use thiserror::Error;

/// Errors reported by renderer and render-target creation.
///
/// Per-frame conditions (culled or degenerate triangles, saturated capacity)
/// are normal control flow and are never surfaced here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RasterError {
    /// The target surface has zero area.
    #[error("render target surface has zero area")]
    NullTarget,

    /// The fixed render-target table is full.
    #[error("maximum number of render targets reached")]
    MaxTargets,
}
