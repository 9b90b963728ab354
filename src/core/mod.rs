//! Core land masking modules

pub mod grid;
pub mod projection;
pub mod align;
pub mod mask;
pub mod morphology;
pub mod apply;
pub mod pipeline;

// Re-export main types
pub use grid::{cells_intersecting, snap_to_grid, GridCell};
pub use projection::{transform_bounds, GdalProjector, PointTransform, Projector};
pub use align::{aligner, AlignParams, AlignStrategy, RasterAligner, SourceTile, TileLoader};
pub use mask::{build_mask, ClassificationRule};
pub use morphology::{MorphOp, MorphologicalCleaner, StructuringElement};
pub use apply::{apply_mask, apply_mask_in_place, apply_mask_to_channels};
pub use pipeline::{ChannelInput, LandMaskPipeline, PipelineConfig, SceneConfig, SceneReport};
