//! Scene-level land masking
//!
//! Composes tile selection, alignment, classification, cleanup and mask
//! application for one scene, and drives a batch of scenes from a
//! [`PipelineConfig`]. A failing scene is logged and skipped; it never
//! aborts the batch.

use crate::core::align::{aligner, AlignParams, AlignStrategy, TileLoader, DEFAULT_DST_NODATA};
use crate::core::apply::apply_mask_to_channels;
use crate::core::grid::WORLDCOVER_CELL_SIZE;
use crate::core::mask::{build_mask, ClassificationRule};
use crate::core::morphology::{MorphOp, MorphologicalCleaner, StructuringElement};
use crate::core::projection::{transform_bounds, transformer_for, GdalProjector, Projector, DEFAULT_DENSIFY_POINTS};
use crate::io::raster::{read_channel, write_channel, write_mask, GdalTileLoader};
use crate::io::worldcover::{WorldCoverTiles, MAP_SUFFIX};
use crate::types::{
    BoundingBox, Crs, DestinationGrid, GeographicBounds, LandCoverCode, Polarization, Raster, SarError,
    SarReal, SarResult,
};
use chrono::{DateTime, Utc};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Scenes below this many megapixels are "small"
pub const SMALL_SCENE_MPX: f64 = 10.0;

/// Scenes below this many megapixels are "medium"
pub const MEDIUM_SCENE_MPX: f64 = 50.0;

/// Metres per degree of longitude at the equator
const METRES_PER_DEGREE_LON: f64 = 111_320.0;

/// Metres per degree of latitude
const METRES_PER_DEGREE_LAT: f64 = 110_574.0;

/// One radar channel of a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInput {
    pub polarization: Polarization,
    pub path: PathBuf,
}

/// One scene to mask. The first channel defines the destination grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    pub channels: Vec<ChannelInput>,
    /// Output path with `{channel}` and `{bounds}` placeholders,
    /// e.g. `data/output/{channel}_masked_{bounds}.tif`
    pub output_template: String,
}

/// Land masking configuration for a batch of scenes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tile_directory: PathBuf,
    pub cell_size: u32,
    pub tile_suffix: String,
    pub rule: ClassificationRule,
    pub cleanup: Vec<MorphOp>,
    pub element: StructuringElement,
    pub strategy: AlignStrategy,
    pub threads: Option<usize>,
    pub dst_nodata: LandCoverCode,
    /// Overrides the nodata value stored in the tiles. Raw WorldCover
    /// tiles carry no nodata tag, so set this to 0 for them.
    pub src_nodata: Option<LandCoverCode>,
    pub densify_points: usize,
    /// Output template for the cleaned mask (`{bounds}` placeholder)
    pub write_mask: Option<String>,
    pub scenes: Vec<SceneConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tile_directory: PathBuf::from("data/worldcover"),
            cell_size: WORLDCOVER_CELL_SIZE,
            tile_suffix: MAP_SUFFIX.to_string(),
            rule: ClassificationRule::worldcover_land(),
            cleanup: MorphOp::coarse_classification(),
            element: StructuringElement::default(),
            strategy: AlignStrategy::default(),
            threads: None,
            dst_nodata: DEFAULT_DST_NODATA,
            src_nodata: None,
            densify_points: DEFAULT_DENSIFY_POINTS,
            write_mask: None,
            scenes: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> SarResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        log::info!(
            "Loaded pipeline config from {} ({} scenes)",
            path.as_ref().display(),
            config.scenes.len()
        );
        Ok(config)
    }

    pub fn align_params(&self) -> AlignParams {
        AlignParams {
            dst_nodata: self.dst_nodata,
            src_nodata: self.src_nodata,
            threads: self.threads,
            densify_points: self.densify_points,
        }
    }

    pub fn tiles(&self) -> WorldCoverTiles {
        WorldCoverTiles::new(&self.tile_directory)
            .with_cell_size(self.cell_size)
            .with_suffix(&self.tile_suffix)
    }
}

/// Substitute `{channel}` and `{bounds}` in an output template
pub fn expand_template(template: &str, channel: &str, bounds: &GeographicBounds) -> PathBuf {
    PathBuf::from(template.replace("{channel}", channel).replace("{bounds}", &bounds.tag()))
}

/// WGS84 bounds of the finite pixels of `data`.
///
/// The box spans the upper-left corner of the first valid row/column to
/// the lower-right corner of the last, transformed with edge
/// densification.
pub fn valid_region_bounds(
    data: &Array2<SarReal>,
    grid: &DestinationGrid,
    projector: &dyn Projector,
    densify: usize,
) -> SarResult<GeographicBounds> {
    let finite = data.mapv(|v| v.is_finite());
    let row_any: Vec<bool> = finite.axis_iter(Axis(0)).map(|row| row.iter().any(|&v| v)).collect();
    let col_any: Vec<bool> = finite.axis_iter(Axis(1)).map(|col| col.iter().any(|&v| v)).collect();

    let (row_min, row_max) = match (row_any.iter().position(|&v| v), row_any.iter().rposition(|&v| v)) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(SarError::EmptyValidRegion(format!(
                "{} x {} raster has no finite pixels",
                grid.rows, grid.cols
            )))
        }
    };
    let (col_min, col_max) = match (col_any.iter().position(|&v| v), col_any.iter().rposition(|&v| v)) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(SarError::EmptyValidRegion("no finite columns".to_string())),
    };

    let (left, top) = grid.transform.pixel_to_map(col_min as f64, row_min as f64);
    let (right, bottom) = grid.transform.pixel_to_map((col_max + 1) as f64, (row_max + 1) as f64);
    let native = BoundingBox::from_corners(left, top, right, bottom);

    let to_wgs84 = transformer_for(projector, &grid.crs, &Crs::wgs84())?;
    let bbox = transform_bounds(to_wgs84.as_ref(), &native, densify)?;

    GeographicBounds::new(bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y)
}

/// Scene size class by pixel count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneSize {
    Small,
    Medium,
    Large,
}

impl SceneSize {
    pub fn from_megapixels(mpx: f64) -> Self {
        if mpx < SMALL_SCENE_MPX {
            SceneSize::Small
        } else if mpx < MEDIUM_SCENE_MPX {
            SceneSize::Medium
        } else {
            SceneSize::Large
        }
    }

    pub fn expected_runtime(&self) -> &'static str {
        match self {
            SceneSize::Small => "<20s",
            SceneSize::Medium => "<60s",
            SceneSize::Large => "<3min",
        }
    }
}

/// Size and approximate ground resolution of a scene
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneSummary {
    pub megapixels: f64,
    pub size: SceneSize,
    /// Coarser axis resolution in metres, rounded to 10 m
    pub resolution_m: f64,
}

impl SceneSummary {
    pub fn new(grid: &DestinationGrid, bounds: &GeographicBounds, geographic: bool) -> Self {
        let megapixels = grid.len() as f64 / 1_000_000.0;
        let res_x = grid.transform.pixel_width.abs();
        let res_y = grid.transform.pixel_height.abs();

        let resolution = if geographic {
            let lat_center = (bounds.south + bounds.north) / 2.0;
            let res_x_m = res_x * METRES_PER_DEGREE_LON * lat_center.to_radians().cos();
            let res_y_m = res_y * METRES_PER_DEGREE_LAT;
            res_x_m.max(res_y_m)
        } else {
            res_x.max(res_y)
        };

        Self {
            megapixels,
            size: SceneSize::from_megapixels(megapixels),
            resolution_m: (resolution / 10.0).round() * 10.0,
        }
    }
}

/// In-memory result of masking one scene's channels
#[derive(Debug, Clone)]
pub struct MaskedScene {
    pub bounds: GeographicBounds,
    pub summary: SceneSummary,
    pub tiles: Vec<PathBuf>,
    pub mask: Raster<bool>,
    pub land_pixels: usize,
}

/// What was written for one scene
#[derive(Debug, Clone, Serialize)]
pub struct SceneReport {
    pub bounds: GeographicBounds,
    pub summary: SceneSummary,
    pub tiles: Vec<PathBuf>,
    pub land_pixels: usize,
    pub outputs: Vec<PathBuf>,
    pub mask_output: Option<PathBuf>,
    pub processed_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
}

/// Land masking pipeline over a configured tile directory
pub struct LandMaskPipeline {
    config: PipelineConfig,
    projector: Box<dyn Projector>,
    loader: Box<dyn TileLoader>,
}

impl LandMaskPipeline {
    /// Pipeline reading GeoTIFF tiles and projecting with GDAL/PROJ
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_collaborators(config, Box::new(GdalProjector), Box::new(GdalTileLoader))
    }

    pub fn with_collaborators(
        config: PipelineConfig,
        projector: Box<dyn Projector>,
        loader: Box<dyn TileLoader>,
    ) -> Self {
        Self { config, projector, loader }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Cleaned land mask on `grid` from the tiles intersecting `bounds`
    pub fn build_land_mask(&self, grid: &DestinationGrid, bounds: &GeographicBounds) -> SarResult<Raster<bool>> {
        let tiles = self.config.tiles().select(bounds)?;
        self.land_mask_from_tiles(&tiles, grid)
    }

    fn land_mask_from_tiles(&self, tiles: &[PathBuf], grid: &DestinationGrid) -> SarResult<Raster<bool>> {
        let aligner = aligner(
            self.config.strategy,
            self.loader.as_ref(),
            self.projector.as_ref(),
            self.config.align_params(),
        );
        let aligned = aligner.align(tiles, grid)?;

        if aligned.valid_count() == 0 {
            return Err(SarError::AllNodata { pixels: aligned.data.len() });
        }

        let mask = build_mask(&aligned, &self.config.rule);
        let cleaner = MorphologicalCleaner::new(self.config.cleanup.clone()).with_element(self.config.element);
        Ok(cleaner.clean(&mask))
    }

    /// Mask land in co-registered channels in place. The first channel's
    /// grid is the destination grid and its finite pixels define the AOI.
    pub fn mask_channels(&self, channels: &mut [Raster<SarReal>]) -> SarResult<MaskedScene> {
        let first = channels
            .first()
            .ok_or_else(|| SarError::InvalidFormat("scene has no channels".to_string()))?;
        let grid = first.grid.clone();
        for (i, channel) in channels.iter().enumerate().skip(1) {
            grid.ensure_matches(&channel.grid, &format!("channel {} vs channel 0", i))?;
        }

        let bounds = valid_region_bounds(&first.data, &grid, self.projector.as_ref(), self.config.densify_points)?;
        let geographic = self.projector.is_geographic(&grid.crs)?;
        let summary = SceneSummary::new(&grid, &bounds, geographic);
        log::info!("AOI (WGS84): {}", bounds);
        log::info!(
            "Scene {} x {} ({:.1} MPx, {:?}), resolution ~{:.0}m; expect {} runtime",
            grid.rows,
            grid.cols,
            summary.megapixels,
            summary.size,
            summary.resolution_m,
            summary.size.expected_runtime()
        );

        let tiles = self.config.tiles().select(&bounds)?;
        let mask = self.land_mask_from_tiles(&tiles, &grid)?;
        let land_pixels = apply_mask_to_channels(&mask, channels)?;

        Ok(MaskedScene { bounds, summary, tiles, mask, land_pixels })
    }

    /// Read, mask and write one scene
    pub fn process_scene(&self, scene: &SceneConfig) -> SarResult<SceneReport> {
        let start = Instant::now();

        let mut channels = scene
            .channels
            .iter()
            .map(|input| read_channel(&input.path))
            .collect::<SarResult<Vec<_>>>()?;

        let masked = self.mask_channels(&mut channels)?;

        let mut outputs = Vec::with_capacity(channels.len());
        for (input, raster) in scene.channels.iter().zip(&channels) {
            let path = expand_template(&scene.output_template, input.polarization.tag(), &masked.bounds);
            write_channel(&path, raster)?;
            outputs.push(path);
        }

        let mask_output = match &self.config.write_mask {
            Some(template) => {
                let path = expand_template(template, "mask", &masked.bounds);
                write_mask(&path, &masked.mask)?;
                Some(path)
            }
            None => None,
        };

        let elapsed = start.elapsed().as_secs_f64();
        log::info!("Scene complete in {:.2}s ({} outputs)", elapsed, outputs.len());

        Ok(SceneReport {
            bounds: masked.bounds,
            summary: masked.summary,
            tiles: masked.tiles,
            land_pixels: masked.land_pixels,
            outputs,
            mask_output,
            processed_at: Utc::now(),
            elapsed_seconds: elapsed,
        })
    }

    /// Process every configured scene. Failures are logged and reported per
    /// scene; the remaining scenes still run.
    pub fn run_batch(&self) -> Vec<SarResult<SceneReport>> {
        let total = self.config.scenes.len();
        let mut results = Vec::with_capacity(total);

        for (idx, scene) in self.config.scenes.iter().enumerate() {
            log::info!("Processing scene {}/{}...", idx + 1, total);
            let result = self.process_scene(scene);
            if let Err(e) = &result {
                log::warn!("Skipping scene {}/{}: {}", idx + 1, total, e);
            }
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        log::info!("Batch finished: {} of {} scenes masked", succeeded, total);
        results
    }
}
