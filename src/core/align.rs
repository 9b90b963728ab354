//! Alignment of land-cover tiles onto a destination grid
//!
//! Two interchangeable strategies implement [`RasterAligner`]:
//! - [`MosaicAligner`]: merge all tiles in their native CRS, then resample
//!   the mosaic onto the destination grid in one pass.
//! - [`AccumulateAligner`]: resample every tile directly onto the destination,
//!   skipping tiles whose footprint misses the destination bounds.
//!
//! Resampling is nearest-neighbour only; class codes are never interpolated.
//! Where two tiles cover the same destination pixel the later tile in
//! selector order wins.

use crate::core::projection::{transform_bounds, transformer_for, PointTransform, Projector, DEFAULT_DENSIFY_POINTS};
use crate::types::{BoundingBox, Crs, DestinationGrid, GeoTransform, LandCoverCode, Raster, SarError, SarResult};
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default destination nodata: outside the non-negative class code domain
pub const DEFAULT_DST_NODATA: LandCoverCode = -1;

/// A land-cover tile loaded into memory with its georeferencing
#[derive(Debug, Clone)]
pub struct SourceTile {
    pub name: String,
    pub data: Array2<LandCoverCode>,
    pub transform: GeoTransform,
    pub crs: Crs,
    pub nodata: Option<LandCoverCode>,
}

impl SourceTile {
    pub fn bounds(&self) -> BoundingBox {
        let (rows, cols) = self.data.dim();
        self.transform.bounds(rows, cols)
    }

    /// Nearest source value at a map coordinate in the tile CRS,
    /// `None` outside the tile or on the tile's nodata
    fn sample(&self, x: f64, y: f64) -> Option<LandCoverCode> {
        let (col, row) = self.transform.map_to_pixel(x, y)?;
        let (rows, cols) = self.data.dim();
        if !(col >= 0.0 && row >= 0.0 && col < cols as f64 && row < rows as f64) {
            return None;
        }
        let value = self.data[[row as usize, col as usize]];
        if self.nodata == Some(value) {
            None
        } else {
            Some(value)
        }
    }
}

/// Source of tiles by path. Implementations must release any underlying
/// handle before `load` returns, on success and on error.
pub trait TileLoader: Sync {
    fn load(&self, path: &Path) -> SarResult<SourceTile>;
}

/// Tiles already held in memory, keyed by path
#[derive(Debug, Default, Clone)]
pub struct InMemoryTiles {
    tiles: HashMap<PathBuf, SourceTile>,
}

impl InMemoryTiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, tile: SourceTile) {
        self.tiles.insert(path.into(), tile);
    }
}

impl TileLoader for InMemoryTiles {
    fn load(&self, path: &Path) -> SarResult<SourceTile> {
        self.tiles.get(path).cloned().ok_or_else(|| {
            SarError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("tile not loaded: {}", path.display()),
            ))
        })
    }
}

/// Which alignment strategy to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignStrategy {
    /// Tiles are merged into one geographic mosaic before resampling
    Mosaic,
    /// Tiles are resampled one by one onto the destination
    #[default]
    Accumulate,
}

/// Alignment parameters shared by both strategies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignParams {
    /// Nodata written where no tile provides a value
    pub dst_nodata: LandCoverCode,
    /// Overrides the tiles' own nodata when set
    pub src_nodata: Option<LandCoverCode>,
    /// Worker threads for per-tile resampling (`None` = all cores)
    pub threads: Option<usize>,
    /// Edge densification used when transforming tile footprints
    pub densify_points: usize,
}

impl Default for AlignParams {
    fn default() -> Self {
        Self {
            dst_nodata: DEFAULT_DST_NODATA,
            src_nodata: None,
            threads: None,
            densify_points: DEFAULT_DENSIFY_POINTS,
        }
    }
}

/// Resamples one or more source tiles onto a destination grid.
///
/// An all-nodata result is not an error here; callers decide how to
/// report it.
pub trait RasterAligner {
    fn align(&self, tiles: &[PathBuf], grid: &DestinationGrid) -> SarResult<Raster<LandCoverCode>>;

    fn name(&self) -> &'static str;
}

/// Build the aligner for `strategy`
pub fn aligner<'a>(
    strategy: AlignStrategy,
    loader: &'a dyn TileLoader,
    projector: &'a dyn Projector,
    params: AlignParams,
) -> Box<dyn RasterAligner + 'a> {
    match strategy {
        AlignStrategy::Mosaic => Box::new(MosaicAligner::new(loader, projector, params)),
        AlignStrategy::Accumulate => Box::new(AccumulateAligner::new(loader, projector, params)),
    }
}

/// Rectangular block of destination pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

impl PixelWindow {
    /// Pixels of `grid` touched by `bbox` (in the grid CRS), padded by one
    /// pixel for reprojection edge effects. `None` if nothing is touched.
    pub fn covering(grid: &DestinationGrid, bbox: &BoundingBox) -> Option<Self> {
        let corners = [
            (bbox.min_x, bbox.min_y),
            (bbox.min_x, bbox.max_y),
            (bbox.max_x, bbox.min_y),
            (bbox.max_x, bbox.max_y),
        ];
        let mut col_min = f64::INFINITY;
        let mut col_max = f64::NEG_INFINITY;
        let mut row_min = f64::INFINITY;
        let mut row_max = f64::NEG_INFINITY;
        for &(x, y) in &corners {
            let (col, row) = grid.transform.map_to_pixel(x, y)?;
            col_min = col_min.min(col);
            col_max = col_max.max(col);
            row_min = row_min.min(row);
            row_max = row_max.max(row);
        }

        let clamp = |v: f64, hi: usize| v.max(0.0).min(hi as f64) as usize;
        let c0 = clamp(col_min.floor() - 1.0, grid.cols);
        let c1 = clamp(col_max.ceil() + 1.0, grid.cols);
        let r0 = clamp(row_min.floor() - 1.0, grid.rows);
        let r1 = clamp(row_max.ceil() + 1.0, grid.rows);

        if c1 <= c0 || r1 <= r0 {
            return None;
        }
        Some(Self { row_off: r0, col_off: c0, rows: r1 - r0, cols: c1 - c0 })
    }

    pub fn full(grid: &DestinationGrid) -> Self {
        Self { row_off: 0, col_off: 0, rows: grid.rows, cols: grid.cols }
    }
}

/// Resampled values of one tile over a destination window.
/// `None` marks pixels the tile does not write.
#[derive(Debug, Clone)]
pub struct TilePatch {
    pub window: PixelWindow,
    pub values: Array2<Option<LandCoverCode>>,
}

impl TilePatch {
    /// Write this patch over `dst`; later patches overwrite earlier ones
    pub fn composite(&self, dst: &mut Array2<LandCoverCode>) -> usize {
        let w = self.window;
        let mut target = dst.slice_mut(s![w.row_off..w.row_off + w.rows, w.col_off..w.col_off + w.cols]);
        let mut written = 0;
        ndarray::Zip::from(&mut target).and(&self.values).for_each(|d, v| {
            if let Some(value) = v {
                *d = *value;
                written += 1;
            }
        });
        written
    }
}

/// Nearest-neighbour resample of `tile` onto `window` of `grid`.
/// `to_source` maps destination CRS coordinates into the tile CRS.
pub fn resample_nearest(
    tile: &SourceTile,
    grid: &DestinationGrid,
    window: PixelWindow,
    to_source: &dyn PointTransform,
) -> SarResult<TilePatch> {
    let mut values = Array2::from_elem((window.rows, window.cols), None);
    let mut xs = vec![0.0; window.cols];
    let mut ys = vec![0.0; window.cols];

    for r in 0..window.rows {
        let row = (window.row_off + r) as f64 + 0.5;
        for c in 0..window.cols {
            let col = (window.col_off + c) as f64 + 0.5;
            let (x, y) = grid.transform.pixel_to_map(col, row);
            xs[c] = x;
            ys[c] = y;
        }
        to_source.transform(&mut xs, &mut ys)?;
        for c in 0..window.cols {
            values[[r, c]] = tile.sample(xs[c], ys[c]);
        }
    }

    Ok(TilePatch { window, values })
}

fn with_nodata_override(mut tile: SourceTile, params: &AlignParams) -> SourceTile {
    if params.src_nodata.is_some() {
        tile.nodata = params.src_nodata;
    }
    tile
}

/// Direct multi-tile accumulation onto the destination grid
pub struct AccumulateAligner<'a> {
    loader: &'a dyn TileLoader,
    projector: &'a dyn Projector,
    params: AlignParams,
}

impl<'a> AccumulateAligner<'a> {
    pub fn new(loader: &'a dyn TileLoader, projector: &'a dyn Projector, params: AlignParams) -> Self {
        Self { loader, projector, params }
    }

    /// Load and resample one tile; `None` when its footprint misses the grid
    fn resample_tile(&self, path: &Path, grid: &DestinationGrid) -> SarResult<Option<TilePatch>> {
        let tile = with_nodata_override(self.loader.load(path)?, &self.params);

        let to_dst = transformer_for(self.projector, &tile.crs, &grid.crs)?;
        let footprint = transform_bounds(to_dst.as_ref(), &tile.bounds(), self.params.densify_points)?;
        if !footprint.intersects(&grid.bounds()) {
            log::debug!("Skipping {}: footprint does not intersect destination", tile.name);
            return Ok(None);
        }
        let window = match PixelWindow::covering(grid, &footprint) {
            Some(w) => w,
            None => {
                log::debug!("Skipping {}: no destination pixels covered", tile.name);
                return Ok(None);
            }
        };

        log::debug!("Resampling {} onto window {:?}", tile.name, window);
        let to_src = transformer_for(self.projector, &grid.crs, &tile.crs)?;
        resample_nearest(&tile, grid, window, to_src.as_ref()).map(Some)
    }

    #[cfg(feature = "parallel")]
    fn resample_tiles(&self, tiles: &[PathBuf], grid: &DestinationGrid) -> SarResult<Vec<Option<TilePatch>>> {
        use rayon::prelude::*;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.params.threads.unwrap_or(0))
            .build()
            .map_err(|e| SarError::Processing(format!("Failed to build thread pool: {}", e)))?;

        // Indexed collect keeps selector order regardless of completion order
        pool.install(|| {
            tiles
                .par_iter()
                .map(|path| self.resample_tile(path, grid))
                .collect()
        })
    }

    #[cfg(not(feature = "parallel"))]
    fn resample_tiles(&self, tiles: &[PathBuf], grid: &DestinationGrid) -> SarResult<Vec<Option<TilePatch>>> {
        tiles.iter().map(|path| self.resample_tile(path, grid)).collect()
    }
}

impl RasterAligner for AccumulateAligner<'_> {
    fn align(&self, tiles: &[PathBuf], grid: &DestinationGrid) -> SarResult<Raster<LandCoverCode>> {
        log::info!("Aligning {} tiles onto {}x{} grid (accumulate)", tiles.len(), grid.rows, grid.cols);

        // Initialized once; no tile ever resets pixels written by an earlier tile
        let mut data = Array2::from_elem(grid.shape(), self.params.dst_nodata);

        let patches = self.resample_tiles(tiles, grid)?;
        let mut used = 0;
        let mut written = 0;
        for patch in patches.iter().flatten() {
            written += patch.composite(&mut data);
            used += 1;
        }

        log::info!("{} of {} tiles intersected the destination, {} pixel writes", used, tiles.len(), written);
        Raster::new(data, grid.clone(), Some(self.params.dst_nodata))
    }

    fn name(&self) -> &'static str {
        "accumulate"
    }
}

/// Mosaic-then-resample alignment
pub struct MosaicAligner<'a> {
    loader: &'a dyn TileLoader,
    projector: &'a dyn Projector,
    params: AlignParams,
}

impl<'a> MosaicAligner<'a> {
    pub fn new(loader: &'a dyn TileLoader, projector: &'a dyn Projector, params: AlignParams) -> Self {
        Self { loader, projector, params }
    }

    /// Merge tiles sharing one north-up CRS into a single tile.
    /// The mosaic uses the first tile's resolution and the union of all
    /// footprints; overlapping pixels take the later tile's value.
    pub fn mosaic(&self, tiles: &[SourceTile]) -> SarResult<SourceTile> {
        let first = tiles
            .first()
            .ok_or_else(|| SarError::Processing("Cannot mosaic an empty tile list".to_string()))?;

        for tile in tiles {
            if tile.crs != first.crs {
                return Err(SarError::GridMismatch(format!(
                    "mosaic tiles must share a CRS: {} uses {}, {} uses {}",
                    first.name, first.crs, tile.name, tile.crs
                )));
            }
            if tile.transform.is_rotated() {
                return Err(SarError::InvalidFormat(format!("Tile {} has a rotated transform", tile.name)));
            }
        }

        let extent = tiles
            .iter()
            .skip(1)
            .fold(first.bounds(), |acc, t| acc.union(&t.bounds()));
        let res_x = first.transform.pixel_width.abs();
        let res_y = first.transform.pixel_height.abs();
        let cols = ((extent.max_x - extent.min_x) / res_x).round() as usize;
        let rows = ((extent.max_y - extent.min_y) / res_y).round() as usize;

        let grid = DestinationGrid::new(
            first.crs.clone(),
            GeoTransform::north_up(extent.min_x, extent.max_y, res_x, -res_y),
            rows,
            cols,
        );
        log::debug!("Mosaic grid {}x{} at {:?}", rows, cols, grid.transform.to_gdal());

        let mut data = Array2::from_elem(grid.shape(), self.params.dst_nodata);
        for tile in tiles {
            if let Some(window) = PixelWindow::covering(&grid, &tile.bounds()) {
                resample_nearest(tile, &grid, window, &crate::core::projection::IdentityTransform)?
                    .composite(&mut data);
            }
        }

        Ok(SourceTile {
            name: format!("mosaic of {} tiles", tiles.len()),
            data,
            transform: grid.transform,
            crs: grid.crs,
            nodata: Some(self.params.dst_nodata),
        })
    }
}

impl RasterAligner for MosaicAligner<'_> {
    fn align(&self, tiles: &[PathBuf], grid: &DestinationGrid) -> SarResult<Raster<LandCoverCode>> {
        log::info!("Aligning {} tiles onto {}x{} grid (mosaic)", tiles.len(), grid.rows, grid.cols);

        let mut data = Array2::from_elem(grid.shape(), self.params.dst_nodata);
        if tiles.is_empty() {
            return Raster::new(data, grid.clone(), Some(self.params.dst_nodata));
        }

        // A failed load drops every tile loaded so far before returning
        let sources = tiles
            .iter()
            .map(|path| self.loader.load(path).map(|t| with_nodata_override(t, &self.params)))
            .collect::<SarResult<Vec<_>>>()?;
        let mosaic = self.mosaic(&sources)?;
        drop(sources);

        let to_src = transformer_for(self.projector, &grid.crs, &mosaic.crs)?;
        let patch = resample_nearest(&mosaic, grid, PixelWindow::full(grid), to_src.as_ref())?;
        let written = patch.composite(&mut data);

        log::info!("Mosaic resampled: {} valid destination pixels", written);
        Raster::new(data, grid.clone(), Some(self.params.dst_nodata))
    }

    fn name(&self) -> &'static str {
        "mosaic"
    }
}
