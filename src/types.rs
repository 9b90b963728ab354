use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Real-valued intensity or amplitude data
pub type SarReal = f32;

/// Land-cover class code after alignment. Signed so that a negative
/// nodata sentinel never collides with a valid (non-negative) code.
pub type LandCoverCode = i16;

/// Polarization channels for Sentinel-1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl Polarization {
    /// Lowercase tag used in output file names (`hh_masked_...`)
    pub fn tag(&self) -> &'static str {
        match self {
            Polarization::VV => "vv",
            Polarization::VH => "vh",
            Polarization::HV => "hv",
            Polarization::HH => "hh",
        }
    }
}

impl fmt::Display for Polarization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarization::VV => write!(f, "VV"),
            Polarization::VH => write!(f, "VH"),
            Polarization::HV => write!(f, "HV"),
            Polarization::HH => write!(f, "HH"),
        }
    }
}

/// Geographic bounding box in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeographicBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeographicBounds {
    /// Create bounds, rejecting non-finite or inverted extents
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> SarResult<Self> {
        let finite = [west, south, east, north].iter().all(|v| v.is_finite());
        if !finite || west >= east || south >= north {
            return Err(SarError::InvalidFormat(format!(
                "Invalid geographic bounds: W={} S={} E={} N={}",
                west, south, east, north
            )));
        }
        Ok(Self { west, south, east, north })
    }

    /// Half-open overlap test: touching edges do not intersect
    pub fn intersects(&self, other: &GeographicBounds) -> bool {
        !(self.east <= other.west
            || self.west >= other.east
            || self.north <= other.south
            || self.south >= other.north)
    }

    /// Overlapping region, `None` when the boxes do not overlap
    pub fn intersection(&self, other: &GeographicBounds) -> Option<GeographicBounds> {
        if !self.intersects(other) {
            return None;
        }
        Some(GeographicBounds {
            west: self.west.max(other.west),
            south: self.south.max(other.south),
            east: self.east.min(other.east),
            north: self.north.min(other.north),
        })
    }

    /// Compact tag for output file names, e.g. `W10.50_S-3.00_E12.25_N1.75`
    pub fn tag(&self) -> String {
        format!(
            "W{:.2}_S{:.2}_E{:.2}_N{:.2}",
            self.west, self.south, self.east, self.north
        )
    }
}

impl fmt::Display for GeographicBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "W={:.2}, S={:.2}, E={:.2}, N={:.2}",
            self.west, self.south, self.east, self.north
        )
    }
}

/// Axis-aligned box in the map units of some CRS
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Smallest box containing both corner points
    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
        }
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.max_x <= other.min_x
            || self.min_x >= other.max_x
            || self.max_y <= other.min_y
            || self.min_y >= other.max_y)
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

/// Geospatial transformation parameters (GDAL affine convention)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform without rotation terms
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            top_left_x,
            pixel_width,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height,
        }
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    pub fn is_rotated(&self) -> bool {
        self.rotation_x != 0.0 || self.rotation_y != 0.0
    }

    /// Map coordinates of a fractional pixel position (col, row).
    /// Integer positions address the upper-left pixel corner.
    pub fn pixel_to_map(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.top_left_x + col * self.pixel_width + row * self.rotation_x;
        let y = self.top_left_y + col * self.rotation_y + row * self.pixel_height;
        (x, y)
    }

    /// Fractional pixel position (col, row) of a map coordinate.
    /// Returns `None` for a singular transform.
    pub fn map_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let dx = x - self.top_left_x;
        let dy = y - self.top_left_y;
        let col = (self.pixel_height * dx - self.rotation_x * dy) / det;
        let row = (self.pixel_width * dy - self.rotation_y * dx) / det;
        Some((col, row))
    }

    /// Map-space extent of a grid with the given shape
    pub fn bounds(&self, rows: usize, cols: usize) -> BoundingBox {
        let corners = [
            self.pixel_to_map(0.0, 0.0),
            self.pixel_to_map(cols as f64, 0.0),
            self.pixel_to_map(0.0, rows as f64),
            self.pixel_to_map(cols as f64, rows as f64),
        ];
        let mut bbox = BoundingBox::from_corners(corners[0].0, corners[0].1, corners[3].0, corners[3].1);
        for &(x, y) in &corners[1..3] {
            bbox = bbox.union(&BoundingBox::from_corners(x, y, x, y));
        }
        bbox
    }
}

/// Coordinate reference system definition: WKT, PROJ string or `EPSG:<code>`.
/// Two CRS values are considered the same only when their definitions match
/// exactly; anything else goes through the coordinate-transform capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs(String);

impl Crs {
    pub fn new(definition: impl Into<String>) -> Self {
        Self(definition.into())
    }

    pub fn from_epsg(code: u32) -> Self {
        Self(format!("EPSG:{}", code))
    }

    /// Geographic WGS84, the CRS of the WorldCover tiles and tile grid
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    pub fn definition(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // WKT strings can be long; the first line is enough for logs
        let first = self.0.lines().next().unwrap_or("");
        if first.chars().count() > 64 {
            let short: String = first.chars().take(64).collect();
            write!(f, "{}...", short)
        } else {
            write!(f, "{}", first)
        }
    }
}

/// The fixed pixel grid of the scene being masked. Every derived array
/// (aligned land cover, mask, masked output) shares it exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationGrid {
    pub crs: Crs,
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
}

impl DestinationGrid {
    pub fn new(crs: Crs, transform: GeoTransform, rows: usize, cols: usize) -> Self {
        Self { crs, transform, rows, cols }
    }

    /// ndarray-style shape `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn bounds(&self) -> BoundingBox {
        self.transform.bounds(self.rows, self.cols)
    }

    /// Fail with `GridMismatch` unless `other` is the identical grid
    pub fn ensure_matches(&self, other: &DestinationGrid, context: &str) -> SarResult<()> {
        if self.crs != other.crs {
            return Err(SarError::GridMismatch(format!(
                "{}: CRS differs ({} vs {})",
                context, self.crs, other.crs
            )));
        }
        if self.transform != other.transform {
            return Err(SarError::GridMismatch(format!(
                "{}: transform differs ({:?} vs {:?})",
                context,
                self.transform.to_gdal(),
                other.transform.to_gdal()
            )));
        }
        if self.shape() != other.shape() {
            return Err(SarError::GridMismatch(format!(
                "{}: shape differs ({:?} vs {:?})",
                context,
                self.shape(),
                other.shape()
            )));
        }
        Ok(())
    }
}

/// A 2D array co-registered with a [`DestinationGrid`], with an optional
/// nodata sentinel compared by exact equality.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T> {
    pub data: Array2<T>,
    pub grid: DestinationGrid,
    pub nodata: Option<T>,
}

impl<T> Raster<T> {
    /// Wrap an array, checking that its shape matches the grid
    pub fn new(data: Array2<T>, grid: DestinationGrid, nodata: Option<T>) -> SarResult<Self> {
        if data.dim() != grid.shape() {
            return Err(SarError::GridMismatch(format!(
                "array shape {:?} does not match grid shape {:?}",
                data.dim(),
                grid.shape()
            )));
        }
        Ok(Self { data, grid, nodata })
    }

    /// A raster with every pixel set to `value`
    pub fn filled(grid: DestinationGrid, value: T, nodata: Option<T>) -> Self
    where
        T: Clone,
    {
        let data = Array2::from_elem(grid.shape(), value);
        Self { data, grid, nodata }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn ensure_same_grid<U>(&self, other: &Raster<U>, context: &str) -> SarResult<()> {
        self.grid.ensure_matches(&other.grid, context)
    }
}

impl<T: PartialEq> Raster<T> {
    /// Exact sentinel equality; a raster without nodata has no nodata pixels
    pub fn is_nodata(&self, value: &T) -> bool {
        self.nodata.as_ref().map_or(false, |nd| nd == value)
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !self.is_nodata(v)).count()
    }
}

/// Error types for land masking
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("No matching WorldCover tiles found in {directory} for bounds ({bounds})")]
    NoTilesFound {
        directory: PathBuf,
        bounds: GeographicBounds,
    },

    #[error("Grid mismatch: {0}")]
    GridMismatch(String),

    #[error("Aligned land cover is all nodata within the destination bounds ({pixels} pixels)")]
    AllNodata { pixels: usize },

    #[error("No finite pixels to derive a valid region from: {0}")]
    EmptyValidRegion(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type for land masking operations
pub type SarResult<T> = Result<T, SarError>;
