//! GDAL-backed raster reading and writing
//!
//! Datasets are opened for the duration of one call and dropped before it
//! returns, on every exit path.

use crate::core::align::{SourceTile, TileLoader};
use crate::types::{Crs, DestinationGrid, GeoTransform, LandCoverCode, Raster, SarError, SarReal, SarResult};
use gdal::raster::{Buffer, GdalType};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::Path;

/// Grid and nodata of a single-band raster file
#[derive(Debug, Clone, PartialEq)]
pub struct RasterProfile {
    pub grid: DestinationGrid,
    pub nodata: Option<f64>,
}

/// Read the georeferencing of a raster without reading pixels
pub fn read_profile<P: AsRef<Path>>(path: P) -> SarResult<RasterProfile> {
    let dataset = Dataset::open(path.as_ref())?;
    profile_of(&dataset)
}

fn profile_of(dataset: &Dataset) -> SarResult<RasterProfile> {
    let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
    let (width, height) = dataset.raster_size();
    let crs = Crs::new(dataset.projection());
    let nodata = dataset.rasterband(1)?.no_data_value();

    Ok(RasterProfile {
        grid: DestinationGrid::new(crs, transform, height, width),
        nodata,
    })
}

/// Read band 1 as `T` together with its profile
pub fn read_band<T, P>(path: P) -> SarResult<(Array2<T>, RasterProfile)>
where
    T: GdalType + Copy,
    P: AsRef<Path>,
{
    log::debug!("Reading raster: {}", path.as_ref().display());

    let dataset = Dataset::open(path.as_ref())?;
    let profile = profile_of(&dataset)?;
    let (rows, cols) = profile.grid.shape();

    let rasterband = dataset.rasterband(1)?;
    let band_data = rasterband.read_as::<T>((0, 0), (cols, rows), (cols, rows), None)?;

    let array = Array2::from_shape_vec((rows, cols), band_data.data)
        .map_err(|e| SarError::Processing(format!("Failed to reshape raster data: {}", e)))?;

    Ok((array, profile))
}

/// Read a radar channel as float32. The channel's grid becomes the
/// destination grid for the scene.
pub fn read_channel<P: AsRef<Path>>(path: P) -> SarResult<Raster<SarReal>> {
    let (data, profile) = read_band::<SarReal, _>(path.as_ref())?;
    log::info!(
        "Loaded {} ({} x {})",
        path.as_ref().display(),
        profile.grid.rows,
        profile.grid.cols
    );
    Raster::new(data, profile.grid, profile.nodata.map(|v| v as SarReal))
}

/// Write `data` as a single-band GeoTIFF on `grid`
pub fn write_band<T, P>(path: P, data: &Array2<T>, grid: &DestinationGrid, nodata: Option<f64>) -> SarResult<()>
where
    T: GdalType + Copy,
    P: AsRef<Path>,
{
    let (rows, cols) = data.dim();
    if (rows, cols) != grid.shape() {
        return Err(SarError::GridMismatch(format!(
            "cannot write {:?} array on a {:?} grid",
            (rows, cols),
            grid.shape()
        )));
    }
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type::<T, _>(path.as_ref(), cols as isize, rows as isize, 1)?;

    dataset.set_geo_transform(&grid.transform.to_gdal())?;
    if !grid.crs.definition().is_empty() {
        dataset.set_spatial_ref(&SpatialRef::from_definition(grid.crs.definition())?)?;
    }

    let mut rasterband = dataset.rasterband(1)?;
    let flat_data: Vec<T> = data.iter().copied().collect();
    let buffer = Buffer::new((cols, rows), flat_data);
    rasterband.write((0, 0), (cols, rows), &buffer)?;
    if nodata.is_some() {
        rasterband.set_no_data_value(nodata)?;
    }

    log::info!("Saved {}", path.as_ref().display());
    Ok(())
}

/// Write a masked channel as float32 with NaN nodata
pub fn write_channel<P: AsRef<Path>>(path: P, raster: &Raster<SarReal>) -> SarResult<()> {
    write_band(path, &raster.data, &raster.grid, Some(f64::NAN))
}

/// Write a land mask as uint8 (1 = land, 0 = other, nodata 0)
pub fn write_mask<P: AsRef<Path>>(path: P, mask: &Raster<bool>) -> SarResult<()> {
    let bytes = mask.data.mapv(u8::from);
    write_band(path, &bytes, &mask.grid, Some(0.0))
}

/// Loads WorldCover tiles (raw or preprocessed) from GeoTIFF files
#[derive(Debug, Default, Clone, Copy)]
pub struct GdalTileLoader;

impl TileLoader for GdalTileLoader {
    fn load(&self, path: &Path) -> SarResult<SourceTile> {
        let (data, profile) = read_band::<LandCoverCode, _>(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(SourceTile {
            name,
            data,
            transform: profile.grid.transform,
            crs: profile.grid.crs,
            nodata: profile.nodata.map(|v| v as LandCoverCode),
        })
    }
}
