//! ESA WorldCover tile discovery and preprocessing

use crate::core::grid::{cells_intersecting, GridCell, WORLDCOVER_CELL_SIZE};
use crate::io::raster::{read_band, write_band};
use crate::types::{GeographicBounds, SarError, SarResult};
use ndarray::Array2;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const WORLDCOVER_PREFIX: &str = "ESA_WorldCover_10m_2021_V200_";

/// Suffix of raw class tiles
pub const MAP_SUFFIX: &str = "_Map.tif";

/// Suffix of tiles reduced to land/water/nodata
pub const PREPROCESSED_SUFFIX: &str = "_preprocessed.tif";

/// Tile file name for the cell with southwest corner (lat, lon),
/// e.g. `ESA_WorldCover_10m_2021_V200_S03W072_Map.tif`
pub fn worldcover_tile_name(lat: i32, lon: i32, suffix: &str) -> String {
    let lat_prefix = if lat >= 0 { "N" } else { "S" };
    let lon_prefix = if lon >= 0 { "E" } else { "W" };
    format!(
        "{}{}{:02}{}{:03}{}",
        WORLDCOVER_PREFIX,
        lat_prefix,
        lat.abs(),
        lon_prefix,
        lon.abs(),
        suffix
    )
}

static TILE_NAME: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^ESA_WorldCover_10m_2021_V200_([NS])(\d{2})([EW])(\d{3})").ok());

/// Recover the grid cell from a WorldCover tile file name
pub fn parse_tile_name(name: &str) -> Option<GridCell> {
    let captures = TILE_NAME.as_ref()?.captures(name)?;

    let lat: i32 = captures[2].parse().ok()?;
    let lon: i32 = captures[4].parse().ok()?;
    let lat = if &captures[1] == "S" { -lat } else { lat };
    let lon = if &captures[3] == "W" { -lon } else { lon };

    Some(GridCell { lat, lon, size: WORLDCOVER_CELL_SIZE })
}

/// Existing tiles in `tile_directory` for every grid cell intersecting
/// `bounds`, sorted by file name.
///
/// Fails with `NoTilesFound` when none of the candidate files exist.
pub fn select_tiles<F>(
    bounds: &GeographicBounds,
    tile_directory: &Path,
    cell_size: u32,
    name_fn: F,
) -> SarResult<Vec<PathBuf>>
where
    F: Fn(i32, i32) -> String,
{
    let names: BTreeSet<String> = cells_intersecting(bounds, cell_size)?
        .iter()
        .map(|cell| name_fn(cell.lat, cell.lon))
        .collect();

    let mut paths = Vec::new();
    for name in &names {
        let path = tile_directory.join(name);
        if path.is_file() {
            paths.push(path);
        } else {
            log::debug!("Candidate tile not present: {}", name);
        }
    }

    if paths.is_empty() {
        return Err(SarError::NoTilesFound {
            directory: tile_directory.to_path_buf(),
            bounds: *bounds,
        });
    }

    log::info!("Selected {} of {} candidate tiles", paths.len(), names.len());
    for path in &paths {
        log::debug!("  {}", path.display());
    }
    Ok(paths)
}

/// Tile directory with WorldCover naming
#[derive(Debug, Clone, PartialEq)]
pub struct WorldCoverTiles {
    directory: PathBuf,
    cell_size: u32,
    suffix: String,
}

impl WorldCoverTiles {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            cell_size: WORLDCOVER_CELL_SIZE,
            suffix: MAP_SUFFIX.to_string(),
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_cell_size(mut self, cell_size: u32) -> Self {
        self.cell_size = cell_size;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn tile_name(&self, lat: i32, lon: i32) -> String {
        worldcover_tile_name(lat, lon, &self.suffix)
    }

    pub fn select(&self, bounds: &GeographicBounds) -> SarResult<Vec<PathBuf>> {
        select_tiles(bounds, &self.directory, self.cell_size, |lat, lon| self.tile_name(lat, lon))
    }
}

/// Reduce raw WorldCover classes to 1 = land, 0 = water (class 80),
/// 255 = nodata (class 0)
pub fn reclassify_worldcover(codes: &Array2<u8>) -> Array2<u8> {
    codes.mapv(|code| match code {
        0 => 255,
        80 => 0,
        _ => 1,
    })
}

/// Write a `_preprocessed.tif` land mask next to every raw `_Map.tif`
/// tile of `input_dir` into `output_dir`. Returns the written paths.
pub fn preprocess_tiles(input_dir: &Path, output_dir: &Path) -> SarResult<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)?;

    let mut inputs: Vec<PathBuf> = std::fs::read_dir(input_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.ends_with(MAP_SUFFIX) && parse_tile_name(n).is_some())
        })
        .collect();
    inputs.sort();

    let total = inputs.len();
    let mut outputs = Vec::with_capacity(total);
    for (idx, input) in inputs.iter().enumerate() {
        let name = input
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SarError::InvalidFormat(format!("Bad tile name: {}", input.display())))?;
        let out_name = name.replace(MAP_SUFFIX, PREPROCESSED_SUFFIX);
        let out_path = output_dir.join(&out_name);
        log::info!("[{}/{}] Preprocessing {} -> {}", idx + 1, total, name, out_name);

        let (codes, profile) = read_band::<u8, _>(input)?;
        let land_mask = reclassify_worldcover(&codes);
        write_band(&out_path, &land_mask, &profile.grid, Some(255.0))?;
        outputs.push(out_path);
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::TempDir;

    #[test]
    fn test_tile_names() {
        assert_eq!(
            worldcover_tile_name(0, 0, MAP_SUFFIX),
            "ESA_WorldCover_10m_2021_V200_N00E000_Map.tif"
        );
        assert_eq!(
            worldcover_tile_name(-3, -72, PREPROCESSED_SUFFIX),
            "ESA_WorldCover_10m_2021_V200_S03W072_preprocessed.tif"
        );
        assert_eq!(
            worldcover_tile_name(42, 9, MAP_SUFFIX),
            "ESA_WorldCover_10m_2021_V200_N42E009_Map.tif"
        );
    }

    #[test]
    fn test_parse_tile_name() {
        let cell = parse_tile_name("ESA_WorldCover_10m_2021_V200_S03W072_Map.tif").unwrap();
        assert_eq!((cell.lat, cell.lon), (-3, -72));
        let cell = parse_tile_name("ESA_WorldCover_10m_2021_V200_N57E120_preprocessed.tif").unwrap();
        assert_eq!((cell.lat, cell.lon), (57, 120));
        assert!(parse_tile_name("N57E120.hgt").is_none());
    }

    #[test]
    fn test_tile_name_pattern_shared_across_calls() {
        let first = TILE_NAME.as_ref().unwrap() as *const Regex;
        for lat in (-90..90).step_by(3) {
            for lon in (-180..180).step_by(3) {
                let cell = parse_tile_name(&worldcover_tile_name(lat, lon, MAP_SUFFIX)).unwrap();
                assert_eq!((cell.lat, cell.lon), (lat, lon));
            }
        }
        assert_eq!(TILE_NAME.as_ref().unwrap() as *const Regex, first);
        assert!(parse_tile_name("ESA_WorldCover_10m_2021_V200_X03W072_Map.tif").is_none());
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_select_existing_tiles_sorted() {
        let dir = TempDir::new().unwrap();
        for (lat, lon) in [(0, 0), (0, -3), (-3, 0)] {
            touch(dir.path(), &worldcover_tile_name(lat, lon, MAP_SUFFIX));
        }
        let bounds = GeographicBounds::new(-1.0, -1.0, 1.0, 1.0).unwrap();
        let tiles = WorldCoverTiles::new(dir.path()).select(&bounds).unwrap();
        let names: Vec<String> = tiles
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "ESA_WorldCover_10m_2021_V200_N00E000_Map.tif",
                "ESA_WorldCover_10m_2021_V200_N00W003_Map.tif",
                "ESA_WorldCover_10m_2021_V200_S03E000_Map.tif",
            ]
        );
    }

    #[test]
    fn test_select_is_deterministic() {
        let dir = TempDir::new().unwrap();
        for lat in [39, 42, 45] {
            for lon in [-72, -69] {
                touch(dir.path(), &worldcover_tile_name(lat, lon, PREPROCESSED_SUFFIX));
            }
        }
        let tiles = WorldCoverTiles::new(dir.path()).with_suffix(PREPROCESSED_SUFFIX);
        let bounds = GeographicBounds::new(-70.3, 41.2, -66.9, 45.8).unwrap();
        let first = tiles.select(&bounds).unwrap();
        let second = tiles.select(&bounds).unwrap();
        assert_eq!(first.len(), 6);
        assert_eq!(first, second);
    }

    #[test]
    fn test_suffix_must_match() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), &worldcover_tile_name(0, 0, MAP_SUFFIX));
        let bounds = GeographicBounds::new(0.5, 0.5, 1.0, 1.0).unwrap();
        let result = WorldCoverTiles::new(dir.path()).with_suffix(PREPROCESSED_SUFFIX).select(&bounds);
        assert!(matches!(result, Err(SarError::NoTilesFound { .. })));
    }

    #[test]
    fn test_no_tiles_found() {
        let dir = TempDir::new().unwrap();
        let bounds = GeographicBounds::new(10.0, 10.0, 11.0, 11.0).unwrap();
        match WorldCoverTiles::new(dir.path()).select(&bounds) {
            Err(SarError::NoTilesFound { directory, bounds: b }) => {
                assert_eq!(directory, dir.path());
                assert_eq!(b, bounds);
            }
            other => panic!("expected NoTilesFound, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_name_fn() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "cell_6_-3.tif");
        let bounds = GeographicBounds::new(-2.0, 7.0, -1.0, 8.0).unwrap();
        let tiles = select_tiles(&bounds, dir.path(), 3, |lat, lon| format!("cell_{}_{}.tif", lat, lon)).unwrap();
        assert_eq!(tiles, vec![dir.path().join("cell_6_-3.tif")]);
    }

    #[test]
    fn test_reclassify() {
        let codes = array![[0u8, 10, 80], [95, 100, 80]];
        assert_eq!(reclassify_worldcover(&codes), array![[255u8, 1, 0], [1, 1, 0]]);
    }
}
