use ndarray::Array2;
use sarmask::core::grid::{cells_intersecting, snap_to_grid, GridCell};
use sarmask::io::raster::{read_band, write_band};
use sarmask::io::worldcover::{
    parse_tile_name, preprocess_tiles, worldcover_tile_name, WorldCoverTiles, MAP_SUFFIX, PREPROCESSED_SUFFIX,
};
use sarmask::{Crs, DestinationGrid, GeoTransform, GeographicBounds, SarError};
use tempfile::TempDir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_snap_to_grid_floors_toward_negative_infinity() {
    assert_eq!(snap_to_grid(-0.1, 3), -3);
    assert_eq!(snap_to_grid(-0.5, 3), -3);
    assert_eq!(snap_to_grid(0.0, 3), 0);
    assert_eq!(snap_to_grid(2.9, 3), 0);
    assert_eq!(snap_to_grid(3.0, 3), 3);
    assert_eq!(snap_to_grid(-3.0, 3), -3);
    assert_eq!(snap_to_grid(-3.1, 3), -6);
}

#[test]
fn test_every_selected_cell_overlaps_bounds() {
    let mut checked = 0;
    for west in [-180.0, -72.4, -3.0, -0.1, 0.0, 2.5, 119.9] {
        for width in [0.01, 0.5, 3.0, 7.3] {
            for south in [-89.0, -6.0, -0.2, 0.0, 41.2] {
                for height in [0.2, 3.0, 5.9] {
                    let bounds = GeographicBounds::new(west, south, west + width, south + height).unwrap();
                    let cells = cells_intersecting(&bounds, 3).unwrap();
                    assert!(!cells.is_empty(), "no cells for {}", bounds);

                    for cell in &cells {
                        let (cw, cs) = (cell.lon as f64, cell.lat as f64);
                        let (ce, cn) = (cw + 3.0, cs + 3.0);
                        assert!(
                            !(ce <= bounds.west || cw >= bounds.east || cn <= bounds.south || cs >= bounds.north),
                            "cell {:?} does not overlap {}",
                            cell,
                            bounds
                        );
                        assert_eq!(cell.lat.rem_euclid(3), 0);
                        assert_eq!(cell.lon.rem_euclid(3), 0);
                    }
                    checked += 1;
                }
            }
        }
    }
    assert_eq!(checked, 7 * 4 * 5 * 3);
}

#[test]
fn test_selected_cells_cover_bounds() {
    let bounds = GeographicBounds::new(-70.3, 41.2, -66.9, 45.8).unwrap();
    let cells = cells_intersecting(&bounds, 3).unwrap();
    let expected: Vec<GridCell> = [(39, -72), (39, -69), (42, -72), (42, -69), (45, -72), (45, -69)]
        .iter()
        .map(|&(lat, lon)| GridCell { lat, lon, size: 3 })
        .collect();
    let mut actual: Vec<GridCell> = cells.into_iter().collect();
    actual.sort();
    let mut expected = expected;
    expected.sort();
    assert_eq!(actual, expected);
}

#[test]
fn test_names_round_trip_through_parser() {
    for (lat, lon) in [(0, 0), (-3, -72), (57, 120), (-90, 177)] {
        let name = worldcover_tile_name(lat, lon, MAP_SUFFIX);
        let cell = parse_tile_name(&name).expect("Failed to parse tile name");
        assert_eq!((cell.lat, cell.lon), (lat, lon), "{}", name);
    }
}

#[test]
fn test_selection_is_sorted_and_repeatable() {
    init_logging();
    let dir = TempDir::new().expect("Failed to create temp dir");
    for lat in [-3, 0] {
        for lon in [-3, 0, 3] {
            std::fs::write(dir.path().join(worldcover_tile_name(lat, lon, MAP_SUFFIX)), b"").unwrap();
        }
    }
    // A tile with the other suffix is never selected
    std::fs::write(dir.path().join(worldcover_tile_name(0, 0, PREPROCESSED_SUFFIX)), b"").unwrap();

    let tiles = WorldCoverTiles::new(dir.path());
    let bounds = GeographicBounds::new(-1.5, -1.5, 4.0, 1.5).unwrap();
    let first = tiles.select(&bounds).expect("Selection failed");

    assert_eq!(first.len(), 6);
    let names: Vec<String> = first
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    assert!(names.iter().all(|n| n.ends_with(MAP_SUFFIX)));

    for _ in 0..3 {
        assert_eq!(tiles.select(&bounds).unwrap(), first);
    }
}

#[test]
fn test_bounds_without_tiles_fail() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(dir.path().join(worldcover_tile_name(0, 0, MAP_SUFFIX)), b"").unwrap();

    // Touches the cell's western edge only
    let bounds = GeographicBounds::new(-1.0, 0.5, 0.0, 1.0).unwrap();
    let result = WorldCoverTiles::new(dir.path()).select(&bounds);
    assert!(matches!(result, Err(SarError::NoTilesFound { .. })));
}

#[test]
fn test_preprocess_tiles_writes_binary_masks() {
    init_logging();
    if gdal::DriverManager::get_driver_by_name("GTiff").is_err() {
        println!("GDAL GTiff driver not available, skipping test");
        return;
    }

    let input = TempDir::new().expect("Failed to create temp dir");
    let output = TempDir::new().expect("Failed to create temp dir");

    let grid = DestinationGrid::new(Crs::wgs84(), GeoTransform::north_up(3.0, 3.0, 0.5, -0.5), 2, 3);
    let codes = Array2::from_shape_vec((2, 3), vec![0u8, 10, 80, 95, 80, 100]).unwrap();
    write_band(input.path().join(worldcover_tile_name(0, 3, MAP_SUFFIX)), &codes, &grid, Some(0.0))
        .expect("Failed to write tile");
    std::fs::write(input.path().join("notes.txt"), b"ignored").unwrap();

    let written = preprocess_tiles(input.path(), output.path()).expect("Preprocessing failed");
    assert_eq!(written, vec![output.path().join(worldcover_tile_name(0, 3, PREPROCESSED_SUFFIX))]);

    let (binary, profile) = read_band::<u8, _>(&written[0]).expect("Failed to read output");
    assert_eq!(binary.into_raw_vec(), vec![255, 1, 0, 1, 0, 1]);
    assert_eq!(profile.nodata, Some(255.0));
    assert_eq!(profile.grid.shape(), (2, 3));
    assert_eq!(profile.grid.transform, grid.transform);
}
