//! Fixed-size geographic tile grid arithmetic

use crate::types::{GeographicBounds, SarError, SarResult};
use std::collections::BTreeSet;

/// Side length in degrees of an ESA WorldCover tile
pub const WORLDCOVER_CELL_SIZE: u32 = 3;

const MIN_LAT: f64 = -90.0;
const MAX_LAT: f64 = 90.0;
const MIN_LON: f64 = -180.0;
const MAX_LON: f64 = 180.0;

/// A `size`x`size` degree grid cell keyed by its southwest corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCell {
    /// Latitude of the southwest corner (integer degrees)
    pub lat: i32,
    /// Longitude of the southwest corner (integer degrees)
    pub lon: i32,
    pub size: u32,
}

impl GridCell {
    /// Cell containing the point (lat, lon)
    pub fn containing(lat: f64, lon: f64, size: u32) -> Self {
        Self {
            lat: snap_to_grid(lat, size),
            lon: snap_to_grid(lon, size),
            size,
        }
    }

    pub fn footprint(&self) -> GeographicBounds {
        let size = self.size as f64;
        GeographicBounds {
            west: self.lon as f64,
            south: self.lat as f64,
            east: self.lon as f64 + size,
            north: self.lat as f64 + size,
        }
    }

    /// Half-open overlap of the cell footprint with `bounds`
    pub fn intersects(&self, bounds: &GeographicBounds) -> bool {
        self.footprint().intersects(bounds)
    }
}

/// Snap a coordinate down to the grid, flooring toward negative infinity
/// (`-0.5` with a 3 degree cell snaps to `-3`, not `0`).
pub fn snap_to_grid(value: f64, cell_size: u32) -> i32 {
    let size = cell_size as f64;
    ((value / size).floor() * size) as i32
}

/// Every grid cell whose footprint overlaps `bounds`, in (lat, lon) order.
///
/// No antimeridian or polar wraparound: the bounds are treated as an
/// ordinary rectangle, clipped to latitudes [-90, 90] and longitudes
/// [-180, 180]. Bounds entirely outside that range yield no cells.
pub fn cells_intersecting(bounds: &GeographicBounds, cell_size: u32) -> SarResult<BTreeSet<GridCell>> {
    if cell_size == 0 || cell_size > 360 {
        return Err(SarError::InvalidFormat(format!(
            "Grid cell size must be between 1 and 360 degrees, got {}",
            cell_size
        )));
    }
    let finite = [bounds.west, bounds.south, bounds.east, bounds.north]
        .iter()
        .all(|v| v.is_finite());
    if !finite {
        return Err(SarError::InvalidFormat(format!("Non-finite bounds: {}", bounds)));
    }

    // Enumeration is limited to the globe so the cell loops stay finite
    let south = bounds.south.max(MIN_LAT);
    let north = bounds.north.min(MAX_LAT);
    let west = bounds.west.max(MIN_LON);
    let east = bounds.east.min(MAX_LON);

    let step = cell_size as i32;
    let mut cells = BTreeSet::new();

    let mut lat = snap_to_grid(south, cell_size);
    while (lat as f64) < north {
        let mut lon = snap_to_grid(west, cell_size);
        while (lon as f64) < east {
            let cell = GridCell { lat, lon, size: cell_size };
            if cell.intersects(bounds) {
                cells.insert(cell);
            }
            lon += step;
        }
        lat += step;
    }

    log::debug!("{} grid cells of {}° intersect {}", cells.len(), cell_size, bounds);
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(w: f64, s: f64, e: f64, n: f64) -> GeographicBounds {
        GeographicBounds::new(w, s, e, n).unwrap()
    }

    #[test]
    fn test_snap_to_grid() {
        assert_eq!(snap_to_grid(-0.1, 3), -3);
        assert_eq!(snap_to_grid(-0.5, 3), -3);
        assert_eq!(snap_to_grid(0.0, 3), 0);
        assert_eq!(snap_to_grid(2.9, 3), 0);
        assert_eq!(snap_to_grid(3.0, 3), 3);
        assert_eq!(snap_to_grid(-3.0, 3), -3);
        assert_eq!(snap_to_grid(-3.1, 3), -6);
        assert_eq!(snap_to_grid(-179.9, 3), -180);
    }

    #[test]
    fn test_single_cell() {
        let cells = cells_intersecting(&bounds(0.5, 0.5, 2.5, 2.5), 3).unwrap();
        assert_eq!(cells.len(), 1);
        let cell = cells.iter().next().unwrap();
        assert_eq!((cell.lat, cell.lon), (0, 0));
    }

    #[test]
    fn test_cells_across_equator_and_meridian() {
        let cells = cells_intersecting(&bounds(-1.0, -1.0, 1.0, 1.0), 3).unwrap();
        let corners: Vec<(i32, i32)> = cells.iter().map(|c| (c.lat, c.lon)).collect();
        assert_eq!(corners, vec![(-3, -3), (-3, 0), (0, -3), (0, 0)]);
    }

    #[test]
    fn test_edge_aligned_bounds_exclude_neighbours() {
        // East edge sits exactly on a cell boundary: the cell to the east must not be selected
        let cells = cells_intersecting(&bounds(0.0, 0.0, 3.0, 3.0), 3).unwrap();
        assert_eq!(cells.len(), 1);

        let cells = cells_intersecting(&bounds(0.0, 0.0, 3.0001, 3.0), 3).unwrap();
        assert_eq!(cells.len(), 2);
    }

    #[test]
    fn test_every_cell_truly_overlaps() {
        let cases = [
            bounds(-70.3, 41.2, -66.9, 45.8),
            bounds(-0.01, -0.01, 0.01, 0.01),
            bounds(10.0, -12.0, 19.0, -3.0),
            bounds(-179.5, -89.0, 179.5, 89.0),
        ];
        for b in &cases {
            let cells = cells_intersecting(b, 3).unwrap();
            assert!(!cells.is_empty());
            for cell in &cells {
                let f = cell.footprint();
                assert!(!(f.east <= b.west), "{:?} vs {}", cell, b);
                assert!(!(f.west >= b.east), "{:?} vs {}", cell, b);
                assert!(!(f.north <= b.south), "{:?} vs {}", cell, b);
                assert!(!(f.south >= b.north), "{:?} vs {}", cell, b);
                assert_eq!(cell.lat.rem_euclid(3), 0);
                assert_eq!(cell.lon.rem_euclid(3), 0);
            }
        }
    }

    #[test]
    fn test_cell_count_for_wide_bounds() {
        let cells = cells_intersecting(&bounds(-70.3, 41.2, -66.9, 45.8), 3).unwrap();
        // lat cells 39, 42, 45; lon cells -72, -69
        assert_eq!(cells.len(), 6);
    }

    #[test]
    fn test_zero_cell_size_rejected() {
        assert!(cells_intersecting(&bounds(0.0, 0.0, 1.0, 1.0), 0).is_err());
    }

    #[test]
    fn test_oversized_cell_rejected() {
        assert!(cells_intersecting(&bounds(0.0, 0.0, 1.0, 1.0), 361).is_err());
        assert!(cells_intersecting(&bounds(0.0, 0.0, 1.0, 1.0), u32::MAX).is_err());
        assert_eq!(cells_intersecting(&bounds(0.0, 0.0, 1.0, 1.0), 360).unwrap().len(), 1);
    }

    #[test]
    fn test_out_of_range_bounds_clipped_to_globe() {
        // Would overflow i32 degrees without clipping
        let cells = cells_intersecting(&bounds(0.0, 0.0, 1e10, 1.0), 3).unwrap();
        assert_eq!(cells.len(), 60);
        assert_eq!(cells.iter().next().unwrap().lon, 0);
        assert_eq!(cells.iter().last().unwrap().lon, 177);
        assert!(cells.iter().all(|c| c.lat == 0));

        let cells = cells_intersecting(&bounds(-1e12, -1e12, 1e12, 1e12), 3).unwrap();
        assert_eq!(cells.len(), 120 * 60);
        assert!(cells.iter().all(|c| c.lat >= -90 && c.lat < 90 && c.lon >= -180 && c.lon < 180));
    }

    #[test]
    fn test_bounds_outside_globe_select_nothing() {
        assert!(cells_intersecting(&bounds(-200.0, 0.0, -181.0, 1.0), 3).unwrap().is_empty());
        assert!(cells_intersecting(&bounds(0.0, 95.0, 1.0, 100.0), 3).unwrap().is_empty());
    }

    #[test]
    fn test_containing() {
        let cell = GridCell::containing(-0.5, 10.2, 3);
        assert_eq!((cell.lat, cell.lon), (-3, 9));
        assert!(cell.intersects(&bounds(10.0, -1.0, 11.0, 0.0)));
    }
}
