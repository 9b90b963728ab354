//! Coordinate transformation between reference systems
//!
//! Projection mathematics is delegated to GDAL/PROJ through [`GdalProjector`].
//! The rest of the crate only sees the [`Projector`] / [`PointTransform`]
//! traits so alternative backends can be plugged in.

use crate::types::{BoundingBox, Crs, SarError, SarResult};
use gdal::spatial_ref::{CoordTransform, SpatialRef};

/// Number of points inserted along each bounding box edge when
/// transforming bounds through a non-linear projection
pub const DEFAULT_DENSIFY_POINTS: usize = 21;

/// In-place transformation of coordinate arrays from one CRS to another
pub trait PointTransform {
    fn transform(&self, xs: &mut [f64], ys: &mut [f64]) -> SarResult<()>;
}

/// Factory for coordinate transforms. Transforms are created per call so
/// backends whose handles are not thread-safe can be used from workers.
pub trait Projector: Sync {
    fn transformer(&self, src: &Crs, dst: &Crs) -> SarResult<Box<dyn PointTransform>>;

    fn is_geographic(&self, crs: &Crs) -> SarResult<bool>;
}

/// No-op transform between identical reference systems
pub struct IdentityTransform;

impl PointTransform for IdentityTransform {
    fn transform(&self, _xs: &mut [f64], _ys: &mut [f64]) -> SarResult<()> {
        Ok(())
    }
}

/// Transform from `src` to `dst`, skipping the projector when both are identical
pub fn transformer_for(
    projector: &dyn Projector,
    src: &Crs,
    dst: &Crs,
) -> SarResult<Box<dyn PointTransform>> {
    if src == dst {
        return Ok(Box::new(IdentityTransform));
    }
    projector.transformer(src, dst)
}

/// Transform an axis-aligned box, sampling `densify` extra points along each
/// edge so curved edges in the target CRS are enclosed.
pub fn transform_bounds(
    transform: &dyn PointTransform,
    bounds: &BoundingBox,
    densify: usize,
) -> SarResult<BoundingBox> {
    let steps = densify + 1;
    let mut xs = Vec::with_capacity(4 * steps);
    let mut ys = Vec::with_capacity(4 * steps);

    for i in 0..steps {
        let t = i as f64 / steps as f64;
        let x = bounds.min_x + t * (bounds.max_x - bounds.min_x);
        let y = bounds.min_y + t * (bounds.max_y - bounds.min_y);
        // bottom edge west->east, right edge south->north,
        // top edge east->west, left edge north->south
        xs.push(x);
        ys.push(bounds.min_y);
        xs.push(bounds.max_x);
        ys.push(y);
        xs.push(bounds.max_x - (x - bounds.min_x));
        ys.push(bounds.max_y);
        xs.push(bounds.min_x);
        ys.push(bounds.max_y - (y - bounds.min_y));
    }

    transform.transform(&mut xs, &mut ys)?;

    let mut out: Option<BoundingBox> = None;
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        if !x.is_finite() || !y.is_finite() {
            continue;
        }
        let point = BoundingBox::from_corners(x, y, x, y);
        out = Some(match out {
            Some(b) => b.union(&point),
            None => point,
        });
    }

    out.ok_or_else(|| {
        SarError::Processing(format!("Bounds {:?} could not be transformed to any finite point", bounds))
    })
}

/// GDAL/PROJ-backed projector
#[derive(Debug, Default, Clone, Copy)]
pub struct GdalProjector;

struct GdalTransform {
    inner: CoordTransform,
}

impl PointTransform for GdalTransform {
    fn transform(&self, xs: &mut [f64], ys: &mut [f64]) -> SarResult<()> {
        let mut zs = vec![0.0; xs.len()];
        self.inner.transform_coords(xs, ys, &mut zs)?;
        Ok(())
    }
}

impl GdalProjector {
    /// Parse a definition with x=easting/longitude, y=northing/latitude axis order
    fn spatial_ref(crs: &Crs) -> SarResult<SpatialRef> {
        let srs = SpatialRef::from_definition(crs.definition())?;
        srs.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
        Ok(srs)
    }
}

impl Projector for GdalProjector {
    fn transformer(&self, src: &Crs, dst: &Crs) -> SarResult<Box<dyn PointTransform>> {
        log::debug!("Creating coordinate transform {} -> {}", src, dst);
        let src_srs = Self::spatial_ref(src)?;
        let dst_srs = Self::spatial_ref(dst)?;
        let inner = CoordTransform::new(&src_srs, &dst_srs)?;
        Ok(Box::new(GdalTransform { inner }))
    }

    fn is_geographic(&self, crs: &Crs) -> SarResult<bool> {
        Ok(Self::spatial_ref(crs)?.is_geographic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Equirectangular stand-in: metres = degrees * 1000
    struct Scale;

    impl PointTransform for Scale {
        fn transform(&self, xs: &mut [f64], ys: &mut [f64]) -> SarResult<()> {
            xs.iter_mut().for_each(|x| *x *= 1000.0);
            ys.iter_mut().for_each(|y| *y *= 1000.0);
            Ok(())
        }
    }

    /// Maps (x, y) to (x + y, y): a shear, so corners alone do not bound the result
    struct Shear;

    impl PointTransform for Shear {
        fn transform(&self, xs: &mut [f64], ys: &mut [f64]) -> SarResult<()> {
            for (x, y) in xs.iter_mut().zip(ys.iter()) {
                *x += *y;
            }
            Ok(())
        }
    }

    struct Nowhere;

    impl PointTransform for Nowhere {
        fn transform(&self, xs: &mut [f64], _ys: &mut [f64]) -> SarResult<()> {
            xs.iter_mut().for_each(|x| *x = f64::INFINITY);
            Ok(())
        }
    }

    #[test]
    fn test_identity_bounds() {
        let b = BoundingBox { min_x: -2.0, min_y: 1.0, max_x: 3.0, max_y: 4.0 };
        let out = transform_bounds(&IdentityTransform, &b, DEFAULT_DENSIFY_POINTS).unwrap();
        assert_relative_eq!(out.min_x, -2.0);
        assert_relative_eq!(out.max_x, 3.0);
        assert_relative_eq!(out.min_y, 1.0);
        assert_relative_eq!(out.max_y, 4.0);
    }

    #[test]
    fn test_scaled_bounds() {
        let b = BoundingBox { min_x: 0.0, min_y: 0.0, max_x: 1.0, max_y: 2.0 };
        let out = transform_bounds(&Scale, &b, 0).unwrap();
        assert_relative_eq!(out.max_x, 1000.0);
        assert_relative_eq!(out.max_y, 2000.0);
    }

    #[test]
    fn test_sheared_bounds_cover_all_corners() {
        let b = BoundingBox { min_x: 0.0, min_y: 0.0, max_x: 1.0, max_y: 1.0 };
        let out = transform_bounds(&Shear, &b, 3).unwrap();
        assert_relative_eq!(out.min_x, 0.0);
        assert_relative_eq!(out.max_x, 2.0);
    }

    #[test]
    fn test_untransformable_bounds_error() {
        let b = BoundingBox { min_x: 0.0, min_y: 0.0, max_x: 1.0, max_y: 1.0 };
        assert!(transform_bounds(&Nowhere, &b, 2).is_err());
    }

    #[test]
    fn test_identical_crs_skips_projector() {
        struct Panicky;
        impl Projector for Panicky {
            fn transformer(&self, _: &Crs, _: &Crs) -> SarResult<Box<dyn PointTransform>> {
                Err(SarError::Processing("should not be called".to_string()))
            }
            fn is_geographic(&self, _: &Crs) -> SarResult<bool> {
                Ok(true)
            }
        }
        assert!(transformer_for(&Panicky, &Crs::wgs84(), &Crs::wgs84()).is_ok());
        assert!(transformer_for(&Panicky, &Crs::wgs84(), &Crs::from_epsg(3857)).is_err());
    }
}
