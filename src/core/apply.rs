//! Stamping a land mask onto co-registered radar channels

use crate::types::{Raster, SarResult};
use ndarray::Zip;
use num_traits::Float;

/// Overwrite every land pixel of `data` with NaN. Returns the number of
/// masked pixels. Fails with `GridMismatch` if the grids differ.
pub fn apply_mask_in_place<F>(mask: &Raster<bool>, data: &mut Raster<F>) -> SarResult<usize>
where
    F: Float + Send + Sync,
{
    mask.ensure_same_grid(data, "mask application")?;

    let missing = F::nan();
    stamp(&mask.data, &mut data.data, missing);
    data.nodata = Some(missing);

    Ok(mask.data.iter().filter(|&&m| m).count())
}

#[cfg(feature = "parallel")]
fn stamp<F: Float + Send + Sync>(mask: &ndarray::Array2<bool>, data: &mut ndarray::Array2<F>, missing: F) {
    Zip::from(data).and(mask).par_for_each(|v, &land| {
        if land {
            *v = missing;
        }
    });
}

#[cfg(not(feature = "parallel"))]
fn stamp<F: Float>(mask: &ndarray::Array2<bool>, data: &mut ndarray::Array2<F>, missing: F) {
    Zip::from(data).and(mask).for_each(|v, &land| {
        if land {
            *v = missing;
        }
    });
}

/// Masked copy of `data`; non-land pixels, including the source's own
/// nodata fringe, pass through unchanged
pub fn apply_mask<F>(mask: &Raster<bool>, data: &Raster<F>) -> SarResult<Raster<F>>
where
    F: Float + Send + Sync,
{
    let mut out = data.clone();
    apply_mask_in_place(mask, &mut out)?;
    Ok(out)
}

/// Apply one mask to several channels of the same scene. Every grid is
/// checked before any channel is modified.
pub fn apply_mask_to_channels<F>(mask: &Raster<bool>, channels: &mut [Raster<F>]) -> SarResult<usize>
where
    F: Float + Send + Sync,
{
    for (i, channel) in channels.iter().enumerate() {
        mask.ensure_same_grid(channel, &format!("channel {}", i))?;
    }

    let mut masked = 0;
    for channel in channels.iter_mut() {
        masked = apply_mask_in_place(mask, channel)?;
    }
    log::info!("Masked {} land pixels in each of {} channels", masked, channels.len());
    Ok(masked)
}
