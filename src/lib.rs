//! sarmask: WorldCover land masking for Sentinel-1 scenes
//!
//! Aligns ESA WorldCover land-cover tiles onto the pixel grid of a radar
//! scene, derives and cleans a land/water mask, and writes NaN over land
//! pixels in every channel of the scene.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, Crs, DestinationGrid, GeoTransform, GeographicBounds, LandCoverCode, Polarization, Raster,
    SarError, SarResult,
};

pub use crate::core::{
    ClassificationRule, LandMaskPipeline, MorphOp, MorphologicalCleaner, PipelineConfig, SceneConfig, SceneReport,
};
pub use crate::io::{GdalTileLoader, WorldCoverTiles};

#[cfg(feature = "python")]
mod python {
    use super::*;
    use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
    use pyo3::prelude::*;

    fn runtime_error(e: SarError) -> PyErr {
        PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e))
    }

    fn value_error(message: String) -> PyErr {
        PyErr::new::<pyo3::exceptions::PyValueError, _>(message)
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(snap_to_grid, m)?)?;
        m.add_function(wrap_pyfunction!(worldcover_tile_name, m)?)?;
        m.add_function(wrap_pyfunction!(clean_mask, m)?)?;
        m.add_function(wrap_pyfunction!(preprocess_tiles, m)?)?;
        m.add_function(wrap_pyfunction!(run_pipeline, m)?)?;
        Ok(())
    }

    #[pyfunction]
    fn snap_to_grid(value: f64, cell_size: u32) -> i32 {
        crate::core::snap_to_grid(value, cell_size)
    }

    #[pyfunction]
    #[pyo3(signature = (lat, lon, suffix = "_Map.tif"))]
    fn worldcover_tile_name(lat: i32, lon: i32, suffix: &str) -> String {
        crate::io::worldcover_tile_name(lat, lon, suffix)
    }

    /// Clean a boolean mask with a JSON operation list such as
    /// `[{"open": 1}, {"close": 2}, "fill_holes"]`
    #[pyfunction]
    #[pyo3(signature = (mask, ops, element = "cross"))]
    fn clean_mask<'py>(
        py: Python<'py>,
        mask: PyReadonlyArray2<bool>,
        ops: &str,
        element: &str,
    ) -> PyResult<&'py PyArray2<bool>> {
        let ops: Vec<MorphOp> =
            serde_json::from_str(ops).map_err(|e| value_error(format!("Invalid operations: {}", e)))?;
        let element = match element.to_lowercase().as_str() {
            "cross" => crate::core::StructuringElement::Cross,
            "square" => crate::core::StructuringElement::Square,
            other => return Err(value_error(format!("Invalid structuring element: {}", other))),
        };

        let cleaner = MorphologicalCleaner::new(ops).with_element(element);
        let cleaned = cleaner.clean_array(&mask.as_array().to_owned());
        Ok(cleaned.into_pyarray(py))
    }

    #[pyfunction]
    fn preprocess_tiles(input_dir: String, output_dir: String) -> PyResult<Vec<String>> {
        let written = crate::io::preprocess_tiles(input_dir.as_ref(), output_dir.as_ref()).map_err(runtime_error)?;
        Ok(written.iter().map(|p| p.display().to_string()).collect())
    }

    /// Run every scene of a JSON config. Returns one JSON report per
    /// successful scene and one message per failed scene.
    #[pyfunction]
    fn run_pipeline(config_path: String) -> PyResult<(Vec<String>, Vec<String>)> {
        let config = PipelineConfig::from_json_file(&config_path).map_err(runtime_error)?;
        let pipeline = LandMaskPipeline::new(config);

        let mut reports = Vec::new();
        let mut failures = Vec::new();
        for result in pipeline.run_batch() {
            match result {
                Ok(report) => reports.push(
                    serde_json::to_string(&report).map_err(|e| runtime_error(SarError::Config(e)))?,
                ),
                Err(e) => failures.push(e.to_string()),
            }
        }
        Ok((reports, failures))
    }
}
