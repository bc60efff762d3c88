//! calving: glacier velocity time-series from satellite raster products
//!
//! Samples velocity rasters at fixed distances up-glacier of a time-varying
//! terminus line. The centerline is cut by each date's terminus, points are
//! placed along the remaining piece, and a robust (median) value is taken
//! from the raster inside a region around each point.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    AcquisitionDates, CalvingError, CalvingResult, CoordSeq, Crs, GeoTransform, PipelineStep,
};

pub use io::{RasterSource, TableWriter, VectorReader};
pub use crate::core::{
    FailurePolicy, RegionSampler, RegionShape, SamplerConfig, TimeSeries, TimeSeriesConfig,
    TimeSeriesDriver,
};

#[cfg(feature = "python")]
use numpy::{PyArray2, ToPyArray};
#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
fn to_py_err(e: CalvingError) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e))
}

/// Python module definition
#[cfg(feature = "python")]
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyTimeSeries>()?;
    m.add_function(wrap_pyfunction!(extract_time_series, m)?)?;
    m.add_function(wrap_pyfunction!(median_of_region, m)?)?;
    m.add_function(wrap_pyfunction!(mask_displacement_file, m)?)?;
    Ok(())
}

/// Python wrapper for TimeSeries
#[cfg(feature = "python")]
#[pyclass(name = "TimeSeries")]
struct PyTimeSeries {
    inner: TimeSeries,
}

#[cfg(feature = "python")]
#[pymethods]
impl PyTimeSeries {
    #[getter]
    fn distances(&self) -> Vec<f64> {
        self.inner.distances.clone()
    }

    #[getter]
    fn start_dates(&self) -> Vec<String> {
        self.inner.records.iter().map(|r| r.start.to_string()).collect()
    }

    #[getter]
    fn end_dates(&self) -> Vec<String> {
        self.inner.records.iter().map(|r| r.end.to_string()).collect()
    }

    #[getter]
    fn mid_dates(&self) -> Vec<String> {
        self.inner
            .records
            .iter()
            .map(|r| r.midpoint.format("%Y-%m-%dT%H:%M:%S").to_string())
            .collect()
    }

    /// Values as a (records x distances) array
    fn values<'py>(&self, py: Python<'py>) -> &'py PyArray2<f64> {
        let rows = self.inner.records.len();
        let cols = self.inner.distances.len();
        let flat: Vec<f64> = self
            .inner
            .records
            .iter()
            .flat_map(|r| r.values.iter().copied())
            .collect();
        ndarray::Array2::from_shape_vec((rows, cols), flat)
            .unwrap_or_else(|_| ndarray::Array2::zeros((0, cols)))
            .to_pyarray(py)
    }

    /// (product, step, reason) for every skipped product
    #[getter]
    fn gaps(&self) -> Vec<(String, String, String)> {
        self.inner
            .gaps
            .iter()
            .map(|g| (g.product.display().to_string(), g.step.to_string(), g.reason.clone()))
            .collect()
    }

    fn write_csv(&self, path: String) -> PyResult<()> {
        TableWriter::write_csv(&self.inner, &path).map_err(to_py_err)
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __repr__(&self) -> String {
        format!(
            "TimeSeries(records={}, distances={:?}, gaps={})",
            self.inner.len(),
            self.inner.distances,
            self.inner.gaps.len()
        )
    }
}

/// Run the time-series driver from a JSON configuration file
#[cfg(feature = "python")]
#[pyfunction]
fn extract_time_series(config_path: String, products: Vec<String>) -> PyResult<PyTimeSeries> {
    let config = TimeSeriesConfig::from_json_file(&config_path).map_err(to_py_err)?;
    let driver = TimeSeriesDriver::new(config).map_err(to_py_err)?;
    let table = driver.run(products.as_slice()).map_err(to_py_err)?;
    Ok(PyTimeSeries { inner: table })
}

/// Median raster value in a circle around (x, y), optionally clipped by a line
#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(signature = (raster, x, y, crs, radius, line = None))]
fn median_of_region(
    raster: String,
    x: f64,
    y: f64,
    crs: String,
    radius: f64,
    line: Option<Vec<(f64, f64)>>,
) -> PyResult<(f64, Vec<(f64, f64)>)> {
    let crs = Crs::new(crs);
    let cutter = line.map(|points| CoordSeq::from_xy(&points, crs.clone()));
    let sampler = RegionSampler::with_config(SamplerConfig {
        shape: RegionShape::Circle { radius },
        ..Default::default()
    });
    let sample = sampler
        .sample(&raster, geo::Coord { x, y }, &crs, cutter.as_ref())
        .map_err(to_py_err)?;
    let ring = sample.region.ring.coords.iter().map(|c| (c.x, c.y)).collect();
    Ok((sample.value, ring))
}

/// Mask EW/NS displacement by SNR and write a 4-band GeoTIFF
#[cfg(feature = "python")]
#[pyfunction]
#[pyo3(signature = (src, dst, snr = 0.9))]
fn mask_displacement_file(src: String, dst: String, snr: f32) -> PyResult<()> {
    crate::core::DisplacementMasker::new(snr)
        .process_file(&src, &dst)
        .map(|_| ())
        .map_err(to_py_err)
}
