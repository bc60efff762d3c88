use crate::types::{CalvingError, CalvingResult, Crs, GeoTransform};
use gdal::Dataset;
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Pixel window into a raster, clamped to the raster extent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

/// Block of one band read from a raster
#[derive(Debug, Clone)]
pub struct RasterWindow {
    pub data: Array2<f64>,
    /// Geotransform of the window's top-left pixel
    pub transform: GeoTransform,
    pub nodata: Option<f64>,
}

impl RasterWindow {
    pub fn new(data: Array2<f64>, transform: GeoTransform, nodata: Option<f64>) -> Self {
        Self {
            data,
            transform,
            nodata,
        }
    }

    /// Finite and not nodata
    pub fn is_valid(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self.nodata {
            Some(nd) if nd.is_nan() => true,
            Some(nd) => value != nd,
            None => true,
        }
    }
}

/// Read-only raster product
///
/// Owns the GDAL dataset handle; the handle is closed when the source is
/// dropped, including on early error returns.
pub struct RasterSource {
    path: PathBuf,
    dataset: Dataset,
    transform: GeoTransform,
    width: usize,
    height: usize,
}

impl RasterSource {
    /// Open a raster product
    pub fn open<P: AsRef<Path>>(path: P) -> CalvingResult<Self> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening raster: {}", path.display());

        let dataset = Dataset::open(&path).map_err(|e| {
            CalvingError::RasterIo(format!("Cannot open {}: {}", path.display(), e))
        })?;
        let transform = dataset.geo_transform().map_err(|e| {
            CalvingError::RasterIo(format!("{} has no geotransform: {}", path.display(), e))
        })?;
        let (width, height) = dataset.raster_size();

        log::debug!("Raster size: {}x{}", width, height);
        log::debug!("Raster geotransform: {:?}", transform);

        Ok(Self {
            path,
            dataset,
            transform: GeoTransform::from_gdal(transform),
            width,
            height,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn transform(&self) -> GeoTransform {
        self.transform
    }

    /// (width, height) in pixels
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn band_count(&self) -> usize {
        self.dataset.raster_count() as usize
    }

    /// Native reference system of the raster
    pub fn crs(&self) -> CalvingResult<Crs> {
        let srs = self.dataset.spatial_ref().map_err(|e| {
            CalvingError::ReferenceSystem(format!(
                "{} has no reference system: {}",
                self.path.display(),
                e
            ))
        })?;
        let wkt = srs
            .to_wkt()
            .map_err(|e| CalvingError::ReferenceSystem(format!("Cannot export WKT: {}", e)))?;
        if wkt.trim().is_empty() {
            return Err(CalvingError::ReferenceSystem(format!(
                "{} has no reference system",
                self.path.display()
            )));
        }
        Ok(Crs::new(wkt))
    }

    /// (row, col) of the pixel containing a world coordinate, None if outside
    pub fn pixel_index(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (row, col) = self.transform.world_to_pixel(x, y);
        if !(row >= 0.0 && col >= 0.0) {
            return None;
        }
        let (row, col) = (row.floor() as usize, col.floor() as usize);
        (row < self.height && col < self.width).then_some((row, col))
    }

    /// Pixel window covering a world bounding box, clamped to the raster edges
    ///
    /// Returns None when the box lies entirely outside the raster.
    pub fn window_for_bounds(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Option<PixelWindow> {
        let (r0, c0) = self.transform.world_to_pixel(min_x, max_y);
        let (r1, c1) = self.transform.world_to_pixel(max_x, min_y);

        let row_start = r0.min(r1).floor().max(0.0);
        let row_end = r0.max(r1).ceil().min(self.height as f64);
        let col_start = c0.min(c1).floor().max(0.0);
        let col_end = c0.max(c1).ceil().min(self.width as f64);

        if row_end <= row_start || col_end <= col_start {
            return None;
        }

        Some(PixelWindow {
            row_off: row_start as usize,
            col_off: col_start as usize,
            rows: (row_end - row_start) as usize,
            cols: (col_end - col_start) as usize,
        })
    }

    /// Read a window of one band (1-based band index)
    pub fn read_window(&self, band: usize, window: &PixelWindow) -> CalvingResult<RasterWindow> {
        if band == 0 || band > self.band_count() {
            return Err(CalvingError::RasterIo(format!(
                "{} has {} bands, band {} requested",
                self.path.display(),
                self.band_count(),
                band
            )));
        }

        let rasterband = self.dataset.rasterband(band as isize).map_err(|e| {
            CalvingError::RasterIo(format!("Cannot access band {}: {}", band, e))
        })?;
        let nodata = rasterband.no_data_value();
        let buffer = rasterband
            .read_as::<f64>(
                (window.col_off as isize, window.row_off as isize),
                (window.cols, window.rows),
                (window.cols, window.rows),
                None,
            )
            .map_err(|e| CalvingError::RasterIo(format!("Failed to read band {}: {}", band, e)))?;

        let data = Array2::from_shape_vec((window.rows, window.cols), buffer.data)
            .map_err(|e| CalvingError::RasterIo(format!("Failed to reshape band data: {}", e)))?;

        Ok(RasterWindow::new(
            data,
            self.transform.window(window.row_off, window.col_off),
            nodata,
        ))
    }

    /// Read a whole band (1-based band index)
    pub fn read_band(&self, band: usize) -> CalvingResult<RasterWindow> {
        self.read_window(
            band,
            &PixelWindow {
                row_off: 0,
                col_off: 0,
                rows: self.height,
                cols: self.width,
            },
        )
    }
}

impl Drop for RasterSource {
    fn drop(&mut self) {
        log::debug!("Closing raster: {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_validity() {
        let transform = GeoTransform::from_gdal([0.0, 1.0, 0.0, 10.0, 0.0, -1.0]);
        let window = RasterWindow::new(Array2::zeros((2, 2)), transform, Some(-9999.0));
        assert!(window.is_valid(0.0));
        assert!(!window.is_valid(-9999.0));
        assert!(!window.is_valid(f64::NAN));

        let window = RasterWindow::new(Array2::zeros((2, 2)), transform, Some(f64::NAN));
        assert!(window.is_valid(1.5));
        assert!(!window.is_valid(f64::NAN));
    }

    #[test]
    fn test_pixel_index_rejects_nan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.tif");
        let driver = gdal::DriverManager::get_driver_by_name("GTiff").unwrap();
        let mut dataset = driver.create_with_band_type::<f32, _>(&path, 4, 4, 1).unwrap();
        dataset.set_geo_transform(&[0.0, 1.0, 0.0, 4.0, 0.0, -1.0]).unwrap();
        drop(dataset);

        let raster = RasterSource::open(&path).unwrap();
        assert_eq!(raster.pixel_index(0.5, 3.5), Some((0, 0)));
        assert_eq!(raster.pixel_index(f64::NAN, 3.5), None);
        assert_eq!(raster.pixel_index(0.5, f64::NAN), None);
        assert_eq!(raster.pixel_index(f64::INFINITY, 3.5), None);
    }

    #[test]
    fn test_open_missing_raster() {
        let result = RasterSource::open("/nonexistent/velocity.tif");
        assert!(matches!(result, Err(CalvingError::RasterIo(_))));
    }
}
