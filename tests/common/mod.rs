//! Fixture builders shared by the integration tests

#![allow(dead_code)]

use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::DriverManager;
use ndarray::Array2;
use std::path::Path;

/// UTM zone 7N, the local CRS of the Taan fjord fixtures
pub const UTM_7N: u32 = 32607;

/// Fixture rasters: 10 m pixels, 400 x 400, top-left corner here
pub const ORIGIN_X: f64 = 499_000.0;
pub const ORIGIN_Y: f64 = 6_652_000.0;
pub const PIXEL: f64 = 10.0;
pub const SIZE: usize = 400;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Write a multi-band float GeoTIFF in UTM 7N with the fixture geotransform
pub fn write_raster(path: &Path, bands: &[Array2<f32>], nodata: Option<f64>) {
    write_raster_with_crs(path, bands, nodata, true);
}

/// As `write_raster`, optionally leaving the reference system unset
pub fn write_raster_with_crs(path: &Path, bands: &[Array2<f32>], nodata: Option<f64>, with_crs: bool) {
    let driver = DriverManager::get_driver_by_name("GTiff").expect("GTiff driver");
    let (height, width) = bands[0].dim();
    let mut dataset = driver
        .create_with_band_type::<f32, _>(path, width as isize, height as isize, bands.len() as isize)
        .expect("Failed to create raster");

    dataset
        .set_geo_transform(&[ORIGIN_X, PIXEL, 0.0, ORIGIN_Y, 0.0, -PIXEL])
        .expect("Failed to set geotransform");
    if with_crs {
        dataset
            .set_spatial_ref(&SpatialRef::from_epsg(UTM_7N).expect("EPSG:32607"))
            .expect("Failed to set CRS");
    }

    for (i, data) in bands.iter().enumerate() {
        let mut band = dataset.rasterband(i as isize + 1).expect("band");
        let buffer = Buffer::new((width, height), data.iter().cloned().collect());
        band.write((0, 0), (width, height), &buffer).expect("Failed to write band");
        if let Some(nd) = nodata {
            band.set_no_data_value(Some(nd)).expect("Failed to set nodata");
        }
    }
}

/// Raster where every pixel holds `value`
pub fn constant(value: f32) -> Array2<f32> {
    Array2::from_elem((SIZE, SIZE), value)
}

/// Raster whose pixels hold their column index
pub fn column_gradient() -> Array2<f32> {
    Array2::from_shape_fn((SIZE, SIZE), |(_, c)| c as f32)
}

/// GeoJSON FeatureCollection holding one LineString, tagged as UTM 7N
pub fn write_line(path: &Path, points: &[(f64, f64)]) {
    let coords: Vec<String> = points.iter().map(|(x, y)| format!("[{}, {}]", x, y)).collect();
    let json = format!(
        r#"{{"type": "FeatureCollection", "crs": {{"type": "name", "properties": {{"name": "urn:ogc:def:crs:EPSG::{}"}}}}, "features": [{{"type": "Feature", "properties": {{}}, "geometry": {{"type": "LineString", "coordinates": [{}]}}}}]}}"#,
        UTM_7N,
        coords.join(", ")
    );
    std::fs::write(path, json).expect("Failed to write GeoJSON");
}
