mod common;

use approx::assert_abs_diff_eq;
use calving::core::{QualityMask, RegionSampler, RegionShape, SamplerConfig};
use calving::io::RasterSource;
use calving::{CalvingError, CoordSeq, Crs};
use common::*;
use geo::Coord;

fn utm() -> Crs {
    Crs::epsg(UTM_7N)
}

/// Terminus running north-south at x = 500 000
fn terminus() -> CoordSeq {
    CoordSeq::from_xy(&[(500_000.0, 6_649_000.0), (500_000.0, 6_651_000.0)], utm())
}

#[test]
fn test_constant_raster_median() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vel_20190108_20190120.tif");
    write_raster(&path, &[constant(2.5)], None);

    let sample = RegionSampler::new()
        .sample(&path, Coord { x: 500_750.0, y: 6_650_000.0 }, &utm(), None)
        .unwrap();

    assert_abs_diff_eq!(sample.value, 2.5, epsilon = 1e-6);
    // About π·100² / 10² pixels
    assert!(sample.valid_pixels > 300 && sample.valid_pixels < 330);
    assert!(!sample.region.clipped);
    assert_eq!(sample.region.ring.crs, utm());
}

#[test]
fn test_symmetric_region_on_gradient() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gradient.tif");
    write_raster(&path, &[column_gradient()], None);

    // Column 119.5 sits at x = 500 200
    let sample = RegionSampler::new()
        .sample(&path, Coord { x: 500_200.0, y: 6_650_000.0 }, &utm(), Some(&terminus()))
        .unwrap();

    assert!(!sample.region.clipped);
    assert_abs_diff_eq!(sample.value, 119.5, epsilon = 1e-6);
}

#[test]
fn test_clipped_region_excludes_far_side() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gradient.tif");
    write_raster(&path, &[column_gradient()], None);
    let sampler = RegionSampler::new();
    let center = Coord { x: 500_030.0, y: 6_650_000.0 };

    let full = sampler.sample(&path, center, &utm(), None).unwrap();
    let clipped = sampler.sample(&path, center, &utm(), Some(&terminus())).unwrap();

    assert!(clipped.region.clipped);
    assert!(clipped.region.boundary_length() < full.region.boundary_length());
    assert!(clipped.valid_pixels < full.valid_pixels);
    // Only pixels east of the terminus (column 100 onwards) remain
    assert!(clipped.value > full.value);
    assert!(clipped.value >= 100.0);
}

#[test]
fn test_region_clamped_at_raster_edge() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edge.tif");
    write_raster(&path, &[constant(7.0)], None);
    let sampler = RegionSampler::with_config(SamplerConfig {
        shape: RegionShape::Square { side: 100.0 },
        ..Default::default()
    });

    let inside = sampler
        .sample(&path, Coord { x: 500_000.0, y: 6_650_000.0 }, &utm(), None)
        .unwrap();
    assert_eq!(inside.valid_pixels, 100);

    // Half of the square hangs over the western edge
    let edge = sampler
        .sample(&path, Coord { x: ORIGIN_X, y: 6_650_000.0 }, &utm(), None)
        .unwrap();
    assert_eq!(edge.valid_pixels, 50);
    assert_abs_diff_eq!(edge.value, 7.0, epsilon = 1e-6);
}

#[test]
fn test_region_outside_raster_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outside.tif");
    write_raster(&path, &[constant(1.0)], None);

    let result = RegionSampler::new().sample(&path, Coord { x: 600_000.0, y: 6_650_000.0 }, &utm(), None);
    assert!(matches!(result, Err(CalvingError::EmptyRegion(_))));
}

#[test]
fn test_nodata_region_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nodata.tif");
    write_raster(&path, &[constant(-9999.0)], Some(-9999.0));

    let result = RegionSampler::new().sample(&path, Coord { x: 500_750.0, y: 6_650_000.0 }, &utm(), None);
    assert!(matches!(result, Err(CalvingError::EmptyRegion(_))));
}

#[test]
fn test_low_snr_region_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snr.tif");
    write_raster(&path, &[constant(3.0), constant(0.5)], None);
    let center = Coord { x: 500_750.0, y: 6_650_000.0 };

    let masked = RegionSampler::with_config(SamplerConfig {
        quality: Some(QualityMask { band: 2, threshold: 0.9 }),
        ..Default::default()
    });
    let result = masked.sample(&path, center, &utm(), None);
    assert!(matches!(result, Err(CalvingError::EmptyRegion(_))));

    let lenient = RegionSampler::with_config(SamplerConfig {
        quality: Some(QualityMask { band: 2, threshold: 0.4 }),
        ..Default::default()
    });
    assert_abs_diff_eq!(lenient.sample(&path, center, &utm(), None).unwrap().value, 3.0, epsilon = 1e-6);
}

#[test]
fn test_geographic_point_reprojected_to_raster() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("geographic.tif");
    write_raster(&path, &[constant(4.0)], None);

    // Region built in UTM, reprojected to WGS84 and back to UTM for the raster
    let center_utm = CoordSeq::from_xy(&[(500_750.0, 6_650_000.0)], utm());
    let center_geo = calving::core::reproject(&center_utm, &Crs::wgs84()).unwrap();
    let sampler = RegionSampler::with_config(SamplerConfig {
        // roughly 100 m in degrees of latitude
        shape: RegionShape::Square { side: 0.0018 },
        ..Default::default()
    });

    let sample = sampler
        .sample(&path, center_geo.coords[0], &Crs::wgs84(), None)
        .unwrap();
    assert_abs_diff_eq!(sample.value, 4.0, epsilon = 1e-6);
    assert_eq!(sample.region.ring.crs, Crs::wgs84());
}

#[test]
fn test_missing_raster_is_raster_io_error() {
    let result = RegionSampler::new().sample(
        "/nonexistent/vel_20190108_20190120.tif",
        Coord { x: 500_750.0, y: 6_650_000.0 },
        &utm(),
        None,
    );
    assert!(matches!(result, Err(CalvingError::RasterIo(_))));
}

#[test]
fn test_pixel_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.tif");
    write_raster(&path, &[constant(0.0)], None);

    let raster = RasterSource::open(&path).unwrap();
    assert_eq!(raster.size(), (SIZE, SIZE));
    assert_eq!(raster.band_count(), 1);
    assert_eq!(raster.pixel_index(ORIGIN_X + 15.0, ORIGIN_Y - 25.0), Some((2, 1)));
    assert_eq!(raster.pixel_index(ORIGIN_X - 1.0, ORIGIN_Y - 25.0), None);
    assert_eq!(raster.pixel_index(ORIGIN_X + 15.0, ORIGIN_Y - 4_001.0), None);
}

#[test]
fn test_raster_without_crs_is_reference_system_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no_crs.tif");
    write_raster_with_crs(&path, &[constant(1.0)], None, false);

    let result = RegionSampler::new().sample(&path, Coord { x: 500_750.0, y: 6_650_000.0 }, &utm(), None);
    assert!(matches!(result, Err(CalvingError::ReferenceSystem(_))));
}
