//! SNR masking of correlation displacement products

use crate::types::{CalvingError, CalvingResult};
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Output band descriptions, in band order
pub const BAND_DESCRIPTIONS: [&str; 4] = [
    "East-West masked",
    "North-South masked",
    "SNR",
    "Magnitude",
];

/// Displacement bands after masking
#[derive(Debug, Clone)]
pub struct MaskedDisplacement {
    pub east_west: Array2<f32>,
    pub north_south: Array2<f32>,
    pub snr: Array2<f32>,
    pub magnitude: Array2<f32>,
}

impl MaskedDisplacement {
    /// Bands in output order
    pub fn bands(&self) -> [&Array2<f32>; 4] {
        [&self.east_west, &self.north_south, &self.snr, &self.magnitude]
    }
}

/// Mask East-West and North-South displacement where SNR is below `threshold`
///
/// Masked pixels become NaN, and so does their magnitude.
pub fn mask_displacement(
    east_west: &Array2<f32>,
    north_south: &Array2<f32>,
    snr: &Array2<f32>,
    threshold: f32,
) -> CalvingResult<MaskedDisplacement> {
    if east_west.dim() != north_south.dim() || east_west.dim() != snr.dim() {
        return Err(CalvingError::Processing(format!(
            "Band shapes differ: EW {:?}, NS {:?}, SNR {:?}",
            east_west.dim(),
            north_south.dim(),
            snr.dim()
        )));
    }

    let mut ew = east_west.clone();
    let mut ns = north_south.clone();
    Zip::from(&mut ew)
        .and(&mut ns)
        .and(snr)
        .for_each(|e, n, &s| {
            if s < threshold {
                *e = f32::NAN;
                *n = f32::NAN;
            }
        });

    let mut magnitude = Array2::<f32>::zeros(ew.dim());
    Zip::from(&mut magnitude)
        .and(&ew)
        .and(&ns)
        .for_each(|m, &e, &n| *m = (e * e + n * n).sqrt());

    Ok(MaskedDisplacement {
        east_west: ew,
        north_south: ns,
        snr: snr.clone(),
        magnitude,
    })
}

/// Masks 3-band (EW, NS, SNR) correlation products and adds a magnitude band
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplacementMasker {
    pub snr_threshold: f32,
}

impl Default for DisplacementMasker {
    fn default() -> Self {
        Self { snr_threshold: 0.9 }
    }
}

impl DisplacementMasker {
    pub fn new(snr_threshold: f32) -> Self {
        Self { snr_threshold }
    }

    /// Read `src` (any GDAL format, ENVI in practice) and write a 4-band GeoTIFF to `dst`
    pub fn process_file<P: AsRef<Path>, Q: AsRef<Path>>(&self, src: P, dst: Q) -> CalvingResult<MaskedDisplacement> {
        log::info!("Masking displacement: {}", src.as_ref().display());
        log::info!("SNR threshold: {}", self.snr_threshold);

        let dataset = Dataset::open(src.as_ref()).map_err(|e| {
            CalvingError::RasterIo(format!("Cannot open {}: {}", src.as_ref().display(), e))
        })?;
        let band_count = dataset.raster_count() as usize;
        if band_count < 3 {
            return Err(CalvingError::Format(format!(
                "{} has {} bands, expected EW, NS and SNR",
                src.as_ref().display(),
                band_count
            )));
        }

        let (width, height) = dataset.raster_size();
        let read_band = |index: isize| -> CalvingResult<Array2<f32>> {
            let band = dataset.rasterband(index)?;
            let buffer = band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
            Array2::from_shape_vec((height, width), buffer.data)
                .map_err(|e| CalvingError::Processing(format!("Failed to reshape band {}: {}", index, e)))
        };

        let east_west = read_band(1)?;
        let north_south = read_band(2)?;
        let snr = read_band(3)?;

        let masked = mask_displacement(&east_west, &north_south, &snr, self.snr_threshold)?;
        let masked_count = masked.east_west.iter().filter(|v| v.is_nan()).count();
        log::debug!("{} of {} pixels masked", masked_count, width * height);

        let geo_transform = dataset.geo_transform().ok();
        let projection = dataset.projection();
        drop(dataset);

        Self::save_geotiff(&masked, geo_transform, &projection, dst.as_ref())?;
        Ok(masked)
    }

    fn save_geotiff(
        masked: &MaskedDisplacement,
        geo_transform: Option<[f64; 6]>,
        projection: &str,
        output_path: &Path,
    ) -> CalvingResult<()> {
        log::info!("Saving masked displacement as GeoTIFF: {}", output_path.display());

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let (height, width) = masked.magnitude.dim();

        let mut dataset = driver.create_with_band_type::<f32, _>(
            output_path,
            width as isize,
            height as isize,
            BAND_DESCRIPTIONS.len() as isize,
        )?;

        if let Some(gt) = geo_transform {
            dataset.set_geo_transform(&gt)?;
        }
        if !projection.is_empty() {
            dataset.set_projection(projection)?;
        }

        for (i, (data, description)) in masked.bands().iter().zip(BAND_DESCRIPTIONS).enumerate() {
            let mut rasterband = dataset.rasterband(i as isize + 1)?;
            let flat_data: Vec<f32> = data.iter().cloned().collect();
            let buffer = Buffer::new((width, height), flat_data);
            rasterband.write((0, 0), (width, height), &buffer)?;
            rasterband.set_description(description)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_low_snr_pixels_masked() {
        let ew = array![[3.0_f32, 1.0], [0.5, -2.0]];
        let ns = array![[4.0_f32, 1.0], [0.5, 0.0]];
        let snr = array![[0.95_f32, 0.2], [0.9, 0.89]];

        let masked = mask_displacement(&ew, &ns, &snr, 0.9).unwrap();

        assert_abs_diff_eq!(masked.magnitude[[0, 0]], 5.0, epsilon = 1e-6);
        assert!(masked.east_west[[0, 1]].is_nan());
        assert!(masked.north_south[[0, 1]].is_nan());
        assert!(masked.magnitude[[0, 1]].is_nan());
        // Threshold itself passes
        assert_eq!(masked.east_west[[1, 0]], 0.5);
        assert!(masked.magnitude[[1, 1]].is_nan());
        // SNR is carried through untouched
        assert_eq!(masked.snr, snr);
    }

    #[test]
    fn test_shape_mismatch() {
        let ew = Array2::<f32>::zeros((2, 2));
        let ns = Array2::<f32>::zeros((2, 3));
        let snr = Array2::<f32>::ones((2, 2));
        assert!(matches!(
            mask_displacement(&ew, &ns, &snr, 0.9),
            Err(CalvingError::Processing(_))
        ));
    }

    #[test]
    fn test_default_threshold() {
        assert_eq!(DisplacementMasker::default().snr_threshold, 0.9);
    }
}
