//! Velocity time-series along a centerline

use crate::core::region::{RegionSampler, SamplerConfig};
use crate::core::reproject::Reprojector;
use crate::core::split::points_at_distances;
use crate::io::vector::VectorReader;
use crate::types::{
    AcquisitionDates, CalvingError, CalvingResult, CoordSeq, Crs, PipelineStep,
};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What to do when one product fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the run and report the failing product and step
    Abort,
    /// Log the failure, record a gap and continue with the next product
    SkipAndRecordGap,
}

/// Time-series extraction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesConfig {
    /// Distances from the terminus along the centerline, in local CRS units
    pub distances: Vec<f64>,
    /// Region shape and bands
    pub sampler: SamplerConfig,
    /// CRS of the vector files
    pub data_crs: Crs,
    /// Planar CRS the geometry is processed in
    pub local_crs: Crs,
    /// Centerline geometry file
    pub centerline: PathBuf,
    /// Directory holding one terminus file per date
    pub terminus_dir: PathBuf,
    pub terminus_prefix: String,
    pub terminus_extension: String,
    pub failure_policy: FailurePolicy,
}

impl Default for TimeSeriesConfig {
    fn default() -> Self {
        Self {
            distances: vec![200.0, 750.0, 1500.0],
            sampler: SamplerConfig::default(),
            data_crs: Crs::wgs84(),
            local_crs: Crs::epsg(32607), // UTM zone 7N
            centerline: PathBuf::from("centerline.geojson"),
            terminus_dir: PathBuf::from("."),
            terminus_prefix: "terminus".to_string(),
            terminus_extension: "geojson".to_string(),
            failure_policy: FailurePolicy::Abort,
        }
    }
}

impl TimeSeriesConfig {
    /// Load a run configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> CalvingResult<Self> {
        log::info!("Loading configuration from: {}", path.as_ref().display());
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            CalvingError::Processing(format!(
                "Invalid configuration {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CalvingResult<()> {
        if self.distances.is_empty() {
            return Err(CalvingError::Processing(
                "At least one sample distance is required".to_string(),
            ));
        }
        if let Some(d) = self.distances.iter().find(|d| !d.is_finite() || **d <= 0.0) {
            return Err(CalvingError::Processing(format!(
                "Sample distances must be positive, got {}",
                d
            )));
        }
        // Validates the shape dimensions
        self.sampler.shape.ring(geo::Coord { x: 0.0, y: 0.0 })?;
        if self.sampler.band == 0 {
            return Err(CalvingError::Processing("Bands are numbered from 1".to_string()));
        }
        Ok(())
    }
}

/// One row of the time-series table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRecord {
    pub product: PathBuf,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub midpoint: NaiveDateTime,
    /// One median value per configured distance
    pub values: Vec<f64>,
}

/// A product left out of the table under `FailurePolicy::SkipAndRecordGap`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductGap {
    pub product: PathBuf,
    pub step: PipelineStep,
    pub reason: String,
}

/// Chronological table of sampled values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub distances: Vec<f64>,
    pub records: Vec<TimeSeriesRecord>,
    pub gaps: Vec<ProductGap>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when no product was skipped
    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }

    /// Values sampled at the `index`-th distance, one per record
    ///
    /// None when `index` is not a sampled distance.
    pub fn column(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.distances.len() {
            return None;
        }
        self.records.iter().map(|r| r.values.get(index).copied()).collect()
    }
}

/// Parse the acquisition interval from a product file name
///
/// The first two 8-digit tokens that are valid `YYYYMMDD` dates give the
/// start and end. Other digit runs (times of day, orbit numbers) are skipped.
pub fn parse_acquisition_dates<P: AsRef<Path>>(path: P) -> CalvingResult<AcquisitionDates> {
    let name = path
        .as_ref()
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            CalvingError::NamingConvention(format!("{} has no file name", path.as_ref().display()))
        })?;

    let digits = Regex::new(r"\d+")
        .map_err(|e| CalvingError::Processing(format!("Invalid date pattern: {}", e)))?;
    let dates: Vec<NaiveDate> = digits
        .find_iter(name)
        .map(|m| m.as_str())
        .filter(|token| token.len() == 8)
        .filter_map(|token| NaiveDate::parse_from_str(token, "%Y%m%d").ok())
        .take(2)
        .collect();

    match dates.as_slice() {
        [start, end] if end >= start => Ok(AcquisitionDates {
            start: *start,
            end: *end,
        }),
        [start, end] => Err(CalvingError::NamingConvention(format!(
            "{}: end date {} precedes start date {}",
            name, end, start
        ))),
        _ => Err(CalvingError::NamingConvention(format!(
            "{}: expected two YYYYMMDD dates, found {}",
            name,
            dates.len()
        ))),
    }
}

/// List product files with `extension` in `dir`, sorted by file name
pub fn discover_products<P: AsRef<Path>>(dir: P, extension: &str) -> CalvingResult<Vec<PathBuf>> {
    let mut products = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if path.is_file() && matches {
            products.push(path);
        }
    }
    products.sort();
    log::info!(
        "Found {} .{} products in {}",
        products.len(),
        extension,
        dir.as_ref().display()
    );
    Ok(products)
}

/// Extracts sampled values for a list of raster products
pub struct TimeSeriesDriver {
    config: TimeSeriesConfig,
    sampler: RegionSampler,
}

impl TimeSeriesDriver {
    pub fn new(config: TimeSeriesConfig) -> CalvingResult<Self> {
        config.validate()?;
        let sampler = RegionSampler::with_config(config.sampler.clone());
        Ok(Self { config, sampler })
    }

    pub fn config(&self) -> &TimeSeriesConfig {
        &self.config
    }

    /// Terminus file for a given start date
    pub fn terminus_path(&self, start: NaiveDate) -> PathBuf {
        self.config.terminus_dir.join(format!(
            "{}{}.{}",
            self.config.terminus_prefix,
            start.format("%Y%m%d"),
            self.config.terminus_extension
        ))
    }

    /// Load the centerline and bring it into the local CRS
    pub fn load_centerline(&self) -> CalvingResult<CoordSeq> {
        let centerline = VectorReader::read_geometry(&self.config.centerline, &self.config.data_crs)?;
        Reprojector::new(&centerline.crs, &self.config.local_crs)?.reproject(&centerline)
    }

    /// Process products in the given order
    ///
    /// Under `FailurePolicy::Abort` the first failure ends the run with a
    /// `CalvingError::Pipeline` naming the product and step, and no table is
    /// returned. Records are ordered by midpoint date; the sort is stable, so
    /// equal midpoints keep the input order.
    pub fn run<P: AsRef<Path>>(&self, products: &[P]) -> CalvingResult<TimeSeries> {
        log::info!(
            "Extracting time series from {} products at distances {:?}",
            products.len(),
            self.config.distances
        );

        let centerline = self.load_centerline()?;
        let mut records = Vec::with_capacity(products.len());
        let mut gaps = Vec::new();

        for (i, product) in products.iter().enumerate() {
            let product = product.as_ref();
            log::info!("[{}/{}] {}", i + 1, products.len(), product.display());

            match self.process_product(product, &centerline) {
                Ok(record) => records.push(record),
                Err((step, error)) => match self.config.failure_policy {
                    FailurePolicy::Abort => {
                        return Err(CalvingError::Pipeline {
                            product: product.to_path_buf(),
                            step,
                            source: Box::new(error),
                        })
                    }
                    FailurePolicy::SkipAndRecordGap => {
                        log::warn!("Skipping {}: failed to {}: {}", product.display(), step, error);
                        gaps.push(ProductGap {
                            product: product.to_path_buf(),
                            step,
                            reason: error.to_string(),
                        });
                    }
                },
            }
        }

        records.sort_by_key(|r| r.midpoint);

        log::info!("Time series complete: {} records, {} gaps", records.len(), gaps.len());

        Ok(TimeSeries {
            distances: self.config.distances.clone(),
            records,
            gaps,
        })
    }

    /// Sample one product against its terminus
    pub fn process_product(
        &self,
        product: &Path,
        centerline: &CoordSeq,
    ) -> Result<TimeSeriesRecord, (PipelineStep, CalvingError)> {
        let dates = parse_acquisition_dates(product).map_err(|e| (PipelineStep::ParseDates, e))?;
        let midpoint = dates.midpoint();
        log::debug!("Acquisition {} to {}, midpoint {}", dates.start, dates.end, midpoint);

        let terminus_path = self.terminus_path(dates.start);
        let terminus = VectorReader::read_geometry(&terminus_path, &self.config.data_crs)
            .map_err(|e| (PipelineStep::LoadTerminus, e))?;
        let terminus = Reprojector::new(&terminus.crs, &self.config.local_crs)
            .and_then(|r| r.reproject(&terminus))
            .map_err(|e| (PipelineStep::Reproject, e))?;

        let points = points_at_distances(centerline, &terminus, &self.config.distances)
            .map_err(|e| (PipelineStep::SamplePoints, e))?;

        let mut values = Vec::with_capacity(points.len());
        for point in points.iter() {
            let sample = self
                .sampler
                .sample(product, point.coord(), &points.crs, Some(&terminus))
                .map_err(|e| (PipelineStep::SampleRegion, e))?;
            log::debug!(
                "{} m: median {} over {} pixels",
                point.distance,
                sample.value,
                sample.valid_pixels
            );
            values.push(sample.value);
        }

        Ok(TimeSeriesRecord {
            product: product.to_path_buf(),
            start: dates.start,
            end: dates.end,
            midpoint,
            values,
        })
    }
}
