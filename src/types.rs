use chrono::{NaiveDate, NaiveDateTime};
use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Coordinate reference system definition
///
/// Any string GDAL accepts through `SetFromUserInput`: `EPSG:4326`,
/// a WKT string, a PROJ string. Two CRS values are considered the same
/// when their definitions are textually identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs(String);

impl Crs {
    /// CRS from any GDAL-understood definition
    pub fn new(definition: impl Into<String>) -> Self {
        Self(definition.into())
    }

    /// CRS from an EPSG code
    pub fn epsg(code: u32) -> Self {
        Self(format!("EPSG:{}", code))
    }

    /// Geographic WGS84 (longitude, latitude)
    pub fn wgs84() -> Self {
        Self::epsg(4326)
    }

    pub fn definition(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // WKT definitions are long, only show the head
        if self.0.chars().count() > 64 {
            write!(f, "{}...", self.0.chars().take(64).collect::<String>())
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Ordered (x, y) coordinates tagged with their reference system
#[derive(Debug, Clone, PartialEq)]
pub struct CoordSeq {
    pub coords: Vec<Coord<f64>>,
    pub crs: Crs,
}

impl CoordSeq {
    pub fn new(coords: Vec<Coord<f64>>, crs: Crs) -> Self {
        Self { coords, crs }
    }

    /// Build from plain (x, y) tuples
    pub fn from_xy(points: &[(f64, f64)], crs: Crs) -> Self {
        Self {
            coords: points.iter().map(|&(x, y)| Coord { x, y }).collect(),
            crs,
        }
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// View as a polyline
    pub fn to_line_string(&self) -> LineString<f64> {
        LineString::from(self.coords.clone())
    }
}

/// Affine geotransform in GDAL order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    pub fn is_north_up(&self) -> bool {
        self.rotation_x == 0.0 && self.rotation_y == 0.0
    }

    /// World coordinate of the centre of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> Coord<f64> {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        Coord {
            x: self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            y: self.top_left_y + c * self.rotation_y + r * self.pixel_height,
        }
    }

    /// Fractional (row, col) of a world coordinate. North-up transforms only.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let col = (x - self.top_left_x) / self.pixel_width;
        let row = (y - self.top_left_y) / self.pixel_height;
        (row, col)
    }

    /// Transform of a window starting at (row_off, col_off)
    pub fn window(&self, row_off: usize, col_off: usize) -> Self {
        let origin_x = self.top_left_x
            + col_off as f64 * self.pixel_width
            + row_off as f64 * self.rotation_x;
        let origin_y = self.top_left_y
            + col_off as f64 * self.rotation_y
            + row_off as f64 * self.pixel_height;
        Self {
            top_left_x: origin_x,
            top_left_y: origin_y,
            ..*self
        }
    }
}

/// Acquisition interval parsed from a product file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionDates {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl AcquisitionDates {
    /// start + (end - start) / 2
    pub fn midpoint(&self) -> NaiveDateTime {
        let start = self.start.and_hms_opt(0, 0, 0).unwrap_or_default();
        let end = self.end.and_hms_opt(0, 0, 0).unwrap_or_default();
        start + (end - start) / 2
    }
}

/// Pipeline step, used to report where a product failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStep {
    ParseDates,
    LoadTerminus,
    Reproject,
    SamplePoints,
    SampleRegion,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStep::ParseDates => write!(f, "parse acquisition dates"),
            PipelineStep::LoadTerminus => write!(f, "load terminus geometry"),
            PipelineStep::Reproject => write!(f, "reproject terminus"),
            PipelineStep::SamplePoints => write!(f, "locate sample points"),
            PipelineStep::SampleRegion => write!(f, "sample raster region"),
        }
    }
}

/// Error types for glacier velocity extraction
#[derive(Debug, thiserror::Error)]
pub enum CalvingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid geometry file: {0}")]
    Format(String),

    #[error("Reference system error: {0}")]
    ReferenceSystem(String),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Raster I/O error: {0}")]
    RasterIo(String),

    #[error("No valid pixels in sampled region: {0}")]
    EmptyRegion(String),

    #[error("File name does not follow the date convention: {0}")]
    NamingConvention(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{product}: failed to {step}: {source}")]
    Pipeline {
        product: PathBuf,
        step: PipelineStep,
        #[source]
        source: Box<CalvingError>,
    },
}

/// Result type for calving operations
pub type CalvingResult<T> = Result<T, CalvingError>;
