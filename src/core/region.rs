//! Region sampling: robust raster statistics around a point

use crate::core::intersect::crossings;
use crate::core::reproject::Reprojector;
use crate::core::split::{line_length, substring};
use crate::io::raster::{RasterSource, RasterWindow};
use crate::types::{CalvingError, CalvingResult, CoordSeq, Crs};
use geo::{BoundingRect, Contains, Coord, Euclidean, Length, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;

/// Number of vertices approximating a circle
pub const CIRCLE_VERTICES: usize = 64;

/// Relative tolerance under which two clipped parts count as equally long
pub const TIE_TOLERANCE: f64 = 1e-9;

/// Shape of the sampling region, in units of the point's CRS
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RegionShape {
    /// Circle of the given radius
    Circle { radius: f64 },
    /// Axis-aligned square of the given side length
    Square { side: f64 },
}

impl RegionShape {
    /// Closed boundary ring centred on `center`
    ///
    /// Circle vertex `k` sits at angle `2πk / 64`, vertex 0 due east of the
    /// centre. Squares start at their south-east corner. Both rings run
    /// counter-clockwise.
    pub fn ring(&self, center: Coord<f64>) -> CalvingResult<Vec<Coord<f64>>> {
        let mut ring = match *self {
            RegionShape::Circle { radius } => {
                if !(radius.is_finite() && radius > 0.0) {
                    return Err(CalvingError::Geometry(format!(
                        "Circle radius must be positive, got {}",
                        radius
                    )));
                }
                (0..CIRCLE_VERTICES)
                    .map(|k| {
                        let angle = 2.0 * PI * k as f64 / CIRCLE_VERTICES as f64;
                        Coord {
                            x: center.x + radius * angle.cos(),
                            y: center.y + radius * angle.sin(),
                        }
                    })
                    .collect::<Vec<_>>()
            }
            RegionShape::Square { side } => {
                if !(side.is_finite() && side > 0.0) {
                    return Err(CalvingError::Geometry(format!(
                        "Square side must be positive, got {}",
                        side
                    )));
                }
                let h = side / 2.0;
                vec![
                    Coord { x: center.x + h, y: center.y - h },
                    Coord { x: center.x + h, y: center.y + h },
                    Coord { x: center.x - h, y: center.y + h },
                    Coord { x: center.x - h, y: center.y - h },
                ]
            }
        };
        ring.push(ring[0]);
        Ok(ring)
    }
}

/// Per-pixel quality threshold, e.g. an SNR band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMask {
    /// 1-based band index holding the quality metric
    pub band: usize,
    /// Pixels whose quality is below this value are invalid
    pub threshold: f64,
}

/// Region sampling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub shape: RegionShape,
    /// 1-based band index to sample
    pub band: usize,
    #[serde(default)]
    pub quality: Option<QualityMask>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            shape: RegionShape::Circle { radius: 100.0 }, // meters
            band: 1,
            quality: None,
        }
    }
}

/// Sampling region around one point
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRegion {
    /// Closed boundary ring
    pub ring: CoordSeq,
    /// Whether a cutting line removed part of the shape
    pub clipped: bool,
}

impl SampleRegion {
    pub fn boundary_length(&self) -> f64 {
        Euclidean.length(&self.ring.to_line_string())
    }

    pub fn polygon(&self) -> Polygon<f64> {
        Polygon::new(LineString::from(self.ring.coords.clone()), vec![])
    }
}

/// Result of sampling a raster inside a region
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSample {
    /// Median of the valid pixels
    pub value: f64,
    /// Number of pixels the median was taken over
    pub valid_pixels: usize,
    /// The region, in the CRS of the sampled point
    pub region: SampleRegion,
}

/// Split a closed ring by a polyline crossing it exactly twice
///
/// Returns `None` when the line crosses the boundary fewer than two times.
/// The first part is the one holding the ring's starting vertex.
pub fn split_ring(
    ring: &[Coord<f64>],
    cutter: &[Coord<f64>],
) -> CalvingResult<Option<(Vec<Coord<f64>>, Vec<Coord<f64>>)>> {
    let found = crossings(ring, cutter);
    match found.len() {
        0 | 1 => return Ok(None),
        2 => {}
        n => {
            return Err(CalvingError::Geometry(format!(
                "Cutting line crosses the region boundary {} times, expected 2",
                n
            )))
        }
    }

    let (first, second) = (found[0], found[1]);
    let end = (ring.len() - 1) as f64;

    // Cutter path from the first crossing to the second
    let chord = if first.pos_b <= second.pos_b {
        substring(cutter, first.pos_b, second.pos_b)
    } else {
        let mut path = substring(cutter, second.pos_b, first.pos_b);
        path.reverse();
        path
    };

    let mut outer = substring(ring, second.pos_a, end);
    outer.extend(substring(ring, 0.0, first.pos_a).into_iter().skip(1));
    outer.extend(chord.iter().skip(1));
    outer.dedup();

    let mut inner = substring(ring, first.pos_a, second.pos_a);
    inner.extend(chord.iter().rev().skip(1));
    inner.dedup();

    Ok(Some((outer, inner)))
}

/// Build the sampling region around `center`, clipped by `cutter` if it crosses
///
/// When clipped, the part with the longer boundary is kept. The second part
/// must be longer by more than `TIE_TOLERANCE` of the unclipped perimeter;
/// otherwise the first part (holding the ring's starting vertex) is kept.
pub fn build_region(
    center: Coord<f64>,
    crs: &Crs,
    shape: &RegionShape,
    cutter: Option<&CoordSeq>,
) -> CalvingResult<SampleRegion> {
    let ring = shape.ring(center)?;

    let cutter = match cutter {
        Some(c) => c,
        None => {
            return Ok(SampleRegion {
                ring: CoordSeq::new(ring, crs.clone()),
                clipped: false,
            })
        }
    };

    if &cutter.crs != crs {
        return Err(CalvingError::ReferenceSystem(format!(
            "Cutting line is in {}, region in {}",
            cutter.crs, crs
        )));
    }

    let perimeter = line_length(&ring);
    match split_ring(&ring, &cutter.coords)? {
        Some((first, second)) => {
            let first_len = line_length(&first);
            let second_len = line_length(&second);
            log::debug!(
                "Line cuts region: part lengths {:.2} / {:.2}",
                first_len,
                second_len
            );
            let kept = if second_len > first_len + TIE_TOLERANCE * perimeter {
                second
            } else {
                first
            };
            Ok(SampleRegion {
                ring: CoordSeq::new(kept, crs.clone()),
                clipped: true,
            })
        }
        None => {
            log::debug!("Line does not cut region, keeping full shape");
            Ok(SampleRegion {
                ring: CoordSeq::new(ring, crs.clone()),
                clipped: false,
            })
        }
    }
}

/// Median of a slice; mean of the two middle values for even lengths
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Median of the valid window pixels whose centre lies inside `polygon`
///
/// With a quality window, pixels whose quality is invalid or below
/// `threshold` are skipped too. Returns the median and the pixel count.
pub fn masked_median(
    window: &RasterWindow,
    polygon: &Polygon<f64>,
    quality: Option<(&RasterWindow, f64)>,
) -> CalvingResult<(f64, usize)> {
    if let Some((q, _)) = quality {
        if q.data.dim() != window.data.dim() {
            return Err(CalvingError::Processing(format!(
                "Quality window {:?} does not match data window {:?}",
                q.data.dim(),
                window.data.dim()
            )));
        }
    }

    let mut values = Vec::new();
    for ((row, col), &value) in window.data.indexed_iter() {
        if !window.is_valid(value) {
            continue;
        }
        if let Some((q, threshold)) = quality {
            let snr = q.data[[row, col]];
            if !q.is_valid(snr) || snr < threshold {
                continue;
            }
        }
        let center = window.transform.pixel_center(row, col);
        if polygon.contains(&Point::from(center)) {
            values.push(value);
        }
    }

    let count = values.len();
    median(&mut values)
        .map(|m| (m, count))
        .ok_or_else(|| {
            CalvingError::EmptyRegion(format!(
                "{} pixels in window, none valid inside the region",
                window.data.len()
            ))
        })
}

/// Samples a raster product around points
pub struct RegionSampler {
    config: SamplerConfig,
}

impl RegionSampler {
    /// Create a sampler with default parameters (100 m circle, band 1)
    pub fn new() -> Self {
        Self {
            config: SamplerConfig::default(),
        }
    }

    /// Create a sampler with custom parameters
    pub fn with_config(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Median raster value around `center`
    ///
    /// The region is built in `center_crs`, optionally clipped by `cutter`
    /// (which must share that CRS), reprojected into the raster's CRS and
    /// used to mask the raster. The raster is opened and closed within
    /// this call. The returned region stays in `center_crs`.
    pub fn sample<P: AsRef<Path>>(
        &self,
        raster_path: P,
        center: Coord<f64>,
        center_crs: &Crs,
        cutter: Option<&CoordSeq>,
    ) -> CalvingResult<RegionSample> {
        let region = build_region(center, center_crs, &self.config.shape, cutter)?;
        log::debug!(
            "Region around ({:.1}, {:.1}): {} vertices, clipped: {}",
            center.x,
            center.y,
            region.ring.len(),
            region.clipped
        );

        let raster = RasterSource::open(raster_path.as_ref())?;
        let transform = raster.transform();
        if !transform.is_north_up() {
            return Err(CalvingError::RasterIo(format!(
                "{} has a rotated geotransform",
                raster.path().display()
            )));
        }

        let raster_crs = raster.crs()?;
        let ring = Reprojector::new(center_crs, &raster_crs)?.reproject(&region.ring)?;

        let pixel_window = ring
            .to_line_string()
            .bounding_rect()
            .and_then(|rect| {
                raster.window_for_bounds(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
            })
            .ok_or_else(|| {
                CalvingError::EmptyRegion(format!("Region lies outside {}", raster.path().display()))
            })?;
        log::debug!("Reading window {:?}", pixel_window);

        let data = raster.read_window(self.config.band, &pixel_window)?;
        let quality = match self.config.quality {
            Some(mask) => Some((raster.read_window(mask.band, &pixel_window)?, mask.threshold)),
            None => None,
        };
        drop(raster);

        let polygon = Polygon::new(LineString::from(ring.coords), vec![]);
        let (value, valid_pixels) = masked_median(
            &data,
            &polygon,
            quality.as_ref().map(|(q, t)| (q, *t)),
        )?;

        log::debug!("Median {} over {} pixels", value, valid_pixels);

        Ok(RegionSample {
            value,
            valid_pixels,
            region,
        })
    }
}

impl Default for RegionSampler {
    fn default() -> Self {
        Self::new()
    }
}
