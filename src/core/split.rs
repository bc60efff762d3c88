//! Line splitting and arc-length sampling

use crate::core::intersect::{crossings, MERGE_TOLERANCE};
use crate::types::{CalvingError, CalvingResult, CoordSeq};
use geo::{Coord, Distance, Euclidean, InterpolateLine, InterpolatePoint, Length, LineString, Point};
use serde::{Deserialize, Serialize};

/// Index of the piece sampled after splitting.
///
/// Pieces are ordered along the trace of the line being cut, so the second
/// piece is the one that starts at the first crossing. For a centerline
/// traced from the fjord up-glacier and cut by the terminus, that is the
/// piece on the glacier.
pub const FAR_PIECE: usize = 1;

/// A point at a given arc-length distance along a line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub distance: f64,
    pub x: f64,
    pub y: f64,
}

impl SamplePoint {
    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.x,
            y: self.y,
        }
    }
}

/// Sample points, in request order, in the CRS of the line they came from
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePoints {
    pub points: Vec<SamplePoint>,
    pub crs: crate::types::Crs,
}

impl SamplePoints {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SamplePoint> {
        self.points.iter()
    }
}

/// Euclidean length of a polyline
pub fn line_length(coords: &[Coord<f64>]) -> f64 {
    Euclidean.length(&LineString::from(coords.to_vec()))
}

/// Coordinate at a fractional position (segment index + t)
fn point_at_position(coords: &[Coord<f64>], pos: f64) -> Coord<f64> {
    let last = coords.len() - 1;
    if pos <= 0.0 {
        return coords[0];
    }
    if pos >= last as f64 {
        return coords[last];
    }
    let i = pos.floor() as usize;
    Euclidean
        .point_at_ratio_between(Point::from(coords[i]), Point::from(coords[i + 1]), pos - i as f64)
        .0
}

/// Part of a polyline between two fractional positions, `from <= to`
pub(crate) fn substring(coords: &[Coord<f64>], from: f64, to: f64) -> Vec<Coord<f64>> {
    let mut out = vec![point_at_position(coords, from)];
    let first_vertex = from.floor() as usize + 1;
    for (i, c) in coords.iter().enumerate().skip(first_vertex) {
        if i as f64 >= to {
            break;
        }
        out.push(*c);
    }
    out.push(point_at_position(coords, to));
    out.dedup_by(|a, b| Euclidean.distance(Point::from(*a), Point::from(*b)) < MERGE_TOLERANCE);
    out
}

/// Coordinate at arc-length `distance` from the start of the line
///
/// Distances past the end clamp to the last vertex.
pub fn interpolate(coords: &[Coord<f64>], distance: f64) -> Coord<f64> {
    let line = LineString::from(coords.to_vec());
    let distance = distance.clamp(0.0, Euclidean.length(&line));
    Euclidean
        .point_at_distance_from_start(&line, distance)
        .map(|p| p.0)
        .unwrap_or(coords[coords.len() - 1])
}

/// Split `line` at every intersection with `cutter`
///
/// Pieces are returned in the order the line was traced. A cutter that does
/// not meet the line yields the line itself as the only piece.
pub fn split_line(line: &CoordSeq, cutter: &CoordSeq) -> CalvingResult<Vec<CoordSeq>> {
    split_at_crossings(line, cutter).map(|(pieces, _)| pieces)
}

/// Pieces of `line` cut by `cutter`, with the number of crossings found
fn split_at_crossings(line: &CoordSeq, cutter: &CoordSeq) -> CalvingResult<(Vec<CoordSeq>, usize)> {
    if line.crs != cutter.crs {
        return Err(CalvingError::ReferenceSystem(format!(
            "Cannot split a line in {} with a line in {}",
            line.crs, cutter.crs
        )));
    }
    if line.len() < 2 || cutter.len() < 2 {
        return Err(CalvingError::Geometry(
            "Splitting needs lines with at least two vertices".to_string(),
        ));
    }

    let found = crossings(&line.coords, &cutter.coords);
    let end = (line.len() - 1) as f64;
    let mut cuts: Vec<f64> = found
        .iter()
        .map(|c| c.pos_a)
        .filter(|&pos| pos > 0.0 && pos < end)
        .collect();
    cuts.dedup();

    let mut bounds = Vec::with_capacity(cuts.len() + 2);
    bounds.push(0.0);
    bounds.extend(cuts);
    bounds.push(end);

    let pieces = bounds
        .windows(2)
        .map(|w| substring(&line.coords, w[0], w[1]))
        .filter(|piece| piece.len() >= 2 && line_length(piece) > MERGE_TOLERANCE)
        .map(|piece| CoordSeq::new(piece, line.crs.clone()))
        .collect();

    Ok((pieces, found.len()))
}

/// Points at arc-length `distances` along the far piece of `line` cut by `cutter`
///
/// Distances are measured from the crossing, in the direction the line was
/// traced. A distance longer than the far piece clamps to its end point.
pub fn points_at_distances(
    line: &CoordSeq,
    cutter: &CoordSeq,
    distances: &[f64],
) -> CalvingResult<SamplePoints> {
    if let Some(bad) = distances.iter().find(|d| !d.is_finite() || **d < 0.0) {
        return Err(CalvingError::Geometry(format!(
            "Sample distances must be finite and non-negative, got {}",
            bad
        )));
    }

    let (pieces, crossing_count) = split_at_crossings(line, cutter)?;
    if crossing_count == 0 {
        return Err(CalvingError::Geometry(
            "Cutting line does not intersect the line to cut".to_string(),
        ));
    }
    let far = pieces.get(FAR_PIECE).ok_or_else(|| {
        CalvingError::Geometry(format!(
            "Degenerate split: {} piece(s), the cutting line only touches an end of the line",
            pieces.len()
        ))
    })?;

    let length = line_length(&far.coords);
    log::debug!(
        "Split into {} pieces, sampling piece {} of length {:.1}",
        pieces.len(),
        FAR_PIECE,
        length
    );

    let points = distances
        .iter()
        .map(|&distance| {
            if distance > length {
                log::warn!(
                    "Distance {} exceeds piece length {:.1}, clamping to end point",
                    distance,
                    length
                );
            }
            let c = interpolate(&far.coords, distance);
            SamplePoint {
                distance,
                x: c.x,
                y: c.y,
            }
        })
        .collect();

    Ok(SamplePoints {
        points,
        crs: line.crs.clone(),
    })
}
