//! Polyline intersection

use crate::types::{CalvingError, CalvingResult, CoordSeq};
use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Coord, Distance, Euclidean, Length, Line, Point};

/// Crossings closer than this (in CRS units) are the same point
pub const MERGE_TOLERANCE: f64 = 1e-6;

/// Intersection of two polylines
///
/// Positions are expressed as `segment index + t`, so `1.5` is halfway along
/// the second segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    pub point: Coord<f64>,
    /// Position along the first polyline
    pub pos_a: f64,
    /// Position along the second polyline
    pub pos_b: f64,
}

/// Fraction of the way along `segment` at which `point` lies
fn segment_fraction(segment: &Line<f64>, point: Coord<f64>) -> f64 {
    let length = Euclidean.length(segment);
    let along = Euclidean.distance(Point::from(segment.start), Point::from(point));
    (along / length).clamp(0.0, 1.0)
}

/// All crossings of two coordinate lists, ordered along `a`, duplicates merged
pub fn crossings(a: &[Coord<f64>], b: &[Coord<f64>]) -> Vec<Crossing> {
    let mut found = Vec::new();

    for (i, seg_a) in a.windows(2).enumerate() {
        let line_a = Line::new(seg_a[0], seg_a[1]);
        if Euclidean.length(&line_a) == 0.0 {
            continue;
        }
        for (j, seg_b) in b.windows(2).enumerate() {
            let line_b = Line::new(seg_b[0], seg_b[1]);
            if Euclidean.length(&line_b) == 0.0 {
                continue;
            }
            let points = match line_intersection(line_a, line_b) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => vec![intersection],
                // Overlap: both ends of the shared stretch
                Some(LineIntersection::Collinear { intersection }) => {
                    vec![intersection.start, intersection.end]
                }
                None => continue,
            };
            for point in points {
                found.push(Crossing {
                    point,
                    pos_a: i as f64 + segment_fraction(&line_a, point),
                    pos_b: j as f64 + segment_fraction(&line_b, point),
                });
            }
        }
    }

    found.sort_by(|x, y| x.pos_a.total_cmp(&y.pos_a));

    let mut merged: Vec<Crossing> = Vec::with_capacity(found.len());
    for crossing in found {
        let duplicate = merged.iter().any(|kept| {
            Euclidean.distance(Point::from(kept.point), Point::from(crossing.point)) < MERGE_TOLERANCE
        });
        if !duplicate {
            merged.push(crossing);
        }
    }
    merged
}

/// Intersection points of two lines, ordered along the trace of `a`
///
/// Empty if the lines do not meet. A line crossing the other several times
/// yields one point per crossing.
pub fn find_intersections(a: &CoordSeq, b: &CoordSeq) -> CalvingResult<Vec<Coord<f64>>> {
    if a.crs != b.crs {
        return Err(CalvingError::ReferenceSystem(format!(
            "Cannot intersect lines in {} and {}",
            a.crs, b.crs
        )));
    }
    let points: Vec<Coord<f64>> = crossings(&a.coords, &b.coords)
        .into_iter()
        .map(|c| c.point)
        .collect();
    log::debug!("Found {} intersection(s)", points.len());
    Ok(points)
}
