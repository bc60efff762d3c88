use crate::types::{CalvingError, CalvingResult, CoordSeq, Crs};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use geo::Coord;

/// Pointwise coordinate transformation between two reference systems
pub struct Reprojector {
    source: Crs,
    target: Crs,
    /// None when source and target are the same definition
    transform: Option<CoordTransform>,
}

impl Reprojector {
    /// Build a transformation from `source` to `target`
    pub fn new(source: &Crs, target: &Crs) -> CalvingResult<Self> {
        if source == target {
            return Ok(Self {
                source: source.clone(),
                target: target.clone(),
                transform: None,
            });
        }

        let src_ref = Self::spatial_ref(source)?;
        let dst_ref = Self::spatial_ref(target)?;
        let transform = CoordTransform::new(&src_ref, &dst_ref).map_err(|e| {
            CalvingError::ReferenceSystem(format!(
                "No transformation from {} to {}: {}",
                source, target, e
            ))
        })?;

        log::debug!("Created transformation {} -> {}", source, target);

        Ok(Self {
            source: source.clone(),
            target: target.clone(),
            transform: Some(transform),
        })
    }

    /// Parse a CRS definition with x = easting/longitude axis order
    pub fn spatial_ref(crs: &Crs) -> CalvingResult<SpatialRef> {
        let srs = SpatialRef::from_definition(crs.definition()).map_err(|e| {
            CalvingError::ReferenceSystem(format!("Invalid reference system {}: {}", crs, e))
        })?;
        // GDAL 3 honours the authority axis order (lat, lon for EPSG:4326)
        srs.set_axis_mapping_strategy(
            gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER,
        );
        Ok(srs)
    }

    pub fn source(&self) -> &Crs {
        &self.source
    }

    pub fn target(&self) -> &Crs {
        &self.target
    }

    /// Transform every coordinate of the sequence
    ///
    /// The result has the same length and ordering and is tagged with the
    /// target reference system.
    pub fn reproject(&self, seq: &CoordSeq) -> CalvingResult<CoordSeq> {
        if seq.crs != self.source {
            return Err(CalvingError::ReferenceSystem(format!(
                "Sequence is in {}, transformation expects {}",
                seq.crs, self.source
            )));
        }

        let transform = match &self.transform {
            Some(t) => t,
            None => return Ok(CoordSeq::new(seq.coords.clone(), self.target.clone())),
        };

        if seq.is_empty() {
            return Ok(CoordSeq::new(Vec::new(), self.target.clone()));
        }

        let mut xs: Vec<f64> = seq.coords.iter().map(|c| c.x).collect();
        let mut ys: Vec<f64> = seq.coords.iter().map(|c| c.y).collect();
        let mut zs = vec![0.0; seq.len()];

        transform
            .transform_coords(&mut xs, &mut ys, &mut zs)
            .map_err(|e| {
                CalvingError::ReferenceSystem(format!(
                    "Failed to transform {} coordinates from {} to {}: {}",
                    seq.len(),
                    self.source,
                    self.target,
                    e
                ))
            })?;

        let coords = xs
            .into_iter()
            .zip(ys)
            .map(|(x, y)| Coord { x, y })
            .collect();

        Ok(CoordSeq::new(coords, self.target.clone()))
    }
}

/// Reproject a sequence into `target`
pub fn reproject(seq: &CoordSeq, target: &Crs) -> CalvingResult<CoordSeq> {
    Reprojector::new(&seq.crs, target)?.reproject(seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn taan_lines() -> CoordSeq {
        CoordSeq::from_xy(
            &[(-141.25, 60.05), (-141.20, 60.10), (-141.15, 60.12)],
            Crs::wgs84(),
        )
    }

    #[test]
    fn test_round_trip_wgs84_utm() {
        let geographic = taan_lines();
        let utm = reproject(&geographic, &Crs::epsg(32607)).unwrap();

        assert_eq!(utm.len(), geographic.len());
        assert_eq!(utm.crs, Crs::epsg(32607));
        // UTM zone 7N eastings for these longitudes are well inside the zone
        assert!(utm.coords[0].x > 300_000.0 && utm.coords[0].x < 700_000.0);
        assert!(utm.coords[0].y > 6_600_000.0);

        let back = reproject(&utm, &Crs::wgs84()).unwrap();
        for (a, b) in geographic.coords.iter().zip(&back.coords) {
            assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-6);
            assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_ordering_preserved() {
        let utm = reproject(&taan_lines(), &Crs::epsg(32607)).unwrap();
        // Points were traced east and north
        assert!(utm.coords[0].x < utm.coords[1].x && utm.coords[1].x < utm.coords[2].x);
        assert!(utm.coords[0].y < utm.coords[1].y && utm.coords[1].y < utm.coords[2].y);
    }

    #[test]
    fn test_identity_transformation() {
        let seq = taan_lines();
        let same = reproject(&seq, &Crs::wgs84()).unwrap();
        assert_eq!(same, seq);
    }

    #[test]
    fn test_invalid_crs() {
        let result = Reprojector::new(&Crs::wgs84(), &Crs::new("EPSG:999999"));
        assert!(matches!(result, Err(CalvingError::ReferenceSystem(_))));

        let result = Reprojector::new(&Crs::new("not a crs"), &Crs::wgs84());
        assert!(matches!(result, Err(CalvingError::ReferenceSystem(_))));
    }

    #[test]
    fn test_crs_mismatch() {
        let reprojector = Reprojector::new(&Crs::epsg(32607), &Crs::wgs84()).unwrap();
        let result = reprojector.reproject(&taan_lines());
        assert!(matches!(result, Err(CalvingError::ReferenceSystem(_))));
    }
}
