use crate::types::{CalvingError, CalvingResult, CoordSeq, Crs};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::LayerAccess;
use gdal::Dataset;
use geo::{Coord, Geometry};
use std::path::Path;

/// Vector geometry reader backed by OGR
pub struct VectorReader;

impl VectorReader {
    /// Read the geometry of the first feature of the first layer
    ///
    /// The CRS comes from the layer when it declares one, `default_crs`
    /// otherwise. GeoJSON layers without a `crs` member report WGS84.
    pub fn read_geometry<P: AsRef<Path>>(path: P, default_crs: &Crs) -> CalvingResult<CoordSeq> {
        let path = path.as_ref();
        log::info!("Reading geometry from: {}", path.display());

        // Unreadable files are I/O errors, unparsable ones format errors
        std::fs::metadata(path)?;
        let dataset = Dataset::open(path).map_err(|e| {
            CalvingError::Format(format!("{}: not a readable vector file: {}", path.display(), e))
        })?;
        let mut layer = dataset
            .layer(0)
            .map_err(|e| CalvingError::Format(format!("{}: no layer: {}", path.display(), e)))?;

        let crs = match layer.spatial_ref() {
            Some(srs) => Self::crs_of(&srs)?,
            None => default_crs.clone(),
        };

        let feature = layer
            .features()
            .next()
            .ok_or_else(|| CalvingError::Format(format!("{}: layer has no features", path.display())))?;
        let geometry = feature
            .geometry()
            .ok_or_else(|| CalvingError::Format(format!("{}: first feature has no geometry", path.display())))?
            .to_geo()
            .map_err(|e| CalvingError::Format(format!("{}: invalid geometry: {}", path.display(), e)))?;

        let coords = Self::geometry_coords(geometry)
            .map_err(|e| CalvingError::Format(format!("{}: {}", path.display(), e)))?;
        log::debug!("Read {} coordinates in {}", coords.len(), crs);
        Ok(CoordSeq::new(coords, crs))
    }

    /// EPSG code when the layer has one, WKT otherwise
    fn crs_of(srs: &SpatialRef) -> CalvingResult<Crs> {
        if let (Ok(name), Ok(code)) = (srs.auth_name(), srs.auth_code()) {
            if name == "EPSG" && code > 0 {
                return Ok(Crs::epsg(code as u32));
            }
        }
        let wkt = srs
            .to_wkt()
            .map_err(|e| CalvingError::ReferenceSystem(format!("Cannot export layer CRS: {}", e)))?;
        Ok(Crs::new(wkt))
    }

    /// Vertices of a line, a polygon's exterior ring or a single-part multiline
    fn geometry_coords(geometry: Geometry<f64>) -> Result<Vec<Coord<f64>>, String> {
        let coords = match geometry {
            Geometry::LineString(line) => line.0,
            Geometry::Polygon(polygon) => polygon.exterior().0.clone(),
            Geometry::MultiLineString(mut multi) => {
                if multi.0.len() != 1 {
                    return Err(format!(
                        "MultiLineString with {} parts, expected exactly one",
                        multi.0.len()
                    ));
                }
                multi.0.remove(0).0
            }
            other => return Err(format!("Unsupported geometry type: {:?}", other)),
        };

        if coords.len() < 2 {
            return Err(format!("Geometry has {} coordinates, expected at least 2", coords.len()));
        }
        Ok(coords)
    }
}
