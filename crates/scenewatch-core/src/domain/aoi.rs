//! Areas of interest and their geometry.
//!
//! AOI records arrive as JSON with either a GeoJSON `Polygon` geometry, a
//! bare `bbox`, or both. After [`Aoi::from_record`] every AOI has both a
//! validated polygon and a bounding box.

use serde::{Deserialize, Serialize};

use super::ids::{AoiId, InvalidAoiId};

/// `[lon, lat]` in EPSG:4326.
pub type Position = [f64; 2];

/// A closed ring: first and last positions are identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinearRing(Vec<Position>);

impl LinearRing {
    pub fn new(positions: Vec<Position>) -> Result<Self, AoiError> {
        if positions.len() < 4 {
            return Err(AoiError::RingTooShort(positions.len()));
        }
        if positions.first() != positions.last() {
            return Err(AoiError::RingNotClosed);
        }
        if positions
            .iter()
            .any(|[lon, lat]| !(-180.0..=180.0).contains(lon) || !(-90.0..=90.0).contains(lat))
        {
            return Err(AoiError::OutOfRange);
        }
        Ok(Self(positions))
    }

    pub fn positions(&self) -> &[Position] {
        &self.0
    }
}

/// Polygon as a list of rings; the first ring is the outer boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon(Vec<LinearRing>);

impl Polygon {
    pub fn new(rings: Vec<LinearRing>) -> Result<Self, AoiError> {
        if rings.is_empty() {
            return Err(AoiError::EmptyPolygon);
        }
        Ok(Self(rings))
    }

    pub fn rings(&self) -> &[LinearRing] {
        &self.0
    }

    pub fn outer(&self) -> &LinearRing {
        &self.0[0]
    }

    /// Bounding box of the outer ring.
    pub fn bbox(&self) -> BoundingBox {
        let mut bbox = BoundingBox {
            min_lon: f64::INFINITY,
            min_lat: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            max_lat: f64::NEG_INFINITY,
        };
        for [lon, lat] in self.outer().positions() {
            bbox.min_lon = bbox.min_lon.min(*lon);
            bbox.min_lat = bbox.min_lat.min(*lat);
            bbox.max_lon = bbox.max_lon.max(*lon);
            bbox.max_lat = bbox.max_lat.max(*lat);
        }
        bbox
    }

    /// GeoJSON geometry object for request payloads.
    pub fn to_geojson(&self) -> serde_json::Value {
        serde_json::json!({ "type": "Polygon", "coordinates": self.0 })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[f64; 4]", try_from = "[f64; 4]")]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn to_array(self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }

    /// Rectangle polygon covering this box (counter-clockwise, closed).
    pub fn to_polygon(self) -> Polygon {
        let ring = vec![
            [self.min_lon, self.min_lat],
            [self.max_lon, self.min_lat],
            [self.max_lon, self.max_lat],
            [self.min_lon, self.max_lat],
            [self.min_lon, self.min_lat],
        ];
        Polygon(vec![LinearRing(ring)])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        bbox.to_array()
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = AoiError;

    fn try_from([min_lon, min_lat, max_lon, max_lat]: [f64; 4]) -> Result<Self, Self::Error> {
        if min_lon > max_lon || min_lat > max_lat {
            return Err(AoiError::InvertedBbox);
        }
        let bbox = Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        };
        // reuse ring range checks
        LinearRing::new(bbox.to_polygon().outer().positions().to_vec())?;
        Ok(bbox)
    }
}

/// Raw AOI record as stored in the AOI file.
#[derive(Debug, Clone, Deserialize)]
pub struct AoiRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
    #[serde(default)]
    pub geometry: Option<GeometryRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeometryRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<Vec<Position>>,
}

/// A monitored area. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aoi {
    pub id: AoiId,
    pub name: String,
    pub polygon: Polygon,
    pub bbox: BoundingBox,
}

impl Aoi {
    pub fn new(id: AoiId, name: impl Into<String>, polygon: Polygon) -> Self {
        let bbox = polygon.bbox();
        Self {
            id,
            name: name.into(),
            polygon,
            bbox,
        }
    }

    pub fn from_record(record: AoiRecord) -> Result<Self, AoiError> {
        let id = AoiId::parse(record.id)?;
        let bbox = record.bbox.map(BoundingBox::try_from).transpose()?;

        let polygon = match record.geometry {
            Some(geometry) => {
                if geometry.kind != "Polygon" {
                    return Err(AoiError::UnsupportedGeometry(geometry.kind));
                }
                let rings = geometry
                    .coordinates
                    .into_iter()
                    .map(LinearRing::new)
                    .collect::<Result<Vec<_>, _>>()?;
                Polygon::new(rings)?
            }
            None => bbox.ok_or(AoiError::MissingGeometry)?.to_polygon(),
        };

        let bbox = bbox.unwrap_or_else(|| polygon.bbox());
        Ok(Self {
            id,
            name: record.name,
            polygon,
            bbox,
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AoiError {
    #[error(transparent)]
    InvalidId(#[from] InvalidAoiId),

    #[error("AOI must have a bbox or a Polygon geometry")]
    MissingGeometry,

    #[error("geometry type must be 'Polygon', got {0:?}")]
    UnsupportedGeometry(String),

    #[error("polygon has no rings")]
    EmptyPolygon,

    #[error("linear ring needs at least 4 positions, got {0}")]
    RingTooShort(usize),

    #[error("linear ring is not closed")]
    RingNotClosed,

    #[error("coordinates out of lon/lat range")]
    OutOfRange,

    #[error("bbox min exceeds max")]
    InvertedBbox,

    #[error("duplicate AOI id {0}")]
    Duplicate(AoiId),
}
