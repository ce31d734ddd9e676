//! Document mapping and conversion utilities.

use bson::{Bson, Document};
use geostore_core::{GeoPoint, StoreError, StoreResult};
use serde::{Serialize, de::DeserializeOwned};

use crate::types::{bson_to_f64, geojson_point};

/// Extension trait for BSON documents.
pub trait DocumentExt {
    /// Resolve a dotted path (`location.coordinates`).
    fn get_path(&self, path: &str) -> Option<&Bson>;

    /// Numeric field as `f64`, whatever its stored width.
    fn get_f64_lenient(&self, key: &str) -> Option<f64>;

    /// Position stored in scalar latitude/longitude fields.
    fn get_point(&self, latitude_field: &str, longitude_field: &str) -> Option<GeoPoint>;

    /// Convert to a typed struct.
    fn to_struct<T: DeserializeOwned>(&self) -> StoreResult<T>;
}

impl DocumentExt for Document {
    fn get_path(&self, path: &str) -> Option<&Bson> {
        let mut parts = path.split('.');
        let mut current = self.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Bson::Document(inner) => inner.get(part)?,
                Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    fn get_f64_lenient(&self, key: &str) -> Option<f64> {
        self.get_path(key).and_then(bson_to_f64)
    }

    fn get_point(&self, latitude_field: &str, longitude_field: &str) -> Option<GeoPoint> {
        let latitude = self.get_f64_lenient(latitude_field)?;
        let longitude = self.get_f64_lenient(longitude_field)?;
        GeoPoint::new(latitude, longitude).ok()
    }

    fn to_struct<T: DeserializeOwned>(&self) -> StoreResult<T> {
        bson::from_document(self.clone()).map_err(|e| StoreError::serialization(e.to_string()))
    }
}

/// Convert a struct to a BSON document.
pub fn to_document<T: Serialize>(value: &T) -> StoreResult<Document> {
    bson::to_document(value).map_err(|e| StoreError::serialization(e.to_string()))
}

/// Convert a BSON document to a struct.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> StoreResult<T> {
    bson::from_document(doc).map_err(|e| StoreError::serialization(e.to_string()))
}

/// Store a position on a record as scalar fields and a GeoJSON `location`.
///
/// Both representations are written so the geospatial index and the
/// bounding-box fallback see the same position.
pub fn set_position(document: &mut Document, point: &GeoPoint) {
    document.insert("latitude", point.latitude());
    document.insert("longitude", point.longitude());
    document.insert("location", geojson_point(point));
}
