//! Filter document building.

use bson::{Bson, Document, doc};
use geostore_core::BoundingBox;

/// Builder for filter documents.
///
/// ```rust
/// use geostore_mongodb::FilterBuilder;
///
/// let filter = FilterBuilder::new()
///     .eq("is_active", true)
///     .eq("status", "upcoming")
///     .build();
/// assert_eq!(filter.get_str("status").unwrap(), "upcoming");
/// ```
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    doc: Document,
}

impl FilterBuilder {
    /// Empty filter (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue from an existing filter.
    pub fn from_doc(doc: Document) -> Self {
        Self { doc }
    }

    /// Add an equality condition.
    pub fn eq(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.doc.insert(field, value.into());
        self
    }

    /// Add a not-equal condition.
    pub fn ne(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.doc.insert(field, doc! { "$ne": value.into() });
        self
    }

    /// Add an inclusive range condition.
    pub fn between(mut self, field: &str, min: impl Into<Bson>, max: impl Into<Bson>) -> Self {
        self.doc
            .insert(field, doc! { "$gte": min.into(), "$lte": max.into() });
        self
    }

    /// Field equals one of `values`.
    pub fn in_array(mut self, field: &str, values: Vec<impl Into<Bson>>) -> Self {
        let bson_values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.doc.insert(field, doc! { "$in": bson_values });
        self
    }

    /// Add an exists condition.
    pub fn exists(mut self, field: &str, exists: bool) -> Self {
        self.doc.insert(field, doc! { "$exists": exists });
        self
    }

    /// Match any of `alternatives`.
    pub fn any_of(mut self, alternatives: Vec<Document>) -> Self {
        self.doc.insert("$or", alternatives);
        self
    }

    /// Merge another filter into this one; its fields win.
    pub fn merge(mut self, other: Document) -> Self {
        for (k, v) in other {
            self.doc.insert(k, v);
        }
        self
    }

    /// Build the filter document.
    pub fn build(self) -> Document {
        self.doc
    }

    /// Whether the filter matches everything.
    pub fn is_empty(&self) -> bool {
        self.doc.is_empty()
    }
}

/// Candidate filter for a bounding box over scalar latitude/longitude fields.
///
/// A box split by the antimeridian becomes an `$or` of its longitude ranges.
pub fn within_box(bbox: &BoundingBox, latitude_field: &str, longitude_field: &str) -> Document {
    let mut latitude = Document::new();
    latitude.insert(
        latitude_field,
        doc! { "$gte": bbox.min_lat, "$lte": bbox.max_lat },
    );

    let mut ranges: Vec<Document> = bbox
        .lon_ranges
        .iter()
        .map(|(min, max)| {
            let mut range = Document::new();
            range.insert(longitude_field, doc! { "$gte": *min, "$lte": *max });
            range
        })
        .collect();

    let longitude = if ranges.len() == 1 {
        ranges.remove(0)
    } else {
        doc! { "$or": ranges }
    };

    doc! { "$and": [latitude, longitude] }
}

/// Conjunction of a predicate and another condition.
///
/// An empty predicate is dropped.
pub fn and_also(predicate: &Document, condition: Document) -> Document {
    if predicate.is_empty() {
        condition
    } else {
        doc! { "$and": [predicate.clone(), condition] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geostore_core::GeoPoint;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_filter_builder_eq() {
        let filter = FilterBuilder::new()
            .eq("city", "Bengaluru")
            .eq("is_active", true)
            .build();

        assert_eq!(filter.get_str("city").unwrap(), "Bengaluru");
        assert!(filter.get_bool("is_active").unwrap());
    }

    #[test]
    fn test_filter_builder_between_and_in() {
        let filter = FilterBuilder::new()
            .between("price", 100, 500)
            .in_array("sport_type", vec!["cricket", "football"])
            .build();

        let price = filter.get_document("price").unwrap();
        assert!(price.contains_key("$gte") && price.contains_key("$lte"));
        assert!(filter.get_document("sport_type").unwrap().contains_key("$in"));
    }

    #[test]
    fn test_filter_builder_merge() {
        let filter = FilterBuilder::from_doc(doc! { "a": 1 })
            .merge(doc! { "b": 2 })
            .build();
        assert_eq!(filter, doc! { "a": 1, "b": 2 });
    }

    #[test]
    fn test_within_box() {
        let bbox = GeoPoint::new(12.97, 77.59).unwrap().bounding_box(5.0);
        let filter = within_box(&bbox, "latitude", "longitude");
        let clauses = filter.get_array("$and").unwrap();
        assert_eq!(clauses.len(), 2);
        let longitude = clauses[1].as_document().unwrap();
        assert!(longitude.contains_key("longitude"));
    }

    #[test]
    fn test_within_box_antimeridian() {
        let bbox = GeoPoint::new(0.0, 179.99).unwrap().bounding_box(10.0);
        let filter = within_box(&bbox, "lat", "lng");
        let clauses = filter.get_array("$and").unwrap();
        let longitude = clauses[1].as_document().unwrap();
        assert_eq!(longitude.get_array("$or").unwrap().len(), 2);
    }

    #[test]
    fn test_and_also() {
        let condition = doc! { "x": 1 };
        assert_eq!(and_also(&doc! {}, condition.clone()), condition);
        assert_eq!(
            and_also(&doc! { "y": 2 }, condition),
            doc! { "$and": [{ "y": 2 }, { "x": 1 }] }
        );
    }
}
