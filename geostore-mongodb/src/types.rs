//! Type conversions between geostore values and BSON.

use std::cmp::Ordering;

use bson::{Bson, Document, doc};
use geostore_core::{GeoPoint, IndexDirection, IndexKey};

/// Render index keys as a key document (`{phone: 1, location: "2dsphere"}`).
pub fn index_keys_document(keys: &[IndexKey]) -> Document {
    let mut document = Document::new();
    for key in keys {
        let value = match key.direction {
            IndexDirection::Ascending => Bson::Int32(1),
            IndexDirection::Descending => Bson::Int32(-1),
            IndexDirection::Sphere2d => Bson::String("2dsphere".to_string()),
        };
        document.insert(key.field.as_str(), value);
    }
    document
}

/// Parse a key document reported by the store.
///
/// Returns `None` for index kinds geostore never declares (text, hashed, 2d).
pub fn keys_from_document(keys: &Document) -> Option<Vec<IndexKey>> {
    keys.iter()
        .map(|(field, value)| {
            let direction = match value {
                Bson::String(kind) if kind == "2dsphere" => IndexDirection::Sphere2d,
                Bson::String(_) => return None,
                other => {
                    if bson_to_f64(other)? < 0.0 {
                        IndexDirection::Descending
                    } else {
                        IndexDirection::Ascending
                    }
                }
            };
            Some(IndexKey::new(field.as_str(), direction))
        })
        .collect()
}

/// GeoJSON point for a coordinate pair (`[lon, lat]` order).
pub fn geojson_point(point: &GeoPoint) -> Document {
    doc! {
        "type": "Point",
        "coordinates": [point.longitude(), point.latitude()],
    }
}

/// Read a GeoJSON point.
pub fn point_from_geojson(value: &Bson) -> Option<GeoPoint> {
    let Bson::Document(geometry) = value else {
        return None;
    };
    if geometry.get_str("type").ok()? != "Point" {
        return None;
    }
    let coordinates = geometry.get_array("coordinates").ok()?;
    match coordinates.as_slice() {
        [lon, lat] => GeoPoint::new(bson_to_f64(lat)?, bson_to_f64(lon)?).ok(),
        _ => None,
    }
}

/// Numeric BSON value as `f64`.
pub fn bson_to_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(v) => Some(*v),
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        _ => None,
    }
}

/// Numeric BSON value as `u64`, for sequence counters.
pub fn bson_to_u64(value: &Bson) -> Option<u64> {
    match value {
        Bson::Int32(v) => u64::try_from(*v).ok(),
        Bson::Int64(v) => u64::try_from(*v).ok(),
        Bson::Double(v) if *v >= 0.0 && v.fract() == 0.0 => Some(*v as u64),
        _ => None,
    }
}

/// Rank of a BSON type in the store's cross-type sort order.
fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Decimal128(_) => 2,
        Bson::Symbol(_) | Bson::String(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

/// Whether two values belong to the same comparison class.
pub fn type_rank_matches(a: &Bson, b: &Bson) -> bool {
    type_rank(a) == type_rank(b)
}

/// Compare two BSON values using the store's ordering rules.
///
/// Values of different types order by type; numbers compare across widths.
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Symbol(x), Bson::Symbol(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => (x.time, x.increment).cmp(&(y.time, y.increment)),
        (Bson::Binary(x), Bson::Binary(y)) => x.bytes.cmp(&y.bytes),
        (Bson::Array(x), Bson::Array(y)) => compare_sequences(x.iter(), y.iter()),
        (Bson::Document(x), Bson::Document(y)) => compare_sequences(x.values(), y.values()),
        _ => match (bson_to_f64(a), bson_to_f64(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

fn compare_sequences<'a>(
    mut a: impl Iterator<Item = &'a Bson>,
    mut b: impl Iterator<Item = &'a Bson>,
) -> Ordering {
    loop {
        match (a.next(), b.next()) {
            (Some(x), Some(y)) => match compare_bson(x, y) {
                Ordering::Equal => continue,
                other => return other,
            },
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
        }
    }
}

/// Whether two BSON values are equal under the store's rules.
///
/// Numbers of different widths compare by value.
pub fn bson_equal(a: &Bson, b: &Bson) -> bool {
    match (bson_to_f64(a), bson_to_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => type_rank_matches(a, b) && compare_bson(a, b) == Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_index_keys_roundtrip() {
        let keys = vec![
            IndexKey::new("city", IndexDirection::Ascending),
            IndexKey::new("created_at", IndexDirection::Descending),
            IndexKey::new("location", IndexDirection::Sphere2d),
        ];
        let document = index_keys_document(&keys);
        assert_eq!(
            document,
            doc! { "city": 1, "created_at": -1, "location": "2dsphere" }
        );
        assert_eq!(keys_from_document(&document), Some(keys));
    }

    #[test]
    fn test_keys_from_document_numeric_widths() {
        let keys = keys_from_document(&doc! { "a": 1.0, "b": -1_i64 }).unwrap();
        assert_eq!(keys[0].direction, IndexDirection::Ascending);
        assert_eq!(keys[1].direction, IndexDirection::Descending);

        assert_eq!(keys_from_document(&doc! { "body": "text" }), None);
    }

    #[test]
    fn test_geojson() {
        let point = GeoPoint::new(12.97, 77.59).unwrap();
        let geometry = geojson_point(&point);
        assert_eq!(
            geometry,
            doc! { "type": "Point", "coordinates": [77.59, 12.97] }
        );
        assert_eq!(point_from_geojson(&Bson::Document(geometry)), Some(point));
        assert_eq!(point_from_geojson(&Bson::String("x".into())), None);
    }

    #[test]
    fn test_compare_ids() {
        let oid_a = ObjectId::parse_str("65a000000000000000000001").unwrap();
        let oid_b = ObjectId::parse_str("65a000000000000000000002").unwrap();
        assert_eq!(
            compare_bson(&Bson::ObjectId(oid_a), &Bson::ObjectId(oid_b)),
            Ordering::Less
        );
        assert_eq!(
            compare_bson(&Bson::Int32(5), &Bson::String("1".into())),
            Ordering::Less
        );
        assert_eq!(
            compare_bson(&Bson::String("z".into()), &Bson::ObjectId(oid_a)),
            Ordering::Less
        );
        assert_eq!(compare_bson(&Bson::Int64(2), &Bson::Double(1.5)), Ordering::Greater);
    }

    #[test]
    fn test_bson_equal() {
        assert!(bson_equal(&Bson::Int32(1), &Bson::Double(1.0)));
        assert!(!bson_equal(&Bson::Int32(1), &Bson::String("1".into())));
        assert!(bson_equal(&Bson::Null, &Bson::Null));
        assert_eq!(bson_to_u64(&Bson::Int64(42)), Some(42));
        assert_eq!(bson_to_u64(&Bson::Int32(-1)), None);
    }
}
