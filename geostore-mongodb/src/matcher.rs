//! In-process evaluation of filter documents.
//!
//! Supports the operators geostore issues: implicit equality (matching array
//! elements), `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`,
//! `$exists`, and the logical `$and`, `$or`, `$nor`. Field names may be dotted
//! paths.

use std::cmp::Ordering;

use bson::{Bson, Document};
use geostore_core::{StoreError, StoreResult};

use crate::document::DocumentExt;
use crate::types::{bson_equal, compare_bson, type_rank_matches};

/// Whether `document` satisfies `filter`.
pub fn matches(document: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => all_clauses(condition)?
                .iter()
                .map(|clause| matches(document, clause))
                .collect::<StoreResult<Vec<_>>>()?
                .into_iter()
                .all(|b| b),
            "$or" => all_clauses(condition)?
                .iter()
                .map(|clause| matches(document, clause))
                .collect::<StoreResult<Vec<_>>>()?
                .into_iter()
                .any(|b| b),
            "$nor" => !all_clauses(condition)?
                .iter()
                .map(|clause| matches(document, clause))
                .collect::<StoreResult<Vec<_>>>()?
                .into_iter()
                .any(|b| b),
            op if op.starts_with('$') => {
                return Err(StoreError::invalid_query(format!(
                    "unsupported top-level operator {}",
                    op
                )));
            }
            field => field_matches(document.get_path(field), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn all_clauses(condition: &Bson) -> StoreResult<Vec<&Document>> {
    let Bson::Array(items) = condition else {
        return Err(StoreError::invalid_query("logical operators take an array"));
    };
    items
        .iter()
        .map(|item| {
            item.as_document()
                .ok_or_else(|| StoreError::invalid_query("logical clauses must be documents"))
        })
        .collect()
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(inner) if inner.keys().next().is_some_and(|k| k.starts_with('$')) => {
            Some(inner)
        }
        _ => None,
    }
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> StoreResult<bool> {
    let Some(operators) = is_operator_document(condition) else {
        return Ok(equals(value, condition));
    };

    for (op, operand) in operators {
        let ok = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => compares(value, operand, |o| o == Ordering::Greater),
            "$gte" => compares(value, operand, |o| o != Ordering::Less),
            "$lt" => compares(value, operand, |o| o == Ordering::Less),
            "$lte" => compares(value, operand, |o| o != Ordering::Greater),
            "$in" => in_list(value, operand)?,
            "$nin" => !in_list(value, operand)?,
            "$exists" => {
                let wanted = match operand {
                    Bson::Boolean(b) => *b,
                    other => crate::types::bson_to_f64(other).is_some_and(|n| n != 0.0),
                };
                value.is_some() == wanted
            }
            other => {
                return Err(StoreError::invalid_query(format!(
                    "unsupported operator {}",
                    other
                )));
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality with array-element semantics; `null` matches a missing field.
fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(actual) => {
            bson_equal(actual, expected)
                || matches!(actual, Bson::Array(items) if items.iter().any(|i| bson_equal(i, expected)))
        }
    }
}

/// Range comparison; only values of the same type class compare.
fn compares(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |candidate: &Bson| {
        type_rank_matches(candidate, operand) && accept(compare_bson(candidate, operand))
    };
    match value {
        None => false,
        Some(Bson::Array(items)) => items.iter().any(check),
        Some(actual) => check(actual),
    }
}

fn in_list(value: Option<&Bson>, operand: &Bson) -> StoreResult<bool> {
    let Bson::Array(options) = operand else {
        return Err(StoreError::invalid_query("$in/$nin take an array"));
    };
    Ok(options.iter().any(|option| equals(value, option)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn venue() -> Document {
        doc! {
            "_id": 1,
            "name": "Arena",
            "is_active": true,
            "rating": 4.5,
            "sports": ["cricket", "football"],
            "address": { "city": "Bengaluru" },
            "latitude": 12.97,
            "longitude": 77.59,
        }
    }

    #[test]
    fn test_equality() {
        let v = venue();
        assert!(matches(&v, &doc! {}).unwrap());
        assert!(matches(&v, &doc! { "is_active": true, "name": "Arena" }).unwrap());
        assert!(!matches(&v, &doc! { "is_active": false }).unwrap());
        assert!(matches(&v, &doc! { "sports": "football" }).unwrap());
        assert!(matches(&v, &doc! { "address.city": "Bengaluru" }).unwrap());
        assert!(matches(&v, &doc! { "missing": null }).unwrap());
        assert!(matches(&v, &doc! { "_id": 1.0 }).unwrap());
    }

    #[test]
    fn test_comparisons() {
        let v = venue();
        assert!(matches(&v, &doc! { "rating": { "$gte": 4, "$lt": 5 } }).unwrap());
        assert!(!matches(&v, &doc! { "rating": { "$gt": 4.5 } }).unwrap());
        assert!(matches(&v, &doc! { "latitude": { "$gte": 12.9, "$lte": 13.0 } }).unwrap());
        // Strings never compare against numbers.
        assert!(!matches(&v, &doc! { "name": { "$gt": 1 } }).unwrap());
        assert!(!matches(&v, &doc! { "missing": { "$lt": 10 } }).unwrap());
    }

    #[test]
    fn test_set_operators() {
        let v = venue();
        assert!(matches(&v, &doc! { "name": { "$in": ["Arena", "Court"] } }).unwrap());
        assert!(matches(&v, &doc! { "name": { "$nin": ["Court"] } }).unwrap());
        assert!(matches(&v, &doc! { "name": { "$ne": "Court" } }).unwrap());
        assert!(matches(&v, &doc! { "rating": { "$exists": true } }).unwrap());
        assert!(matches(&v, &doc! { "slug": { "$exists": false } }).unwrap());
    }

    #[test]
    fn test_logical() {
        let v = venue();
        let filter = doc! {
            "$and": [
                { "is_active": true },
                { "$or": [ { "longitude": { "$lt": 0 } }, { "longitude": { "$gte": 77 } } ] },
            ]
        };
        assert!(matches(&v, &filter).unwrap());
        assert!(!matches(&v, &doc! { "$nor": [ { "name": "Arena" } ] }).unwrap());
    }

    #[test]
    fn test_unsupported_operator() {
        let err = matches(&venue(), &doc! { "name": { "$regex": "A" } }).unwrap_err();
        assert!(err.is_invalid_query());
        assert!(matches(&venue(), &doc! { "$where": "1" }).is_err());
    }
}
