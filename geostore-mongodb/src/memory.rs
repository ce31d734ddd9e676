//! In-process document store.
//!
//! [`MemoryStore`] mirrors the store behaviour geostore depends on: unique and
//! sparse index enforcement on insert, index creation with the same conflict
//! rules as the server, and `$geoNear` that requires a `2dsphere` index. Each
//! write happens under one lock, so uniqueness checks are atomic just like a
//! single-document write on the server.
//!
//! ```rust
//! use geostore_mongodb::{DocumentStore, MemoryStore};
//! use bson::doc;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! store.insert_one("venues", doc! { "name": "Arena" }).await.unwrap();
//! assert_eq!(store.count("venues", doc! {}).await.unwrap(), 1);
//! # });
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use geostore_core::index::{IndexPlan, plan};
use geostore_core::{
    IndexConflict, IndexDirection, IndexSpec, LiveIndex, StoreError, StoreResult, geo,
};
use parking_lot::RwLock;
use tracing::debug;

use crate::document::DocumentExt;
use crate::matcher;
use crate::store::{DocumentStore, GeoNearRequest, QueryOptions, StoreHandle};
use crate::types::{bson_equal, compare_bson, point_from_geojson};

#[derive(Debug)]
struct MemCollection {
    docs: Vec<Document>,
    indexes: Vec<LiveIndex>,
}

impl Default for MemCollection {
    fn default() -> Self {
        Self {
            docs: Vec::new(),
            indexes: vec![LiveIndex::primary()],
        }
    }
}

impl MemCollection {
    /// First index that `document` would violate.
    fn violated_index(&self, document: &Document) -> Option<&LiveIndex> {
        self.indexes
            .iter()
            .filter(|index| index.enforces_uniqueness())
            .find(|index| {
                let Some(key) = index_key(index, document) else {
                    return false;
                };
                self.docs.iter().any(|existing| {
                    index_key(index, existing).is_some_and(|other| keys_equal(&key, &other))
                })
            })
    }

    fn has_geo_index(&self, field: &str) -> bool {
        self.indexes.iter().any(|index| {
            index
                .keys
                .iter()
                .any(|k| k.field == field && k.direction == IndexDirection::Sphere2d)
        })
    }
}

/// Key values of `document` for `index`; `None` when a sparse index skips it.
fn index_key(index: &LiveIndex, document: &Document) -> Option<Vec<Bson>> {
    let values: Vec<Option<&Bson>> = index
        .keys
        .iter()
        .map(|k| document.get_path(&k.field))
        .collect();

    if index.options.sparse && values.iter().all(Option::is_none) {
        return None;
    }

    Some(
        values
            .into_iter()
            .map(|v| v.cloned().unwrap_or(Bson::Null))
            .collect(),
    )
}

fn keys_equal(a: &[Bson], b: &[Bson]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| bson_equal(x, y))
}

/// In-memory [`DocumentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemCollection>>,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store behind a shared handle.
    pub fn handle() -> StoreHandle {
        Arc::new(Self::new())
    }

    /// Snapshot of a collection's documents, in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.docs.clone())
            .unwrap_or_default()
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |c| c.docs.len())
    }

    /// Whether a collection is empty or missing.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::connection("store handle closed"))
        } else {
            Ok(())
        }
    }

    fn ranked_geo_matches(
        &self,
        collection: &str,
        request: &GeoNearRequest,
    ) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        if !coll.has_geo_index(&request.key) {
            return Err(StoreError::geo_index_unavailable(collection, request.key.as_str()));
        }

        let mut hits: Vec<(f64, Document)> = Vec::new();
        for document in &coll.docs {
            let Some(point) = document.get_path(&request.key).and_then(point_from_geojson) else {
                continue;
            };
            if !matcher::matches(document, &request.query)? {
                continue;
            }
            let distance_m = geo::haversine_km(
                request.near.latitude(),
                request.near.longitude(),
                point.latitude(),
                point.longitude(),
            ) * 1000.0;
            if distance_m <= request.max_distance_m {
                let mut hit = document.clone();
                hit.insert(request.distance_field.as_str(), distance_m);
                hits.push((distance_m, hit));
            }
        }

        hits.sort_by(|(da, a), (db, b)| {
            da.partial_cmp(db)
                .unwrap_or(CmpOrdering::Equal)
                .then_with(|| compare_ids(a, b))
        });

        Ok(hits.into_iter().map(|(_, hit)| hit).collect())
    }
}

fn compare_ids(a: &Document, b: &Document) -> CmpOrdering {
    compare_bson(
        a.get("_id").unwrap_or(&Bson::Null),
        b.get("_id").unwrap_or(&Bson::Null),
    )
}

fn sort_documents(docs: &mut [Document], sort: &Document) {
    docs.sort_by(|a, b| {
        for (field, direction) in sort {
            let descending = crate::types::bson_to_f64(direction).is_some_and(|d| d < 0.0);
            let ordering = compare_bson(
                a.get_path(field).unwrap_or(&Bson::Null),
                b.get_path(field).unwrap_or(&Bson::Null),
            );
            let ordering = if descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != CmpOrdering::Equal {
                return ordering;
            }
        }
        CmpOrdering::Equal
    });
}

fn project(document: Document, projection: &Document) -> Document {
    let mut projected = Document::new();
    if let Some(id) = document.get("_id") {
        projected.insert("_id", id.clone());
    }
    for (field, include) in projection {
        let included = match include {
            Bson::Boolean(b) => *b,
            other => crate::types::bson_to_f64(other).is_some_and(|n| n != 0.0),
        };
        if included {
            if let Some(value) = document.get(field) {
                projected.insert(field.as_str(), value.clone());
            }
        }
    }
    projected
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.ensure_open()
    }

    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<LiveIndex>> {
        self.ensure_open()?;
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default())
    }

    async fn create_index(&self, spec: &IndexSpec) -> StoreResult<String> {
        self.ensure_open()?;
        let mut collections = self.collections.write();
        let coll = collections.entry(spec.collection.to_string()).or_default();

        match plan(spec, &coll.indexes) {
            IndexPlan::Unchanged => Ok(spec.name()),
            IndexPlan::Conflict(reason) => {
                Err(StoreError::IndexConflict(vec![IndexConflict::new(spec.clone(), reason)]))
            }
            IndexPlan::Create => {
                let live = LiveIndex::from_spec(spec);
                if live.enforces_uniqueness() {
                    let mut seen: Vec<Vec<Bson>> = Vec::new();
                    for document in &coll.docs {
                        let Some(key) = index_key(&live, document) else {
                            continue;
                        };
                        if seen.iter().any(|k| keys_equal(k, &key)) {
                            return Err(StoreError::duplicate_key(
                                spec.collection.as_str(),
                                live.name.as_str(),
                            ));
                        }
                        seen.push(key);
                    }
                }
                debug!(collection = %spec.collection, index = %live.name, "memory index created");
                let name = live.name.clone();
                coll.indexes.push(live);
                Ok(name)
            }
        }
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> StoreResult<Bson> {
        self.ensure_open()?;
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        let id = document.get("_id").cloned().unwrap_or(Bson::Null);

        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        if let Some(index) = coll.violated_index(&document) {
            return Err(StoreError::duplicate_key(collection, index.name.as_str()));
        }
        coll.docs.push(document);
        Ok(id)
    }

    async fn set_fields(&self, collection: &str, id: &Bson, fields: Document) -> StoreResult<bool> {
        self.ensure_open()?;
        let mut collections = self.collections.write();
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let Some(position) = coll
            .docs
            .iter()
            .position(|d| d.get("_id").is_some_and(|v| bson_equal(v, id)))
        else {
            return Ok(false);
        };

        let existing = coll.docs.remove(position);
        let mut updated = existing.clone();
        for (key, value) in fields {
            updated.insert(key, value);
        }
        if let Some(index) = coll.violated_index(&updated) {
            let index = index.name.clone();
            coll.docs.insert(position, existing);
            return Err(StoreError::duplicate_key(collection, index));
        }
        coll.docs.insert(position, updated);
        Ok(true)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: QueryOptions,
    ) -> StoreResult<Vec<Document>> {
        self.ensure_open()?;
        let mut found = {
            let collections = self.collections.read();
            let Some(coll) = collections.get(collection) else {
                return Ok(Vec::new());
            };
            let mut found = Vec::new();
            for document in &coll.docs {
                if matcher::matches(document, &filter)? {
                    found.push(document.clone());
                }
            }
            found
        };

        if let Some(ref sort) = options.sort {
            sort_documents(&mut found, sort);
        }
        if let Some(limit) = options.limit.filter(|l| *l > 0) {
            found.truncate(limit as usize);
        }
        if let Some(ref projection) = options.projection {
            found = found.into_iter().map(|d| project(d, projection)).collect();
        }
        Ok(found)
    }

    async fn count(&self, collection: &str, filter: Document) -> StoreResult<u64> {
        self.ensure_open()?;
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(0);
        };
        let mut count = 0;
        for document in &coll.docs {
            if matcher::matches(document, &filter)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn geo_near(
        &self,
        collection: &str,
        request: &GeoNearRequest,
    ) -> StoreResult<Vec<Document>> {
        self.ensure_open()?;
        let ranked = self.ranked_geo_matches(collection, request)?;
        let skipped = ranked.into_iter().skip(request.skip as usize);
        Ok(match request.limit {
            Some(limit) => skipped.take(limit.max(0) as usize).collect(),
            None => skipped.collect(),
        })
    }

    async fn geo_near_count(&self, collection: &str, request: &GeoNearRequest) -> StoreResult<u64> {
        self.ensure_open()?;
        Ok(self.ranked_geo_matches(collection, request)?.len() as u64)
    }

    async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
