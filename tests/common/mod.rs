//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use geostore::store::document::set_position;
use geostore::store::{Bson, Document, GeoNearRequest, QueryOptions, doc};
use geostore::{DocumentStore, GeoPoint, IndexSpec, MemoryStore, StoreHandle, StoreResult};
use geostore::primitives::LiveIndex;

/// Origin used by the nearby scenarios.
pub fn origin() -> GeoPoint {
    GeoPoint::new(12.97, 77.59).unwrap()
}

/// Venues due east of [`origin`] at 1.2, 3.0, 4.9 and 6.1 km (ids 1 to 4).
pub async fn seed_venues(store: &StoreHandle) {
    for (id, km) in [(3, 4.9), (1, 1.2), (4, 6.1), (2, 3.0)] {
        let mut record = doc! {
            "_id": id,
            "name": format!("venue-{}", id),
            "city": "Bengaluru",
            "is_active": true,
        };
        set_position(&mut record, &origin().destination(90.0, km));
        store.insert_one("venues", record).await.unwrap();
    }
}

/// Ids of a hit list, in order.
pub fn ids(hits: &[geostore::NearbyHit]) -> Vec<i32> {
    hits.iter()
        .map(|hit| hit.record.get_i32("_id").unwrap())
        .collect()
}

/// An in-memory store with scheduling delays around reads and writes.
#[derive(Debug)]
pub struct ThrottledStore {
    inner: StoreHandle,
    yield_after_find: bool,
    insert_delay: Option<Duration>,
}

impl ThrottledStore {
    /// Yields to the scheduler after every read.
    ///
    /// Concurrent writers all observe the same state before any of them
    /// inserts, which forces collisions on the unique index.
    pub fn contended() -> StoreHandle {
        Arc::new(Self {
            inner: MemoryStore::handle(),
            yield_after_find: true,
            insert_delay: None,
        })
    }

    /// Sleeps for `delay` before every insert.
    pub fn slow_inserts(delay: Duration) -> StoreHandle {
        Arc::new(Self {
            inner: MemoryStore::handle(),
            yield_after_find: false,
            insert_delay: Some(delay),
        })
    }
}

#[async_trait]
impl DocumentStore for ThrottledStore {
    fn backend(&self) -> &'static str {
        "throttled"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }

    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<LiveIndex>> {
        self.inner.list_indexes(collection).await
    }

    async fn create_index(&self, spec: &IndexSpec) -> StoreResult<String> {
        self.inner.create_index(spec).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Bson> {
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.insert_one(collection, document).await
    }

    async fn set_fields(&self, collection: &str, id: &Bson, fields: Document) -> StoreResult<bool> {
        self.inner.set_fields(collection, id, fields).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: QueryOptions,
    ) -> StoreResult<Vec<Document>> {
        let found = self.inner.find(collection, filter, options).await;
        if self.yield_after_find {
            tokio::task::yield_now().await;
        }
        found
    }

    async fn count(&self, collection: &str, filter: Document) -> StoreResult<u64> {
        self.inner.count(collection, filter).await
    }

    async fn geo_near(
        &self,
        collection: &str,
        request: &GeoNearRequest,
    ) -> StoreResult<Vec<Document>> {
        self.inner.geo_near(collection, request).await
    }

    async fn geo_near_count(&self, collection: &str, request: &GeoNearRequest) -> StoreResult<u64> {
        self.inner.geo_near_count(collection, request).await
    }

    async fn shutdown(&self) {
        self.inner.shutdown().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
