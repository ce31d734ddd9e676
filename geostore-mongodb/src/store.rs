//! The document store seam.
//!
//! Every component talks to the store through [`DocumentStore`]. Two
//! implementations ship with this crate: [`crate::MongoStore`] over the
//! official driver and [`crate::MemoryStore`] for tests and local development.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};
use geostore_core::{GeoPoint, IndexSpec, LiveIndex, StoreResult};

/// Shared handle to the process-wide store.
pub type StoreHandle = Arc<dyn DocumentStore>;

/// Options for [`DocumentStore::find`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Sort document (`{field: 1 | -1}`).
    pub sort: Option<Document>,
    /// Maximum number of documents.
    pub limit: Option<i64>,
    /// Projection document.
    pub projection: Option<Document>,
}

impl QueryOptions {
    /// Options with a sort and limit.
    pub fn sorted(sort: Document, limit: i64) -> Self {
        Self {
            sort: Some(sort),
            limit: Some(limit),
            projection: None,
        }
    }
}

/// A native nearest-first geospatial query.
///
/// Results are ordered by distance then `_id`, with the distance in metres
/// stored under `distance_field`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoNearRequest {
    /// Geospatial key (a `2dsphere` indexed GeoJSON field).
    pub key: String,
    /// Query origin.
    pub near: GeoPoint,
    /// Maximum distance in metres.
    pub max_distance_m: f64,
    /// Additional predicate evaluated by the store.
    pub query: Document,
    /// Output field receiving the distance.
    pub distance_field: String,
    /// Documents to skip after ordering.
    pub skip: u64,
    /// Maximum documents to return (`None` for all).
    pub limit: Option<i64>,
}

/// Minimal document store operations required by geostore.
#[async_trait]
pub trait DocumentStore: Send + Sync + fmt::Debug {
    /// Backend name for logs.
    fn backend(&self) -> &'static str;

    /// Round-trip to the store.
    async fn ping(&self) -> StoreResult<()>;

    /// Indexes currently present on a collection (empty if it does not exist).
    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<LiveIndex>>;

    /// Create the index described by `spec`, returning its name.
    async fn create_index(&self, spec: &IndexSpec) -> StoreResult<String>;

    /// Insert one document, returning its `_id`.
    ///
    /// Unique index violations surface as `StoreError::DuplicateKey`.
    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Bson>;

    /// Set `fields` on the document whose `_id` is `id`.
    ///
    /// Returns whether a document matched.
    async fn set_fields(&self, collection: &str, id: &Bson, fields: Document) -> StoreResult<bool>;

    /// Find documents matching `filter`.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: QueryOptions,
    ) -> StoreResult<Vec<Document>>;

    /// Count documents matching `filter`.
    async fn count(&self, collection: &str, filter: Document) -> StoreResult<u64>;

    /// Run a native geospatial query.
    ///
    /// Fails with `StoreError::GeoIndexUnavailable` when the collection has no
    /// geospatial index on `request.key`.
    async fn geo_near(&self, collection: &str, request: &GeoNearRequest)
    -> StoreResult<Vec<Document>>;

    /// Count the documents a native geospatial query would return.
    async fn geo_near_count(&self, collection: &str, request: &GeoNearRequest) -> StoreResult<u64>;

    /// Release the store. Later calls fail with a connection error.
    async fn shutdown(&self);

    /// Whether [`DocumentStore::shutdown`] has run.
    fn is_closed(&self) -> bool;
}
