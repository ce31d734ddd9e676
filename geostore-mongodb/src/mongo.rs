//! [`DocumentStore`] over the official MongoDB driver.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use geostore_core::index::default_index_name;
use geostore_core::{IndexConflict, IndexOptions, IndexSpec, LiveIndex, StoreError, StoreResult};
use mongodb::options::FindOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::{debug, warn};

use crate::error::{MongoError, is_index_conflict_code};
use crate::store::{DocumentStore, GeoNearRequest, QueryOptions};
use crate::types::{geojson_point, index_keys_document, keys_from_document};

/// MongoDB-backed store sharing one pooled driver client.
#[derive(Debug)]
pub struct MongoStore {
    client: Client,
    database: Database,
    closed: AtomicBool,
}

impl MongoStore {
    /// Wrap a driver client, targeting `database`.
    pub fn new(client: Client, database: &str) -> Self {
        let database = client.database(database);
        Self {
            client,
            database,
            closed: AtomicBool::new(false),
        }
    }

    /// The underlying database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::connection("store handle closed"))
        } else {
            Ok(())
        }
    }

    fn geo_pipeline(request: &GeoNearRequest) -> Vec<Document> {
        let mut geo_near = doc! {
            "near": geojson_point(&request.near),
            "distanceField": request.distance_field.as_str(),
            "maxDistance": request.max_distance_m,
            "spherical": true,
            "key": request.key.as_str(),
        };
        if !request.query.is_empty() {
            geo_near.insert("query", request.query.clone());
        }
        vec![doc! { "$geoNear": geo_near }]
    }

    fn geo_error(err: mongodb::error::Error, collection: &str, request: &GeoNearRequest) -> StoreError {
        match MongoError::from(err).into_store_error(collection) {
            StoreError::GeoIndexUnavailable { .. } => {
                StoreError::geo_index_unavailable(collection, request.key.as_str())
            }
            other => other,
        }
    }
}

fn live_index(model: IndexModel) -> Option<LiveIndex> {
    let Some(keys) = keys_from_document(&model.keys) else {
        debug!(keys = ?model.keys, "skipping index of unsupported kind");
        return None;
    };
    let options = model.options.unwrap_or_default();
    Some(LiveIndex {
        name: options.name.unwrap_or_else(|| default_index_name(&keys)),
        keys,
        options: IndexOptions {
            unique: options.unique.unwrap_or(false),
            sparse: options.sparse.unwrap_or(false),
        },
    })
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.ensure_open()?;
        self.database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| MongoError::from(e).into_store_error(""))?;
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<LiveIndex>> {
        self.ensure_open()?;
        let cursor = match self.collection(collection).list_indexes(None).await {
            Ok(cursor) => cursor,
            Err(e) => {
                let err = MongoError::from(e);
                if err.is_namespace_not_found() {
                    return Ok(Vec::new());
                }
                return Err(err.into_store_error(collection));
            }
        };
        let models: Vec<IndexModel> = cursor
            .try_collect()
            .await
            .map_err(|e| MongoError::from(e).into_store_error(collection))?;
        Ok(models.into_iter().filter_map(live_index).collect())
    }

    async fn create_index(&self, spec: &IndexSpec) -> StoreResult<String> {
        self.ensure_open()?;
        let options = mongodb::options::IndexOptions::builder()
            .name(spec.name())
            .unique(spec.options.unique)
            .sparse(spec.options.sparse)
            .build();
        let model = IndexModel::builder()
            .keys(index_keys_document(&spec.keys))
            .options(options)
            .build();

        match self.collection(&spec.collection).create_index(model, None).await {
            Ok(result) => Ok(result.index_name),
            Err(e) => {
                let err = MongoError::from(e);
                if is_index_conflict_code(err.server_code()) {
                    return Err(StoreError::IndexConflict(vec![IndexConflict::new(
                        spec.clone(),
                        err.to_string(),
                    )]));
                }
                Err(err.into_store_error(&spec.collection))
            }
        }
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Bson> {
        self.ensure_open()?;
        let result = self
            .collection(collection)
            .insert_one(document, None)
            .await
            .map_err(|e| MongoError::from(e).into_store_error(collection))?;
        Ok(result.inserted_id)
    }

    async fn set_fields(&self, collection: &str, id: &Bson, fields: Document) -> StoreResult<bool> {
        self.ensure_open()?;
        let result = self
            .collection(collection)
            .update_one(doc! { "_id": id.clone() }, doc! { "$set": fields }, None)
            .await
            .map_err(|e| MongoError::from(e).into_store_error(collection))?;
        Ok(result.matched_count > 0)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: QueryOptions,
    ) -> StoreResult<Vec<Document>> {
        self.ensure_open()?;
        let mut find_options = FindOptions::default();
        find_options.sort = options.sort;
        find_options.limit = options.limit;
        find_options.projection = options.projection;

        let cursor = self
            .collection(collection)
            .find(filter, find_options)
            .await
            .map_err(|e| MongoError::from(e).into_store_error(collection))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| MongoError::from(e).into_store_error(collection))
    }

    async fn count(&self, collection: &str, filter: Document) -> StoreResult<u64> {
        self.ensure_open()?;
        self.collection(collection)
            .count_documents(filter, None)
            .await
            .map_err(|e| MongoError::from(e).into_store_error(collection))
    }

    async fn geo_near(
        &self,
        collection: &str,
        request: &GeoNearRequest,
    ) -> StoreResult<Vec<Document>> {
        self.ensure_open()?;
        let mut pipeline = Self::geo_pipeline(request);

        let mut sort = Document::new();
        sort.insert(request.distance_field.as_str(), 1);
        sort.insert("_id", 1);
        pipeline.push(doc! { "$sort": sort });
        if request.skip > 0 {
            pipeline.push(doc! { "$skip": request.skip as i64 });
        }
        if let Some(limit) = request.limit {
            pipeline.push(doc! { "$limit": limit });
        }

        let cursor = self
            .collection(collection)
            .aggregate(pipeline, None)
            .await
            .map_err(|e| Self::geo_error(e, collection, request))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| Self::geo_error(e, collection, request))
    }

    async fn geo_near_count(&self, collection: &str, request: &GeoNearRequest) -> StoreResult<u64> {
        self.ensure_open()?;
        let mut pipeline = Self::geo_pipeline(request);
        pipeline.push(doc! { "$count": "n" });

        let cursor = self
            .collection(collection)
            .aggregate(pipeline, None)
            .await
            .map_err(|e| Self::geo_error(e, collection, request))?;
        let rows: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| Self::geo_error(e, collection, request))?;

        Ok(rows
            .first()
            .and_then(|row| row.get("n"))
            .and_then(crate::types::bson_to_u64)
            .unwrap_or(0))
    }

    async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            warn!("store already shut down");
            return;
        }
        self.client.clone().shutdown().await;
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
