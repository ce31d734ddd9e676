//! # geostore-mongodb
//!
//! MongoDB-backed components of the geostore access layer.
//!
//! This crate provides:
//! - [`ConnectionManager`]: one pooled, pinged store handle per process
//! - [`IndexRegistry`]: idempotent provisioning of declared indexes
//! - [`GeoQueryEngine`]: nearest-first radius queries with a bounding-box fallback
//! - [`UniquenessGuard`]: identifier allocation arbitrated by unique indexes
//!
//! Every component talks to the store through the [`DocumentStore`] trait.
//! [`MongoStore`] implements it over the official driver and [`MemoryStore`]
//! in process, for tests and local development.
//!
//! ## Example
//!
//! ```rust,no_run
//! use geostore_mongodb::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> StoreResult<()> {
//!     let config = MongoConfig::builder()
//!         .uri("mongodb://app:p@ss@localhost:27017")
//!         .database("sports_diary")
//!         .build()?;
//!     let connection = ConnectionManager::connect(config).await?;
//!
//!     IndexRegistry::new(connection.handle())
//!         .reconcile(&catalog::default_indexes())
//!         .await?;
//!
//!     let engine = GeoQueryEngine::new(connection.handle());
//!     let origin = GeoPoint::new(12.97, 77.59)?;
//!     let venues = engine.nearby(&Listing::Venues.query(origin, 5.0)).await?;
//!     println!("{} venues nearby", venues.len());
//!
//!     connection.close().await;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod connection;
pub mod document;
pub mod error;
pub mod filter;
pub mod geo;
pub mod guard;
pub mod matcher;
pub mod memory;
pub mod mongo;
pub mod registry;
pub mod store;
pub mod types;

pub use bson::oid::ObjectId;
pub use bson::{Bson, Document, doc};
pub use config::{MongoConfig, MongoConfigBuilder, ReadPreference, WriteConcern};
pub use connection::ConnectionManager;
pub use document::DocumentExt;
pub use error::MongoError;
pub use filter::FilterBuilder;
pub use geo::{GeoLayout, GeoQueryEngine, Listing, NearbyCounts, NearbyHit, NearbyQuery, Strategy};
pub use guard::{AllocationRequest, UniquenessGuard};
pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use registry::{IndexRegistry, IndexStatus, VerifyReport};
pub use store::{DocumentStore, GeoNearRequest, QueryOptions, StoreHandle};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::catalog;
    pub use crate::config::{MongoConfig, MongoConfigBuilder};
    pub use crate::connection::ConnectionManager;
    pub use crate::document::DocumentExt;
    pub use crate::filter::FilterBuilder;
    pub use crate::geo::{GeoQueryEngine, Listing, NearbyHit, NearbyQuery, Strategy};
    pub use crate::guard::{AllocationRequest, UniquenessGuard};
    pub use crate::memory::MemoryStore;
    pub use crate::registry::IndexRegistry;
    pub use crate::store::{DocumentStore, StoreHandle};
    pub use bson::{Bson, Document, doc};
    pub use geostore_core::prelude::*;
}
