//! # geostore
//!
//! Document store access and geospatial queries for a sports marketplace.
//!
//! geostore provides:
//! - Safe encoding of store credentials before the first dial
//! - Idempotent provisioning of unique and geospatial indexes
//! - Nearest-first radius queries over venues, tournaments, shops, jobs and academies
//! - Collision-free allocation of human-facing booking numbers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use geostore::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> StoreResult<()> {
//!     let store = GeoStore::start(StoreSettings::from_env()?).await?;
//!
//!     let origin = GeoPoint::new(12.97, 77.59)?;
//!     let venues = store
//!         .engine()
//!         .nearby(&Listing::Venues.query(origin, 5.0))
//!         .await?;
//!     println!("{} venues within 5 km", venues.len());
//!
//!     let date = chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
//!     let number = store
//!         .guard()
//!         .allocate(AllocationRequest::booking(date, doc! { "venue_id": "v1" }))
//!         .await?;
//!     println!("booked {}", number);
//!
//!     store.close().await;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use geostore_mongodb::catalog;
use tracing::info;

/// Backend-agnostic primitives.
pub mod primitives {
    pub use geostore_core::*;
}

/// MongoDB-backed components.
pub mod store {
    pub use geostore_mongodb::*;
}

pub use geostore_core::{
    Deadline, ErrorCode, GeoPoint, Identifier, IdentifierRule, IndexSpec, ReconcileReport,
    StoreError, StoreResult, StoreSettings,
};
pub use geostore_mongodb::{
    AllocationRequest, ConnectionManager, DocumentStore, GeoQueryEngine, IndexRegistry, Listing,
    MemoryStore, MongoConfig, NearbyCounts, NearbyHit, NearbyQuery, StoreHandle, Strategy,
    UniquenessGuard,
};

/// The started access layer.
///
/// Owns the connection and hands out the components built on it. Every
/// component shares the same pooled handle.
#[derive(Debug)]
pub struct GeoStore {
    connection: ConnectionManager,
    engine: GeoQueryEngine,
    guard: UniquenessGuard,
    registry: IndexRegistry,
    report: ReconcileReport,
}

impl GeoStore {
    /// Connect, ping and reconcile the default index catalog.
    ///
    /// Fails fast: malformed credentials, an unreachable store, drifted
    /// indexes and missing required indexes all abort startup.
    pub async fn start(settings: StoreSettings) -> StoreResult<Self> {
        geostore_core::logging::init();
        settings.validate()?;

        let config = MongoConfig::from_settings(&settings);
        let connection = ConnectionManager::connect(config).await?;
        Self::assemble(connection, &settings).await
    }

    /// Start over an already-open store, such as a [`MemoryStore`].
    pub async fn with_store(handle: StoreHandle, settings: StoreSettings) -> StoreResult<Self> {
        settings.validate()?;
        let connection = ConnectionManager::from_handle(handle, settings.database.clone());
        Self::assemble(connection, &settings).await
    }

    async fn assemble(connection: ConnectionManager, settings: &StoreSettings) -> StoreResult<Self> {
        let registry = IndexRegistry::new(connection.handle());
        let report = match registry.reconcile(&catalog::default_indexes()).await {
            Ok(report) => report,
            Err(err) => {
                connection.close().await;
                return Err(err);
            }
        };

        let mut engine = GeoQueryEngine::new(connection.handle());
        if let Some(timeout) = settings.query_timeout() {
            engine = engine.with_query_timeout(timeout);
        }
        let guard = UniquenessGuard::new(connection.handle());

        info!(
            uri = %connection.redacted_uri(),
            database = %connection.database(),
            indexes = %report.summary(),
            "geostore ready"
        );

        Ok(Self {
            connection,
            engine,
            guard,
            registry,
            report,
        })
    }

    /// Nearby query engine.
    pub fn engine(&self) -> &GeoQueryEngine {
        &self.engine
    }

    /// Identifier allocator.
    pub fn guard(&self) -> &UniquenessGuard {
        &self.guard
    }

    /// Index registry.
    pub fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    /// Outcome of the startup reconciliation.
    pub fn startup_report(&self) -> &ReconcileReport {
        &self.report
    }

    /// A shared store handle for direct reads and writes.
    pub fn handle(&self) -> StoreHandle {
        self.connection.handle()
    }

    /// The underlying connection.
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Whether the store still answers.
    pub async fn is_healthy(&self) -> bool {
        self.connection.is_healthy().await
    }

    /// Shut the store down.
    pub async fn close(self) {
        self.connection.close().await;
    }
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::GeoStore;
    pub use geostore_mongodb::prelude::*;
}
