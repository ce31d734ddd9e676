//! # geostore-core
//!
//! Backend-agnostic building blocks for the geostore access layer:
//!
//! - [`credentials`]: connection descriptor parsing and credential encoding
//! - [`index`]: index declarations and drift planning
//! - [`geo`]: points, great-circle distance and bounding boxes
//! - [`identifier`]: human-facing identifier rules
//! - [`deadline`]: caller deadlines surfaced as timeouts
//! - [`settings`] and [`env`]: configuration from the environment
//! - [`logging`]: `tracing` subscriber setup
//!
//! The MongoDB-backed components live in `geostore-mongodb`.

pub mod credentials;
pub mod deadline;
pub mod env;
pub mod error;
pub mod geo;
pub mod identifier;
pub mod index;
pub mod logging;
pub mod settings;

pub use credentials::{ConnectionDescriptor, CredentialDiagnosis, Credentials, Scheme};
pub use deadline::Deadline;
pub use env::{EnvExpander, EnvSource, MapEnvSource, StdEnvSource};
pub use error::{ErrorCode, StoreError, StoreResult};
pub use geo::{BoundingBox, EARTH_RADIUS_KM, GeoPoint};
pub use identifier::{Identifier, IdentifierRule};
pub use index::{
    IndexConflict, IndexDirection, IndexKey, IndexOptions, IndexPlan, IndexSpec, LiveIndex,
    ReconcileOutcome, ReconcileReport,
};
pub use settings::StoreSettings;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::deadline::Deadline;
    pub use crate::error::{StoreError, StoreResult};
    pub use crate::geo::GeoPoint;
    pub use crate::identifier::{Identifier, IdentifierRule};
    pub use crate::index::{IndexSpec, ReconcileReport};
    pub use crate::settings::StoreSettings;
}
