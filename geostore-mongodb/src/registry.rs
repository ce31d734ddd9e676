//! Idempotent index provisioning.
//!
//! [`IndexRegistry::reconcile`] brings a collection set in line with a static
//! list of [`IndexSpec`] declarations. Live indexes are listed once per
//! collection and collections are processed concurrently. Indexes that drift
//! from their declaration are reported, never dropped or rebuilt.
//!
//! Before a collection's `2dsphere` index is checked, records that only carry
//! scalar `latitude`/`longitude` fields get the GeoJSON field the index covers,
//! so the native ranking sees the same records as the bounding-box scan.

use bson::Document;
use futures::stream::{FuturesUnordered, StreamExt};
use geostore_core::index::{IndexPlan, plan};
use geostore_core::{
    IndexSpec, LiveIndex, ReconcileOutcome, ReconcileReport, StoreError, StoreResult,
};
use tracing::{debug, info, warn};

use crate::document::DocumentExt;
use crate::filter::FilterBuilder;
use crate::geo::GeoLayout;
use crate::store::{DocumentStore, QueryOptions, StoreHandle};
use crate::types::geojson_point;

/// Declarations of one collection, tagged with their position in the input.
type Group = (String, Vec<(usize, IndexSpec)>);

/// Applies and verifies index declarations.
#[derive(Debug, Clone)]
pub struct IndexRegistry {
    store: StoreHandle,
}

impl IndexRegistry {
    /// Create a registry over a store handle.
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Create every missing index and check the rest for drift.
    ///
    /// Fails with `StoreError::IndexConflict` when any declaration drifts and
    /// with `StoreError::MissingIndex` when a required index is still absent.
    /// Failures of optional indexes are logged and kept in the report.
    pub async fn reconcile(&self, specs: &[IndexSpec]) -> StoreResult<ReconcileReport> {
        let report = self.apply(specs).await;

        let conflicts = report.conflicts();
        if !conflicts.is_empty() {
            for conflict in &conflicts {
                warn!(index = %conflict.spec.qualified_name(), reason = %conflict.reason, "index drift");
            }
            return Err(StoreError::IndexConflict(conflicts));
        }

        let missing = report.missing_required();
        if !missing.is_empty() {
            return Err(StoreError::MissingIndex(missing));
        }

        for (spec, message) in report.failures() {
            warn!(index = %spec.qualified_name(), error = %message, "optional index not created");
        }

        info!(summary = %report.summary(), "indexes reconciled");
        Ok(report)
    }

    /// Apply the declarations and report every outcome without failing.
    pub async fn apply(&self, specs: &[IndexSpec]) -> ReconcileReport {
        let mut pending: FuturesUnordered<_> = group_by_collection(specs)
            .into_iter()
            .map(|group| self.apply_collection(group))
            .collect();

        let mut outcomes = Vec::with_capacity(specs.len());
        while let Some(batch) = pending.next().await {
            outcomes.extend(batch);
        }
        outcomes.sort_by_key(|(position, _, _)| *position);

        let mut report = ReconcileReport::new();
        for (_, spec, outcome) in outcomes {
            report.push(spec, outcome);
        }
        report
    }

    async fn apply_collection(&self, group: Group) -> Vec<(usize, IndexSpec, ReconcileOutcome)> {
        let (collection, specs) = group;

        let mut live = match self.store.list_indexes(&collection).await {
            Ok(live) => live,
            Err(err) => {
                warn!(collection = %collection, error = %err, "cannot list indexes");
                let message = err.to_string();
                return specs
                    .into_iter()
                    .map(|(position, spec)| {
                        (position, spec, ReconcileOutcome::Failed(message.clone()))
                    })
                    .collect();
            }
        };
        debug!(collection = %collection, live = live.len(), declared = specs.len(), "reconciling");

        for field in specs.iter().filter_map(|(_, spec)| spec.geo_field()) {
            let layout = GeoLayout {
                geo_field: field.to_string(),
                ..GeoLayout::default()
            };
            if let Err(err) = self.backfill_positions(&collection, &layout).await {
                warn!(collection = %collection, field, error = %err, "cannot backfill positions");
            }
        }

        let mut outcomes = Vec::with_capacity(specs.len());
        for (position, spec) in specs {
            let outcome = match plan(&spec, &live) {
                IndexPlan::Unchanged => ReconcileOutcome::Unchanged,
                IndexPlan::Conflict(reason) => ReconcileOutcome::Conflict(reason),
                IndexPlan::Create => match self.store.create_index(&spec).await {
                    Ok(name) => {
                        debug!(collection = %collection, index = %name, "index created");
                        live.push(LiveIndex::from_spec(&spec));
                        ReconcileOutcome::Created
                    }
                    Err(StoreError::IndexConflict(conflicts)) => ReconcileOutcome::Conflict(
                        conflicts
                            .into_iter()
                            .map(|c| c.reason)
                            .collect::<Vec<_>>()
                            .join("; "),
                    ),
                    Err(err) => ReconcileOutcome::Failed(err.to_string()),
                },
            };
            outcomes.push((position, spec, outcome));
        }
        outcomes
    }

    /// Write the geospatial field of records that only carry scalar coordinates.
    ///
    /// Returns the number of records updated. Records whose coordinates are
    /// out of range are left alone.
    pub async fn backfill_positions(&self, collection: &str, layout: &GeoLayout) -> StoreResult<u64> {
        let filter = FilterBuilder::new()
            .exists(&layout.geo_field, false)
            .exists(&layout.latitude_field, true)
            .exists(&layout.longitude_field, true)
            .build();
        let mut projection = Document::new();
        projection.insert(layout.latitude_field.as_str(), 1);
        projection.insert(layout.longitude_field.as_str(), 1);
        let options = QueryOptions {
            projection: Some(projection),
            ..QueryOptions::default()
        };

        let records = self.store.find(collection, filter, options).await?;
        let mut updated = 0;
        for record in &records {
            let Some(id) = record.get("_id") else {
                continue;
            };
            let Some(point) = record.get_point(&layout.latitude_field, &layout.longitude_field)
            else {
                debug!(collection = %collection, id = %id, "coordinates out of range, not backfilled");
                continue;
            };
            let mut fields = Document::new();
            fields.insert(layout.geo_field.as_str(), geojson_point(&point));
            if self.store.set_fields(collection, id, fields).await? {
                updated += 1;
            }
        }

        if updated > 0 {
            info!(collection = %collection, field = %layout.geo_field, updated, "positions backfilled");
        }
        Ok(updated)
    }

    /// Compare declarations against the live store without creating anything.
    pub async fn verify(&self, specs: &[IndexSpec]) -> StoreResult<VerifyReport> {
        let mut report = VerifyReport::default();

        for (collection, group) in group_by_collection(specs) {
            let live = self.store.list_indexes(&collection).await?;
            for (_, spec) in group {
                let status = match plan(&spec, &live) {
                    IndexPlan::Unchanged => IndexStatus::Present,
                    IndexPlan::Create => IndexStatus::Missing,
                    IndexPlan::Conflict(reason) => IndexStatus::Drifted(reason),
                };
                report.entries.push((spec, status));
            }
        }

        debug!(
            missing = report.missing().len(),
            drifted = report.drifted().len(),
            "indexes verified"
        );
        Ok(report)
    }
}

fn group_by_collection(specs: &[IndexSpec]) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    for (position, spec) in specs.iter().enumerate() {
        match groups
            .iter_mut()
            .find(|(collection, _)| collection.as_str() == spec.collection.as_str())
        {
            Some((_, members)) => members.push((position, spec.clone())),
            None => groups.push((spec.collection.to_string(), vec![(position, spec.clone())])),
        }
    }
    groups
}

/// State of one declaration in the live store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStatus {
    /// An equivalent index exists.
    Present,
    /// No equivalent index exists.
    Missing,
    /// A live index collides with the declaration.
    Drifted(String),
}

/// Result of [`IndexRegistry::verify`].
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// Each declaration with its status.
    pub entries: Vec<(IndexSpec, IndexStatus)>,
}

impl VerifyReport {
    /// Declarations without a live index.
    pub fn missing(&self) -> Vec<&IndexSpec> {
        self.entries
            .iter()
            .filter(|(_, status)| *status == IndexStatus::Missing)
            .map(|(spec, _)| spec)
            .collect()
    }

    /// Declarations that collide with a live index, with the difference.
    pub fn drifted(&self) -> Vec<(&IndexSpec, &str)> {
        self.entries
            .iter()
            .filter_map(|(spec, status)| match status {
                IndexStatus::Drifted(reason) => Some((spec, reason.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Whether every declaration is present.
    pub fn is_clean(&self) -> bool {
        self.entries
            .iter()
            .all(|(_, status)| *status == IndexStatus::Present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use bson::doc;
    use pretty_assertions::assert_eq;

    fn specs() -> Vec<IndexSpec> {
        vec![
            IndexSpec::builder("users").asc("phone").unique().required().build(),
            IndexSpec::builder("venues").sphere("location").required().build(),
            IndexSpec::builder("users").asc("email").unique().sparse().build(),
            IndexSpec::builder("venues").asc("city").asc("is_active").build(),
        ]
    }

    #[tokio::test]
    async fn test_reconcile_creates_then_unchanged() {
        let registry = IndexRegistry::new(MemoryStore::handle());

        let first = registry.reconcile(&specs()).await.unwrap();
        assert_eq!(first.created(), 4);
        assert!(first.is_clean());
        // Report keeps declaration order.
        assert_eq!(first.entries[2].0.name(), "email_1");

        let second = registry.reconcile(&specs()).await.unwrap();
        assert_eq!(second.created(), 0);
        assert_eq!(second.unchanged(), 4);
    }

    #[tokio::test]
    async fn test_reconcile_reports_drift() {
        let store = MemoryStore::handle();
        let registry = IndexRegistry::new(store.clone());
        store
            .create_index(&IndexSpec::builder("users").asc("phone").build())
            .await
            .unwrap();

        let err = registry.reconcile(&specs()).await.unwrap_err();
        let StoreError::IndexConflict(conflicts) = err else {
            panic!("expected conflict");
        };
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].spec.qualified_name(), "users.phone_1");
        assert!(conflicts[0].reason.contains("unique"));

        // Unaffected declarations were still applied.
        let live = store.list_indexes("venues").await.unwrap();
        assert!(live.iter().any(|idx| idx.name == "location_2dsphere"));
    }

    #[tokio::test]
    async fn test_required_index_blocked_by_data() {
        let store = MemoryStore::handle();
        store.insert_one("users", doc! { "phone": "100" }).await.unwrap();
        store.insert_one("users", doc! { "phone": "100" }).await.unwrap();

        let registry = IndexRegistry::new(store);
        let err = registry.reconcile(&specs()).await.unwrap_err();
        let StoreError::MissingIndex(missing) = err else {
            panic!("expected missing index");
        };
        assert_eq!(missing, vec!["users.phone_1".to_string()]);
    }

    #[tokio::test]
    async fn test_optional_failure_is_kept_in_report() {
        let store = MemoryStore::handle();
        store
            .insert_one("users", doc! { "phone": "100", "email": "a@b.com" })
            .await
            .unwrap();
        store
            .insert_one("users", doc! { "phone": "200", "email": "a@b.com" })
            .await
            .unwrap();

        let registry = IndexRegistry::new(store);
        let report = registry.reconcile(&specs()).await.unwrap();
        assert_eq!(report.failures().len(), 1);
        assert!(!report.is_clean());
        assert!(matches!(
            report.outcome("users.email_1"),
            Some(ReconcileOutcome::Failed(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_is_read_only() {
        let store = MemoryStore::handle();
        let registry = IndexRegistry::new(store.clone());

        let report = registry.verify(&specs()).await.unwrap();
        assert_eq!(report.missing().len(), 4);
        assert!(store.list_indexes("users").await.unwrap().len() == 1);

        registry.reconcile(&specs()).await.unwrap();
        assert!(registry.verify(&specs()).await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_verify_reports_drift() {
        let store = MemoryStore::handle();
        store
            .create_index(&IndexSpec::builder("venues").sphere("location").name("geo").build())
            .await
            .unwrap();
        let registry = IndexRegistry::new(store);

        let declared = vec![IndexSpec::builder("venues").sphere("location").unique().build()];
        let report = registry.verify(&declared).await.unwrap();
        assert_eq!(report.drifted().len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_backfills_scalar_positions() {
        let store = MemoryStore::handle();
        store
            .insert_one("venues", doc! { "_id": 1, "latitude": 23.0225, "longitude": 72.5714 })
            .await
            .unwrap();
        store
            .insert_one("venues", doc! { "_id": 2, "latitude": 95.0, "longitude": 72.0 })
            .await
            .unwrap();
        store.insert_one("venues", doc! { "_id": 3, "city": "Surat" }).await.unwrap();

        IndexRegistry::new(store.clone()).reconcile(&specs()).await.unwrap();

        let placed = store
            .find("venues", doc! { "location": { "$exists": true } }, QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(placed.len(), 1);
        assert_eq!(
            placed[0].get_document("location").unwrap(),
            &doc! { "type": "Point", "coordinates": [72.5714, 23.0225] }
        );
    }

    #[tokio::test]
    async fn test_backfill_is_idempotent() {
        let store = MemoryStore::handle();
        store
            .insert_one("shops", doc! { "latitude": 21.1702, "longitude": 72.8311 })
            .await
            .unwrap();
        let registry = IndexRegistry::new(store);

        let layout = GeoLayout::default();
        assert_eq!(registry.backfill_positions("shops", &layout).await.unwrap(), 1);
        assert_eq!(registry.backfill_positions("shops", &layout).await.unwrap(), 0);
    }

    #[test]
    fn test_group_by_collection() {
        let groups = group_by_collection(&specs());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "users");
        assert_eq!(
            groups[0].1.iter().map(|(p, _)| *p).collect::<Vec<_>>(),
            vec![0, 2]
        );
    }
}
