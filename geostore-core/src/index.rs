//! Index declarations and drift detection.
//!
//! An [`IndexSpec`] is a static declaration of an index a collection must
//! carry. [`plan`] compares a declaration against the indexes already present
//! in the store and decides whether to create it, leave it alone, or report a
//! conflict. The decision is pure so the same rules apply to every backend.
//!
//! ```rust
//! use geostore_core::index::{IndexSpec, LiveIndex, IndexPlan, plan};
//!
//! let spec = IndexSpec::builder("bookings").asc("booking_number").unique().required().build();
//! assert_eq!(spec.name(), "booking_number_1");
//!
//! // Nothing in the store yet: create it.
//! assert_eq!(plan(&spec, &[]), IndexPlan::Create);
//!
//! // Same declaration already live: no-op.
//! let live = LiveIndex::from_spec(&spec);
//! assert_eq!(plan(&spec, &[live]), IndexPlan::Unchanged);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Direction or kind of a single index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexDirection {
    /// Ascending (1).
    Ascending,
    /// Descending (-1).
    Descending,
    /// Spherical geospatial index (`2dsphere`).
    Sphere2d,
}

impl IndexDirection {
    /// The token used by the store in index names.
    pub fn as_name_part(&self) -> &'static str {
        match self {
            Self::Ascending => "1",
            Self::Descending => "-1",
            Self::Sphere2d => "2dsphere",
        }
    }
}

/// One `(field, direction)` pair of an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexKey {
    /// Field path.
    pub field: SmolStr,
    /// Direction or index kind.
    pub direction: IndexDirection,
}

impl IndexKey {
    /// Create a new index key.
    pub fn new(field: impl Into<SmolStr>, direction: IndexDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Options that change index semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Reject writes that duplicate the key.
    pub unique: bool,
    /// Skip documents missing the indexed fields.
    pub sparse: bool,
}

/// Static declaration of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Target collection.
    pub collection: SmolStr,
    /// Ordered key list.
    pub keys: Vec<IndexKey>,
    /// Index options.
    pub options: IndexOptions,
    /// Whether startup must fail if this index cannot be provisioned.
    pub required: bool,
    /// Explicit name; derived from the keys when absent.
    pub name: Option<SmolStr>,
}

impl IndexSpec {
    /// Start declaring an index on a collection.
    pub fn builder(collection: impl Into<SmolStr>) -> IndexSpecBuilder {
        IndexSpecBuilder::new(collection)
    }

    /// Index name as the store will report it.
    pub fn name(&self) -> String {
        match &self.name {
            Some(name) => name.to_string(),
            None => default_index_name(&self.keys),
        }
    }

    /// `collection.name`, used in reports.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.collection, self.name())
    }

    /// Whether any key is geospatial.
    pub fn is_geospatial(&self) -> bool {
        self.keys
            .iter()
            .any(|k| k.direction == IndexDirection::Sphere2d)
    }

    /// The geospatial field, if this is a geospatial index.
    pub fn geo_field(&self) -> Option<&str> {
        self.keys
            .iter()
            .find(|k| k.direction == IndexDirection::Sphere2d)
            .map(|k| k.field.as_str())
    }
}

/// Builder for [`IndexSpec`].
#[derive(Debug)]
pub struct IndexSpecBuilder {
    spec: IndexSpec,
}

impl IndexSpecBuilder {
    /// Create a new builder for the given collection.
    pub fn new(collection: impl Into<SmolStr>) -> Self {
        Self {
            spec: IndexSpec {
                collection: collection.into(),
                keys: Vec::new(),
                options: IndexOptions::default(),
                required: false,
                name: None,
            },
        }
    }

    /// Add an ascending key.
    pub fn asc(mut self, field: impl Into<SmolStr>) -> Self {
        self.spec
            .keys
            .push(IndexKey::new(field, IndexDirection::Ascending));
        self
    }

    /// Add a descending key.
    pub fn desc(mut self, field: impl Into<SmolStr>) -> Self {
        self.spec
            .keys
            .push(IndexKey::new(field, IndexDirection::Descending));
        self
    }

    /// Add a `2dsphere` key.
    pub fn sphere(mut self, field: impl Into<SmolStr>) -> Self {
        self.spec
            .keys
            .push(IndexKey::new(field, IndexDirection::Sphere2d));
        self
    }

    /// Mark the index unique.
    pub fn unique(mut self) -> Self {
        self.spec.options.unique = true;
        self
    }

    /// Mark the index sparse.
    pub fn sparse(mut self) -> Self {
        self.spec.options.sparse = true;
        self
    }

    /// Startup fails when this index is missing.
    pub fn required(mut self) -> Self {
        self.spec.required = true;
        self
    }

    /// Override the derived name.
    pub fn name(mut self, name: impl Into<SmolStr>) -> Self {
        self.spec.name = Some(name.into());
        self
    }

    /// Build the declaration.
    pub fn build(self) -> IndexSpec {
        self.spec
    }
}

/// Store naming convention: `field_1_other_-1`, `location_2dsphere`.
pub fn default_index_name(keys: &[IndexKey]) -> String {
    keys.iter()
        .map(|k| format!("{}_{}", k.field, k.direction.as_name_part()))
        .collect::<Vec<_>>()
        .join("_")
}

/// An index as reported by the live store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveIndex {
    /// Index name.
    pub name: String,
    /// Ordered key list.
    pub keys: Vec<IndexKey>,
    /// Index options.
    pub options: IndexOptions,
}

impl LiveIndex {
    /// Describe the index a spec would create.
    pub fn from_spec(spec: &IndexSpec) -> Self {
        Self {
            name: spec.name(),
            keys: spec.keys.clone(),
            options: spec.options,
        }
    }

    /// The implicit primary key index every collection carries.
    pub fn primary() -> Self {
        Self {
            name: "_id_".to_string(),
            keys: vec![IndexKey::new("_id", IndexDirection::Ascending)],
            options: IndexOptions {
                unique: true,
                sparse: false,
            },
        }
    }

    /// Whether this index enforces uniqueness (the primary index always does).
    pub fn enforces_uniqueness(&self) -> bool {
        self.options.unique || self.name == "_id_"
    }
}

/// What reconciliation should do with one declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexPlan {
    /// No equivalent index exists.
    Create,
    /// An equivalent index already exists.
    Unchanged,
    /// A live index collides with the declaration.
    Conflict(String),
}

/// Decide how a declaration relates to the live indexes of its collection.
///
/// A live index with the same name must have the same keys and options.
/// A live index with the same keys under another name counts as equivalent
/// only when its options match.
pub fn plan(spec: &IndexSpec, live: &[LiveIndex]) -> IndexPlan {
    let name = spec.name();

    if let Some(existing) = live.iter().find(|idx| idx.name == name) {
        return match describe_drift(spec, existing) {
            None => IndexPlan::Unchanged,
            Some(reason) => IndexPlan::Conflict(reason),
        };
    }

    if let Some(existing) = live.iter().find(|idx| idx.keys == spec.keys) {
        return match describe_drift(spec, existing) {
            None => IndexPlan::Unchanged,
            Some(reason) => IndexPlan::Conflict(format!(
                "same keys as live index '{}': {}",
                existing.name, reason
            )),
        };
    }

    IndexPlan::Create
}

fn describe_drift(spec: &IndexSpec, live: &LiveIndex) -> Option<String> {
    let mut reasons = Vec::new();

    if live.keys != spec.keys {
        reasons.push(format!(
            "keys differ (declared {}, live {})",
            default_index_name(&spec.keys),
            default_index_name(&live.keys)
        ));
    }
    if live.options.unique != spec.options.unique {
        reasons.push(format!(
            "unique differs (declared {}, live {})",
            spec.options.unique, live.options.unique
        ));
    }
    if live.options.sparse != spec.options.sparse {
        reasons.push(format!(
            "sparse differs (declared {}, live {})",
            spec.options.sparse, live.options.sparse
        ));
    }

    if reasons.is_empty() {
        None
    } else {
        Some(reasons.join(", "))
    }
}

/// A declared index that drifts from the live store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConflict {
    /// The declaration that could not be applied.
    pub spec: IndexSpec,
    /// What differs.
    pub reason: String,
}

impl IndexConflict {
    /// Create a new conflict.
    pub fn new(spec: IndexSpec, reason: impl Into<String>) -> Self {
        Self {
            spec,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for IndexConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.spec.qualified_name(), self.reason)
    }
}

/// Outcome of reconciling one declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The index was created.
    Created,
    /// An equivalent index already existed.
    Unchanged,
    /// The declaration drifts from the live index.
    Conflict(String),
    /// The store rejected the operation.
    Failed(String),
}

impl ReconcileOutcome {
    /// Whether the index is present after reconciliation.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Created | Self::Unchanged)
    }
}

/// Per-declaration results of a reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Each declaration with its outcome.
    pub entries: Vec<(IndexSpec, ReconcileOutcome)>,
}

impl ReconcileReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome.
    pub fn push(&mut self, spec: IndexSpec, outcome: ReconcileOutcome) {
        self.entries.push((spec, outcome));
    }

    /// Number of indexes created.
    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, ReconcileOutcome::Created))
    }

    /// Number of indexes left untouched.
    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, ReconcileOutcome::Unchanged))
    }

    /// All conflicts.
    pub fn conflicts(&self) -> Vec<IndexConflict> {
        self.entries
            .iter()
            .filter_map(|(spec, outcome)| match outcome {
                ReconcileOutcome::Conflict(reason) => {
                    Some(IndexConflict::new(spec.clone(), reason.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Declarations the store rejected, with the store's message.
    pub fn failures(&self) -> Vec<(&IndexSpec, &str)> {
        self.entries
            .iter()
            .filter_map(|(spec, outcome)| match outcome {
                ReconcileOutcome::Failed(msg) => Some((spec, msg.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Required declarations that are not present.
    pub fn missing_required(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(spec, outcome)| spec.required && !outcome.is_present())
            .map(|(spec, _)| spec.qualified_name())
            .collect()
    }

    /// Whether every declaration is present.
    pub fn is_clean(&self) -> bool {
        self.entries.iter().all(|(_, o)| o.is_present())
    }

    /// Get the outcome for a qualified index name.
    pub fn outcome(&self, qualified_name: &str) -> Option<&ReconcileOutcome> {
        self.entries
            .iter()
            .find(|(spec, _)| spec.qualified_name() == qualified_name)
            .map(|(_, outcome)| outcome)
    }

    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} created, {} unchanged, {} conflicts, {} failed",
            self.created(),
            self.unchanged(),
            self.count(|o| matches!(o, ReconcileOutcome::Conflict(_))),
            self.count(|o| matches!(o, ReconcileOutcome::Failed(_)))
        )
    }

    fn count(&self, pred: impl Fn(&ReconcileOutcome) -> bool) -> usize {
        self.entries.iter().filter(|(_, o)| pred(o)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_names() {
        let spec = IndexSpec::builder("bookings")
            .asc("booking_date")
            .asc("venue_id")
            .build();
        assert_eq!(spec.name(), "booking_date_1_venue_id_1");

        let spec = IndexSpec::builder("venues").sphere("location").build();
        assert_eq!(spec.name(), "location_2dsphere");
        assert!(spec.is_geospatial());
        assert_eq!(spec.geo_field(), Some("location"));

        let spec = IndexSpec::builder("managers").desc("created_at").build();
        assert_eq!(spec.name(), "created_at_-1");
    }

    #[test]
    fn test_explicit_name() {
        let spec = IndexSpec::builder("users")
            .asc("email")
            .name("email_unique")
            .build();
        assert_eq!(spec.name(), "email_unique");
        assert_eq!(spec.qualified_name(), "users.email_unique");
    }

    #[test]
    fn test_plan_same_name_different_options() {
        let spec = IndexSpec::builder("users").asc("phone").unique().build();
        let mut live = LiveIndex::from_spec(&spec);
        live.options.unique = false;

        match plan(&spec, &[LiveIndex::primary(), live]) {
            IndexPlan::Conflict(reason) => assert!(reason.contains("unique differs")),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_same_name_different_keys() {
        let spec = IndexSpec::builder("users").asc("phone").build();
        let live = LiveIndex {
            name: "phone_1".into(),
            keys: vec![IndexKey::new("phone", IndexDirection::Descending)],
            options: IndexOptions::default(),
        };
        assert!(matches!(plan(&spec, &[live]), IndexPlan::Conflict(_)));
    }

    #[test]
    fn test_plan_same_keys_other_name() {
        let spec = IndexSpec::builder("dictionary").asc("slug").unique().sparse().build();
        let live = LiveIndex {
            name: "slug_unique".into(),
            keys: spec.keys.clone(),
            options: spec.options,
        };
        assert_eq!(plan(&spec, &[live.clone()]), IndexPlan::Unchanged);

        let mut drifted = live;
        drifted.options.sparse = false;
        assert!(matches!(plan(&spec, &[drifted]), IndexPlan::Conflict(_)));
    }

    #[test]
    fn test_report_counts() {
        let a = IndexSpec::builder("venues").sphere("location").required().build();
        let b = IndexSpec::builder("venues").asc("city").build();
        let c = IndexSpec::builder("users").asc("phone").unique().required().build();

        let mut report = ReconcileReport::new();
        report.push(a, ReconcileOutcome::Created);
        report.push(b.clone(), ReconcileOutcome::Failed("disk full".into()));
        report.push(c, ReconcileOutcome::Conflict("unique differs".into()));

        assert_eq!(report.created(), 1);
        assert_eq!(report.unchanged(), 0);
        assert_eq!(report.conflicts().len(), 1);
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.missing_required(), vec!["users.phone_1".to_string()]);
        assert!(!report.is_clean());
        assert_eq!(
            report.outcome("venues.city_1"),
            Some(&ReconcileOutcome::Failed("disk full".into()))
        );
        assert_eq!(
            report.summary(),
            "1 created, 0 unchanged, 1 conflicts, 1 failed"
        );
    }
}
