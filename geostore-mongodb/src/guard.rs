//! Collision-free allocation of human-facing identifiers.
//!
//! The guard never locks. It proposes a candidate, inserts the record that
//! carries it, and lets the unique index on the identifier field arbitrate.
//! A duplicate-key rejection means another writer won the candidate, so the
//! guard proposes the next one until its attempt budget runs out.

use bson::{Document, doc};
use chrono::{NaiveDate, Utc};
use geostore_core::deadline::with_deadline;
use geostore_core::index::{IndexDirection, IndexKey, default_index_name};
use geostore_core::{Deadline, Identifier, IdentifierRule, StoreError, StoreResult};
use tracing::{debug, warn};

use crate::catalog;
use crate::store::{DocumentStore, QueryOptions, StoreHandle};
use crate::types::bson_to_u64;

/// Field recording the allocation scope (the rule's prefix by default).
pub const SCOPE_FIELD: &str = "_scope";
/// Field recording the sequence number of a sequence identifier.
pub const SEQUENCE_FIELD: &str = "_seq";
/// Field recording when the identifier was confirmed.
pub const ALLOCATED_AT_FIELD: &str = "allocated_at";
/// Attempt budget when none is given.
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// What to allocate and where.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRequest {
    /// Collection whose unique index arbitrates.
    pub collection: String,
    /// Identifier field (carries the unique index).
    pub field: String,
    /// Name of the unique index on `field`.
    pub index: String,
    /// Sequence scope; numbering restarts per scope.
    pub scope: String,
    /// Candidate rule.
    pub rule: IdentifierRule,
    /// Maximum inserts to try.
    pub max_attempts: u32,
    /// Deadline across all attempts.
    pub deadline: Option<Deadline>,
    /// Record inserted together with the identifier.
    pub payload: Document,
}

impl AllocationRequest {
    /// Allocate `field` in `collection` following `rule`.
    pub fn new(collection: impl Into<String>, field: impl Into<String>, rule: IdentifierRule) -> Self {
        let field = field.into();
        let index = default_index_name(&[IndexKey::new(field.as_str(), IndexDirection::Ascending)]);
        Self {
            collection: collection.into(),
            field,
            index,
            scope: rule.prefix().to_string(),
            rule,
            max_attempts: DEFAULT_ATTEMPTS,
            deadline: None,
            payload: Document::new(),
        }
    }

    /// A venue booking numbered within `date`.
    pub fn booking(date: NaiveDate, payload: Document) -> Self {
        Self::new(
            catalog::BOOKINGS,
            "booking_number",
            IdentifierRule::booking_number(date),
        )
        .payload(payload)
    }

    /// A professional booking with a random token.
    pub fn professional_booking(payload: Document) -> Self {
        Self::new(
            catalog::PROFESSIONAL_BOOKINGS,
            "booking_number",
            IdentifierRule::professional_booking(),
        )
        .payload(payload)
    }

    /// Set the sequence scope.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Name the unique index when it was not created under its default name.
    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = name.into();
        self
    }

    /// Set the attempt budget.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Bound every attempt together by a deadline.
    pub fn deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the record to insert.
    pub fn payload(mut self, payload: Document) -> Self {
        self.payload = payload;
        self
    }

    /// Check the request without touching the store.
    pub fn validate(&self) -> StoreResult<()> {
        if self.collection.is_empty() || self.field.is_empty() {
            return Err(StoreError::invalid_query(
                "allocation needs a collection and a field",
            ));
        }
        if self.max_attempts == 0 {
            return Err(StoreError::invalid_query("attempt budget must be positive"));
        }
        self.rule.validate()?;

        for reserved in [self.field.as_str(), SCOPE_FIELD, SEQUENCE_FIELD] {
            if self.payload.contains_key(reserved) {
                return Err(StoreError::invalid_query(format!(
                    "payload must not set '{}'",
                    reserved
                )));
            }
        }
        Ok(())
    }

    fn record(&self, value: &str, sequence: Option<u64>) -> Document {
        let mut record = self.payload.clone();
        record.insert(self.field.as_str(), value);
        record.insert(SCOPE_FIELD, self.scope.as_str());
        if let Some(n) = sequence {
            record.insert(SEQUENCE_FIELD, n as i64);
        }
        record.insert(ALLOCATED_AT_FIELD, bson::DateTime::from_chrono(Utc::now()));
        record
    }
}

/// Allocates identifiers confirmed by the store's unique index.
#[derive(Debug, Clone)]
pub struct UniquenessGuard {
    store: StoreHandle,
}

impl UniquenessGuard {
    /// Create a guard over a store handle.
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Insert the payload under a fresh identifier.
    ///
    /// Fails with `StoreError::AllocationExhausted` when every attempt lost
    /// to another writer and with `StoreError::Timeout` when the deadline
    /// passes first. The returned identifier is always stored.
    pub async fn allocate(&self, request: AllocationRequest) -> StoreResult<Identifier> {
        request.validate()?;
        with_deadline(request.deadline.as_ref(), self.attempt(&request)).await
    }

    async fn attempt(&self, request: &AllocationRequest) -> StoreResult<Identifier> {
        let mut last_failed = 0u64;

        for attempt in 1..=request.max_attempts {
            let (value, sequence) = match request.rule {
                IdentifierRule::Sequence { .. } => {
                    let n = self.highest_sequence(request).await?.max(last_failed) + 1;
                    (request.rule.sequence_candidate(n), Some(n))
                }
                IdentifierRule::RandomToken { .. } => (request.rule.random_candidate(), None),
            };

            match self
                .store
                .insert_one(&request.collection, request.record(&value, sequence))
                .await
            {
                Ok(_) => {
                    debug!(
                        collection = %request.collection,
                        identifier = %value,
                        attempt,
                        "identifier allocated"
                    );
                    return Ok(Identifier {
                        value,
                        sequence,
                        attempts: attempt,
                    });
                }
                Err(err) if is_identifier_collision(&err, &request.index) => {
                    debug!(
                        collection = %request.collection,
                        identifier = %value,
                        attempt,
                        "identifier taken, retrying"
                    );
                    if let Some(n) = sequence {
                        last_failed = last_failed.max(n);
                    }
                }
                Err(err) => return Err(err),
            }
        }

        warn!(
            collection = %request.collection,
            field = %request.field,
            attempts = request.max_attempts,
            "identifier allocation exhausted"
        );
        Err(StoreError::AllocationExhausted {
            collection: request.collection.clone(),
            field: request.field.clone(),
            attempts: request.max_attempts,
        })
    }

    /// Highest sequence stored for the request's scope (0 when none).
    async fn highest_sequence(&self, request: &AllocationRequest) -> StoreResult<u64> {
        let mut filter = Document::new();
        filter.insert(SCOPE_FIELD, request.scope.as_str());
        filter.insert(SEQUENCE_FIELD, doc! { "$exists": true });

        let mut sort = Document::new();
        sort.insert(SEQUENCE_FIELD, -1);
        let mut projection = Document::new();
        projection.insert(SEQUENCE_FIELD, 1);

        let options = QueryOptions {
            sort: Some(sort),
            limit: Some(1),
            projection: Some(projection),
        };
        let top = self.store.find(&request.collection, filter, options).await?;
        Ok(top
            .first()
            .and_then(|record| record.get(SEQUENCE_FIELD))
            .and_then(bson_to_u64)
            .unwrap_or(0))
    }
}

/// Whether a write failed because the identifier itself was taken.
///
/// Only a duplicate on the identifier's own index is retryable. Duplicates
/// on any other unique index, or on an index the store did not name, are not.
fn is_identifier_collision(err: &StoreError, identifier_index: &str) -> bool {
    matches!(err, StoreError::DuplicateKey { index, .. } if index == identifier_index)
}
