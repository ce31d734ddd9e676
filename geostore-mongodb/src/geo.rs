//! Location-ranked "nearby" queries.
//!
//! [`GeoQueryEngine::nearby`] asks the store for a native `$geoNear` ranking
//! on the collection's `2dsphere` key. When the store reports that no
//! geospatial index exists (or [`Strategy::BoundingBox`] is requested) the
//! engine scans a conservative latitude/longitude box instead and ranks the
//! candidates itself with the same earth radius the store uses. Both paths
//! order by distance, then `_id`.
//!
//! Records in range that carry scalar coordinates but no GeoJSON field are
//! invisible to `$geoNear`. The native path checks for them first: `Auto`
//! serves such queries from the bounding box and `Native` fails with
//! `StoreError::UnplacedRecords`.
//!
//! ```rust,no_run
//! use geostore_core::GeoPoint;
//! use geostore_mongodb::{GeoQueryEngine, Listing, MemoryStore};
//!
//! # async fn example() -> geostore_core::StoreResult<()> {
//! let engine = GeoQueryEngine::new(MemoryStore::handle());
//! let origin = GeoPoint::new(12.97, 77.59)?;
//! let hits = engine.nearby(&Listing::Venues.query(origin, 5.0).limit(10)).await?;
//! for hit in hits {
//!     println!("{:.1} km", hit.distance_km);
//! }
//! # Ok(())
//! # }
//! ```

use std::cmp::Ordering;
use std::time::Duration;

use bson::{Bson, Document};
use futures::future::try_join_all;
use geostore_core::deadline::with_deadline;
use geostore_core::geo::validate_radius_km;
use geostore_core::{Deadline, GeoPoint, StoreError, StoreResult};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::catalog;
use crate::document::{DocumentExt, from_document};
use crate::filter::{FilterBuilder, and_also, within_box};
use crate::store::{DocumentStore, GeoNearRequest, QueryOptions, StoreHandle};
use crate::types::{bson_to_f64, compare_bson};

/// Page size when none is requested.
pub const DEFAULT_LIMIT: i64 = 20;
/// Largest page a caller may request.
pub const MAX_LIMIT: i64 = 100;

/// Field the native path writes distances into; stripped from results.
const DISTANCE_FIELD: &str = "__geo_distance_m";

/// Where a collection keeps record positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoLayout {
    /// GeoJSON point field carrying the `2dsphere` index.
    pub geo_field: String,
    /// Scalar latitude field.
    pub latitude_field: String,
    /// Scalar longitude field.
    pub longitude_field: String,
}

impl Default for GeoLayout {
    fn default() -> Self {
        Self {
            geo_field: catalog::LOCATION_FIELD.to_string(),
            latitude_field: "latitude".to_string(),
            longitude_field: "longitude".to_string(),
        }
    }
}

/// How [`GeoQueryEngine::nearby`] ranks records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Native ranking, falling back to the bounding box without an index.
    #[default]
    Auto,
    /// Native ranking only; a missing index is an error.
    Native,
    /// Bounding-box scan ranked in process.
    BoundingBox,
}

/// A radius query around a point.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyQuery {
    /// Target collection.
    pub collection: String,
    /// Position fields of the collection.
    pub layout: GeoLayout,
    /// Query origin.
    pub origin: GeoPoint,
    /// Search radius in kilometres.
    pub radius_km: f64,
    /// Predicate evaluated by the store.
    pub filter: Document,
    /// Records to skip after ordering.
    pub skip: u64,
    /// Maximum records to return.
    pub limit: i64,
    /// Ranking strategy.
    pub strategy: Strategy,
    /// Deadline for the whole query.
    pub deadline: Option<Deadline>,
}

impl NearbyQuery {
    /// Query `collection` for records within `radius_km` of `origin`.
    pub fn new(collection: impl Into<String>, origin: GeoPoint, radius_km: f64) -> Self {
        Self {
            collection: collection.into(),
            layout: GeoLayout::default(),
            origin,
            radius_km,
            filter: Document::new(),
            skip: 0,
            limit: DEFAULT_LIMIT,
            strategy: Strategy::Auto,
            deadline: None,
        }
    }

    /// Replace the predicate.
    pub fn filter(mut self, filter: Document) -> Self {
        self.filter = filter;
        self
    }

    /// Add conditions to the predicate.
    pub fn and(mut self, conditions: Document) -> Self {
        self.filter = FilterBuilder::from_doc(self.filter)
            .merge(conditions)
            .build();
        self
    }

    /// Set the position fields.
    pub fn layout(mut self, layout: GeoLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Skip the first `skip` records.
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Set the page size.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set the ranking strategy.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Bound the query by a deadline.
    pub fn deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Check the query without touching the store.
    pub fn validate(&self) -> StoreResult<()> {
        validate_radius_km(self.radius_km)?;
        if !(1..=MAX_LIMIT).contains(&self.limit) {
            return Err(StoreError::invalid_query(format!(
                "limit must be between 1 and {}, got {}",
                MAX_LIMIT, self.limit
            )));
        }
        if self.collection.is_empty() {
            return Err(StoreError::invalid_query("collection name is empty"));
        }
        Ok(())
    }

    fn geo_near_request(&self, paginate: bool) -> GeoNearRequest {
        GeoNearRequest {
            key: self.layout.geo_field.clone(),
            near: self.origin,
            max_distance_m: self.radius_km * 1000.0,
            query: self.filter.clone(),
            distance_field: DISTANCE_FIELD.to_string(),
            skip: if paginate { self.skip } else { 0 },
            limit: paginate.then_some(self.limit),
        }
    }
}

/// One ranked record.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyHit<T = Document> {
    /// The record.
    pub record: T,
    /// Great-circle distance from the origin in kilometres.
    pub distance_km: f64,
}

impl NearbyHit {
    /// The record identifier.
    pub fn id(&self) -> Option<&Bson> {
        self.record.get("_id")
    }

    /// Decode the record into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> StoreResult<NearbyHit<T>> {
        Ok(NearbyHit {
            record: from_document(self.record)?,
            distance_km: self.distance_km,
        })
    }
}

/// Marketplace listings that support nearby search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listing {
    /// Active venues.
    Venues,
    /// Active upcoming tournaments.
    Tournaments,
    /// Active shops.
    Shops,
    /// Open job postings.
    Jobs,
    /// Active academies from the sports dictionary.
    Academies,
}

impl Listing {
    /// Every listing, in display order.
    pub const ALL: [Listing; 5] = [
        Listing::Venues,
        Listing::Tournaments,
        Listing::Shops,
        Listing::Jobs,
        Listing::Academies,
    ];

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Venues => "venues",
            Self::Tournaments => "tournaments",
            Self::Shops => "shops",
            Self::Jobs => "jobs",
            Self::Academies => "academies",
        }
    }

    /// Backing collection.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Venues => catalog::VENUES,
            Self::Tournaments => catalog::TOURNAMENTS,
            Self::Shops => catalog::SHOPS,
            Self::Jobs => catalog::JOBS,
            Self::Academies => catalog::DICTIONARY,
        }
    }

    /// Predicate every result of this listing satisfies.
    pub fn base_filter(&self) -> Document {
        let filter = FilterBuilder::new();
        match self {
            Self::Venues | Self::Shops => filter.eq("is_active", true),
            Self::Tournaments => filter.eq("is_active", true).eq("status", "upcoming"),
            Self::Jobs => filter.eq("status", "active"),
            Self::Academies => filter.eq("is_active", true).eq("category", "Academy"),
        }
        .build()
    }

    /// Radius used when the caller gives none.
    pub fn default_radius_km(&self) -> f64 {
        match self {
            Self::Jobs => 100.0,
            _ => 50.0,
        }
    }

    /// A query for this listing around `origin`.
    pub fn query(&self, origin: GeoPoint, radius_km: f64) -> NearbyQuery {
        NearbyQuery::new(self.collection(), origin, radius_km).filter(self.base_filter())
    }
}

/// Per-listing result counts for one origin and radius.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyCounts {
    /// Search radius in kilometres.
    pub radius_km: f64,
    /// Count per listing, in [`Listing::ALL`] order.
    pub counts: Vec<(Listing, u64)>,
}

impl NearbyCounts {
    /// Count for one listing.
    pub fn get(&self, listing: Listing) -> u64 {
        self.counts
            .iter()
            .find(|(l, _)| *l == listing)
            .map_or(0, |(_, n)| *n)
    }

    /// Sum over all listings.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|(_, n)| n).sum()
    }
}

/// Executes [`NearbyQuery`] values against the store.
#[derive(Debug, Clone)]
pub struct GeoQueryEngine {
    store: StoreHandle,
    query_timeout: Option<Duration>,
}

impl GeoQueryEngine {
    /// Create an engine over a store handle.
    pub fn new(store: StoreHandle) -> Self {
        Self {
            store,
            query_timeout: None,
        }
    }

    /// Apply `timeout` to queries that carry no deadline of their own.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    fn deadline_for(&self, query: &NearbyQuery) -> Option<Deadline> {
        query
            .deadline
            .or_else(|| self.query_timeout.map(Deadline::after))
    }

    /// Records within the radius, nearest first.
    pub async fn nearby(&self, query: &NearbyQuery) -> StoreResult<Vec<NearbyHit>> {
        query.validate()?;
        let deadline = self.deadline_for(query);
        with_deadline(deadline.as_ref(), self.rank(query)).await
    }

    /// Like [`nearby`](Self::nearby), decoding each record into `T`.
    pub async fn nearby_as<T: DeserializeOwned>(
        &self,
        query: &NearbyQuery,
    ) -> StoreResult<Vec<NearbyHit<T>>> {
        self.nearby(query)
            .await?
            .into_iter()
            .map(NearbyHit::decode)
            .collect()
    }

    /// Number of records within the radius, ignoring pagination.
    pub async fn count(&self, query: &NearbyQuery) -> StoreResult<u64> {
        query.validate()?;
        let deadline = self.deadline_for(query);
        with_deadline(deadline.as_ref(), async {
            match query.strategy {
                Strategy::BoundingBox => Ok(self.scan(query).await?.len() as u64),
                Strategy::Native => self.native_count(query).await,
                Strategy::Auto => match self.native_count(query).await {
                    Err(
                        StoreError::GeoIndexUnavailable { .. } | StoreError::UnplacedRecords { .. },
                    ) => Ok(self.scan(query).await?.len() as u64),
                    other => other,
                },
            }
        })
        .await
    }

    /// Counts of every listing around `origin`.
    pub async fn nearby_counts(&self, origin: GeoPoint, radius_km: f64) -> StoreResult<NearbyCounts> {
        validate_radius_km(radius_km)?;
        let counts = try_join_all(Listing::ALL.iter().map(|listing| async move {
            let n = self.count(&listing.query(origin, radius_km)).await?;
            Ok::<_, StoreError>((*listing, n))
        }))
        .await?;

        debug!(
            latitude = origin.latitude(),
            longitude = origin.longitude(),
            radius_km,
            "nearby counts computed"
        );
        Ok(NearbyCounts { radius_km, counts })
    }

    async fn rank(&self, query: &NearbyQuery) -> StoreResult<Vec<NearbyHit>> {
        match query.strategy {
            Strategy::Native => self.native(query).await,
            Strategy::BoundingBox => Ok(paginate(self.scan(query).await?, query)),
            Strategy::Auto => match self.native(query).await {
                Err(StoreError::GeoIndexUnavailable { collection, field }) => {
                    warn!(
                        collection = %collection,
                        field = %field,
                        "no geospatial index, using bounding-box scan"
                    );
                    Ok(paginate(self.scan(query).await?, query))
                }
                Err(StoreError::UnplacedRecords {
                    collection,
                    field,
                    records,
                }) => {
                    warn!(
                        collection = %collection,
                        field = %field,
                        records,
                        "records without a geospatial field, using bounding-box scan"
                    );
                    Ok(paginate(self.scan(query).await?, query))
                }
                other => other,
            },
        }
    }

    /// Fail when records in range lack the geospatial field.
    async fn ensure_placed(&self, query: &NearbyQuery) -> StoreResult<()> {
        let layout = &query.layout;
        let bbox = query.origin.bounding_box(query.radius_km);
        let filter = and_also(
            &query.filter,
            FilterBuilder::from_doc(within_box(
                &bbox,
                &layout.latitude_field,
                &layout.longitude_field,
            ))
            .exists(&layout.geo_field, false)
            .build(),
        );

        let records = self.store.count(&query.collection, filter).await?;
        if records > 0 {
            return Err(StoreError::UnplacedRecords {
                collection: query.collection.clone(),
                field: layout.geo_field.clone(),
                records,
            });
        }
        Ok(())
    }

    async fn native(&self, query: &NearbyQuery) -> StoreResult<Vec<NearbyHit>> {
        self.ensure_placed(query).await?;
        let request = query.geo_near_request(true);
        let documents = self.store.geo_near(&query.collection, &request).await?;

        let hits = documents
            .into_iter()
            .map(|mut record| {
                let distance_m = record
                    .remove(DISTANCE_FIELD)
                    .as_ref()
                    .and_then(bson_to_f64)
                    .ok_or_else(|| StoreError::driver("geo result without a distance"))?;
                Ok(NearbyHit {
                    record,
                    distance_km: distance_m / 1000.0,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        debug!(collection = %query.collection, hits = hits.len(), "native nearby query");
        Ok(hits)
    }

    async fn native_count(&self, query: &NearbyQuery) -> StoreResult<u64> {
        self.ensure_placed(query).await?;
        let request = query.geo_near_request(false);
        self.store.geo_near_count(&query.collection, &request).await
    }

    /// Every record inside the radius, ranked, without pagination.
    async fn scan(&self, query: &NearbyQuery) -> StoreResult<Vec<NearbyHit>> {
        let layout = &query.layout;
        let bbox = query.origin.bounding_box(query.radius_km);
        let filter = and_also(
            &query.filter,
            within_box(&bbox, &layout.latitude_field, &layout.longitude_field),
        );

        let candidates = self
            .store
            .find(&query.collection, filter, QueryOptions::default())
            .await?;
        let scanned = candidates.len();

        let mut hits: Vec<NearbyHit> = candidates
            .into_iter()
            .filter_map(|record| {
                let point = record.get_point(&layout.latitude_field, &layout.longitude_field)?;
                let distance_km = query.origin.distance_km(&point);
                (distance_km <= query.radius_km).then_some(NearbyHit {
                    record,
                    distance_km,
                })
            })
            .collect();
        hits.sort_by(compare_hits);

        debug!(
            collection = %query.collection,
            scanned,
            hits = hits.len(),
            "bounding-box nearby scan"
        );
        Ok(hits)
    }
}

fn compare_hits(a: &NearbyHit, b: &NearbyHit) -> Ordering {
    a.distance_km
        .partial_cmp(&b.distance_km)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            compare_bson(
                a.id().unwrap_or(&Bson::Null),
                b.id().unwrap_or(&Bson::Null),
            )
        })
}

fn paginate(hits: Vec<NearbyHit>, query: &NearbyQuery) -> Vec<NearbyHit> {
    hits.into_iter()
        .skip(usize::try_from(query.skip).unwrap_or(usize::MAX))
        .take(usize::try_from(query.limit).unwrap_or(0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use crate::document::set_position;
    use crate::memory::MemoryStore;
    use geostore_core::IndexSpec;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    fn origin() -> GeoPoint {
        GeoPoint::new(12.97, 77.59).unwrap()
    }

    async fn seed(store: &StoreHandle, with_index: bool) {
        if with_index {
            store
                .create_index(&IndexSpec::builder("venues").sphere("location").build())
                .await
                .unwrap();
        }
        // Due east of the origin at 1.2, 3.0, 4.9 and 6.1 km.
        for (id, km, active) in [(4, 6.1, true), (2, 3.0, true), (1, 1.2, true), (3, 4.9, true), (5, 2.0, false)] {
            let mut record = doc! { "_id": id, "name": format!("venue-{}", id), "is_active": active };
            set_position(&mut record, &origin().destination(90.0, km));
            store.insert_one("venues", record).await.unwrap();
        }
    }

    fn ids(hits: &[NearbyHit]) -> Vec<i32> {
        hits.iter()
            .map(|h| h.record.get_i32("_id").unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_native_nearby() {
        let store = MemoryStore::handle();
        seed(&store, true).await;
        let engine = GeoQueryEngine::new(store);

        let query = Listing::Venues.query(origin(), 5.0).strategy(Strategy::Native);
        let hits = engine.nearby(&query).await.unwrap();
        assert_eq!(ids(&hits), vec![1, 2, 3]);
        assert!((hits[0].distance_km - 1.2).abs() < 1e-6);
        assert!(!hits[0].record.contains_key(DISTANCE_FIELD));
    }

    #[tokio::test]
    async fn test_auto_falls_back_without_index() {
        let store = MemoryStore::handle();
        seed(&store, false).await;
        let engine = GeoQueryEngine::new(store.clone());

        let native = engine
            .nearby(&Listing::Venues.query(origin(), 5.0).strategy(Strategy::Native))
            .await
            .unwrap_err();
        assert!(matches!(native, StoreError::GeoIndexUnavailable { .. }));

        let hits = engine.nearby(&Listing::Venues.query(origin(), 5.0)).await.unwrap();
        assert_eq!(ids(&hits), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_paths_agree() {
        let store = MemoryStore::handle();
        seed(&store, true).await;
        let engine = GeoQueryEngine::new(store);

        let query = NearbyQuery::new("venues", origin(), 10.0);
        let native = engine.nearby(&query.clone().strategy(Strategy::Native)).await.unwrap();
        let scanned = engine
            .nearby(&query.strategy(Strategy::BoundingBox))
            .await
            .unwrap();

        assert_eq!(ids(&native), ids(&scanned));
        for (a, b) in native.iter().zip(&scanned) {
            assert!((a.distance_km - b.distance_km).abs() / a.distance_km < 1e-3);
        }
    }

    #[tokio::test]
    async fn test_pagination_and_ties() {
        let store = MemoryStore::handle();
        let point = origin().destination(0.0, 1.0);
        for id in [3, 1, 2] {
            let mut record = doc! { "_id": id };
            set_position(&mut record, &point);
            store.insert_one("shops", record).await.unwrap();
        }
        let engine = GeoQueryEngine::new(store);

        let query = NearbyQuery::new("shops", origin(), 2.0)
            .strategy(Strategy::BoundingBox)
            .skip(1)
            .limit(1);
        assert_eq!(ids(&engine.nearby(&query).await.unwrap()), vec![2]);
    }

    #[tokio::test]
    async fn test_validation_precedes_store_access() {
        let store = MemoryStore::handle();
        let engine = GeoQueryEngine::new(store.clone());
        store.shutdown().await;

        for query in [
            NearbyQuery::new("venues", origin(), 0.0),
            NearbyQuery::new("venues", origin(), f64::NAN),
            NearbyQuery::new("venues", origin(), 5.0).limit(0),
            NearbyQuery::new("venues", origin(), 5.0).limit(MAX_LIMIT + 1),
        ] {
            let err = engine.nearby(&query).await.unwrap_err();
            assert!(err.is_invalid_query(), "{:?}", err);
        }
    }

    #[tokio::test]
    async fn test_nearby_as() {
        #[derive(Debug, Deserialize)]
        struct Venue {
            name: String,
        }

        let store = MemoryStore::handle();
        seed(&store, true).await;
        let engine = GeoQueryEngine::new(store);

        let hits = engine
            .nearby_as::<Venue>(&Listing::Venues.query(origin(), 2.0))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.name, "venue-1");
    }

    #[tokio::test]
    async fn test_nearby_counts() {
        let store = MemoryStore::handle();
        seed(&store, true).await;
        let mut job = doc! { "status": "active" };
        set_position(&mut job, &origin().destination(180.0, 20.0));
        store.insert_one("jobs", job).await.unwrap();
        let engine = GeoQueryEngine::new(store);

        let counts = engine.nearby_counts(origin(), 50.0).await.unwrap();
        assert_eq!(counts.get(Listing::Venues), 4);
        assert_eq!(counts.get(Listing::Jobs), 1);
        assert_eq!(counts.get(Listing::Shops), 0);
        assert_eq!(counts.total(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline() {
        let store = MemoryStore::handle();
        seed(&store, true).await;
        let engine = GeoQueryEngine::new(store);

        let deadline = Deadline::from_millis(10);
        tokio::time::advance(Duration::from_millis(20)).await;
        let err = engine
            .nearby(&Listing::Venues.query(origin(), 5.0).deadline(deadline))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_scalar_only_records() {
        let store = MemoryStore::handle();
        seed(&store, true).await;
        let point = origin().destination(0.0, 2.0);
        store
            .insert_one(
                "venues",
                doc! { "_id": 9, "is_active": true, "latitude": point.latitude(), "longitude": point.longitude() },
            )
            .await
            .unwrap();
        let engine = GeoQueryEngine::new(store);

        let query = Listing::Venues.query(origin(), 5.0);
        let auto = engine.nearby(&query).await.unwrap();
        let scanned = engine
            .nearby(&query.clone().strategy(Strategy::BoundingBox))
            .await
            .unwrap();
        assert_eq!(ids(&auto), vec![1, 9, 2, 3]);
        assert_eq!(ids(&auto), ids(&scanned));
        assert_eq!(engine.count(&query).await.unwrap(), 4);

        let err = engine
            .nearby(&query.strategy(Strategy::Native))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnplacedRecords { records: 1, .. }));
    }

    #[test]
    fn test_listing_filters() {
        assert_eq!(Listing::Academies.collection(), "dictionary");
        assert_eq!(
            Listing::Tournaments.base_filter(),
            doc! { "is_active": true, "status": "upcoming" }
        );
        assert_eq!(Listing::Jobs.default_radius_km(), 100.0);

        let query = Listing::Shops
            .query(origin(), 5.0)
            .and(doc! { "category": "Cricket" });
        assert_eq!(query.filter, doc! { "is_active": true, "category": "Cricket" });
    }
}
