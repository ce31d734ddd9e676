//! Integration tests for nearest-first radius queries.

mod common;

use std::time::Duration;

use common::{ids, origin, seed_venues};
use geostore::store::document::set_position;
use geostore::store::doc;
use geostore::{
    Deadline, DocumentStore, GeoStore, Listing, MemoryStore, NearbyQuery, StoreError,
    StoreSettings, Strategy,
};
use pretty_assertions::assert_eq;
use tokio_test::{assert_err, assert_ok};

async fn started() -> GeoStore {
    assert_ok!(GeoStore::with_store(MemoryStore::handle(), StoreSettings::default()).await)
}

/// Venues at 1.2, 3.0, 4.9 and 6.1 km with a 5 km radius
#[tokio::test]
async fn test_scenario_first_three_in_order() {
    let store = started().await;
    seed_venues(&store.handle()).await;

    let hits = assert_ok!(
        store
            .engine()
            .nearby(&Listing::Venues.query(origin(), 5.0))
            .await
    );
    assert_eq!(ids(&hits), vec![1, 2, 3]);

    let distances: Vec<f64> = hits.iter().map(|hit| hit.distance_km).collect();
    for (got, want) in distances.iter().zip([1.2, 3.0, 4.9]) {
        assert!((got - want).abs() < 1e-3, "{} vs {}", got, want);
    }
    assert!(distances.iter().all(|d| *d <= 5.0));
}

/// Native and bounding-box paths return the same ranking
#[tokio::test]
async fn test_native_and_fallback_agree() {
    let store = started().await;
    let handle = store.handle();
    seed_venues(&handle).await;
    for (i, bearing) in [15.0, 110.0, 200.0, 290.0, 340.0].into_iter().enumerate() {
        let id = 10 + i as i32;
        let mut record = doc! { "_id": id, "is_active": true };
        set_position(&mut record, &origin().destination(bearing, 2.5 + i as f64 * 1.7));
        assert_ok!(handle.insert_one("venues", record).await);
    }

    let query = Listing::Venues.query(origin(), 10.0).limit(100);
    let native = assert_ok!(
        store
            .engine()
            .nearby(&query.clone().strategy(Strategy::Native))
            .await
    );
    let fallback = assert_ok!(
        store
            .engine()
            .nearby(&query.strategy(Strategy::BoundingBox))
            .await
    );

    assert_eq!(native.len(), 9);
    assert_eq!(ids(&native), ids(&fallback));
    for (a, b) in native.iter().zip(&fallback) {
        assert!((a.distance_km - b.distance_km).abs() <= a.distance_km * 1e-3);
    }
}

/// Records stored with scalar coordinates only rank on every path
#[tokio::test]
async fn test_scalar_only_records_agree() {
    let handle = MemoryStore::handle();
    let before = origin().destination(0.0, 2.0);
    assert_ok!(
        handle
            .insert_one(
                "venues",
                doc! { "_id": 7, "is_active": true, "latitude": before.latitude(), "longitude": before.longitude() },
            )
            .await
    );
    seed_venues(&handle).await;

    // Startup writes the missing GeoJSON field.
    let store = assert_ok!(GeoStore::with_store(handle.clone(), StoreSettings::default()).await);
    let query = Listing::Venues.query(origin(), 5.0);
    for strategy in [Strategy::Auto, Strategy::Native, Strategy::BoundingBox] {
        let hits = assert_ok!(store.engine().nearby(&query.clone().strategy(strategy)).await);
        assert_eq!(ids(&hits), vec![1, 7, 2, 3], "{:?}", strategy);
    }

    // Written after startup: the native ranking cannot see it.
    let after = origin().destination(180.0, 2.5);
    assert_ok!(
        handle
            .insert_one(
                "venues",
                doc! { "_id": 8, "is_active": true, "latitude": after.latitude(), "longitude": after.longitude() },
            )
            .await
    );
    let auto = assert_ok!(store.engine().nearby(&query).await);
    let fallback = assert_ok!(
        store
            .engine()
            .nearby(&query.clone().strategy(Strategy::BoundingBox))
            .await
    );
    assert_eq!(ids(&auto), vec![1, 7, 8, 2, 3]);
    assert_eq!(ids(&auto), ids(&fallback));
    assert_eq!(assert_ok!(store.engine().count(&query).await), 5);

    let err = assert_err!(
        store
            .engine()
            .nearby(&query.strategy(Strategy::Native))
            .await
    );
    assert!(matches!(err, StoreError::UnplacedRecords { records: 1, .. }));
}

/// Collections without a geospatial index are served by the fallback
#[tokio::test]
async fn test_unindexed_collection_uses_fallback() {
    let handle = MemoryStore::handle();
    seed_venues(&handle).await;
    let engine = geostore::GeoQueryEngine::new(handle);

    let err = assert_err!(
        engine
            .nearby(&NearbyQuery::new("venues", origin(), 5.0).strategy(Strategy::Native))
            .await
    );
    assert!(matches!(err, StoreError::GeoIndexUnavailable { .. }));

    let hits = assert_ok!(engine.nearby(&NearbyQuery::new("venues", origin(), 5.0)).await);
    assert_eq!(ids(&hits), vec![1, 2, 3]);
}

/// Pages never overlap and follow the same order
#[tokio::test]
async fn test_pagination() {
    let store = started().await;
    seed_venues(&store.handle()).await;
    let engine = store.engine();

    let first = assert_ok!(
        engine
            .nearby(&Listing::Venues.query(origin(), 10.0).limit(2))
            .await
    );
    let second = assert_ok!(
        engine
            .nearby(&Listing::Venues.query(origin(), 10.0).skip(2).limit(2))
            .await
    );
    assert_eq!(ids(&first), vec![1, 2]);
    assert_eq!(ids(&second), vec![3, 4]);

    let count = assert_ok!(engine.count(&Listing::Venues.query(origin(), 10.0)).await);
    assert_eq!(count, 4);
}

/// Counts per listing share the same origin and radius
#[tokio::test]
async fn test_nearby_counts() {
    let store = started().await;
    let handle = store.handle();
    seed_venues(&handle).await;

    let mut academy = doc! { "is_active": true, "category": "Academy", "term": "Cricket Academy" };
    set_position(&mut academy, &origin().destination(0.0, 3.0));
    assert_ok!(handle.insert_one("dictionary", academy).await);

    let mut glossary = doc! { "is_active": true, "category": "Glossary", "term": "Googly" };
    set_position(&mut glossary, &origin().destination(0.0, 3.0));
    assert_ok!(handle.insert_one("dictionary", glossary).await);

    let counts = assert_ok!(store.engine().nearby_counts(origin(), 5.0).await);
    assert_eq!(counts.get(Listing::Venues), 3);
    assert_eq!(counts.get(Listing::Academies), 1);
    assert_eq!(counts.get(Listing::Tournaments), 0);
    assert_eq!(counts.total(), 4);
}

/// Invalid queries are rejected before the store is touched
#[tokio::test]
async fn test_invalid_queries() {
    let store = started().await;
    for query in [
        Listing::Venues.query(origin(), -1.0),
        Listing::Venues.query(origin(), 5.0).limit(0),
        Listing::Venues.query(origin(), 5.0).limit(101),
    ] {
        let err = assert_err!(store.engine().nearby(&query).await);
        assert!(err.is_invalid_query());
    }
}

/// A deadline that has passed surfaces as a timeout
#[tokio::test(start_paused = true)]
async fn test_deadline() {
    let store = started().await;
    seed_venues(&store.handle()).await;

    let deadline = Deadline::after(Duration::from_millis(5));
    tokio::time::advance(Duration::from_millis(10)).await;

    let err = assert_err!(
        store
            .engine()
            .nearby(&Listing::Venues.query(origin(), 5.0).deadline(deadline))
            .await
    );
    assert!(err.is_timeout());
}
