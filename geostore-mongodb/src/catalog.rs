//! Static index declarations for the marketplace collections.

use geostore_core::IndexSpec;

/// Collection of user accounts.
pub const USERS: &str = "users";
/// Collection of bookable venues.
pub const VENUES: &str = "venues";
/// Collection of tournaments.
pub const TOURNAMENTS: &str = "tournaments";
/// Collection of sports shops.
pub const SHOPS: &str = "shops";
/// Collection of job postings.
pub const JOBS: &str = "jobs";
/// Sports dictionary; academies live here with `category: "Academy"`.
pub const DICTIONARY: &str = "dictionary";
/// Venue bookings.
pub const BOOKINGS: &str = "bookings";
/// Bookings of professionals (umpires, coaches).
pub const PROFESSIONAL_BOOKINGS: &str = "professional_bookings";
/// Reviews of venues.
pub const REVIEWS: &str = "reviews";
/// Organizer team membership.
pub const ORGANIZER_MANAGERS: &str = "organizer_managers";
/// Community membership.
pub const COMMUNITY_MEMBERS: &str = "community_members";

/// Field holding the GeoJSON position of a listing.
pub const LOCATION_FIELD: &str = "location";

/// Collections whose records carry a position.
pub const GEO_COLLECTIONS: [&str; 5] = [VENUES, TOURNAMENTS, SHOPS, JOBS, DICTIONARY];

/// Field a nearby search on `collection` filters on next to the position.
pub fn status_field(collection: &str) -> &'static str {
    match collection {
        TOURNAMENTS | JOBS => "status",
        _ => "is_active",
    }
}

/// Every index the marketplace expects.
///
/// Geospatial indexes and the booking number uniqueness constraints are
/// required: nearby queries and identifier allocation depend on them. Each
/// geospatial index leads with `location` and carries the collection's status
/// field as a trailing key.
pub fn default_indexes() -> Vec<IndexSpec> {
    let mut specs = vec![
        IndexSpec::builder(USERS).asc("phone").unique().required().build(),
        IndexSpec::builder(USERS).asc("email").unique().sparse().build(),
        IndexSpec::builder(USERS).asc("city").asc("state").build(),
        IndexSpec::builder(USERS).asc("latitude").asc("longitude").build(),
        IndexSpec::builder(VENUES).asc("city").build(),
        IndexSpec::builder(VENUES).asc("is_active").build(),
        IndexSpec::builder(VENUES).asc("latitude").asc("longitude").build(),
        IndexSpec::builder(TOURNAMENTS).asc("city").build(),
        IndexSpec::builder(TOURNAMENTS).asc("sport_type").build(),
        IndexSpec::builder(TOURNAMENTS).asc("status").build(),
        IndexSpec::builder(TOURNAMENTS).asc("latitude").asc("longitude").build(),
        IndexSpec::builder(SHOPS).asc("city").build(),
        IndexSpec::builder(SHOPS).asc("category").build(),
        IndexSpec::builder(SHOPS).asc("latitude").asc("longitude").build(),
        IndexSpec::builder(JOBS).asc("city").build(),
        IndexSpec::builder(JOBS).asc("job_type").build(),
        IndexSpec::builder(JOBS).asc("status").build(),
        IndexSpec::builder(DICTIONARY).asc("sport").build(),
        IndexSpec::builder(DICTIONARY).asc("term").build(),
        IndexSpec::builder(DICTIONARY).asc("city").build(),
        IndexSpec::builder(DICTIONARY).asc("slug").unique().sparse().build(),
        IndexSpec::builder(BOOKINGS)
            .asc("booking_number")
            .unique()
            .required()
            .build(),
        IndexSpec::builder(BOOKINGS).asc("user_id").build(),
        IndexSpec::builder(BOOKINGS).asc("venue_id").build(),
        IndexSpec::builder(BOOKINGS).asc("booking_date").asc("venue_id").build(),
        IndexSpec::builder(PROFESSIONAL_BOOKINGS)
            .asc("booking_number")
            .unique()
            .required()
            .build(),
        IndexSpec::builder(PROFESSIONAL_BOOKINGS)
            .asc("tournament_id")
            .asc("professional_id")
            .build(),
        IndexSpec::builder(REVIEWS).asc("venue_id").build(),
        IndexSpec::builder(REVIEWS).asc("user_id").build(),
        IndexSpec::builder(REVIEWS).desc("created_at").build(),
        IndexSpec::builder(ORGANIZER_MANAGERS)
            .asc("organizer_id")
            .asc("manager_user_id")
            .build(),
        IndexSpec::builder(COMMUNITY_MEMBERS)
            .asc("community_id")
            .asc("user_id")
            .unique()
            .build(),
    ];

    specs.push(sequence_index(BOOKINGS));
    specs.extend(GEO_COLLECTIONS.iter().map(|collection| {
        IndexSpec::builder(*collection)
            .sphere(LOCATION_FIELD)
            .asc(status_field(collection))
            .required()
            .build()
    }));
    specs
}

/// Sequence indexes backing identifier allocation for `collection`.
///
/// Lets the allocator find the highest issued sequence of a scope without a
/// collection scan.
pub fn sequence_index(collection: &str) -> IndexSpec {
    IndexSpec::builder(collection)
        .asc(crate::guard::SCOPE_FIELD)
        .desc(crate::guard::SEQUENCE_FIELD)
        .build()
}
