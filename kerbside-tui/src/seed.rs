use chrono::{Duration, Utc};
use kerbside_core::{
    BinLocation, GeoPoint, KerbsideService, NewBin, NewRoute, Principal, Result, Role, RouteStop,
    UserId, UserProfile, UserStats, WasteCategory, geo::NearbyQuery,
};
use kerbside_store_memory::MemoryStore;
use tracing::info;

/// Principals the console acts as.
pub(crate) struct Cast {
    pub(crate) operator: Principal,
    pub(crate) collector: Principal,
    pub(crate) resident: Principal,
}

// name, category, offset north and east in degrees, starting fill
const BINS: [(&str, WasteCategory, f64, f64, i32); 6] = [
    ("Market Square", WasteCategory::General, 0.0004, 0.0002, 82),
    ("Station Forecourt", WasteCategory::Recyclable, -0.0031, 0.0054, 40),
    ("Library Steps", WasteCategory::General, 0.0018, -0.0027, 12),
    ("Riverside Path", WasteCategory::Organic, -0.0062, -0.0041, 93),
    ("Old Town Gate", WasteCategory::Recyclable, 0.0085, 0.0016, 0),
    ("Depot Drop-off", WasteCategory::Hazardous, 0.0210, 0.0330, 55),
];

fn profile(id: &str, name: &str, role: Role) -> UserProfile {
    UserProfile {
        id: UserId::from(id),
        name: name.to_owned(),
        email: format!("{id}@kerbside.local"),
        role,
        active: true,
        premium_expiry: None,
        stats: UserStats::default(),
        created_at: Utc::now(),
    }
}

/// Fill an empty store with a small demo district around `home`.
pub(crate) async fn populate(
    store: &MemoryStore,
    service: &KerbsideService,
    home: &NearbyQuery,
) -> Result<Cast> {
    for user in [
        profile("ops", "Operations", Role::Admin),
        profile("crew-1", "Robin Crew", Role::Collector),
        profile("resident-1", "Alex Resident", Role::Resident),
        profile("resident-2", "Sam Premium", Role::PremiumResident),
    ] {
        store.add_user(user).await?;
    }
    let cast = Cast {
        operator: service.principal(&UserId::from("ops")).await?,
        collector: service.principal(&UserId::from("crew-1")).await?,
        resident: service.principal(&UserId::from("resident-1")).await?,
    };

    let mut stops = Vec::new();
    for (order, (name, category, north, east, fill)) in (1..).zip(BINS) {
        let bin = service
            .create_bin(
                &cast.operator,
                NewBin {
                    location: BinLocation {
                        name: name.to_owned(),
                        address: None,
                        landmark: None,
                        coordinates: GeoPoint::new(
                            home.origin.latitude + north,
                            home.origin.longitude + east,
                        ),
                    },
                    category: Some(category),
                    capacity_percent: None,
                    collection_frequency_days: None,
                },
            )
            .await?;
        service
            .assign_collector(&cast.operator, &bin.id, &cast.collector.id)
            .await?;
        if fill > 0 {
            service
                .record_disposal(&cast.resident, &bin.id, fill)
                .await?;
        }
        if order <= 3 {
            stops.push(RouteStop {
                bin: bin.id,
                order,
                estimated_minutes: Some(10),
            });
        }
    }

    let route = service
        .create_route(
            &cast.operator,
            NewRoute {
                name: "Centre morning loop".to_owned(),
                description: Some("Core bins around the square".to_owned()),
                collector: cast.collector.id.clone(),
                stops,
                scheduled_at: Utc::now() + Duration::hours(1),
                estimated_duration_min: Some(30),
                recurrence: None,
                notes: None,
            },
        )
        .await?;
    info!(route = %route.id, bins = BINS.len(), "demo district seeded");
    Ok(cast)
}
