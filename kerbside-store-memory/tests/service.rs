//! End-to-end workflows through the service facade backed by the memory store.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use kerbside_core::{
    Audience, Bin, BinLocation, BinStatus, BinUpdate, Collection, CollectionFilter, CollectionId,
    CollectionKind, CollectionRepository, CollectionRequest, CollectionStatus, CollectionUpdate,
    DomainEvent, ErrorKind, EventDispatcher, GeoPoint, KerbsideService, NewBin, NewRoute,
    PageRequest, PaymentFilter, PaymentKind, PaymentStatus, Principal, Role, RouteFilter,
    RouteStatus, RouteStop, RouteUpdate, UserDirectory, UserId, UserProfile, UserStats,
    WasteAmount, WasteComposition, geo::NearbyQuery, stats::ReportPeriod,
};
use kerbside_store_memory::{ManualClock, MemoryStore, OfflinePaymentGateway, backend};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap()
}

fn profile(id: &str, role: Role) -> UserProfile {
    UserProfile {
        id: UserId::from(id),
        name: id.to_owned(),
        email: format!("{id}@example.org"),
        role,
        active: true,
        premium_expiry: None,
        stats: UserStats::default(),
        created_at: start(),
    }
}

struct Harness {
    service: KerbsideService,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    gateway: Arc<OfflinePaymentGateway>,
    admin: Principal,
    collector: Principal,
    resident: Principal,
    premium: Principal,
}

impl Harness {
    async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let gateway = Arc::new(OfflinePaymentGateway::new());
        for (id, role) in [
            ("admin", Role::Admin),
            ("collector", Role::Collector),
            ("other-collector", Role::Collector),
            ("resident", Role::Resident),
            ("premium", Role::PremiumResident),
        ] {
            store.add_user(profile(id, role)).await.unwrap();
        }
        let service = KerbsideService::new(
            backend(
                &store,
                Arc::<OfflinePaymentGateway>::clone(&gateway),
                Arc::<ManualClock>::clone(&clock),
            ),
            EventDispatcher::default(),
        );

        let admin = service.principal(&UserId::from("admin")).await.unwrap();
        let collector = service.principal(&UserId::from("collector")).await.unwrap();
        let resident = service.principal(&UserId::from("resident")).await.unwrap();
        let premium = service.principal(&UserId::from("premium")).await.unwrap();
        Self {
            service,
            store,
            clock,
            gateway,
            admin,
            collector,
            resident,
            premium,
        }
    }

    async fn bin_at(&self, name: &str, latitude: f64, longitude: f64) -> Bin {
        let bin = self
            .service
            .create_bin(
                &self.admin,
                NewBin {
                    location: BinLocation {
                        name: name.to_owned(),
                        address: None,
                        landmark: None,
                        coordinates: GeoPoint::new(latitude, longitude),
                    },
                    category: None,
                    capacity_percent: None,
                    collection_frequency_days: None,
                },
            )
            .await
            .unwrap();
        self.service
            .assign_collector(&self.admin, &bin.id, &self.collector.id)
            .await
            .unwrap()
    }

    async fn request(&self, who: &Principal, bin: &Bin, kind: CollectionKind) -> Collection {
        self.service
            .request_collection(
                who,
                CollectionRequest {
                    bin: bin.id.clone(),
                    kind,
                    scheduled_at: None,
                    composition: WasteComposition::default(),
                    notes: None,
                },
            )
            .await
            .unwrap()
            .value
    }

    async fn complete(&self, collection: &Collection) {
        self.service
            .advance_collection(
                &self.collector,
                &collection.id,
                CollectionUpdate::to(CollectionStatus::Completed),
            )
            .await
            .unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_completions_all_land() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("Market Square", 50.7753, 6.0839).await;
    let mut pending = Vec::new();
    for _ in 0..8 {
        pending.push(harness.request(&harness.resident, &bin, CollectionKind::Requested).await);
    }

    let mut tasks = Vec::new();
    for collection in pending {
        let service = harness.service.clone();
        let collector = harness.collector.clone();
        tasks.push(tokio::spawn(async move {
            service
                .advance_collection(
                    &collector,
                    &collection.id,
                    CollectionUpdate::to(CollectionStatus::Completed),
                )
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let bin = harness.service.get_bin(&harness.admin, &bin.id).await.unwrap();
    assert_eq!(bin.stats.total_collections, 8);
    let profile = harness
        .store
        .find_user(&harness.collector.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile.stats.total_collections, 8);
}

#[tokio::test]
async fn completion_empties_bin_and_emits_events() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("Market Square", 50.7753, 6.0839).await;
    harness
        .service
        .record_disposal(&harness.resident, &bin.id, 85)
        .await
        .unwrap();
    let collection = harness.request(&harness.resident, &bin, CollectionKind::Requested).await;

    let outcome = harness
        .service
        .advance_collection(
            &harness.collector,
            &collection.id,
            CollectionUpdate::to(CollectionStatus::Completed),
        )
        .await
        .unwrap();

    assert_eq!(outcome.value.status, CollectionStatus::Completed);
    assert_eq!(outcome.value.fill_level_before, Some(85));
    assert_eq!(outcome.value.completed_at, Some(start()));
    let audiences: Vec<Audience> = outcome.events.iter().map(DomainEvent::audience).collect();
    assert_eq!(audiences, vec![Audience::Collections, Audience::Bins]);

    let bin = harness.service.get_bin(&harness.admin, &bin.id).await.unwrap();
    assert_eq!(bin.fill_level, 0);
    assert_eq!(bin.status, BinStatus::Empty);
    assert_eq!(bin.last_collected_at, Some(start()));
}

#[tokio::test]
async fn completing_twice_is_rejected() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("Market Square", 50.7753, 6.0839).await;
    let collection = harness.request(&harness.resident, &bin, CollectionKind::Requested).await;
    harness.complete(&collection).await;

    let err = harness
        .service
        .advance_collection(
            &harness.collector,
            &collection.id,
            CollectionUpdate::to(CollectionStatus::Completed),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    let bin = harness.service.get_bin(&harness.admin, &bin.id).await.unwrap();
    assert_eq!(bin.stats.total_collections, 1);
}

#[tokio::test]
async fn only_the_assigned_collector_advances() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("Market Square", 50.7753, 6.0839).await;
    let collection = harness.request(&harness.resident, &bin, CollectionKind::Requested).await;
    let other = harness
        .service
        .principal(&UserId::from("other-collector"))
        .await
        .unwrap();

    let err = harness
        .service
        .advance_collection(
            &other,
            &collection.id,
            CollectionUpdate::to(CollectionStatus::InProgress),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn request_notifies_the_collector() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("Market Square", 50.7753, 6.0839).await;
    let outcome = harness
        .service
        .request_collection(
            &harness.resident,
            CollectionRequest {
                bin: bin.id.clone(),
                kind: CollectionKind::Emergency,
                scheduled_at: None,
                composition: WasteComposition::default(),
                notes: Some("lid broken".to_owned()),
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.value.collector, harness.collector.id);
    assert_eq!(outcome.value.resident.as_ref(), Some(&harness.resident.id));
    assert_eq!(
        outcome.events.first().map(DomainEvent::audience),
        Some(Audience::Collector(harness.collector.id.clone()))
    );
}

#[tokio::test]
async fn bulk_pickups_need_premium_and_are_paid() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("Market Square", 50.7753, 6.0839).await;
    let bulk = CollectionRequest {
        bin: bin.id.clone(),
        kind: CollectionKind::Bulk,
        scheduled_at: None,
        composition: WasteComposition {
            general: Some(WasteAmount::weighing(10.0)),
            ..WasteComposition::default()
        },
        notes: None,
    };

    let err = harness
        .service
        .request_collection(&harness.resident, bulk.clone())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let collection = harness
        .service
        .request_collection(&harness.premium, bulk)
        .await
        .unwrap()
        .value;
    let payment = collection.payment.clone().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert!((payment.amount - 55.0).abs() < 1e-9);

    let confirmed = harness
        .service
        .confirm_payment(&harness.premium, &collection.id)
        .await
        .unwrap();
    assert_eq!(
        confirmed.collection.payment.map(|paid| paid.status),
        Some(PaymentStatus::Completed)
    );
    assert_eq!(confirmed.payment.status, PaymentStatus::Completed);

    let again = harness
        .service
        .confirm_payment(&harness.premium, &collection.id)
        .await
        .unwrap_err();
    assert_eq!(again.kind(), ErrorKind::InvalidState);

    let report = harness
        .service
        .payment_statistics(&harness.admin, ReportPeriod::default())
        .await
        .unwrap();
    assert_eq!(report.completed, 1);
}

#[tokio::test]
async fn gateway_outage_leaves_payment_pending() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("Market Square", 50.7753, 6.0839).await;
    let collection = harness.request(&harness.premium, &bin, CollectionKind::Bulk).await;
    harness.gateway.set_online(false);

    let err = harness
        .service
        .confirm_payment(&harness.premium, &collection.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    let stored = harness
        .service
        .get_collection(&harness.premium, &collection.id)
        .await
        .unwrap();
    assert_eq!(
        stored.payment.map(|payment| payment.status),
        Some(PaymentStatus::Pending)
    );
}

#[tokio::test]
async fn rerating_replaces_the_earlier_rating() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("Market Square", 50.7753, 6.0839).await;
    let first = harness.request(&harness.resident, &bin, CollectionKind::Requested).await;
    let second = harness.request(&harness.resident, &bin, CollectionKind::Requested).await;
    harness.complete(&first).await;
    harness.complete(&second).await;

    harness
        .service
        .rate_collection(&harness.resident, &first.id, 2, None)
        .await
        .unwrap();
    harness
        .service
        .rate_collection(&harness.resident, &second.id, 5, None)
        .await
        .unwrap();
    let rerated = harness
        .service
        .rate_collection(&harness.resident, &first.id, 4, Some("quick".to_owned()))
        .await
        .unwrap();
    assert_eq!(rerated.rating, Some(4));

    let profile = harness
        .store
        .find_user(&harness.collector.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile.stats.average_rating, Some(4.5));

    let err = harness
        .service
        .rate_collection(&harness.premium, &first.id, 1, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn rating_an_open_collection_is_invalid() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("Market Square", 50.7753, 6.0839).await;
    let open = harness.request(&harness.resident, &bin, CollectionKind::Requested).await;
    let err = harness
        .service
        .rate_collection(&harness.resident, &open.id, 3, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn route_lifecycle_tracks_progress() {
    let harness = Harness::new().await;
    let north = harness.bin_at("North", 50.78, 6.08).await;
    let south = harness.bin_at("South", 50.77, 6.08).await;

    let route = harness
        .service
        .create_route(
            &harness.admin,
            NewRoute {
                name: "Centre loop".to_owned(),
                description: None,
                collector: harness.collector.id.clone(),
                stops: vec![
                    RouteStop {
                        bin: south.id.clone(),
                        order: 2,
                        estimated_minutes: None,
                    },
                    RouteStop {
                        bin: north.id.clone(),
                        order: 1,
                        estimated_minutes: None,
                    },
                ],
                scheduled_at: start() + Duration::hours(1),
                estimated_duration_min: Some(30),
                recurrence: None,
                notes: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(route.stops.first().map(|stop| &stop.bin), Some(&north.id));
    assert!(route.planned_distance_km > 1.0);

    let scheduled = harness
        .service
        .schedule_route(&harness.admin, &route.id)
        .await
        .unwrap();
    assert_eq!(scheduled.value.len(), 2);
    assert_eq!(scheduled.events.len(), 2);

    harness
        .service
        .start_route(&harness.collector, &route.id)
        .await
        .unwrap();
    let first = scheduled.value.first().unwrap();
    harness.complete(first).await;

    let view = harness
        .service
        .get_route(&harness.collector, &route.id)
        .await
        .unwrap();
    assert_eq!(view.progress, 50);
    assert_eq!(view.remaining.len(), 1);

    harness.clock.advance(Duration::minutes(45));
    let finished = harness
        .service
        .complete_route(&harness.collector, &route.id)
        .await
        .unwrap();
    assert_eq!(finished.value.status, RouteStatus::Completed);
    assert_eq!(finished.value.actual_duration_min, Some(45));
    assert_eq!(finished.value.stats.total_collections, 2);
    assert_eq!(
        finished.events.first().map(DomainEvent::audience),
        Some(Audience::Admin)
    );

    let err = harness
        .service
        .cancel_route(&harness.admin, &route.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn route_creation_rejects_unknown_bins_and_non_collectors() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("North", 50.78, 6.08).await;
    let plan = |collector: &str, bin_id| NewRoute {
        name: "Loop".to_owned(),
        description: None,
        collector: UserId::from(collector),
        stops: vec![RouteStop {
            bin: bin_id,
            order: 1,
            estimated_minutes: None,
        }],
        scheduled_at: start(),
        estimated_duration_min: None,
        recurrence: None,
        notes: None,
    };

    let err = harness
        .service
        .create_route(&harness.admin, plan("resident", bin.id.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = harness
        .service
        .create_route(&harness.admin, plan("collector", "bin-missing".into()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn residents_cannot_list_routes() {
    let harness = Harness::new().await;
    let err = harness
        .service
        .list_routes(&harness.resident, RouteFilter::default(), PageRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn collectors_only_list_their_pickups() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("North", 50.78, 6.08).await;
    harness.request(&harness.resident, &bin, CollectionKind::Requested).await;
    let other = harness
        .service
        .principal(&UserId::from("other-collector"))
        .await
        .unwrap();

    let mine = harness
        .service
        .list_collections(&harness.collector, CollectionFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(mine.total, 1);
    let theirs = harness
        .service
        .list_collections(&other, CollectionFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(theirs.total, 0);
}

#[tokio::test]
async fn nearby_returns_closest_active_bins_first() {
    let harness = Harness::new().await;
    let far = harness.bin_at("Far", 50.80, 6.08).await;
    let near = harness.bin_at("Near", 50.7755, 6.0840).await;
    let retired = harness.bin_at("Retired", 50.7754, 6.0839).await;
    harness
        .service
        .update_bin(
            &harness.admin,
            &retired.id,
            BinUpdate {
                active: Some(false),
                ..BinUpdate::default()
            },
        )
        .await
        .unwrap();

    let found = harness
        .service
        .nearby_bins(NearbyQuery {
            origin: GeoPoint::new(50.7753, 6.0839),
            radius_km: Some(5.0),
        })
        .await
        .unwrap();
    let ids: Vec<_> = found.iter().map(|hit| hit.bin.id.clone()).collect();
    assert_eq!(ids, vec![near.id, far.id]);

    let err = harness
        .service
        .get_bin(&harness.resident, &retired.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn disposals_fill_bins_and_count_for_residents() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("North", 50.78, 6.08).await;
    for _ in 0..2 {
        harness
            .service
            .record_disposal(&harness.resident, &bin.id, 30)
            .await
            .unwrap();
    }
    let outcome = harness
        .service
        .record_disposal(&harness.resident, &bin.id, 70)
        .await
        .unwrap();
    assert_eq!(outcome.value.fill_level, 100);
    assert_eq!(outcome.value.status, BinStatus::Overflowing);

    let profile = harness
        .store
        .find_user(&harness.resident.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile.stats.total_disposals, 3);
    assert_eq!(profile.stats.last_disposal_at, Some(start()));

    let due = harness
        .service
        .bins_needing_collection(&harness.collector)
        .await
        .unwrap();
    assert_eq!(due.first().map(|found| &found.id), Some(&bin.id));
}

#[tokio::test]
async fn maintenance_override_survives_disposals() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("North", 50.78, 6.08).await;
    let flagged = harness
        .service
        .set_maintenance(&harness.collector, &bin.id, true)
        .await
        .unwrap();
    assert_eq!(flagged.value.status, BinStatus::Maintenance);

    let filled = harness
        .service
        .record_disposal(&harness.resident, &bin.id, 50)
        .await
        .unwrap();
    assert_eq!(filled.value.status, BinStatus::Maintenance);

    let cleared = harness
        .service
        .set_maintenance(&harness.collector, &bin.id, false)
        .await
        .unwrap();
    assert_eq!(cleared.value.status, BinStatus::Partial);
}

#[tokio::test]
async fn reports_are_admin_only() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("North", 50.78, 6.08).await;
    let collection = harness.request(&harness.resident, &bin, CollectionKind::Requested).await;
    harness.complete(&collection).await;

    let err = harness.service.dashboard(&harness.collector).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let dashboard = harness.service.dashboard(&harness.admin).await.unwrap();
    assert_eq!(dashboard.total_users, 5);
    assert_eq!(dashboard.total_bins, 1);
    assert_eq!(dashboard.collections_today, 1);

    let err = harness
        .service
        .collection_statistics(&harness.admin, ReportPeriod::LastDays(0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let performance = harness
        .service
        .collector_statistics(&harness.admin, ReportPeriod::LastDays(7))
        .await
        .unwrap();
    assert_eq!(performance.len(), 1);
    assert_eq!(performance.first().map(|entry| entry.completed), Some(1));
}

#[tokio::test]
async fn disposal_by_an_unknown_resident_leaves_the_bin_alone() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("North", 50.78, 6.08).await;
    let ghost = Principal::new(UserId::from("ghost"), Role::Resident);

    let err = harness
        .service
        .record_disposal(&ghost, &bin.id, 30)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let untouched = harness.service.get_bin(&harness.admin, &bin.id).await.unwrap();
    assert_eq!(untouched.fill_level, 0);

    let retried = harness
        .service
        .record_disposal(&harness.resident, &bin.id, 30)
        .await
        .unwrap();
    assert_eq!(retried.value.fill_level, 30);
}

#[tokio::test]
async fn completion_never_leaves_a_bin_above_capacity() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("North", 50.78, 6.08).await;
    harness
        .service
        .update_bin(
            &harness.admin,
            &bin.id,
            BinUpdate {
                capacity_percent: Some(60),
                ..BinUpdate::default()
            },
        )
        .await
        .unwrap();
    let collection = harness.request(&harness.resident, &bin, CollectionKind::Requested).await;

    let mut update = CollectionUpdate::to(CollectionStatus::Completed);
    update.fill_level_after = Some(100);
    harness
        .service
        .advance_collection(&harness.collector, &collection.id, update)
        .await
        .unwrap();
    let bin = harness.service.get_bin(&harness.admin, &bin.id).await.unwrap();
    assert_eq!(bin.fill_level, 60);
}

#[tokio::test]
async fn rating_a_pickup_of_a_departed_collector_stores_nothing() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("North", 50.78, 6.08).await;
    let mut orphan = harness.request(&harness.resident, &bin, CollectionKind::Requested).await;
    orphan.id = CollectionId::generate();
    orphan.collector = UserId::from("departed");
    orphan.status = CollectionStatus::Completed;
    let orphan = harness.store.insert_collection(orphan).await.unwrap();

    let err = harness
        .service
        .rate_collection(&harness.resident, &orphan.id, 5, Some("friendly".to_owned()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let stored = harness
        .service
        .get_collection(&harness.resident, &orphan.id)
        .await
        .unwrap();
    assert_eq!(stored.rating, None);
    assert_eq!(stored.feedback, None);
}

#[tokio::test]
async fn huge_or_inverted_report_periods_are_invalid() {
    let harness = Harness::new().await;

    let err = harness
        .service
        .bin_statistics(&harness.admin, ReportPeriod::LastDays(i64::MAX))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = harness
        .service
        .user_statistics(
            &harness.admin,
            ReportPeriod::Between {
                start: start(),
                end: start() - Duration::days(1),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn explicit_report_periods_bound_the_counts() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("North", 50.78, 6.08).await;
    let early = harness.request(&harness.resident, &bin, CollectionKind::Requested).await;
    harness.complete(&early).await;
    harness.clock.advance(Duration::days(10));
    let late = harness.request(&harness.resident, &bin, CollectionKind::Requested).await;
    harness.complete(&late).await;

    let first_week = ReportPeriod::Between {
        start: start(),
        end: start() + Duration::days(7),
    };
    let performance = harness
        .service
        .collector_statistics(&harness.admin, first_week)
        .await
        .unwrap();
    assert_eq!(performance.first().map(|entry| entry.completed), Some(1));

    let everything = harness
        .service
        .collector_statistics(&harness.admin, ReportPeriod::LastDays(30))
        .await
        .unwrap();
    assert_eq!(everything.first().map(|entry| entry.completed), Some(2));
}

#[tokio::test]
async fn subscriptions_upgrade_residents_for_a_year() {
    let harness = Harness::new().await;

    let bought = harness
        .service
        .purchase_subscription(&harness.resident)
        .await
        .unwrap();
    assert_eq!(bought.profile.role, Role::PremiumResident);
    assert_eq!(
        bought.profile.premium_expiry,
        Some(Utc.with_ymd_and_hms(2025, 9, 2, 8, 0, 0).unwrap())
    );
    assert_eq!(bought.payment.kind, PaymentKind::Subscription);
    assert_eq!(bought.payment.status, PaymentStatus::Completed);

    let upgraded = harness.service.principal(&harness.resident.id).await.unwrap();
    assert_eq!(upgraded.role, Role::PremiumResident);
    let ledger = harness
        .service
        .list_payments(&upgraded, PaymentFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(ledger.total, 1);

    let err = harness
        .service
        .purchase_subscription(&harness.premium)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    let err = harness
        .service
        .purchase_subscription(&harness.collector)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn payers_refund_bulk_fees_once() {
    let harness = Harness::new().await;
    let bin = harness.bin_at("Market Square", 50.7753, 6.0839).await;
    let collection = harness.request(&harness.premium, &bin, CollectionKind::Bulk).await;
    let confirmed = harness
        .service
        .confirm_payment(&harness.premium, &collection.id)
        .await
        .unwrap();
    let paid = confirmed.payment.id;

    let err = harness
        .service
        .refund_payment(&harness.resident, &paid, None, "not mine")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let refunded = harness
        .service
        .refund_payment(&harness.premium, &paid, None, "pickup missed")
        .await
        .unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert_eq!(
        refunded.refund.as_ref().map(|refund| refund.reason.as_str()),
        Some("pickup missed")
    );
    let stored = harness
        .service
        .get_collection(&harness.premium, &collection.id)
        .await
        .unwrap();
    assert_eq!(
        stored.payment.map(|payment| payment.status),
        Some(PaymentStatus::Refunded)
    );

    let err = harness
        .service
        .refund_payment(&harness.admin, &paid, None, "again")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn admins_edit_routes_until_they_start() {
    let harness = Harness::new().await;
    let north = harness.bin_at("North", 50.78, 6.08).await;
    let south = harness.bin_at("South", 50.70, 6.08).await;
    let stop = |bin: &Bin, order| RouteStop {
        bin: bin.id.clone(),
        order,
        estimated_minutes: None,
    };
    let route = harness
        .service
        .create_route(
            &harness.admin,
            NewRoute {
                name: "Loop".to_owned(),
                description: None,
                collector: harness.collector.id.clone(),
                stops: vec![stop(&north, 1)],
                scheduled_at: start(),
                estimated_duration_min: None,
                recurrence: None,
                notes: None,
            },
        )
        .await
        .unwrap();
    assert!(route.planned_distance_km.abs() < 1e-9);

    let edited = harness
        .service
        .update_route(
            &harness.admin,
            &route.id,
            RouteUpdate {
                name: Some("Long loop".to_owned()),
                stops: Some(vec![stop(&south, 2), stop(&north, 1)]),
                ..RouteUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.name, "Long loop");
    assert_eq!(edited.stops.first().map(|first| &first.bin), Some(&north.id));
    assert!(edited.planned_distance_km > 5.0);

    let err = harness
        .service
        .update_route(&harness.collector, &route.id, RouteUpdate::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    harness
        .service
        .start_route(&harness.collector, &route.id)
        .await
        .unwrap();
    let err = harness
        .service
        .update_route(
            &harness.admin,
            &route.id,
            RouteUpdate {
                stops: Some(vec![stop(&north, 1)]),
                ..RouteUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}
