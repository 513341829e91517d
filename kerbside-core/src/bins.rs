//! Fill-level state of bins: mutation, status derivation, and collection need.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::model::{
    Bin, BinId, BinStats, BinStatus, BinUpdate, DEFAULT_CAPACITY_PERCENT,
    DEFAULT_COLLECTION_FREQUENCY_DAYS, MaintenanceEntry, NewBin, UserId, UserProfile,
};
use crate::validate;

/// Fill level from which a bin counts as overflowing.
pub const OVERFLOWING_AT: u8 = 90;
/// Fill level from which a bin counts as full.
pub const FULL_AT: u8 = 75;
/// Fill level from which a bin counts as partially filled.
pub const PARTIAL_AT: u8 = 25;
/// Fill level from which a bin needs collection regardless of cadence.
pub const COLLECTION_NEEDED_AT: u8 = 80;

/// Status implied by a fill level.
#[must_use]
pub fn derive_status(fill_level: u8) -> BinStatus {
    match fill_level {
        level if level >= OVERFLOWING_AT => BinStatus::Overflowing,
        level if level >= FULL_AT => BinStatus::Full,
        level if level >= PARTIAL_AT => BinStatus::Partial,
        _ => BinStatus::Empty,
    }
}

/// Build a new bin from validated input, assigning its code and scan token.
#[must_use]
pub fn register(input: NewBin, now: DateTime<Utc>) -> Bin {
    let code = bin_code(now);
    let scan_token = format!("kerbside:{code}");
    Bin {
        id: BinId::generate(),
        code,
        scan_token,
        location: input.location,
        category: input.category.unwrap_or_default(),
        capacity_percent: input.capacity_percent.unwrap_or(DEFAULT_CAPACITY_PERCENT),
        fill_level: 0,
        status: BinStatus::Empty,
        collection_frequency_days: input
            .collection_frequency_days
            .unwrap_or(DEFAULT_COLLECTION_FREQUENCY_DAYS),
        last_collected_at: None,
        last_updated_at: now,
        assigned_collector: None,
        active: true,
        stats: BinStats::default(),
        maintenance_history: Vec::new(),
        created_at: now,
    }
}

// BIN-<unix millis>-<9 base36 chars>
fn bin_code(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .filter_map(|_| char::from_digit(rng.gen_range(0..36), 36))
        .collect();
    format!("BIN-{}-{suffix}", now.timestamp_millis())
}

fn refresh_status(bin: &mut Bin, now: DateTime<Utc>) {
    if bin.status != BinStatus::Maintenance {
        bin.status = derive_status(bin.fill_level);
    }
    bin.last_updated_at = now;
}

/// Add `delta` percent to the bin, capped at its capacity.
///
/// # Errors
///
/// Returns [`crate::CoreError::InvalidInput`] when `delta <= 0`.
pub fn apply_fill(bin: &mut Bin, delta: i32, now: DateTime<Utc>) -> Result<()> {
    validate::fill_delta(delta)?;
    let raised = i32::from(bin.fill_level)
        .saturating_add(delta)
        .min(i32::from(bin.capacity_percent));
    bin.fill_level = u8::try_from(raised).unwrap_or(bin.capacity_percent);
    refresh_status(bin, now);
    Ok(())
}

/// Bin half of a completed collection.
///
/// Sets the level to `fill_level_after` (capped at the bin's capacity), stamps
/// the collection time, bumps the counter and folds the observed level into the
/// rolling average. Returns the level the bin had before.
pub fn record_collection(bin: &mut Bin, fill_level_after: u8, at: DateTime<Utc>) -> u8 {
    let before = bin.fill_level;
    bin.fill_level = fill_level_after.min(bin.capacity_percent);
    bin.last_collected_at = Some(at);
    refresh_status(bin, at);

    let previous = f64::from(bin.stats.total_collections);
    bin.stats.average_fill_level =
        (bin.stats.average_fill_level * previous + f64::from(before)) / (previous + 1.0);
    bin.stats.total_collections = bin.stats.total_collections.saturating_add(1);
    before
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A disposal plus the resident's counters, applied by the store as one unit.
pub struct DisposalCommit {
    /// Bin receiving the waste.
    pub bin: BinId,
    /// Percent added.
    pub delta: i32,
    /// Resident whose disposal counters move along; `None` for staff.
    pub resident: Option<UserId>,
    /// Disposal time.
    pub at: DateTime<Utc>,
}

impl DisposalCommit {
    /// Apply the disposal to current copies of the bin and, for residents, their profile.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] for a bin out of service,
    /// [`CoreError::NotFound`] when the resident is missing from the directory, or
    /// any error of [`apply_fill`].
    pub fn apply(&self, bin: &mut Bin, resident: Option<&mut UserProfile>) -> Result<()> {
        if !bin.active {
            return Err(CoreError::invalid_state(format!(
                "bin {} is not in service",
                bin.id
            )));
        }
        apply_fill(bin, self.delta, self.at)?;

        if let Some(id) = &self.resident {
            let profile = resident.ok_or_else(|| CoreError::not_found("user", id))?;
            profile.stats.total_disposals = profile.stats.total_disposals.saturating_add(1);
            profile.stats.last_disposal_at = Some(self.at);
        }
        Ok(())
    }
}

/// Whether the bin is due: nearly full, or its cadence has elapsed.
#[must_use]
pub fn needs_collection(bin: &Bin, now: DateTime<Utc>) -> bool {
    let frequency = i64::from(bin.collection_frequency_days);
    let days_since = bin
        .last_collected_at
        .map_or(frequency, |collected| (now - collected).num_days());
    bin.fill_level >= COLLECTION_NEEDED_AT || days_since >= frequency
}

/// Append a maintenance log entry; the status is left alone.
pub fn record_maintenance(bin: &mut Bin, entry: MaintenanceEntry) {
    bin.maintenance_history.push(entry);
}

/// Switch the manual maintenance override on or off.
///
/// Switching off re-derives the status from the fill level.
pub fn set_maintenance(bin: &mut Bin, on: bool, now: DateTime<Utc>) {
    bin.status = if on {
        BinStatus::Maintenance
    } else {
        derive_status(bin.fill_level)
    };
    bin.last_updated_at = now;
}

/// Point the bin at a new collector.
pub fn assign_collector(bin: &mut Bin, collector: UserId, now: DateTime<Utc>) {
    bin.assigned_collector = Some(collector);
    bin.last_updated_at = now;
}

/// Apply an administrative edit, merging location fields.
///
/// A lowered capacity clamps the current fill level.
pub fn apply_update(bin: &mut Bin, update: &BinUpdate, now: DateTime<Utc>) {
    if let Some(patch) = &update.location {
        if let Some(name) = &patch.name {
            bin.location.name.clone_from(name);
        }
        if patch.address.is_some() {
            bin.location.address.clone_from(&patch.address);
        }
        if patch.landmark.is_some() {
            bin.location.landmark.clone_from(&patch.landmark);
        }
        if let Some(coordinates) = patch.coordinates {
            bin.location.coordinates = coordinates;
        }
    }
    if let Some(category) = update.category {
        bin.category = category;
    }
    if let Some(capacity) = update.capacity_percent {
        bin.capacity_percent = capacity;
    }
    if let Some(days) = update.collection_frequency_days {
        bin.collection_frequency_days = days;
    }
    if let Some(active) = update.active {
        bin.active = active;
    }
    bin.fill_level = bin.fill_level.min(bin.capacity_percent);
    refresh_status(bin, now);
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::error::ErrorKind;
    use crate::model::{BinLocation, GeoPoint, LocationPatch, Role, UserStats};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 9, 30, 0).unwrap()
    }

    fn fresh_bin() -> Bin {
        register(
            NewBin {
                location: BinLocation {
                    name: "Elisenbrunnen".to_owned(),
                    address: Some("Friedrich-Wilhelm-Platz".to_owned()),
                    landmark: None,
                    coordinates: GeoPoint::new(50.7747, 6.0863),
                },
                category: None,
                capacity_percent: None,
                collection_frequency_days: None,
            },
            now(),
        )
    }

    #[test]
    fn thresholds_map_to_statuses() {
        assert_eq!(derive_status(0), BinStatus::Empty);
        assert_eq!(derive_status(24), BinStatus::Empty);
        assert_eq!(derive_status(25), BinStatus::Partial);
        assert_eq!(derive_status(74), BinStatus::Partial);
        assert_eq!(derive_status(75), BinStatus::Full);
        assert_eq!(derive_status(89), BinStatus::Full);
        assert_eq!(derive_status(90), BinStatus::Overflowing);
        assert_eq!(derive_status(100), BinStatus::Overflowing);
    }

    #[test]
    fn status_rank_never_drops_as_fill_rises() {
        let ranks: Vec<u8> = (0..=100)
            .map(|level| derive_status(level).fill_rank().unwrap())
            .collect();
        assert!(ranks.windows(2).all(|pair| matches!(pair, [low, high] if low <= high)));
    }

    #[test]
    fn registration_applies_defaults() {
        let bin = fresh_bin();
        assert!(bin.code.starts_with("BIN-"));
        assert_eq!(bin.code.rsplit('-').next().map(str::len), Some(9));
        assert!(bin.scan_token.ends_with(&bin.code));
        assert_eq!(bin.capacity_percent, 100);
        assert_eq!(bin.collection_frequency_days, 7);
        assert_eq!(bin.status, BinStatus::Empty);
        assert!(bin.active);
    }

    #[test]
    fn fill_is_capped_at_capacity() {
        let mut bin = fresh_bin();
        bin.capacity_percent = 80;
        apply_fill(&mut bin, 50, now()).unwrap();
        assert_eq!(bin.fill_level, 50);
        assert_eq!(bin.status, BinStatus::Partial);

        apply_fill(&mut bin, 50, now()).unwrap();
        assert_eq!(bin.fill_level, 80);
        assert_eq!(bin.status, BinStatus::Full);

        apply_fill(&mut bin, i32::MAX, now()).unwrap();
        assert_eq!(bin.fill_level, 80);
    }

    #[test]
    fn non_positive_fill_is_rejected_without_change() {
        let mut bin = fresh_bin();
        apply_fill(&mut bin, 30, now()).unwrap();
        for delta in [0, -10] {
            let err = apply_fill(&mut bin, delta, now()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
        assert_eq!(bin.fill_level, 30);
    }

    #[test]
    fn maintenance_survives_fill_changes_until_cleared() {
        let mut bin = fresh_bin();
        set_maintenance(&mut bin, true, now());
        apply_fill(&mut bin, 95, now()).unwrap();
        assert_eq!(bin.status, BinStatus::Maintenance);

        set_maintenance(&mut bin, false, now());
        assert_eq!(bin.status, BinStatus::Overflowing);
    }

    #[test]
    fn recording_a_collection_resets_level_and_counts() {
        let mut bin = fresh_bin();
        apply_fill(&mut bin, 90, now()).unwrap();
        let later = now() + Duration::hours(3);

        let before = record_collection(&mut bin, 0, later);
        assert_eq!(before, 90);
        assert_eq!(bin.fill_level, 0);
        assert_eq!(bin.status, BinStatus::Empty);
        assert_eq!(bin.last_collected_at, Some(later));
        assert_eq!(bin.stats.total_collections, 1);
        assert!((bin.stats.average_fill_level - 90.0).abs() < 1e-9);

        apply_fill(&mut bin, 50, later).unwrap();
        record_collection(&mut bin, 10, later);
        assert_eq!(bin.stats.total_collections, 2);
        assert!((bin.stats.average_fill_level - 70.0).abs() < 1e-9);
        assert_eq!(bin.status, BinStatus::Empty);
    }

    #[test]
    fn recorded_level_never_exceeds_capacity() {
        let mut bin = fresh_bin();
        bin.capacity_percent = 60;
        apply_fill(&mut bin, 60, now()).unwrap();

        let before = record_collection(&mut bin, 100, now());
        assert_eq!(before, 60);
        assert_eq!(bin.fill_level, 60);
        assert!(bin.fill_level <= bin.capacity_percent);
    }

    fn resident_profile() -> UserProfile {
        UserProfile {
            id: UserId::from("user-res"),
            name: "Rosa".to_owned(),
            email: "rosa@example.org".to_owned(),
            role: Role::Resident,
            active: true,
            premium_expiry: None,
            stats: UserStats::default(),
            created_at: now(),
        }
    }

    fn disposal(resident: Option<&str>) -> DisposalCommit {
        DisposalCommit {
            bin: BinId::from("bin-1"),
            delta: 30,
            resident: resident.map(UserId::from),
            at: now(),
        }
    }

    #[test]
    fn disposal_moves_fill_and_resident_counters_together() {
        let mut bin = fresh_bin();
        let mut profile = resident_profile();
        disposal(Some("user-res"))
            .apply(&mut bin, Some(&mut profile))
            .unwrap();
        assert_eq!(bin.fill_level, 30);
        assert_eq!(profile.stats.total_disposals, 1);
        assert_eq!(profile.stats.last_disposal_at, Some(now()));

        disposal(None).apply(&mut bin, None).unwrap();
        assert_eq!(bin.fill_level, 60);
    }

    #[test]
    fn disposal_by_an_unknown_resident_fails() {
        let mut bin = fresh_bin();
        let err = disposal(Some("user-ghost"))
            .apply(&mut bin, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn disposal_into_a_retired_bin_is_refused() {
        let mut bin = fresh_bin();
        bin.active = false;
        let err = disposal(None).apply(&mut bin, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(bin.fill_level, 0);
    }

    #[test]
    fn collection_need_follows_level_and_cadence() {
        let mut bin = fresh_bin();
        // never collected: due by cadence
        assert!(needs_collection(&bin, now()));

        bin.last_collected_at = Some(now() - Duration::days(2));
        assert!(!needs_collection(&bin, now()));

        apply_fill(&mut bin, 80, now()).unwrap();
        assert!(needs_collection(&bin, now()));

        bin.fill_level = 10;
        bin.last_collected_at = Some(now() - Duration::days(7));
        assert!(needs_collection(&bin, now()));
    }

    #[test]
    fn maintenance_entries_append_in_order() {
        let mut bin = fresh_bin();
        for kind in ["repair", "cleaning"] {
            record_maintenance(
                &mut bin,
                MaintenanceEntry {
                    date: now(),
                    kind: kind.to_owned(),
                    description: String::new(),
                    performed_by: UserId::from("user-crew"),
                },
            );
        }
        let kinds: Vec<&str> = bin
            .maintenance_history
            .iter()
            .map(|entry| entry.kind.as_str())
            .collect();
        assert_eq!(kinds, vec!["repair", "cleaning"]);
        assert_eq!(bin.status, BinStatus::Empty);
    }

    #[test]
    fn updates_merge_location() {
        let mut bin = fresh_bin();
        let update = BinUpdate {
            location: Some(LocationPatch {
                landmark: Some("Fountain".to_owned()),
                ..LocationPatch::default()
            }),
            active: Some(false),
            ..BinUpdate::default()
        };
        apply_update(&mut bin, &update, now());
        assert_eq!(bin.location.name, "Elisenbrunnen");
        assert_eq!(bin.location.landmark.as_deref(), Some("Fountain"));
        assert!(!bin.active);
    }

    #[test]
    fn lowering_capacity_clamps_the_level() {
        let mut bin = fresh_bin();
        apply_fill(&mut bin, 95, now()).unwrap();
        let update = BinUpdate {
            capacity_percent: Some(60),
            ..BinUpdate::default()
        };
        apply_update(&mut bin, &update, now());
        assert_eq!(bin.fill_level, 60);
        assert_eq!(bin.status, BinStatus::Partial);
    }
}
