use std::cmp::Reverse;

use tracing::{debug, info};

use super::KerbsideService;
use crate::access::Capability;
use crate::bins::{self, DisposalCommit};
use crate::error::{CoreError, Result};
use crate::events::{DomainEvent, Outcome};
use crate::geo::{self, NearbyBin, NearbyQuery};
use crate::model::{
    Bin, BinFilter, BinId, BinUpdate, MaintenanceEntry, NewBin, Page, PageRequest, Principal,
    Role, UserId,
};
use crate::validate;

fn bin_updated(bin: &Bin) -> DomainEvent {
    DomainEvent::BinUpdated {
        bin_id: bin.id.clone(),
        fill_level: bin.fill_level,
        status: bin.status,
    }
}

impl KerbsideService {
    /// Register a new bin.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] for non-admins, [`CoreError::InvalidInput`]
    /// for bad input, or a store error.
    pub async fn create_bin(&self, actor: &Principal, input: NewBin) -> Result<Bin> {
        actor.require(Capability::ManageBins)?;
        validate::new_bin(&input)?;
        let bin = self
            .backend
            .bins
            .insert_bin(bins::register(input, self.now()))
            .await?;
        info!(bin = %bin.id, code = %bin.code, "bin registered");
        Ok(bin)
    }

    /// Look up one bin.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown id, or a store error.
    pub async fn get_bin(&self, actor: &Principal, id: &BinId) -> Result<Bin> {
        let bin = self.bin(id).await?;
        if !bin.active && !actor.is_admin() {
            return Err(CoreError::not_found("bin", id));
        }
        Ok(bin)
    }

    /// Page through bins, newest first.
    ///
    /// Collectors see only their own bins; only admins see inactive ones.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a bad page, or a store error.
    pub async fn list_bins(
        &self,
        actor: &Principal,
        mut filter: BinFilter,
        page: PageRequest,
    ) -> Result<Page<Bin>> {
        validate::page(page)?;
        match actor.role {
            Role::Admin => {}
            Role::Collector => {
                filter.collector = Some(actor.id.clone());
                filter.active = Some(true);
            }
            Role::Resident | Role::PremiumResident => filter.active = Some(true),
        }
        let mut found = self.backend.bins.list_bins(&filter).await?;
        found.sort_by_key(|bin| Reverse(bin.created_at));
        Ok(Page::paginate(found, page))
    }

    /// Edit a bin.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] for non-admins, [`CoreError::InvalidInput`]
    /// for bad input, [`CoreError::NotFound`] for an unknown id, or a store error.
    pub async fn update_bin(
        &self,
        actor: &Principal,
        id: &BinId,
        update: BinUpdate,
    ) -> Result<Outcome<Bin>> {
        actor.require(Capability::ManageBins)?;
        validate::bin_update(&update)?;
        let now = self.now();
        let bin = self
            .backend
            .bins
            .update_bin(id, &|bin| {
                bins::apply_update(bin, &update, now);
                Ok(())
            })
            .await?;
        debug!(bin = %bin.id, "bin updated");
        let events = vec![bin_updated(&bin)];
        Ok(self.publish(Outcome::with(bin, events)))
    }

    /// Active bins around a point, nearest first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for bad coordinates or radius, or a store error.
    pub async fn nearby_bins(&self, query: NearbyQuery) -> Result<Vec<NearbyBin>> {
        validate::nearby(&query)?;
        let candidates = self
            .backend
            .bins
            .list_bins(&BinFilter::active_only())
            .await?;
        Ok(geo::nearby(query.origin, query.radius(), candidates))
    }

    /// Record waste dropped into a bin.
    ///
    /// Residents also get their disposal counters bumped in the same commit; a
    /// resident missing from the directory fails the operation and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a non-positive delta,
    /// [`CoreError::InvalidState`] for an inactive bin, [`CoreError::NotFound`] for an
    /// unknown bin or resident, or a store error.
    pub async fn record_disposal(
        &self,
        actor: &Principal,
        id: &BinId,
        delta: i32,
    ) -> Result<Outcome<Bin>> {
        actor.require(Capability::RecordDisposal)?;
        validate::fill_delta(delta)?;
        let commit = DisposalCommit {
            bin: id.clone(),
            delta,
            resident: actor.role.is_resident().then(|| actor.id.clone()),
            at: self.now(),
        };
        let bin = self.backend.bins.commit_disposal(&commit).await?;
        debug!(bin = %bin.id, fill = bin.fill_level, status = %bin.status, "disposal recorded");
        let events = vec![bin_updated(&bin)];
        Ok(self.publish(Outcome::with(bin, events)))
    }

    /// Make `collector` responsible for a bin.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] for non-admins, [`CoreError::InvalidInput`]
    /// when `collector` is not a known collector, [`CoreError::NotFound`] for an
    /// unknown bin, or a store error.
    pub async fn assign_collector(
        &self,
        actor: &Principal,
        id: &BinId,
        collector: &UserId,
    ) -> Result<Bin> {
        actor.require(Capability::AssignCollectors)?;
        let profile = self.backend.users.find_user(collector).await?;
        if !profile.is_some_and(|found| found.role == Role::Collector) {
            return Err(CoreError::invalid_input(format!(
                "{collector} is not a collector"
            )));
        }
        let now = self.now();
        let bin = self
            .backend
            .bins
            .update_bin(id, &|bin| {
                bins::assign_collector(bin, collector.clone(), now);
                Ok(())
            })
            .await?;
        info!(bin = %bin.id, %collector, "collector assigned");
        Ok(bin)
    }

    /// Active bins due for a pickup, fullest first.
    ///
    /// Collectors see only their own bins.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn bins_needing_collection(&self, actor: &Principal) -> Result<Vec<Bin>> {
        let mut filter = BinFilter::active_only();
        if actor.role == Role::Collector {
            filter.collector = Some(actor.id.clone());
        }
        let now = self.now();
        let mut due: Vec<Bin> = self
            .backend
            .bins
            .list_bins(&filter)
            .await?
            .into_iter()
            .filter(|bin| bins::needs_collection(bin, now))
            .collect();
        due.sort_by_key(|bin| Reverse(bin.fill_level));
        Ok(due)
    }

    /// Append a maintenance log entry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] for residents, [`CoreError::InvalidInput`] for
    /// a blank kind, [`CoreError::NotFound`] for an unknown bin, or a store error.
    pub async fn record_maintenance(
        &self,
        actor: &Principal,
        id: &BinId,
        kind: &str,
        description: &str,
    ) -> Result<Bin> {
        actor.require(Capability::RecordMaintenance)?;
        validate::maintenance(kind)?;
        let entry = MaintenanceEntry {
            date: self.now(),
            kind: kind.trim().to_owned(),
            description: description.to_owned(),
            performed_by: actor.id.clone(),
        };
        let bin = self
            .backend
            .bins
            .update_bin(id, &|bin| {
                bins::record_maintenance(bin, entry.clone());
                Ok(())
            })
            .await?;
        info!(bin = %bin.id, kind, "maintenance recorded");
        Ok(bin)
    }

    /// Switch the maintenance override on or off.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] for residents, [`CoreError::NotFound`] for an
    /// unknown bin, or a store error.
    pub async fn set_maintenance(
        &self,
        actor: &Principal,
        id: &BinId,
        on: bool,
    ) -> Result<Outcome<Bin>> {
        actor.require(Capability::RecordMaintenance)?;
        let now = self.now();
        let bin = self
            .backend
            .bins
            .update_bin(id, &|bin| {
                bins::set_maintenance(bin, on, now);
                Ok(())
            })
            .await?;
        info!(bin = %bin.id, status = %bin.status, "maintenance override changed");
        let events = vec![bin_updated(&bin)];
        Ok(self.publish(Outcome::with(bin, events)))
    }
}
