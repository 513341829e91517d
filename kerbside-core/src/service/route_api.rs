use std::cmp::Reverse;

use tracing::{debug, info};

use super::KerbsideService;
use crate::access::{self, Capability};
use crate::collections;
use crate::error::{CoreError, Result};
use crate::events::{DomainEvent, Outcome};
use crate::model::{
    Bin, Collection, NewRoute, Page, PageRequest, Principal, Role, Route, RouteFilter, RouteId,
    RouteStatus, RouteUpdate,
};
use crate::routes::{self, RouteCompletion, RouteView};
use crate::validate;

impl KerbsideService {
    /// Plan a route for a collector.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] for non-admins, [`CoreError::InvalidInput`]
    /// for bad input, an unknown collector, or unknown bins, or a store error.
    pub async fn create_route(&self, actor: &Principal, input: NewRoute) -> Result<Route> {
        actor.require(Capability::ManageRoutes)?;
        validate::new_route(&input)?;
        let collector = self.backend.users.find_user(&input.collector).await?;
        if !collector.is_some_and(|profile| profile.role == Role::Collector) {
            return Err(CoreError::invalid_input(format!(
                "{} is not a collector",
                input.collector
            )));
        }

        let mut stop_bins: Vec<Bin> = Vec::with_capacity(input.stops.len());
        for stop in &input.stops {
            if let Some(bin) = self.backend.bins.find_bin(&stop.bin).await? {
                stop_bins.push(bin);
            }
        }
        let route = routes::plan(input, &stop_bins, self.now())?;
        let route = self.backend.routes.insert_route(route).await?;
        info!(
            route = %route.id,
            collector = %route.collector,
            stops = route.stops.len(),
            distance_km = route.planned_distance_km,
            "route planned"
        );
        Ok(route)
    }

    /// Create one scheduled pickup per stop of an active route.
    ///
    /// Stops whose bin has since disappeared are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] for non-admins, [`CoreError::InvalidState`]
    /// unless the route is active, [`CoreError::NotFound`] for an unknown route, or a
    /// store error.
    pub async fn schedule_route(
        &self,
        actor: &Principal,
        id: &RouteId,
    ) -> Result<Outcome<Vec<Collection>>> {
        actor.require(Capability::ManageRoutes)?;
        let route = self.route(id).await?;
        if route.status != RouteStatus::Active {
            return Err(CoreError::invalid_state(format!(
                "route {id} is {}, only active routes can be scheduled",
                route.status
            )));
        }

        let now = self.now();
        let mut scheduled = Vec::with_capacity(route.stops.len());
        let mut events = Vec::with_capacity(route.stops.len());
        for stop in &route.stops {
            let Some(bin) = self.backend.bins.find_bin(&stop.bin).await? else {
                debug!(route = %id, bin = %stop.bin, "skipping missing bin");
                continue;
            };
            let collection = self
                .backend
                .collections
                .insert_collection(collections::for_route_stop(&route, &bin, now))
                .await?;
            events.push(DomainEvent::NewCollectionRequest {
                collection_id: collection.id.clone(),
                collector: collection.collector.clone(),
                bin_name: bin.location.name.clone(),
                kind: collection.kind,
                scheduled_at: collection.scheduled_at,
            });
            scheduled.push(collection);
        }
        info!(route = %id, pickups = scheduled.len(), "route scheduled");
        Ok(self.publish(Outcome::with(scheduled, events)))
    }

    /// Look up one route with its progress figures.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown id, [`CoreError::Forbidden`]
    /// unless the actor is an admin or the route's collector, or a store error.
    pub async fn get_route(&self, actor: &Principal, id: &RouteId) -> Result<RouteView> {
        let route = self.route(id).await?;
        if !access::can_view_route(actor, &route) {
            return Err(CoreError::forbidden("access denied"));
        }
        Ok(RouteView::at(route, self.now()))
    }

    /// Page through routes, latest scheduled first.
    ///
    /// Collectors see only their own routes; residents see none.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] for residents, [`CoreError::InvalidInput`] for
    /// a bad page, or a store error.
    pub async fn list_routes(
        &self,
        actor: &Principal,
        mut filter: RouteFilter,
        page: PageRequest,
    ) -> Result<Page<Route>> {
        validate::page(page)?;
        match actor.role {
            Role::Admin => {}
            Role::Collector => filter.collector = Some(actor.id.clone()),
            Role::Resident | Role::PremiumResident => {
                return Err(CoreError::forbidden("routes are visible to staff only"));
            }
        }
        let mut found = self.backend.routes.list_routes(&filter).await?;
        found.sort_by_key(|route| Reverse(route.scheduled_at));
        Ok(Page::paginate(found, page))
    }

    /// Edit a route's name, description, notes, or stops.
    ///
    /// Stops can only change before the route starts; the planned distance is
    /// measured again for the new sequence.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] for non-admins, [`CoreError::InvalidInput`]
    /// for bad input or unknown bins, [`CoreError::InvalidState`] for a finished
    /// route or new stops on a started one, [`CoreError::NotFound`] for an unknown
    /// id, or a store error.
    pub async fn update_route(
        &self,
        actor: &Principal,
        id: &RouteId,
        update: RouteUpdate,
    ) -> Result<Route> {
        actor.require(Capability::ManageRoutes)?;
        validate::route_update(&update)?;
        let mut stop_bins: Vec<Bin> = Vec::new();
        for stop in update.stops.iter().flatten() {
            if let Some(bin) = self.backend.bins.find_bin(&stop.bin).await? {
                stop_bins.push(bin);
            }
        }
        let route = self
            .backend
            .routes
            .update_route(id, &|route| routes::edit(route, &update, &stop_bins))
            .await?;
        info!(
            route = %route.id,
            stops = route.stops.len(),
            distance_km = route.planned_distance_km,
            "route updated"
        );
        Ok(route)
    }

    /// Start driving a route.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] unless the actor is the route's collector,
    /// [`CoreError::InvalidState`] unless the route is active, [`CoreError::NotFound`]
    /// for an unknown id, or a store error.
    pub async fn start_route(&self, actor: &Principal, id: &RouteId) -> Result<Outcome<Route>> {
        actor.require(Capability::DriveRoute)?;
        let now = self.now();
        let route = self
            .backend
            .routes
            .update_route(id, &|route| routes::start(route, &actor.id, now))
            .await?;
        info!(route = %route.id, collector = %route.collector, "route started");
        let events = vec![DomainEvent::RouteStarted {
            route_id: route.id.clone(),
            collector: route.collector.clone(),
            started_at: now,
        }];
        Ok(self.publish(Outcome::with(route, events)))
    }

    /// Finish a route and recompute its statistics from its collections.
    ///
    /// The collections are read in the same store unit that writes the route.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] unless the actor is the route's collector,
    /// [`CoreError::InvalidState`] when it already ended, [`CoreError::NotFound`] for
    /// an unknown id, or a store error.
    pub async fn complete_route(&self, actor: &Principal, id: &RouteId) -> Result<Outcome<Route>> {
        actor.require(Capability::DriveRoute)?;
        let now = self.now();
        let commit = RouteCompletion {
            route: id.clone(),
            collector: actor.id.clone(),
            completed_at: now,
        };
        let route = self.backend.routes.commit_route_completion(&commit).await?;
        info!(
            route = %route.id,
            minutes = ?route.actual_duration_min,
            collections = route.stats.total_collections,
            "route completed"
        );
        let events = vec![DomainEvent::RouteCompleted {
            route_id: route.id.clone(),
            ended_at: now,
            actual_duration_min: route.actual_duration_min,
        }];
        Ok(self.publish(Outcome::with(route, events)))
    }

    /// Temporarily halt a route.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] unless the actor is an admin or the route's
    /// collector, [`CoreError::InvalidState`] unless the route is active or in
    /// progress, [`CoreError::NotFound`] for an unknown id, or a store error.
    pub async fn pause_route(&self, actor: &Principal, id: &RouteId) -> Result<Route> {
        self.halt_route(actor, id, RouteStatus::Paused).await
    }

    /// Call off a route.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] unless the actor is an admin or the route's
    /// collector, [`CoreError::InvalidState`] unless the route is active or in
    /// progress, [`CoreError::NotFound`] for an unknown id, or a store error.
    pub async fn cancel_route(&self, actor: &Principal, id: &RouteId) -> Result<Route> {
        self.halt_route(actor, id, RouteStatus::Cancelled).await
    }

    async fn halt_route(
        &self,
        actor: &Principal,
        id: &RouteId,
        target: RouteStatus,
    ) -> Result<Route> {
        let route = self
            .backend
            .routes
            .update_route(id, &|route| routes::halt(route, actor, target))
            .await?;
        info!(route = %route.id, status = %route.status, "route halted");
        Ok(route)
    }
}
