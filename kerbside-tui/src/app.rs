use chrono::Utc;
use kerbside_core::{
    Bin, BinFilter, BinStatus, Collection, CollectionFilter, CollectionKind, CollectionRequest,
    CollectionStatus, CollectionUpdate, KerbsideService, PageRequest, Result, RouteFilter,
    WasteComposition,
    geo::{NearbyBin, NearbyQuery},
    routes::RouteView,
    stats::Dashboard,
    validate::MAX_PAGE_LIMIT,
};
use tracing::warn;

use crate::input::Action;
use crate::seed::Cast;

/// Percentage points one disposal adds.
const DISPOSAL_STEP: i32 = 10;

const EVERYTHING: PageRequest = PageRequest {
    page: 1,
    limit: MAX_PAGE_LIMIT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Screen {
    Bins,
    Nearby,
    Collections,
    Routes,
    Dashboard,
}

impl Screen {
    pub(crate) const ALL: [Screen; 5] = [
        Screen::Bins,
        Screen::Nearby,
        Screen::Collections,
        Screen::Routes,
        Screen::Dashboard,
    ];

    pub(crate) fn title(self) -> &'static str {
        match self {
            Screen::Bins => "Bins",
            Screen::Nearby => "Nearby",
            Screen::Collections => "Collections",
            Screen::Routes => "Routes",
            Screen::Dashboard => "Dashboard",
        }
    }

    pub(crate) fn position(self) -> usize {
        Self::ALL
            .iter()
            .position(|screen| *screen == self)
            .unwrap_or_default()
    }

    pub(crate) fn next(self) -> Self {
        Self::ALL
            .get((self.position() + 1) % Self::ALL.len())
            .copied()
            .unwrap_or(self)
    }

    pub(crate) fn previous(self) -> Self {
        Self::ALL
            .get((self.position() + Self::ALL.len() - 1) % Self::ALL.len())
            .copied()
            .unwrap_or(self)
    }
}

pub(crate) struct App {
    pub(crate) service: KerbsideService,
    pub(crate) cast: Cast,
    pub(crate) home: NearbyQuery,

    pub(crate) screen: Screen,
    pub(crate) list_index: usize,

    pub(crate) bins: Vec<Bin>,
    pub(crate) nearby: Vec<NearbyBin>,
    pub(crate) collections: Vec<Collection>,
    pub(crate) routes: Vec<RouteView>,
    pub(crate) dashboard: Option<Dashboard>,

    pub(crate) is_loading: bool,
    pub(crate) error_message: Option<String>,
    pub(crate) notice: Option<String>,
}

impl App {
    pub(crate) fn new(service: KerbsideService, cast: Cast, home: NearbyQuery) -> Self {
        Self {
            service,
            cast,
            home,
            screen: Screen::Bins,
            list_index: 0,
            bins: Vec::new(),
            nearby: Vec::new(),
            collections: Vec::new(),
            routes: Vec::new(),
            dashboard: None,
            is_loading: false,
            error_message: None,
            notice: None,
        }
    }

    pub(crate) fn switch_screen(&mut self, screen: Screen) {
        self.screen = screen;
        self.list_index = 0;
        self.notice = None;
    }

    fn row_count(&self) -> usize {
        match self.screen {
            Screen::Bins => self.bins.len(),
            Screen::Nearby => self.nearby.len(),
            Screen::Collections => self.collections.len(),
            Screen::Routes => self.routes.len(),
            Screen::Dashboard => 0,
        }
    }

    pub(crate) fn select_next(&mut self) {
        if self.list_index + 1 < self.row_count() {
            self.list_index += 1;
        }
    }

    pub(crate) fn select_previous(&mut self) {
        self.list_index = self.list_index.saturating_sub(1);
    }

    fn selected_bin(&self) -> Option<&Bin> {
        match self.screen {
            Screen::Bins => self.bins.get(self.list_index),
            Screen::Nearby => self.nearby.get(self.list_index).map(|hit| &hit.bin),
            Screen::Collections | Screen::Routes | Screen::Dashboard => None,
        }
    }

    /// Reload whatever the current screen shows.
    pub(crate) async fn refresh(&mut self) {
        if let Err(err) = self.load().await {
            warn!(%err, screen = self.screen.title(), "refresh failed");
            self.error_message = Some(format!("Refresh failed: {err}"));
        }
        self.list_index = self.list_index.min(self.row_count().saturating_sub(1));
    }

    async fn load(&mut self) -> Result<()> {
        let operator = &self.cast.operator;
        match self.screen {
            Screen::Bins => {
                self.bins = self
                    .service
                    .list_bins(operator, BinFilter::default(), EVERYTHING)
                    .await?
                    .items;
            }
            Screen::Nearby => self.nearby = self.service.nearby_bins(self.home).await?,
            Screen::Collections => {
                self.collections = self
                    .service
                    .list_collections(operator, CollectionFilter::default(), EVERYTHING)
                    .await?
                    .items;
            }
            Screen::Routes => {
                let now = Utc::now();
                self.routes = self
                    .service
                    .list_routes(operator, RouteFilter::default(), EVERYTHING)
                    .await?
                    .items
                    .into_iter()
                    .map(|route| RouteView::at(route, now))
                    .collect();
            }
            Screen::Dashboard => self.dashboard = Some(self.service.dashboard(operator).await?),
        }
        Ok(())
    }

    /// Run `action` against the service, then reload the screen.
    pub(crate) async fn perform(&mut self, action: Action) {
        self.error_message = None;
        match self.execute(action).await {
            Ok(Some(notice)) => self.notice = Some(notice),
            Ok(None) => {}
            Err(err) => self.error_message = Some(err.to_string()),
        }
        self.refresh().await;
    }

    async fn execute(&self, action: Action) -> Result<Option<String>> {
        let notice = match action {
            Action::None | Action::Quit | Action::Refresh => return Ok(None),
            Action::Dispose => {
                let Some(bin) = self.selected_bin() else {
                    return Ok(None);
                };
                let bin = self
                    .service
                    .record_disposal(&self.cast.resident, &bin.id, DISPOSAL_STEP)
                    .await?
                    .value;
                format!("{} is now {}% ({})", bin.location.name, bin.fill_level, bin.status)
            }
            Action::RequestPickup => {
                let Some(bin) = self.selected_bin() else {
                    return Ok(None);
                };
                let collection = self
                    .service
                    .request_collection(
                        &self.cast.resident,
                        CollectionRequest {
                            bin: bin.id.clone(),
                            kind: CollectionKind::Requested,
                            scheduled_at: None,
                            composition: WasteComposition::default(),
                            notes: None,
                        },
                    )
                    .await?
                    .value;
                format!("Pickup {} requested for {}", collection.id, bin.location.name)
            }
            Action::ToggleMaintenance => {
                let Some(bin) = self.selected_bin() else {
                    return Ok(None);
                };
                let on = bin.status != BinStatus::Maintenance;
                let bin = self
                    .service
                    .set_maintenance(&self.cast.collector, &bin.id, on)
                    .await?
                    .value;
                format!("{} is {}", bin.location.name, bin.status)
            }
            Action::Advance => {
                let Some(collection) = self.collections.get(self.list_index) else {
                    return Ok(None);
                };
                let next = match collection.status {
                    CollectionStatus::Assigned => CollectionStatus::InProgress,
                    CollectionStatus::InProgress => CollectionStatus::Completed,
                    CollectionStatus::Completed | CollectionStatus::Cancelled => {
                        return Ok(Some(format!(
                            "Collection {} is already {}",
                            collection.id, collection.status
                        )));
                    }
                };
                let advanced = self
                    .service
                    .advance_collection(
                        &self.cast.collector,
                        &collection.id,
                        CollectionUpdate::to(next),
                    )
                    .await?
                    .value;
                format!("Collection {} is {}", advanced.id, advanced.status)
            }
            Action::ScheduleRoute => {
                let Some(view) = self.routes.get(self.list_index) else {
                    return Ok(None);
                };
                let scheduled = self
                    .service
                    .schedule_route(&self.cast.operator, &view.route.id)
                    .await?
                    .value;
                format!("{} pickups scheduled on {}", scheduled.len(), view.route.name)
            }
            Action::StartRoute => {
                let Some(view) = self.routes.get(self.list_index) else {
                    return Ok(None);
                };
                let route = self
                    .service
                    .start_route(&self.cast.collector, &view.route.id)
                    .await?
                    .value;
                format!("{} is {}", route.name, route.status)
            }
            Action::CompleteRoute => {
                let Some(view) = self.routes.get(self.list_index) else {
                    return Ok(None);
                };
                let route = self
                    .service
                    .complete_route(&self.cast.collector, &view.route.id)
                    .await?
                    .value;
                format!(
                    "{} completed, {} pickups",
                    route.name, route.stats.total_collections
                )
            }
        };
        Ok(Some(notice))
    }
}
