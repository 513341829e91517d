use super::KerbsideService;
use crate::access::Capability;
use crate::error::Result;
use crate::model::{BinFilter, CollectionFilter, Principal, RouteFilter};
use crate::stats::{
    self, BinReport, CollectionReport, CollectorPerformance, Dashboard, PaymentReport,
    ReportPeriod, RouteReport, UserReport,
};

// Reports are admin-only; every entry point checks `ViewReports` first.
impl KerbsideService {
    /// Headline figures for today and overall.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Forbidden`] for non-admins, or a store error.
    pub async fn dashboard(&self, actor: &Principal) -> Result<Dashboard> {
        actor.require(Capability::ViewReports)?;
        let users = self.backend.users.list_users().await?;
        let bins = self.backend.bins.list_bins(&BinFilter::default()).await?;
        let collections = self
            .backend
            .collections
            .list_collections(&CollectionFilter::default())
            .await?;
        let payments = self.backend.payments.list_payments().await?;
        Ok(stats::dashboard(
            self.now(),
            &users,
            &bins,
            &collections,
            &payments,
        ))
    }

    /// Bin breakdown over bins registered in `period`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Forbidden`] for non-admins,
    /// [`crate::CoreError::InvalidInput`] for a bad period, or a store error.
    pub async fn bin_statistics(
        &self,
        actor: &Principal,
        period: ReportPeriod,
    ) -> Result<BinReport> {
        actor.require(Capability::ViewReports)?;
        let window = period.window(self.now())?;
        let bins = self.backend.bins.list_bins(&BinFilter::default()).await?;
        Ok(stats::bin_report(&bins, window))
    }

    /// Pickup totals over `period`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Forbidden`] for non-admins,
    /// [`crate::CoreError::InvalidInput`] for a bad period, or a store error.
    pub async fn collection_statistics(
        &self,
        actor: &Principal,
        period: ReportPeriod,
    ) -> Result<CollectionReport> {
        actor.require(Capability::ViewReports)?;
        let window = period.window(self.now())?;
        let collections = self
            .backend
            .collections
            .list_collections(&CollectionFilter::default())
            .await?;
        Ok(stats::collection_report(&collections, window))
    }

    /// Route outcomes and the collector leaderboard over `period`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Forbidden`] for non-admins,
    /// [`crate::CoreError::InvalidInput`] for a bad period, or a store error.
    pub async fn route_statistics(
        &self,
        actor: &Principal,
        period: ReportPeriod,
    ) -> Result<RouteReport> {
        actor.require(Capability::ViewReports)?;
        let window = period.window(self.now())?;
        let routes = self
            .backend
            .routes
            .list_routes(&RouteFilter::default())
            .await?;
        let users = self.backend.users.list_users().await?;
        Ok(stats::route_report(&routes, &users, window))
    }

    /// User base figures over `period`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Forbidden`] for non-admins,
    /// [`crate::CoreError::InvalidInput`] for a bad period, or a store error.
    pub async fn user_statistics(
        &self,
        actor: &Principal,
        period: ReportPeriod,
    ) -> Result<UserReport> {
        actor.require(Capability::ViewReports)?;
        let window = period.window(self.now())?;
        let users = self.backend.users.list_users().await?;
        Ok(stats::user_report(&users, window, self.now()))
    }

    /// Revenue over `period`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Forbidden`] for non-admins,
    /// [`crate::CoreError::InvalidInput`] for a bad period, or a store error.
    pub async fn payment_statistics(
        &self,
        actor: &Principal,
        period: ReportPeriod,
    ) -> Result<PaymentReport> {
        actor.require(Capability::ViewReports)?;
        let window = period.window(self.now())?;
        let payments = self.backend.payments.list_payments().await?;
        Ok(stats::payment_report(&payments, window))
    }

    /// Per-collector pickup performance over `period`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Forbidden`] for non-admins,
    /// [`crate::CoreError::InvalidInput`] for a bad period, or a store error.
    pub async fn collector_statistics(
        &self,
        actor: &Principal,
        period: ReportPeriod,
    ) -> Result<Vec<CollectorPerformance>> {
        actor.require(Capability::ViewReports)?;
        let window = period.window(self.now())?;
        let collections = self
            .backend
            .collections
            .list_collections(&CollectionFilter::default())
            .await?;
        let users = self.backend.users.list_users().await?;
        Ok(stats::collector_performance(&collections, &users, window))
    }
}
