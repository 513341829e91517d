//! Role capabilities and ownership checks shared by every operation.

use crate::error::{CoreError, Result};
use crate::model::{Collection, Principal, Role, Route, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Something a principal may be allowed to do.
pub enum Capability {
    /// Register, edit, or deactivate bins.
    ManageBins,
    /// Point bins at collectors.
    AssignCollectors,
    /// Plan routes and schedule their pickups.
    ManageRoutes,
    /// Read aggregate statistics.
    ViewReports,
    /// Report waste dropped into a bin.
    RecordDisposal,
    /// Log maintenance work or toggle the maintenance override.
    RecordMaintenance,
    /// Ask for a regular pickup.
    RequestCollection,
    /// Ask for a fee-bearing bulk pickup.
    RequestBulkCollection,
    /// Move a pickup through its states.
    AdvanceCollection,
    /// Start or finish a route.
    DriveRoute,
    /// Buy a premium term.
    Subscribe,
}

impl Principal {
    /// Whether the principal's role grants `capability`.
    #[must_use]
    pub fn can(&self, capability: Capability) -> bool {
        match capability {
            Capability::ManageBins
            | Capability::AssignCollectors
            | Capability::ManageRoutes
            | Capability::ViewReports => self.role == Role::Admin,
            Capability::RecordDisposal | Capability::RequestCollection => true,
            Capability::RecordMaintenance => matches!(self.role, Role::Collector | Role::Admin),
            Capability::RequestBulkCollection => self.is_premium(),
            Capability::AdvanceCollection | Capability::DriveRoute => {
                self.role == Role::Collector
            }
            Capability::Subscribe => self.role.is_resident(),
        }
    }

    /// Fail unless the principal's role grants `capability`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] naming the role and capability.
    pub fn require(&self, capability: Capability) -> Result<()> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(CoreError::forbidden(format!(
                "{} may not {capability:?}",
                self.role
            )))
        }
    }

    /// Whether the principal sees every entity regardless of ownership.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Fail unless `actor` is `owner`.
///
/// # Errors
///
/// Returns [`CoreError::Forbidden`] for anyone else.
pub fn require_owner(actor: &UserId, owner: &UserId, what: &str) -> Result<()> {
    if actor == owner {
        Ok(())
    } else {
        Err(CoreError::forbidden(format!("{what} belongs to someone else")))
    }
}

/// Admins, the collector, and the requesting resident may read a collection.
#[must_use]
pub fn can_view_collection(principal: &Principal, collection: &Collection) -> bool {
    principal.is_admin()
        || collection.collector == principal.id
        || collection.resident.as_ref() == Some(&principal.id)
}

/// Admins and the driving collector may read a route.
#[must_use]
pub fn can_view_route(principal: &Principal, route: &Route) -> bool {
    principal.is_admin() || route.collector == principal.id
}
