//! Users as seen by the core: roles, principals, and directory profiles.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Closed set of roles a principal can hold.
pub enum Role {
    /// Resident disposing waste.
    Resident,
    /// Resident with a paid subscription.
    PremiumResident,
    /// Collection crew member.
    Collector,
    /// Operator with full access.
    Admin,
}

impl Role {
    /// Whether the role belongs to a resident, premium or not.
    #[must_use]
    pub fn is_resident(self) -> bool {
        matches!(self, Role::Resident | Role::PremiumResident)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slug = match self {
            Role::Resident => "resident",
            Role::PremiumResident => "premium_resident",
            Role::Collector => "collector",
            Role::Admin => "admin",
        };
        write!(formatter, "{slug}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Authenticated caller of an operation, supplied by the identity collaborator.
pub struct Principal {
    /// User id.
    pub id: UserId,
    /// Role held.
    pub role: Role,
    /// Whether a premium subscription is currently active.
    pub premium_active: bool,
}

impl Principal {
    /// Principal with the given id and role and no premium subscription.
    #[must_use]
    pub fn new(id: UserId, role: Role) -> Self {
        Self {
            id,
            role,
            premium_active: false,
        }
    }

    /// Whether this principal is a premium resident with an active subscription.
    #[must_use]
    pub fn is_premium(&self) -> bool {
        self.role == Role::PremiumResident && self.premium_active
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Usage counters kept on a user.
pub struct UserStats {
    /// Disposals recorded by a resident.
    pub total_disposals: u32,
    /// Last disposal by a resident.
    pub last_disposal_at: Option<DateTime<Utc>>,
    /// Completed collections by a collector.
    pub total_collections: u32,
    /// Mean rating over a collector's rated, completed collections.
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Directory record of a user.
pub struct UserProfile {
    /// User id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Role held.
    pub role: Role,
    /// Whether the account may sign in.
    pub active: bool,
    /// End of the premium subscription; open-ended when absent.
    pub premium_expiry: Option<DateTime<Utc>>,
    /// Usage counters.
    pub stats: UserStats,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Whether the user holds an unexpired premium subscription at `now`.
    #[must_use]
    pub fn premium_active(&self, now: DateTime<Utc>) -> bool {
        self.role == Role::PremiumResident
            && self.active
            && self.premium_expiry.is_none_or(|expiry| expiry > now)
    }

    /// Principal acting on behalf of this user at `now`.
    #[must_use]
    pub fn principal(&self, now: DateTime<Utc>) -> Principal {
        Principal {
            id: self.id.clone(),
            role: self.role,
            premium_active: self.premium_active(now),
        }
    }
}
