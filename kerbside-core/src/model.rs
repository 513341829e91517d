//! Domain data structures for bins, collections, routes, users, and payments.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod bin;
mod collection;
mod payment;
mod route;
mod user;

pub use bin::*;
pub use collection::*;
pub use payment::*;
pub use route::*;
pub use user::*;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "-{}"), Uuid::new_v4().simple()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_owned())
            }
        }
    };
}

string_id!(
    /// Identifier of a bin.
    BinId,
    "bin"
);
string_id!(
    /// Identifier of a collection.
    CollectionId,
    "col"
);
string_id!(
    /// Identifier of a route.
    RouteId,
    "route"
);
string_id!(
    /// Identifier of a user known to the identity collaborator.
    UserId,
    "user"
);
string_id!(
    /// Identifier of a payment ledger record.
    PaymentId,
    "pay"
);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Geographic coordinate in decimal degrees.
pub struct GeoPoint {
    /// Latitude, -90..=90.
    pub latitude: f64,
    /// Longitude, -180..=180.
    pub longitude: f64,
}

impl GeoPoint {
    /// Construct a point from latitude and longitude.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Page size used when a caller does not ask for one.
pub const DEFAULT_PAGE_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// One-based page selection for list operations.
pub struct PageRequest {
    /// Page number, starting at 1.
    pub page: usize,
    /// Maximum number of items per page.
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// A page of results plus pagination metadata.
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Current page number.
    pub current: usize,
    /// Total number of pages.
    pub pages: usize,
    /// Total number of matching items.
    pub total: usize,
}

impl<T> Page<T> {
    /// Slice an already ordered result set into the requested page.
    #[must_use]
    pub fn paginate(items: Vec<T>, request: PageRequest) -> Self {
        let total = items.len();
        let limit = request.limit.max(1);
        let current = request.page.max(1);
        let items = items
            .into_iter()
            .skip((current - 1).saturating_mul(limit))
            .take(limit)
            .collect();
        Self {
            items,
            current,
            pages: total.div_ceil(limit),
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_prefixed_and_unique() {
        let first = BinId::generate();
        let second = BinId::generate();
        assert!(first.0.starts_with("bin-"));
        assert_ne!(first, second);
    }

    #[test]
    fn paginate_reports_totals_and_slices() {
        let page = Page::paginate((1..=25).collect(), PageRequest { page: 3, limit: 10 });
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.pages, 3);
        assert_eq!(page.total, 25);
        assert_eq!(page.current, 3);
    }

    #[test]
    fn paginate_past_the_end_is_empty() {
        let page = Page::paginate(vec!["a", "b"], PageRequest { page: 4, limit: 10 });
        assert!(page.items.is_empty());
        assert_eq!(page.pages, 1);
    }
}
