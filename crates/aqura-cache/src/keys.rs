//! Cache key conventions and TTLs used by the request handlers.
//!
//! Keys are colon-delimited so that a whole family can be evicted with one
//! prefix invalidation:
//!
//! | Key | TTL |
//! |-----|-----|
//! | `branches:all` | 5 min |
//! | `daily_sales:all[:range:<start>:<end>]` | 5 min |
//! | `daily_sales:branch:<id>[:range:<start>:<end>]` | 5 min |
//! | `mobile_dashboard:<user_id>` | 2 min |

use std::time::Duration;

/// Active branch list.
pub const BRANCHES_ALL: &str = "branches:all";

/// Prefix shared by every cached sales report variant.
pub const DAILY_SALES_PREFIX: &str = "daily_sales:";

/// Prefix shared by every cached mobile dashboard.
pub const MOBILE_DASHBOARD_PREFIX: &str = "mobile_dashboard:";

pub const BRANCHES_TTL: Duration = Duration::from_secs(5 * 60);
pub const DAILY_SALES_TTL: Duration = Duration::from_secs(5 * 60);
pub const MOBILE_DASHBOARD_TTL: Duration = Duration::from_secs(2 * 60);

/// Key for a daily sales query.
///
/// The branch filter narrows the namespace. The date range is appended when
/// either bound is present; a missing bound is left empty so that a
/// half-open query never shares a key with the unfiltered one.
pub fn daily_sales(branch_id: Option<&str>, start: Option<&str>, end: Option<&str>) -> String {
    let mut key = match branch_id.filter(|b| !b.is_empty()) {
        Some(branch) => format!("{DAILY_SALES_PREFIX}branch:{branch}"),
        None => format!("{DAILY_SALES_PREFIX}all"),
    };

    let start = start.unwrap_or_default();
    let end = end.unwrap_or_default();
    if !start.is_empty() || !end.is_empty() {
        key.push_str(&format!(":range:{start}:{end}"));
    }

    key
}

/// Key for one user's mobile dashboard.
#[inline]
pub fn mobile_dashboard(user_id: &str) -> String {
    format!("{MOBILE_DASHBOARD_PREFIX}{user_id}")
}
