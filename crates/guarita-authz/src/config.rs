//! Authorization engine configuration.
//!
//! All tunables of the engine live here: the ruleset cache TTL, the identity
//! alias cache TTL, the business-hours definition used by the `time` context
//! predicate, and the timeouts bounding every blocking collaborator call
//! (policy store, user directory, audit sink).
//!
//! # Example (TOML)
//!
//! ```toml
//! [authz]
//! cache_ttl = "5m"
//! alias_cache_ttl = "5m"
//!
//! [authz.business_hours]
//! start_day = 1
//! end_day = 5
//! start_hour = 9
//! end_hour = 18
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::{OffsetDateTime, Weekday};

/// Root authorization engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// How long a loaded ruleset snapshot stays valid before the next
    /// evaluation triggers a reload from the policy store.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// How long a resolved identity alias stays cached. Entries are never
    /// invalidated early; staleness is bounded only by this TTL.
    #[serde(with = "humantime_serde")]
    pub alias_cache_ttl: Duration,

    /// Upper bound on a single policy store load.
    #[serde(with = "humantime_serde")]
    pub store_timeout: Duration,

    /// Upper bound on a single user directory lookup.
    #[serde(with = "humantime_serde")]
    pub directory_timeout: Duration,

    /// Upper bound on a single audit sink write.
    #[serde(with = "humantime_serde")]
    pub audit_timeout: Duration,

    /// Definition of "business hours" for the `time` context predicate.
    pub business_hours: BusinessHours,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(5 * 60),
            alias_cache_ttl: Duration::from_secs(5 * 60),
            store_timeout: Duration::from_secs(5),
            directory_timeout: Duration::from_secs(2),
            audit_timeout: Duration::from_secs(2),
            business_hours: BusinessHours::default(),
        }
    }
}

/// Day and hour window treated as "business hours".
///
/// Days are ISO weekday numbers (1 = Monday .. 7 = Sunday); hours are
/// inclusive on both ends. Defaults to Monday-Friday, 9-18.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BusinessHours {
    /// First weekday of the window (1 = Monday).
    pub start_day: u8,

    /// Last weekday of the window, inclusive (5 = Friday).
    pub end_day: u8,

    /// First hour of the window (24h clock).
    pub start_hour: u8,

    /// Last hour of the window, inclusive.
    pub end_hour: u8,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start_day: 1,
            end_day: 5,
            start_hour: 9,
            end_hour: 18,
        }
    }
}

impl BusinessHours {
    /// Check whether the given instant falls inside the window.
    ///
    /// The instant is evaluated in its own offset, so a caller-supplied
    /// timestamp keeps the caller's notion of local time.
    #[must_use]
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        let day = iso_weekday(at.weekday());
        let hour = at.hour();
        day >= self.start_day
            && day <= self.end_day
            && hour >= self.start_hour
            && hour <= self.end_hour
    }
}

fn iso_weekday(day: Weekday) -> u8 {
    match day {
        Weekday::Monday => 1,
        Weekday::Tuesday => 2,
        Weekday::Wednesday => 3,
        Weekday::Thursday => 4,
        Weekday::Friday => 5,
        Weekday::Saturday => 6,
        Weekday::Sunday => 7,
    }
}
