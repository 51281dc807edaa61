//! Fetch-pipeline domain enums.
//!
//! `FetchPeriod` drives both the scheduling cadence and the fan-out depth of
//! a single job; `FetchStatus` is the job lifecycle. Both are stored as
//! `SMALLINT` columns, so each variant carries a stable wire number.

use std::fmt;

/// How often a product's availability is fetched, and how far ahead one job
/// looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchPeriod {
    /// Once a day; each job retrieves the next 30 days.
    Daily,
    /// Every four hours; each job retrieves the next 7 days.
    FourHours,
    /// Every fifteen minutes; each job retrieves today only.
    FifteenMinutes,
}

impl FetchPeriod {
    /// Number of calendar days a single job of this period retrieves,
    /// starting from today.
    #[must_use]
    pub fn days_to_fetch(self) -> u32 {
        match self {
            FetchPeriod::Daily => 30,
            FetchPeriod::FourHours => 7,
            FetchPeriod::FifteenMinutes => 1,
        }
    }

    /// Dispatch-queue priority. Lower numbers dequeue first, so the most
    /// time-sensitive period wins.
    #[must_use]
    pub fn priority(self) -> i16 {
        match self {
            FetchPeriod::FifteenMinutes => 1,
            FetchPeriod::FourHours => 2,
            FetchPeriod::Daily => 3,
        }
    }

    /// Stable wire/storage number.
    #[must_use]
    pub fn as_i16(self) -> i16 {
        match self {
            FetchPeriod::Daily => 0,
            FetchPeriod::FourHours => 1,
            FetchPeriod::FifteenMinutes => 2,
        }
    }

    /// Parses the stored number back into a period.
    #[must_use]
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(FetchPeriod::Daily),
            1 => Some(FetchPeriod::FourHours),
            2 => Some(FetchPeriod::FifteenMinutes),
            _ => None,
        }
    }
}

impl fmt::Display for FetchPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchPeriod::Daily => write!(f, "daily"),
            FetchPeriod::FourHours => write!(f, "four-hours"),
            FetchPeriod::FifteenMinutes => write!(f, "fifteen-minutes"),
        }
    }
}

/// Lifecycle of a fetch job. Transitions are monotonic:
/// `Pending → InProgress → {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl FetchStatus {
    /// Stable wire/storage number.
    #[must_use]
    pub fn as_i16(self) -> i16 {
        match self {
            FetchStatus::Pending => 0,
            FetchStatus::InProgress => 1,
            FetchStatus::Completed => 2,
            FetchStatus::Failed => 3,
        }
    }

    /// Parses the stored number back into a status.
    #[must_use]
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(FetchStatus::Pending),
            1 => Some(FetchStatus::InProgress),
            2 => Some(FetchStatus::Completed),
            3 => Some(FetchStatus::Failed),
            _ => None,
        }
    }

    /// Terminal statuses accept no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, FetchStatus::Completed | FetchStatus::Failed)
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStatus::Pending => write!(f, "pending"),
            FetchStatus::InProgress => write!(f, "in-progress"),
            FetchStatus::Completed => write!(f, "completed"),
            FetchStatus::Failed => write!(f, "failed"),
        }
    }
}
