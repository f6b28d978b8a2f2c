// Tunable thresholds and row filters for a metric pass.
use crate::error::ThresholdError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const RISK_WINDOW_RANGE: (i64, i64) = (0, 10);
pub const LOOKBACK_RANGE: (i64, i64) = (7, 120);
pub const SLA_RANGE: (i64, i64) = (1, 60);
pub const STALE_RANGE: (i64, i64) = (1, 30);
pub const LONG_RUNNING_RANGE: (i64, i64) = (7, 180);

/// Ranking size in the report.
pub const REPORT_TOP_N: usize = 5;
/// Ranking size on the always-on dashboard.
pub const DASHBOARD_TOP_N: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// A pending delivery is "at risk" when due within this many days.
    pub risk_window_days: i64,
    /// Trailing window for the late-by-company ranking.
    pub lookback_days: i64,
    /// Open requests at or above this age breach the SLA.
    pub sla_days: i64,
    /// High-priority requests without an update for this long are stale.
    pub stale_high_priority_days: i64,
    /// Unfinished processes running this long are critical.
    pub long_running_days: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            risk_window_days: 2,
            lookback_days: 30,
            sla_days: 14,
            stale_high_priority_days: 3,
            long_running_days: 30,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ThresholdError> {
        check("risk_window_days", self.risk_window_days, RISK_WINDOW_RANGE)?;
        check("lookback_days", self.lookback_days, LOOKBACK_RANGE)?;
        check("sla_days", self.sla_days, SLA_RANGE)?;
        check("stale_high_priority_days", self.stale_high_priority_days, STALE_RANGE)?;
        check("long_running_days", self.long_running_days, LONG_RUNNING_RANGE)?;
        Ok(())
    }
}

fn check(name: &'static str, value: i64, (min, max): (i64, i64)) -> Result<(), ThresholdError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ThresholdError { name, value, min, max })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Company,
    Department,
    Owner,
}

/// Multi-select filters. `None` on a dimension means no filtering; an
/// explicit empty set matches nothing. A dimension whose column is not
/// mapped in a dataset is not applied to that dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub companies: Option<BTreeSet<String>>,
    pub departments: Option<BTreeSet<String>>,
    pub owners: Option<BTreeSet<String>>,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.companies.is_none() && self.departments.is_none() && self.owners.is_none()
    }

    pub fn selection(&self, dim: Dimension) -> Option<&BTreeSet<String>> {
        match dim {
            Dimension::Company => self.companies.as_ref(),
            Dimension::Department => self.departments.as_ref(),
            Dimension::Owner => self.owners.as_ref(),
        }
    }

    /// Build from CLI lists: an empty list means the dimension is unset.
    pub fn from_lists(companies: Vec<String>, departments: Vec<String>, owners: Vec<String>) -> Self {
        fn opt(v: Vec<String>) -> Option<BTreeSet<String>> {
            (!v.is_empty()).then(|| v.into_iter().collect())
        }
        Self {
            companies: opt(companies),
            departments: opt(departments),
            owners: opt(owners),
        }
    }
}
