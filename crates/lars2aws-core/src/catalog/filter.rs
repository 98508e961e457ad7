//! Which catalog rows count as visible streams and builds.

use std::collections::HashSet;

use chrono::{Datelike, Months, NaiveDate};

use super::rows::CatalogRow;
use crate::types::{BuildEntry, Maturity};

const MIG_STREAM_PREFIXES: [&str; 4] = ["int", "hotfix", "rel_", "feature"];

/// Months on each side of the current month kept by the release window.
pub const RELEASE_WINDOW_SPAN: u32 = 2;

/// Stream selection rule for one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPolicy {
    /// MIG: `Name` column, mainline plus int/hotfix/rel_/feature lines.
    NamedLines,
    /// Everyone else: `Branch` column, `REL_YYYY_MM` within the window.
    ReleaseWindow(HashSet<String>),
}

impl StreamPolicy {
    pub fn for_application(app: &str, today: NaiveDate) -> Self {
        if app == "MIG" {
            Self::NamedLines
        } else {
            Self::ReleaseWindow(release_window(today, RELEASE_WINDOW_SPAN))
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::NamedLines => "Name",
            Self::ReleaseWindow(_) => "Branch",
        }
    }

    pub fn accepts(&self, value: &str) -> bool {
        let lower = value.to_lowercase();
        match self {
            Self::NamedLines => {
                lower == "mainline" || MIG_STREAM_PREFIXES.iter().any(|p| lower.starts_with(p))
            }
            Self::ReleaseWindow(window) => window.contains(&lower),
        }
    }
}

/// Lowercase `rel_yyyy_mm` names for `today`'s month ± `span` months.
pub fn release_window(today: NaiveDate, span: u32) -> HashSet<String> {
    let Some(month_start) = NaiveDate::from_ymd_opt(today.year(), today.month(), 1) else {
        return HashSet::new();
    };

    let earlier = (1..=span).filter_map(|n| month_start.checked_sub_months(Months::new(n)));
    let later = (1..=span).filter_map(|n| month_start.checked_add_months(Months::new(n)));

    std::iter::once(month_start)
        .chain(earlier)
        .chain(later)
        .map(|d| format!("rel_{:04}_{:02}", d.year(), d.month()))
        .collect()
}

/// Apply `policy` to `rows`: deduplicate, then sort case-insensitively.
pub fn select_streams(rows: &[CatalogRow], policy: &StreamPolicy) -> Vec<String> {
    let column = policy.column();
    let mut seen = HashSet::new();
    let mut streams: Vec<String> = rows
        .iter()
        .map(|row| row.get(column))
        .filter(|value| !value.is_empty() && policy.accepts(value))
        .filter(|value| seen.insert(value.to_string()))
        .map(str::to_string)
        .collect();

    streams.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
    streams
}

/// Rows with a `ReleaseID`, in catalog order, with their maturity code.
pub fn select_builds(rows: &[CatalogRow]) -> Vec<BuildEntry> {
    rows.iter()
        .filter(|row| !row.get("ReleaseID").is_empty())
        .map(|row| BuildEntry::new(row.get("ReleaseID"), Maturity::from_name(row.get("Maturity.Name"))))
        .collect()
}
