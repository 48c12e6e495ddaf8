//! Due-date calculation from sprint text such as `Week 1-2 (due: 2026-02-05)`.
//!
//! Weeks are four work days (Mon–Thu) counted from the start date. Items that
//! share a week are spread across its days in document order.

use crate::backlog::Backlog;
use crate::error::{BacklogError, Result};
use crate::types::IssueKind;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

static WEEK_RANGE: OnceLock<Regex> = OnceLock::new();
static WEEK: OnceLock<Regex> = OnceLock::new();
static DUE: OnceLock<Regex> = OnceLock::new();

fn week_range_re() -> &'static Regex {
    WEEK_RANGE.get_or_init(|| {
        RegexBuilder::new(r"Week\s*(\d+)\s*-\s*(\d+)")
            .case_insensitive(true)
            .build()
            .unwrap()
    })
}

fn week_re() -> &'static Regex {
    WEEK.get_or_init(|| {
        RegexBuilder::new(r"Week\s*(\d+)")
            .case_insensitive(true)
            .build()
            .unwrap()
    })
}

fn due_re() -> &'static Regex {
    DUE.get_or_init(|| Regex::new(r"(?:due|기한)\s*:\s*(\d{4}-\d{2}-\d{2})").unwrap())
}

pub fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|_| BacklogError::InvalidDate(text.to_string()))
}

/// `Week 4` → 4; for a range `Week 1-2` the last week wins.
pub fn parse_week(text: &str) -> Option<u32> {
    if let Some(c) = week_range_re().captures(text) {
        return c[2].parse().ok();
    }
    week_re().captures(text).and_then(|c| c[1].parse().ok())
}

/// An explicit `due: YYYY-MM-DD` (or `기한:`) date in sprint text.
pub fn explicit_due(text: &str) -> Option<NaiveDate> {
    due_re()
        .captures(text)
        .and_then(|c| parse_date(&c[1]).ok())
}

/// First and last calendar day (Mon–Thu) of 1-based week `week`; `None`
/// past the end of the calendar.
pub fn week_range(start: NaiveDate, week: u32) -> Option<(NaiveDate, NaiveDate)> {
    let offset = 7 * (u64::from(week.max(1)) - 1);
    let week_start = start.checked_add_days(Days::new(offset))?;
    Some((week_start, week_start.checked_add_days(Days::new(3))?))
}

/// Mon–Thu days in `[start, end]`.
pub fn work_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| {
            matches!(
                d.weekday(),
                Weekday::Mon | Weekday::Tue | Weekday::Wed | Weekday::Thu
            )
        })
        .collect()
}

/// Slice of `days` for item `idx` of `total` sharing a week.
pub fn spread(days: &[NaiveDate], idx: usize, total: usize) -> Option<(NaiveDate, NaiveDate)> {
    let (first, last) = (*days.first()?, *days.last()?);
    if total <= 1 {
        return Some((first, last));
    }
    let step = (days.len() / total).max(1);
    let i = (idx * step).min(days.len() - 1);
    let j = (i + step).min(days.len()) - 1;
    Some((days[i], days[j]))
}

// ---------------------------------------------------------------------------
// Backlog scheduling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleItem {
    pub id: String,
    pub kind: IssueKind,
    pub week: Option<u32>,
    pub explicit: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatedItem {
    pub id: String,
    pub kind: IssueKind,
    pub start: NaiveDate,
    pub due: NaiveDate,
}

/// Epics take Target Sprint, stories take Sprint, tasks inherit their story.
/// Items with neither a week nor a due date are left out.
pub fn schedule_items(backlog: &Backlog) -> Vec<ScheduleItem> {
    let mut epics = Vec::new();
    let mut stories = Vec::new();
    let mut tasks = Vec::new();
    for epic in &backlog.epics {
        let sprint = epic.target_sprint.as_deref().unwrap_or_default();
        epics.push(ScheduleItem {
            id: epic.id.clone(),
            kind: IssueKind::Epic,
            week: parse_week(sprint),
            explicit: explicit_due(sprint),
        });
        for story in &epic.stories {
            let sprint = story.sprint.as_deref().unwrap_or_default();
            let (week, explicit) = (parse_week(sprint), explicit_due(sprint));
            stories.push(ScheduleItem {
                id: story.id.clone(),
                kind: IssueKind::Story,
                week,
                explicit,
            });
            for task in &story.tasks {
                tasks.push(ScheduleItem {
                    id: task.id.clone(),
                    kind: IssueKind::Task,
                    week,
                    explicit,
                });
            }
        }
    }
    epics
        .into_iter()
        .chain(stories)
        .chain(tasks)
        .filter(|i| i.week.is_some() || i.explicit.is_some())
        .collect()
}

/// Assign start/due dates. An explicit date is both start and due; other
/// items are spread over their week's work days.
pub fn assign_dates(items: &[ScheduleItem], start: NaiveDate) -> Vec<DatedItem> {
    let mut totals: HashMap<u32, usize> = HashMap::new();
    for week in items.iter().filter_map(|i| i.week) {
        *totals.entry(week).or_insert(0) += 1;
    }
    let mut seen: HashMap<u32, usize> = HashMap::new();
    let mut out = Vec::new();
    for item in items {
        if let Some(date) = item.explicit {
            out.push(DatedItem {
                id: item.id.clone(),
                kind: item.kind,
                start: date,
                due: date,
            });
            continue;
        }
        let Some(week) = item.week else {
            continue;
        };
        let Some((week_start, week_end)) = week_range(start, week) else {
            tracing::warn!(id = %item.id, week, "week is out of range; skipped");
            continue;
        };
        let idx = seen.entry(week).or_insert(0);
        let days = work_days(week_start, week_end);
        let (s, d) = spread(&days, *idx, totals[&week]).unwrap_or((week_start, week_end));
        *idx += 1;
        out.push(DatedItem {
            id: item.id.clone(),
            kind: item.kind,
            start: s,
            due: d,
        });
    }
    out
}
