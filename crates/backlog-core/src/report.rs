use crate::issue::IssueRecord;
use crate::reconcile::MappingAnalysis;
use crate::types::{IssueKind, StatusCategory};
use chrono::NaiveDate;
use serde::Serialize;

const BAR_CELLS: usize = 20;
const SUMMARY_WIDTH: usize = 60;
const TIMELINE_WIDTH: usize = 50;

fn truncate(text: &str, max: usize) -> String {
    text.trim().chars().take(max).collect()
}

fn list_or_none(out: &mut String, items: &[String], none: &str) {
    if items.is_empty() {
        out.push_str(none);
        out.push('\n');
    }
    for item in items {
        out.push_str(item);
        out.push('\n');
    }
}

// ---------------------------------------------------------------------------
// Progress report
// ---------------------------------------------------------------------------

pub struct ReportMeta<'a> {
    pub project_name: &'a str,
    pub web_url: &'a str,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressStats {
    pub total: usize,
    pub done: usize,
    pub in_progress: usize,
    pub remaining: usize,
    pub cancelled: usize,
    pub percent: f64,
}

impl ProgressStats {
    pub fn from_issues(issues: &[IssueRecord]) -> Self {
        let mut stats = Self::default();
        for issue in issues {
            match issue.category() {
                StatusCategory::Done => stats.done += 1,
                StatusCategory::InProgress => stats.in_progress += 1,
                StatusCategory::ToDo => stats.remaining += 1,
                StatusCategory::Cancelled => stats.cancelled += 1,
            }
        }
        stats.total = stats.done + stats.in_progress + stats.remaining;
        stats.percent = if stats.total == 0 {
            0.0
        } else {
            (1000.0 * stats.done as f64 / stats.total as f64).round() / 10.0
        };
        stats
    }

    /// `█` for each done twentieth, `░` for the rest.
    pub fn bar(&self) -> String {
        let filled = if self.total == 0 {
            0
        } else {
            BAR_CELLS * self.done / self.total
        };
        format!("{}{}", "█".repeat(filled), "░".repeat(BAR_CELLS - filled))
    }
}

fn entry(issue: &IssueRecord) -> String {
    let mut line = format!(
        "- **{}** [{}] {}",
        issue.key,
        issue.issue_type,
        truncate(&issue.summary, SUMMARY_WIDTH)
    );
    if let Some(due) = issue.duedate.as_deref().filter(|d| !d.is_empty()) {
        line.push_str(&format!(" (due: {due})"));
    }
    line
}

/// Markdown progress report. Cancelled issues are left out entirely.
pub fn progress_report(issues: &[IssueRecord], meta: &ReportMeta<'_>) -> String {
    let stats = ProgressStats::from_issues(issues);
    let mut done = Vec::new();
    let mut in_progress = Vec::new();
    let mut remaining = Vec::new();
    let mut timeline = Vec::new();

    for issue in issues {
        let category = issue.category();
        match category {
            StatusCategory::Done => done.push(entry(issue)),
            StatusCategory::InProgress => in_progress.push(entry(issue)),
            StatusCategory::ToDo => remaining.push(entry(issue)),
            StatusCategory::Cancelled => continue,
        }
        if issue.kind() == IssueKind::Epic {
            let mut line = format!("- **{}** {}", issue.key, truncate(&issue.summary, TIMELINE_WIDTH));
            if let Some(due) = issue.duedate.as_deref().filter(|d| !d.is_empty()) {
                line.push_str(&format!(" ~ {due}"));
            }
            timeline.push(line);
        }
    }

    let mut out = String::new();
    out.push_str("# Project Progress Report\n");
    out.push('\n');
    out.push_str(&format!("**Project**: {}  \n", meta.project_name));
    out.push_str(&format!("**Report date**: {}  \n", meta.date.format("%Y-%m-%d")));
    out.push_str(&format!("**Work in progress**: [{0}]({0})\n", meta.web_url));
    out.push('\n');
    out.push_str("---\n");
    out.push('\n');
    out.push_str("## Summary\n");
    out.push('\n');
    out.push_str("| Category | Count |\n");
    out.push_str("|----------|-------|\n");
    out.push_str(&format!("| Total issues | {} |\n", stats.total));
    out.push_str(&format!("| Done | {} |\n", stats.done));
    out.push_str(&format!("| In progress | {} |\n", stats.in_progress));
    out.push_str(&format!("| Remaining | {} |\n", stats.remaining));
    out.push('\n');
    out.push_str(&format!("**Progress**: `{}` **{:.1}%**\n", stats.bar(), stats.percent));
    out.push('\n');
    out.push_str("---\n");
    out.push('\n');
    out.push_str("## Epic Timeline\n");
    out.push('\n');
    list_or_none(&mut out, &timeline, "- (no epics)");
    out.push('\n');
    out.push_str("---\n");
    out.push('\n');
    out.push_str("## Done\n");
    out.push('\n');
    list_or_none(&mut out, &done, "- none");
    out.push('\n');
    out.push_str("## In Progress\n");
    out.push('\n');
    list_or_none(&mut out, &in_progress, "- none");
    out.push('\n');
    out.push_str("## Remaining\n");
    out.push('\n');
    list_or_none(&mut out, &remaining, "- none");
    out.push('\n');
    out.push_str("---\n");
    out.push('\n');
    out.push_str(&format!("**Work link**: [{0}]({1})\n", meta.project_name, meta.web_url));
    out
}

// ---------------------------------------------------------------------------
// Mapping analysis report
// ---------------------------------------------------------------------------

const SUMMARY_ROWS: usize = 20;
const EPIC_ROWS: usize = 30;

pub fn analysis_report(analysis: &MappingAnalysis) -> String {
    let summary_fixes = analysis.summary_fixes();
    let epic_fixes = analysis.epic_fixes();
    let completion = analysis.completion_needed();
    let dash = |v: Option<&str>, width: usize| v.map_or("-".to_string(), |s| truncate(s, width));

    let mut out = String::new();
    out.push_str("# Tracker ⇄ Backlog Mapping Analysis\n\n");
    out.push_str(&format!("Tracker issues: {}\n\n", analysis.entries.len()));
    out.push_str("---\n\n");

    out.push_str(&format!("## 1. Summary fixes ({})\n\n", summary_fixes.len()));
    out.push_str("Summaries that hold only a backlog key:\n\n");
    out.push_str("| Key | Current summary | Correct summary |\n");
    out.push_str("|-----|-----------------|-----------------|\n");
    for key in summary_fixes.iter().take(SUMMARY_ROWS) {
        let e = &analysis.entries[key];
        out.push_str(&format!(
            "| {key} | {} | {} |\n",
            e.summary_current,
            dash(e.summary_correct.as_deref(), 50)
        ));
    }
    out.push_str(&format!("\n**Total {}**\n\n", summary_fixes.len()));

    out.push_str(&format!("## 2. Epic fixes ({})\n\n", epic_fixes.len()));
    out.push_str("| Key | Backlog key | Current epic | Correct epic | Item |\n");
    out.push_str("|-----|-------------|--------------|--------------|------|\n");
    for key in epic_fixes.iter().take(EPIC_ROWS) {
        let e = &analysis.entries[key];
        out.push_str(&format!(
            "| {key} | {} | {} | {} | {} |\n",
            e.backlog_key.as_deref().unwrap_or("-"),
            e.epic_current.as_deref().unwrap_or("-"),
            e.epic_correct.as_deref().unwrap_or("-"),
            dash(e.backlog_title.as_deref(), 40)
        ));
    }
    out.push_str(&format!("\n**Total {}**\n\n", epic_fixes.len()));

    out.push_str(&format!("## 3. Completion needed ({})\n\n", completion.len()));
    out.push_str("Verified complete in code but still to-do in the tracker:\n\n");
    out.push_str("| Key | Backlog key | Item |\n");
    out.push_str("|-----|-------------|------|\n");
    for key in completion.iter().take(SUMMARY_ROWS) {
        let e = &analysis.entries[key];
        out.push_str(&format!(
            "| {key} | {} | {} |\n",
            e.backlog_key.as_deref().unwrap_or("-"),
            dash(e.backlog_title.as_deref(), 50)
        ));
    }
    out.push_str(&format!("\n**Total {}**\n", completion.len()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(key: &str, ty: &str, status: &str, due: Option<&str>) -> IssueRecord {
        IssueRecord {
            key: key.to_string(),
            summary: format!("{key} work item"),
            issue_type: ty.to_string(),
            status: status.to_string(),
            parent: None,
            duedate: due.map(str::to_string),
        }
    }

    fn meta() -> ReportMeta<'static> {
        ReportMeta {
            project_name: "Go Almond Matching",
            web_url: "https://example.com/",
            date: NaiveDate::from_ymd_opt(2026, 2, 5).unwrap(),
        }
    }

    #[test]
    fn stats_exclude_cancelled() {
        let issues = [
            rec("GAM-1", "Epic", "Done", None),
            rec("GAM-2", "Task", "진행 중", None),
            rec("GAM-3", "Task", "해야 할 일", None),
            rec("GAM-4", "Task", "취소", None),
        ];
        let stats = ProgressStats::from_issues(&issues);
        assert_eq!((stats.total, stats.done, stats.cancelled), (3, 1, 1));
        assert_eq!(stats.percent, 33.3);
        assert_eq!(stats.bar().chars().filter(|c| *c == '█').count(), 6);
        assert_eq!(stats.bar().chars().count(), 20);
    }

    #[test]
    fn report_lists_and_timeline() {
        let issues = [
            rec("GAM-1", "Epic", "Done", Some("2026-02-05")),
            rec("GAM-2", "Task", "To Do", None),
            rec("GAM-4", "Task", "Cancelled", None),
        ];
        let md = progress_report(&issues, &meta());
        assert!(md.contains("**Report date**: 2026-02-05"));
        assert!(md.contains("- **GAM-1** [Epic] GAM-1 work item (due: 2026-02-05)"));
        assert!(md.contains("- **GAM-1** GAM-1 work item ~ 2026-02-05"));
        assert!(md.contains("## In Progress\n\n- none\n"));
        assert!(md.contains("**50.0%**"));
        assert!(!md.contains("GAM-4"));
    }

    #[test]
    fn empty_report_has_zero_progress() {
        let md = progress_report(&[], &meta());
        assert!(md.contains("`░░░░░░░░░░░░░░░░░░░░` **0.0%**"));
        assert!(md.contains("- (no epics)"));
    }

    #[test]
    fn analysis_report_lists_each_fix() {
        use crate::reconcile::AnalysisEntry;

        let entry = AnalysisEntry {
            jira_key: "GAM-140".to_string(),
            summary_current: "GAM-11".to_string(),
            summary_correct: Some("Login API".to_string()),
            backlog_key: Some("GAM-11".to_string()),
            backlog_title: Some("Login API".to_string()),
            epic_current: None,
            epic_correct: Some("GAM-1".to_string()),
            status_current: "To Do".to_string(),
            code_completed: true,
            needs_summary_fix: true,
            needs_epic_fix: true,
            needs_completion: true,
        };
        let mut analysis = MappingAnalysis::default();
        analysis.entries.insert(entry.jira_key.clone(), entry);

        let md = analysis_report(&analysis);
        assert!(md.contains("Tracker issues: 1\n\n"));
        assert!(md.contains("## 1. Summary fixes (1)\n\n"));
        assert!(md.contains("| GAM-140 | GAM-11 | Login API |\n"));
        assert!(md.contains("| GAM-140 | GAM-11 | - | GAM-1 | Login API |\n"));
        assert!(md.ends_with("**Total 1**\n"));
    }

    #[test]
    fn long_summaries_truncate_by_chars() {
        let mut issue = rec("GAM-9", "Task", "To Do", None);
        issue.summary = "가".repeat(80);
        assert_eq!(entry(&issue), format!("- **GAM-9** [Task] {}", "가".repeat(60)));
    }
}
