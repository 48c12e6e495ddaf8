//! Set and map comparisons between the backlog, the mapping file, the issue
//! cache and verification evidence. Everything here is pure; callers fetch
//! statuses and apply the resulting plans.

use crate::backlog::{self, Backlog};
use crate::error::Result;
use crate::io;
use crate::issue::{IssueCache, IssueRecord};
use crate::keys;
use crate::mapping::MappingFile;
use crate::types::{IssueKind, StatusCategory};
use crate::verification::CompletionEvidence;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// Canonical keys / unmapped issues
// ---------------------------------------------------------------------------

/// Mapping values plus every project key referenced in the backlog text.
pub fn canonical_keys(
    mapping: &MappingFile,
    backlog_text: &str,
    project_key: &str,
) -> BTreeSet<String> {
    let mut keys = mapping.canonical_keys();
    keys.extend(backlog::referenced_keys(backlog_text, project_key));
    keys
}

/// Issues that are neither canonical nor already closed.
pub fn unmapped_issues<'a>(
    issues: &'a [IssueRecord],
    canonical: &BTreeSet<String>,
) -> Vec<&'a IssueRecord> {
    issues
        .iter()
        .filter(|i| !canonical.contains(&i.key) && !i.category().is_closed())
        .collect()
}

// ---------------------------------------------------------------------------
// Checkbox sources
// ---------------------------------------------------------------------------

/// Tasks the cache reports done, outside `exclude_under` subtrees and not
/// contradicted by verification evidence.
pub fn completed_from_cache<S: AsRef<str>>(
    cache: &IssueCache,
    exclude_under: &[S],
    evidence: &CompletionEvidence,
) -> BTreeSet<String> {
    let excluded = cache.subtree(exclude_under);
    cache
        .issues
        .iter()
        .filter(|i| i.kind() == IssueKind::Task)
        .filter(|i| i.category() == StatusCategory::Done)
        .filter(|i| !excluded.contains(&i.key))
        .filter(|i| !evidence.not_implemented.contains(&i.key))
        .map(|i| i.key.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Transition scope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Keep only these roots and their descendants.
    pub under: Vec<String>,
    /// Drop these roots and their descendants.
    pub except_under: Vec<String>,
    pub kind: Option<IssueKind>,
    /// Drop issues already in this category.
    pub status_not: Option<StatusCategory>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.under.is_empty()
            && self.except_under.is_empty()
            && self.kind.is_none()
            && self.status_not.is_none()
    }
}

/// Issues of the cache matching `sel`, ordered by key.
pub fn select<'a>(cache: &'a IssueCache, sel: &Selection) -> Vec<&'a IssueRecord> {
    let included = (!sel.under.is_empty()).then(|| cache.subtree(&sel.under));
    let excluded = cache.subtree(&sel.except_under);
    let mut out: Vec<&IssueRecord> = cache
        .issues
        .iter()
        .filter(|i| included.as_ref().is_none_or(|set| set.contains(&i.key)))
        .filter(|i| !excluded.contains(&i.key))
        .filter(|i| sel.kind.is_none_or(|k| i.kind() == k))
        .filter(|i| sel.status_not.is_none_or(|c| i.category() != c))
        .collect();
    out.sort_by(|a, b| keys::cmp_keys(&a.key, &b.key));
    out
}

// ---------------------------------------------------------------------------
// Epic closure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EpicClosure {
    pub already_done: Vec<String>,
    /// Epic → first child that is still open.
    pub pending: BTreeMap<String, String>,
    pub ready: Vec<String>,
    pub no_children: Vec<String>,
}

/// Bucket epics by the state of their children. `status` is asked lazily, so
/// checking stops at the first open child. Unknown statuses count as open.
pub fn plan_epic_closure<F>(children: &BTreeMap<String, Vec<String>>, mut status: F) -> EpicClosure
where
    F: FnMut(&str) -> Option<StatusCategory>,
{
    let mut plan = EpicClosure::default();
    for (epic, kids) in children {
        if status(epic.as_str()).is_some_and(StatusCategory::is_closed) {
            plan.already_done.push(epic.clone());
            continue;
        }
        if kids.is_empty() {
            plan.no_children.push(epic.clone());
            continue;
        }
        let mut sorted = kids.clone();
        keys::sort_keys(&mut sorted);
        match sorted
            .iter()
            .find(|k| !status(k.as_str()).is_some_and(StatusCategory::is_closed))
        {
            Some(open) => {
                plan.pending.insert(epic.clone(), open.clone());
            }
            None => plan.ready.push(epic.clone()),
        }
    }
    plan
}

// ---------------------------------------------------------------------------
// Mismatches
// ---------------------------------------------------------------------------

/// Verified-complete work that the tracker still lists as to-do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_rate: Option<f64>,
    pub jira_status: String,
}

pub fn find_mismatches<F>(evidence: &CompletionEvidence, mut status: F) -> Vec<Mismatch>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = Vec::new();
    for task in &evidence.tasks {
        let Some(st) = status(task.key.as_str()) else { continue };
        if StatusCategory::classify(&st) == StatusCategory::ToDo {
            out.push(Mismatch {
                key: task.key.clone(),
                kind: "Task".to_string(),
                description: Some(task.description.clone()),
                files: task.files.clone(),
                title: None,
                completion_rate: None,
                jira_status: st,
            });
        }
    }
    for story in &evidence.stories {
        let Some(st) = status(story.key.as_str()) else { continue };
        if StatusCategory::classify(&st) == StatusCategory::ToDo {
            out.push(Mismatch {
                key: story.key.clone(),
                kind: "Story".to_string(),
                description: None,
                files: Vec::new(),
                title: Some(story.title.clone()),
                completion_rate: Some(story.completion_rate),
                jira_status: st,
            });
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tracker ⇄ backlog analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisEntry {
    pub jira_key: String,
    pub summary_current: String,
    pub summary_correct: Option<String>,
    pub backlog_key: Option<String>,
    pub backlog_title: Option<String>,
    pub epic_current: Option<String>,
    pub epic_correct: Option<String>,
    pub status_current: String,
    pub code_completed: bool,
    pub needs_summary_fix: bool,
    pub needs_epic_fix: bool,
    pub needs_completion: bool,
}

/// Per-issue analysis, keyed by tracker key. Persisted as a flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingAnalysis {
    pub entries: BTreeMap<String, AnalysisEntry>,
}

impl MappingAnalysis {
    pub fn load(path: &Path) -> Result<Self> {
        io::read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        io::write_json(path, self)
    }

    fn keys_where(&self, pred: impl Fn(&AnalysisEntry) -> bool) -> Vec<String> {
        let mut out: Vec<String> = self
            .entries
            .values()
            .filter(|e| pred(e))
            .map(|e| e.jira_key.clone())
            .collect();
        keys::sort_keys(&mut out);
        out
    }

    pub fn summary_fixes(&self) -> Vec<String> {
        self.keys_where(|e| e.needs_summary_fix)
    }

    pub fn epic_fixes(&self) -> Vec<String> {
        self.keys_where(|e| e.needs_epic_fix)
    }

    pub fn completion_needed(&self) -> Vec<String> {
        self.keys_where(|e| e.needs_completion)
    }
}

/// Backlog item a tracker issue corresponds to, plus the epic it should sit
/// under.
pub fn analyze_mapping(
    issues: &IssueCache,
    backlog: &Backlog,
    evidence: &CompletionEvidence,
    project_key: &str,
) -> MappingAnalysis {
    let key_only = Regex::new(&format!(r"^{}-\d+(?:-\d+)?$", regex::escape(project_key)))
        .unwrap_or_else(|_| keys::token_re().clone());
    // Stories first, then tasks: title inference takes the first hit.
    let items: Vec<(&str, &str)> = backlog
        .stories()
        .map(|s| (s.id.as_str(), s.title.as_str()))
        .chain(backlog.tasks().map(|t| (t.id.as_str(), t.description.as_str())))
        .collect();
    let completed = evidence.completed_keys();

    let mut analysis = MappingAnalysis::default();
    for issue in &issues.issues {
        let summary = issue.summary.trim();
        let mut entry = AnalysisEntry {
            jira_key: issue.key.clone(),
            summary_current: issue.summary.clone(),
            summary_correct: None,
            backlog_key: None,
            backlog_title: None,
            epic_current: issue.parent.clone(),
            epic_correct: None,
            status_current: issue.status.clone(),
            code_completed: false,
            needs_summary_fix: false,
            needs_epic_fix: false,
            needs_completion: false,
        };

        if key_only.is_match(summary) {
            if let Some((id, title)) = items.iter().find(|(id, _)| *id == summary) {
                entry.backlog_key = Some((*id).to_string());
                entry.summary_correct = Some((*title).to_string());
                entry.backlog_title = Some((*title).to_string());
                entry.needs_summary_fix = true;
            }
        } else if !summary.is_empty() {
            if let Some((id, title)) = items
                .iter()
                .find(|(_, t)| !t.is_empty() && (summary.contains(*t) || t.contains(summary)))
            {
                entry.backlog_key = Some((*id).to_string());
                entry.backlog_title = Some((*title).to_string());
                entry.summary_correct = Some(issue.summary.clone());
            }
        }

        if let Some(bl) = entry.backlog_key.as_deref() {
            entry.epic_correct = correct_epic(backlog, bl);
        }
        if let Some(correct) = entry.epic_correct.as_deref() {
            entry.needs_epic_fix = entry.epic_current.as_deref() != Some(correct);
        }
        if entry
            .backlog_key
            .as_ref()
            .is_some_and(|k| completed.contains(k))
            && issue.category() == StatusCategory::ToDo
        {
            entry.code_completed = true;
            entry.needs_completion = true;
        }
        analysis.entries.insert(issue.key.clone(), entry);
    }
    analysis
}

/// Epic of a story, or of a task's parent story (`GAM-22-4` → `GAM-22`).
fn correct_epic(backlog: &Backlog, backlog_key: &str) -> Option<String> {
    if backlog.story(backlog_key).is_some() {
        return backlog.epic_of_story(backlog_key).map(|e| e.id.clone());
    }
    let story = keys::parent_story_key(backlog_key)?;
    backlog.epic_of_story(&story).map(|e| e.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(key: &str, ty: &str, status: &str, parent: Option<&str>, summary: &str) -> IssueRecord {
        IssueRecord {
            key: key.to_string(),
            summary: summary.to_string(),
            issue_type: ty.to_string(),
            status: status.to_string(),
            parent: parent.map(str::to_string),
            duedate: None,
        }
    }

    const DOC: &str = "## Epic 1: A\n**Epic ID**: GAM-1\n\n\
                       ### Story GAM-11: Login API\n**Tasks**:\n\
                       - [ ] GAM-11-1: Implement login endpoint\n\n\
                       ## Epic 2: B\n**Epic ID**: GAM-2\n\n\
                       ### Story GAM-21: Profile page\n";

    #[test]
    fn unmapped_excludes_canonical_and_closed() {
        let mapping = MappingFile::from_value(json!({ "GAM-11": "GAM-40" })).unwrap();
        let canonical = canonical_keys(&mapping, DOC, "GAM");
        assert!(canonical.contains("GAM-40"));
        assert!(canonical.contains("GAM-11-1"));

        let issues = [
            rec("GAM-40", "Story", "To Do", None, "x"),
            rec("GAM-41", "Task", "To Do", None, "stray"),
            rec("GAM-42", "Task", "Done", None, "old"),
            rec("GAM-43", "Task", "취소", None, "old"),
        ];
        let keys: Vec<&str> = unmapped_issues(&issues, &canonical)
            .iter()
            .map(|i| i.key.as_str())
            .collect();
        assert_eq!(keys, ["GAM-41"]);
    }

    #[test]
    fn selection_filters_subtrees_kind_and_status() {
        let cache = IssueCache::new(vec![
            rec("GAM-1", "Epic", "To Do", None, ""),
            rec("GAM-2", "Epic", "To Do", None, ""),
            rec("GAM-10", "Task", "To Do", Some("GAM-1"), ""),
            rec("GAM-9", "Task", "Done", Some("GAM-1"), ""),
            rec("GAM-20", "Task", "To Do", Some("GAM-2"), ""),
        ]);
        let sel = Selection {
            kind: Some(IssueKind::Task),
            except_under: vec!["GAM-2".to_string()],
            ..Selection::default()
        };
        let keys: Vec<&str> = select(&cache, &sel).iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, ["GAM-9", "GAM-10"]);

        let sel = Selection {
            under: vec!["GAM-1".to_string()],
            status_not: Some(StatusCategory::Done),
            ..Selection::default()
        };
        let keys: Vec<&str> = select(&cache, &sel).iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, ["GAM-1", "GAM-10"]);
    }

    #[test]
    fn cache_completion_respects_exclusions_and_evidence() {
        let cache = IssueCache::new(vec![
            rec("GAM-1", "에픽", "완료", None, ""),
            rec("GAM-3", "에픽", "완료", None, ""),
            rec("GAM-11-1", "작업", "완료", Some("GAM-1"), ""),
            rec("GAM-11-2", "작업", "완료", Some("GAM-1"), ""),
            rec("GAM-11-3", "작업", "해야 할 일", Some("GAM-1"), ""),
            rec("GAM-31-1", "작업", "완료", Some("GAM-3"), ""),
        ]);
        let evidence =
            CompletionEvidence::from_json(r#"{"results":[{"key":"GAM-11-2","implemented":false}]}"#)
                .unwrap();
        let done = completed_from_cache(&cache, &["GAM-3"], &evidence);
        assert_eq!(done.into_iter().collect::<Vec<_>>(), ["GAM-11-1"]);
    }

    #[test]
    fn epic_closure_buckets() {
        let children: BTreeMap<String, Vec<String>> = [
            ("GAM-1".to_string(), vec!["GAM-11".to_string(), "GAM-12".to_string()]),
            ("GAM-2".to_string(), vec!["GAM-21".to_string(), "GAM-22".to_string()]),
            ("GAM-3".to_string(), vec!["GAM-31".to_string()]),
            ("GAM-4".to_string(), vec![]),
        ]
        .into();
        let mut asked = Vec::new();
        let plan = plan_epic_closure(&children, |key| {
            asked.push(key.to_string());
            match key {
                "GAM-3" => Some(StatusCategory::Done),
                "GAM-11" | "GAM-12" => Some(StatusCategory::Done),
                "GAM-21" => Some(StatusCategory::InProgress),
                "GAM-22" => Some(StatusCategory::Cancelled),
                _ => Some(StatusCategory::ToDo),
            }
        });
        assert_eq!(plan.ready, ["GAM-1"]);
        assert_eq!(plan.pending["GAM-2"], "GAM-21");
        assert_eq!(plan.already_done, ["GAM-3"]);
        assert_eq!(plan.no_children, ["GAM-4"]);
        assert!(!asked.contains(&"GAM-22".to_string()));
        assert!(!asked.contains(&"GAM-31".to_string()));
    }

    #[test]
    fn mismatches_only_for_todo() {
        let evidence = CompletionEvidence::from_json(
            r#"{"tasks_completed":[{"key":"GAM-11-1","description":"d"},{"key":"GAM-11-2"}],
                "stories_completed":[{"key":"GAM-11","title":"Login","completion_rate":1.0}]}"#,
        )
        .unwrap();
        let found = find_mismatches(&evidence, |key| match key {
            "GAM-11-1" => Some("해야 할 일".to_string()),
            "GAM-11-2" => Some("Done".to_string()),
            "GAM-11" => Some("To Do".to_string()),
            _ => None,
        });
        let keys: Vec<&str> = found.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, ["GAM-11-1", "GAM-11"]);
        assert_eq!(found[1].kind, "Story");
    }

    #[test]
    fn analysis_finds_summary_and_epic_fixes() {
        let backlog = Backlog::parse(DOC);
        let cache = IssueCache::new(vec![
            rec("GAM-50", "작업", "해야 할 일", Some("GAM-2"), "GAM-11-1"),
            rec("GAM-51", "스토리", "해야 할 일", Some("GAM-2"), "[BE] Profile page"),
            rec("GAM-52", "작업", "해야 할 일", None, "Unrelated"),
        ]);
        let evidence =
            CompletionEvidence::from_json(r#"{"tasks_completed":[{"key":"GAM-11-1"}]}"#).unwrap();
        let analysis = analyze_mapping(&cache, &backlog, &evidence, "GAM");

        let fix = &analysis.entries["GAM-50"];
        assert_eq!(fix.summary_correct.as_deref(), Some("Implement login endpoint"));
        assert_eq!(fix.epic_correct.as_deref(), Some("GAM-1"));
        assert!(fix.needs_summary_fix && fix.needs_epic_fix && fix.needs_completion);

        let ok = &analysis.entries["GAM-51"];
        assert_eq!(ok.backlog_key.as_deref(), Some("GAM-21"));
        assert!(!ok.needs_epic_fix);

        assert_eq!(analysis.summary_fixes(), ["GAM-50"]);
        assert_eq!(analysis.epic_fixes(), ["GAM-50"]);
        assert!(analysis.entries["GAM-52"].backlog_key.is_none());
    }
}
