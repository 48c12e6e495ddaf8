use crate::error::Result;
use crate::io;
use crate::types::{IssueKind, StatusCategory};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

// ---------------------------------------------------------------------------
// IssueRecord
// ---------------------------------------------------------------------------

/// Snapshot of one tracker issue as stored in the issue cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub key: String,
    #[serde(default)]
    pub summary: String,
    #[serde(rename = "type", alias = "issue_type", default)]
    pub issue_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duedate: Option<String>,
}

impl IssueRecord {
    pub fn kind(&self) -> IssueKind {
        IssueKind::classify(&self.issue_type)
    }

    pub fn category(&self) -> StatusCategory {
        StatusCategory::classify(&self.status)
    }
}

// ---------------------------------------------------------------------------
// REST payload shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Named {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyRef {
    pub key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiFields {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub issuetype: Option<Named>,
    #[serde(default)]
    pub status: Option<Named>,
    #[serde(default)]
    pub parent: Option<KeyRef>,
    #[serde(default)]
    pub duedate: Option<String>,
}

/// An issue as returned by `GET /issue/{key}` or a search page.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiIssue {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub fields: ApiFields,
}

impl ApiIssue {
    /// `None` when the payload carries no key.
    pub fn into_record(self) -> Option<IssueRecord> {
        let key = self.key?;
        let f = self.fields;
        Some(IssueRecord {
            key,
            summary: f.summary.unwrap_or_default(),
            issue_type: f.issuetype.map(|t| t.name).unwrap_or_default(),
            status: f.status.map(|s| s.name).unwrap_or_default(),
            parent: f.parent.map(|p| p.key),
            duedate: f.duedate,
        })
    }
}

// ---------------------------------------------------------------------------
// IssueCache
// ---------------------------------------------------------------------------

/// A Task moved from under a Story to the Story's Epic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reparent {
    pub key: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueCache {
    pub issues: Vec<IssueRecord>,
}

impl IssueCache {
    pub fn new(issues: Vec<IssueRecord>) -> Self {
        Self { issues }
    }

    pub fn load(path: &Path) -> Result<Self> {
        io::read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        io::write_json(path, self)
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn by_key(&self) -> HashMap<&str, &IssueRecord> {
        self.issues.iter().map(|i| (i.key.as_str(), i)).collect()
    }

    pub fn get(&self, key: &str) -> Option<&IssueRecord> {
        self.issues.iter().find(|i| i.key == key)
    }

    /// Every issue below `roots` by transitive `parent`, roots excluded.
    pub fn descendants<S: AsRef<str>>(&self, roots: &[S]) -> BTreeSet<String> {
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for issue in &self.issues {
            if let Some(parent) = issue.parent.as_deref() {
                children.entry(parent).or_default().push(&issue.key);
            }
        }
        let mut out = BTreeSet::new();
        let mut stack: Vec<&str> = roots.iter().map(|r| r.as_ref()).collect();
        while let Some(key) = stack.pop() {
            for child in children.get(key).into_iter().flatten() {
                if out.insert((*child).to_string()) {
                    stack.push(*child);
                }
            }
        }
        out
    }

    /// `roots` plus their descendants.
    pub fn subtree<S: AsRef<str>>(&self, roots: &[S]) -> BTreeSet<String> {
        let mut out = self.descendants(roots);
        out.extend(roots.iter().map(|r| r.as_ref().to_string()));
        out
    }

    /// Tasks parented to a Story that itself sits under an Epic.
    pub fn reparent_plan(&self) -> Vec<Reparent> {
        let index = self.by_key();
        let mut plan = Vec::new();
        for issue in &self.issues {
            if issue.kind() != IssueKind::Task {
                continue;
            }
            let Some(story) = issue.parent.as_deref().and_then(|p| index.get(p)) else {
                continue;
            };
            if story.kind() != IssueKind::Story {
                continue;
            }
            let Some(epic) = story.parent.as_deref().and_then(|p| index.get(p)) else {
                continue;
            };
            if epic.kind() == IssueKind::Epic {
                plan.push(Reparent {
                    key: issue.key.clone(),
                    from: story.key.clone(),
                    to: epic.key.clone(),
                });
            }
        }
        plan
    }

    /// Count of issues per tracker type name.
    pub fn type_stats(&self) -> BTreeMap<String, usize> {
        let mut stats = BTreeMap::new();
        for issue in &self.issues {
            let name = if issue.issue_type.is_empty() {
                "(none)".to_string()
            } else {
                issue.issue_type.clone()
            };
            *stats.entry(name).or_insert(0) += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rec(key: &str, ty: &str, status: &str, parent: Option<&str>) -> IssueRecord {
        IssueRecord {
            key: key.to_string(),
            summary: format!("{key} summary"),
            issue_type: ty.to_string(),
            status: status.to_string(),
            parent: parent.map(str::to_string),
            duedate: None,
        }
    }

    fn cache() -> IssueCache {
        IssueCache::new(vec![
            rec("GAM-1", "에픽", "진행 중", None),
            rec("GAM-11", "스토리", "해야 할 일", Some("GAM-1")),
            rec("GAM-12", "작업", "완료", Some("GAM-11")),
            rec("GAM-13", "작업", "해야 할 일", Some("GAM-1")),
            rec("GAM-14", "하위 작업", "완료", Some("GAM-12")),
            rec("GAM-2", "Epic", "Done", None),
        ])
    }

    #[test]
    fn descendants_is_transitive() {
        let c = cache();
        let d: Vec<String> = c.descendants(&["GAM-1"]).into_iter().collect();
        assert_eq!(d, ["GAM-11", "GAM-12", "GAM-13", "GAM-14"]);
        assert!(c.subtree(&["GAM-2"]).contains("GAM-2"));
    }

    #[test]
    fn reparent_plan_moves_tasks_under_stories() {
        let plan = cache().reparent_plan();
        assert_eq!(
            plan,
            [Reparent {
                key: "GAM-12".to_string(),
                from: "GAM-11".to_string(),
                to: "GAM-1".to_string(),
            }]
        );
    }

    #[test]
    fn type_stats_counts_names() {
        let stats = cache().type_stats();
        assert_eq!(stats["작업"], 2);
        assert_eq!(stats["Epic"], 1);
    }

    #[test]
    fn api_issue_without_key_is_dropped() {
        let with: ApiIssue = serde_json::from_value(serde_json::json!({
            "key": "GAM-5",
            "fields": {
                "summary": "S",
                "issuetype": { "name": "Story" },
                "status": { "name": "Done" },
                "parent": { "key": "GAM-1" },
                "duedate": "2026-02-05"
            }
        }))
        .unwrap();
        let r = with.into_record().unwrap();
        assert_eq!(r.parent.as_deref(), Some("GAM-1"));
        assert_eq!(r.category(), StatusCategory::Done);

        let without: ApiIssue = serde_json::from_value(serde_json::json!({ "id": "10001" })).unwrap();
        assert!(without.into_record().is_none());
    }

    #[test]
    fn cache_file_uses_type_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("issues.json");
        cache().save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"type\": \"에픽\""));
        assert_eq!(IssueCache::load(&path).unwrap(), cache());
    }
}
