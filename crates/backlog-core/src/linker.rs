//! Attach a child issue to an epic (or a task to a story).
//!
//! Tracker projects differ in how hierarchy is stored, so each method is
//! tried in turn: the `parent` field, each configured epic-link custom field,
//! then issue links of the candidate types in both directions.

use crate::error::{BacklogError, Result};
use crate::jira::JiraClient;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;

/// Link type names tried first, when the server offers them.
pub const PREFERRED_LINK_TYPES: &[&str] = &[
    "Epic-Story Link",
    "Epic-Story",
    "relates to",
    "Parent-Child",
    "Child",
];

/// Preferred names the server knows, else the server's first three types.
pub fn candidate_link_types(available: &[String]) -> Vec<String> {
    let preferred: Vec<String> = PREFERRED_LINK_TYPES
        .iter()
        .filter(|p| available.iter().any(|a| a == *p))
        .map(|p| (*p).to_string())
        .collect();
    if preferred.is_empty() {
        available.iter().take(3).cloned().collect()
    } else {
        preferred
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "detail", rename_all = "snake_case")]
pub enum LinkMethod {
    AlreadyLinked,
    ParentField,
    EpicLinkField(String),
    IssueLink(String),
}

impl fmt::Display for LinkMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkMethod::AlreadyLinked => f.write_str("already linked"),
            LinkMethod::ParentField => f.write_str("parent field"),
            LinkMethod::EpicLinkField(field) => write!(f, "epic link field {field}"),
            LinkMethod::IssueLink(name) => write!(f, "issue link '{name}'"),
        }
    }
}

pub struct Linker<'a> {
    client: &'a JiraClient,
    epic_link_fields: &'a [String],
    link_types: Vec<String>,
}

impl<'a> Linker<'a> {
    /// Fetches the server's link types once. A failure there only disables
    /// the issue-link fallback.
    pub fn new(client: &'a JiraClient, epic_link_fields: &'a [String]) -> Self {
        let link_types = match client.link_types() {
            Ok(available) => candidate_link_types(&available),
            Err(e) => {
                tracing::warn!(error = %e, "could not list issue link types");
                Vec::new()
            }
        };
        Self {
            client,
            epic_link_fields,
            link_types,
        }
    }

    pub fn link_types(&self) -> &[String] {
        &self.link_types
    }

    /// Link `child` under `epic` unless its parent already is `epic`.
    pub fn link(&self, child: &str, epic: &str) -> Result<LinkMethod> {
        match self.client.get_issue(child, &["parent"]) {
            Ok(issue) if issue.parent.as_deref() == Some(epic) => {
                return Ok(LinkMethod::AlreadyLinked);
            }
            Ok(issue) => {
                if let Some(other) = issue.parent {
                    tracing::warn!(child, current = %other, epic, "re-linking issue that has another parent");
                }
            }
            Err(e) => tracing::debug!(child, error = %e, "could not read current parent"),
        }
        self.attach(child, epic)
    }

    /// Try every method without checking the current parent.
    pub fn attach(&self, child: &str, epic: &str) -> Result<LinkMethod> {
        if self.client.set_parent(child, epic).is_ok() {
            return Ok(LinkMethod::ParentField);
        }
        for field in self.epic_link_fields {
            let mut fields = Map::new();
            fields.insert(field.clone(), json!(epic));
            if self.client.update_fields(child, Value::Object(fields)).is_ok() {
                return Ok(LinkMethod::EpicLinkField(field.clone()));
            }
        }
        for name in &self.link_types {
            if self.client.create_link(name, child, epic).is_ok()
                || self.client.create_link(name, epic, child).is_ok()
            {
                return Ok(LinkMethod::IssueLink(name.clone()));
            }
        }
        Err(BacklogError::LinkFailed {
            child: child.to_string(),
            target: epic.to_string(),
        })
    }
}
