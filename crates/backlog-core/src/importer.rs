//! Create tracker issues from the backlog document.
//!
//! Epics are created first, then stories (linked to their epic), then tasks
//! (linked to their story). Ids already present in the mapping are skipped
//! and their keys reused, so a rerun only creates what is missing.

use crate::backlog::{Backlog, BacklogTask, Epic, Story};
use crate::config::Config;
use crate::jira::{adf_document, JiraClient};
use crate::linker::Linker;
use crate::mapping::MappingFile;
use crate::types::{tracker_priority, IssueKind};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Link type between a task and its story.
pub const TASK_LINK_TYPE: &str = "Relates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Skipped,
    Failed,
    /// Dry run: would be created.
    Planned,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportItem {
    pub id: String,
    pub kind: IssueKind,
    pub summary: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ImportItem {
    fn new(id: &str, kind: IssueKind, summary: &str, outcome: Outcome) -> Self {
        Self {
            id: id.to_string(),
            kind,
            summary: summary.to_string(),
            outcome,
            key: None,
            message: None,
        }
    }

    fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

pub fn epic_description(epic: &Epic) -> String {
    format!(
        "**Business Value**: {}\n\n**Target Sprint**: {}\n\n**Total Story Points**: {} SP",
        epic.business_value.as_deref().unwrap_or_default(),
        epic.target_sprint.as_deref().unwrap_or_default(),
        epic.total_story_points.map(|p| p.to_string()).unwrap_or_default(),
    )
}

pub fn story_description(story: &Story) -> String {
    let mut parts = Vec::new();
    if !story.description.trim().is_empty() {
        parts.push(story.description.trim().to_string());
    }
    if let Some(us) = story.user_story.as_deref().filter(|s| !s.trim().is_empty()) {
        parts.push(format!("**User Story:**\n```\n{}\n```", us.trim()));
    }
    if let Some(ac) = story.acceptance_criteria.as_deref().filter(|s| !s.trim().is_empty()) {
        parts.push(format!("**Acceptance Criteria:**\n{}", ac.trim()));
    }
    if let Some(notes) = story.technical_notes.as_deref().filter(|s| !s.trim().is_empty()) {
        parts.push(format!("**Technical Notes:**\n```\n{}\n```", notes.trim()));
    }
    if let Some(dod) = story.definition_of_done.as_deref().filter(|s| !s.trim().is_empty()) {
        parts.push(format!("**Definition of Done:**\n{}", dod.trim()));
    }
    parts.join("\n\n")
}

pub fn epic_fields(epic: &Epic, config: &Config) -> Value {
    json!({
        "project": { "key": config.project_key },
        "summary": epic.name,
        "description": adf_document(&epic_description(epic)),
        "issuetype": { "id": config.issue_types.epic },
    })
}

pub fn story_fields(story: &Story, config: &Config, assignee: Option<&str>) -> Value {
    let mut fields = json!({
        "project": { "key": config.project_key },
        "summary": story.title,
        "description": adf_document(&story_description(story)),
        "issuetype": { "id": config.issue_types.story },
        "priority": { "name": tracker_priority(&story.priority) },
    });
    if let (Some(points), Some(field)) = (story.story_points, config.fields.story_points.first()) {
        fields[field.as_str()] = json!(points);
    }
    if !story.labels.is_empty() {
        fields["labels"] = json!(story.labels);
    }
    if let Some(account_id) = assignee {
        fields["assignee"] = json!({ "accountId": account_id });
    }
    fields
}

pub fn task_fields(task: &BacklogTask, config: &Config) -> Value {
    json!({
        "project": { "key": config.project_key },
        "summary": task.description,
        "issuetype": { "id": config.issue_types.task },
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Team {
    Backend,
    Frontend,
}

/// Team named in free-form assignee text, if any.
pub fn assignee_team(text: &str) -> Option<Team> {
    let lower = text.to_lowercase();
    if lower.contains("backend") || lower.contains("백엔드") {
        Some(Team::Backend)
    } else if lower.contains("frontend") || lower.contains("프론트") {
        Some(Team::Frontend)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Plan (dry run)
// ---------------------------------------------------------------------------

/// What a run would do without touching the tracker. Missing parents are
/// only failures when the parent is neither mapped nor going to be created.
pub fn plan_import(backlog: &Backlog, mapping: &MappingFile) -> Vec<ImportItem> {
    let mut items = Vec::new();
    for epic in &backlog.epics {
        items.push(planned(&epic.id, IssueKind::Epic, &epic.name, mapping));
    }
    for epic in &backlog.epics {
        for story in &epic.stories {
            items.push(planned(&story.id, IssueKind::Story, &story.title, mapping));
        }
    }
    for task in backlog.tasks() {
        items.push(planned(&task.id, IssueKind::Task, &task.description, mapping));
    }
    items
}

fn planned(id: &str, kind: IssueKind, summary: &str, mapping: &MappingFile) -> ImportItem {
    match mapping.get(id) {
        Some(key) => ImportItem::new(id, kind, summary, Outcome::Skipped).with_key(key),
        None => ImportItem::new(id, kind, summary, Outcome::Planned),
    }
}

// ---------------------------------------------------------------------------
// Importer
// ---------------------------------------------------------------------------

pub struct Importer<'a> {
    client: &'a JiraClient,
    config: &'a Config,
    linker: Linker<'a>,
    /// Used for backend assignees when no backend email is configured.
    login_email: &'a str,
    backend_account: Option<Option<String>>,
}

impl<'a> Importer<'a> {
    pub fn new(client: &'a JiraClient, config: &'a Config, login_email: &'a str) -> Self {
        Self {
            client,
            config,
            linker: Linker::new(client, &config.fields.epic_link),
            login_email,
            backend_account: None,
        }
    }

    fn resolve_assignee(&mut self, text: Option<&str>) -> Option<String> {
        match assignee_team(text?)? {
            Team::Frontend => self.config.assignees.frontend_account_id.clone(),
            Team::Backend => {
                if self.backend_account.is_none() {
                    let email = self
                        .config
                        .assignees
                        .backend_email
                        .as_deref()
                        .unwrap_or(self.login_email);
                    let found = match self.client.find_user(email) {
                        Ok(found) => found,
                        Err(e) => {
                            tracing::warn!(email, error = %e, "backend assignee lookup failed");
                            None
                        }
                    };
                    self.backend_account = Some(found);
                }
                self.backend_account.clone().flatten()
            }
        }
    }

    /// Create everything the mapping does not know yet. New keys are added
    /// to `mapping`; the caller saves it. `on_item` sees each result as it
    /// happens.
    pub fn run<F>(&mut self, backlog: &Backlog, mapping: &mut MappingFile, mut on_item: F) -> Vec<ImportItem>
    where
        F: FnMut(&ImportItem),
    {
        let mut items = Vec::new();
        let mut emit = |item: ImportItem, items: &mut Vec<ImportItem>| {
            on_item(&item);
            items.push(item);
        };

        let mut epic_keys: HashMap<&str, String> = HashMap::new();
        for epic in &backlog.epics {
            let item = ImportItem::new(&epic.id, IssueKind::Epic, &epic.name, Outcome::Created);
            if let Some(key) = mapping.get(&epic.id) {
                epic_keys.insert(&epic.id, key.to_string());
                emit(skipped(item, key), &mut items);
                continue;
            }
            let item = match self.client.create_issue(epic_fields(epic, self.config)) {
                Ok(key) => {
                    tracing::info!(id = %epic.id, key = %key, "created epic");
                    mapping.insert(&epic.id, &key);
                    epic_keys.insert(&epic.id, key.clone());
                    item.with_key(key)
                }
                Err(e) => failed(item, e.to_string()),
            };
            emit(item, &mut items);
        }

        let mut story_keys: HashMap<&str, String> = HashMap::new();
        for epic in &backlog.epics {
            for story in &epic.stories {
                let item = ImportItem::new(&story.id, IssueKind::Story, &story.title, Outcome::Created);
                let Some(epic_key) = epic_keys.get(story.epic_id.as_str()) else {
                    emit(failed(item, format!("epic {} has no tracker key", story.epic_id)), &mut items);
                    continue;
                };
                if let Some(key) = mapping.get(&story.id) {
                    story_keys.insert(&story.id, key.to_string());
                    emit(skipped(item, key), &mut items);
                    continue;
                }
                let assignee = self.resolve_assignee(story.assignee.as_deref());
                let fields = story_fields(story, self.config, assignee.as_deref());
                let item = match self.client.create_issue(fields) {
                    Ok(key) => {
                        tracing::info!(id = %story.id, key = %key, "created story");
                        mapping.insert(&story.id, &key);
                        story_keys.insert(&story.id, key.clone());
                        match self.linker.attach(&key, epic_key) {
                            Ok(method) => item.with_key(key).with_message(format!("linked to {epic_key} via {method}")),
                            Err(e) => {
                                tracing::warn!(key = %key, epic = %epic_key, error = %e, "story created but not linked");
                                item.with_key(key).with_message(e.to_string())
                            }
                        }
                    }
                    Err(e) => failed(item, e.to_string()),
                };
                emit(item, &mut items);
            }
        }

        for task in backlog.tasks() {
            let item = ImportItem::new(&task.id, IssueKind::Task, &task.description, Outcome::Created);
            let Some(story_key) = story_keys.get(task.story_id.as_str()) else {
                emit(failed(item, format!("story {} has no tracker key", task.story_id)), &mut items);
                continue;
            };
            if let Some(key) = mapping.get(&task.id) {
                emit(skipped(item, key), &mut items);
                continue;
            }
            let item = match self.client.create_issue(task_fields(task, self.config)) {
                Ok(key) => {
                    tracing::info!(id = %task.id, key = %key, "created task");
                    mapping.insert(&task.id, &key);
                    match self.client.create_link(TASK_LINK_TYPE, &key, story_key) {
                        Ok(()) => item.with_key(key).with_message(format!("relates to {story_key}")),
                        Err(e) => {
                            tracing::warn!(key = %key, story = %story_key, error = %e, "task created but not linked");
                            item.with_key(key).with_message(e.to_string())
                        }
                    }
                }
                Err(e) => failed(item, e.to_string()),
            };
            emit(item, &mut items);
        }

        items
    }
}

fn skipped(item: ImportItem, key: &str) -> ImportItem {
    ImportItem {
        outcome: Outcome::Skipped,
        ..item
    }
    .with_key(key)
}

fn failed(item: ImportItem, message: String) -> ImportItem {
    tracing::warn!(id = %item.id, error = %message, "import failed");
    ImportItem {
        outcome: Outcome::Failed,
        ..item
    }
    .with_message(message)
}
