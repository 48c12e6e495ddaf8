//! Markdown backlog document: epics, stories and checklist tasks.
//!
//! The document is parsed line by line. `## Epic n:` opens an epic,
//! `### Story KEY: title` opens a story, `**Label**: value` lines set fields.
//! Block fields collect the following lines until the next label, a `---`
//! rule or a heading.

use crate::error::Result;
use crate::io;
use crate::keys;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Backlog {
    pub epics: Vec<Epic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epic {
    pub id: String,
    /// Heading text after `## Epic n:`.
    pub heading: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_sprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_story_points: Option<u32>,
    pub stories: Vec<Story>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub epic_id: String,
    pub title: String,
    pub story_type: String,
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_points: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprint: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_story: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<String>,
    #[serde(default)]
    pub tasks: Vec<BacklogTask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition_of_done: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklogTask {
    pub id: String,
    pub story_id: String,
    pub description: String,
    pub done: bool,
}

/// One story section in the task→epic mapping file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub epic_key: String,
    pub story_key: String,
    pub story_title: String,
    pub task_keys: Vec<String>,
}

/// Serialized shape of the task→epic mapping file. Only `task_to_epic` is
/// read back; the rest is for people.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskEpicIndex {
    #[serde(default)]
    pub task_to_epic: BTreeMap<String, String>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub task_count: usize,
    #[serde(default)]
    pub section_count: usize,
}

impl TaskEpicIndex {
    pub fn load(path: &Path) -> Result<Self> {
        io::read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        io::write_json(path, self)
    }

    /// Reverse `task_to_epic`: epic key → sorted task keys.
    pub fn epic_to_tasks(&self) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (task, epic) in &self.task_to_epic {
            out.entry(epic.clone()).or_default().push(task.clone());
        }
        for tasks in out.values_mut() {
            keys::sort_keys(tasks);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Line patterns
// ---------------------------------------------------------------------------

static EPIC_HEADING: OnceLock<Regex> = OnceLock::new();
static STORY_HEADING: OnceLock<Regex> = OnceLock::new();
static FIELD_LINE: OnceLock<Regex> = OnceLock::new();
static TASK_LINE: OnceLock<Regex> = OnceLock::new();
static POINTS: OnceLock<Regex> = OnceLock::new();
static CHECKBOX_LINE: OnceLock<Regex> = OnceLock::new();

fn epic_heading() -> &'static Regex {
    EPIC_HEADING.get_or_init(|| Regex::new(r"^##\s+Epic\s+\d+\s*:\s*(.*)$").unwrap())
}

fn story_heading() -> &'static Regex {
    STORY_HEADING.get_or_init(|| Regex::new(r"^###\s+Story\s+(\S+?)\s*:\s*(.*)$").unwrap())
}

fn field_line() -> &'static Regex {
    FIELD_LINE.get_or_init(|| Regex::new(r"^\*\*([^*]+)\*\*\s*:\s*(.*)$").unwrap())
}

fn task_line() -> &'static Regex {
    TASK_LINE.get_or_init(|| {
        Regex::new(r"^\s*-\s*\[([ xX])\]\s+([A-Z][A-Z0-9_]*-\d+(?:-\d+)*)\s*:\s*(.*)$").unwrap()
    })
}

fn points() -> &'static Regex {
    POINTS.get_or_init(|| Regex::new(r"(\d+)\s*SP").unwrap())
}

fn checkbox_line() -> &'static Regex {
    CHECKBOX_LINE
        .get_or_init(|| Regex::new(r"^(\s*-\s*\[)([ xX])(\]\s+)([A-Za-z0-9_-]+)\s*:").unwrap())
}

fn parse_points(value: &str) -> Option<u32> {
    points().captures(value).and_then(|c| c[1].parse().ok())
}

fn non_empty(value: &str) -> Option<String> {
    let v = value.trim();
    (!v.is_empty()).then(|| v.to_string())
}

/// Strip a surrounding ``` fence (with optional language tag).
fn unwrap_fence(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = usize::from(lines.first().is_some_and(|l| l.trim_start().starts_with("```")));
    let mut end = lines.len();
    if end > start && lines[end - 1].trim() == "```" {
        end -= 1;
    }
    lines[start..end.max(start)].join("\n").trim().to_string()
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq)]
enum Block {
    Description,
    UserStory,
    AcceptanceCriteria,
    Tasks,
    TechnicalNotes,
    DefinitionOfDone,
}

impl Block {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "Description" => Some(Block::Description),
            "User Story" => Some(Block::UserStory),
            "Acceptance Criteria" => Some(Block::AcceptanceCriteria),
            "Tasks" => Some(Block::Tasks),
            "Technical Notes" => Some(Block::TechnicalNotes),
            "Definition of Done" => Some(Block::DefinitionOfDone),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Parser {
    epics: Vec<Epic>,
    epic: Option<Epic>,
    epic_has_id: bool,
    story: Option<Story>,
    block: Option<Block>,
    buffer: Vec<String>,
    in_fence: bool,
}

impl Parser {
    fn flush_block(&mut self) {
        let Some(block) = self.block.take() else {
            return;
        };
        let lines = std::mem::take(&mut self.buffer);
        self.in_fence = false;
        let Some(story) = self.story.as_mut() else {
            return;
        };
        let text = lines.join("\n").trim().to_string();
        match block {
            Block::Description => story.description = text,
            Block::UserStory => story.user_story = non_empty(&unwrap_fence(&text)),
            Block::AcceptanceCriteria => story.acceptance_criteria = non_empty(&text),
            Block::TechnicalNotes => story.technical_notes = non_empty(&unwrap_fence(&text)),
            Block::DefinitionOfDone => story.definition_of_done = non_empty(&text),
            Block::Tasks => {
                let story_id = story.id.clone();
                for line in &lines {
                    if let Some(c) = task_line().captures(line) {
                        story.tasks.push(BacklogTask {
                            id: c[2].to_string(),
                            story_id: story_id.clone(),
                            description: c[3].trim().to_string(),
                            done: &c[1] != " ",
                        });
                    } else {
                        let t = line.trim();
                        if t.is_empty() || t.starts_with('-') || t.starts_with('*') {
                            continue;
                        }
                        if let Some(last) = story.tasks.last_mut() {
                            if !last.description.is_empty() {
                                last.description.push(' ');
                            }
                            last.description.push_str(t);
                        }
                    }
                }
            }
        }
    }

    fn flush_story(&mut self) {
        self.flush_block();
        if let Some(story) = self.story.take() {
            if let Some(epic) = self.epic.as_mut() {
                epic.stories.push(story);
            }
        }
    }

    fn flush_epic(&mut self) {
        self.flush_story();
        if let Some(mut epic) = self.epic.take() {
            if !self.epic_has_id {
                tracing::debug!(heading = %epic.heading, "skipping epic without Epic ID");
                return;
            }
            if epic.name.is_empty() {
                epic.name = epic.heading.clone();
            }
            for story in &mut epic.stories {
                story.epic_id = epic.id.clone();
            }
            self.epics.push(epic);
        }
    }

    fn field(&mut self, label: &str, value: &str) {
        if let Some(block) = Block::from_label(label) {
            if self.story.is_some() {
                self.block = Some(block);
                if !value.trim().is_empty() {
                    self.buffer.push(value.to_string());
                    self.in_fence = value.trim_start().starts_with("```");
                }
            }
            return;
        }
        if let Some(story) = self.story.as_mut() {
            match label {
                "Story Type" => story.story_type = value.trim().to_string(),
                "Priority" => story.priority = value.trim().to_string(),
                "Story Points" => story.story_points = parse_points(value),
                "Assignee" => story.assignee = non_empty(value),
                "Sprint" => story.sprint = non_empty(value),
                "Labels" => {
                    story.labels = value
                        .split(',')
                        .map(|l| l.trim().trim_matches('`').trim().to_string())
                        .filter(|l| !l.is_empty())
                        .collect();
                }
                _ => {}
            }
            return;
        }
        if let Some(epic) = self.epic.as_mut() {
            match label {
                "Epic ID" => {
                    if let Some(id) = value.split_whitespace().next() {
                        epic.id = id.to_string();
                        self.epic_has_id = true;
                    }
                }
                "Epic Name" => epic.name = value.trim().to_string(),
                "Business Value" => epic.business_value = non_empty(value),
                "Target Sprint" => epic.target_sprint = non_empty(value),
                "Total Story Points" => epic.total_story_points = parse_points(value),
                _ => {}
            }
        }
    }

    fn line(&mut self, line: &str) {
        let trimmed = line.trim();

        if self.in_fence {
            if trimmed.starts_with("```") {
                self.in_fence = false;
            }
            self.buffer.push(line.to_string());
            return;
        }

        if let Some(c) = epic_heading().captures(trimmed) {
            self.flush_epic();
            self.epic = Some(Epic {
                id: String::new(),
                heading: c[1].trim().to_string(),
                name: String::new(),
                business_value: None,
                target_sprint: None,
                total_story_points: None,
                stories: Vec::new(),
            });
            self.epic_has_id = false;
            return;
        }

        if let Some(c) = story_heading().captures(trimmed) {
            self.flush_story();
            if self.epic.is_some() {
                self.story = Some(Story {
                    id: c[1].to_string(),
                    epic_id: String::new(),
                    title: c[2].trim().to_string(),
                    story_type: "Story".to_string(),
                    priority: "Medium".to_string(),
                    story_points: None,
                    assignee: None,
                    sprint: None,
                    labels: Vec::new(),
                    description: String::new(),
                    user_story: None,
                    acceptance_criteria: None,
                    tasks: Vec::new(),
                    technical_notes: None,
                    definition_of_done: None,
                });
            }
            return;
        }

        if trimmed == "---" || trimmed.starts_with('#') {
            self.flush_block();
            return;
        }

        if let Some(c) = field_line().captures(trimmed) {
            self.flush_block();
            let (label, value) = (c[1].trim().to_string(), c[2].to_string());
            self.field(&label, &value);
            return;
        }

        if self.block.is_some() {
            if trimmed.starts_with("```") {
                self.in_fence = true;
            }
            self.buffer.push(line.to_string());
        }
    }

    fn finish(mut self) -> Backlog {
        self.flush_epic();
        Backlog { epics: self.epics }
    }
}

// ---------------------------------------------------------------------------
// Backlog operations
// ---------------------------------------------------------------------------

impl Backlog {
    pub fn parse(text: &str) -> Self {
        let mut parser = Parser::default();
        for line in text.lines() {
            parser.line(line);
        }
        parser.finish()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = io::read_text(path)?;
        Ok(Self::parse(&text))
    }

    /// (epics, stories, tasks)
    pub fn counts(&self) -> (usize, usize, usize) {
        let stories = self.stories().count();
        let tasks = self.tasks().count();
        (self.epics.len(), stories, tasks)
    }

    pub fn stories(&self) -> impl Iterator<Item = &Story> {
        self.epics.iter().flat_map(|e| e.stories.iter())
    }

    pub fn tasks(&self) -> impl Iterator<Item = &BacklogTask> {
        self.stories().flat_map(|s| s.tasks.iter())
    }

    pub fn epic(&self, id: &str) -> Option<&Epic> {
        self.epics.iter().find(|e| e.id == id)
    }

    pub fn story(&self, id: &str) -> Option<&Story> {
        self.stories().find(|s| s.id == id)
    }

    pub fn epic_of_story(&self, story_id: &str) -> Option<&Epic> {
        self.epics
            .iter()
            .find(|e| e.stories.iter().any(|s| s.id == story_id))
    }

    pub fn task_epic_index(&self) -> TaskEpicIndex {
        let mut index = TaskEpicIndex::default();
        for epic in &self.epics {
            for story in &epic.stories {
                let task_keys: Vec<String> = story.tasks.iter().map(|t| t.id.clone()).collect();
                for key in &task_keys {
                    index.task_to_epic.insert(key.clone(), epic.id.clone());
                }
                index.sections.push(Section {
                    epic_key: epic.id.clone(),
                    story_key: story.id.clone(),
                    story_title: story.title.clone(),
                    task_keys,
                });
            }
        }
        index.task_count = index.task_to_epic.len();
        index.section_count = index.sections.len();
        index
    }

    /// Epic id → story ids, in document order.
    pub fn epic_children(&self) -> BTreeMap<String, Vec<String>> {
        self.epics
            .iter()
            .map(|e| (e.id.clone(), e.stories.iter().map(|s| s.id.clone()).collect()))
            .collect()
    }

    /// Title of any backlog item (epic name, story title or task description).
    pub fn title_of(&self, id: &str) -> Option<&str> {
        if let Some(epic) = self.epic(id) {
            return Some(&epic.name);
        }
        if let Some(story) = self.story(id) {
            return Some(&story.title);
        }
        self.tasks()
            .find(|t| t.id == id)
            .map(|t| t.description.as_str())
    }
}

// ---------------------------------------------------------------------------
// Text rewrites
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckboxSync {
    pub text: String,
    pub checked: usize,
    pub unchecked: usize,
    pub unchanged: usize,
}

impl CheckboxSync {
    pub fn changed(&self) -> bool {
        self.checked + self.unchecked > 0
    }
}

/// Set `[x]` on checklist lines whose key is in `completed` and `[ ]` on the
/// rest. Only lines tagged with a key that fully matches `key_re` are touched.
pub fn sync_checkboxes(text: &str, key_re: &Regex, completed: &BTreeSet<String>) -> CheckboxSync {
    let mut out = CheckboxSync::default();
    let mut result = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let Some(c) = checkbox_line().captures(line) else {
            result.push_str(line);
            continue;
        };
        let key = &c[4];
        let tagged = key_re
            .find(key)
            .is_some_and(|m| m.start() == 0 && m.end() == key.len());
        if !tagged {
            result.push_str(line);
            continue;
        }
        let was_done = &c[2] != " ";
        let want_done = completed.contains(key);
        if was_done == want_done {
            out.unchanged += 1;
            result.push_str(line);
            continue;
        }
        let mark = if want_done { "x" } else { " " };
        let m = c.get(2).map(|m| m.range()).unwrap_or(0..0);
        result.push_str(&line[..m.start]);
        result.push_str(mark);
        result.push_str(&line[m.end..]);
        if want_done {
            out.checked += 1;
        } else {
            out.unchecked += 1;
        }
    }
    out.text = result;
    out
}

/// Replace every whole key token found in `mapping`. Sub-key tokens such as
/// `GAM-11-1` are distinct from `GAM-11`. All replacements happen in one pass.
pub fn rewrite_keys(text: &str, mapping: &HashMap<String, String>) -> (String, usize) {
    let mut count = 0;
    let out = keys::token_re().replace_all(text, |c: &regex::Captures<'_>| {
        let token = &c[0];
        match mapping.get(token) {
            Some(new) => {
                count += 1;
                new.clone()
            }
            None => token.to_string(),
        }
    });
    (out.into_owned(), count)
}

/// Every `KEY-n` / `KEY-n-m` token of the project referenced in `text`.
pub fn referenced_keys(text: &str, project_key: &str) -> BTreeSet<String> {
    keys::project_key_re(project_key)
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"# Backlog

## Epic 1: Accounts
**Epic ID**: GAM-1
**Epic Name**: User accounts
**Business Value**: Users can sign in
**Target Sprint**: Week 1-2 (due: 2026-02-05)
**Total Story Points**: 8 SP

### Story GAM-11: Login API
**Story Type**: Story
**Priority**: High
**Story Points**: 5 SP
**Assignee**: Backend Developer
**Sprint**: Week 1
**Labels**: `backend`, `auth`
**Description**: Email and password login
with JWT.
**User Story**:
```
As a user I want to log in
```
**Acceptance Criteria**:
- [ ] Valid credentials return a token
**Tasks**:
- [ ] GAM-11-1: Implement login endpoint
  returning 200
- [x] GAM-11-2: Add JWT issuing
**Technical Notes**:
```kotlin
**NotALabel**: inside fence
```
**Definition of Done**:
- Tests pass
---

### Story GAM-12: Logout
**Sprint**: Week 2
**Tasks**:
- [ ] GAM-12-1: Revoke token

## Epic 2: Drafts
**Epic Name**: no id, skipped

### Story GAM-99: Orphan

## Epic 3: Matching
**Epic ID**: GAM-3
**Target Sprint**: Week 3

### Story GAM-31: Match list
"#;

    #[test]
    fn parses_epics_stories_and_tasks() {
        let backlog = Backlog::parse(FIXTURE);
        assert_eq!(backlog.counts(), (2, 3, 3));

        let epic = &backlog.epics[0];
        assert_eq!(epic.id, "GAM-1");
        assert_eq!(epic.name, "User accounts");
        assert_eq!(epic.total_story_points, Some(8));
        assert_eq!(epic.target_sprint.as_deref(), Some("Week 1-2 (due: 2026-02-05)"));

        let story = backlog.story("GAM-11").unwrap();
        assert_eq!(story.epic_id, "GAM-1");
        assert_eq!(story.priority, "High");
        assert_eq!(story.story_points, Some(5));
        assert_eq!(story.labels, ["backend", "auth"]);
        assert_eq!(story.description, "Email and password login\nwith JWT.");
        assert_eq!(story.user_story.as_deref(), Some("As a user I want to log in"));
        assert_eq!(
            story.technical_notes.as_deref(),
            Some("**NotALabel**: inside fence")
        );
        assert_eq!(story.definition_of_done.as_deref(), Some("- Tests pass"));
        assert_eq!(story.tasks.len(), 2);
        assert_eq!(
            story.tasks[0].description,
            "Implement login endpoint returning 200"
        );
        assert!(!story.tasks[0].done);
        assert!(story.tasks[1].done);
    }

    #[test]
    fn story_defaults_and_epic_name_fallback() {
        let backlog = Backlog::parse(FIXTURE);
        let logout = backlog.story("GAM-12").unwrap();
        assert_eq!(logout.story_type, "Story");
        assert_eq!(logout.priority, "Medium");
        assert_eq!(logout.sprint.as_deref(), Some("Week 2"));
        assert!(backlog.story("GAM-99").is_none());
        assert_eq!(backlog.epic("GAM-3").unwrap().name, "Matching");
        assert_eq!(backlog.epic_of_story("GAM-31").unwrap().id, "GAM-3");
    }

    #[test]
    fn task_epic_index_and_children() {
        let backlog = Backlog::parse(FIXTURE);
        let index = backlog.task_epic_index();
        assert_eq!(index.task_count, 3);
        assert_eq!(index.section_count, 3);
        assert_eq!(index.task_to_epic["GAM-12-1"], "GAM-1");
        assert_eq!(index.epic_to_tasks()["GAM-1"], ["GAM-11-1", "GAM-11-2", "GAM-12-1"]);
        assert_eq!(backlog.epic_children()["GAM-1"], ["GAM-11", "GAM-12"]);
        assert_eq!(backlog.title_of("GAM-11-2"), Some("Add JWT issuing"));
    }

    #[test]
    fn task_epic_index_loads_without_sections() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, r#"{"task_to_epic": {"GAM-11-1": "GAM-1"}}"#).unwrap();
        let index = TaskEpicIndex::load(&path).unwrap();
        assert!(index.sections.is_empty());
        assert_eq!(index.epic_to_tasks()["GAM-1"], ["GAM-11-1"]);
    }

    #[test]
    fn checkbox_sync_touches_only_tagged_lines() {
        let text = "- [ ] GAM-1-1: a\n- [x] GAM-1-2: b\n- [ ] plain item\n- [x] GAMF-3: other\n";
        let completed: BTreeSet<String> = ["GAM-1-1".to_string()].into();
        let re = keys::project_key_re("GAM");
        let out = sync_checkboxes(text, &re, &completed);
        assert_eq!(
            out.text,
            "- [x] GAM-1-1: a\n- [ ] GAM-1-2: b\n- [ ] plain item\n- [x] GAMF-3: other\n"
        );
        assert_eq!((out.checked, out.unchecked, out.unchanged), (1, 1, 0));
        assert!(out.changed());
    }

    #[test]
    fn rewrite_keys_is_simultaneous_and_skips_subkeys() {
        let mapping: HashMap<String, String> = [
            ("GAM-11".to_string(), "GAM-12".to_string()),
            ("GAM-12".to_string(), "GAM-40".to_string()),
        ]
        .into();
        let (out, n) = rewrite_keys("GAM-11, GAM-12 and GAM-11-1", &mapping);
        assert_eq!(out, "GAM-12, GAM-40 and GAM-11-1");
        assert_eq!(n, 2);
    }

    #[test]
    fn referenced_keys_collects_project_tokens() {
        let keys = referenced_keys(FIXTURE, "GAM");
        assert!(keys.contains("GAM-11-1"));
        assert!(keys.contains("GAM-99"));
        assert!(!keys.iter().any(|k| k.starts_with("GAMF")));
    }
}
