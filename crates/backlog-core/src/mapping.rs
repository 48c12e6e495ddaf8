use crate::error::{BacklogError, Result};
use crate::io;
use crate::keys;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

const JIRA_TO_BACKLOG: &str = "_jiraToBacklog";
const NESTED: &str = "mapping";

/// Backlog identifier → tracker key, persisted as a flat JSON object or
/// wrapped as `{"mapping": {...}}` next to metadata. The shape read is the
/// shape written.
///
/// Keys starting with `_` are metadata. `_jiraToBacklog` is read as a reverse
/// alias table (tracker key → backlog key); any other metadata is kept as-is
/// and written back on save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingFile {
    pub entries: BTreeMap<String, String>,
    pub jira_to_backlog: BTreeMap<String, String>,
    extra: Map<String, Value>,
    nested: bool,
}

impl MappingFile {
    /// Load the mapping; a missing file is an empty mapping.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let value: Value = io::read_json(path)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut obj) = value else {
            return Err(BacklogError::MalformedResponse(
                "mapping file must be a JSON object".to_string(),
            ));
        };
        let mut mapping = Self::default();
        match obj.remove(NESTED) {
            Some(Value::Object(inner)) => {
                mapping.nested = true;
                for (key, value) in std::mem::replace(&mut obj, inner) {
                    if key == JIRA_TO_BACKLOG {
                        mapping.read_aliases(&value);
                    } else {
                        mapping.extra.insert(key, value);
                    }
                }
            }
            Some(other) => {
                obj.insert(NESTED.to_string(), other);
            }
            None => {}
        }
        for (key, value) in obj {
            if key == JIRA_TO_BACKLOG {
                mapping.read_aliases(&value);
                continue;
            }
            if key.starts_with('_') {
                mapping.extra.insert(key, value);
                continue;
            }
            match value {
                Value::String(v) => {
                    mapping.entries.insert(key, v);
                }
                other => {
                    tracing::warn!(key = %key, value = %other, "ignoring non-string mapping entry");
                }
            }
        }
        Ok(mapping)
    }

    fn read_aliases(&mut self, value: &Value) {
        if let Value::Object(aliases) = value {
            for (jira, backlog) in aliases {
                if let Value::String(backlog) = backlog {
                    self.jira_to_backlog.insert(jira.clone(), backlog.clone());
                }
            }
        }
    }

    pub fn to_value(&self) -> Value {
        let entries: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let mut obj = if self.nested {
            let mut top = Map::new();
            top.insert(NESTED.to_string(), Value::Object(entries));
            top
        } else {
            entries
        };
        for (k, v) in &self.extra {
            obj.insert(k.clone(), v.clone());
        }
        if !self.jira_to_backlog.is_empty() {
            let aliases: Map<String, Value> = self
                .jira_to_backlog
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            obj.insert(JIRA_TO_BACKLOG.to_string(), Value::Object(aliases));
        }
        Value::Object(obj)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        io::write_json(path, &self.to_value())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, backlog_id: &str) -> Option<&str> {
        self.entries.get(backlog_id).map(String::as_str)
    }

    pub fn insert(&mut self, backlog_id: impl Into<String>, tracker_key: impl Into<String>) {
        self.entries.insert(backlog_id.into(), tracker_key.into());
    }

    /// The tracker key for a backlog id: the mapped value, else the id
    /// itself when it already is a key of `project_key`.
    pub fn resolve(&self, backlog_id: &str, project_key: &str) -> Option<String> {
        if let Some(key) = self.get(backlog_id) {
            return Some(key.to_string());
        }
        keys::in_project(backlog_id, project_key).then(|| backlog_id.to_string())
    }

    /// Every tracker key the mapping points at.
    pub fn canonical_keys(&self) -> BTreeSet<String> {
        self.entries.values().cloned().collect()
    }

    /// Each backlog child id plus every tracker key aliased to it.
    pub fn expand_children<S: AsRef<str>>(&self, children: &[S]) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for child in children {
            let child = child.as_ref();
            out.insert(child.to_string());
            out.extend(
                self.jira_to_backlog
                    .iter()
                    .filter(|(_, backlog)| backlog.as_str() == child)
                    .map(|(jira, _)| jira.clone()),
            );
        }
        out
    }
}
