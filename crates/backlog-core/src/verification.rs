use crate::error::Result;
use crate::io;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
struct ResultEntry {
    key: String,
    #[serde(default)]
    implemented: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTask {
    pub key: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedStory {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawVerification {
    #[serde(default)]
    results: Vec<ResultEntry>,
    #[serde(default)]
    tasks_completed: Option<Vec<CompletedTask>>,
    #[serde(default)]
    completed: Option<Vec<CompletedTask>>,
    #[serde(default)]
    stories_completed: Vec<CompletedStory>,
}

/// Code-completion results produced by an external verifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionEvidence {
    /// Keys marked `implemented: true`.
    pub implemented: BTreeSet<String>,
    /// Keys explicitly marked `implemented: false`.
    pub not_implemented: BTreeSet<String>,
    pub tasks: Vec<CompletedTask>,
    pub stories: Vec<CompletedStory>,
}

impl CompletionEvidence {
    pub fn load(path: &Path) -> Result<Self> {
        let raw: RawVerification = io::read_json(path)?;
        Ok(Self::from_raw(raw))
    }

    /// Like `load`, but a missing file means no evidence.
    pub fn load_optional(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawVerification = serde_json::from_str(text)?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawVerification) -> Self {
        let mut evidence = Self::default();
        for r in raw.results {
            match r.implemented {
                Some(true) => {
                    evidence.implemented.insert(r.key);
                }
                Some(false) => {
                    evidence.not_implemented.insert(r.key);
                }
                None => {}
            }
        }
        evidence.tasks = raw.tasks_completed.or(raw.completed).unwrap_or_default();
        evidence.stories = raw.stories_completed;
        evidence
    }

    /// Everything the evidence counts as done: implemented results plus
    /// completed tasks and stories.
    pub fn completed_keys(&self) -> BTreeSet<String> {
        let mut keys = self.implemented.clone();
        keys.extend(self.tasks.iter().map(|t| t.key.clone()));
        keys.extend(self.stories.iter().map(|s| s.key.clone()));
        keys
    }
}
