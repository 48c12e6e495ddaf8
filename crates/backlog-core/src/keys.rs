//! Issue key helpers: validation, numeric-aware ordering, and extraction from
//! free text such as commit messages.

use crate::error::{BacklogError, Result};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Default pattern for keys found in commit messages.
pub const DEFAULT_COMMIT_PATTERN: &str = r"GAM-\d+";

static KEY_RE: OnceLock<Regex> = OnceLock::new();
static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn key_re() -> &'static Regex {
    KEY_RE.get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9_]*-\d+(?:-\d+)*$").unwrap())
}

/// Any issue-key-shaped token, including sub-keys such as `GAM-11-1`.
pub fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| Regex::new(r"\b[A-Z][A-Z0-9_]*-\d+(?:-\d+)*\b").unwrap())
}

pub fn validate_key(key: &str) -> Result<()> {
    if key_re().is_match(key) {
        Ok(())
    } else {
        Err(BacklogError::InvalidKey(key.to_string()))
    }
}

/// Regex matching `PROJECT-n` and `PROJECT-n-m` for one project.
pub fn project_key_re(project_key: &str) -> Regex {
    let pattern = format!(r"\b{}-\d+(?:-\d+)?\b", regex::escape(project_key));
    // The escaped project key cannot make the pattern invalid.
    Regex::new(&pattern).unwrap()
}

/// `GAM-22-4` → `Some("GAM-22")`; plain keys have no parent.
pub fn parent_story_key(task_key: &str) -> Option<String> {
    let parts: Vec<&str> = task_key.split('-').collect();
    if parts.len() < 3 || !parts[1..].iter().all(|p| p.parse::<u64>().is_ok()) {
        return None;
    }
    Some(parts[..parts.len() - 1].join("-"))
}

/// True when `key` belongs to the project, e.g. `GAM-7` for `GAM` (not `GAMF-7`).
pub fn in_project(key: &str, project_key: &str) -> bool {
    key.strip_prefix(project_key)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|rest| rest.split('-').all(|p| p.parse::<u64>().is_ok()))
}

/// Order keys by prefix, then numerically by each segment (`GAM-2` < `GAM-10`).
pub fn cmp_keys(a: &str, b: &str) -> Ordering {
    let split = |k: &str| -> (String, Vec<u64>) {
        let mut parts = k.split('-');
        let prefix = parts.next().unwrap_or_default().to_string();
        let nums = parts.map(|p| p.parse::<u64>().unwrap_or(u64::MAX)).collect();
        (prefix, nums)
    };
    split(a).cmp(&split(b)).then_with(|| a.cmp(b))
}

pub fn sort_keys(keys: &mut [String]) {
    keys.sort_by(|a, b| cmp_keys(a, b));
}

/// Extract keys from commit messages. Matching is case-insensitive; results
/// are upper-cased and de-duplicated.
pub fn extract_keys<S: AsRef<str>>(messages: &[S], pattern: &str) -> Result<BTreeSet<String>> {
    let re = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| BacklogError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
    Ok(messages
        .iter()
        .flat_map(|m| re.find_iter(m.as_ref()).map(|k| k.as_str().to_uppercase()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_and_invalid_keys() {
        for key in ["GAM-1", "GAM-11-2", "GAMF-3"] {
            validate_key(key).unwrap_or_else(|_| panic!("expected valid: {key}"));
        }
        for key in ["", "gam-1", "GAM-", "GAM1", "GAM-1a"] {
            assert!(validate_key(key).is_err(), "expected invalid: {key}");
        }
    }

    #[test]
    fn parent_story_of_task_key() {
        assert_eq!(parent_story_key("GAM-22-4").as_deref(), Some("GAM-22"));
        assert_eq!(parent_story_key("GAM-22"), None);
        assert_eq!(parent_story_key("GAM-x-4"), None);
    }

    #[test]
    fn project_membership_excludes_longer_prefixes() {
        assert!(in_project("GAM-7", "GAM"));
        assert!(in_project("GAM-7-1", "GAM"));
        assert!(!in_project("GAMF-7", "GAM"));
        assert!(!in_project("GAM-x", "GAM"));
    }

    #[test]
    fn keys_sort_numerically() {
        let mut keys = vec![
            "GAM-10".to_string(),
            "GAM-2".to_string(),
            "GAM-2-1".to_string(),
            "GAF-1".to_string(),
        ];
        sort_keys(&mut keys);
        assert_eq!(keys, ["GAF-1", "GAM-2", "GAM-2-1", "GAM-10"]);
    }

    #[test]
    fn extract_keys_from_commit_messages() {
        let msgs = ["feat: login (gam-12)", "fix GAM-3 and GAM-12", ""];
        let keys = extract_keys(&msgs, DEFAULT_COMMIT_PATTERN).unwrap();
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), ["GAM-12", "GAM-3"]);
    }

    #[test]
    fn extract_keys_rejects_bad_pattern() {
        assert!(extract_keys(&["x"], "GAM-(").is_err());
    }

    #[test]
    fn project_regex_skips_other_projects() {
        let re = project_key_re("GAM");
        let found: Vec<&str> = re
            .find_iter("GAM-1, GAMF-2, GAM-11-3")
            .map(|m| m.as_str())
            .collect();
        assert_eq!(found, ["GAM-1", "GAM-11-3"]);
    }
}
