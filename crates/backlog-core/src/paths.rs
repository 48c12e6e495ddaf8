use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Repository-relative defaults
// ---------------------------------------------------------------------------

pub const BACKLOG_FILE: &str = "docs/jira/JIRA_BACKLOG.md";
pub const CONFIG_FILE: &str = ".github/backlog.yaml";
pub const MAPPING_FILE: &str = ".github/jira-mapping.json";
pub const ISSUE_CACHE_FILE: &str = ".github/jira-issues.json";
pub const TASK_EPIC_FILE: &str = ".github/jira-task-to-epic-mapping.json";
pub const ANALYSIS_FILE: &str = ".github/jira-to-backlog-mapping.json";
pub const ANALYSIS_REPORT: &str = "reports/jira-mapping-analysis.md";
pub const VERIFICATION_FILE: &str = ".github/code-completion-verification.json";
pub const MISMATCH_FILE: &str = ".github/jira-mismatch-issues.json";
pub const KEY_MIGRATION_FILE: &str = ".github/backlog-to-jira-mapping.json";

/// Env files consulted for credentials, in order.
pub const ENV_FILES: &[&str] = &["docs/jira/jira.env", "jira.env"];

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Join `rel` onto `root` unless it is already absolute.
pub fn resolve(root: &Path, rel: impl AsRef<Path>) -> PathBuf {
    let rel = rel.as_ref();
    if rel.is_absolute() {
        rel.to_path_buf()
    } else {
        root.join(rel)
    }
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn env_files(root: &Path) -> Vec<PathBuf> {
    ENV_FILES.iter().map(|f| root.join(f)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_keeps_absolute() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            resolve(root, "/etc/backlog.md"),
            PathBuf::from("/etc/backlog.md")
        );
        assert_eq!(
            resolve(root, MAPPING_FILE),
            PathBuf::from("/tmp/proj/.github/jira-mapping.json")
        );
    }

    #[test]
    fn env_files_in_priority_order() {
        let files = env_files(Path::new("/r"));
        assert_eq!(files[0], PathBuf::from("/r/docs/jira/jira.env"));
        assert_eq!(files[1], PathBuf::from("/r/jira.env"));
    }
}
