use crate::error::{BacklogError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// IssueTypeIds
// ---------------------------------------------------------------------------

/// Issue type ids used when creating issues. Team-managed projects reject
/// type names, so ids are configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueTypeIds {
    #[serde(default = "default_epic_type")]
    pub epic: String,
    #[serde(default = "default_story_type")]
    pub story: String,
    #[serde(default = "default_task_type")]
    pub task: String,
}

fn default_epic_type() -> String {
    "10079".to_string()
}

fn default_story_type() -> String {
    "10078".to_string()
}

fn default_task_type() -> String {
    "10076".to_string()
}

impl Default for IssueTypeIds {
    fn default() -> Self {
        Self {
            epic: default_epic_type(),
            story: default_story_type(),
            task: default_task_type(),
        }
    }
}

// ---------------------------------------------------------------------------
// FieldConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Custom fields tried, in order, when linking a child to an epic.
    #[serde(default = "default_epic_link_fields")]
    pub epic_link: Vec<String>,
    /// Custom fields that hold story points; the first one is written.
    #[serde(default = "default_story_point_fields")]
    pub story_points: Vec<String>,
    /// Optional custom field for the start date when scheduling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
}

fn default_epic_link_fields() -> Vec<String> {
    vec![
        "customfield_10011".to_string(),
        "customfield_10014".to_string(),
        "customfield_10015".to_string(),
    ]
}

fn default_story_point_fields() -> Vec<String> {
    vec![
        "customfield_10016".to_string(),
        "customfield_10021".to_string(),
    ]
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            epic_link: default_epic_link_fields(),
            story_points: default_story_point_fields(),
            start_date: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AssigneeConfig / ReportConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssigneeConfig {
    /// Email looked up for "Backend" assignees. Falls back to the Jira login email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_email: Option<String>,
    /// Account id used for "Frontend" assignees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_account_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default = "default_web_url")]
    pub web_url: String,
}

fn default_project_name() -> String {
    "Go Almond Matching".to_string()
}

fn default_web_url() -> String {
    "https://go-almond.ddnsfree.com/".to_string()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            web_url: default_web_url(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_project_key")]
    pub project_key: String,
    #[serde(default)]
    pub issue_types: IssueTypeIds,
    #[serde(default)]
    pub fields: FieldConfig,
    #[serde(default)]
    pub assignees: AssigneeConfig,
    #[serde(default)]
    pub report: ReportConfig,
    /// Fixed pause between sequential API calls.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_backlog_file")]
    pub backlog_file: PathBuf,
    #[serde(default = "default_mapping_file")]
    pub mapping_file: PathBuf,
    #[serde(default = "default_issue_cache")]
    pub issue_cache: PathBuf,
}

fn default_project_key() -> String {
    "GAM".to_string()
}

fn default_request_delay_ms() -> u64 {
    300
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_backlog_file() -> PathBuf {
    PathBuf::from(paths::BACKLOG_FILE)
}

fn default_mapping_file() -> PathBuf {
    PathBuf::from(paths::MAPPING_FILE)
}

fn default_issue_cache() -> PathBuf {
    PathBuf::from(paths::ISSUE_CACHE_FILE)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_key: default_project_key(),
            issue_types: IssueTypeIds::default(),
            fields: FieldConfig::default(),
            assignees: AssigneeConfig::default(),
            report: ReportConfig::default(),
            request_delay_ms: default_request_delay_ms(),
            timeout_secs: default_timeout_secs(),
            backlog_file: default_backlog_file(),
            mapping_file: default_mapping_file(),
            issue_cache: default_issue_cache(),
        }
    }
}

impl Config {
    /// Load `.github/backlog.yaml`; a missing file yields the defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.project_key.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "project_key is empty".to_string(),
            });
        } else if !self
            .project_key
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "project_key '{}' must be upper-case letters and digits",
                    self.project_key
                ),
            });
        }

        for (name, id) in [
            ("epic", &self.issue_types.epic),
            ("story", &self.issue_types.story),
            ("task", &self.issue_types.task),
        ] {
            if id.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("issue_types.{name} is empty"),
                });
            }
        }

        if self.fields.epic_link.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "fields.epic_link is empty; epic links fall back to issue links only"
                    .to_string(),
            });
        }

        if !self.report.web_url.starts_with("http://") && !self.report.web_url.starts_with("https://")
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!("report.web_url '{}' is not an http(s) URL", self.report.web_url),
            });
        }

        if self.request_delay_ms > 10_000 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "request_delay_ms={} (>10s between calls is unusual)",
                    self.request_delay_ms
                ),
            });
        }

        if self.timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "timeout_secs must be greater than zero".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Load `docs/jira/jira.env` then `jira.env` under `root`. Variables already
/// present in the environment are left untouched.
pub fn load_env_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut loaded = Vec::new();
    for path in paths::env_files(root) {
        if path.exists() {
            dotenvy::from_path(&path)?;
            tracing::debug!(path = %path.display(), "loaded env file");
            loaded.push(path);
        }
    }
    Ok(loaded)
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Jira Cloud basic-auth credentials.
#[derive(Clone)]
pub struct JiraCredentials {
    pub url: String,
    pub email: String,
    pub api_token: String,
}

impl std::fmt::Debug for JiraCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JiraCredentials")
            .field("url", &self.url)
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

impl JiraCredentials {
    /// Explicit values win; otherwise `JIRA_URL`, `JIRA_EMAIL`, `JIRA_API_TOKEN`.
    pub fn resolve(
        url: Option<String>,
        email: Option<String>,
        api_token: Option<String>,
    ) -> Result<Self> {
        let url = url.or_else(|| env_nonempty("JIRA_URL"));
        let email = email.or_else(|| env_nonempty("JIRA_EMAIL"));
        let api_token = api_token.or_else(|| env_nonempty("JIRA_API_TOKEN"));

        let missing: Vec<&str> = [
            ("JIRA_URL", url.is_none()),
            ("JIRA_EMAIL", email.is_none()),
            ("JIRA_API_TOKEN", api_token.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        match (url, email, api_token) {
            (Some(url), Some(email), Some(api_token)) => Ok(Self {
                url: url.trim_end_matches('/').to_string(),
                email,
                api_token,
            }),
            _ => Err(BacklogError::MissingCredentials(missing.join(", "))),
        }
    }
}

/// GitHub token plus `owner/repo`.
#[derive(Clone)]
pub struct GithubCredentials {
    pub token: String,
    pub repo: String,
}

impl GithubCredentials {
    /// Explicit values win; otherwise `GITHUB_TOKEN` and `GITHUB_REPOSITORY`.
    pub fn resolve(token: Option<String>, repo: Option<String>) -> Result<Self> {
        let token = token.or_else(|| env_nonempty("GITHUB_TOKEN"));
        let repo = repo.or_else(|| env_nonempty("GITHUB_REPOSITORY"));
        match (token, repo) {
            (Some(token), Some(repo)) => Ok(Self { token, repo }),
            (None, _) => Err(BacklogError::MissingCredentials("GITHUB_TOKEN".to_string())),
            (_, None) => Err(BacklogError::MissingCredentials(
                "GITHUB_REPOSITORY".to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
