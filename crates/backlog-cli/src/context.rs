use anyhow::Context as _;
use backlog_core::backlog::Backlog;
use backlog_core::config::{self, Config, GithubCredentials, JiraCredentials};
use backlog_core::github::GithubClient;
use backlog_core::issue::IssueCache;
use backlog_core::jira::JiraClient;
use backlog_core::mapping::MappingFile;
use backlog_core::paths;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Credential flags from the command line; unset ones fall back to env.
#[derive(Default)]
pub struct JiraArgs {
    pub url: Option<String>,
    pub email: Option<String>,
    pub api_token: Option<String>,
}

/// Everything a command needs: root, config and how to reach the APIs.
pub struct Context {
    pub root: PathBuf,
    pub config: Config,
    pub json: bool,
    delay_ms: Option<u64>,
    jira: JiraArgs,
}

impl Context {
    /// Load env files under `root` (existing variables win), then the config.
    pub fn load(root: PathBuf, json: bool, delay_ms: Option<u64>, jira: JiraArgs) -> anyhow::Result<Self> {
        config::load_env_files(&root).context("failed to load env file")?;
        let config = Config::load(&root).context("failed to load .github/backlog.yaml")?;
        Ok(Self {
            root,
            config,
            json,
            delay_ms,
            jira,
        })
    }

    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        paths::resolve(&self.root, rel)
    }

    pub fn backlog_path(&self, file: Option<&Path>) -> PathBuf {
        self.path(file.unwrap_or(&self.config.backlog_file))
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.path(&self.config.mapping_file)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.path(&self.config.issue_cache)
    }

    pub fn project_key(&self) -> &str {
        &self.config.project_key
    }

    pub fn delay(&self) -> Duration {
        self.delay_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.request_delay())
    }

    pub fn load_backlog(&self, file: Option<&Path>) -> anyhow::Result<(PathBuf, Backlog)> {
        let path = self.backlog_path(file);
        let backlog = Backlog::load(&path)
            .with_context(|| format!("failed to read backlog {}", path.display()))?;
        Ok((path, backlog))
    }

    pub fn load_mapping(&self) -> anyhow::Result<MappingFile> {
        let path = self.mapping_path();
        MappingFile::load(&path).with_context(|| format!("failed to read mapping {}", path.display()))
    }

    pub fn load_cache(&self) -> anyhow::Result<IssueCache> {
        let path = self.cache_path();
        IssueCache::load(&path).with_context(|| {
            format!(
                "failed to read issue cache {} (run `backlog issues refresh` first)",
                path.display()
            )
        })
    }

    pub fn jira_credentials(&self) -> backlog_core::Result<JiraCredentials> {
        JiraCredentials::resolve(
            self.jira.url.clone(),
            self.jira.email.clone(),
            self.jira.api_token.clone(),
        )
    }

    pub fn jira_with(&self, creds: &JiraCredentials) -> anyhow::Result<JiraClient> {
        JiraClient::new(creds, self.config.timeout(), self.delay()).context("failed to build Jira client")
    }

    pub fn jira(&self) -> anyhow::Result<JiraClient> {
        let creds = self.jira_credentials().context("Jira credentials")?;
        self.jira_with(&creds)
    }

    pub fn github(
        &self,
        token: Option<String>,
        repo: Option<String>,
        api_url: Option<String>,
    ) -> anyhow::Result<GithubClient> {
        let creds = GithubCredentials::resolve(token, repo).context("GitHub credentials")?;
        let client = GithubClient::new(&creds, self.config.timeout(), self.delay())
            .context("failed to build GitHub client")?;
        Ok(match api_url {
            Some(url) => client.with_api_url(url),
            None => client,
        })
    }
}
