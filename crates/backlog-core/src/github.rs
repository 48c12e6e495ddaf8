use crate::config::GithubCredentials;
use crate::error::{BacklogError, Result};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const REPORT_LABEL: &str = "report";
const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubIssue {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Duplicate issues sharing one title: keep the newest, close the rest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub title: String,
    pub keep: GithubIssue,
    pub close: Vec<GithubIssue>,
}

/// Group issues by trimmed title. Groups of one are not duplicates; empty
/// titles are ignored. `updated_at` is ISO-8601 so string order is time order.
pub fn dedupe_plan(issues: &[GithubIssue]) -> Vec<DuplicateGroup> {
    let mut by_title: BTreeMap<&str, Vec<&GithubIssue>> = BTreeMap::new();
    for issue in issues {
        let title = issue.title.trim();
        if !title.is_empty() {
            by_title.entry(title).or_default().push(issue);
        }
    }
    by_title
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .map(|(title, mut group)| {
            group.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            let keep = group[0].clone();
            let close = group[1..].iter().map(|i| (*i).clone()).collect();
            DuplicateGroup {
                title: title.to_string(),
                keep,
                close,
            }
        })
        .collect()
}

pub struct GithubClient {
    api_url: String,
    repo: String,
    token: String,
    client: Client,
    delay: Duration,
}

impl GithubClient {
    pub fn new(creds: &GithubCredentials, timeout: Duration, delay: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("backlog/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            api_url: DEFAULT_API_URL.to_string(),
            repo: creds.repo.clone(),
            token: creds.token.clone(),
            client,
            delay,
        })
    }

    /// Point the client at another API root (GitHub Enterprise, tests).
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/repos/{}{path}", self.api_url, self.repo))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
    }

    /// Open issues carrying `label`, all pages.
    pub fn open_issues(&self, label: &str) -> Result<Vec<GithubIssue>> {
        let mut out = Vec::new();
        let mut page = 1usize;
        loop {
            if page > 1 && !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            let resp = self
                .request(Method::GET, "/issues")
                .query(&[
                    ("labels", label.to_string()),
                    ("state", "open".to_string()),
                    ("per_page", PAGE_SIZE.to_string()),
                    ("page", page.to_string()),
                ])
                .send()?;
            let status = resp.status();
            if !status.is_success() {
                return Err(BacklogError::Http {
                    method: "GET".to_string(),
                    url: resp.url().to_string(),
                    status: status.as_u16(),
                    body: resp.text().unwrap_or_default(),
                });
            }
            let batch: Vec<GithubIssue> = resp.json()?;
            let n = batch.len();
            out.extend(batch);
            if n < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(out)
    }

    pub fn close_issue(&self, number: u64) -> Result<()> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let resp = self
            .request(Method::PATCH, &format!("/issues/{number}"))
            .json(&json!({ "state": "closed" }))
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BacklogError::Http {
                method: "PATCH".to_string(),
                url: resp.url().to_string(),
                status: status.as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn issue(number: u64, title: &str, updated_at: &str) -> GithubIssue {
        GithubIssue {
            number,
            title: title.to_string(),
            updated_at: updated_at.to_string(),
        }
    }

    #[test]
    fn plan_keeps_most_recent_per_title() {
        let issues = [
            issue(1, "Progress report", "2026-01-01T00:00:00Z"),
            issue(2, " Progress report ", "2026-01-03T00:00:00Z"),
            issue(3, "Progress report", "2026-01-02T00:00:00Z"),
            issue(4, "Weekly", "2026-01-02T00:00:00Z"),
            issue(5, "", "2026-01-02T00:00:00Z"),
            issue(6, "  ", "2026-01-02T00:00:00Z"),
        ];
        let plan = dedupe_plan(&issues);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].title, "Progress report");
        assert_eq!(plan[0].keep.number, 2);
        let closing: Vec<u64> = plan[0].close.iter().map(|i| i.number).collect();
        assert_eq!(closing, [3, 1]);
    }

    #[test]
    fn lists_pages_and_closes() {
        let mut server = mockito::Server::new();
        let list = server
            .mock("GET", "/repos/acme/app/issues")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("labels".into(), "report".into()),
                Matcher::UrlEncoded("state".into(), "open".into()),
                Matcher::UrlEncoded("page".into(), "1".into()),
            ]))
            .match_header("authorization", "token t0k")
            .with_status(200)
            .with_body(
                serde_json::to_string(&[issue(7, "Report", "2026-01-01T00:00:00Z")]).unwrap(),
            )
            .create();
        let close = server
            .mock("PATCH", "/repos/acme/app/issues/7")
            .match_body(Matcher::Json(json!({ "state": "closed" })))
            .with_status(200)
            .with_body("{}")
            .create();

        let creds = GithubCredentials {
            token: "t0k".to_string(),
            repo: "acme/app".to_string(),
        };
        let client = GithubClient::new(&creds, Duration::from_secs(5), Duration::ZERO)
            .unwrap()
            .with_api_url(server.url());
        let issues = client.open_issues(REPORT_LABEL).unwrap();
        assert_eq!(issues.len(), 1);
        client.close_issue(7).unwrap();
        list.assert();
        close.assert();
    }
}
