//! Blocking Jira Cloud REST v3 client.
//!
//! Every request after the first waits the configured delay, so sequential
//! callers never need their own sleeps.

use crate::config::JiraCredentials;
use crate::error::{BacklogError, Result};
use crate::issue::{ApiIssue, IssueRecord, Named};
use crate::types::TransitionTarget;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cell::Cell;
use std::time::Duration;

const PAGE_SIZE: u32 = 100;
const BODY_EXCERPT: usize = 300;

/// Fields requested for cache records.
pub const RECORD_FIELDS: &[&str] = &["summary", "issuetype", "status", "parent", "duedate"];

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: String,
    pub name: String,
}

#[derive(Deserialize)]
struct TransitionList {
    #[serde(default)]
    transitions: Vec<Transition>,
}

#[derive(Deserialize)]
struct SearchPage {
    #[serde(default)]
    issues: Vec<ApiIssue>,
    #[serde(default, rename = "nextPageToken")]
    next_page_token: Option<String>,
    #[serde(default, rename = "isLast")]
    is_last: Option<bool>,
}

#[derive(Deserialize)]
struct LinkTypeList {
    #[serde(default, rename = "issueLinkTypes")]
    issue_link_types: Vec<Named>,
}

#[derive(Deserialize)]
struct Created {
    key: String,
}

#[derive(Deserialize)]
struct User {
    #[serde(rename = "accountId")]
    account_id: Option<String>,
}

/// Atlassian document format: one paragraph per non-empty line.
pub fn adf_document(text: &str) -> Value {
    let content: Vec<Value> = text
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .map(|l| json!({ "type": "paragraph", "content": [{ "type": "text", "text": l }] }))
        .collect();
    json!({ "type": "doc", "version": 1, "content": content })
}

/// First transition whose name contains one of the target's keywords; else
/// the first available one. The flag is false for the fallback.
pub fn choose_transition(
    transitions: &[Transition],
    target: TransitionTarget,
) -> Option<(&Transition, bool)> {
    let keywords = target.keywords();
    transitions
        .iter()
        .find(|t| {
            let name = t.name.to_lowercase();
            keywords.iter().any(|k| name.contains(k))
        })
        .map(|t| (t, true))
        .or_else(|| transitions.first().map(|t| (t, false)))
}

// ---------------------------------------------------------------------------
// JiraClient
// ---------------------------------------------------------------------------

pub struct JiraClient {
    base_url: String,
    email: String,
    api_token: String,
    client: Client,
    delay: Duration,
    sent: Cell<bool>,
}

impl JiraClient {
    pub fn new(creds: &JiraCredentials, timeout: Duration, delay: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: creds.url.trim_end_matches('/').to_string(),
            email: creds.email.clone(),
            api_token: creds.api_token.clone(),
            client,
            delay,
            sent: Cell::new(false),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Browser URL for an issue.
    pub fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{key}", self.base_url)
    }

    fn pause(&self) {
        if self.sent.replace(true) && !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.pause();
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .basic_auth(&self.email, Some(&self.api_token))
            .header("Accept", "application/json")
    }

    fn check(method: &Method, resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let url = resp.url().to_string();
        let body: String = resp
            .text()
            .unwrap_or_default()
            .chars()
            .take(BODY_EXCERPT)
            .collect();
        Err(BacklogError::Http {
            method: method.to_string(),
            url,
            status: status.as_u16(),
            body,
        })
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let resp = self.request(Method::GET, path).query(query).send()?;
        Ok(Self::check(&Method::GET, resp)?.json()?)
    }

    fn send_json(&self, method: Method, path: &str, body: &Value) -> Result<Response> {
        let resp = self.request(method.clone(), path).json(body).send()?;
        Self::check(&method, resp)
    }

    // -- Reading ------------------------------------------------------------

    /// Page through `POST /search/jql`. Hits that come back without a key
    /// are fetched one by one.
    pub fn search(&self, jql: &str, fields: &[&str]) -> Result<Vec<IssueRecord>> {
        let mut out = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut body = json!({
                "jql": jql,
                "maxResults": PAGE_SIZE,
                "fields": fields,
            });
            if let Some(t) = &token {
                body["nextPageToken"] = json!(t);
            }
            let page: SearchPage = self
                .send_json(Method::POST, "/rest/api/3/search/jql", &body)?
                .json()?;
            if page.issues.is_empty() {
                break;
            }
            for hit in page.issues {
                match (hit.key.is_some(), hit.id.clone()) {
                    (true, _) => out.extend(hit.into_record()),
                    (false, Some(id)) => out.push(self.get_issue(&id, fields)?),
                    (false, None) => {
                        tracing::warn!("search hit without key or id; skipped");
                    }
                }
            }
            tracing::debug!(fetched = out.len(), "search page");
            match page.next_page_token {
                Some(next) if page.is_last != Some(true) => token = Some(next),
                _ => break,
            }
        }
        Ok(out)
    }

    /// Every issue of a project, ordered by key.
    pub fn project_issues(&self, project_key: &str) -> Result<Vec<IssueRecord>> {
        self.search(
            &format!("project = {project_key} ORDER BY key ASC"),
            RECORD_FIELDS,
        )
    }

    pub fn get_issue(&self, key_or_id: &str, fields: &[&str]) -> Result<IssueRecord> {
        let issue: ApiIssue = self.get_json(
            &format!("/rest/api/3/issue/{key_or_id}"),
            &[("fields", fields.join(","))],
        )?;
        issue
            .into_record()
            .ok_or_else(|| BacklogError::MalformedResponse(format!("issue {key_or_id} has no key")))
    }

    pub fn transitions(&self, key: &str) -> Result<Vec<Transition>> {
        let list: TransitionList =
            self.get_json(&format!("/rest/api/3/issue/{key}/transitions"), &[])?;
        Ok(list.transitions)
    }

    pub fn link_types(&self) -> Result<Vec<String>> {
        let list: LinkTypeList = self.get_json("/rest/api/3/issueLinkType", &[])?;
        Ok(list
            .issue_link_types
            .into_iter()
            .map(|t| t.name)
            .filter(|n| !n.is_empty())
            .collect())
    }

    /// Account id of the first user matching `query` (usually an email).
    pub fn find_user(&self, query: &str) -> Result<Option<String>> {
        let users: Vec<User> =
            self.get_json("/rest/api/3/user/search", &[("query", query.to_string())])?;
        Ok(users.into_iter().find_map(|u| u.account_id))
    }

    // -- Writing ------------------------------------------------------------

    /// Create an issue from a `fields` object; returns the new key.
    pub fn create_issue(&self, fields: Value) -> Result<String> {
        let created: Created = self
            .send_json(Method::POST, "/rest/api/3/issue", &json!({ "fields": fields }))?
            .json()?;
        Ok(created.key)
    }

    pub fn update_fields(&self, key: &str, fields: Value) -> Result<()> {
        self.send_json(
            Method::PUT,
            &format!("/rest/api/3/issue/{key}"),
            &json!({ "fields": fields }),
        )?;
        Ok(())
    }

    pub fn set_parent(&self, key: &str, parent: &str) -> Result<()> {
        self.update_fields(key, json!({ "parent": { "key": parent } }))
    }

    pub fn transition(&self, key: &str, transition_id: &str) -> Result<()> {
        self.send_json(
            Method::POST,
            &format!("/rest/api/3/issue/{key}/transitions"),
            &json!({ "transition": { "id": transition_id } }),
        )?;
        Ok(())
    }

    /// Pick a transition for `target` and apply it. Returns the transition used.
    pub fn transition_to(&self, key: &str, target: TransitionTarget) -> Result<Transition> {
        let available = self.transitions(key)?;
        let Some((chosen, matched)) = choose_transition(&available, target) else {
            return Err(BacklogError::NoTransition {
                key: key.to_string(),
                target: target.to_string(),
            });
        };
        if !matched {
            tracing::warn!(
                key,
                target = %target,
                transition = %chosen.name,
                "no matching transition; using first available"
            );
        }
        self.transition(key, &chosen.id)?;
        Ok(chosen.clone())
    }

    pub fn create_link(&self, link_type: &str, inward: &str, outward: &str) -> Result<()> {
        self.send_json(
            Method::POST,
            "/rest/api/3/issueLink",
            &json!({
                "type": { "name": link_type },
                "inwardIssue": { "key": inward },
                "outwardIssue": { "key": outward },
            }),
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
