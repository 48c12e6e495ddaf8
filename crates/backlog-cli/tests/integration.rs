#![allow(deprecated)]
use assert_cmd::Command;
use mockito::Matcher;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;

const BACKLOG: &str = "\
# Backlog

## Epic 1: Accounts
**Epic ID**: GAM-1
**Epic Name**: User accounts
**Target Sprint**: Week 1-2

### Story GAM-11: Login API
**Priority**: High
**Sprint**: Week 1
**Tasks**:
- [ ] GAM-11-1: Implement login endpoint
- [x] GAM-11-2: Add JWT issuing

### Story GAM-12: Logout
**Sprint**: Week 2
**Tasks**:
- [ ] GAM-12-1: Revoke token
";

const ENV_VARS: &[&str] = &[
    "JIRA_URL",
    "JIRA_EMAIL",
    "JIRA_API_TOKEN",
    "COMMIT_MESSAGE",
    "COMMIT_MESSAGES",
    "JIRA_ISSUE_PATTERN",
    "GITHUB_TOKEN",
    "GITHUB_REPOSITORY",
    "GITHUB_API_URL",
];

fn backlog(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("backlog").unwrap();
    cmd.current_dir(dir.path()).env("BACKLOG_ROOT", dir.path());
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// `backlog` pointed at a mock Jira with no pause between calls.
fn backlog_jira(dir: &TempDir, server: &mockito::Server) -> Command {
    let mut cmd = backlog(dir);
    cmd.args([
        "--delay-ms",
        "0",
        "--jira-url",
        &server.url(),
        "--jira-email",
        "bot@example.com",
        "--jira-api-token",
        "token",
    ]);
    cmd
}

fn write(dir: &TempDir, rel: &str, text: &str) {
    let path = dir.path().join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

fn read(dir: &TempDir, rel: &str) -> String {
    std::fs::read_to_string(dir.path().join(rel)).unwrap()
}

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(&dir, "docs/jira/JIRA_BACKLOG.md", BACKLOG);
    dir
}

/// An issue as the Jira REST API returns it.
fn issue(key: &str, ty: &str, status: &str, parent: Option<&str>) -> serde_json::Value {
    let mut fields = json!({
        "summary": format!("{key} summary"),
        "issuetype": { "name": ty },
        "status": { "name": status },
    });
    if let Some(p) = parent {
        fields["parent"] = json!({ "key": p });
    }
    json!({ "key": key, "fields": fields })
}

/// One row of the issue cache file.
fn cached(key: &str, ty: &str, status: &str, parent: Option<&str>) -> serde_json::Value {
    json!({
        "key": key,
        "summary": format!("{key} summary"),
        "type": ty,
        "status": status,
        "parent": parent,
    })
}

// ---------------------------------------------------------------------------
// backlog parse
// ---------------------------------------------------------------------------

#[test]
fn parse_prints_counts_and_table() {
    let dir = project();
    backlog(&dir)
        .arg("parse")
        .assert()
        .success()
        .stdout(predicate::str::contains("Epics: 1  Stories: 2  Tasks: 3"))
        .stdout(predicate::str::contains("Login API"))
        .stdout(predicate::str::contains("1/2"));
}

#[test]
fn parse_json_has_structure() {
    let dir = project();
    let output = backlog(&dir).args(["parse", "--json"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["epics"][0]["id"], "GAM-1");
    assert_eq!(value["epics"][0]["stories"][0]["tasks"][1]["done"], true);
}

#[test]
fn parse_missing_backlog_fails() {
    let dir = TempDir::new().unwrap();
    backlog(&dir)
        .arg("parse")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read backlog"));
}

// ---------------------------------------------------------------------------
// backlog map / sync
// ---------------------------------------------------------------------------

#[test]
fn map_tasks_writes_index() {
    let dir = project();
    backlog(&dir)
        .args(["map", "tasks"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 tasks in 2 sections"));

    let index: serde_json::Value =
        serde_json::from_str(&read(&dir, ".github/jira-task-to-epic-mapping.json")).unwrap();
    assert_eq!(index["task_to_epic"]["GAM-12-1"], "GAM-1");
    assert_eq!(index["section_count"], 2);
}

#[test]
fn migrate_keys_rewrites_whole_tokens_only() {
    let dir = project();
    write(
        &dir,
        ".github/backlog-to-jira-mapping.json",
        r#"{"_note": "ignored", "GAM-11": "GAM-211"}"#,
    );
    backlog(&dir)
        .args(["map", "migrate-keys"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rewrote 1 key references"));

    let text = read(&dir, "docs/jira/JIRA_BACKLOG.md");
    assert!(text.contains("### Story GAM-211: Login API"));
    assert!(text.contains("GAM-11-1: Implement login endpoint"));
}

#[test]
fn sync_checkboxes_by_code() {
    let dir = project();
    write(
        &dir,
        "verify.json",
        r#"{"results": [
            {"key": "GAM-11-1", "implemented": true},
            {"key": "GAM-11-2", "implemented": false}
        ]}"#,
    );
    backlog(&dir)
        .args(["sync", "checkboxes", "--by-code", "verify.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("checked 1, unchecked 1, unchanged 1"));

    let text = read(&dir, "docs/jira/JIRA_BACKLOG.md");
    assert!(text.contains("- [x] GAM-11-1: Implement login endpoint"));
    assert!(text.contains("- [ ] GAM-11-2: Add JWT issuing"));
}

#[test]
fn sync_checkboxes_dry_run_leaves_file() {
    let dir = project();
    write(
        &dir,
        ".github/jira-issues.json",
        &json!([cached("GAM-12-1", "Task", "Done", Some("GAM-12"))]).to_string(),
    );
    backlog(&dir)
        .args(["sync", "checkboxes", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run: checked 1"));
    assert_eq!(read(&dir, "docs/jira/JIRA_BACKLOG.md"), BACKLOG);
}

// ---------------------------------------------------------------------------
// backlog import --dry-run / config
// ---------------------------------------------------------------------------

#[test]
fn import_dry_run_skips_mapped() {
    let dir = project();
    write(&dir, ".github/jira-mapping.json", r#"{"GAM-1": "GAM-101"}"#);
    backlog(&dir)
        .args(["import", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("⊘ epic GAM-1: already GAM-101"))
        .stdout(predicate::str::contains("✓ story GAM-11: would create \"Login API\""))
        .stdout(predicate::str::contains("Dry run: 5 succeeded, 1 skipped, 0 failed"));
}

#[test]
fn config_validate_default_is_clean() {
    let dir = TempDir::new().unwrap();
    backlog(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    write(&dir, ".github/backlog.yaml", "project_key: gam\ntimeout_secs: 0\n");
    backlog(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] project_key 'gam'"))
        .stdout(predicate::str::contains("[error] timeout_secs"));
}

#[test]
fn config_init_then_show() {
    let dir = TempDir::new().unwrap();
    backlog(&dir).args(["config", "init"]).assert().success();
    assert!(dir.path().join(".github/backlog.yaml").exists());
    backlog(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("project_key: GAM"))
        .stdout(predicate::str::contains("# jira credentials: missing"));
}

// ---------------------------------------------------------------------------
// backlog issues (offline paths)
// ---------------------------------------------------------------------------

#[test]
fn from_commit_without_messages_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    backlog(&dir)
        .args(["issues", "from-commit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No commit messages"));
}

#[test]
fn from_commit_without_credentials_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    backlog(&dir)
        .args(["issues", "from-commit"])
        .env("COMMIT_MESSAGES", "feat: login gam-11\nfix: GAM-12 logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Jira credentials not set"))
        .stdout(predicate::str::contains("skipping 2 keys"));
}

#[test]
fn transition_needs_keys_or_selection() {
    let dir = TempDir::new().unwrap();
    backlog(&dir)
        .args(["issues", "transition", "--to", "done"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("give issue keys or a selection"));
}

#[test]
fn transition_selection_dry_run_uses_cache() {
    let dir = TempDir::new().unwrap();
    let cache = json!([
        cached("GAM-1", "Epic", "In Progress", None),
        cached("GAM-11", "Story", "To Do", Some("GAM-1")),
        cached("GAM-21", "Task", "To Do", Some("GAM-11")),
        cached("GAM-22", "Task", "Done", Some("GAM-11")),
        cached("GAM-90", "Task", "To Do", None),
    ]);
    write(&dir, ".github/jira-issues.json", &cache.to_string());
    backlog(&dir)
        .args([
            "issues", "transition", "--to", "done", "--under", "GAM-1", "--type", "task",
            "--status-not", "done", "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ GAM-21: would transition to done"))
        .stdout(predicate::str::contains("GAM-22").not())
        .stdout(predicate::str::contains("GAM-90").not());
}

#[test]
fn reparent_dry_run_lists_moves() {
    let dir = TempDir::new().unwrap();
    let cache = json!([
        cached("GAM-1", "Epic", "To Do", None),
        cached("GAM-11", "Story", "To Do", Some("GAM-1")),
        cached("GAM-21", "Task", "To Do", Some("GAM-11")),
    ]);
    write(&dir, ".github/jira-issues.json", &cache.to_string());
    backlog(&dir)
        .args(["issues", "reparent", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("GAM-21: would move GAM-11 → GAM-1"));
}

#[test]
fn transition_rejects_keys_with_selection() {
    let dir = project();
    backlog(&dir)
        .args(["issues", "transition", "--to", "done", "GAM-1", "--under", "GAM-2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn close_epics_falls_back_to_stories_per_epic() {
    let dir = project();
    let text = format!("{BACKLOG}\n## Epic 2: Matching\n**Epic ID**: GAM-2\n\n### Story GAM-21: Match list\n");
    write(&dir, "docs/jira/JIRA_BACKLOG.md", &text);
    write(
        &dir,
        ".github/jira-task-to-epic-mapping.json",
        r#"{"task_to_epic": {"GAM-11-1": "GAM-1"}}"#,
    );
    let cache = json!([
        cached("GAM-1", "Epic", "To Do", None),
        cached("GAM-11-1", "Task", "To Do", Some("GAM-1")),
        cached("GAM-2", "Epic", "To Do", None),
        cached("GAM-21", "Story", "Done", Some("GAM-2")),
    ]);
    write(&dir, ".github/jira-issues.json", &cache.to_string());
    backlog(&dir)
        .args(["issues", "close-epics", "--from-cache", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "2 epics: 0 already done, 1 pending, 1 ready, 0 without children",
        ))
        .stdout(predicate::str::contains("⊘ GAM-1: GAM-11-1 still open"))
        .stdout(predicate::str::contains("✓ GAM-2: would transition to done"));
}

#[test]
fn set_dates_dry_run_spreads_week() {
    let dir = project();
    backlog(&dir)
        .args(["issues", "set-dates", "--start", "2026-01-05", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("epic GAM-1: GAM-1: 2026-01-12 ~ 2026-01-12"))
        .stdout(predicate::str::contains("story GAM-11: GAM-11: 2026-01-05 ~ 2026-01-05"));
}

#[test]
fn report_from_cache_writes_markdown() {
    let dir = TempDir::new().unwrap();
    let cache = json!([
        cached("GAM-1", "Epic", "Done", None),
        cached("GAM-2", "Task", "To Do", None),
        cached("GAM-3", "Task", "Cancelled", None),
    ]);
    write(&dir, ".github/jira-issues.json", &cache.to_string());
    backlog(&dir)
        .args([
            "report", "progress", "--from-cache", "--date", "2026-02-05", "-o",
            "reports/progress.md",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("(2 issues, 50.0% done)"));

    let md = read(&dir, "reports/progress.md");
    assert!(md.contains("**Report date**: 2026-02-05"));
    assert!(md.contains("- **GAM-1** [Epic] GAM-1 summary"));
    assert!(!md.contains("GAM-3"));
}

#[test]
fn report_json_still_writes_output() {
    let dir = TempDir::new().unwrap();
    let cache = json!([cached("GAM-1", "Epic", "Done", None)]);
    write(&dir, ".github/jira-issues.json", &cache.to_string());
    let out = backlog(&dir)
        .args(["--json", "report", "progress", "--from-cache", "-o", "reports/progress.md"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["stats"]["total"], 1);
    assert!(v["path"].as_str().unwrap().ends_with("progress.md"));
    assert!(read(&dir, "reports/progress.md").contains("# Project Progress Report"));
}

// ---------------------------------------------------------------------------
// backlog issues (mock Jira)
// ---------------------------------------------------------------------------

#[test]
fn refresh_writes_cache() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    let search = server
        .mock("POST", "/rest/api/3/search/jql")
        .match_body(Matcher::PartialJson(json!({ "jql": "project = GAM ORDER BY key ASC" })))
        .with_status(200)
        .with_body(
            json!({
                "issues": [issue("GAM-1", "Epic", "To Do", None), issue("GAM-2", "Task", "Done", Some("GAM-1"))],
                "isLast": true
            })
            .to_string(),
        )
        .create();

    backlog_jira(&dir, &server)
        .args(["issues", "refresh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved 2 issues"));
    search.assert();

    let cache: serde_json::Value = serde_json::from_str(&read(&dir, ".github/jira-issues.json")).unwrap();
    assert_eq!(cache[1]["key"], "GAM-2");
    assert_eq!(cache[1]["type"], "Task");
    assert_eq!(cache[1]["parent"], "GAM-1");
}

#[test]
fn transition_keys_against_jira() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/rest/api/3/issue/GAM-5/transitions")
        .with_status(200)
        .with_body(r#"{"transitions":[{"id":"11","name":"In Progress"},{"id":"31","name":"Done"}]}"#)
        .create();
    let apply = server
        .mock("POST", "/rest/api/3/issue/GAM-5/transitions")
        .match_body(Matcher::Json(json!({ "transition": { "id": "31" } })))
        .with_status(204)
        .create();
    server
        .mock("GET", "/rest/api/3/issue/GAM-6/transitions")
        .with_status(404)
        .with_body(r#"{"errorMessages":["Issue does not exist"]}"#)
        .create();

    backlog_jira(&dir, &server)
        .args(["issues", "transition", "--to", "done", "GAM-5", "GAM-6"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ GAM-5: → Done"))
        .stdout(predicate::str::contains("✗ GAM-6"))
        .stdout(predicate::str::contains("1 succeeded, 0 skipped, 1 failed"));
    apply.assert();
}

#[test]
fn close_unmapped_requires_yes() {
    let dir = project();
    write(&dir, ".github/jira-mapping.json", r#"{"GAM-1": "GAM-1"}"#);
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/rest/api/3/search/jql")
        .with_status(200)
        .with_body(
            json!({
                "issues": [
                    issue("GAM-1", "Epic", "To Do", None),
                    issue("GAM-77", "Task", "To Do", None),
                    issue("GAM-78", "Task", "Done", None)
                ],
                "isLast": true
            })
            .to_string(),
        )
        .create();

    backlog_jira(&dir, &server)
        .args(["issues", "close-unmapped"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("refusing to cancel 1 issues without --yes"));

    backlog_jira(&dir, &server)
        .args(["issues", "close-unmapped", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ GAM-77: would cancel"));
}

#[test]
fn mismatches_written_to_file() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        ".github/code-completion-verification.json",
        r#"{"tasks_completed": [
            {"key": "GAM-21", "description": "Login endpoint", "files": ["Auth.kt"]},
            {"key": "GAM-22", "description": "Logout", "files": []}
        ]}"#,
    );
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/rest/api/3/issue/GAM-21")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(issue("GAM-21", "Task", "해야 할 일", None).to_string())
        .create();
    server
        .mock("GET", "/rest/api/3/issue/GAM-22")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(issue("GAM-22", "Task", "완료", None).to_string())
        .create();

    backlog_jira(&dir, &server)
        .args(["issues", "mismatches"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 mismatches written"));

    let found: serde_json::Value =
        serde_json::from_str(&read(&dir, ".github/jira-mismatch-issues.json")).unwrap();
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["key"], "GAM-21");
    assert_eq!(found[0]["jira_status"], "해야 할 일");
}

// ---------------------------------------------------------------------------
// backlog github
// ---------------------------------------------------------------------------

#[test]
fn dedupe_reports_closes_older_duplicates() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/repos/acme/app/issues")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"[
                {"number": 1, "title": "Weekly report", "updated_at": "2026-02-01T00:00:00Z"},
                {"number": 2, "title": "Weekly report ", "updated_at": "2026-02-08T00:00:00Z"},
                {"number": 3, "title": "Other", "updated_at": "2026-02-08T00:00:00Z"}
            ]"#,
        )
        .create();
    let close = server
        .mock("PATCH", "/repos/acme/app/issues/1")
        .match_body(Matcher::Json(json!({ "state": "closed" })))
        .with_status(200)
        .with_body("{}")
        .create();

    backlog(&dir)
        .args(["--delay-ms", "0", "github", "dedupe-reports", "--repo", "acme/app", "--token", "t"])
        .args(["--api-url", &server.url()])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ #1: closed, kept #2"));
    close.assert();
}
