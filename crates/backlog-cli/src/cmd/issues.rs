use crate::context::Context;
use crate::output::{print_json, print_table, Tally};
use anyhow::Context as _;
use backlog_core::backlog::TaskEpicIndex;
use backlog_core::error::BacklogError;
use backlog_core::io;
use backlog_core::issue::IssueCache;
use backlog_core::jira::{JiraClient, RECORD_FIELDS};
use backlog_core::keys;
use backlog_core::linker::{LinkMethod, Linker};
use backlog_core::mapping::MappingFile;
use backlog_core::paths;
use backlog_core::reconcile::{self, MappingAnalysis, Selection};
use backlog_core::schedule::{self, DatedItem};
use backlog_core::types::{IssueKind, StatusCategory, TransitionTarget};
use backlog_core::verification::CompletionEvidence;
use chrono::NaiveDate;
use clap::Subcommand;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum IssuesSubcommand {
    /// Fetch every project issue into the issue cache
    Refresh {
        /// JQL to run instead of the whole project
        #[arg(long)]
        jql: Option<String>,
    },

    /// Transition listed keys, or cache issues matching a selection
    Transition {
        /// Target state: done, todo or cancel
        #[arg(long = "to", value_name = "TARGET")]
        target: TransitionTarget,
        /// Issue keys; cannot be combined with the selection flags
        #[arg(conflicts_with_all = ["under", "except_under", "kind", "status_not"])]
        keys: Vec<String>,
        /// Only issues under these roots (roots included)
        #[arg(long, value_name = "KEY")]
        under: Vec<String>,
        /// Drop issues under these roots (roots included)
        #[arg(long, value_name = "KEY")]
        except_under: Vec<String>,
        /// Only this issue type: epic, story, task, subtask
        #[arg(long = "type", value_name = "TYPE")]
        kind: Option<IssueKind>,
        /// Drop issues already in this category: todo, in_progress, done, cancelled
        #[arg(long, value_name = "CATEGORY")]
        status_not: Option<StatusCategory>,
        #[arg(long)]
        dry_run: bool,
    },

    /// Move issues named in commit messages to done
    FromCommit {
        /// Commit message (default: COMMIT_MESSAGE, then COMMIT_MESSAGES)
        #[arg(long)]
        message: Vec<String>,
        /// Key pattern (case-insensitive)
        #[arg(long, env = "JIRA_ISSUE_PATTERN", default_value = keys::DEFAULT_COMMIT_PATTERN)]
        pattern: String,
        #[arg(long)]
        dry_run: bool,
    },

    /// Cancel open issues that neither the mapping nor the backlog mentions
    CloseUnmapped {
        #[arg(long)]
        file: Option<PathBuf>,
        /// Confirm the cancellations
        #[arg(long)]
        yes: bool,
        #[arg(long)]
        dry_run: bool,
    },

    /// Close epics whose children are all done
    CloseEpics {
        #[arg(long)]
        file: Option<PathBuf>,
        /// Read statuses from the issue cache instead of the API
        #[arg(long)]
        from_cache: bool,
        #[arg(long)]
        dry_run: bool,
    },

    /// Move tasks from under a story to the story's epic
    Reparent {
        #[arg(long)]
        dry_run: bool,
    },

    /// Link each epic's stories (and optionally tasks) under it
    Link {
        #[arg(long)]
        file: Option<PathBuf>,
        /// Only this epic (backlog id or tracker key)
        #[arg(long)]
        epic: Option<String>,
        /// Also link tasks to their stories
        #[arg(long)]
        tasks: bool,
        #[arg(long)]
        dry_run: bool,
    },

    /// Set due dates from the backlog's sprint text
    SetDates {
        #[arg(long)]
        file: Option<PathBuf>,
        /// First day of week 1 (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        start: NaiveDate,
        /// Leave issues that already have a due date alone
        #[arg(long)]
        skip_if_set: bool,
        #[arg(long)]
        dry_run: bool,
    },

    /// Replace key-only summaries using the mapping analysis
    FixSummaries {
        #[arg(long)]
        analysis: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },

    /// Re-parent issues to the epic the mapping analysis expects
    FixEpics {
        #[arg(long)]
        analysis: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },

    /// Find verified-complete work still open in the tracker
    Mismatches {
        #[arg(long)]
        verification: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Transition every mismatch to done
        #[arg(long)]
        complete: bool,
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    schedule::parse_date(s).map_err(|e| e.to_string())
}

impl IssuesSubcommand {
    pub fn mutates_remote(&self) -> bool {
        match self {
            IssuesSubcommand::Refresh { .. } => false,
            IssuesSubcommand::Transition { dry_run, .. }
            | IssuesSubcommand::FromCommit { dry_run, .. }
            | IssuesSubcommand::CloseUnmapped { dry_run, .. }
            | IssuesSubcommand::CloseEpics { dry_run, .. }
            | IssuesSubcommand::Reparent { dry_run }
            | IssuesSubcommand::Link { dry_run, .. }
            | IssuesSubcommand::SetDates { dry_run, .. }
            | IssuesSubcommand::FixSummaries { dry_run, .. }
            | IssuesSubcommand::FixEpics { dry_run, .. } => !dry_run,
            IssuesSubcommand::Mismatches {
                complete, dry_run, ..
            } => *complete && !dry_run,
        }
    }
}

pub fn run(ctx: &Context, subcmd: IssuesSubcommand) -> anyhow::Result<()> {
    match subcmd {
        IssuesSubcommand::Refresh { jql } => refresh(ctx, jql.as_deref()),
        IssuesSubcommand::Transition {
            target,
            keys,
            under,
            except_under,
            kind,
            status_not,
            dry_run,
        } => {
            let sel = Selection {
                under,
                except_under,
                kind,
                status_not,
            };
            transition(ctx, target, &keys, &sel, dry_run)
        }
        IssuesSubcommand::FromCommit {
            message,
            pattern,
            dry_run,
        } => from_commit(ctx, message, &pattern, dry_run),
        IssuesSubcommand::CloseUnmapped { file, yes, dry_run } => {
            close_unmapped(ctx, file.as_deref(), yes, dry_run)
        }
        IssuesSubcommand::CloseEpics {
            file,
            from_cache,
            dry_run,
        } => close_epics(ctx, file.as_deref(), from_cache, dry_run),
        IssuesSubcommand::Reparent { dry_run } => reparent(ctx, dry_run),
        IssuesSubcommand::Link {
            file,
            epic,
            tasks,
            dry_run,
        } => link(ctx, file.as_deref(), epic.as_deref(), tasks, dry_run),
        IssuesSubcommand::SetDates {
            file,
            start,
            skip_if_set,
            dry_run,
        } => set_dates(ctx, file.as_deref(), start, skip_if_set, dry_run),
        IssuesSubcommand::FixSummaries { analysis, dry_run } => {
            fix_summaries(ctx, analysis.as_deref(), dry_run)
        }
        IssuesSubcommand::FixEpics { analysis, dry_run } => {
            fix_epics(ctx, analysis.as_deref(), dry_run)
        }
        IssuesSubcommand::Mismatches {
            verification,
            output,
            complete,
            dry_run,
        } => mismatches(
            ctx,
            verification.as_deref(),
            output.as_deref(),
            complete,
            dry_run,
        ),
    }
}

/// Transition each key, or just report the plan on a dry run.
fn apply_transitions<'a>(
    client: Option<&JiraClient>,
    keys: impl IntoIterator<Item = &'a str>,
    target: TransitionTarget,
    tally: &mut Tally,
) {
    for key in keys {
        match client {
            None => tally.ok(key, format!("would transition to {target}")),
            Some(client) => match client.transition_to(key, target) {
                Ok(t) => tally.ok(key, format!("→ {}", t.name)),
                Err(e) => tally.fail(key, e.to_string()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// refresh
// ---------------------------------------------------------------------------

fn refresh(ctx: &Context, jql: Option<&str>) -> anyhow::Result<()> {
    let client = ctx.jira()?;
    let issues = match jql {
        Some(jql) => client.search(jql, RECORD_FIELDS),
        None => client.project_issues(ctx.project_key()),
    }
    .context("failed to fetch issues")?;

    let cache = IssueCache::new(issues);
    let path = ctx.cache_path();
    cache
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(count = cache.len(), path = %path.display(), "issue cache refreshed");

    let stats = cache.type_stats();
    if ctx.json {
        print_json(&serde_json::json!({
            "path": path,
            "total": cache.len(),
            "types": stats,
        }))?;
    } else {
        println!("Saved {} issues to {}", cache.len(), path.display());
        println!();
        let rows = stats
            .iter()
            .map(|(name, n)| vec![name.clone(), n.to_string()])
            .collect();
        print_table(&["TYPE", "COUNT"], rows);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// transition
// ---------------------------------------------------------------------------

fn transition(
    ctx: &Context,
    target: TransitionTarget,
    keys: &[String],
    sel: &Selection,
    dry_run: bool,
) -> anyhow::Result<()> {
    let targets: Vec<String> = if !keys.is_empty() {
        for key in keys {
            keys::validate_key(key)?;
        }
        keys.to_vec()
    } else if !sel.is_empty() {
        let cache = ctx.load_cache()?;
        reconcile::select(&cache, sel)
            .into_iter()
            .map(|i| i.key.clone())
            .collect()
    } else {
        anyhow::bail!("give issue keys or a selection (--under, --except-under, --type, --status-not)");
    };

    if !ctx.json {
        println!("{} issues → {target}", targets.len());
    }
    let client = if dry_run { None } else { Some(ctx.jira()?) };
    let mut tally = Tally::new(ctx.json, dry_run);
    apply_transitions(client.as_ref(), targets.iter().map(String::as_str), target, &mut tally);
    tally.finish()
}

// ---------------------------------------------------------------------------
// from-commit
// ---------------------------------------------------------------------------

fn commit_messages(explicit: Vec<String>) -> Vec<String> {
    if !explicit.is_empty() {
        return explicit;
    }
    let env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
    if let Some(message) = env("COMMIT_MESSAGE") {
        return vec![message];
    }
    env("COMMIT_MESSAGES")
        .map(|all| {
            all.lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn from_commit(ctx: &Context, message: Vec<String>, pattern: &str, dry_run: bool) -> anyhow::Result<()> {
    let messages = commit_messages(message);
    if messages.is_empty() {
        println!("No commit messages; nothing to do.");
        return Ok(());
    }
    let found = keys::extract_keys(&messages, pattern)?;
    if found.is_empty() {
        println!("No issue keys matching {pattern}; nothing to do.");
        return Ok(());
    }

    let client = if dry_run {
        None
    } else {
        match ctx.jira_credentials() {
            Ok(creds) => Some(ctx.jira_with(&creds)?),
            Err(BacklogError::MissingCredentials(names)) => {
                println!("Jira credentials not set ({names}); skipping {} keys.", found.len());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    };

    let mut tally = Tally::new(ctx.json, dry_run);
    for key in &found {
        let Some(client) = client.as_ref() else {
            tally.ok(key, "would transition to done");
            continue;
        };
        match client.get_issue(key, &["status"]) {
            Ok(issue) if issue.category() == StatusCategory::Done => {
                tally.skip(key, format!("already {}", issue.status));
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                tally.fail(key, e.to_string());
                continue;
            }
        }
        match client.transition_to(key, TransitionTarget::Done) {
            Ok(t) => tally.ok(key, format!("→ {}", t.name)),
            Err(e) => tally.fail(key, e.to_string()),
        }
    }
    tally.finish()
}

// ---------------------------------------------------------------------------
// close-unmapped
// ---------------------------------------------------------------------------

fn close_unmapped(ctx: &Context, file: Option<&Path>, yes: bool, dry_run: bool) -> anyhow::Result<()> {
    let path = ctx.backlog_path(file);
    let text = io::read_text(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let mapping = ctx.load_mapping()?;
    let canonical = reconcile::canonical_keys(&mapping, &text, ctx.project_key());

    let client = ctx.jira()?;
    let issues = client
        .project_issues(ctx.project_key())
        .context("failed to fetch project issues")?;
    let unmapped = reconcile::unmapped_issues(&issues, &canonical);

    if !ctx.json {
        println!(
            "{} issues, {} canonical keys, {} open and unmapped",
            issues.len(),
            canonical.len(),
            unmapped.len()
        );
    }
    if !unmapped.is_empty() && !dry_run && !yes {
        anyhow::bail!(
            "refusing to cancel {} issues without --yes (use --dry-run to review)",
            unmapped.len()
        );
    }

    let mut tally = Tally::new(ctx.json, dry_run);
    let apply = (!dry_run).then_some(&client);
    for issue in unmapped {
        match apply {
            None => tally.ok(&issue.key, format!("would cancel \"{}\" ({})", issue.summary, issue.status)),
            Some(client) => match client.transition_to(&issue.key, TransitionTarget::Cancel) {
                Ok(t) => tally.ok(&issue.key, format!("→ {}", t.name)),
                Err(e) => tally.fail(&issue.key, e.to_string()),
            },
        }
    }
    tally.finish()
}

// ---------------------------------------------------------------------------
// close-epics
// ---------------------------------------------------------------------------

/// Tracker epic key → tracker child keys. Epics with tasks in the task →
/// epic mapping file use those tasks; the rest fall back to their stories.
fn epic_children(ctx: &Context, file: Option<&Path>) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
    let (_, backlog) = ctx.load_backlog(file)?;
    let mapping = ctx.load_mapping()?;
    let index_path = ctx.path(paths::TASK_EPIC_FILE);
    let tasks = if index_path.exists() {
        match TaskEpicIndex::load(&index_path) {
            Ok(index) => index.epic_to_tasks(),
            Err(e) => {
                tracing::warn!(path = %index_path.display(), error = %e, "unreadable task → epic mapping; using stories");
                BTreeMap::new()
            }
        }
    } else {
        BTreeMap::new()
    };
    let merged = merge_children(backlog.epic_children(), tasks);
    Ok(resolve_children(&merged, &mapping, ctx.project_key()))
}

/// Per epic, tasks win over stories when there are any.
fn merge_children(
    stories: BTreeMap<String, Vec<String>>,
    tasks: BTreeMap<String, Vec<String>>,
) -> BTreeMap<String, Vec<String>> {
    let mut out = stories;
    for (epic, keys) in tasks {
        if !keys.is_empty() {
            out.insert(epic, keys);
        }
    }
    out
}

fn resolve_children(
    children: &BTreeMap<String, Vec<String>>,
    mapping: &MappingFile,
    project_key: &str,
) -> BTreeMap<String, Vec<String>> {
    let mut out = BTreeMap::new();
    for (epic, kids) in children {
        let Some(epic_key) = mapping.resolve(epic, project_key) else {
            tracing::warn!(epic = %epic, "epic has no tracker key; skipped");
            continue;
        };
        let mut keys: Vec<String> = mapping
            .expand_children(kids)
            .into_iter()
            .filter_map(|k| mapping.resolve(&k, project_key))
            .collect();
        keys.sort();
        keys.dedup();
        keys::sort_keys(&mut keys);
        out.insert(epic_key, keys);
    }
    out
}

fn close_epics(ctx: &Context, file: Option<&Path>, from_cache: bool, dry_run: bool) -> anyhow::Result<()> {
    let children = epic_children(ctx, file)?;
    let cache = if from_cache { Some(ctx.load_cache()?) } else { None };
    let client = if from_cache && dry_run { None } else { Some(ctx.jira()?) };

    let plan = reconcile::plan_epic_closure(&children, |key| match (&cache, &client) {
        (Some(cache), _) => cache.get(key).map(|i| i.category()),
        (None, Some(client)) => match client.get_issue(key, &["status"]) {
            Ok(issue) => Some(issue.category()),
            Err(e) => {
                tracing::warn!(key, error = %e, "could not read status");
                None
            }
        },
        (None, None) => None,
    });

    if !ctx.json {
        println!(
            "{} epics: {} already done, {} pending, {} ready, {} without children",
            children.len(),
            plan.already_done.len(),
            plan.pending.len(),
            plan.ready.len(),
            plan.no_children.len()
        );
    }

    let mut tally = Tally::new(ctx.json, dry_run);
    for epic in &plan.already_done {
        tally.skip(epic, "already done");
    }
    for (epic, open) in &plan.pending {
        tally.skip(epic, format!("{open} still open"));
    }
    for epic in &plan.no_children {
        tally.skip(epic, "no children");
    }
    let apply = if dry_run { None } else { client.as_ref() };
    apply_transitions(apply, plan.ready.iter().map(String::as_str), TransitionTarget::Done, &mut tally);
    tally.finish()
}

// ---------------------------------------------------------------------------
// reparent
// ---------------------------------------------------------------------------

fn reparent(ctx: &Context, dry_run: bool) -> anyhow::Result<()> {
    let cache = ctx.load_cache()?;
    let plan = cache.reparent_plan();
    if !ctx.json {
        println!("{} tasks sit under a story that has an epic", plan.len());
    }
    let client = if dry_run { None } else { Some(ctx.jira()?) };
    let mut tally = Tally::new(ctx.json, dry_run);
    for r in &plan {
        match client.as_ref() {
            None => tally.ok(&r.key, format!("would move {} → {}", r.from, r.to)),
            Some(client) => match client.set_parent(&r.key, &r.to) {
                Ok(()) => tally.ok(&r.key, format!("{} → {}", r.from, r.to)),
                Err(e) => tally.fail(&r.key, e.to_string()),
            },
        }
    }
    tally.finish()
}

// ---------------------------------------------------------------------------
// link
// ---------------------------------------------------------------------------

fn link(
    ctx: &Context,
    file: Option<&Path>,
    only_epic: Option<&str>,
    tasks: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let (_, backlog) = ctx.load_backlog(file)?;
    let mapping = ctx.load_mapping()?;
    let project = ctx.project_key();

    // (child, parent) pairs, epics in document order.
    let mut pairs: Vec<(String, String)> = Vec::new();
    for epic in &backlog.epics {
        let Some(epic_key) = mapping.resolve(&epic.id, project) else {
            tracing::warn!(epic = %epic.id, "epic has no tracker key; skipped");
            continue;
        };
        if only_epic.is_some_and(|e| e != epic.id && e != epic_key) {
            continue;
        }
        let story_ids: Vec<&str> = epic.stories.iter().map(|s| s.id.as_str()).collect();
        for child in mapping.expand_children(&story_ids) {
            if let Some(child_key) = mapping.resolve(&child, project) {
                pairs.push((child_key, epic_key.clone()));
            }
        }
        if tasks {
            for story in &epic.stories {
                let Some(story_key) = mapping.resolve(&story.id, project) else {
                    continue;
                };
                for task in &story.tasks {
                    if let Some(task_key) = mapping.resolve(&task.id, project) {
                        pairs.push((task_key, story_key.clone()));
                    }
                }
            }
        }
    }
    pairs.dedup();
    if let Some(epic) = only_epic {
        if pairs.is_empty() {
            anyhow::bail!("no children to link for epic {epic}");
        }
    }

    let mut tally = Tally::new(ctx.json, dry_run);
    if dry_run {
        for (child, parent) in &pairs {
            tally.ok(child, format!("would link under {parent}"));
        }
        return tally.finish();
    }

    let client = ctx.jira()?;
    let linker = Linker::new(&client, &ctx.config.fields.epic_link);
    for (child, parent) in &pairs {
        match linker.link(child, parent) {
            Ok(LinkMethod::AlreadyLinked) => tally.skip(child, format!("already under {parent}")),
            Ok(method) => tally.ok(child, format!("→ {parent} via {method}")),
            Err(e) => tally.fail(child, e.to_string()),
        }
    }
    tally.finish()
}

// ---------------------------------------------------------------------------
// set-dates
// ---------------------------------------------------------------------------

fn date_fields(ctx: &Context, item: &DatedItem) -> serde_json::Value {
    let mut fields = serde_json::json!({ "duedate": item.due.to_string() });
    if let Some(field) = ctx.config.fields.start_date.as_deref() {
        fields[field] = serde_json::json!(item.start.to_string());
    }
    fields
}

fn set_dates(
    ctx: &Context,
    file: Option<&Path>,
    start: NaiveDate,
    skip_if_set: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let (_, backlog) = ctx.load_backlog(file)?;
    let mapping = ctx.load_mapping()?;
    let dated = schedule::assign_dates(&schedule::schedule_items(&backlog), start);
    if !ctx.json {
        println!("{} dated items from week 1 = {start}", dated.len());
    }

    let client = if dry_run { None } else { Some(ctx.jira()?) };
    let mut tally = Tally::new(ctx.json, dry_run);
    for item in &dated {
        let label = format!("{} {}", item.kind, item.id);
        let Some(key) = mapping.resolve(&item.id, ctx.project_key()) else {
            tally.skip(&label, "no tracker key");
            continue;
        };
        let Some(client) = client.as_ref() else {
            tally.ok(&label, format!("{key}: {} ~ {}", item.start, item.due));
            continue;
        };
        let current = match client.get_issue(&key, &["duedate"]) {
            Ok(issue) => issue.duedate.filter(|d| !d.is_empty()),
            Err(e) => {
                tally.fail(&label, e.to_string());
                continue;
            }
        };
        let due = item.due.to_string();
        if current.as_deref() == Some(due.as_str()) {
            tally.skip(&label, format!("{key} already due {due}"));
            continue;
        }
        if skip_if_set {
            if let Some(current) = current {
                tally.skip(&label, format!("{key} already has due date {current}"));
                continue;
            }
        }
        match client.update_fields(&key, date_fields(ctx, item)) {
            Ok(()) => tally.ok(&label, format!("{key}: {} ~ {due}", item.start)),
            Err(e) => tally.fail(&label, e.to_string()),
        }
    }
    tally.finish()
}

// ---------------------------------------------------------------------------
// fix-summaries / fix-epics
// ---------------------------------------------------------------------------

fn load_analysis(ctx: &Context, path: Option<&Path>) -> anyhow::Result<MappingAnalysis> {
    let path = ctx.path(path.unwrap_or(Path::new(paths::ANALYSIS_FILE)));
    MappingAnalysis::load(&path).with_context(|| {
        format!(
            "failed to read {} (run `backlog map analyze` first)",
            path.display()
        )
    })
}

fn fix_summaries(ctx: &Context, analysis: Option<&Path>, dry_run: bool) -> anyhow::Result<()> {
    let analysis = load_analysis(ctx, analysis)?;
    let keys = analysis.summary_fixes();
    let client = if dry_run { None } else { Some(ctx.jira()?) };
    let mut tally = Tally::new(ctx.json, dry_run);
    for key in &keys {
        let entry = &analysis.entries[key];
        let Some(summary) = entry.summary_correct.as_deref() else {
            tally.skip(key, "no replacement summary");
            continue;
        };
        match client.as_ref() {
            None => tally.ok(key, format!("would rename \"{}\" → \"{summary}\"", entry.summary_current)),
            Some(client) => match client.update_fields(key, serde_json::json!({ "summary": summary })) {
                Ok(()) => tally.ok(key, format!("\"{}\" → \"{summary}\"", entry.summary_current)),
                Err(e) => tally.fail(key, e.to_string()),
            },
        }
    }
    tally.finish()
}

fn fix_epics(ctx: &Context, analysis: Option<&Path>, dry_run: bool) -> anyhow::Result<()> {
    let analysis = load_analysis(ctx, analysis)?;
    let mapping = ctx.load_mapping()?;
    let keys = analysis.epic_fixes();
    let client = if dry_run { None } else { Some(ctx.jira()?) };
    let mut tally = Tally::new(ctx.json, dry_run);
    for key in &keys {
        let entry = &analysis.entries[key];
        let Some(epic) = entry
            .epic_correct
            .as_deref()
            .and_then(|e| mapping.resolve(e, ctx.project_key()))
        else {
            tally.skip(key, "correct epic has no tracker key");
            continue;
        };
        if entry.epic_current.as_deref() == Some(epic.as_str()) {
            tally.skip(key, format!("already under {epic}"));
            continue;
        }
        let from = entry.epic_current.as_deref().unwrap_or("-");
        match client.as_ref() {
            None => tally.ok(key, format!("would move {from} → {epic}")),
            Some(client) => match client.set_parent(key, &epic) {
                Ok(()) => tally.ok(key, format!("{from} → {epic}")),
                Err(e) => tally.fail(key, e.to_string()),
            },
        }
    }
    tally.finish()
}

// ---------------------------------------------------------------------------
// mismatches
// ---------------------------------------------------------------------------

fn mismatches(
    ctx: &Context,
    verification: Option<&Path>,
    output: Option<&Path>,
    complete: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let path = ctx.path(verification.unwrap_or(Path::new(paths::VERIFICATION_FILE)));
    let evidence =
        CompletionEvidence::load(&path).with_context(|| format!("failed to read {}", path.display()))?;

    let client = ctx.jira()?;
    let found = reconcile::find_mismatches(&evidence, |key| match client.get_issue(key, &["status"]) {
        Ok(issue) => Some(issue.status),
        Err(e) => {
            tracing::warn!(key, error = %e, "could not read status");
            None
        }
    });

    let output = ctx.path(output.unwrap_or(Path::new(paths::MISMATCH_FILE)));
    io::write_json(&output, &found).with_context(|| format!("failed to write {}", output.display()))?;

    if !complete {
        if ctx.json {
            print_json(&found)?;
        } else {
            for m in &found {
                let what = m.description.as_deref().or(m.title.as_deref()).unwrap_or_default();
                println!("  {} [{}] {what} (tracker: {})", m.key, m.kind, m.jira_status);
            }
            println!("{} mismatches written to {}", found.len(), output.display());
        }
        return Ok(());
    }

    let mut tally = Tally::new(ctx.json, dry_run);
    let apply = (!dry_run).then_some(&client);
    apply_transitions(apply, found.iter().map(|m| m.key.as_str()), TransitionTarget::Done, &mut tally);
    tally.finish()
}
