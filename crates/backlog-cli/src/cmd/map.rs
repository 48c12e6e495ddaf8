use crate::context::Context;
use crate::output::{print_json, print_table};
use anyhow::Context as _;
use backlog_core::backlog::rewrite_keys;
use backlog_core::io;
use backlog_core::paths;
use backlog_core::reconcile::analyze_mapping;
use backlog_core::report::analysis_report;
use backlog_core::verification::CompletionEvidence;
use clap::Subcommand;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum MapSubcommand {
    /// Write the task → epic mapping file from the backlog structure
    Tasks {
        #[arg(long)]
        file: Option<PathBuf>,
        /// Output file (default: .github/jira-task-to-epic-mapping.json)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Compare the issue cache with the backlog and write fix lists
    Analyze {
        #[arg(long)]
        file: Option<PathBuf>,
        /// Verification results (default: .github/code-completion-verification.json)
        #[arg(long)]
        verification: Option<PathBuf>,
        /// Analysis JSON output
        #[arg(long)]
        output: Option<PathBuf>,
        /// Markdown report output
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Rewrite backlog keys in the document using a key → key mapping file
    MigrateKeys {
        #[arg(long)]
        file: Option<PathBuf>,
        /// Old key → new key JSON (default: .github/backlog-to-jira-mapping.json)
        #[arg(long)]
        mapping: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
}

pub fn run(ctx: &Context, subcmd: MapSubcommand) -> anyhow::Result<()> {
    match subcmd {
        MapSubcommand::Tasks { file, output } => tasks(ctx, file.as_deref(), output.as_deref()),
        MapSubcommand::Analyze {
            file,
            verification,
            output,
            report,
        } => analyze(
            ctx,
            file.as_deref(),
            verification.as_deref(),
            output.as_deref(),
            report.as_deref(),
        ),
        MapSubcommand::MigrateKeys {
            file,
            mapping,
            dry_run,
        } => migrate_keys(ctx, file.as_deref(), mapping.as_deref(), dry_run),
    }
}

// ---------------------------------------------------------------------------
// tasks
// ---------------------------------------------------------------------------

fn tasks(ctx: &Context, file: Option<&Path>, output: Option<&Path>) -> anyhow::Result<()> {
    let (_, backlog) = ctx.load_backlog(file)?;
    let index = backlog.task_epic_index();
    let path = ctx.path(output.unwrap_or(Path::new(paths::TASK_EPIC_FILE)));
    index
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;

    if ctx.json {
        print_json(&serde_json::json!({
            "path": path,
            "task_count": index.task_count,
            "section_count": index.section_count,
        }))?;
    } else {
        println!(
            "Wrote {}: {} tasks in {} sections",
            path.display(),
            index.task_count,
            index.section_count
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// analyze
// ---------------------------------------------------------------------------

fn analyze(
    ctx: &Context,
    file: Option<&Path>,
    verification: Option<&Path>,
    output: Option<&Path>,
    report: Option<&Path>,
) -> anyhow::Result<()> {
    let (_, backlog) = ctx.load_backlog(file)?;
    let cache = ctx.load_cache()?;
    let verification = ctx.path(verification.unwrap_or(Path::new(paths::VERIFICATION_FILE)));
    let evidence = CompletionEvidence::load_optional(&verification)
        .with_context(|| format!("failed to read {}", verification.display()))?;

    let analysis = analyze_mapping(&cache, &backlog, &evidence, ctx.project_key());

    let output = ctx.path(output.unwrap_or(Path::new(paths::ANALYSIS_FILE)));
    analysis
        .save(&output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    let report = ctx.path(report.unwrap_or(Path::new(paths::ANALYSIS_REPORT)));
    io::atomic_write(&report, analysis_report(&analysis).as_bytes())
        .with_context(|| format!("failed to write {}", report.display()))?;

    let summary = analysis.summary_fixes().len();
    let epic = analysis.epic_fixes().len();
    let completion = analysis.completion_needed().len();
    if ctx.json {
        print_json(&serde_json::json!({
            "issues": analysis.entries.len(),
            "summary_fixes": summary,
            "epic_fixes": epic,
            "completion_needed": completion,
            "analysis": output,
            "report": report,
        }))?;
    } else {
        print_table(
            &["CHECK", "COUNT"],
            vec![
                vec!["tracker issues".to_string(), analysis.entries.len().to_string()],
                vec!["summary fixes".to_string(), summary.to_string()],
                vec!["epic fixes".to_string(), epic.to_string()],
                vec!["completion needed".to_string(), completion.to_string()],
            ],
        );
        println!();
        println!("Analysis: {}", output.display());
        println!("Report:   {}", report.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// migrate-keys
// ---------------------------------------------------------------------------

fn load_key_map(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let value: Value =
        io::read_json(path).with_context(|| format!("failed to read {}", path.display()))?;
    let Value::Object(obj) = value else {
        anyhow::bail!("{} must be a JSON object", path.display());
    };
    Ok(obj
        .into_iter()
        .filter(|(k, _)| !k.starts_with('_'))
        .filter_map(|(k, v)| v.as_str().map(|v| (k, v.to_string())))
        .collect())
}

fn migrate_keys(
    ctx: &Context,
    file: Option<&Path>,
    mapping: Option<&Path>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let path = ctx.backlog_path(file);
    let text = io::read_text(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let map_path = ctx.path(mapping.unwrap_or(Path::new(paths::KEY_MIGRATION_FILE)));
    let keys = load_key_map(&map_path)?;

    let (rewritten, count) = rewrite_keys(&text, &keys);
    let written = if dry_run {
        false
    } else {
        io::write_if_changed(&path, &rewritten)
            .with_context(|| format!("failed to write {}", path.display()))?
    };

    if ctx.json {
        print_json(&serde_json::json!({
            "path": path,
            "replacements": count,
            "written": written,
            "dry_run": dry_run,
        }))?;
    } else if dry_run {
        println!("Dry run: {count} key references would be rewritten in {}", path.display());
    } else if written {
        println!("Rewrote {count} key references in {}", path.display());
    } else {
        println!("No key references to rewrite in {}", path.display());
    }
    Ok(())
}
