use crate::context::Context;
use crate::output::print_json;
use anyhow::Context as _;
use backlog_core::io;
use backlog_core::reconcile;
use backlog_core::report::{progress_report, ProgressStats, ReportMeta};
use backlog_core::schedule;
use chrono::NaiveDate;
use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum ReportSubcommand {
    /// Markdown progress report over the project's issues
    Progress {
        /// Use the issue cache instead of fetching from the tracker
        #[arg(long)]
        from_cache: bool,
        /// Only issues the mapping or the backlog knows about
        #[arg(long)]
        canonical_only: bool,
        /// Report date (default: today)
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        /// Write to this file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    schedule::parse_date(s).map_err(|e| e.to_string())
}

pub fn run(ctx: &Context, subcmd: ReportSubcommand) -> anyhow::Result<()> {
    match subcmd {
        ReportSubcommand::Progress {
            from_cache,
            canonical_only,
            date,
            output,
        } => progress(ctx, from_cache, canonical_only, date, output),
    }
}

fn progress(
    ctx: &Context,
    from_cache: bool,
    canonical_only: bool,
    date: Option<NaiveDate>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut issues = if from_cache {
        ctx.load_cache()?.issues
    } else {
        ctx.jira()?
            .project_issues(ctx.project_key())
            .context("failed to fetch project issues")?
    };

    if canonical_only {
        let path = ctx.backlog_path(None);
        let text = io::read_text(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let canonical = reconcile::canonical_keys(&ctx.load_mapping()?, &text, ctx.project_key());
        issues.retain(|i| canonical.contains(&i.key));
    }

    let meta = ReportMeta {
        project_name: &ctx.config.report.project_name,
        web_url: &ctx.config.report.web_url,
        date: date.unwrap_or_else(|| chrono::Local::now().date_naive()),
    };
    let markdown = progress_report(&issues, &meta);
    let stats = ProgressStats::from_issues(&issues);

    let written = match output {
        Some(path) => {
            let path = ctx.path(path);
            io::atomic_write(&path, markdown.as_bytes())
                .with_context(|| format!("failed to write {}", path.display()))?;
            Some(path)
        }
        None => None,
    };

    if ctx.json {
        print_json(&serde_json::json!({
            "date": meta.date,
            "stats": stats,
            "path": written,
            "markdown": markdown,
        }))?;
    } else if let Some(path) = written {
        println!(
            "Wrote {} ({} issues, {:.1}% done)",
            path.display(),
            stats.total,
            stats.percent
        );
    } else {
        print!("{markdown}");
    }
    Ok(())
}
