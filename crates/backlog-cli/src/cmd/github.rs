use crate::context::Context;
use crate::output::Tally;
use anyhow::Context as _;
use backlog_core::github::{dedupe_plan, REPORT_LABEL};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum GithubSubcommand {
    /// Close duplicate report issues, keeping the newest of each title
    DedupeReports {
        /// Label that marks report issues
        #[arg(long, default_value = REPORT_LABEL)]
        label: String,
        /// owner/repo (default: GITHUB_REPOSITORY)
        #[arg(long)]
        repo: Option<String>,
        /// Token (default: GITHUB_TOKEN)
        #[arg(long)]
        token: Option<String>,
        /// API base URL
        #[arg(long, env = "GITHUB_API_URL")]
        api_url: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
}

impl GithubSubcommand {
    pub fn mutates_remote(&self) -> bool {
        match self {
            GithubSubcommand::DedupeReports { dry_run, .. } => !dry_run,
        }
    }
}

pub fn run(ctx: &Context, subcmd: GithubSubcommand) -> anyhow::Result<()> {
    match subcmd {
        GithubSubcommand::DedupeReports {
            label,
            repo,
            token,
            api_url,
            dry_run,
        } => dedupe_reports(ctx, &label, repo, token, api_url, dry_run),
    }
}

fn dedupe_reports(
    ctx: &Context,
    label: &str,
    repo: Option<String>,
    token: Option<String>,
    api_url: Option<String>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let client = ctx.github(token, repo, api_url)?;
    let issues = client
        .open_issues(label)
        .with_context(|| format!("failed to list open issues labelled '{label}'"))?;
    let plan = dedupe_plan(&issues);

    if !ctx.json {
        println!(
            "{} open '{label}' issues, {} titles with duplicates",
            issues.len(),
            plan.len()
        );
    }

    let mut tally = Tally::new(ctx.json, dry_run);
    for group in &plan {
        for dup in &group.close {
            let item = format!("#{}", dup.number);
            if dry_run {
                tally.ok(&item, format!("would close (keeping #{})", group.keep.number));
                continue;
            }
            match client.close_issue(dup.number) {
                Ok(()) => tally.ok(&item, format!("closed, kept #{} \"{}\"", group.keep.number, group.title)),
                Err(e) => tally.fail(&item, e.to_string()),
            }
        }
    }
    tally.finish()
}
