use crate::context::Context;
use crate::output::Tally;
use anyhow::Context as _;
use backlog_core::importer::{plan_import, ImportItem, Importer, Outcome};
use std::path::Path;

fn record(tally: &mut Tally, item: &ImportItem) {
    let label = format!("{} {}", item.kind, item.id);
    let key = item.key.as_deref().unwrap_or_default();
    let message = item.message.as_deref().unwrap_or_default();
    match item.outcome {
        Outcome::Created if message.is_empty() => tally.ok(&label, format!("→ {key}")),
        Outcome::Created => tally.ok(&label, format!("→ {key} ({message})")),
        Outcome::Planned => tally.ok(&label, format!("would create \"{}\"", item.summary)),
        Outcome::Skipped => tally.skip(&label, format!("already {key}")),
        Outcome::Failed => tally.fail(&label, message),
    }
}

pub fn run(ctx: &Context, file: Option<&Path>, dry_run: bool) -> anyhow::Result<()> {
    let (_, backlog) = ctx.load_backlog(file)?;
    let mut mapping = ctx.load_mapping()?;
    let (epics, stories, tasks) = backlog.counts();
    if !ctx.json {
        println!("Backlog: {epics} epics, {stories} stories, {tasks} tasks; {} mapped", mapping.len());
    }

    let mut tally = Tally::new(ctx.json, dry_run);
    if dry_run {
        for item in plan_import(&backlog, &mapping) {
            record(&mut tally, &item);
        }
        return tally.finish();
    }

    let creds = ctx.jira_credentials().context("Jira credentials")?;
    let client = ctx.jira_with(&creds)?;
    let mut importer = Importer::new(&client, &ctx.config, &creds.email);
    importer.run(&backlog, &mut mapping, |item| record(&mut tally, item));

    let path = ctx.mapping_path();
    mapping
        .save(&path)
        .with_context(|| format!("failed to write mapping {}", path.display()))?;
    if !ctx.json {
        println!("Mapping saved: {} ({} entries)", path.display(), mapping.len());
    }
    tally.finish()
}
