use crate::context::Context;
use crate::output::print_json;
use anyhow::Context as _;
use backlog_core::backlog::sync_checkboxes;
use backlog_core::io;
use backlog_core::keys;
use backlog_core::mapping::MappingFile;
use backlog_core::paths;
use backlog_core::reconcile::completed_from_cache;
use backlog_core::verification::CompletionEvidence;
use clap::Subcommand;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum SyncSubcommand {
    /// Tick `- [x]` on completed tasks and clear the rest
    Checkboxes {
        #[arg(long)]
        file: Option<PathBuf>,
        /// Take completed keys from verification results instead of the issue cache
        #[arg(long, value_name = "VERIFICATION_JSON")]
        by_code: Option<PathBuf>,
        /// Ignore done issues under these roots (cache mode)
        #[arg(long, value_name = "KEY")]
        exclude_under: Vec<String>,
        /// Verification results used to veto cache completions
        #[arg(long)]
        verification: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
}

pub fn run(ctx: &Context, subcmd: SyncSubcommand) -> anyhow::Result<()> {
    match subcmd {
        SyncSubcommand::Checkboxes {
            file,
            by_code,
            exclude_under,
            verification,
            dry_run,
        } => checkboxes(
            ctx,
            file.as_deref(),
            by_code.as_deref(),
            &exclude_under,
            verification.as_deref(),
            dry_run,
        ),
    }
}

/// Tracker keys plus the backlog ids mapped to them, so documents that
/// still carry backlog ids are ticked too.
fn with_backlog_ids(keys: BTreeSet<String>, mapping: &MappingFile) -> BTreeSet<String> {
    let mut out = keys.clone();
    out.extend(
        mapping
            .entries
            .iter()
            .filter(|(_, tracker)| keys.contains(tracker.as_str()))
            .map(|(id, _)| id.clone()),
    );
    out
}

fn checkboxes(
    ctx: &Context,
    file: Option<&Path>,
    by_code: Option<&Path>,
    exclude_under: &[String],
    verification: Option<&Path>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let completed = match by_code {
        Some(path) => {
            let path = ctx.path(path);
            CompletionEvidence::load(&path)
                .with_context(|| format!("failed to read {}", path.display()))?
                .implemented
        }
        None => {
            let cache = ctx.load_cache()?;
            let verification = ctx.path(verification.unwrap_or(Path::new(paths::VERIFICATION_FILE)));
            let evidence = CompletionEvidence::load_optional(&verification)
                .with_context(|| format!("failed to read {}", verification.display()))?;
            let done = completed_from_cache(&cache, exclude_under, &evidence);
            with_backlog_ids(done, &ctx.load_mapping()?)
        }
    };

    let path = ctx.backlog_path(file);
    let text = io::read_text(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let key_re = keys::project_key_re(ctx.project_key());
    let sync = sync_checkboxes(&text, &key_re, &completed);

    let written = if dry_run || !sync.changed() {
        false
    } else {
        io::write_if_changed(&path, &sync.text)
            .with_context(|| format!("failed to write {}", path.display()))?
    };

    if ctx.json {
        print_json(&serde_json::json!({
            "path": path,
            "completed_keys": completed.len(),
            "checked": sync.checked,
            "unchecked": sync.unchecked,
            "unchanged": sync.unchanged,
            "written": written,
            "dry_run": dry_run,
        }))?;
    } else {
        println!(
            "{}checked {}, unchecked {}, unchanged {} ({} completed keys)",
            if dry_run { "Dry run: " } else { "" },
            sync.checked,
            sync.unchecked,
            sync.unchanged,
            completed.len()
        );
        if written {
            println!("Updated {}", path.display());
        }
    }
    Ok(())
}
