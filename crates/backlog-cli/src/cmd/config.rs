use crate::context::Context;
use crate::output::print_json;
use anyhow::Context as _;
use backlog_core::config::{Config, WarnLevel};
use backlog_core::paths;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration
    Show,

    /// Validate the config for common mistakes
    Validate,

    /// Write a default .github/backlog.yaml if none exists
    Init,
}

pub fn run(ctx: &Context, subcmd: ConfigSubcommand) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(ctx),
        ConfigSubcommand::Validate => validate(ctx),
        ConfigSubcommand::Init => init(ctx),
    }
}

fn credential_status(ctx: &Context) -> &'static str {
    match ctx.jira_credentials() {
        Ok(_) => "configured",
        Err(_) => "missing",
    }
}

fn show(ctx: &Context) -> anyhow::Result<()> {
    if ctx.json {
        return print_json(&serde_json::json!({
            "config": ctx.config,
            "jira_credentials": credential_status(ctx),
        }));
    }
    let yaml = serde_yaml::to_string(&ctx.config).context("failed to render config")?;
    print!("{yaml}");
    println!("# jira credentials: {}", credential_status(ctx));
    Ok(())
}

fn validate(ctx: &Context) -> anyhow::Result<()> {
    let warnings = ctx.config.validate();

    if ctx.json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

fn init(ctx: &Context) -> anyhow::Result<()> {
    let path = paths::config_path(&ctx.root);
    if path.exists() {
        println!("{} already exists", path.display());
        return Ok(());
    }
    Config::default()
        .save(&ctx.root)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
