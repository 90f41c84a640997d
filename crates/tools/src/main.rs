use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use catalog::{
    ApplyOptions, CatalogTree, DanglingPolicy, ShareConfig, ShareContext, ShareReport,
    TypeRegistry, UserProperties, load_catalog,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Produce, restore and inspect catalog share links")]
struct Args {
    /// Share settings (JSON, camelCase keys)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the share link for a catalog definition
    Share {
        /// Catalog definition file (JSON array of members)
        #[arg(long)]
        catalog: PathBuf,

        /// User property to embed, KEY=VALUE (repeatable)
        #[arg(long = "user-prop", value_parser = parse_user_prop)]
        user_props: Vec<(String, String)>,

        /// Print an iframe embed snippet instead of the bare URL
        #[arg(long)]
        embed: bool,
    },

    /// Apply a share link to a catalog definition and print the result
    Restore {
        #[arg(long)]
        catalog: PathBuf,

        /// Share URL or embed snippet
        #[arg(long)]
        url: String,

        /// What to do with addresses missing from the catalog
        #[arg(long, value_enum, default_value_t = Policy::Report)]
        policy: Policy,
    },

    /// Decode a share link without applying it
    Inspect {
        #[arg(long)]
        url: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Policy {
    Report,
    Abort,
    Create,
}

impl From<Policy> for DanglingPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Report => DanglingPolicy::Report,
            Policy::Abort => DanglingPolicy::Abort,
            Policy::Create => DanglingPolicy::Create,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = real_main(Args::parse()).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn real_main(args: Args) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let ctx = ShareContext::from_config(config);
    let registry = TypeRegistry::with_builtins();

    match args.command {
        Command::Share {
            catalog,
            user_props,
            embed,
        } => cmd_share(&ctx, &registry, &catalog, user_props, embed).await,
        Command::Restore {
            catalog,
            url,
            policy,
        } => cmd_restore(&ctx, &registry, &catalog, &url, policy).await,
        Command::Inspect { url } => cmd_inspect(&ctx, &url),
    }
}

fn load_config(path: Option<&Path>) -> Result<ShareConfig> {
    let mut config = match path {
        Some(path) => ShareConfig::load(path)
            .with_context(|| format!("load share config {}", path.display()))?,
        None => ShareConfig::default(),
    };
    apply_env_overrides(
        &mut config,
        env::var("ATLAS_SHARE_BASE_URL").ok(),
        env::var("ATLAS_SHARE_USER_PROPS").ok(),
    );
    Ok(config)
}

fn apply_env_overrides(config: &mut ShareConfig, base_url: Option<String>, user_props: Option<String>) {
    if let Some(base_url) = base_url.filter(|s| !s.trim().is_empty()) {
        config.base_url = base_url.trim().to_string();
    }
    if let Some(user_props) = user_props {
        config.extra_user_props.extend(
            user_props
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
    }
}

fn parse_user_prop(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

async fn read_catalog(path: &Path, registry: &TypeRegistry) -> Result<CatalogTree> {
    let payload = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    let definitions: Value =
        serde_json::from_str(&payload).with_context(|| format!("parse {}", path.display()))?;
    let (tree, report) = load_catalog(&definitions, registry)
        .await
        .with_context(|| format!("load catalog {}", path.display()))?;
    for failure in &report.errors {
        warn!(address = %failure.address, error = %failure.error, "catalog member did not load");
    }
    Ok(tree)
}

async fn cmd_share(
    ctx: &ShareContext,
    registry: &TypeRegistry,
    catalog: &Path,
    user_props: Vec<(String, String)>,
    embed: bool,
) -> Result<()> {
    let tree = read_catalog(catalog, registry).await?;
    let user: UserProperties = user_props.into_iter().collect();
    let out = if embed {
        ctx.embed_code(&tree, &user)?
    } else {
        ctx.share_url(&tree, &user)?
    };
    println!("{out}");
    Ok(())
}

async fn cmd_restore(
    ctx: &ShareContext,
    registry: &TypeRegistry,
    catalog: &Path,
    url: &str,
    policy: Policy,
) -> Result<()> {
    let mut tree = read_catalog(catalog, registry).await?;
    let mut user = UserProperties::new();
    let report = ctx
        .restore(
            url,
            &mut tree,
            registry,
            &mut user,
            ApplyOptions::with_policy(policy.into()),
        )
        .await
        .context("could not restore this share link")?;

    let out = json!({
        "catalog": tree.to_definition(tree.root()),
        "userProperties": user,
        "report": report_json(&report),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn cmd_inspect(ctx: &ShareContext, url: &str) -> Result<()> {
    let decoded = ctx.decode(url).context("could not restore this share link")?;
    let payload = decoded.payload.unwrap_or_default();
    let out = json!({
        "version": payload.version,
        "initUrls": payload.init_urls,
        "sharedCatalogMembers": payload.shared,
        "extra": payload.extra,
        "userProperties": decoded.user_properties,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn report_json(report: &ShareReport) -> Value {
    let errors: Vec<Value> = report
        .errors
        .iter()
        .map(|f| json!({"address": f.address, "error": f.error.to_string()}))
        .collect();
    json!({
        "applied": report.applied,
        "created": report.created,
        "skipped": report.skipped,
        "errors": errors,
    })
}
