use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use driftscan::config::{Config, ConfigOverrides};
use driftscan::engine::run_scan;
use driftscan::output::json::render_json;
use driftscan::output::table::render_drift_table;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "driftscan", about = "Release-drift report for Kubernetes workloads")]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    namespace: Option<String>,
    /// Restrict the scan to these context aliases (comma separated).
    #[arg(long)]
    contexts: Option<String>,
    /// GitHub organization override.
    #[arg(long)]
    org: Option<String>,
    /// GitHub token; anonymous access works but rate limits are tight.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one scan across all configured contexts (the default).
    Scan,
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    if let Some(Commands::Config { init, show }) = &cli.command {
        if *init {
            Config::write_template(&config_path)?;
            println!("Wrote config template to {}", config_path.display());
        }
        if *show || !*init {
            let config = Config::load(&config_path)?;
            println!("{}", render_json(&config)?);
        }
        return Ok(());
    }

    if !config_path.exists() {
        return Err(anyhow!(
            "config not found: {} (run `driftscan config --init` to create one)",
            config_path.display()
        ));
    }
    let mut config = Config::load(&config_path)?;
    config.apply_overrides(ConfigOverrides {
        namespace: cli.namespace.clone(),
        contexts: cli.contexts.as_deref().map(parse_alias_list),
        org: cli.org.clone(),
    });

    let infos = run_scan(&config, cli.token.clone()).await?;

    match cli.output {
        OutputFormat::Table => {
            let context_order: Vec<String> = config
                .contexts
                .iter()
                .map(|ctx| ctx.alias().to_string())
                .collect();
            println!("{}", render_drift_table(&infos, &context_order));
        }
        OutputFormat::Json => println!("{}", render_json(&infos)?),
    }
    Ok(())
}

fn parse_alias_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}
