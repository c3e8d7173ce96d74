//! tiergen - compile a tiered network description into firewall artifacts

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bridge::config::Config;
use bridge::error::BridgeError;
use bridge::render::{write_files, Renderer};
use policy_engine::compiler::{CompilerOptions, PolicyCompiler};
use policy_engine::prune::PruneMode;

/// Compile a tiered network description into Terraform security groups,
/// network ACLs, and a traffic diagram.
#[derive(Parser, Debug)]
#[command(name = "tiergen", version, about, long_about = None)]
struct Cli {
    /// Path to the network description document
    #[arg(default_value = "config.yaml")]
    config_path: PathBuf,

    /// Directory the rendered artifacts are written to
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Reproduce the unguarded subsumption checks of earlier releases
    #[arg(long)]
    legacy_prune: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(count) => {
            tracing::info!(files = count, path = %cli.output_dir.display(), "artifacts written");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<usize, BridgeError> {
    tracing::info!(path = %cli.config_path.display(), "loading configuration");
    let config = Config::from_path(&cli.config_path)?;

    let prune_mode = if cli.legacy_prune {
        PruneMode::Legacy
    } else {
        PruneMode::Guarded
    };
    let compiler = PolicyCompiler::with_options(CompilerOptions { prune_mode });
    let compiled = compiler.compile(&config.policy)?;
    tracing::debug!(policy = %serde_json::to_string_pretty(&compiled)?, "compiled policy");

    let files = Renderer::new()?.render_all(&config, &compiled)?;
    write_files(&cli.output_dir, &files)?;
    Ok(files.len())
}
