//! `offline-manifest` - generate offline cache manifests for a build output directory.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use offline_manifest::scanning::collect_build_assets;
use offline_manifest::{BuildContext, OfflineBuilder, Options, write_emitted_files};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Resolve cache sections and versions for a build and write the offline manifests.
#[derive(Debug, Parser)]
#[command(name = "offline-manifest", version, about)]
struct Cli {
  /// Build output directory to scan and write into.
  #[arg(short, long, default_value = "dist")]
  output_dir: PathBuf,

  /// Configuration file; defaults to `offline.config.{json,yaml}` in the current directory.
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Compilation hash passed to version functions.
  #[arg(long)]
  build_hash: Option<String>,

  /// Print the resolved report as JSON instead of writing files.
  #[arg(long)]
  dry_run: bool,

  /// Increase log verbosity (-v info, -vv debug).
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let filter = match cli.verbose {
    0 => EnvFilter::new("offline_manifest=warn"),
    1 => EnvFilter::new("offline_manifest=info"),
    _ => EnvFilter::new("offline_manifest=debug"),
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .without_time()
    .init();

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      eprintln!("error: {err:#}");
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<()> {
  let current_dir = std::env::current_dir().context("failed to read the current directory")?;
  let options = Options::load(&current_dir, cli.config).context("failed to load configuration")?;
  let builder = OfflineBuilder::new(options)?;

  let assets = collect_build_assets(&cli.output_dir)
    .with_context(|| format!("failed to scan {}", cli.output_dir.display()))?;
  debug!(assets = assets.len(), dir = %cli.output_dir.display(), "scanned build output");

  let report = builder.build(&BuildContext {
    assets,
    build_hash: cli.build_hash,
  })?;

  if cli.dry_run {
    println!("{}", serde_json::to_string_pretty(&report)?);
    return Ok(());
  }

  write_emitted_files(&cli.output_dir, &report.files)?;
  for file in &report.files {
    println!("wrote {}", cli.output_dir.join(&file.path).display());
  }
  println!(
    "version {} ({} assets, {} warnings)",
    report.version,
    report.assets.len(),
    report.warnings.len()
  );
  Ok(())
}
