//! labelgrid command line
//!
//! Cuts shipping labels out of a source PDF and prints them four-up on A4.

use anyhow::Context;
use clap::{Parser, Subcommand};
use labelgrid_core::{Config, LabelPipeline, RunSummary};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_CONFIG: &str = "labelgrid.toml";
const DEFAULT_LABELS_DIR: &str = "labels";

#[derive(Parser, Debug)]
#[command(name = "labelgrid")]
#[command(version, about = "Extract shipping labels and lay them out on print pages")]
struct Args {
    /// Configuration file (default: labelgrid.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Source PDF, overrides paths.input
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,

    /// Output PDF, overrides paths.output
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Directory for the extracted labels, overrides paths.labels_dir
    #[arg(long, global = true)]
    labels_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Extract labels and compose the output (default)
    Run,
    /// Only save the extracted labels into the labels directory
    Extract,
    /// Only compose the labels directory into the output
    Compose,
}

impl Args {
    /// Replace configured paths with the ones given on the command line
    fn apply_paths(&self, config: &mut Config) {
        if let Some(input) = &self.input {
            config.paths.input = input.clone();
        }
        if let Some(output) = &self.output {
            config.paths.output = output.clone();
        }
        if let Some(dir) = &self.labels_dir {
            config.paths.labels_dir = Some(dir.clone());
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None if Path::new(DEFAULT_CONFIG).is_file() => Config::from_file(DEFAULT_CONFIG),
        None => Ok(Config::default()),
    }
}

fn log_summary(summary: &RunSummary) {
    if let Some(report) = &summary.report {
        tracing::info!(
            "Sheets: {} scanned, {} skipped; regions: {} checked, {} labels, {} rejected",
            report.sheets_seen,
            report.sheets_skipped,
            report.candidates,
            report.accepted,
            report.rejected
        );
    }
    match &summary.output {
        Some(output) => tracing::info!(
            "Done: {} labels on {} pages in {}",
            summary.artifacts,
            summary.pages,
            output.display()
        ),
        None => tracing::info!("Done: {} labels extracted", summary.artifacts),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("labelgrid=info,labelgrid_core=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = load_config(args.config.as_deref())?;
    args.apply_paths(&mut config);

    let pipeline = LabelPipeline::new(config).context("Invalid configuration")?;
    let paths = &pipeline.config().paths;
    let labels_dir = paths
        .labels_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LABELS_DIR));

    let summary = match args.command.unwrap_or(Command::Run) {
        Command::Run => pipeline
            .run()
            .with_context(|| format!("Failed to process {}", paths.input.display()))?,
        Command::Extract => pipeline
            .extract_to_dir(&paths.input, &labels_dir)
            .with_context(|| format!("Failed to extract labels from {}", paths.input.display()))?,
        Command::Compose => pipeline
            .compose_dir(&labels_dir, &paths.output)
            .with_context(|| format!("Failed to compose labels from {}", labels_dir.display()))?,
    };

    log_summary(&summary);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_run() {
        let args = Args::try_parse_from(["labelgrid"]).unwrap();
        assert_eq!(args.command, None);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["labelgrid", "compose", "--labels-dir", "out", "-o", "a.pdf"])
                .unwrap();
        assert_eq!(args.command, Some(Command::Compose));
        assert_eq!(args.labels_dir, Some(PathBuf::from("out")));
        assert_eq!(args.output, Some(PathBuf::from("a.pdf")));
    }

    #[test]
    fn test_path_flags_override_config_only_when_given() {
        let mut config = Config::default();
        config.paths.labels_dir = Some(PathBuf::from("kept"));

        let args = Args::try_parse_from(["labelgrid", "-i", "sheets.pdf", "extract"]).unwrap();
        args.apply_paths(&mut config);

        assert_eq!(config.paths.input, PathBuf::from("sheets.pdf"));
        assert_eq!(config.paths.output, PathBuf::from("final.pdf"));
        assert_eq!(config.paths.labels_dir, Some(PathBuf::from("kept")));
        assert_eq!(config.layout.scale, Config::default().layout.scale);
    }

    #[test]
    fn test_explicit_missing_config_fails() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&tmp.path().join("nope.toml"))).is_err());
    }
}
