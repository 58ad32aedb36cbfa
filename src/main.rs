// ABOUTME: CLI entry point for sqlite-dist
// ABOUTME: Parses commands and routes to export, reconstruct, and validate handlers

use clap::{Parser, Subcommand};
use sqlite_dist::commands::{self, ExportOptions, ReconstructOptions, ValidateOptions};
use sqlite_dist::config::{apply_config_file, DistConfig, ReleaseSource};
use sqlite_dist::integrity::{GroundTruth, ValidationMode};
use sqlite_dist::remote::FetchMode;
use sqlite_dist::table_rules::TableRules;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sqlite-dist")]
#[command(
    about = "Split a SQLite database into a size-tiered Parquet distribution and rebuild it",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export every table to Parquet plus schema script and manifest
    Export {
        /// Source SQLite database
        #[arg(long)]
        db: PathBuf,
        /// Distribution root (receives schema/ and data/)
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Rows per sample file
        #[arg(long)]
        sample_size: Option<usize>,
        /// Do not export tables above the category threshold
        #[arg(long)]
        skip_large: bool,
        /// TOML file with threshold, batch size and table rule overrides
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Rebuild a database from a distribution and validate it
    Reconstruct {
        /// Release tag to download large tables from ("latest" for the newest)
        #[arg(long)]
        release: Option<String>,
        /// Destination database (replaced if present)
        #[arg(long, default_value = "pronunciation_db_reconstructed.db")]
        output: PathBuf,
        /// Distribution root holding schema/ and data/
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Use data/release/ instead of downloading
        #[arg(long)]
        local: bool,
        /// Release repository (owner/name)
        #[arg(long)]
        repo: Option<String>,
        /// TOML file with release and batch size overrides
        #[arg(long)]
        config: Option<PathBuf>,
        /// Skip the pronunciation dataset spot checks and view tests
        #[arg(long)]
        no_ground_truth: bool,
    },
    /// Validate a database against a manifest
    Validate {
        #[arg(long, default_value = "pronunciation_db_reconstructed.db")]
        db: PathBuf,
        #[arg(long, default_value = "schema/table_manifest.json")]
        manifest: PathBuf,
        /// Skip the foreign key scan
        #[arg(long)]
        skip_fk: bool,
        /// The database is the original source: surplus rows and FK violations are warnings
        #[arg(long)]
        against_source: bool,
        /// Skip the pronunciation dataset spot checks and view tests
        #[arg(long)]
        no_ground_truth: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            db,
            out,
            sample_size,
            skip_large,
            config,
        } => {
            let mut dist = DistConfig {
                source_id: source_id(&db),
                ..DistConfig::default()
            };
            let mut rules = TableRules::pronunciation_defaults();
            if let Some(path) = config {
                apply_config_file(&path, &mut dist, &mut ReleaseSource::default(), &mut rules)?;
            }
            // The flag wins over the config file
            if let Some(size) = sample_size {
                dist.sample_size = size;
            }
            let options = ExportOptions {
                db,
                out,
                skip_large,
            };
            commands::export(&options, &dist, &rules)?;
            Ok(())
        }
        Commands::Reconstruct {
            release,
            output,
            root,
            local,
            repo,
            config,
            no_ground_truth,
        } => {
            let mut dist = DistConfig::default();
            let mut source = ReleaseSource::default();
            if let Some(path) = config {
                apply_config_file(&path, &mut dist, &mut source, &mut TableRules::default())?;
            }
            if let Some(tag) = release {
                source.tag = tag;
            }
            if let Some(repo) = repo {
                source.repo = repo;
            }
            let mode = if local {
                FetchMode::Local
            } else {
                FetchMode::Remote(source)
            };
            let options = ReconstructOptions {
                root,
                output,
                mode,
                ground_truth: ground_truth(no_ground_truth),
            };
            commands::reconstruct(&options, &dist).await?;
            Ok(())
        }
        Commands::Validate {
            db,
            manifest,
            skip_fk,
            against_source,
            no_ground_truth,
        } => {
            let mode = if against_source {
                ValidationMode::Source
            } else {
                ValidationMode::Reconstructed
            };
            let options = ValidateOptions {
                db,
                manifest,
                skip_fk,
                mode,
                ground_truth: ground_truth(no_ground_truth),
            };
            commands::validate(&options)?;
            Ok(())
        }
    }
}

fn source_id(db: &Path) -> String {
    db.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| db.display().to_string())
}

fn ground_truth(disabled: bool) -> GroundTruth {
    if disabled {
        GroundTruth::none()
    } else {
        GroundTruth::pronunciation()
    }
}
