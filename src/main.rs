use anyhow::{Context, Result};
use baix::index::stats::show_stats;
use baix::index::{IndexReader, ReindexOptions, reindex};
use baix::utils::{AppConfig, get_config_path};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser)]
#[command(name = "baix")]
#[command(version, about = "Rewrite and inspect BAM index files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite an index as text or as a binary index
    Reindex {
        /// Source index, binary or text
        input: PathBuf,

        /// Where to write the new index
        output: PathBuf,

        /// Write the text rendering
        #[arg(long)]
        text: bool,

        /// Sort chunks within each bin and bins by id
        #[arg(long)]
        sort_bins: bool,

        /// BAM file the index describes (sizes the output buffer)
        #[arg(long)]
        bam: Option<PathBuf>,

        /// Override the trailing count of records without a coordinate
        #[arg(long, value_name = "N")]
        no_coordinate_count: Option<u64>,
    },
    /// Show index statistics
    Stats {
        index: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the chunks to scan for a region (1-based, inclusive)
    Query {
        index: PathBuf,

        /// Reference index
        reference: usize,

        start: i64,

        end: i64,
    },
    /// Show the configuration file and its settings
    Config {
        /// Write the current settings to the configuration file
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    let config = AppConfig::load()?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Reindex {
            input,
            output,
            text,
            sort_bins,
            bam,
            no_coordinate_count,
        } => {
            let bam_file_size = match bam {
                Some(bam) => Some(
                    std::fs::metadata(&bam)
                        .with_context(|| format!("Failed to read {}", bam.display()))?
                        .len(),
                ),
                None => None,
            };
            let options = ReindexOptions {
                input,
                output,
                text,
                sort_bins: sort_bins || config.sort_bins,
                no_coordinate_count,
                bam_file_size,
                progress: config.progress && std::io::stderr().is_terminal(),
            };
            debug!(?options, "reindex options");

            let summary = reindex(&options).with_context(|| {
                format!(
                    "Failed to reindex {} into {}",
                    options.input.display(),
                    options.output.display()
                )
            })?;
            println!(
                "Wrote {} ({} references, {} bins, {} chunks, {} without coordinate)",
                summary.output.display(),
                summary.totals.references,
                summary.totals.bins,
                summary.totals.chunks,
                summary.totals.no_coordinate_count
            );
        }
        Commands::Stats { index, json } => {
            show_stats(&index, json)?;
        }
        Commands::Query {
            index,
            reference,
            start,
            end,
        } => {
            let reader = IndexReader::open(&index)
                .with_context(|| format!("Failed to open index {}", index.display()))?;
            for chunk in reader.query_chunks(reference, start, end)? {
                println!(
                    "{}\t{}\t{}",
                    chunk.start.as_raw(),
                    chunk.end.as_raw(),
                    chunk
                );
            }
        }
        Commands::Config { init } => {
            let path = get_config_path()?;
            if init {
                config.save()?;
            }
            println!("Config file:      {}", path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
