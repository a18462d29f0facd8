use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "coldline",
    about = "coldline -- archive index buckets to colder tiers and thaw them back",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Settings file with [archiver], [thaw] and optional [cold_tier] tables
    #[arg(short, long, global = true, default_value = "coldline.toml")]
    pub config: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Archive a local bucket directory in every configured format
    Archive(ArchiveArgs),
    /// List archived buckets
    List(ListArgs),
    /// Retrieve archived buckets into the hot tier
    Thaw(ThawArgs),
    /// Print the effective settings as TOML
    Config,
}

#[derive(Args)]
pub struct ArchiveArgs {
    pub bucket_dir: PathBuf,
    #[arg(long)]
    pub index: String,
}

/// Index and time-window selection shared by `list` and `thaw`.
#[derive(Args)]
pub struct FilterArgs {
    /// Restrict to one index (default: all)
    #[arg(long)]
    pub index: Option<String>,
    /// Epoch seconds or RFC 3339
    #[arg(long, value_parser = parse_time)]
    pub earliest: Option<DateTime<Utc>>,
    /// Epoch seconds or RFC 3339
    #[arg(long, value_parser = parse_time)]
    pub latest: Option<DateTime<Utc>>,
}

#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args)]
pub struct ThawArgs {
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Thaw into <dir>/<index>/<bucket>
    #[arg(long)]
    pub thaw_dir: Option<PathBuf>,
    #[arg(long)]
    pub workers: Option<usize>,
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(secs) = s.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0).ok_or_else(|| format!("{s} is out of range"));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("{s:?} is neither epoch seconds nor RFC 3339: {e}"))
}
