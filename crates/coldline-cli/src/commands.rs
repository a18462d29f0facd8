use std::sync::Arc;

use anyhow::{bail, Context as _};
use coldline_archive::{
    ArchiveBucketLister, ArchivePaths, ArchiveReport, BucketArchiver, BucketPackager,
};
use coldline_glacier::credentials::WARM_SCHEME;
use coldline_glacier::factory::WARM_STAGING_DIR;
use coldline_glacier::{
    GlacierAddress, GlacierArchiveFactory, LocalVaultConnector, S3VaultConnector,
};
use coldline_lock::BucketLocker;
use coldline_store::{
    blocking_runtime, uri, ArchiveFileSystem, LocalConnector, S3Connector, StoreRegistry,
    TransactionalArchive,
};
use coldline_thaw::{
    ArchiveBucketRetriever, BucketThawer, ThawDirectory, ThawFilter, ThawReport,
};
use coldline_types::{Bucket, BucketFormat, BucketLocation};
use colored::Colorize;
use serde::Serialize;
use tokio::runtime::Runtime;
use tracing::info;

use crate::cli::*;
use crate::settings::{ColdTierSettings, Settings};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(&cli.config)?;
    match cli.command {
        Command::Archive(args) => {
            let report = cmd_archive(&Context::open(settings)?, &args)?;
            print_archive(&report, &cli.format)?;
            if !report.is_complete() {
                bail!("{} format(s) failed to archive", report.failed.len());
            }
            Ok(())
        }
        Command::List(args) => {
            let buckets = cmd_list(&Context::open(settings)?, &args)?;
            print_buckets(&buckets, &cli.format)
        }
        Command::Thaw(args) => {
            let report = cmd_thaw(&Context::open(settings)?, &args)?;
            print_thaw(&report, &cli.format)?;
            let errors = report.errors().count();
            if errors > 0 {
                bail!("{errors} bucket(s) failed to thaw");
            }
            Ok(())
        }
        Command::Config => {
            print!("{}", settings.to_masked_toml()?);
            Ok(())
        }
    }
}

/// Archive filesystem and layout wired from settings.
pub struct Context {
    settings: Settings,
    fs: Arc<dyn ArchiveFileSystem>,
    paths: ArchivePaths,
    locker: Arc<BucketLocker>,
}

impl Context {
    pub fn open(settings: Settings) -> anyhow::Result<Self> {
        let (fs, paths) = match &settings.cold_tier {
            None => warm_only(&settings)?,
            Some(cold) => through_cold_tier(&settings, cold)?,
        };
        Ok(Self {
            settings,
            fs,
            paths,
            locker: Arc::new(BucketLocker::new()),
        })
    }
}

type Wired = (Arc<dyn ArchiveFileSystem>, ArchivePaths);

const S3_SCHEMES: [&str; 2] = ["s3n", "s3"];

/// Runtime shared by the object-store backends, started on first use.
#[derive(Default)]
struct ObjectRuntime(Option<Arc<Runtime>>);

impl ObjectRuntime {
    fn get(&mut self) -> anyhow::Result<Arc<Runtime>> {
        if let Some(runtime) = &self.0 {
            return Ok(Arc::clone(runtime));
        }
        let runtime = blocking_runtime().context("starting the object-store runtime")?;
        self.0 = Some(Arc::clone(&runtime));
        Ok(runtime)
    }
}

fn warm_only(settings: &Settings) -> anyhow::Result<Wired> {
    let archiver = &settings.archiver;
    let mut stores = StoreRegistry::with_local_files();
    if S3_SCHEMES.contains(&archiver.archive_path.scheme()) {
        let s3 = S3Connector::new(settings.object_store.clone(), ObjectRuntime::default().get()?);
        for scheme in S3_SCHEMES {
            stores.register(scheme, s3.clone());
        }
    }
    let store = stores
        .connect(&archiver.archive_path)
        .with_context(|| format!("connecting to {}", archiver.archive_path))?;
    let fs = TransactionalArchive::new(store, archiver.staging_uri()?);
    Ok((Arc::new(fs), ArchivePaths::from_config(archiver)?))
}

fn through_cold_tier(
    settings: &Settings,
    cold: &ColdTierSettings,
) -> anyhow::Result<Wired> {
    let archiver = &settings.archiver;
    let mut runtime = ObjectRuntime::default();
    let mut stores = StoreRegistry::new();
    match &cold.warm_root {
        Some(root) => stores.register(WARM_SCHEME, LocalConnector::new(root)),
        None => stores.register(
            WARM_SCHEME,
            S3Connector::new(settings.object_store.clone(), runtime.get()?),
        ),
    }
    let mut factory = GlacierArchiveFactory::new(stores, archiver.packaging_dir());
    match &cold.vault_root {
        Some(root) => factory.register_vault("glacier", LocalVaultConnector::new(root)),
        None => factory.register_vault(
            "glacier",
            S3VaultConnector::new(settings.object_store.clone(), runtime.get()?),
        ),
    }
    let glacier = factory.create(&cold.address)?;

    let address = GlacierAddress::parse(&cold.address)?;
    let warm = address.warm_uri()?;
    let paths = ArchivePaths::new(
        &warm,
        &archiver.cluster_name,
        &archiver.server_name,
        uri::child(&warm, WARM_STAGING_DIR)?,
    )?;
    info!(address = %address, "archiving through the cold tier");
    Ok((Arc::new(glacier), paths))
}

pub fn cmd_archive(ctx: &Context, args: &ArchiveArgs) -> anyhow::Result<ArchiveReport> {
    let bucket = Bucket::local(&args.index, &args.bucket_dir, BucketFormat::NativeBucket)?;
    let archiver = BucketArchiver::new(
        Arc::clone(&ctx.fs),
        Arc::clone(&ctx.locker),
        ctx.paths.clone(),
        BucketPackager::new(ctx.settings.archiver.packaging_dir()),
        ctx.settings.archiver.archive_formats.clone(),
    );
    Ok(archiver.archive(&bucket))
}

fn lister(ctx: &Context) -> ArchiveBucketLister {
    ArchiveBucketLister::new(
        Arc::clone(&ctx.fs),
        ctx.paths.clone(),
        ctx.settings.archiver.format_priority(),
    )
}

fn filter(args: &FilterArgs) -> anyhow::Result<ThawFilter> {
    Ok(ThawFilter::new(args.index.clone(), args.earliest, args.latest)?)
}

pub fn cmd_list(ctx: &Context, args: &ListArgs) -> anyhow::Result<Vec<Bucket>> {
    let filter = filter(&args.filter)?;
    let lister = lister(ctx);
    let buckets = match filter.index() {
        Some(index) => lister.list_in_range_for_index(index, filter.range())?,
        None => lister.list_in_range(filter.range())?,
    };
    Ok(buckets)
}

pub fn cmd_thaw(ctx: &Context, args: &ThawArgs) -> anyhow::Result<ThawReport> {
    let filter = filter(&args.filter)?;
    let mut config = ctx.settings.thaw.clone();
    if let Some(dir) = &args.thaw_dir {
        config.thaw_root = Some(dir.clone());
    }
    if config.thaw_root.is_none() && config.index_dirs.is_empty() {
        bail!("no thaw directory: pass --thaw-dir or set thaw.thaw_root");
    }

    let locations = Arc::new(ThawDirectory::from_config(&config));
    let retriever = ArchiveBucketRetriever::from_config(
        Arc::clone(&ctx.fs),
        locations.clone(),
        &ctx.settings.archiver,
    );
    let thawer = BucketThawer::from_config(
        Arc::new(lister(ctx)),
        Arc::new(retriever),
        locations,
        Arc::clone(&ctx.locker),
        &config,
    );

    let workers = args.workers.unwrap_or(config.workers);
    let report = if workers > 1 {
        thawer.thaw_buckets_parallel(&filter, workers)?
    } else {
        thawer.thaw_buckets(&filter)?
    };
    Ok(report)
}

/// Bucket as shown to users: remote locations lose their credentials.
#[derive(Serialize)]
struct BucketView {
    index: String,
    name: String,
    format: BucketFormat,
    earliest: i64,
    latest: i64,
    location: String,
}

impl From<&Bucket> for BucketView {
    fn from(bucket: &Bucket) -> Self {
        Self {
            index: bucket.index().to_string(),
            name: bucket.name().to_string(),
            format: bucket.format(),
            earliest: bucket.range().earliest().timestamp(),
            latest: bucket.range().latest().timestamp(),
            location: display_location(bucket.location()),
        }
    }
}

fn display_location(location: &BucketLocation) -> String {
    match location {
        BucketLocation::Local(path) => path.display().to_string(),
        BucketLocation::Remote(uri) => {
            let mut shown = uri.clone();
            // Only fails for URIs that cannot carry credentials at all.
            let _ = shown.set_username("");
            let _ = shown.set_password(None);
            shown.to_string()
        }
    }
}

#[derive(Serialize)]
struct FailureView {
    bucket: BucketView,
    error: String,
}

fn print_archive(report: &ArchiveReport, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let archived: Vec<BucketView> = report.archived.iter().map(BucketView::from).collect();
            let failed: Vec<_> = report
                .failed
                .iter()
                .map(|f| serde_json::json!({ "format": f.format, "error": f.error.to_string() }))
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(
                    &serde_json::json!({ "archived": archived, "failed": failed })
                )?
            );
        }
        OutputFormat::Text => {
            for bucket in &report.archived {
                println!(
                    "{} {} -> {}",
                    "✓".green().bold(),
                    bucket.to_string().bold(),
                    display_location(bucket.location()).cyan()
                );
            }
            for failed in &report.failed {
                println!("{} {}: {}", "✗".red().bold(), failed.format, failed.error);
            }
        }
    }
    Ok(())
}

fn print_buckets(buckets: &[Bucket], format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let views: Vec<BucketView> = buckets.iter().map(BucketView::from).collect();
            println!("{}", serde_json::to_string_pretty(&views)?);
        }
        OutputFormat::Text => {
            if buckets.is_empty() {
                println!("No archived buckets match.");
            }
            for bucket in buckets {
                println!(
                    "{}  {}  {}",
                    bucket.to_string().bold(),
                    bucket.range().to_string().dimmed(),
                    display_location(bucket.location()).cyan()
                );
            }
        }
    }
    Ok(())
}

fn print_thaw(report: &ThawReport, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let thawed: Vec<BucketView> = report.thawed.iter().map(BucketView::from).collect();
            let failed: Vec<FailureView> = report
                .failed
                .iter()
                .map(|f| FailureView {
                    bucket: BucketView::from(&f.bucket),
                    error: f.error.to_string(),
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(
                    &serde_json::json!({ "thawed": thawed, "failed": failed })
                )?
            );
        }
        OutputFormat::Text => {
            for bucket in &report.thawed {
                println!(
                    "{} {} -> {}",
                    "✓".green().bold(),
                    format!("{}/{}", bucket.index(), bucket.name()).bold(),
                    display_location(bucket.location()).cyan()
                );
            }
            for failed in &report.failed {
                let mark = if failed.error.is_already_thawed() {
                    "=".yellow()
                } else {
                    "✗".red().bold()
                };
                println!("{mark} {}", failed.error);
            }
            println!(
                "Thawed {}, failed {}.",
                report.thawed.len().to_string().green(),
                report.failed.len().to_string().red()
            );
        }
    }
    Ok(())
}
