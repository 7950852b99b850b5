use anyhow::{bail, Context, Result};
use chintaifinder::config::SearchConfig;
use chintaifinder::fetcher::SuumoFetcher;
use chintaifinder::logging;
use chintaifinder::pipeline::{refresh_all, RefreshOptions};
use chintaifinder::store::SnapshotFormat;
use chintaifinder::tui::RefreshTUI;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Chintaifinder - rental listing tracker for SUUMO searches")]
struct Args {
    /// Path to the JSON file listing the searches
    #[clap(short, long, default_value = "searches.json", global = true)]
    config: PathBuf,

    /// Directory holding one snapshot file per search
    #[clap(short = 'D', long, default_value = "data", global = true)]
    data_dir: PathBuf,

    /// File format of local snapshots
    #[clap(short, long, value_enum, default_value = "json", global = true)]
    format: Format,

    /// Store snapshots in this GitHub repository (owner/repo) instead of the data directory; reads GITHUB_TOKEN
    #[clap(long, global = true)]
    github: Option<String>,

    /// Branch used with --github
    #[clap(long, default_value = "main", global = true)]
    branch: String,

    /// Enable debug output
    #[clap(short, long, global = true)]
    debug: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every configured search (or one) and update the stored snapshots
    Refresh {
        /// Only refresh the search with this name
        #[clap(short, long)]
        search: Option<String>,

        /// Maximum number of result pages to fetch per search (default: until an empty page)
        #[clap(short, long)]
        max_pages: Option<usize>,

        /// Delay between page requests in milliseconds
        #[clap(long, default_value = "500")]
        delay_ms: u64,

        /// Report new and removed listings without saving
        #[clap(long)]
        dry_run: bool,
    },
    /// Show the stored snapshot of a search
    Show {
        /// Name of the search
        name: String,

        /// Only show listings flagged new in the latest refresh
        #[clap(short, long)]
        new_only: bool,
    },
    /// List the configured searches
    Searches,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Csv,
}

impl From<Format> for SnapshotFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => SnapshotFormat::Json,
            Format::Csv => SnapshotFormat::Csv,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.debug);

    let mut options = RefreshOptions {
        data_dir: args.data_dir.clone(),
        format: args.format.into(),
        github_repository: args.github.clone(),
        github_branch: args.branch.clone(),
        ..RefreshOptions::default()
    };

    match args.command {
        Command::Refresh {
            search,
            max_pages,
            delay_ms,
            dry_run,
        } => {
            options.max_pages = max_pages;
            options.page_delay_ms = delay_ms;
            options.dry_run = dry_run;
            run_refresh(&args.config, search.as_deref(), &options)
        }
        Command::Show { name, new_only } => run_show(&name, new_only, &options),
        Command::Searches => {
            let config = SearchConfig::load(&args.config)?;
            for search in &config.searches {
                println!("{}\t{}", search.name, search.url);
            }
            Ok(())
        }
    }
}

fn run_refresh(config_path: &Path, search: Option<&str>, options: &RefreshOptions) -> Result<()> {
    println!("Chintaifinder - Rental Listing Tracker");
    println!("======================================");

    let config = SearchConfig::load(config_path)?;
    let targets = config.select(search)?;
    if targets.is_empty() {
        println!("No searches configured in {}", config_path.display());
        return Ok(());
    }

    let store = options.build_store()?;
    let fetcher = SuumoFetcher::new(options.fetch_options())?;
    let mut tui = RefreshTUI::new();

    let report = refresh_all(&fetcher, store.as_ref(), &targets, options.dry_run, &mut tui)?;
    if options.dry_run {
        println!("Dry run: no snapshots were saved");
    }

    if !report.is_success() {
        let names: Vec<&str> = report.failures.iter().map(|(name, _)| name.as_str()).collect();
        bail!("Refresh failed for: {}", names.join(", "));
    }
    Ok(())
}

fn run_show(name: &str, new_only: bool, options: &RefreshOptions) -> Result<()> {
    let store = options.build_store()?;
    let snapshot = store
        .load(name)
        .with_context(|| format!("Failed to load snapshot {}", name))?;

    let Some(snapshot) = snapshot else {
        println!("No snapshot stored for {} in {}", name, store.describe());
        return Ok(());
    };

    let listings: Vec<_> = if new_only {
        snapshot.new_listings().cloned().collect()
    } else {
        snapshot.into_listings()
    };

    RefreshTUI::new().show_snapshot(name, &listings)?;
    Ok(())
}
