use anyhow::{Context, Result};
use chintaifinder::logging;
use chintaifinder::reconcile::reconcile;
use chintaifinder::snapshot::Snapshot;
use chintaifinder::tui::RefreshTUI;
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Reconcile two listing snapshot files offline")]
struct Args {
    /// Previously stored snapshot (JSON); a missing file counts as empty
    prior: PathBuf,

    /// Freshly fetched listings (JSON)
    incoming: PathBuf,

    /// Write the merged snapshot here
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Enable debug output
    #[clap(short, long)]
    debug: bool,
}

fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Snapshot::from_json_str(&json).with_context(|| format!("Failed to decode {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.debug);

    let prior = if args.prior.exists() {
        read_snapshot(&args.prior)?
    } else {
        println!("Prior snapshot {} does not exist, treating it as empty", args.prior.display());
        Snapshot::default()
    };
    let incoming = read_snapshot(&args.incoming)?;

    let result = reconcile(&prior, incoming.listings());

    let mut tui = RefreshTUI::new();
    tui.show_loaded(Some(prior.len()))?;
    tui.show_fetched(incoming.len())?;
    tui.show_new(&result.new_listings().collect::<Vec<_>>())?;
    tui.show_removed(&result.removed)?;
    tui.finish_search("diff", result.new_count, result.removed.len(), result.merged.len())?;

    if let Some(output) = &args.output {
        let json = result.merged.to_json_string()?;
        fs::write(output, json).with_context(|| format!("Failed to write {}", output.display()))?;
        println!("Saved merged snapshot to {}", output.display());
    }

    Ok(())
}
