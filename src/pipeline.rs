use crate::config::SearchTarget;
use crate::fetcher::{FetchOptions, ListingFetcher};
use crate::github_store::{GitHubStore, GitHubStoreConfig};
use crate::reconcile::{reconcile, Reconciliation};
use crate::store::{FileStore, SnapshotFormat, SnapshotStore};
use crate::tui::RefreshTUI;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub data_dir: PathBuf,
    pub format: SnapshotFormat,
    /// `owner/repo` to store snapshots in instead of `data_dir`.
    pub github_repository: Option<String>,
    pub github_branch: String,
    pub max_pages: Option<usize>,
    pub page_delay_ms: u64,
    /// Reconcile and report, but leave stored snapshots untouched.
    pub dry_run: bool,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            format: SnapshotFormat::Json,
            github_repository: None,
            github_branch: "main".to_string(),
            max_pages: None,
            page_delay_ms: 500,
            dry_run: false,
        }
    }
}

impl RefreshOptions {
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            max_pages: self.max_pages,
            page_delay: Duration::from_millis(self.page_delay_ms),
            ..FetchOptions::default()
        }
    }

    pub fn build_store(&self) -> Result<Box<dyn SnapshotStore>> {
        match &self.github_repository {
            Some(repository) => {
                let mut config = GitHubStoreConfig::new(repository.clone());
                config.branch = self.github_branch.clone();
                let store = GitHubStore::new(config).context("Failed to set up GitHub store")?;
                Ok(Box::new(store))
            }
            None => Ok(Box::new(FileStore::new(self.data_dir.clone(), self.format))),
        }
    }
}

#[derive(Debug)]
pub struct RefreshOutcome {
    pub search: String,
    /// Size of the stored snapshot before the refresh, `None` if there was none.
    pub prior_count: Option<usize>,
    pub fetched_count: usize,
    pub reconciliation: Reconciliation,
    /// The fetch stopped at the page cap; the merged snapshot was not saved.
    pub truncated: bool,
    pub saved: bool,
}

/// Runs one refresh cycle: load prior snapshot, fetch, reconcile, save.
///
/// Nothing is written unless every earlier step succeeded and the fetch
/// covered every result page.
pub fn refresh_search<F, S>(
    fetcher: &F,
    store: &S,
    target: &SearchTarget,
    dry_run: bool,
) -> Result<RefreshOutcome>
where
    F: ListingFetcher + ?Sized,
    S: SnapshotStore + ?Sized,
{
    let prior = store
        .load(&target.name)
        .with_context(|| format!("Failed to load snapshot {}", target.name))?;
    let prior_count = prior.as_ref().map(|s| s.len());
    let prior = prior.unwrap_or_default();

    let fetched = fetcher
        .fetch(&target.url)
        .with_context(|| format!("Failed to fetch {} listings for {}", fetcher.name(), target.name))?;
    info!("Fetched {} listings for {}", fetched.listings.len(), target.name);

    let reconciliation = reconcile(&prior, &fetched.listings);

    if fetched.truncated {
        warn!("Not saving {}: fetch stopped at the page cap", target.name);
    }
    let save = !dry_run && !fetched.truncated;
    if save {
        store
            .save(&target.name, &reconciliation.merged)
            .with_context(|| format!("Failed to save snapshot {}", target.name))?;
    }

    Ok(RefreshOutcome {
        search: target.name.clone(),
        prior_count,
        fetched_count: fetched.listings.len(),
        reconciliation,
        truncated: fetched.truncated,
        saved: save,
    })
}

pub struct RefreshReport {
    pub outcomes: Vec<RefreshOutcome>,
    pub failures: Vec<(String, anyhow::Error)>,
}

impl RefreshReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Refreshes the given searches one after the other. A failing search is
/// reported and leaves its snapshot unchanged; the others still run.
pub fn refresh_all<F, S, W>(
    fetcher: &F,
    store: &S,
    targets: &[&SearchTarget],
    dry_run: bool,
    tui: &mut RefreshTUI<W>,
) -> Result<RefreshReport>
where
    F: ListingFetcher + ?Sized,
    S: SnapshotStore + ?Sized,
    W: Write,
{
    let mut outcomes = Vec::new();
    let mut failures = Vec::new();

    for target in targets {
        tui.start_search(&target.name, &store.describe())?;

        match refresh_search(fetcher, store, target, dry_run) {
            Ok(outcome) => {
                let result = &outcome.reconciliation;
                tui.show_loaded(outcome.prior_count)?;
                tui.show_fetched(outcome.fetched_count)?;
                tui.show_new(&result.new_listings().collect::<Vec<_>>())?;
                if outcome.truncated {
                    // Removals are unreliable when pages are missing
                    tui.show_truncated(&target.name)?;
                } else {
                    tui.show_removed(&result.removed)?;
                    tui.finish_search(&target.name, result.new_count, result.removed.len(), result.merged.len())?;
                }
                outcomes.push(outcome);
            }
            Err(e) => {
                error!("Refresh of {} failed: {:#}", target.name, e);
                tui.fail_search(&target.name, &e)?;
                failures.push((target.name.clone(), e));
            }
        }
    }

    tui.show_final_summary()?;
    Ok(RefreshReport { outcomes, failures })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchedListings;
    use crate::models::fixtures::listing;
    use crate::models::Listing;
    use crate::snapshot::Snapshot;
    use crate::store::StoreError;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FixedFetcher {
        result: Result<Vec<Listing>, String>,
        truncated: bool,
        calls: RefCell<usize>,
    }

    impl FixedFetcher {
        fn ok(listings: Vec<Listing>) -> Self {
            Self {
                result: Ok(listings),
                truncated: false,
                calls: RefCell::new(0),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                result: Err(message.to_string()),
                ..Self::ok(Vec::new())
            }
        }

        fn capped(listings: Vec<Listing>) -> Self {
            Self {
                truncated: true,
                ..Self::ok(listings)
            }
        }
    }

    impl ListingFetcher for FixedFetcher {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fetch(&self, _search_url: &str) -> Result<FetchedListings> {
            *self.calls.borrow_mut() += 1;
            let listings = self.result.clone().map_err(|e| anyhow::anyhow!(e))?;
            Ok(FetchedListings {
                listings,
                truncated: self.truncated,
            })
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        snapshots: RefCell<HashMap<String, Snapshot>>,
        saves: RefCell<usize>,
        fail_saves: bool,
        malformed: bool,
    }

    impl SnapshotStore for MemoryStore {
        fn describe(&self) -> String {
            "memory".to_string()
        }

        fn load(&self, name: &str) -> Result<Option<Snapshot>, StoreError> {
            if self.malformed {
                return Err(Snapshot::from_json_str(r#"[{"名前": "Foo"}]"#).unwrap_err().into());
            }
            Ok(self.snapshots.borrow().get(name).cloned())
        }

        fn save(&self, name: &str, snapshot: &Snapshot) -> Result<(), StoreError> {
            if self.fail_saves {
                return Err(StoreError::Http {
                    status: 401,
                    body: "Bad credentials".to_string(),
                });
            }
            *self.saves.borrow_mut() += 1;
            self.snapshots
                .borrow_mut()
                .insert(name.to_string(), snapshot.clone());
            Ok(())
        }
    }

    fn target(name: &str) -> SearchTarget {
        SearchTarget {
            name: name.to_string(),
            url: "https://suumo.jp/jj/chintai/ichiran/FR301FC001/?ar=030".to_string(),
        }
    }

    fn incoming() -> Vec<Listing> {
        vec![
            listing("Foo", "8万円", Some("https://suumo.jp/a")),
            listing("Bar", "9万円", Some("https://suumo.jp/b")),
        ]
    }

    #[test]
    fn first_refresh_stores_everything_as_new() {
        let store = MemoryStore::default();
        let outcome = refresh_search(&FixedFetcher::ok(incoming()), &store, &target("南武線"), false).unwrap();

        assert_eq!(outcome.prior_count, None);
        assert_eq!(outcome.reconciliation.new_count, 2);
        assert!(outcome.saved);
        let stored = store.load("南武線").unwrap().unwrap();
        assert_eq!(stored.new_listings().count(), 2);
    }

    #[test]
    fn repeated_refresh_finds_nothing_new() {
        let store = MemoryStore::default();
        let fetcher = FixedFetcher::ok(incoming());
        refresh_search(&fetcher, &store, &target("a"), false).unwrap();
        let second = refresh_search(&fetcher, &store, &target("a"), false).unwrap();

        assert_eq!(second.prior_count, Some(2));
        assert_eq!(second.reconciliation.new_count, 0);
        assert!(second.reconciliation.removed.is_empty());
        assert_eq!(store.load("a").unwrap().unwrap().len(), 2);
    }

    #[test]
    fn failed_fetch_saves_nothing() {
        let store = MemoryStore::default();
        let fetcher = FixedFetcher::failing("http status 503");
        let err = refresh_search(&fetcher, &store, &target("a"), false).unwrap_err();

        assert!(format!("{:#}", err).contains("503"));
        assert_eq!(*store.saves.borrow(), 0);
        assert!(store.load("a").unwrap().is_none());
    }

    #[test]
    fn malformed_prior_aborts_before_fetching() {
        let store = MemoryStore {
            malformed: true,
            ..MemoryStore::default()
        };
        let fetcher = FixedFetcher::ok(incoming());
        let err = refresh_search(&fetcher, &store, &target("a"), false).unwrap_err();

        assert!(format!("{:#}", err).contains("malformed snapshot"));
        assert_eq!(*fetcher.calls.borrow(), 0);
        assert_eq!(*store.saves.borrow(), 0);
    }

    #[test]
    fn capped_fetch_is_reported_but_not_saved() {
        let store = MemoryStore::default();
        let full = FixedFetcher::ok(incoming());
        refresh_search(&full, &store, &target("a"), false).unwrap();
        assert_eq!(*store.saves.borrow(), 1);

        let first_page = FixedFetcher::capped(incoming()[..1].to_vec());
        let outcome = refresh_search(&first_page, &store, &target("a"), false).unwrap();

        assert!(outcome.truncated);
        assert!(!outcome.saved);
        assert_eq!(outcome.reconciliation.removed.len(), 1);
        assert_eq!(*store.saves.borrow(), 1);
        assert_eq!(store.load("a").unwrap().unwrap().len(), 2);
    }

    #[test]
    fn capped_search_is_flagged_in_the_summary() {
        let store = MemoryStore::default();
        let fetcher = FixedFetcher::capped(incoming());
        let a = target("a");
        let mut tui = RefreshTUI::with_writer(Vec::new());

        let report = refresh_all(&fetcher, &store, &[&a], false, &mut tui).unwrap();
        assert!(report.is_success());
        assert_eq!(*store.saves.borrow(), 0);
        let text = String::from_utf8(tui.into_inner()).unwrap();
        assert!(text.contains("page cap"));
    }

    #[test]
    fn dry_run_leaves_store_untouched() {
        let store = MemoryStore::default();
        let outcome = refresh_search(&FixedFetcher::ok(incoming()), &store, &target("a"), true).unwrap();
        assert!(!outcome.saved);
        assert_eq!(*store.saves.borrow(), 0);
    }

    #[test]
    fn failed_save_is_reported_and_other_searches_continue() {
        let store = MemoryStore {
            fail_saves: true,
            ..MemoryStore::default()
        };
        let fetcher = FixedFetcher::ok(incoming());
        let a = target("a");
        let b = target("b");
        let mut tui = RefreshTUI::with_writer(Vec::new());

        let report = refresh_all(&fetcher, &store, &[&a, &b], false, &mut tui).unwrap();
        assert!(!report.is_success());
        assert_eq!(report.failures.len(), 2);
        assert!(format!("{:#}", report.failures[0].1).contains("Bad credentials"));
    }

    #[test]
    fn refresh_all_reports_each_search() {
        let store = MemoryStore::default();
        let fetcher = FixedFetcher::ok(incoming());
        let a = target("a");
        let b = target("b");
        let mut tui = RefreshTUI::with_writer(Vec::new());

        let report = refresh_all(&fetcher, &store, &[&a, &b], false, &mut tui).unwrap();
        assert!(report.is_success());
        assert_eq!(report.outcomes.len(), 2);
        let text = String::from_utf8(tui.into_inner()).unwrap();
        assert!(text.contains("Refreshed 2 searches: 4 new, 0 removed"));
    }

    #[test]
    fn default_options_use_local_json_files() {
        let options = RefreshOptions::default();
        assert_eq!(options.format, SnapshotFormat::Json);
        assert!(options.build_store().unwrap().describe().starts_with("data"));
    }
}
