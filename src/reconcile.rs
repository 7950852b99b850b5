//! Reconciliation of a stored snapshot with a freshly fetched result set.
//!
//! Two keys are in play. New arrivals are detected on the five-field
//! [`IdentityKey`](crate::models::IdentityKey), so a listing that only changed
//! its title or detail URL is not announced again. Removals and merge
//! deduplication use the six-field [`ListingKey`](crate::models::ListingKey),
//! so a listing that reappears under a different URL counts as removed and
//! re-added.

use crate::models::{IdentityKey, Listing, ListingKey, RemovedListing, StatusFlag};
use crate::snapshot::{strip_title_markers, Snapshot};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// The snapshot to persist: prior entries first, then incoming entries.
    pub merged: Snapshot,
    /// Prior entries with no six-field match in the incoming set, in prior order.
    pub removed: Vec<RemovedListing>,
    /// Incoming entries flagged new.
    pub new_count: usize,
    /// Entries dropped from the merged snapshot as duplicates.
    pub duplicate_count: usize,
}

impl Reconciliation {
    pub fn new_listings(&self) -> impl Iterator<Item = &Listing> {
        self.merged.new_listings()
    }

    pub fn has_changes(&self) -> bool {
        self.new_count > 0 || !self.removed.is_empty()
    }
}

/// Reconciles `prior` with the complete `incoming` result set of the same search.
///
/// Neither input is modified. An empty `prior` means every incoming listing is new.
pub fn reconcile(prior: &Snapshot, incoming: &[Listing]) -> Reconciliation {
    let prior = normalize_prior(prior.listings());
    let incoming = flag_new_arrivals(&prior, incoming);
    let removed = detect_removals(&prior, &incoming);
    let new_count = incoming.iter().filter(|l| l.is_new()).count();

    let total = prior.len() + incoming.len();
    let merged = merge_prior_first(prior, incoming);
    let duplicate_count = total - merged.len();

    debug!(
        merged = merged.len(),
        new = new_count,
        removed = removed.len(),
        duplicates = duplicate_count,
        "reconciled snapshot"
    );

    Reconciliation {
        merged: Snapshot::new(merged),
        removed,
        new_count,
        duplicate_count,
    }
}

/// Strips rendering leftovers from stored listings: title markers and the
/// flag of the previous refresh.
fn normalize_prior(prior: &[Listing]) -> Vec<Listing> {
    prior
        .iter()
        .map(|listing| Listing {
            title: strip_title_markers(&listing.title),
            status_flag: StatusFlag::Unflagged,
            ..listing.clone()
        })
        .collect()
}

fn flag_new_arrivals(prior: &[Listing], incoming: &[Listing]) -> Vec<Listing> {
    let known: HashSet<IdentityKey<'_>> = prior.iter().map(Listing::identity_key).collect();

    incoming
        .iter()
        .map(|listing| {
            let status_flag = if known.contains(&listing.identity_key()) {
                StatusFlag::Unflagged
            } else {
                StatusFlag::New
            };
            Listing {
                status_flag,
                ..listing.clone()
            }
        })
        .collect()
}

fn detect_removals(prior: &[Listing], incoming: &[Listing]) -> Vec<RemovedListing> {
    let current: HashSet<ListingKey<'_>> = incoming.iter().map(Listing::listing_key).collect();

    prior
        .iter()
        .filter(|listing| !current.contains(&listing.listing_key()))
        .map(RemovedListing::from)
        .collect()
}

/// Concatenates prior and incoming listings and keeps the first occurrence
/// of every listing key. Prior entries precede incoming ones, so a stored
/// listing always wins over its refetched duplicate and keeps its original
/// fetch time.
fn merge_prior_first(prior: Vec<Listing>, incoming: Vec<Listing>) -> Vec<Listing> {
    let combined: Vec<Listing> = prior.into_iter().chain(incoming).collect();

    let first_occurrence: Vec<bool> = {
        let mut seen: HashSet<ListingKey<'_>> = HashSet::with_capacity(combined.len());
        combined.iter().map(|l| seen.insert(l.listing_key())).collect()
    };

    combined
        .into_iter()
        .zip(first_occurrence)
        .filter_map(|(listing, keep)| keep.then_some(listing))
        .collect()
}
