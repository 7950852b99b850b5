//! Text rendering of snapshots. Nothing here modifies a listing.

use crate::models::{Listing, RemovedListing, NEW_MARKER};

const MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/?api=1&query=";

/// The title as shown to the user: new listings get a leading star.
pub fn display_title(listing: &Listing) -> String {
    if listing.is_new() {
        format!("{} {}", NEW_MARKER, listing.title)
    } else {
        listing.title.clone()
    }
}

/// A map search link for an address. No geocoding takes place.
pub fn map_link(address: &str) -> String {
    format!("{}{}", MAPS_SEARCH_URL, urlencoding::encode(address.trim()))
}

pub fn detail_block(listing: &Listing) -> String {
    let mut block = String::new();
    block.push_str(&format!("### {}\n", display_title(listing)));
    block.push_str(&format!(
        "Price: {}  Address: {}  Layout: {}  Area: {}  Age: {}\n",
        listing.price, listing.address, listing.floor_plan, listing.area, listing.age_description
    ));
    block.push_str(&format!(
        "Fetched: {}\n",
        listing.fetched_at.format("%Y-%m-%d %H:%M")
    ));
    match &listing.detail_url {
        Some(url) => block.push_str(&format!("Details: {}\n", url)),
        None => block.push_str("Details: (no link)\n"),
    }
    block.push_str(&format!("Map: {}\n", map_link(&listing.address)));
    block
}

/// One line per listing with every field and the flag marker.
pub fn listing_table(listings: &[Listing]) -> Vec<String> {
    listings
        .iter()
        .map(|l| {
            format!(
                "{} | {} | {} | {} | {} | {} | {} | {}",
                l.status_flag,
                l.title,
                l.price,
                l.address,
                l.floor_plan,
                l.area,
                l.age_description,
                l.detail_url.as_deref().unwrap_or("-")
            )
        })
        .collect()
}

pub fn removed_table(removed: &[RemovedListing]) -> Vec<String> {
    removed
        .iter()
        .map(|r| {
            format!(
                "{} | {} | {} | {} | {} | {} | {}",
                r.title,
                r.price,
                r.address,
                r.floor_plan,
                r.area,
                r.age_description,
                r.detail_url.as_deref().unwrap_or("-")
            )
        })
        .collect()
}
