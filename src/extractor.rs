use crate::models::{Listing, StatusFlag, MISSING_FIELD};
use anyhow::Result;
use chrono::NaiveDateTime;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

const SITE_ROOT: &str = "https://suumo.jp";

const ITEM_SELECTOR: &str = ".cassetteitem";
const TITLE_SELECTOR: &str = ".cassetteitem_content-title";
const DETAIL_LINK_SELECTOR: &str = ".cassetteitem_other .js-cassette_link_href";
const PRICE_SELECTOR: &str = ".cassetteitem_price--rent";
const ADDRESS_SELECTOR: &str = ".cassetteitem_detail-col1";
const FLOOR_PLAN_SELECTOR: &str = ".cassetteitem_madori";
const AREA_SELECTOR: &str = ".cassetteitem_menseki";
const AGE_SELECTOR: &str = ".cassetteitem_detail-col3";

struct ItemSelectors {
    title: Selector,
    detail_link: Selector,
    price: Selector,
    address: Selector,
    floor_plan: Selector,
    area: Selector,
    age: Selector,
}

impl ItemSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            title: parse_selector(TITLE_SELECTOR)?,
            detail_link: parse_selector(DETAIL_LINK_SELECTOR)?,
            price: parse_selector(PRICE_SELECTOR)?,
            address: parse_selector(ADDRESS_SELECTOR)?,
            floor_plan: parse_selector(FLOOR_PLAN_SELECTOR)?,
            area: parse_selector(AREA_SELECTOR)?,
            age: parse_selector(AGE_SELECTOR)?,
        })
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| anyhow::anyhow!("Failed to parse selector {}: {:?}", selector, e))
}

/// Extracts every listing on one search-result page.
///
/// An empty result means the page has no listings, which is how the fetcher
/// detects the end of pagination.
pub fn extract_listings(html: &str, fetched_at: NaiveDateTime) -> Result<Vec<Listing>> {
    let document = Html::parse_document(html);
    let item_selector = parse_selector(ITEM_SELECTOR)?;
    let selectors = ItemSelectors::new()?;

    let listings: Vec<Listing> = document
        .select(&item_selector)
        .map(|item| extract_listing(item, &selectors, fetched_at))
        .collect();

    debug!("Extracted {} listings from page", listings.len());
    Ok(listings)
}

fn extract_listing(item: ElementRef, selectors: &ItemSelectors, fetched_at: NaiveDateTime) -> Listing {
    let detail_url = item
        .select(&selectors.detail_link)
        .next()
        .and_then(|link| link.value().attr("href"))
        .map(absolute_url);

    Listing {
        title: trimmed_text(item, &selectors.title),
        price: trimmed_text(item, &selectors.price),
        address: trimmed_text(item, &selectors.address),
        floor_plan: trimmed_text(item, &selectors.floor_plan),
        area: trimmed_text(item, &selectors.area),
        age_description: joined_text(item, &selectors.age),
        fetched_at,
        detail_url,
        status_flag: StatusFlag::Unflagged,
    }
}

fn absolute_url(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", SITE_ROOT, href)
    }
}

fn trimmed_text(item: ElementRef, selector: &Selector) -> String {
    item.select(selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .unwrap_or_else(|| MISSING_FIELD.to_string())
}

// Building age and height sit in separate child nodes; keep them apart with one space
fn joined_text(item: ElementRef, selector: &Selector) -> String {
    item.select(selector)
        .next()
        .map(|element| {
            element
                .text()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_else(|| MISSING_FIELD.to_string())
}
