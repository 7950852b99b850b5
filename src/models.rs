use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Marker stored in the flag column for listings first seen in the latest refresh.
pub const NEW_MARKER: &str = "☆";
/// Marker stored in the flag column for everything else.
pub const UNFLAGGED_MARKER: &str = "-";

/// Placeholder the extractor records when a field is missing on the page.
pub const MISSING_FIELD: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFlag {
    #[default]
    Unflagged,
    New,
}

impl StatusFlag {
    pub fn marker(&self) -> &'static str {
        match self {
            StatusFlag::Unflagged => UNFLAGGED_MARKER,
            StatusFlag::New => NEW_MARKER,
        }
    }

    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker.trim() {
            NEW_MARKER => Some(StatusFlag::New),
            UNFLAGGED_MARKER => Some(StatusFlag::Unflagged),
            _ => None,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, StatusFlag::New)
    }
}

impl fmt::Display for StatusFlag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.marker())
    }
}

// The flag column holds the display markers, not variant names
impl Serialize for StatusFlag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.marker())
    }
}

impl<'de> Deserialize<'de> for StatusFlag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let marker = String::deserialize(deserializer)?;
        StatusFlag::from_marker(&marker).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "unknown flag marker {:?}, expected {:?} or {:?}",
                marker, NEW_MARKER, UNFLAGGED_MARKER
            ))
        })
    }
}

/// One rental advertisement as seen on a search-result page.
///
/// Field names on the wire are the portal's own column headings so that
/// snapshots written by earlier versions of the tool stay readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    #[serde(rename = "名前")]
    pub title: String,
    #[serde(rename = "価格")]
    pub price: String,
    #[serde(rename = "所在地")]
    pub address: String,
    #[serde(rename = "間取り")]
    pub floor_plan: String,
    #[serde(rename = "専有面積")]
    pub area: String,
    #[serde(rename = "築年数")]
    pub age_description: String,
    #[serde(rename = "取得日")]
    pub fetched_at: NaiveDateTime,
    #[serde(rename = "URL")]
    pub detail_url: Option<String>,
    #[serde(rename = "フラグ")]
    pub status_flag: StatusFlag,
}

/// Identity of a listing for new-arrival detection.
///
/// Two records with equal identity keys are the same physical offering even
/// when their detail URLs differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityKey<'a> {
    pub price: &'a str,
    pub address: &'a str,
    pub floor_plan: &'a str,
    pub area: &'a str,
    pub age_description: &'a str,
}

/// Stricter identity used for removal detection and merge deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListingKey<'a> {
    pub identity: IdentityKey<'a>,
    pub detail_url: Option<&'a str>,
}

impl Listing {
    /// The five-field identity: price, address, floor plan, area and age.
    pub fn identity_key(&self) -> IdentityKey<'_> {
        IdentityKey {
            price: self.price.trim(),
            address: self.address.trim(),
            floor_plan: self.floor_plan.trim(),
            area: self.area.trim(),
            age_description: self.age_description.trim(),
        }
    }

    /// The identity key extended with the detail URL.
    pub fn listing_key(&self) -> ListingKey<'_> {
        ListingKey {
            identity: self.identity_key(),
            detail_url: self.detail_url.as_deref().map(str::trim),
        }
    }

    pub fn is_new(&self) -> bool {
        self.status_flag.is_new()
    }
}

/// Column headings, in field order, shared by the JSON keys and the CSV header row.
pub const COLUMNS: [&str; 9] = [
    "名前", "価格", "所在地", "間取り", "専有面積", "築年数", "取得日", "URL", "フラグ",
];

/// A listing that disappeared from the search results, reduced to what is shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedListing {
    pub title: String,
    pub price: String,
    pub address: String,
    pub floor_plan: String,
    pub area: String,
    pub age_description: String,
    pub detail_url: Option<String>,
}

impl From<&Listing> for RemovedListing {
    fn from(listing: &Listing) -> Self {
        RemovedListing {
            title: listing.title.clone(),
            price: listing.price.clone(),
            address: listing.address.clone(),
            floor_plan: listing.floor_plan.clone(),
            area: listing.area.clone(),
            age_description: listing.age_description.clone(),
            detail_url: listing.detail_url.clone(),
        }
    }
}
