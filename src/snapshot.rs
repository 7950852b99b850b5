use crate::models::{Listing, NEW_MARKER, UNFLAGGED_MARKER};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("malformed snapshot: {reason}")]
    MalformedSnapshot { index: Option<usize>, reason: String },
}

impl SnapshotError {
    pub(crate) fn document(reason: impl Into<String>) -> Self {
        SnapshotError::MalformedSnapshot {
            index: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn record(index: usize, reason: impl std::fmt::Display) -> Self {
        SnapshotError::MalformedSnapshot {
            index: Some(index),
            reason: format!("record {}: {}", index, reason),
        }
    }
}

/// The complete, ordered listing set of one named search.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    listings: Vec<Listing>,
}

impl Snapshot {
    pub fn new(listings: Vec<Listing>) -> Self {
        Self { listings }
    }

    pub fn listings(&self) -> &[Listing] {
        &self.listings
    }

    pub fn into_listings(self) -> Vec<Listing> {
        self.listings
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    pub fn new_listings(&self) -> impl Iterator<Item = &Listing> {
        self.listings.iter().filter(|l| l.is_new())
    }

    /// Decodes a persisted snapshot, rejecting anything that is not a uniform
    /// array of complete listing records.
    pub fn from_json_str(json: &str) -> Result<Self, SnapshotError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| SnapshotError::document(format!("invalid JSON: {}", e)))?;
        Self::from_json_value(value)
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<Self, SnapshotError> {
        let records = match value {
            serde_json::Value::Array(records) => records,
            other => {
                return Err(SnapshotError::document(format!(
                    "expected an array of listings, found {}",
                    json_kind(&other)
                )))
            }
        };

        let mut listings = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            if !record.is_object() {
                return Err(SnapshotError::record(
                    index,
                    format!("expected an object, found {}", json_kind(&record)),
                ));
            }
            let listing = Listing::deserialize(record).map_err(|e| SnapshotError::record(index, e))?;
            listings.push(listing);
        }

        Ok(Self { listings })
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.listings)
    }
}

/// Goes through the same record validation as [`Snapshot::from_json_value`].
impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Snapshot::from_json_value(value).map_err(serde::de::Error::custom)
    }
}

impl From<Vec<Listing>> for Snapshot {
    fn from(listings: Vec<Listing>) -> Self {
        Self::new(listings)
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Listing;
    type IntoIter = std::slice::Iter<'a, Listing>;

    fn into_iter(self) -> Self::IntoIter {
        self.listings.iter()
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Removes the flag markers earlier renderings may have left in a title.
///
/// Every occurrence is removed, including ones that were part of the
/// original title text.
pub fn strip_title_markers(title: &str) -> String {
    title.replace(NEW_MARKER, "").replace(UNFLAGGED_MARKER, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::listing;
    use crate::models::StatusFlag;

    #[test]
    fn strips_star_and_dash_everywhere() {
        assert_eq!(strip_title_markers("☆Foo-"), "Foo");
        assert_eq!(strip_title_markers("☆ リバーサイド-小杉"), " リバーサイド小杉");
        assert_eq!(strip_title_markers("Plain"), "Plain");
    }

    #[test]
    fn decodes_persisted_document() {
        let json = r#"[
            {
                "名前": "☆パークハウス",
                "価格": "8.5万円",
                "所在地": "東京都町田市原町田1",
                "間取り": "1LDK",
                "専有面積": "40.5m2",
                "築年数": "築5年 3階建",
                "取得日": "2024-10-01T12:34:56.123456",
                "URL": "https://suumo.jp/chintai/jnc_000001/",
                "フラグ": "☆"
            },
            {
                "名前": "コーポ",
                "価格": "6万円",
                "所在地": "東京都町田市森野2",
                "間取り": "1K",
                "専有面積": "20m2",
                "築年数": "築30年 2階建",
                "取得日": "2024-10-01T12:34:56",
                "URL": null,
                "フラグ": "-"
            }
        ]"#;

        let snapshot = Snapshot::from_json_str(json).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.listings()[0].status_flag, StatusFlag::New);
        assert_eq!(snapshot.listings()[1].detail_url, None);
        assert_eq!(snapshot.new_listings().count(), 1);
    }

    #[test]
    fn rejects_non_array_document() {
        let err = Snapshot::from_json_str(r#"{"名前": "x"}"#).unwrap_err();
        let SnapshotError::MalformedSnapshot { index, reason } = err;
        assert_eq!(index, None);
        assert!(reason.contains("array"));
    }

    #[test]
    fn rejects_record_missing_field() {
        let mut value = serde_json::to_value(vec![listing("Foo", "8万円", None)]).unwrap();
        value[0].as_object_mut().unwrap().remove("価格");
        let err = Snapshot::from_json_value(value).unwrap_err();
        let SnapshotError::MalformedSnapshot { index, reason } = err;
        assert_eq!(index, Some(0));
        assert!(reason.contains("価格"), "{}", reason);
    }

    #[test]
    fn rejects_mixed_collection() {
        let mut value = serde_json::to_value(vec![listing("Foo", "8万円", None)]).unwrap();
        value.as_array_mut().unwrap().push(serde_json::json!("not a listing"));
        let err = Snapshot::from_json_value(value).unwrap_err();
        let SnapshotError::MalformedSnapshot { index, .. } = err;
        assert_eq!(index, Some(1));
    }

    #[test]
    fn rejects_wrong_field_type() {
        let mut value = serde_json::to_value(vec![listing("Foo", "8万円", None)]).unwrap();
        value[0]["専有面積"] = serde_json::json!(40.5);
        assert!(Snapshot::from_json_value(value).is_err());
    }

    #[test]
    fn serde_decoding_reports_record_index() {
        let mut value = serde_json::to_value(vec![listing("Foo", "8万円", None)]).unwrap();
        value.as_array_mut().unwrap().push(serde_json::json!(42));
        let err = serde_json::from_value::<Snapshot>(value).unwrap_err();
        assert!(err.to_string().contains("malformed snapshot: record 1"), "{}", err);
    }

    #[test]
    fn json_string_round_trips() {
        let snapshot = Snapshot::new(vec![listing("Foo", "8万円", Some("https://suumo.jp/x"))]);
        let json = snapshot.to_json_string().unwrap();
        assert_eq!(Snapshot::from_json_str(&json).unwrap(), snapshot);
    }
}
