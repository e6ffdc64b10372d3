//! Domain entities mirrored from persistent storage.
//!
//! These records double as the JSON wire model: the HTTP layer serializes them as-is and the
//! read-through cache stores exactly the same representation.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// An aggregated story: a cluster of source articles merged into one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: u64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "date", with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    #[serde(rename = "rewrite", default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosure: Option<String>,
    #[serde(rename = "isRT")]
    pub is_realtime: bool,
    #[serde(rename = "views")]
    pub views_count: u64,
    pub sources: Vec<SourceRecord>,
}

impl GroupRecord {
    /// Restore the source ordering invariant: newest first, ties by ascending source id.
    pub fn order_sources(&mut self) {
        self.sources
            .sort_by(|a, b| b.time.cmp(&a.time).then_with(|| a.id.cmp(&b.id)));
    }
}

/// One ingested article contributing to a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: u64,
    pub title: String,
    #[serde(rename = "name")]
    pub source_name: String,
    #[serde(rename = "pubDate", with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "fullText", default)]
    pub full_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosure: Option<String>,
}

/// Denormalized projection of a group used by the listing endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListEntry {
    pub id: u64,
    #[serde(rename = "date", with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosure: Option<String>,
    #[serde(rename = "isRT")]
    pub is_realtime: bool,
    #[serde(rename = "sourceName")]
    pub source_name: String,
}

/// Pending view increments for one group, drained from the fast cache in a single batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewDelta {
    pub group_id: u64,
    pub delta: u64,
}
