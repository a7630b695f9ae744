//! Typed shapes exchanged with source and tracker runners.
//!
//! Field names follow the camelCase convention runner scripts use. Shapes
//! are deliberately lenient: optional fields default, and anything a runner
//! adds beyond them is ignored.

use runner_runtime::DynamicValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary of a content item as shown in listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub info: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublicationStatus {
    Ongoing,
    Completed,
    Cancelled,
    NotPublished,
    Hiatus,
    Unknown,
}

/// A named group of tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub nsfw: bool,
}

/// Full details of a content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub title: String,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub additional_titles: Option<Vec<String>>,
    #[serde(default)]
    pub creators: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<PublicationStatus>,
    #[serde(default)]
    pub is_nsfw: bool,
    #[serde(default)]
    pub properties: Option<Vec<Property>>,
    #[serde(default)]
    pub web_url: Option<String>,
    /// Some runners return the chapter list together with the details.
    #[serde(default)]
    pub chapters: Option<Vec<Chapter>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub chapter_id: String,
    pub number: f64,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub date: Option<f64>,
    pub index: u32,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterPage {
    pub url: String,
    #[serde(default)]
    pub raw: Option<String>,
}

/// Readable payload of a chapter: image pages or text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterData {
    #[serde(default)]
    pub pages: Option<Vec<ChapterPage>>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Query sent to a runner's directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub page: u32,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "configID")]
    pub config_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<DynamicValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<DynamicValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<DynamicValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult {
    pub results: Vec<Highlight>,
    pub is_last_page: bool,
    #[serde(default)]
    pub total_result_count: Option<u64>,
}

/// Search and filter options a runner offers for its directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryConfig {
    #[serde(default)]
    pub filters: Vec<DynamicValue>,
    #[serde(default)]
    pub sort: Option<DynamicValue>,
    #[serde(default)]
    pub search_fields: Vec<DynamicValue>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, DynamicValue>,
}

/// A link into a runner-defined page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLink {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<DynamicValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSection {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<Highlight>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackStatus {
    Current,
    Planned,
    Completed,
    Dropped,
    Paused,
    Rereading,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackProgress {
    pub last_read_chapter: f64,
    #[serde(default)]
    pub last_read_volume: Option<f64>,
    #[serde(default)]
    pub max_available_chapter: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEntry {
    pub status: TrackStatus,
    pub progress: TrackProgress,
}

/// A title as known to the tracking service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub entry: Option<TrackEntry>,
}

/// Progress reported to a tracker after reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackProgressUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

/// Form the host renders for editing a tracked entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryForm {
    pub sections: Vec<DynamicValue>,
}

/// Account signed in to a runner's service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub handle: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub info: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use runner_runtime::{decode, encode};
    use serde_json::json;

    #[test]
    fn test_directory_request_wire_names() {
        let request = DirectoryRequest {
            query: Some("one piece".to_string()),
            page: 2,
            config_id: Some("popular".to_string()),
            ..Default::default()
        };
        let value = encode(&request).unwrap();
        assert_eq!(value.get("configID").and_then(|v| v.as_str()), Some("popular"));
        assert_eq!(value.get("page").and_then(|v| v.as_f64()), Some(2.0));
        assert!(value.get("sort").is_none());
    }

    #[test]
    fn test_chapter_list_decodes_with_defaults() {
        let value = DynamicValue::from(json!([
            { "chapterId": "c1", "number": 1, "index": 0 },
            { "chapterId": "c2", "number": 1.5, "index": 1, "language": "en", "volume": 1 }
        ]));
        let chapters: Vec<Chapter> = decode(&value).unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[1].number, 1.5);
        assert_eq!(chapters[1].volume, Some(1.0));
        assert!(chapters[0].title.is_none());
    }

    #[test]
    fn test_track_item_status_names() {
        let value = DynamicValue::from(json!({
            "id": "t1",
            "title": "Tracked",
            "entry": { "status": "REREADING", "progress": { "lastReadChapter": 10 } }
        }));
        let item: TrackItem = decode(&value).unwrap();
        let entry = item.entry.unwrap();
        assert_eq!(entry.status, TrackStatus::Rereading);
        assert_eq!(entry.progress.last_read_chapter, 10.0);
    }
}
