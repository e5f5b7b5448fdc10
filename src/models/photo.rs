use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use xxhash_rust::xxh3::xxh3_64;

/// Field names that have carried a thumbnail-sized image over the API's history.
pub const THUMBNAIL_FIELDS: &[&str] = &["thumb", "thumb_url", "thumbnail", "thumbnail_url"];
/// Field names for the mid-sized preview rendition.
pub const PREVIEW_FIELDS: &[&str] = &["preview", "preview_url"];
/// Generic image fields, used as the fallback for every rendition.
pub const GENERIC_FIELDS: &[&str] = &["image", "image_url", "url"];
/// Full-resolution fields.
pub const ORIGINAL_FIELDS: &[&str] = &["original", "original_url"];

/// A specific size variant of a photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rendition {
    Thumbnail,
    Preview,
    Original,
}

impl Rendition {
    /// Ordered field names to try when resolving this rendition.
    pub fn preference(self) -> Vec<&'static str> {
        let primary = match self {
            Self::Thumbnail => THUMBNAIL_FIELDS,
            Self::Preview => PREVIEW_FIELDS,
            Self::Original => ORIGINAL_FIELDS,
        };
        primary.iter().chain(GENERIC_FIELDS.iter()).copied().collect()
    }
}

/// Photo identifier as sent by the API (numeric ids on the current backend,
/// strings on older exports).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
pub enum PhotoId {
    Number(i64),
    Text(String),
}

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPhotoRecord {
    id: PhotoId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    blur_data_url: Option<String>,
    #[serde(flatten)]
    rest: HashMap<String, serde_json::Value>,
}

/// One photo entry from the API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawPhotoRecord")]
pub struct PhotoRecord {
    pub id: PhotoId,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub created_at: Option<String>,
    /// Inline low-resolution placeholder (`data:` URL).
    pub blur_data_url: Option<String>,
    /// Image location fields that were present and non-empty, keyed by wire name.
    image_fields: HashMap<String, String>,
}

impl From<RawPhotoRecord> for PhotoRecord {
    fn from(raw: RawPhotoRecord) -> Self {
        let known = THUMBNAIL_FIELDS
            .iter()
            .chain(PREVIEW_FIELDS)
            .chain(GENERIC_FIELDS)
            .chain(ORIGINAL_FIELDS);

        let mut image_fields = HashMap::new();
        for name in known {
            if let Some(serde_json::Value::String(value)) = raw.rest.get(*name) {
                if !value.trim().is_empty() {
                    image_fields.insert((*name).to_string(), value.clone());
                }
            }
        }

        Self {
            id: raw.id,
            title: raw.title.unwrap_or_default(),
            description: raw.description.unwrap_or_default(),
            category: raw.category.filter(|c| !c.is_empty()),
            created_at: raw.created_at,
            blur_data_url: raw.blur_data_url.filter(|b| !b.is_empty()),
            image_fields,
        }
    }
}

impl PhotoRecord {
    pub fn image_field(&self, name: &str) -> Option<&str> {
        self.image_fields.get(name).map(String::as_str)
    }

    /// Resolve a rendition against the API origin.
    pub fn url(&self, rendition: Rendition, base: &str) -> String {
        resolve(self, &rendition.preference(), base)
    }
}

#[cfg(test)]
impl PhotoRecord {
    /// Create a record with no image fields.
    pub fn new(id: PhotoId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            category: None,
            created_at: None,
            blur_data_url: None,
            image_fields: HashMap::new(),
        }
    }

    /// Set an image location field. Empty values are ignored.
    pub fn with_image_field(mut self, name: &str, value: &str) -> Self {
        if !value.trim().is_empty() {
            self.image_fields.insert(name.to_string(), value.to_string());
        }
        self
    }

    pub fn has_image(&self) -> bool {
        !self.image_fields.is_empty()
    }
}

fn is_absolute_url(value: &str) -> bool {
    let lower = value.get(..8).unwrap_or(value).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Derive a fetchable URL from the first non-empty field in `preference`.
///
/// Absolute `http(s)` values are returned unchanged; anything else is joined
/// onto `base` with exactly one `/`. The base itself is not validated.
/// Returns an empty string when no preferred field is present.
pub fn resolve(record: &PhotoRecord, preference: &[&str], base: &str) -> String {
    let Some(value) = preference.iter().find_map(|name| record.image_field(name)) else {
        return String::new();
    };

    if is_absolute_url(value) {
        return value.to_string();
    }

    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        value.trim_start_matches('/')
    )
}

/// Content hash of a photo list: ids and grid URLs in order.
///
/// Two lists with the same hash need no re-probing.
pub fn list_hash(records: &[Arc<PhotoRecord>], base: &str) -> u64 {
    let mut hasher_input = Vec::with_capacity(records.len() * 64);

    for record in records {
        hasher_input.extend_from_slice(record.id.to_string().as_bytes());
        hasher_input.push(0);
        hasher_input.extend_from_slice(record.url(Rendition::Thumbnail, base).as_bytes());
        hasher_input.push(0);
    }

    xxh3_64(&hasher_input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> PhotoRecord {
        serde_json::from_str(json).expect("valid record")
    }

    #[test]
    fn test_relative_thumbnail_gets_base() {
        let record = parse(r#"{"id": 1, "thumbnail_url": "media/thumbs/1.jpg"}"#);
        let url = record.url(Rendition::Thumbnail, "https://img.example");
        assert_eq!(url, "https://img.example/media/thumbs/1.jpg");
    }

    #[test]
    fn test_absolute_url_unchanged() {
        let record = parse(r#"{"id": 1, "thumb": "HTTPS://cdn.example/a.jpg"}"#);
        assert_eq!(
            record.url(Rendition::Thumbnail, "https://img.example"),
            "HTTPS://cdn.example/a.jpg"
        );
    }

    #[test]
    fn test_single_separator_join() {
        let record = parse(r#"{"id": 1, "image": "//a.jpg"}"#);
        assert_eq!(
            record.url(Rendition::Thumbnail, "https://img.example///"),
            "https://img.example/a.jpg"
        );
    }

    #[test]
    fn test_two_record_listing() {
        let records: Vec<PhotoRecord> = serde_json::from_str(
            r#"[{"id": 1, "image": "/a.jpg"}, {"id": 2, "thumbnail_url": "t.jpg"}]"#,
        )
        .unwrap();
        let urls: Vec<String> = records
            .iter()
            .map(|r| r.url(Rendition::Thumbnail, "https://img.example"))
            .collect();
        assert_eq!(urls, ["https://img.example/a.jpg", "https://img.example/t.jpg"]);
    }

    #[test]
    fn test_no_image_fields_resolves_empty() {
        let record = parse(r#"{"id": 3, "title": "Blank", "image": "", "thumb": null}"#);
        assert!(!record.has_image());
        for rendition in [Rendition::Thumbnail, Rendition::Preview, Rendition::Original] {
            assert_eq!(record.url(rendition, "https://img.example"), "");
        }
    }

    #[test]
    fn test_preview_preferred_for_detail() {
        let record = parse(r#"{"id": 4, "image": "full.jpg", "preview": "p.jpg", "thumb": "t.jpg"}"#);
        assert_eq!(record.url(Rendition::Preview, "http://h"), "http://h/p.jpg");
        assert_eq!(record.url(Rendition::Thumbnail, "http://h"), "http://h/t.jpg");
        assert_eq!(record.url(Rendition::Original, "http://h"), "http://h/full.jpg");
    }

    #[test]
    fn test_empty_base_gives_relative_path() {
        let record = parse(r#"{"id": 5, "image": "media/a.jpg"}"#);
        assert_eq!(record.url(Rendition::Thumbnail, ""), "/media/a.jpg");
    }

    #[test]
    fn test_base_without_scheme_passes_through() {
        let record = parse(r#"{"id": 5, "image": "a.jpg"}"#);
        assert_eq!(record.url(Rendition::Thumbnail, "img.example"), "img.example/a.jpg");
    }

    #[test]
    fn test_string_id_and_missing_text() {
        let record = parse(r#"{"id": "abc", "blur_data_url": ""}"#);
        assert_eq!(record.id, PhotoId::Text("abc".into()));
        assert_eq!(record.title, "");
        assert_eq!(record.description, "");
        assert!(record.blur_data_url.is_none());
    }

    #[test]
    fn test_list_hash_tracks_content() {
        let a = Arc::new(PhotoRecord::new(PhotoId::Number(1), "a").with_image_field("image", "a.jpg"));
        let b = Arc::new(PhotoRecord::new(PhotoId::Number(2), "b").with_image_field("image", "b.jpg"));

        let h1 = list_hash(&[a.clone(), b.clone()], "http://h");
        let h2 = list_hash(&[a.clone(), b.clone()], "http://h");
        let h3 = list_hash(&[b, a], "http://h");

        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }
}
