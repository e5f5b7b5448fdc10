use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::ApiError;
use crate::models::PhotoRecord;

/// One decoded page of the photo list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoPage {
    pub results: Vec<PhotoRecord>,
    /// Offset of the following page, when the server reports one.
    pub next_offset: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PageMeta {
    #[serde(default)]
    next_offset: Option<u64>,
}

/// Decode a response body.
///
/// Non-JSON bodies are an error. Valid JSON of an unknown shape is an empty
/// page. Records that cannot be decoded are skipped.
pub fn parse_page(body: &[u8]) -> Result<PhotoPage, ApiError> {
    let value: Value = serde_json::from_slice(body)?;

    let (items, meta) = match value {
        Value::Array(items) => (items, PageMeta::default()),
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => {
                let meta = map
                    .remove("meta")
                    .and_then(|m| serde_json::from_value::<PageMeta>(m).ok())
                    .unwrap_or_default();
                (items, meta)
            }
            _ => (Vec::new(), PageMeta::default()),
        },
        _ => (Vec::new(), PageMeta::default()),
    };

    let mut results = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<PhotoRecord>(item) {
            Ok(record) => results.push(record),
            Err(e) => warn!(index, error = %e, "Skipping malformed photo record"),
        }
    }

    Ok(PhotoPage {
        results,
        next_offset: meta.next_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PhotoId;

    #[test]
    fn test_bare_array() {
        let page = parse_page(br#"[{"id": 1, "image": "/a.jpg"}, {"id": 2}]"#).unwrap();
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.results[0].id, PhotoId::Number(1));
        assert_eq!(page.next_offset, None);
    }

    #[test]
    fn test_results_object_with_meta() {
        let body = br#"{
            "results": [{"id": 7, "title": "Fjord", "thumb": "t/7.jpg"}],
            "meta": {"count": 120, "limit": 50, "offset": 0, "next_offset": 50, "prev_offset": null}
        }"#;
        let page = parse_page(body).unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].title, "Fjord");
        assert_eq!(page.next_offset, Some(50));
    }

    #[test]
    fn test_unknown_shapes_are_empty() {
        for body in [&br#"{"photos": []}"#[..], br#"{"results": "nope"}"#, b"42", b"null"] {
            let page = parse_page(body).unwrap();
            assert!(page.results.is_empty());
        }
    }

    #[test]
    fn test_non_json_is_error() {
        let err = parse_page(b"<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, ApiError::MalformedPayload(_)));
    }

    #[test]
    fn test_malformed_record_skipped() {
        let page = parse_page(br#"[{"title": "no id"}, {"id": 3}]"#).unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].id, PhotoId::Number(3));
    }
}
