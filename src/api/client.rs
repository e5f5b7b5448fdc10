use reqwest::Client;
use tracing::{debug, info};

use super::payload::{parse_page, PhotoPage};
use crate::config::Config;
use crate::error::ApiError;
use crate::models::PhotoRecord;

/// Upper bound on pages followed in one fetch.
pub const MAX_PAGES: usize = 20;

#[derive(Debug, Clone)]
pub struct PhotoApi {
    client: Client,
    endpoint: String,
    folder: Option<String>,
    page_limit: Option<u32>,
}

/// Offset of the page to request after `current`, or `None` to stop.
/// A server that repeats the current offset would loop forever.
fn next_offset(current: Option<u64>, reported: Option<u64>) -> Option<u64> {
    match reported {
        Some(next) if Some(next) != current => Some(next),
        _ => None,
    }
}

impl PhotoApi {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.fetch_timeout).build()?;
        Ok(Self {
            client,
            endpoint: config.photos_endpoint(),
            folder: config.folder.clone(),
            page_limit: config.page_limit,
        })
    }

    /// Fetch the whole photo list, following server pagination.
    ///
    /// Pages are concatenated in order. Any failing page fails the fetch.
    pub async fn fetch_photos(&self) -> Result<Vec<PhotoRecord>, ApiError> {
        let mut photos = Vec::new();
        let mut offset = None;

        for page_index in 0..MAX_PAGES {
            let page = self.fetch_page(offset).await?;
            debug!(
                page_index,
                received = page.results.len(),
                next_offset = ?page.next_offset,
                "Fetched photo page"
            );
            photos.extend(page.results);

            match next_offset(offset, page.next_offset) {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        info!(count = photos.len(), endpoint = %self.endpoint, "Photo list loaded");
        Ok(photos)
    }

    fn page_query(&self, offset: Option<u64>) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(folder) = &self.folder {
            query.push(("folder", folder.clone()));
        }
        if let Some(limit) = self.page_limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }
        query
    }

    async fn fetch_page(&self, offset: Option<u64>) -> Result<PhotoPage, ApiError> {
        let url = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", self.endpoint)))?;

        let response = self
            .client
            .get(url)
            .query(&self.page_query(offset))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }

        let body = response.bytes().await?;
        parse_page(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PhotoId;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    type RequestLog = Arc<Mutex<Vec<String>>>;

    /// Local HTTP/1.1 responder. `respond` maps a request target to a status
    /// and JSON body. Returns the origin and the targets requested so far.
    async fn serve<F>(respond: F) -> (String, RequestLog)
    where
        F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
        let respond = Arc::new(respond);

        let requests = Arc::clone(&log);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let respond = Arc::clone(&respond);
                let requests = Arc::clone(&requests);
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&head);
                    let target = head.split_whitespace().nth(1).unwrap_or("").to_string();
                    requests.lock().push(target.clone());

                    let (status, body) = respond(&target);
                    let reply = format!(
                        "HTTP/1.1 {status} Status\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(reply.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (origin, log)
    }

    fn offset_of(target: &str) -> u64 {
        target
            .split(['?', '&'])
            .find_map(|pair| pair.strip_prefix("offset="))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    fn page(ids: &[u64], next: Option<u64>) -> String {
        let results: Vec<String> = ids.iter().map(|id| format!(r#"{{"id": {id}}}"#)).collect();
        let next = next.map_or("null".to_string(), |n| n.to_string());
        format!(
            r#"{{"results": [{}], "meta": {{"next_offset": {next}}}}}"#,
            results.join(",")
        )
    }

    fn api_for(origin: &str) -> PhotoApi {
        let config = Config {
            api_base: origin.to_string(),
            ..Config::default()
        };
        PhotoApi::new(&config).unwrap()
    }

    fn ids(photos: &[PhotoRecord]) -> Vec<PhotoId> {
        photos.iter().map(|p| p.id.clone()).collect()
    }

    #[test]
    fn test_endpoint_from_config() {
        let config = Config {
            api_base: "https://api.example/".into(),
            ..Config::default()
        };
        let api = PhotoApi::new(&config).unwrap();
        assert_eq!(api.endpoint, "https://api.example/api/photos/");
    }

    #[test]
    fn test_next_offset_stops_on_repeat() {
        assert_eq!(next_offset(None, Some(50)), Some(50));
        assert_eq!(next_offset(Some(50), Some(100)), Some(100));
        assert_eq!(next_offset(Some(50), Some(50)), None);
        assert_eq!(next_offset(Some(50), None), None);
    }

    #[test]
    fn test_page_query_parameters() {
        let config = Config {
            folder: Some("north".into()),
            page_limit: Some(25),
            ..Config::default()
        };
        let api = PhotoApi::new(&config).unwrap();
        assert_eq!(
            api.page_query(Some(50)),
            vec![
                ("folder", "north".to_string()),
                ("limit", "25".to_string()),
                ("offset", "50".to_string()),
            ]
        );
        assert!(api_for("http://x").page_query(None).is_empty());
    }

    #[tokio::test]
    async fn test_relative_endpoint_fails_without_request() {
        let config = Config {
            api_base: String::new(),
            ..Config::default()
        };
        let api = PhotoApi::new(&config).unwrap();
        let err = api.fetch_photos().await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_pages_followed_and_joined_in_order() {
        let (origin, log) = serve(|target| {
            let body = match offset_of(target) {
                0 => page(&[1, 2], Some(2)),
                2 => page(&[3, 4], Some(4)),
                _ => page(&[5], None),
            };
            (200, body)
        })
        .await;

        let config = Config {
            api_base: origin,
            folder: Some("north".into()),
            page_limit: Some(2),
            ..Config::default()
        };
        let photos = PhotoApi::new(&config).unwrap().fetch_photos().await.unwrap();

        let expected: Vec<PhotoId> = (1..=5).map(PhotoId::Number).collect();
        assert_eq!(ids(&photos), expected);

        let requests = log.lock().clone();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].starts_with("/api/photos/?"));
        assert!(requests[0].contains("folder=north"));
        assert!(requests[0].contains("limit=2"));
        assert!(!requests[0].contains("offset="));
        assert!(requests[1].contains("offset=2"));
        assert!(requests[2].contains("offset=4"));
    }

    #[tokio::test]
    async fn test_bare_array_is_single_page() {
        let (origin, log) = serve(|_| (200, r#"[{"id": 9}, {"id": "x"}]"#.to_string())).await;
        let photos = api_for(&origin).fetch_photos().await.unwrap();
        assert_eq!(ids(&photos), vec![PhotoId::Number(9), PhotoId::Text("x".into())]);
        assert_eq!(log.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_page_cap() {
        let (origin, log) = serve(|target| {
            let offset = offset_of(target);
            (200, page(&[offset], Some(offset + 1)))
        })
        .await;

        let photos = api_for(&origin).fetch_photos().await.unwrap();
        assert_eq!(photos.len(), MAX_PAGES);
        assert_eq!(log.lock().len(), MAX_PAGES);
    }

    #[tokio::test]
    async fn test_repeated_offset_ends_fetch() {
        let (origin, log) = serve(|target| match offset_of(target) {
            0 => (200, page(&[1], Some(5))),
            _ => (200, page(&[2], Some(5))),
        })
        .await;

        let photos = api_for(&origin).fetch_photos().await.unwrap();
        assert_eq!(ids(&photos), vec![PhotoId::Number(1), PhotoId::Number(2)]);
        assert_eq!(log.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_page_fails_fetch() {
        let (origin, _log) = serve(|target| match offset_of(target) {
            0 => (200, page(&[1, 2], Some(2))),
            _ => (500, r#"{"detail": "boom"}"#.to_string()),
        })
        .await;

        let err = api_for(&origin).fetch_photos().await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 500, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let (origin, _log) = serve(|_| (404, "[]".to_string())).await;
        let err = api_for(&origin).fetch_photos().await.unwrap_err();
        match err {
            ApiError::Status { status, url } => {
                assert_eq!(status, 404);
                assert!(url.ends_with("/api/photos/"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
