use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use base64::prelude::*;
use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Byte budget of the shared image cache.
pub const IMAGE_CACHE_BYTES: usize = 96 * 1024 * 1024;

/// Something that can hand over the raw bytes behind an image URL.
pub trait ImageSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Plain `GET` against each URL.
pub struct HttpImageSource {
    client: reqwest::blocking::Client,
}

impl HttpImageSource {
    /// Must not be called from inside an async runtime.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl ImageSource for HttpImageSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if url.is_empty() {
            bail!("No image URL");
        }
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Failed to request image: {url}"))?
            .error_for_status()
            .with_context(|| format!("Image request rejected: {url}"))?;
        let bytes = response
            .bytes()
            .with_context(|| format!("Failed to read image body: {url}"))?;
        Ok(bytes.to_vec())
    }
}

type SharedFetch = Arc<OnceCell<Result<Arc<Vec<u8>>, String>>>;

struct ByteCache {
    entries: lru::LruCache<String, Arc<Vec<u8>>>,
    total_bytes: usize,
    max_bytes: usize,
}

impl ByteCache {
    fn insert(&mut self, url: &str, bytes: Arc<Vec<u8>>) {
        if bytes.len() > self.max_bytes {
            return;
        }
        self.total_bytes += bytes.len();
        if let Some(old) = self.entries.put(url.to_string(), bytes) {
            self.total_bytes -= old.len();
        }
        while self.total_bytes > self.max_bytes {
            match self.entries.pop_lru() {
                Some((evicted, old)) => {
                    trace!(url = %evicted, bytes = old.len(), "Evicted cached image");
                    self.total_bytes -= old.len();
                }
                None => break,
            }
        }
    }
}

/// Shares image bytes between the ratio probes and texture loading.
///
/// Successful fetches are kept in a byte-bounded LRU. Concurrent requests
/// for the same URL wait on a single fetch.
pub struct CachedImageSource {
    inner: Arc<dyn ImageSource>,
    cache: Mutex<ByteCache>,
    in_flight: Mutex<HashMap<String, SharedFetch>>,
}

impl CachedImageSource {
    pub fn new(inner: Arc<dyn ImageSource>, max_bytes: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(ByteCache {
                entries: lru::LruCache::unbounded(),
                total_bytes: 0,
                max_bytes,
            }),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn cached_bytes(&self) -> usize {
        self.cache.lock().total_bytes
    }
}

impl ImageSource for CachedImageSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(bytes) = self.cache.lock().entries.get(url) {
            trace!(%url, "Image cache hit");
            return Ok(bytes.as_ref().clone());
        }

        let shared = Arc::clone(
            self.in_flight
                .lock()
                .entry(url.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        );

        let result = shared
            .get_or_init(|| {
                let fetched = self.inner.fetch(url).map(Arc::new);
                match &fetched {
                    Ok(bytes) => self.cache.lock().insert(url, Arc::clone(bytes)),
                    Err(e) => debug!(%url, error = %e, "Image fetch failed"),
                }
                fetched.map_err(|e| format!("{e:#}"))
            })
            .clone();

        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.get(url).is_some_and(|cell| Arc::ptr_eq(cell, &shared)) {
                in_flight.remove(url);
            }
        }

        result
            .map(|bytes| bytes.as_ref().clone())
            .map_err(|e| anyhow!(e))
    }
}

#[derive(Debug)]
struct DecodeRequest {
    key: String,
    url: String,
    max_size: u32,
}

/// Pixels for one submitted request. `rgba` is `None` when the image could
/// not be fetched or decoded.
#[derive(Debug)]
pub struct DecodedImage {
    pub key: String,
    pub rgba: Option<Vec<u8>>,
    pub width: u32,
    pub height: u32,
}

/// Fetch-and-decode workers. Requests are queued without limit and every
/// submitted request produces exactly one result.
pub struct DecodePool {
    request_tx: flume::Sender<DecodeRequest>,
    result_rx: flume::Receiver<DecodedImage>,
}

impl DecodePool {
    pub fn new(threads: usize, source: Arc<dyn ImageSource>) -> Self {
        let (request_tx, request_rx) = flume::unbounded::<DecodeRequest>();
        let (result_tx, result_rx) = flume::unbounded::<DecodedImage>();

        for worker_id in 0..threads.max(1) {
            let rx = request_rx.clone();
            let tx = result_tx.clone();
            let source = Arc::clone(&source);
            let spawned = std::thread::Builder::new()
                .name(format!("image-decode-{}", worker_id))
                .spawn(move || {
                    while let Ok(req) = rx.recv() {
                        let decoded = source
                            .fetch(&req.url)
                            .and_then(|bytes| decode_rgba(&bytes, req.max_size));
                        let result = match decoded {
                            Ok((rgba, width, height)) => DecodedImage {
                                key: req.key,
                                rgba: Some(rgba),
                                width,
                                height,
                            },
                            Err(e) => {
                                debug!(url = %req.url, error = %e, "Image load failed");
                                DecodedImage {
                                    key: req.key,
                                    rgba: None,
                                    width: 0,
                                    height: 0,
                                }
                            }
                        };
                        if tx.send(result).is_err() {
                            break;
                        }
                    }
                });
            if let Err(e) = spawned {
                tracing::error!(worker_id, error = ?e, "Failed to spawn decode worker");
            }
        }

        Self {
            request_tx,
            result_rx,
        }
    }

    /// Queue a request. Only fails when every worker has exited.
    pub fn submit(&self, key: &str, url: &str, max_size: u32) -> bool {
        self.request_tx
            .send(DecodeRequest {
                key: key.to_string(),
                url: url.to_string(),
                max_size,
            })
            .is_ok()
    }

    pub fn try_recv(&self) -> Option<DecodedImage> {
        self.result_rx.try_recv().ok()
    }

    #[cfg(test)]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<DecodedImage> {
        self.result_rx.recv_timeout(timeout).ok()
    }
}

pub fn open_image(bytes: &[u8]) -> Result<DynamicImage> {
    let format = image::guess_format(bytes).ok();

    if format == Some(ImageFormat::Gif) {
        let decoder = GifDecoder::new(Cursor::new(bytes)).context("Failed to decode GIF")?;
        let mut frames = decoder.into_frames();
        if let Some(frame) = frames.next() {
            let frame = frame.context("Failed to decode GIF frame")?;
            return Ok(DynamicImage::ImageRgba8(frame.into_buffer()));
        }
        return Err(anyhow!("GIF has no frames"));
    }

    match format {
        Some(fmt) => image::load_from_memory_with_format(bytes, fmt).context("Failed to decode image"),
        None => image::load_from_memory(bytes).context("Failed to decode image"),
    }
}

/// Read width and height from the image header without decoding pixels.
pub fn read_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("Failed to guess image format")?;
    reader
        .into_dimensions()
        .context("Failed to read dimensions")
}

/// Decode and downscale to fit `max_size`, returning RGBA pixels.
pub fn decode_rgba(bytes: &[u8], max_size: u32) -> Result<(Vec<u8>, u32, u32)> {
    let img = open_image(bytes)?;
    let img = if img.width() > max_size || img.height() > max_size {
        img.thumbnail(max_size, max_size)
    } else {
        img
    };
    let (width, height) = img.dimensions();
    Ok((img.to_rgba8().into_raw(), width.max(1), height.max(1)))
}

/// Payload of a base64 `data:` URL.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>> {
    let rest = data_url
        .strip_prefix("data:")
        .context("Not a data URL")?;
    let (header, payload) = rest.split_once(',').context("Data URL has no payload")?;
    if !header.ends_with(";base64") {
        bail!("Only base64 data URLs are supported");
    }
    BASE64_STANDARD
        .decode(payload.trim())
        .context("Invalid base64 payload")
}

#[cfg(test)]
pub(crate) fn encode_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([40, 40, 40, 255]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, ImageFormat::Png)
        .expect("png encode");
    out.into_inner()
}

/// Serves images from memory, counting fetches and concurrent fetches.
#[cfg(test)]
pub(crate) struct MemorySource {
    images: HashMap<String, Vec<u8>>,
    pub fetches: std::sync::atomic::AtomicUsize,
    pub delay: Option<Duration>,
    pub delay_for: Option<(String, Duration)>,
    in_flight: std::sync::atomic::AtomicUsize,
    pub max_in_flight: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MemorySource {
    pub fn new(images: &[(&str, Vec<u8>)]) -> Self {
        Self {
            images: images
                .iter()
                .map(|(url, bytes)| (url.to_string(), bytes.clone()))
                .collect(),
            fetches: Default::default(),
            delay: None,
            delay_for: None,
            in_flight: Default::default(),
            max_in_flight: Default::default(),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl ImageSource for MemorySource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        use std::sync::atomic::Ordering;

        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let mut delay = self.delay;
        if let Some((slow_url, slow)) = &self.delay_for {
            if slow_url == url {
                delay = Some(*slow);
            }
        }
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let result = self
            .images
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("404 {url}"));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_dimensions() {
        let png = encode_png(30, 20);
        assert_eq!(read_dimensions(&png).unwrap(), (30, 20));
    }

    #[test]
    fn test_corrupt_bytes_fail() {
        assert!(read_dimensions(b"definitely not an image").is_err());
        assert!(open_image(b"").is_err());
    }

    #[test]
    fn test_decode_rgba_downscales() {
        let png = encode_png(400, 200);
        let (rgba, w, h) = decode_rgba(&png, 100).unwrap();
        assert_eq!((w, h), (100, 50));
        assert_eq!(rgba.len(), (w * h * 4) as usize);
    }

    #[test]
    fn test_data_url_roundtrip() {
        let png = encode_png(4, 4);
        let url = format!("data:image/png;base64,{}", BASE64_STANDARD.encode(&png));
        assert_eq!(decode_data_url(&url).unwrap(), png);
        assert!(decode_data_url("data:image/png,raw").is_err());
        assert!(decode_data_url("https://x/y.png").is_err());
    }

    fn pngs(count: usize) -> Vec<(String, Vec<u8>)> {
        (0..count)
            .map(|i| (format!("http://img.test/{i}.png"), encode_png(4, 2)))
            .collect()
    }

    #[test]
    fn test_cache_serves_repeat_fetches() {
        let png = encode_png(8, 8);
        let memory = Arc::new(MemorySource::new(&[("http://img.test/a.png", png.clone())]));
        let cached = CachedImageSource::new(memory.clone(), IMAGE_CACHE_BYTES);

        assert_eq!(cached.fetch("http://img.test/a.png").unwrap(), png);
        assert_eq!(cached.fetch("http://img.test/a.png").unwrap(), png);
        assert_eq!(memory.fetch_count(), 1);
        assert_eq!(cached.cached_bytes(), png.len());
    }

    #[test]
    fn test_cache_joins_concurrent_fetches() {
        let mut memory = MemorySource::new(&[("http://img.test/a.png", encode_png(8, 8))]);
        memory.delay = Some(Duration::from_millis(100));
        let memory = Arc::new(memory);
        let cached = Arc::new(CachedImageSource::new(memory.clone(), IMAGE_CACHE_BYTES));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cached = Arc::clone(&cached);
                std::thread::spawn(move || cached.fetch("http://img.test/a.png").is_ok())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(memory.fetch_count(), 1);
    }

    #[test]
    fn test_cache_failures_not_kept() {
        let memory = Arc::new(MemorySource::new(&[]));
        let cached = CachedImageSource::new(memory.clone(), IMAGE_CACHE_BYTES);
        assert!(cached.fetch("http://img.test/missing.png").is_err());
        assert!(cached.fetch("http://img.test/missing.png").is_err());
        assert_eq!(memory.fetch_count(), 2);
        assert_eq!(cached.cached_bytes(), 0);
    }

    #[test]
    fn test_cache_evicts_to_byte_budget() {
        let images = pngs(3);
        let refs: Vec<(&str, Vec<u8>)> =
            images.iter().map(|(u, b)| (u.as_str(), b.clone())).collect();
        let one = images[0].1.len();
        let memory = Arc::new(MemorySource::new(&refs));
        let cached = CachedImageSource::new(memory.clone(), one * 2);

        for (url, _) in &images {
            cached.fetch(url).unwrap();
        }
        assert!(cached.cached_bytes() <= one * 2);
        // Oldest entry was evicted and is fetched again.
        cached.fetch(&images[0].0).unwrap();
        assert_eq!(memory.fetch_count(), 4);
    }

    #[test]
    fn test_decode_pool_never_drops_requests() {
        let count = 700;
        let images = pngs(count);
        let refs: Vec<(&str, Vec<u8>)> =
            images.iter().map(|(u, b)| (u.as_str(), b.clone())).collect();
        let pool = DecodePool::new(2, Arc::new(MemorySource::new(&refs)));

        for (url, _) in &images {
            assert!(pool.submit(url, url, 64));
        }

        let mut decoded = 0;
        for _ in 0..count {
            let result = pool
                .recv_timeout(Duration::from_secs(10))
                .expect("every request yields a result");
            assert!(result.rgba.is_some(), "{} reported broken", result.key);
            assert_eq!((result.width, result.height), (4, 2));
            decoded += 1;
        }
        assert_eq!(decoded, count);
        assert!(pool.try_recv().is_none());
    }

    #[test]
    fn test_decode_pool_reports_failures() {
        let pool = DecodePool::new(1, Arc::new(MemorySource::new(&[])));
        assert!(pool.submit("k", "http://img.test/gone.png", 64));
        let result = pool.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result.key, "k");
        assert!(result.rgba.is_none());
    }
}
