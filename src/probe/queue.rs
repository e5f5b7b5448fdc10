//! Worker queue for aspect-ratio probes.
//!
//! - Bounded worker pool, one job per photo
//! - Failed or empty probes resolve to the neutral ratio
//! - Results are collected per batch and published as one table
//! - Identical lists (same content hash) are not probed twice

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::config::MAX_PROBE_WORKERS;
use crate::image_loader::{read_dimensions, ImageSource};
use crate::models::{list_hash, AspectRatioTable, PhotoRecord, Rendition, NEUTRAL_RATIO};

/// A single probe request.
struct ProbeJob {
    index: usize,
    url: String,
    cancelled: Arc<AtomicBool>,
    reply: Sender<ProbeOutcome>,
}

/// Result of one probe, sent back to the batch that issued it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeOutcome {
    pub index: usize,
    pub ratio: f32,
}

/// Outstanding probes for one photo list.
pub struct ProbeBatch {
    list_hash: u64,
    len: usize,
    result_rx: Receiver<ProbeOutcome>,
    cancelled: Arc<AtomicBool>,
    last_probed: Arc<Mutex<Option<u64>>>,
}

/// Handle that cancels a batch from elsewhere.
#[derive(Clone)]
pub struct ProbeCancel {
    list_hash: u64,
    cancelled: Arc<AtomicBool>,
    last_probed: Arc<Mutex<Option<u64>>>,
}

impl ProbeCancel {
    /// Skip the batch's queued jobs. The list becomes eligible for probing again.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            let mut last = self.last_probed.lock();
            if *last == Some(self.list_hash) {
                *last = None;
            }
            debug!(list_hash = self.list_hash, "Cancelled probe batch");
        }
    }

    #[cfg(test)]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl ProbeBatch {
    pub fn cancel_handle(&self) -> ProbeCancel {
        ProbeCancel {
            list_hash: self.list_hash,
            cancelled: Arc::clone(&self.cancelled),
            last_probed: Arc::clone(&self.last_probed),
        }
    }

    /// Wait for every probe of the batch on the current thread.
    #[cfg(test)]
    pub fn wait(self) -> AspectRatioTable {
        let mut ratios = vec![NEUTRAL_RATIO; self.len];
        for _ in 0..self.len {
            match self.result_rx.recv() {
                Ok(outcome) => place(&mut ratios, outcome),
                Err(_) => break,
            }
        }
        AspectRatioTable::new(self.list_hash, ratios)
    }

    /// Await every probe of the batch without blocking the executor.
    pub async fn collect(self) -> AspectRatioTable {
        let mut ratios = vec![NEUTRAL_RATIO; self.len];
        for _ in 0..self.len {
            match self.result_rx.recv_async().await {
                Ok(outcome) => place(&mut ratios, outcome),
                // Workers gone; whatever is missing stays neutral.
                Err(_) => break,
            }
        }
        AspectRatioTable::new(self.list_hash, ratios)
    }
}

fn place(ratios: &mut [f32], outcome: ProbeOutcome) {
    if let Some(slot) = ratios.get_mut(outcome.index) {
        *slot = outcome.ratio;
    }
}

/// Probes image dimensions on a fixed pool of worker threads.
pub struct AspectRatioProber {
    request_tx: Option<Sender<ProbeJob>>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    last_probed: Arc<Mutex<Option<u64>>>,
    api_base: String,
}

impl AspectRatioProber {
    pub fn new(workers: usize, source: Arc<dyn ImageSource>, api_base: impl Into<String>) -> Self {
        let num_workers = workers.clamp(1, MAX_PROBE_WORKERS);
        let (request_tx, request_rx) = flume::unbounded::<ProbeJob>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut worker_handles = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let rx = request_rx.clone();
            let shutdown = Arc::clone(&shutdown);
            let source = Arc::clone(&source);

            let spawned = thread::Builder::new()
                .name(format!("probe-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, rx, shutdown, source));

            match spawned {
                Ok(handle) => worker_handles.push(handle),
                Err(e) => error!(worker_id, error = ?e, "Failed to spawn probe worker"),
            }
        }

        debug!(num_workers = worker_handles.len(), "Started probe worker queue");

        Self {
            request_tx: Some(request_tx),
            workers: worker_handles,
            shutdown,
            last_probed: Arc::new(Mutex::new(None)),
            api_base: api_base.into(),
        }
    }

    /// Queue one probe per record.
    ///
    /// Returns `None` for an empty list or a list identical to the last one
    /// probed; no requests are issued in that case.
    pub fn probe_all(&self, records: &[Arc<PhotoRecord>]) -> Option<ProbeBatch> {
        if records.is_empty() {
            return None;
        }

        let hash = list_hash(records, &self.api_base);
        {
            let mut last = self.last_probed.lock();
            if *last == Some(hash) {
                trace!(list_hash = hash, "List already probed");
                return None;
            }
            *last = Some(hash);
        }

        let (reply_tx, result_rx) = flume::bounded(records.len());
        let cancelled = Arc::new(AtomicBool::new(false));

        for (index, record) in records.iter().enumerate() {
            let job = ProbeJob {
                index,
                url: record.url(Rendition::Thumbnail, &self.api_base),
                cancelled: Arc::clone(&cancelled),
                reply: reply_tx.clone(),
            };
            let sent = self
                .request_tx
                .as_ref()
                .map(|tx| tx.send(job).is_ok())
                .unwrap_or(false);
            if !sent {
                // Dropped reply senders leave the remaining entries neutral.
                error!("Probe queue disconnected");
                break;
            }
        }

        debug!(list_hash = hash, count = records.len(), "Queued probe batch");

        Some(ProbeBatch {
            list_hash: hash,
            len: records.len(),
            result_rx,
            cancelled,
            last_probed: Arc::clone(&self.last_probed),
        })
    }

    #[cfg(test)]
    pub fn last_probed(&self) -> Option<u64> {
        *self.last_probed.lock()
    }

    /// Signal workers to stop. Workers finish their current fetch and exit.
    pub fn shutdown(&mut self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Shutting down probe queue");
        self.request_tx = None;
        // Detach rather than join so the UI thread never waits on a slow fetch.
        self.workers.clear();
    }

    #[cfg(test)]
    fn join(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.request_tx = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for AspectRatioProber {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    worker_id: usize,
    rx: Receiver<ProbeJob>,
    shutdown: Arc<AtomicBool>,
    source: Arc<dyn ImageSource>,
) {
    debug!(worker_id, "Probe worker started");

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(job) => {
                let outcome = process_job(&job, source.as_ref());
                if job.reply.send(outcome).is_err() {
                    trace!(worker_id, index = job.index, "Probe batch dropped before result");
                }
            }
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(worker_id, "Probe worker stopped");
}

fn process_job(job: &ProbeJob, source: &dyn ImageSource) -> ProbeOutcome {
    let neutral = ProbeOutcome {
        index: job.index,
        ratio: NEUTRAL_RATIO,
    };

    if job.cancelled.load(Ordering::Acquire) || job.url.is_empty() {
        return neutral;
    }

    let dimensions = source
        .fetch(&job.url)
        .and_then(|bytes| read_dimensions(&bytes));

    match dimensions {
        Ok((width, height)) if width > 0 && height > 0 => {
            trace!(index = job.index, width, height, "Probed image");
            ProbeOutcome {
                index: job.index,
                ratio: width as f32 / height as f32,
            }
        }
        Ok((width, height)) => {
            warn!(url = %job.url, width, height, "Image has degenerate dimensions");
            neutral
        }
        Err(e) => {
            debug!(url = %job.url, error = %e, "Probe failed, using neutral ratio");
            neutral
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_loader::{encode_png, MemorySource};
    use crate::models::PhotoId;

    fn record(id: i64, field: &str, value: &str) -> Arc<PhotoRecord> {
        Arc::new(PhotoRecord::new(PhotoId::Number(id), format!("photo {id}")).with_image_field(field, value))
    }

    const BASE: &str = "http://img.test";

    #[test]
    fn test_ratios_aligned_by_index() {
        let mut source = MemorySource::new(&[
            ("http://img.test/a.jpg", encode_png(40, 20)),
            ("http://img.test/b.jpg", encode_png(20, 40)),
            ("http://img.test/c.jpg", encode_png(30, 30)),
        ]);
        // First image finishes last.
        source.delay_for = Some(("http://img.test/a.jpg".into(), Duration::from_millis(150)));
        let source = Arc::new(source);

        let mut prober = AspectRatioProber::new(3, source.clone(), BASE);
        let records = vec![
            record(1, "image", "/a.jpg"),
            record(2, "thumb", "b.jpg"),
            record(3, "thumbnail_url", "c.jpg"),
        ];

        let table = prober.probe_all(&records).expect("batch").wait();
        assert_eq!(table.ratios, vec![2.0, 0.5, 1.0]);
        assert_eq!(table.list_hash, list_hash(&records, BASE));
        prober.join();
    }

    #[test]
    fn test_failures_fall_back_to_neutral() {
        let source = Arc::new(MemorySource::new(&[
            ("http://img.test/ok.jpg", encode_png(30, 10)),
            ("http://img.test/corrupt.jpg", b"not an image".to_vec()),
        ]));
        let mut prober = AspectRatioProber::new(2, source.clone(), BASE);
        let records = vec![
            record(1, "image", "corrupt.jpg"),
            record(2, "image", "missing.jpg"),
            Arc::new(PhotoRecord::new(PhotoId::Number(3), "no image")),
            record(4, "image", "ok.jpg"),
        ];

        let table = prober.probe_all(&records).unwrap().wait();
        assert_eq!(table.ratios.len(), 4);
        assert_eq!(table.ratios, vec![1.0, 1.0, 1.0, 3.0]);
        // Empty URL is never fetched.
        assert_eq!(source.fetch_count(), 3);
        prober.join();
    }

    #[test]
    fn test_identical_list_not_reprobed() {
        let source = Arc::new(MemorySource::new(&[("http://img.test/a.jpg", encode_png(10, 10))]));
        let mut prober = AspectRatioProber::new(1, source.clone(), BASE);
        let records = vec![record(1, "image", "a.jpg")];

        prober.probe_all(&records).unwrap().wait();
        let fetched = source.fetch_count();

        let same_content = vec![record(1, "image", "a.jpg")];
        assert!(prober.probe_all(&records).is_none());
        assert!(prober.probe_all(&same_content).is_none());
        assert_eq!(source.fetch_count(), fetched);
        prober.join();
    }

    #[test]
    fn test_empty_list_is_noop() {
        let source = Arc::new(MemorySource::new(&[]));
        let mut prober = AspectRatioProber::new(1, source.clone(), BASE);
        assert!(prober.probe_all(&[]).is_none());
        assert_eq!(prober.last_probed(), None);
        prober.join();
    }

    #[test]
    fn test_cancel_skips_work_and_allows_reprobe() {
        let source = Arc::new(MemorySource::new(&[("http://img.test/a.jpg", encode_png(10, 5))]));
        let mut prober = AspectRatioProber::new(1, source.clone(), BASE);
        let records = vec![record(1, "image", "a.jpg")];

        let batch = prober.probe_all(&records).unwrap();
        batch.cancel_handle().cancel();
        assert!(batch.cancel_handle().is_cancelled());
        assert_eq!(prober.last_probed(), None);
        drop(batch);

        let table = prober.probe_all(&records).expect("reprobe after cancel").wait();
        assert_eq!(table.ratios.len(), 1);
        prober.join();
    }

    #[test]
    fn test_shutdown_leaves_missing_entries_neutral() {
        let source = Arc::new(MemorySource::new(&[]));
        let mut prober = AspectRatioProber::new(1, source, BASE);
        prober.join();
        let records = vec![record(1, "image", "a.jpg"), record(2, "image", "b.jpg")];
        let table = prober.probe_all(&records).unwrap().wait();
        assert_eq!(table.ratios, vec![NEUTRAL_RATIO, NEUTRAL_RATIO]);
    }

    #[tokio::test]
    async fn test_collect_async() {
        let source = Arc::new(MemorySource::new(&[("http://img.test/p.jpg", encode_png(9, 12))]));
        let mut prober = AspectRatioProber::new(2, source, BASE);
        let records = vec![record(1, "image", "p.jpg")];
        let table = prober.probe_all(&records).unwrap().collect().await;
        assert!((table.ratio(0) - 0.75).abs() < f32::EPSILON);
        prober.join();
    }

    #[test]
    fn test_concurrent_fetches_capped_by_workers() {
        let images: Vec<(String, Vec<u8>)> = (0..12)
            .map(|i| (format!("http://img.test/{i}.jpg"), encode_png(10, 10)))
            .collect();
        let refs: Vec<(&str, Vec<u8>)> =
            images.iter().map(|(u, b)| (u.as_str(), b.clone())).collect();
        let mut source = MemorySource::new(&refs);
        source.delay = Some(Duration::from_millis(20));
        let source = Arc::new(source);

        let mut prober = AspectRatioProber::new(3, source.clone(), BASE);
        let records: Vec<_> = (0..12)
            .map(|i| record(i, "image", &format!("{i}.jpg")))
            .collect();
        let table = prober.probe_all(&records).unwrap().wait();

        assert_eq!(table.ratios, vec![1.0; 12]);
        assert_eq!(source.fetch_count(), 12);
        let peak = source.max_in_flight.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak concurrency {peak}");
        prober.join();
    }
}
