//! Gallery state: photo list, ratio table and selection slot.
//!
//! Owned by one gallery view on the GTK main thread. Contains no widget code
//! so the transitions can be exercised directly.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::photo::{list_hash, PhotoRecord};
use super::ratios::{AspectRatioTable, Orientation};
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalleryPhase {
    Loading,
    Loaded,
}

/// What the gallery should show right now.
#[derive(Debug, Clone, PartialEq)]
pub enum GalleryDisplay {
    Loading,
    Grid,
    Detail(Arc<PhotoRecord>),
}

#[derive(Debug)]
pub struct GalleryState {
    phase: GalleryPhase,
    photos: Vec<Arc<PhotoRecord>>,
    list_hash: u64,
    ratios: AspectRatioTable,
    selection: Option<Arc<PhotoRecord>>,
    api_base: String,
}

impl GalleryState {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            phase: GalleryPhase::Loading,
            photos: Vec::new(),
            list_hash: 0,
            ratios: AspectRatioTable::default(),
            selection: None,
            api_base: api_base.into(),
        }
    }

    pub fn photos(&self) -> &[Arc<PhotoRecord>] {
        &self.photos
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Apply the result of the list fetch.
    ///
    /// Failures are logged and leave an empty gallery. Returns true when the
    /// list content changed, which means the ratio table must be re-probed.
    pub fn finish_load(&mut self, result: Result<Vec<PhotoRecord>, ApiError>) -> bool {
        self.phase = GalleryPhase::Loaded;

        let photos: Vec<Arc<PhotoRecord>> = match result {
            Ok(photos) => photos.into_iter().map(Arc::new).collect(),
            Err(e) => {
                warn!(error = %e, "Error fetching photos, showing empty gallery");
                Vec::new()
            }
        };

        let hash = list_hash(&photos, &self.api_base);
        let changed = hash != self.list_hash || photos.len() != self.photos.len();
        self.photos = photos;
        if changed {
            self.list_hash = hash;
            self.ratios = AspectRatioTable::default();
        }
        info!(count = self.photos.len(), changed, "Gallery loaded");
        changed
    }

    /// Replace the ratio table. Tables computed for another list are dropped.
    pub fn publish_ratios(&mut self, table: AspectRatioTable) -> bool {
        if table.list_hash != self.list_hash || table.ratios.len() != self.photos.len() {
            debug!(
                expected = self.list_hash,
                got = table.list_hash,
                "Discarding stale ratio table"
            );
            return false;
        }
        self.ratios = table;
        true
    }

    pub fn orientation(&self, index: usize) -> Orientation {
        self.ratios.orientation(index)
    }

    /// Row spans for every photo, in list order.
    pub fn row_spans(&self) -> Vec<u32> {
        (0..self.photos.len())
            .map(|i| self.orientation(i).row_span())
            .collect()
    }

    /// Enlarge the photo at `index`. Only valid from the grid.
    pub fn select(&mut self, index: usize) -> bool {
        if self.phase != GalleryPhase::Loaded || self.selection.is_some() {
            return false;
        }
        match self.photos.get(index) {
            Some(photo) => {
                debug!(index, id = %photo.id, "Selected photo");
                self.selection = Some(Arc::clone(photo));
                true
            }
            None => false,
        }
    }

    /// Return from the detail view to the grid.
    pub fn back(&mut self) -> bool {
        self.selection.take().is_some()
    }

    pub fn display(&self) -> GalleryDisplay {
        match (&self.phase, &self.selection) {
            (GalleryPhase::Loading, _) => GalleryDisplay::Loading,
            (GalleryPhase::Loaded, None) => GalleryDisplay::Grid,
            (GalleryPhase::Loaded, Some(photo)) => GalleryDisplay::Detail(Arc::clone(photo)),
        }
    }
}

#[cfg(test)]
impl GalleryState {
    pub fn is_loading(&self) -> bool {
        self.phase == GalleryPhase::Loading
    }

    pub fn list_hash(&self) -> u64 {
        self.list_hash
    }

    pub fn ratios(&self) -> &AspectRatioTable {
        &self.ratios
    }

    pub fn selection(&self) -> Option<&Arc<PhotoRecord>> {
        self.selection.as_ref()
    }
}
