// Background image loading for tiles and the detail view
// Worker threads fetch and decode; textures are created and cached on the main thread

use gdk4::Texture;
use gtk4::{gdk, glib};
use gtk4::prelude::*;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use crate::image_loader::{decode_data_url, DecodePool, DecodedImage, ImageSource};

const LOADER_THREADS: usize = 3;
const CACHE_ENTRIES: usize = 512;

type Waiter = Box<dyn FnOnce(Option<&Texture>)>;

struct LoaderState {
    pending: HashSet<String>,
    waiters: HashMap<String, Vec<Waiter>>,
    cache: lru::LruCache<String, Texture>,
}

pub struct TextureLoader {
    pool: DecodePool,
    state: RefCell<LoaderState>,
}

impl TextureLoader {
    pub fn new(source: Arc<dyn ImageSource>) -> Rc<Self> {
        let cache_entries = NonZeroUsize::new(CACHE_ENTRIES).unwrap_or(NonZeroUsize::MIN);
        let loader = Rc::new(Self {
            pool: DecodePool::new(LOADER_THREADS, source),
            state: RefCell::new(LoaderState {
                pending: HashSet::new(),
                waiters: HashMap::new(),
                cache: lru::LruCache::new(cache_entries),
            }),
        });

        let loader_weak = Rc::downgrade(&loader);
        glib::timeout_add_local(Duration::from_millis(16), move || {
            if let Some(loader) = loader_weak.upgrade() {
                loader.process_results();
                glib::ControlFlow::Continue
            } else {
                glib::ControlFlow::Break
            }
        });

        loader
    }

    /// Load `url` scaled to fit `max_size`. `done` runs on the main thread,
    /// with `None` when the image is missing or cannot be decoded.
    pub fn request<F>(&self, url: &str, max_size: u32, done: F)
    where
        F: FnOnce(Option<&Texture>) + 'static,
    {
        if url.is_empty() {
            glib::idle_add_local_once(move || done(None));
            return;
        }

        let key = format!("{max_size}:{url}");
        let mut state = self.state.borrow_mut();

        if let Some(texture) = state.cache.get(&key).cloned() {
            glib::idle_add_local_once(move || done(Some(&texture)));
            return;
        }

        state.waiters.entry(key.clone()).or_default().push(Box::new(done));

        if state.pending.insert(key.clone()) && !self.pool.submit(&key, url, max_size) {
            tracing::error!(%url, "Image decode workers are gone");
            state.pending.remove(&key);
            let waiters = state.waiters.remove(&key).unwrap_or_default();
            drop(state);
            for waiter in waiters {
                waiter(None);
            }
        }
    }

    fn process_results(&self) {
        while let Some(result) = self.pool.try_recv() {
            let DecodedImage {
                key,
                rgba,
                width,
                height,
            } = result;
            let texture = rgba.and_then(|rgba| create_texture_from_rgba(rgba, width, height));

            let waiters = {
                let mut state = self.state.borrow_mut();
                state.pending.remove(&key);
                if let Some(ref texture) = texture {
                    state.cache.put(key.clone(), texture.clone());
                }
                state.waiters.remove(&key).unwrap_or_default()
            };

            for waiter in waiters {
                waiter(texture.as_ref());
            }
        }
    }
}

fn create_texture_from_rgba(rgba: Vec<u8>, width: u32, height: u32) -> Option<Texture> {
    if width == 0 || height == 0 {
        return None;
    }
    let expected = (width as usize)
        .saturating_mul(height as usize)
        .saturating_mul(4);
    if rgba.len() < expected {
        return None;
    }
    let bytes = glib::Bytes::from_owned(rgba);
    let texture = gdk::MemoryTexture::new(
        width as i32,
        height as i32,
        gdk::MemoryFormat::R8g8b8a8,
        &bytes,
        (width * 4) as usize,
    );
    Some(texture.upcast())
}

/// Texture for an inline `data:` placeholder.
pub fn placeholder_texture(data_url: &str) -> Option<Texture> {
    let bytes = decode_data_url(data_url).ok()?;
    Texture::from_bytes(&glib::Bytes::from_owned(bytes)).ok()
}
