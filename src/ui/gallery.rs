// Gallery tab: fetches the photo list, probes aspect ratios and lays
// thumbnails out in the masonry grid. Clicking a tile opens the detail view.

use gtk4::prelude::*;
use gtk4::{glib, Align, Grid, Label, ScrolledWindow, Stack, StackTransitionType, Widget};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use super::detail::DetailView;
use super::loader::TextureLoader;
use super::tile::PhotoTile;
use crate::api::PhotoApi;
use crate::config::Config;
use crate::error::ApiError;
use crate::image_loader::ImageSource;
use crate::layout::MasonryLayout;
use crate::models::{GalleryDisplay, GalleryState, PhotoRecord};
use crate::probe::{AspectRatioProber, ProbeCancel};
use crate::runtime;

const RELAYOUT_DELAY: Duration = Duration::from_millis(80);

pub struct GalleryView {
    self_weak: RefCell<Weak<GalleryView>>,
    stack: Stack,
    scroller: ScrolledWindow,
    grid: Grid,
    detail: Rc<DetailView>,
    state: RefCell<GalleryState>,
    layout: MasonryLayout,
    config: Rc<Config>,
    loader: Rc<TextureLoader>,
    prober: RefCell<AspectRatioProber>,
    probe_cancel: RefCell<Option<ProbeCancel>>,
    tiles: RefCell<Vec<PhotoTile>>,
    mounted: Cell<bool>,
    last_layout_width: Cell<i32>,
    relayout_pending: Cell<bool>,
    grid_scroll_before_detail: Cell<f64>,
}

impl GalleryView {
    pub fn new(
        config: Rc<Config>,
        source: Arc<dyn ImageSource>,
        loader: Rc<TextureLoader>,
    ) -> Rc<Self> {
        let layout = MasonryLayout::default();

        let loading = Label::new(Some("Loading..."));
        loading.set_halign(Align::Center);
        loading.set_valign(Align::Center);
        loading.add_css_class("gallery-loading");

        let grid = Grid::new();
        grid.set_row_spacing(layout.gap as u32);
        grid.set_column_spacing(layout.gap as u32);
        grid.set_halign(Align::Center);
        grid.set_valign(Align::Start);
        grid.set_margin_top(24);
        grid.set_margin_bottom(24);
        grid.add_css_class("masonry-grid");

        let scroller = ScrolledWindow::builder()
            .hscrollbar_policy(gtk4::PolicyType::Never)
            .hexpand(true)
            .vexpand(true)
            .child(&grid)
            .build();

        let detail = DetailView::new(Rc::clone(&loader));

        let stack = Stack::new();
        stack.set_transition_type(StackTransitionType::Crossfade);
        stack.set_transition_duration(150);
        stack.add_named(&loading, Some("loading"));
        stack.add_named(&scroller, Some("grid"));
        stack.add_named(detail.widget(), Some("detail"));
        stack.set_visible_child_name("loading");

        let prober = AspectRatioProber::new(config.probe_workers, source, config.api_base.clone());
        let state = GalleryState::new(config.api_base.clone());

        let view = Rc::new(Self {
            self_weak: RefCell::new(Weak::new()),
            stack,
            scroller,
            grid,
            detail,
            state: RefCell::new(state),
            layout,
            config,
            loader,
            prober: RefCell::new(prober),
            probe_cancel: RefCell::new(None),
            tiles: RefCell::new(Vec::new()),
            mounted: Cell::new(false),
            last_layout_width: Cell::new(0),
            relayout_pending: Cell::new(false),
            grid_scroll_before_detail: Cell::new(0.0),
        });
        *view.self_weak.borrow_mut() = Rc::downgrade(&view);

        let weak_self = Rc::downgrade(&view);
        view.detail.connect_back(move || {
            if let Some(view) = weak_self.upgrade() {
                view.close_detail();
            }
        });

        view.setup_resize_observer();
        view
    }

    pub fn widget(&self) -> Widget {
        self.stack.clone().upcast()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    /// Start the list fetch. Results arriving after `unmount` are dropped.
    pub fn mount(&self) {
        if self.mounted.replace(true) {
            return;
        }
        self.sync_display();

        let api = match PhotoApi::new(&self.config) {
            Ok(api) => api,
            Err(e) => {
                self.on_photos_loaded(Err(e));
                return;
            }
        };

        let (sender, receiver) = async_channel::bounded(1);
        runtime::handle().spawn(async move {
            let result = api.fetch_photos().await;
            let _ = sender.send(result).await;
        });

        let weak_self = self.self_weak.borrow().clone();
        glib::spawn_future_local(async move {
            let Ok(result) = receiver.recv().await else {
                return;
            };
            let Some(view) = weak_self.upgrade() else {
                return;
            };
            if !view.is_mounted() {
                tracing::debug!("Gallery unmounted before photos arrived");
                return;
            }
            view.on_photos_loaded(result);
        });
    }

    /// Stop accepting results and release the probe workers.
    pub fn unmount(&self) {
        if !self.mounted.replace(false) {
            return;
        }
        if let Some(cancel) = self.probe_cancel.borrow_mut().take() {
            cancel.cancel();
        }
        self.prober.borrow_mut().shutdown();
        self.detail.clear();
        tracing::debug!("Gallery unmounted");
    }

    fn on_photos_loaded(&self, result: Result<Vec<PhotoRecord>, ApiError>) {
        let changed = self.state.borrow_mut().finish_load(result);
        if changed {
            self.rebuild_tiles();
        }
        self.relayout();
        self.sync_display();
        if changed {
            self.start_probe();
        }
    }

    fn start_probe(&self) {
        let batch = {
            let state = self.state.borrow();
            let batch = self.prober.borrow().probe_all(state.photos());
            batch
        };
        let Some(batch) = batch else {
            return;
        };

        if let Some(previous) = self.probe_cancel.replace(Some(batch.cancel_handle())) {
            previous.cancel();
        }

        let weak_self = self.self_weak.borrow().clone();
        glib::spawn_future_local(async move {
            let table = batch.collect().await;
            let Some(view) = weak_self.upgrade() else {
                return;
            };
            if !view.is_mounted() {
                return;
            }
            view.probe_cancel.borrow_mut().take();
            let portraits = table.ratios.iter().filter(|r| **r < 1.0).count();
            if view.state.borrow_mut().publish_ratios(table) {
                tracing::debug!(portraits, "Aspect ratios published");
                view.relayout();
            }
        });
    }

    fn rebuild_tiles(&self) {
        let mut tiles = self.tiles.borrow_mut();
        for tile in tiles.drain(..) {
            if tile.parent().is_some() {
                self.grid.remove(&tile);
            }
        }

        let state = self.state.borrow();
        for (index, photo) in state.photos().iter().enumerate() {
            let tile = PhotoTile::new(index);
            tile.bind(photo, state.api_base(), &self.loader);

            let weak_self = self.self_weak.borrow().clone();
            tile.connect_activated(move |index| {
                if let Some(view) = weak_self.upgrade() {
                    view.open_detail(index);
                }
            });
            tiles.push(tile);
        }
    }

    fn content_width(&self) -> f32 {
        let width = self.scroller.width();
        if width > 0 {
            width as f32
        } else {
            self.stack.width().max(1) as f32
        }
    }

    /// Place every tile according to the current ratios and width.
    fn relayout(&self) {
        let width = self.content_width();
        let spans = self.state.borrow().row_spans();
        let model = self.layout.compute(&spans, width);
        let margin = self.layout.margin_for_width(width) as i32;
        self.grid.set_margin_start(margin);
        self.grid.set_margin_end(margin);

        let tiles = self.tiles.borrow();
        let column_width = model.column_width_px.round() as i32;
        for cell in &model.cells {
            let Some(tile) = tiles.get(cell.index) else {
                continue;
            };
            if tile.parent().is_some() {
                self.grid.remove(tile);
            }
            let height = self.layout.span_height(&model, cell.row_span).round() as i32;
            tile.set_cell_size(column_width, height);
            self.grid.attach(
                tile,
                cell.column as i32,
                cell.row as i32,
                1,
                cell.row_span as i32,
            );
        }

        tracing::debug!(
            width,
            columns = model.columns,
            rows = model.row_count,
            cells = model.cells.len(),
            height = self.layout.total_height(&model),
            "Gallery relayout"
        );
    }

    fn schedule_relayout_debounced(&self, delay: Duration) {
        if self.relayout_pending.replace(true) {
            return;
        }
        let weak_self = self.self_weak.borrow().clone();
        glib::timeout_add_local(delay, move || {
            if let Some(view) = weak_self.upgrade() {
                view.relayout_pending.set(false);
                if view.is_mounted() {
                    view.relayout();
                }
            }
            glib::ControlFlow::Break
        });
    }

    fn setup_resize_observer(self: &Rc<Self>) {
        let weak_self = Rc::downgrade(self);
        self.stack.add_tick_callback(move |_widget, _clock| {
            let Some(view) = weak_self.upgrade() else {
                return glib::ControlFlow::Break;
            };
            if !view.is_mounted() || view.stack.visible_child_name().as_deref() != Some("grid") {
                return glib::ControlFlow::Continue;
            }
            let width = view.content_width().round() as i32;
            if width <= 1 {
                return glib::ControlFlow::Continue;
            }
            let last = view.last_layout_width.get();
            if width != last {
                view.last_layout_width.set(width);
                view.schedule_relayout_debounced(RELAYOUT_DELAY);
            }
            glib::ControlFlow::Continue
        });
    }

    fn open_detail(&self, index: usize) {
        if !self.state.borrow_mut().select(index) {
            return;
        }
        self.grid_scroll_before_detail
            .set(self.scroller.vadjustment().value());
        self.sync_display();
    }

    fn close_detail(&self) {
        if !self.state.borrow_mut().back() {
            return;
        }
        self.detail.clear();
        self.sync_display();

        let scroll = self.grid_scroll_before_detail.get();
        let adjustment = self.scroller.vadjustment();
        glib::idle_add_local_once(move || adjustment.set_value(scroll));
    }

    fn sync_display(&self) {
        let display = self.state.borrow().display();
        match display {
            GalleryDisplay::Loading => self.stack.set_visible_child_name("loading"),
            GalleryDisplay::Grid => self.stack.set_visible_child_name("grid"),
            GalleryDisplay::Detail(photo) => {
                let base = self.state.borrow().api_base().to_string();
                self.detail.show(&photo, &base);
                self.stack.set_visible_child_name("detail");
            }
        }
    }
}
