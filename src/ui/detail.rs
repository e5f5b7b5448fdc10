// Enlarged view of a single photo with its title and description

use gtk4::gdk::Key;
use gtk4::prelude::*;
use gtk4::{
    glib, Align, Box as GtkBox, Button, ContentFit, EventControllerKey, Label, LinkButton,
    Orientation, Overlay, Picture, ScrolledWindow,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use super::loader::{placeholder_texture, TextureLoader};
use crate::models::{PhotoRecord, Rendition};

const DETAIL_DECODE_SIZE: u32 = 2048;

pub struct DetailView {
    root: ScrolledWindow,
    back_button: Button,
    picture: Picture,
    broken: Label,
    original_link: LinkButton,
    title: Label,
    meta: Label,
    description: Label,
    loader: Rc<TextureLoader>,
    load_token: Cell<u64>,
    on_back: RefCell<Option<Rc<dyn Fn()>>>,
}

impl DetailView {
    pub fn new(loader: Rc<TextureLoader>) -> Rc<Self> {
        let back_button = Button::with_label("Back");
        back_button.set_halign(Align::Start);
        back_button.add_css_class("back-button");

        let picture = Picture::new();
        picture.set_can_shrink(true);
        picture.set_content_fit(ContentFit::Contain);
        picture.set_hexpand(true);
        picture.set_vexpand(true);
        picture.set_size_request(-1, 480);
        picture.add_css_class("detail-image");

        let broken = Label::new(Some("[no image]"));
        broken.set_halign(Align::Center);
        broken.set_valign(Align::Center);
        broken.add_css_class("broken-image");
        broken.set_visible(false);

        let frame = Overlay::new();
        frame.set_child(Some(&picture));
        frame.add_overlay(&broken);

        let original_link = LinkButton::with_label("", "View original");
        original_link.set_halign(Align::Start);
        original_link.add_css_class("detail-original");
        original_link.set_visible(false);

        let title = Label::new(None);
        title.set_xalign(0.0);
        title.set_wrap(true);
        title.add_css_class("detail-title");

        let meta = Label::new(None);
        meta.set_xalign(0.0);
        meta.add_css_class("detail-meta");
        meta.set_visible(false);

        let description = Label::new(None);
        description.set_xalign(0.0);
        description.set_wrap(true);
        description.set_selectable(true);
        description.add_css_class("detail-description");

        let column = GtkBox::new(Orientation::Vertical, 16);
        column.add_css_class("detail-view");
        column.append(&back_button);
        column.append(&frame);
        column.append(&title);
        column.append(&meta);
        column.append(&description);
        column.append(&original_link);

        let root = ScrolledWindow::builder()
            .hscrollbar_policy(gtk4::PolicyType::Never)
            .child(&column)
            .build();

        let view = Rc::new(Self {
            root,
            back_button: back_button.clone(),
            picture,
            broken,
            original_link,
            title,
            meta,
            description,
            loader,
            load_token: Cell::new(0),
            on_back: RefCell::new(None),
        });

        let view_weak = Rc::downgrade(&view);
        back_button.connect_clicked(move |_| {
            if let Some(view) = view_weak.upgrade() {
                view.emit_back();
            }
        });

        let key_controller = EventControllerKey::new();
        let view_weak = Rc::downgrade(&view);
        key_controller.connect_key_pressed(move |_, key, _code, _state| {
            let Some(view) = view_weak.upgrade() else {
                return glib::Propagation::Proceed;
            };
            match key {
                Key::Escape | Key::BackSpace => {
                    view.emit_back();
                    glib::Propagation::Stop
                }
                _ => glib::Propagation::Proceed,
            }
        });
        view.root.add_controller(key_controller);

        view
    }

    pub fn widget(&self) -> &ScrolledWindow {
        &self.root
    }

    pub fn connect_back<F>(&self, callback: F)
    where
        F: Fn() + 'static,
    {
        *self.on_back.borrow_mut() = Some(Rc::new(callback));
    }

    fn emit_back(&self) {
        let callback = self.on_back.borrow().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    pub fn show(self: &Rc<Self>, photo: &Arc<PhotoRecord>, api_base: &str) {
        self.title.set_text(&photo.title);
        self.title.set_visible(!photo.title.is_empty());
        self.description.set_text(&photo.description);
        self.description.set_visible(!photo.description.is_empty());

        let meta = [photo.category.as_deref(), photo.created_at.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("  ·  ");
        self.meta.set_text(&meta);
        self.meta.set_visible(!meta.is_empty());

        self.picture.set_alternative_text(Some(&photo.title));
        let placeholder = photo.blur_data_url.as_deref().and_then(placeholder_texture);
        self.picture.set_paintable(placeholder.as_ref());
        self.broken.set_visible(false);

        let original = photo.url(Rendition::Original, api_base);
        self.original_link.set_uri(&original);
        self.original_link.set_visible(!original.is_empty());

        let token = self.load_token.get().wrapping_add(1);
        self.load_token.set(token);

        let url = photo.url(Rendition::Preview, api_base);
        tracing::debug!(id = %photo.id, %url, "Showing detail");
        let view_weak = Rc::downgrade(self);
        self.loader.request(&url, DETAIL_DECODE_SIZE, move |texture| {
            let Some(view) = view_weak.upgrade() else {
                return;
            };
            if view.load_token.get() != token {
                return;
            }
            match texture {
                Some(texture) => view.picture.set_paintable(Some(texture)),
                None => {
                    tracing::debug!(%token, "Detail image unavailable");
                    view.picture.set_paintable(None::<&gtk4::gdk::Paintable>);
                    view.broken.set_visible(true);
                }
            }
        });

        self.back_button.grab_focus();
    }

    /// Drop the loaded image so a stale callback cannot repaint it.
    pub fn clear(&self) {
        self.load_token.set(self.load_token.get().wrapping_add(1));
        self.picture.set_paintable(None::<&gtk4::gdk::Paintable>);
        self.broken.set_visible(false);
    }
}
