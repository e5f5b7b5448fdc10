// Grid tile showing one photo thumbnail
// Shows the inline blur placeholder until the thumbnail arrives

use glib::Object;
use gtk4::prelude::*;
use gtk4::subclass::prelude::*;
use gtk4::{glib, Align, Box as GtkBox, ContentFit, GestureClick, Label, Orientation, Overlay, Picture};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::loader::{placeholder_texture, TextureLoader};
use crate::models::{PhotoRecord, Rendition};

const TILE_DECODE_SIZE: u32 = 800;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

mod imp {
    use super::*;

    #[derive(Default)]
    pub struct PhotoTileInner {
        pub picture: RefCell<Option<Picture>>,
        pub broken: RefCell<Option<Label>>,
        pub index: Cell<usize>,
        pub load_token: Cell<u64>,
        pub on_activated: RefCell<Option<Rc<dyn Fn(usize)>>>,
    }

    #[glib::object_subclass]
    impl ObjectSubclass for PhotoTileInner {
        const NAME: &'static str = "PhotoportPhotoTile";
        type Type = super::PhotoTile;
        type ParentType = GtkBox;
    }

    impl ObjectImpl for PhotoTileInner {
        fn constructed(&self) {
            self.parent_constructed();

            let obj = self.obj();
            obj.set_orientation(Orientation::Vertical);
            obj.set_hexpand(true);
            obj.set_overflow(gtk4::Overflow::Hidden);
            obj.add_css_class("photo-tile");
        }
    }

    impl WidgetImpl for PhotoTileInner {}
    impl BoxImpl for PhotoTileInner {}
}

glib::wrapper! {
    pub struct PhotoTile(ObjectSubclass<imp::PhotoTileInner>)
        @extends GtkBox, gtk4::Widget,
        @implements gtk4::Accessible, gtk4::Buildable, gtk4::ConstraintTarget, gtk4::Orientable;
}

impl PhotoTile {
    pub fn new(index: usize) -> Self {
        let tile: Self = Object::builder().build();
        tile.imp().index.set(index);
        tile.build_children();
        tile
    }

    pub fn index(&self) -> usize {
        self.imp().index.get()
    }

    fn build_children(&self) {
        let picture = Picture::new();
        picture.set_can_shrink(true);
        picture.set_content_fit(ContentFit::Cover);
        picture.set_hexpand(true);
        picture.set_vexpand(true);
        picture.add_css_class("photo-image");

        let overlay = Overlay::new();
        overlay.set_child(Some(&picture));
        overlay.set_hexpand(true);
        overlay.set_vexpand(true);

        let broken = Label::new(Some("[no image]"));
        broken.set_halign(Align::Center);
        broken.set_valign(Align::Center);
        broken.add_css_class("broken-image");
        broken.set_visible(false);
        overlay.add_overlay(&broken);

        let tile = self.downgrade();
        let click = GestureClick::new();
        click.set_button(1);
        click.connect_pressed(move |_, _n, _x, _y| {
            if let Some(tile) = tile.upgrade() {
                tile.emit_activated();
            }
        });
        overlay.add_controller(click);

        self.append(&overlay);
        let imp = self.imp();
        imp.picture.replace(Some(picture));
        imp.broken.replace(Some(broken));
    }

    /// Show `photo`: the blur placeholder right away, then the thumbnail.
    pub fn bind(&self, photo: &PhotoRecord, api_base: &str, loader: &TextureLoader) {
        let imp = self.imp();
        let Some(picture) = imp.picture.borrow().clone() else {
            return;
        };

        picture.set_alternative_text(Some(&photo.title));
        self.set_tooltip_text((!photo.title.is_empty()).then_some(photo.title.as_str()));

        let placeholder = photo.blur_data_url.as_deref().and_then(placeholder_texture);
        picture.set_paintable(placeholder.as_ref());
        self.set_broken(false);

        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        imp.load_token.set(token);

        let url = photo.url(Rendition::Thumbnail, api_base);
        let tile = self.downgrade();
        loader.request(&url, TILE_DECODE_SIZE, move |texture| {
            let Some(tile) = tile.upgrade() else {
                return;
            };
            if tile.imp().load_token.get() != token {
                return;
            }
            match texture {
                Some(texture) => {
                    if let Some(picture) = tile.imp().picture.borrow().as_ref() {
                        picture.set_paintable(Some(texture));
                    }
                }
                None => tile.set_broken(true),
            }
        });
    }

    /// Pixel size of the cell this tile occupies.
    pub fn set_cell_size(&self, width: i32, height: i32) {
        self.set_size_request(width.max(1), height.max(1));
    }

    fn set_broken(&self, broken: bool) {
        if let Some(label) = self.imp().broken.borrow().as_ref() {
            label.set_visible(broken);
        }
        if broken {
            self.add_css_class("broken");
        } else {
            self.remove_css_class("broken");
        }
    }

    pub fn connect_activated<F>(&self, callback: F)
    where
        F: Fn(usize) + 'static,
    {
        *self.imp().on_activated.borrow_mut() = Some(Rc::new(callback));
    }

    fn emit_activated(&self) {
        let callback = self.imp().on_activated.borrow().clone();
        if let Some(callback) = callback {
            callback(self.index());
        }
    }
}
