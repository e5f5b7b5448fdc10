// Page shell: header, three-tab navigation and the page stack

use gtk4::gdk::Display;
use gtk4::prelude::*;
use gtk4::{
    glib, Align, Application, ApplicationWindow, Box as GtkBox, Button, CssProvider, Label,
    Orientation, Settings, Stack, StackTransitionType, Widget, STYLE_PROVIDER_PRIORITY_APPLICATION,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use super::gallery::GalleryView;
use super::loader::TextureLoader;
use super::pages::{about_page, contact_page, PROFILE};
use crate::config::Config;
use crate::image_loader::ImageSource;

const PAGE_TRANSITION_MS: u32 = 500;

const FALLBACK_CSS: &str = r#"
* {
    box-shadow: none;
    background-image: none;
}

window {
    background-color: #0f0f0f;
    color: #e6e6e6;
}

.site-header {
    padding: 16px 24px;
}

.site-name {
    font-size: 18px;
    letter-spacing: 2px;
}

.nav-button {
    background-color: transparent;
    border: none;
    border-bottom: 2px solid transparent;
    border-radius: 0;
    color: #b0b0b0;
    padding: 4px 10px;
}

.nav-button:hover {
    color: #ffffff;
}

.nav-button.active {
    color: #ffffff;
    border-bottom-color: #ffffff;
}

.photo-tile {
    background-color: #1a1a1a;
    border-radius: 6px;
}

.photo-tile:hover {
    opacity: 0.9;
}

.broken-image {
    color: #707070;
    font-size: 12px;
}

.gallery-loading {
    color: #909090;
    font-size: 16px;
}

.detail-view {
    padding: 24px 80px;
}

.detail-title {
    font-size: 22px;
    font-weight: bold;
}

.detail-meta {
    color: #909090;
    font-size: 12px;
}

.back-button {
    background-color: transparent;
    border: 1px solid #444444;
    color: #e6e6e6;
}

.avatar {
    border-radius: 9999px;
}

.about-name {
    font-size: 26px;
}

.about-line {
    font-size: 17px;
}

.about-tagline {
    font-style: italic;
}
"#;

fn load_css() {
    let provider = CssProvider::new();
    provider.load_from_string(FALLBACK_CSS);

    if let Some(display) = Display::default() {
        gtk4::style_context_add_provider_for_display(
            &display,
            &provider,
            STYLE_PROVIDER_PRIORITY_APPLICATION,
        );
    }
}

/// The three top-level pages, in navigation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Gallery,
    About,
    Contact,
}

impl Page {
    pub const ALL: [Page; 3] = [Page::Gallery, Page::About, Page::Contact];

    pub fn index(self) -> u32 {
        match self {
            Page::Gallery => 0,
            Page::About => 1,
            Page::Contact => 2,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Page::Gallery => "Gallery",
            Page::About => "About",
            Page::Contact => "Contact",
        }
    }
}

/// Main window: header with navigation and one visible page
pub struct MainWindow {
    window: ApplicationWindow,
    stack: Stack,
    nav_buttons: Vec<(Page, Button)>,
    tab: Cell<u32>,
    gallery: RefCell<Option<Rc<GalleryView>>>,
    gallery_generation: Cell<u64>,
    config: Rc<Config>,
    source: Arc<dyn ImageSource>,
    loader: Rc<TextureLoader>,
}

impl MainWindow {
    pub fn new(app: &Application, config: Rc<Config>, source: Arc<dyn ImageSource>) -> Rc<Self> {
        load_css();
        if let Some(settings) = Settings::default() {
            settings.set_gtk_application_prefer_dark_theme(true);
        }

        let window = ApplicationWindow::builder()
            .application(app)
            .title(PROFILE.name)
            .default_width(1280)
            .default_height(860)
            .build();

        let header = GtkBox::new(Orientation::Horizontal, 12);
        header.add_css_class("site-header");

        let name = Label::new(Some(PROFILE.name));
        name.set_halign(Align::Start);
        name.set_hexpand(true);
        name.add_css_class("site-name");
        header.append(&name);

        let nav = GtkBox::new(Orientation::Horizontal, 6);
        nav.set_halign(Align::End);
        let nav_buttons: Vec<(Page, Button)> = Page::ALL
            .iter()
            .map(|page| {
                let button = Button::with_label(page.label());
                button.add_css_class("nav-button");
                nav.append(&button);
                (*page, button)
            })
            .collect();
        header.append(&nav);

        let stack = Stack::new();
        stack.set_transition_type(StackTransitionType::SlideLeftRight);
        stack.set_transition_duration(PAGE_TRANSITION_MS);
        stack.set_hexpand(true);
        stack.set_vexpand(true);
        stack.add_named(&about_page(&config), Some("about"));
        stack.add_named(&contact_page(&config), Some("contact"));

        let root = GtkBox::new(Orientation::Vertical, 0);
        root.append(&header);
        root.append(&stack);
        window.set_child(Some(&root));

        let loader = TextureLoader::new(Arc::clone(&source));

        let main_window = Rc::new(Self {
            window,
            stack,
            nav_buttons,
            tab: Cell::new(Page::Gallery.index()),
            gallery: RefCell::new(None),
            gallery_generation: Cell::new(0),
            config,
            source,
            loader,
        });

        for (page, button) in &main_window.nav_buttons {
            let weak_self = Rc::downgrade(&main_window);
            let page = *page;
            button.connect_clicked(move |_| {
                if let Some(window) = weak_self.upgrade() {
                    window.set_tab(page.index());
                }
            });
        }

        main_window.mount_gallery();
        main_window.update_nav();
        tracing::info!(api_base = %main_window.config.api_base, "Main window ready");
        main_window
    }

    pub fn present(&self) {
        self.window.present();
    }

    /// Switch to the page at `index`. The gallery is rebuilt on every return.
    pub fn set_tab(&self, index: u32) {
        let Some(page) = Page::from_index(index) else {
            return;
        };
        let previous = self.tab.replace(index);
        if previous == index {
            return;
        }
        tracing::debug!(from = previous, to = index, "Switching page");

        if previous == Page::Gallery.index() {
            self.unmount_gallery();
        }
        match page {
            Page::Gallery => self.mount_gallery(),
            Page::About => self.stack.set_visible_child_name("about"),
            Page::Contact => self.stack.set_visible_child_name("contact"),
        }
        self.update_nav();
    }

    fn mount_gallery(&self) {
        let generation = self.gallery_generation.get().wrapping_add(1);
        self.gallery_generation.set(generation);
        let name = format!("gallery-{generation}");

        let gallery = GalleryView::new(
            Rc::clone(&self.config),
            Arc::clone(&self.source),
            Rc::clone(&self.loader),
        );
        self.stack.add_named(&gallery.widget(), Some(&name));
        self.stack.set_visible_child_name(&name);
        gallery.mount();
        self.gallery.replace(Some(gallery));
    }

    fn unmount_gallery(&self) {
        let Some(gallery) = self.gallery.borrow_mut().take() else {
            return;
        };
        gallery.unmount();

        // Keep the outgoing page alive until the slide finishes.
        let stack = self.stack.downgrade();
        let widget: Widget = gallery.widget();
        let delay = Duration::from_millis(u64::from(PAGE_TRANSITION_MS) + 50);
        glib::timeout_add_local_once(delay, move || {
            let Some(stack) = stack.upgrade() else {
                return;
            };
            if stack.visible_child().as_ref() == Some(&widget) {
                return;
            }
            if widget.parent().as_ref() == Some(stack.upcast_ref::<Widget>()) {
                stack.remove(&widget);
            }
            drop(gallery);
        });
    }

    fn update_nav(&self) {
        let active = self.tab.get();
        for (page, button) in &self.nav_buttons {
            if page.index() == active {
                button.add_css_class("active");
            } else {
                button.remove_css_class("active");
            }
        }
    }
}
