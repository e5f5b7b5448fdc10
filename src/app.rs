use gtk4::prelude::*;
use gtk4::Application;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::config::Config;
use crate::image_loader::{CachedImageSource, HttpImageSource, ImageSource, IMAGE_CACHE_BYTES};
use crate::ui::MainWindow;

const APP_ID: &str = "com.photoport.Portfolio";

pub struct PortfolioApp {
    app: Application,
}

impl PortfolioApp {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        // Probes and texture loads share one byte cache, so each image is downloaded once.
        let http: Arc<dyn ImageSource> = Arc::new(HttpImageSource::new(config.fetch_timeout)?);
        let source: Arc<dyn ImageSource> = Arc::new(CachedImageSource::new(http, IMAGE_CACHE_BYTES));
        let config = Rc::new(config);

        let app = Application::builder().application_id(APP_ID).build();

        // Keeps the window state alive for the lifetime of the application.
        let main_window: Rc<RefCell<Option<Rc<MainWindow>>>> = Rc::new(RefCell::new(None));
        app.connect_activate(move |app| {
            if let Some(window) = main_window.borrow().as_ref() {
                window.present();
                return;
            }
            let window = MainWindow::new(app, Rc::clone(&config), Arc::clone(&source));
            window.present();
            main_window.replace(Some(window));
        });

        Ok(Self { app })
    }

    pub fn run(&self) -> i32 {
        self.app.run().into()
    }
}
