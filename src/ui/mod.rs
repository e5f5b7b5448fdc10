pub mod detail;
pub mod gallery;
pub mod loader;
pub mod pages;
pub mod tile;
pub mod window;

pub use window::MainWindow;
