pub mod masonry;

pub use masonry::MasonryLayout;
