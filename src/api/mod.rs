//! Client for the remote photo list endpoint.
//!
//! - `GET {base}/api/photos/` returning either a bare array of records or an
//!   object with `results` (and optional pagination `meta`)
//! - Follows `meta.next_offset` up to `MAX_PAGES`

pub mod client;
pub mod payload;

pub use client::PhotoApi;
pub use payload::{parse_page, PhotoPage};
