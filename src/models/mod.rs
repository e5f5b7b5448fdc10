pub mod cell;
pub mod gallery;
pub mod photo;
pub mod ratios;

pub use cell::*;
pub use gallery::*;
pub use photo::*;
pub use ratios::*;
