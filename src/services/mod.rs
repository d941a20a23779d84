//! Services separating I/O from the segmentation pipeline

pub mod io;

pub use io::ImageIOService;
