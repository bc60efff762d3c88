//! I/O modules for reading vector geometry and raster products and writing tables

pub mod vector;
pub mod raster;
pub mod table;

pub use vector::VectorReader;
pub use raster::{PixelWindow, RasterSource, RasterWindow};
pub use table::TableWriter;
