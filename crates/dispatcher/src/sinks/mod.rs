//! Sink implementations

mod log;
mod mosaic;

pub use self::log::LogSink;
pub use self::mosaic::{Mosaic, MosaicBoard, MosaicSink};
