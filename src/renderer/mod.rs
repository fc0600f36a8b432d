pub mod cell;
pub mod display;
pub mod flicker;
pub mod glyph;
pub mod processor;

pub use display::{DisplayManager, OutputSink, StreamSink};
