pub mod ticker;

pub use ticker::FrameTicker;
