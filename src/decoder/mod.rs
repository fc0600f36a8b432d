pub mod camera;
pub mod frame_data;
pub mod sampler;
pub mod source;
pub mod synthetic;

pub use camera::CameraSource;
pub use frame_data::FrameData;
pub use sampler::{FrameBuffer, FrameSampler, PixelSurface, ScaledSurface};
pub use source::{CaptureError, SourceMetadata, SourceStatus, VideoSource};
pub use synthetic::SyntheticSource;
