use super::frame_data::FrameData;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Terminal acquisition failures. None of these are retried.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CaptureError {
    #[error("no video device available at index {0}")]
    DeviceUnavailable(i32),
    #[error("video device {0} opened but reports no frame size")]
    NoMetadata(i32),
    #[error("capture backend error: {0}")]
    Backend(String),
    #[error("capture thread exited unexpectedly")]
    Disconnected,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SourceStatus {
    /// Acquisition requested, metadata not confirmed yet.
    Pending,
    Ready(SourceMetadata),
    Failed(CaptureError),
}

/// A live video feed.
///
/// Acquisition is asynchronous: after `start_capture` the source reports
/// `Pending` until it knows its frame size, then `Ready`, or `Failed` for
/// good. `latest_frame` only ever hands out the newest frame; anything older
/// is discarded by the source.
pub trait VideoSource {
    fn start_capture(&mut self) -> anyhow::Result<()>;
    fn poll_status(&mut self) -> SourceStatus;
    fn latest_frame(&mut self) -> Option<FrameData>;
    fn pause(&mut self);
    fn resume(&mut self);
    /// Hint for the capture size; sources may ignore it.
    fn set_dimensions(&mut self, width: u32, height: u32);
    fn stop(&mut self);
}
