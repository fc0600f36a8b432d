use std::time::Duration;

/// One RGBA frame as delivered by a video source
#[derive(Clone, Debug)]
pub struct FrameData {
    pub buffer: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Duration,
}

impl FrameData {
    pub fn new(buffer: Vec<u8>, width: u32, height: u32, timestamp: Duration) -> Self {
        Self { buffer, width, height, timestamp }
    }

    /// True when the buffer holds exactly `width * height` RGBA pixels.
    pub fn is_complete(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.buffer.len() == self.width as usize * self.height as usize * 4
    }
}
