use anyhow::{bail, Result};
use fast_image_resize as fr;
use fr::images::{Image, ImageRef};
use std::time::Duration;

use super::frame_data::FrameData;
use super::source::VideoSource;

/// RGBA samples read back from a pixel surface, row-major
#[derive(Clone, Debug, PartialEq)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FrameBuffer {
    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        self.data
            .get(offset..offset + 4)
            .map(|px| [px[0], px[1], px[2], px[3]])
    }
}

/// Off-screen buffer a source frame is drawn into before read-back.
pub trait PixelSurface {
    fn resize(&mut self, width: u32, height: u32);
    fn size(&self) -> (u32, u32);
    /// Scales `frame` to fill the whole surface.
    fn draw(&mut self, frame: &FrameData) -> Result<()>;
    fn read_rgba(&self) -> FrameBuffer;
}

/// CPU surface backed by `fast_image_resize` (SIMD when available).
pub struct ScaledSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    resizer: fr::Resizer,
}

impl ScaledSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u8; width as usize * height as usize * 4],
            resizer: fr::Resizer::new(),
        }
    }
}

impl PixelSurface for ScaledSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize(width as usize * height as usize * 4, 0);
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn draw(&mut self, frame: &FrameData) -> Result<()> {
        if !frame.is_complete() {
            bail!(
                "incomplete source frame: {}x{} with {} bytes",
                frame.width,
                frame.height,
                frame.buffer.len()
            );
        }
        if self.width == 0 || self.height == 0 {
            return Ok(());
        }

        if frame.width == self.width && frame.height == self.height {
            self.pixels.copy_from_slice(&frame.buffer);
            return Ok(());
        }

        let src = ImageRef::new(frame.width, frame.height, &frame.buffer, fr::PixelType::U8x4)?;
        let mut dst = Image::from_slice_u8(self.width, self.height, &mut self.pixels, fr::PixelType::U8x4)?;
        self.resizer.resize(&src, &mut dst, None)?;
        Ok(())
    }

    fn read_rgba(&self) -> FrameBuffer {
        FrameBuffer {
            width: self.width,
            height: self.height,
            data: self.pixels.clone(),
        }
    }
}

/// Pulls the most recent source frame through a pixel surface.
///
/// The last delivered frame is kept, so a tick between two camera frames
/// redraws the current image instead of coming back empty.
#[derive(Default)]
pub struct FrameSampler {
    current: Option<FrameData>,
    /// Timestamp and surface size of what the surface already holds.
    drawn: Option<(Duration, (u32, u32))>,
}

impl FrameSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Ok(None)` only while the source has never delivered a frame.
    pub fn sample(
        &mut self,
        source: &mut dyn VideoSource,
        surface: &mut dyn PixelSurface,
    ) -> Result<Option<FrameBuffer>> {
        if let Some(frame) = source.latest_frame() {
            self.current = Some(frame);
        }
        let Some(frame) = &self.current else {
            return Ok(None);
        };

        let key = (frame.timestamp, surface.size());
        if self.drawn != Some(key) {
            if let Err(e) = surface.draw(frame) {
                self.current = None;
                self.drawn = None;
                return Err(e);
            }
            self.drawn = Some(key);
        }
        Ok(Some(surface.read_rgba()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::SyntheticSource;

    fn checker(width: u32, height: u32) -> FrameData {
        let mut buffer = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                buffer.extend_from_slice(&[v, v, v, 255]);
            }
        }
        FrameData::new(buffer, width, height, Duration::ZERO)
    }

    #[test]
    fn test_same_size_draw_copies_exactly() {
        let mut surface = ScaledSurface::new(4, 3);
        let frame = checker(4, 3);
        surface.draw(&frame).unwrap();
        let out = surface.read_rgba();
        assert_eq!(out.data, frame.buffer);
        assert_eq!(out.pixel(0, 0), Some([255, 255, 255, 255]));
        assert_eq!(out.pixel(1, 0), Some([0, 0, 0, 255]));
        assert_eq!(out.pixel(4, 0), None);
    }

    #[test]
    fn test_draw_scales_to_surface_size() {
        let mut surface = ScaledSurface::new(8, 6);
        surface.draw(&checker(64, 48)).unwrap();
        let out = surface.read_rgba();
        assert_eq!((out.width, out.height), (8, 6));
        assert_eq!(out.data.len(), 8 * 6 * 4);

        surface.resize(2, 1);
        surface.draw(&checker(64, 48)).unwrap();
        assert_eq!(surface.read_rgba().data.len(), 2 * 4);
    }

    #[test]
    fn test_incomplete_frame_rejected() {
        let mut surface = ScaledSurface::new(2, 2);
        let frame = FrameData::new(vec![0; 7], 2, 2, Duration::ZERO);
        assert!(surface.draw(&frame).is_err());
    }

    /// Source that hands out a single frame, then nothing.
    struct OneShot(Option<FrameData>);

    impl VideoSource for OneShot {
        fn start_capture(&mut self) -> Result<()> {
            Ok(())
        }
        fn poll_status(&mut self) -> crate::decoder::SourceStatus {
            crate::decoder::SourceStatus::Pending
        }
        fn latest_frame(&mut self) -> Option<FrameData> {
            self.0.take()
        }
        fn pause(&mut self) {}
        fn resume(&mut self) {}
        fn set_dimensions(&mut self, _width: u32, _height: u32) {}
        fn stop(&mut self) {}
    }

    #[test]
    fn test_sampler_empty_until_first_frame() {
        let mut sampler = FrameSampler::new();
        let mut source = OneShot(None);
        let mut surface = ScaledSurface::new(4, 3);
        assert!(sampler.sample(&mut source, &mut surface).unwrap().is_none());
    }

    #[test]
    fn test_sampler_reuses_last_frame() {
        let mut sampler = FrameSampler::new();
        let frame = checker(4, 3);
        let mut source = OneShot(Some(frame.clone()));
        let mut surface = ScaledSurface::new(4, 3);

        let first = sampler.sample(&mut source, &mut surface).unwrap().unwrap();
        assert_eq!(first.data, frame.buffer);
        for _ in 0..3 {
            let again = sampler.sample(&mut source, &mut surface).unwrap().unwrap();
            assert_eq!(again, first);
        }

        // a resize redraws the kept frame at the new size
        surface.resize(2, 2);
        let resized = sampler.sample(&mut source, &mut surface).unwrap().unwrap();
        assert_eq!((resized.width, resized.height), (2, 2));
        assert_eq!(resized.data.len(), 2 * 2 * 4);
    }

    #[test]
    fn test_sampler_prefers_newer_frame() {
        let mut sampler = FrameSampler::new();
        let mut source = SyntheticSource::new(64, 48);
        source.start_capture().unwrap();
        let mut surface = ScaledSurface::new(64, 48);

        let first = sampler.sample(&mut source, &mut surface).unwrap().unwrap();
        let mut last = first.clone();
        for _ in 0..10 {
            last = sampler.sample(&mut source, &mut surface).unwrap().unwrap();
        }
        // the disc in the test pattern has moved by now
        assert_ne!(first, last);
    }

    #[test]
    fn test_sampler_drops_frame_that_fails_to_draw() {
        let mut sampler = FrameSampler::new();
        let mut source = OneShot(Some(FrameData::new(vec![0; 7], 2, 2, Duration::ZERO)));
        let mut surface = ScaledSurface::new(2, 2);
        assert!(sampler.sample(&mut source, &mut surface).is_err());
        assert!(sampler.sample(&mut source, &mut surface).unwrap().is_none());
    }
}
