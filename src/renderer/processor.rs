use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;

use super::cell::{CellData, FrameBody, RenderedFrame, RgbColor, Token};
use super::flicker::{flicker_factor, FlickerAxis, FlickerConfig};
use super::glyph::GlyphMapper;
use crate::decoder::FrameBuffer;

#[derive(Clone, Debug, PartialEq, Default)]
pub struct RenderOptions {
    pub colorized: bool,
    pub flicker: FlickerConfig,
}

/// Turns sampled RGBA frames into character art.
pub struct FrameProcessor {
    mapper: GlyphMapper,
    options: RenderOptions,
}

impl FrameProcessor {
    pub fn new(mapper: GlyphMapper, options: RenderOptions) -> Self {
        Self { mapper, options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut RenderOptions {
        &mut self.options
    }

    /// Renders `buffer` in row-major order.
    ///
    /// Rows are processed in parallel. Each row owns a small generator seeded
    /// from `rng` before the parallel section starts, so a fixed `rng` gives
    /// identical output regardless of scheduling.
    pub fn render<R: RngCore + ?Sized>(
        &self,
        buffer: &FrameBuffer,
        frame_counter: u64,
        rng: &mut R,
    ) -> RenderedFrame {
        let w = buffer.width as usize;
        let h = buffer.height as usize;

        if w == 0 || h == 0 || buffer.data.len() < w * h * 4 {
            return self.assemble(Vec::new(), 0, 0);
        }

        let seeds: Vec<u64> = (0..h).map(|_| rng.next_u64()).collect();

        let rows: Vec<Vec<CellData>> = buffer.data[..w * h * 4]
            .par_chunks_exact(w * 4)
            .zip(seeds.par_iter())
            .enumerate()
            .map(|(row, (pixels, seed))| self.render_row(row, pixels, *seed, frame_counter))
            .collect();

        self.assemble(rows, w, h)
    }

    fn render_row(&self, row: usize, pixels: &[u8], seed: u64, frame_counter: u64) -> Vec<CellData> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let flicker = &self.options.flicker;

        pixels
            .chunks_exact(4)
            .enumerate()
            .map(|(col, px)| {
                let color = RgbColor(px[0], px[1], px[2]);
                let avg = (px[0] as f32 + px[1] as f32 + px[2] as f32) / 3.0;

                let position = match flicker.axis {
                    FlickerAxis::Row => row,
                    FlickerAxis::Column => col,
                } as u32;
                let factor = flicker_factor(position, frame_counter, flicker, &mut rng);

                CellData {
                    glyph: self.mapper.map_luminance(avg * factor),
                    color: color.dimmed(factor),
                }
            })
            .collect()
    }

    fn assemble(&self, rows: Vec<Vec<CellData>>, width: usize, height: usize) -> RenderedFrame {
        let body = if self.options.colorized {
            let mut tokens = Vec::with_capacity(height * (width + 1));
            for row in rows {
                tokens.extend(row.into_iter().map(Token::Glyph));
                tokens.push(Token::RowBreak);
            }
            FrameBody::Colored(tokens)
        } else {
            let mut text = String::with_capacity(height * (width + 1));
            for row in rows {
                text.extend(row.into_iter().map(|cell| cell.glyph));
                text.push('\n');
            }
            FrameBody::Plain(text)
        };

        RenderedFrame { width, height, body }
    }
}
