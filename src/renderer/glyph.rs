use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::shared::constants;

/// Which end of the palette bright pixels land on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Polarity {
    /// Bright pixels pick the ink-heavy glyphs at the front of the palette.
    LightOnDark,
    /// Dark pixels pick the ink-heavy glyphs.
    DarkOnLight,
}

impl Default for Polarity {
    fn default() -> Self {
        Polarity::LightOnDark
    }
}

/// Glyphs ordered from visually densest (index 0) to sparsest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    glyphs: Vec<char>,
}

impl Palette {
    pub fn new(glyphs: &str) -> Result<Self> {
        let glyphs: Vec<char> = glyphs.chars().filter(|c| !c.is_control()).collect();
        if glyphs.is_empty() {
            bail!("palette must contain at least one printable glyph");
        }
        Ok(Self { glyphs })
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn glyph(&self, index: usize) -> char {
        self.glyphs[index.min(self.glyphs.len() - 1)]
    }

    #[cfg(test)]
    pub fn densest(&self) -> char {
        self.glyphs[0]
    }

    #[cfg(test)]
    pub fn sparsest(&self) -> char {
        self.glyphs[self.glyphs.len() - 1]
    }

    #[cfg(test)]
    pub fn contains(&self, glyph: char) -> bool {
        self.glyphs.contains(&glyph)
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            glyphs: constants::DEFAULT_PALETTE.chars().collect(),
        }
    }
}

/// Quantizes luminance onto a palette.
#[derive(Clone, Debug)]
pub struct GlyphMapper {
    palette: Palette,
    polarity: Polarity,
}

impl GlyphMapper {
    pub fn new(palette: Palette, polarity: Polarity) -> Self {
        Self { palette, polarity }
    }

    #[cfg(test)]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Bucket of `avg` in `0..palette.len()`; total over every `f32`.
    #[inline]
    pub fn bucket(&self, avg: f32) -> usize {
        let len = self.palette.len();
        // NaN and negatives saturate to 0 in the cast
        let index = (avg / 256.0 * len as f32).floor() as usize;
        index.min(len - 1)
    }

    /// Palette index selected for `avg`.
    #[inline]
    pub fn density_index(&self, avg: f32) -> usize {
        let bucket = self.bucket(avg);
        match self.polarity {
            Polarity::LightOnDark => self.palette.len() - 1 - bucket,
            Polarity::DarkOnLight => bucket,
        }
    }

    #[inline]
    pub fn map_luminance(&self, avg: f32) -> char {
        self.palette.glyph(self.density_index(avg))
    }
}

impl Default for GlyphMapper {
    fn default() -> Self {
        Self::new(Palette::default(), Polarity::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_palette_rejected() {
        assert!(Palette::new("").is_err());
        assert!(Palette::new("\n\t").is_err());
        assert_eq!(Palette::new("@. ").unwrap().len(), 3);
    }

    #[test]
    fn test_every_luminance_maps_into_palette() {
        for polarity in [Polarity::LightOnDark, Polarity::DarkOnLight] {
            let mapper = GlyphMapper::new(Palette::default(), polarity);
            for v in 0..=255u32 {
                let glyph = mapper.map_luminance(v as f32);
                assert!(mapper.palette().contains(glyph), "{} -> {:?}", v, glyph);
            }
        }
    }

    #[test]
    fn test_density_index_monotonic() {
        let mapper = GlyphMapper::default();
        let mut last = usize::MAX;
        for v in 0..=255u32 {
            let idx = mapper.density_index(v as f32);
            assert!(idx <= last, "index rose at {}", v);
            last = idx;
        }

        let mirrored = GlyphMapper::new(Palette::default(), Polarity::DarkOnLight);
        let mut last = 0;
        for v in 0..=255u32 {
            let idx = mirrored.density_index(v as f32);
            assert!(idx >= last, "index fell at {}", v);
            last = idx;
        }
    }

    #[test]
    fn test_extremes() {
        let palette = Palette::default();
        let light = GlyphMapper::new(palette.clone(), Polarity::LightOnDark);
        assert_eq!(light.map_luminance(0.0), palette.sparsest());
        assert_eq!(light.map_luminance(255.0), palette.densest());

        let dark = GlyphMapper::new(palette.clone(), Polarity::DarkOnLight);
        assert_eq!(dark.map_luminance(0.0), palette.densest());
        assert_eq!(dark.map_luminance(255.0), palette.sparsest());
    }

    #[test]
    fn test_out_of_domain_inputs_clamp() {
        let mapper = GlyphMapper::new(Palette::new("abc").unwrap(), Polarity::DarkOnLight);
        assert_eq!(mapper.map_luminance(-40.0), 'a');
        assert_eq!(mapper.map_luminance(f32::NAN), 'a');
        assert_eq!(mapper.map_luminance(10_000.0), 'c');
        assert_eq!(mapper.map_luminance(f32::INFINITY), 'c');
    }

    #[test]
    fn test_single_glyph_palette() {
        let mapper = GlyphMapper::new(Palette::new("#").unwrap(), Polarity::LightOnDark);
        assert_eq!(mapper.map_luminance(0.0), '#');
        assert_eq!(mapper.map_luminance(255.0), '#');
    }
}
