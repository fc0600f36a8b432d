use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::session::Resolution;
use crate::renderer::flicker::{CascadeDirection, FlickerAxis, FlickerConfig, HeadMode};
use crate::renderer::glyph::{GlyphMapper, Palette, Polarity};
use crate::renderer::processor::RenderOptions;
use crate::shared::constants;
use crate::utils::file_utils;

/// Everything a session needs, loaded from JSON and overridden from the CLI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub width: u32,
    /// Overrides the 4:3 height for the initial resolution only.
    pub height: Option<u32>,
    pub palette: String,
    pub polarity: Polarity,
    pub colorized: bool,
    pub flicker: FlickerConfig,
    pub camera_index: i32,
    pub max_fps: f64,
    pub width_step: u32,
    pub threads: Option<usize>,
    /// Fixes the flicker randomness; entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            width: constants::DEFAULT_WIDTH,
            height: None,
            palette: constants::DEFAULT_PALETTE.to_string(),
            polarity: Polarity::default(),
            colorized: false,
            flicker: FlickerConfig::default(),
            camera_index: constants::DEFAULT_CAMERA_INDEX,
            max_fps: constants::DEFAULT_MAX_FPS,
            width_step: constants::WIDTH_STEP,
            threads: None,
            seed: None,
        }
    }
}

impl AppConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Invalid configuration JSON")
    }

    /// Reads `path`, or the default location when it exists, or falls back
    /// to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path: Option<PathBuf> = match path {
            Some(p) => Some(p.to_path_buf()),
            None => file_utils::default_config_path().filter(|p| p.is_file()),
        };

        match path {
            Some(p) => {
                let text = file_utils::read_to_string(&p)?;
                Self::from_json(&text).with_context(|| format!("in {:?}", p))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.width > constants::MAX_WIDTH {
            bail!("width must be between 1 and {}, got {}", constants::MAX_WIDTH, self.width);
        }
        if let Some(height) = self.height {
            if height == 0 || height > constants::MAX_HEIGHT {
                bail!("height must be between 1 and {}, got {}", constants::MAX_HEIGHT, height);
            }
        }
        Palette::new(&self.palette).context("invalid palette")?;
        let p = self.flicker.head_probability;
        if !(0.0..=1.0).contains(&p) {
            bail!("head probability must be within [0, 1], got {}", p);
        }
        if !(self.max_fps > 0.0 && self.max_fps.is_finite()) {
            bail!("max fps must be positive, got {}", self.max_fps);
        }
        if self.threads == Some(0) {
            bail!("thread count must be positive");
        }
        Ok(())
    }

    pub fn resolution(&self) -> Resolution {
        match self.height {
            Some(height) => Resolution::new(self.width, height),
            None => Resolution::from_width(self.width),
        }
    }

    pub fn glyph_mapper(&self) -> Result<GlyphMapper> {
        Ok(GlyphMapper::new(Palette::new(&self.palette)?, self.polarity))
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            colorized: self.colorized,
            flicker: self.flicker.clone(),
        }
    }

    pub fn apply_overrides(&mut self, o: &ConfigOverrides) {
        if let Some(width) = o.width {
            self.width = width;
        }
        if o.height.is_some() {
            self.height = o.height;
        }
        if let Some(palette) = &o.palette {
            self.palette = palette.clone();
        }
        if let Some(polarity) = o.polarity {
            self.polarity = polarity;
        }
        if o.color {
            self.colorized = true;
        }
        if o.mono {
            self.colorized = false;
        }
        if o.no_flicker {
            self.flicker.enabled = false;
        }
        if let Some(axis) = o.axis {
            self.flicker.axis = axis;
        }
        if let Some(direction) = o.direction {
            self.flicker.direction = direction;
        }
        if let Some(rate) = o.fade_rate {
            self.flicker.fade_rate = rate;
        }
        if let Some(p) = o.head_probability {
            self.flicker.head_probability = p;
        }
        if let Some(mode) = o.head_mode {
            self.flicker.head_mode = mode;
        }
        if o.no_jitter {
            self.flicker.jitter = false;
        }
        if let Some(index) = o.camera {
            self.camera_index = index;
        }
        if let Some(fps) = o.fps {
            self.max_fps = fps;
        }
        if o.threads.is_some() {
            self.threads = o.threads;
        }
        if o.seed.is_some() {
            self.seed = o.seed;
        }
    }
}

/// Command-line overrides shared by every rendering subcommand.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// JSON configuration file (defaults to <config dir>/glyphrain/config.json)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Sampling width in pixels; the height follows a 4:3 aspect ratio
    #[arg(short, long)]
    pub width: Option<u32>,
    /// Explicit initial sampling height
    #[arg(long)]
    pub height: Option<u32>,
    /// Glyphs from densest to sparsest
    #[arg(long)]
    pub palette: Option<String>,
    #[arg(long, value_enum)]
    pub polarity: Option<Polarity>,
    /// Emit truecolor glyphs
    #[arg(short, long, conflicts_with = "mono")]
    pub color: bool,
    /// Emit plain glyphs
    #[arg(long)]
    pub mono: bool,
    /// Disable the rain overlay
    #[arg(long)]
    pub no_flicker: bool,
    #[arg(long, value_enum)]
    pub axis: Option<FlickerAxis>,
    #[arg(long, value_enum)]
    pub direction: Option<CascadeDirection>,
    /// Seed stride between rows; larger values give wider stripes
    #[arg(long)]
    pub fade_rate: Option<u32>,
    /// Chance that a pixel is drawn at full brightness
    #[arg(long)]
    pub head_probability: Option<f64>,
    #[arg(long, value_enum)]
    pub head_mode: Option<HeadMode>,
    /// Disable per-pixel phase jitter
    #[arg(long)]
    pub no_jitter: bool,
    /// Camera device index
    #[arg(long)]
    pub camera: Option<i32>,
    /// Tick rate cap
    #[arg(long)]
    pub fps: Option<f64>,
    /// Render worker threads (defaults to the number of CPUs)
    #[arg(long)]
    pub threads: Option<usize>,
    /// Seed for the flicker randomness
    #[arg(long)]
    pub seed: Option<u64>,
}

impl ConfigOverrides {
    /// File (or defaults) with these overrides applied, validated.
    pub fn resolve(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load(self.config.as_deref())?;
        config.apply_overrides(self);
        config.validate()?;
        Ok(config)
    }
}
