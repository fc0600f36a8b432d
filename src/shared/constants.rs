pub const APP_NAME: &str = "glyphrain";

pub const CONFIG_FILE: &str = "config.json";
pub const ERROR_LOG_FILE: &str = "glyphrain-error.log";
pub const DEBUG_LOG_FILE: &str = "glyphrain-debug.log";

/// Densest glyph first, sparsest (a space) last.
pub const DEFAULT_PALETTE: &str =
    "@&$#BWM80Q%OCJUXLIYTV1FPASZ/?cxyrjuvxznli()<>1{}*+=-~^\":,. ";

/// Sampling aspect ratio as (width, height).
pub const ASPECT_RATIO: (u32, u32) = (4, 3);

pub const DEFAULT_WIDTH: u32 = 160;
pub const MAX_WIDTH: u32 = 2048;
/// Explicit heights share the width ceiling.
pub const MAX_HEIGHT: u32 = MAX_WIDTH;
pub const WIDTH_STEP: u32 = 16;

pub const DEFAULT_FADE_RATE: u32 = 10;
pub const DEFAULT_HEAD_PROBABILITY: f64 = 0.05;

/// Seed cycle length of the cascade; seeds live in `0..FLICKER_CYCLE`.
pub const FLICKER_CYCLE: u64 = 100;
/// Dimmest factor a non-head pixel can receive.
pub const FLICKER_FLOOR: f32 = 0.2;

pub const DEFAULT_MAX_FPS: f64 = 60.0;
pub const DEFAULT_CAMERA_INDEX: i32 = 0;

pub const MIN_GLYPH_POINT_SIZE: u32 = 3;
pub const MAX_GLYPH_POINT_SIZE: u32 = 10;
pub const GLYPH_SIZE_WIDTH_DIVISOR: u32 = 50;

pub const FATAL_CAPTURE_MESSAGE: &str =
    "FATAL ERROR: Camera access denied or device unavailable. Please check permissions.";
pub const INVALID_WIDTH_MESSAGE: &str = "Please enter a valid resolution width.";

pub const STARTUP_TIMEOUT_MS: u64 = 5000;
