//! Temporal "rain" modulation.
//!
//! Every pixel gets a factor in `[0.2, 1.0]` derived from its position along
//! the cascade axis and the frame clock, so a band of equal brightness sweeps
//! across the image as the clock advances. A few random "head" pixels stay at
//! full brightness.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::shared::constants::{self, FLICKER_CYCLE, FLICKER_FLOOR};

pub const HEAD_FACTOR: f32 = 1.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FlickerAxis {
    /// Vertical rain: the row drives the phase.
    Row,
    /// Horizontal banding: the column drives the phase.
    Column,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CascadeDirection {
    /// Bands move toward higher rows/columns as the clock advances.
    Falling,
    /// Bands move toward lower rows/columns.
    Rising,
}

/// How the head check shares randomness with the jitter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HeadMode {
    /// One draw for the head check, another for the jitter.
    Independent,
    /// A single draw decides the head and, failing that, becomes the jitter.
    Shared,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlickerConfig {
    pub enabled: bool,
    pub axis: FlickerAxis,
    pub direction: CascadeDirection,
    /// Seed stride between neighbouring rows; also the jitter bound.
    pub fade_rate: u32,
    pub head_probability: f64,
    pub head_mode: HeadMode,
    pub jitter: bool,
}

impl Default for FlickerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            axis: FlickerAxis::Row,
            direction: CascadeDirection::Falling,
            fade_rate: constants::DEFAULT_FADE_RATE,
            head_probability: constants::DEFAULT_HEAD_PROBABILITY,
            head_mode: HeadMode::Independent,
            jitter: true,
        }
    }
}

impl FlickerConfig {
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Flicker with every random term switched off.
    #[cfg(test)]
    pub fn deterministic() -> Self {
        Self {
            head_probability: 0.0,
            jitter: false,
            ..Self::default()
        }
    }
}

/// Cascade phase in `0..FLICKER_CYCLE`.
///
/// Each term is reduced modulo the cycle before combining, and the falling
/// variant adds one full cycle before subtracting the clock, so the result is
/// non-negative for any `frame_counter`.
#[inline]
pub fn cascade_seed(
    position: u32,
    frame_counter: u64,
    jitter: u32,
    fade_rate: u32,
    direction: CascadeDirection,
) -> u32 {
    let spatial = (position as u64 * fade_rate as u64) % FLICKER_CYCLE;
    let clock = frame_counter % FLICKER_CYCLE;
    let jitter = jitter as u64 % FLICKER_CYCLE;

    let seed = match direction {
        CascadeDirection::Falling => spatial + FLICKER_CYCLE - clock + jitter,
        CascadeDirection::Rising => spatial + clock + jitter,
    };
    (seed % FLICKER_CYCLE) as u32
}

/// Remaps a seed into `[FLICKER_FLOOR, 1.0)`.
#[inline]
pub fn seed_to_factor(seed: u32) -> f32 {
    (seed as f32 / FLICKER_CYCLE as f32) * (1.0 - FLICKER_FLOOR) + FLICKER_FLOOR
}

/// Brightness factor for one pixel.
pub fn flicker_factor<R: Rng + ?Sized>(
    position: u32,
    frame_counter: u64,
    config: &FlickerConfig,
    rng: &mut R,
) -> f32 {
    if !config.enabled {
        return HEAD_FACTOR;
    }

    let jitter = match config.head_mode {
        HeadMode::Independent => {
            if rng.gen::<f64>() < config.head_probability {
                return HEAD_FACTOR;
            }
            if config.jitter && config.fade_rate > 0 {
                rng.gen_range(0..config.fade_rate)
            } else {
                0
            }
        }
        HeadMode::Shared => {
            let draw = rng.gen::<f64>();
            if draw < config.head_probability {
                return HEAD_FACTOR;
            }
            if config.jitter && config.fade_rate > 0 {
                // draw is in [p, 1) here, so the span is positive
                let span = 1.0 - config.head_probability;
                let unit = ((draw - config.head_probability) / span).clamp(0.0, 1.0);
                ((unit * config.fade_rate as f64) as u32).min(config.fade_rate - 1)
            } else {
                0
            }
        }
    };

    let seed = cascade_seed(
        position,
        frame_counter,
        jitter,
        config.fade_rate,
        config.direction,
    );
    seed_to_factor(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_factor_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for head_mode in [HeadMode::Independent, HeadMode::Shared] {
            for direction in [CascadeDirection::Falling, CascadeDirection::Rising] {
                let config = FlickerConfig {
                    head_mode,
                    direction,
                    fade_rate: 50,
                    ..FlickerConfig::default()
                };
                for position in [0u32, 1, 17, 119, 4096, u32::MAX] {
                    for counter in [0u64, 1, 99, 100, 12_345, u64::MAX - 1, u64::MAX] {
                        let f = flicker_factor(position, counter, &config, &mut rng);
                        assert!((FLICKER_FLOOR..=1.0).contains(&f), "{} at {}/{}", f, position, counter);
                    }
                }
            }
        }
    }

    #[test]
    fn test_head_returns_full_brightness() {
        let config = FlickerConfig {
            head_probability: 1.0,
            ..FlickerConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        for row in 0..50 {
            assert_eq!(flicker_factor(row, row as u64 * 3, &config, &mut rng), 1.0);
        }

        let shared = FlickerConfig {
            head_mode: HeadMode::Shared,
            ..config
        };
        assert_eq!(flicker_factor(9, 9, &shared, &mut rng), 1.0);
    }

    #[test]
    fn test_head_rate_tracks_probability() {
        const DRAWS: u32 = 10_000;
        for head_mode in [HeadMode::Independent, HeadMode::Shared] {
            for p in [0.05, 0.3] {
                let config = FlickerConfig {
                    head_mode,
                    head_probability: p,
                    ..FlickerConfig::default()
                };
                let mut rng = StdRng::seed_from_u64(42);
                // non-head factors top out below 1.0, so exact 1.0 marks a head
                let heads = (0..DRAWS)
                    .filter(|&i| flicker_factor(i % 120, i as u64, &config, &mut rng) == 1.0)
                    .count();
                let rate = heads as f64 / DRAWS as f64;
                let tolerance = 5.0 * (p * (1.0 - p) / DRAWS as f64).sqrt();
                assert!((rate - p).abs() < tolerance, "{:?} p={} rate={}", head_mode, p, rate);
            }
        }
    }

    #[test]
    fn test_disabled_is_identity() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = FlickerConfig::disabled();
        for row in 0..20 {
            assert_eq!(flicker_factor(row, 77, &config, &mut rng), 1.0);
        }
    }

    #[test]
    fn test_deterministic_values() {
        // StepRng(0, 0) always yields 0.0, which would always be a head unless p == 0
        let mut rng = StepRng::new(0, 0);
        let config = FlickerConfig::deterministic();
        assert_eq!(flicker_factor(0, 0, &config, &mut rng), 0.2);
        // row 1 * fade 10 = seed 10
        let f = flicker_factor(1, 0, &config, &mut rng);
        assert!((f - 0.28).abs() < 1e-6, "{}", f);
        // falling: one frame later the same row is one step dimmer, wrapping at the cycle
        assert_eq!(cascade_seed(0, 1, 0, 10, CascadeDirection::Falling), 99);
        assert_eq!(cascade_seed(0, 1, 0, 10, CascadeDirection::Rising), 1);
    }

    #[test]
    fn test_falling_band_moves_down() {
        let fade = 10;
        for row in 0..30u32 {
            for t in [0u64, 5, 123, 9_999] {
                let now = cascade_seed(row, t, 0, fade, CascadeDirection::Falling);
                let later = cascade_seed(row + 1, t + fade as u64, 0, fade, CascadeDirection::Falling);
                assert_eq!(now, later);

                let rising_later =
                    cascade_seed(row, t + fade as u64, 0, fade, CascadeDirection::Rising);
                assert_eq!(cascade_seed(row + 1, t, 0, fade, CascadeDirection::Rising), rising_later);
            }
        }
    }

    #[test]
    fn test_large_counter_wraps_cleanly() {
        let seed = cascade_seed(3, u64::MAX, 49, 50, CascadeDirection::Falling);
        assert!(seed < FLICKER_CYCLE as u32);
        // u64::MAX % 100 == 15; (150 % 100) + 100 - 15 + 49 = 184 -> 84
        assert_eq!(seed, 84);
    }

    #[test]
    fn test_zero_fade_rate_has_no_jitter() {
        let config = FlickerConfig {
            fade_rate: 0,
            head_probability: 0.0,
            ..FlickerConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        // phase depends on the clock only: (100 - 30) % 100 = 70
        for row in 0..10 {
            let f = flicker_factor(row, 30, &config, &mut rng);
            assert!((f - seed_to_factor(70)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_shared_draw_jitter_bounded() {
        let config = FlickerConfig {
            head_mode: HeadMode::Shared,
            head_probability: 0.1,
            fade_rate: 7,
            ..FlickerConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(99);
        let base = seed_to_factor(cascade_seed(2, 0, 0, 7, CascadeDirection::Falling));
        let top = seed_to_factor(cascade_seed(2, 0, 6, 7, CascadeDirection::Falling));
        for _ in 0..500 {
            let f = flicker_factor(2, 0, &config, &mut rng);
            assert!(f == HEAD_FACTOR || (f >= base - 1e-6 && f <= top + 1e-6), "{}", f);
        }
    }
}
