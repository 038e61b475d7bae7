//! Self-haze: a bounded uncertainty scalar derived from a sensory grid.
//!
//! Haze feeds back as precision `1 / (haze + epsilon)` on the *next* step,
//! where it both widens the perception kernel and scales the safety term.
//!
//! Three optional modulations sit on top of that scalar and are applied
//! cell by cell inside the safety term (see [`SafetyModulation`]):
//! stuck-driven self-haze on the frontal sector, uniform environmental
//! haze, and a static per-channel precision `(1 - h)^gamma`.

use crate::config::{ChannelHazeConfig, HazeConfig, HazeStrategy, StuckHazeConfig};
use crate::model::{checked_predict, ModelError, PredictiveModel};
use crate::spm::SensoryGrid;
use ephswarm_data::{StuckState, Vec2};
use serde::{Deserialize, Serialize};

/// Exponent of the self and environmental haze attenuation.
const HAZE_ATTENUATION_GAMMA: f64 = 2.0;

/// Precision for a haze value; strictly positive and finite for any finite haze.
#[inline]
#[must_use]
pub fn precision(haze: f64, epsilon: f64) -> f64 {
    1.0 / (haze.max(0.0) + epsilon)
}

/// Precision factor `(1 - h)^gamma` for a haze `h` clamped into `[0, 1]`.
#[inline]
#[must_use]
pub fn attenuation(haze: f64, gamma: f64) -> f64 {
    let h = if haze.is_finite() { haze.clamp(0.0, 1.0) } else { 0.0 };
    (1.0 - h).powf(gamma)
}

/// Precision of each channel the safety term reads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelPrecision {
    pub occupancy: f64,
    pub closing: f64,
}

impl ChannelPrecision {
    #[must_use]
    pub fn from_config(config: &ChannelHazeConfig) -> Self {
        Self {
            occupancy: attenuation(config.occupancy, config.gamma),
            closing: attenuation(config.closing, config.gamma),
        }
    }
}

/// Cell weights applied inside the safety term on top of the scalar precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyModulation {
    /// Factor on cells whose bearing lies within `frontal_half_width` of forward.
    pub frontal: f64,
    pub frontal_half_width: f64,
    /// Factor on every cell.
    pub environment: f64,
    /// When set, a cell costs `occ * (occupancy + closing * closing_rate)`.
    pub channels: Option<ChannelPrecision>,
}

impl SafetyModulation {
    /// Leaves the safety term untouched.
    pub const NONE: Self = Self {
        frontal: 1.0,
        frontal_half_width: 0.0,
        environment: 1.0,
        channels: None,
    };

    /// Factor for a cell at egocentric `bearing`.
    #[inline]
    #[must_use]
    pub fn cell_factor(&self, bearing: f64) -> f64 {
        if self.frontal < 1.0 && bearing.abs() <= self.frontal_half_width {
            self.environment * self.frontal
        } else {
            self.environment
        }
    }
}

impl Default for SafetyModulation {
    fn default() -> Self {
        Self::NONE
    }
}

/// Tracks how long an agent has been stalled and turns it into self-haze.
#[derive(Debug, Clone, Copy)]
pub struct StuckDetector {
    speed: f64,
    steps: u32,
    rise: f64,
    decay: f64,
    sector_half_width: f64,
}

impl StuckDetector {
    #[must_use]
    pub fn new(config: &StuckHazeConfig) -> Self {
        Self {
            speed: config.speed,
            steps: config.steps,
            rise: config.rise,
            decay: config.decay,
            sector_half_width: config.sector_half_width_deg.to_radians(),
        }
    }

    /// State after one more step at `speed`.
    #[must_use]
    pub fn update(&self, state: StuckState, speed: f64) -> StuckState {
        let counter = if speed < self.speed {
            state.counter.saturating_add(1)
        } else {
            state.counter.saturating_sub(1)
        };
        let haze = if counter > self.steps {
            (state.haze + self.rise).min(1.0)
        } else {
            (state.haze - self.decay).max(0.0)
        };
        StuckState { counter, haze }
    }

    #[must_use]
    pub fn sector_half_width(&self) -> f64 {
        self.sector_half_width
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HazeEstimate {
    pub haze: f64,
    pub precision: f64,
    /// The model strategy fell back to zero haze.
    pub model_failed: bool,
}

#[derive(Debug, Clone)]
pub struct HazeEstimator {
    strategy: HazeStrategy,
    h_max: f64,
    omega_threshold: f64,
    epsilon: f64,
    model_gain: f64,
    stuck: Option<StuckDetector>,
    environment: f64,
    channels: Option<ChannelPrecision>,
}

impl HazeEstimator {
    #[must_use]
    pub fn new(config: &HazeConfig, strategy: HazeStrategy) -> Self {
        Self {
            strategy,
            h_max: config.h_max,
            omega_threshold: config.omega_threshold,
            epsilon: config.epsilon,
            model_gain: config.model_gain,
            stuck: config.stuck.as_ref().map(StuckDetector::new),
            environment: config.environment,
            channels: config.channels.as_ref().map(ChannelPrecision::from_config),
        }
    }

    /// Advances the stuck state. Without stuck detection it stays at rest.
    #[must_use]
    pub fn update_stuck(&self, state: StuckState, speed: f64) -> StuckState {
        match &self.stuck {
            Some(detector) => detector.update(state, speed),
            None => StuckState::default(),
        }
    }

    /// Safety modulation for an agent carrying `self_haze`.
    #[must_use]
    pub fn modulation(&self, self_haze: f64) -> SafetyModulation {
        let (frontal, frontal_half_width) = match &self.stuck {
            Some(detector) => (
                attenuation(self_haze, HAZE_ATTENUATION_GAMMA),
                detector.sector_half_width(),
            ),
            None => (1.0, 0.0),
        };
        SafetyModulation {
            frontal,
            frontal_half_width,
            environment: attenuation(self.environment, HAZE_ATTENUATION_GAMMA),
            channels: self.channels,
        }
    }

    #[must_use]
    pub fn strategy(&self) -> HazeStrategy {
        self.strategy
    }

    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    fn finish(&self, haze: f64, model_failed: bool) -> HazeEstimate {
        let haze = if haze.is_finite() {
            haze.clamp(0.0, self.h_max)
        } else {
            0.0
        };
        HazeEstimate {
            haze,
            precision: precision(haze, self.epsilon),
            model_failed,
        }
    }

    /// Estimate for an arbitrary haze value, clamped into `[0, h_max]`.
    #[must_use]
    pub fn from_haze(&self, haze: f64) -> HazeEstimate {
        self.finish(haze, false)
    }

    /// Saturating occupancy statistic: `h_max * min(1, mean_occupancy / omega)`.
    #[must_use]
    pub fn occupancy_haze(&self, grid: &SensoryGrid) -> f64 {
        self.h_max * (grid.mean_occupancy() / self.omega_threshold).min(1.0)
    }

    /// Haze of a grid under the configured strategy.
    ///
    /// The model strategy queries `model` with `action_hint` (egocentric).
    /// A failed query yields zero haze with `model_failed` set; the error is
    /// returned alongside so the caller can log it.
    pub fn estimate(
        &self,
        grid: &SensoryGrid,
        action_hint: Vec2,
        model: &dyn PredictiveModel,
    ) -> (HazeEstimate, Option<ModelError>) {
        match self.strategy {
            HazeStrategy::Occupancy => (self.finish(self.occupancy_haze(grid), false), None),
            HazeStrategy::Model => match checked_predict(model, grid, action_hint) {
                Ok(p) => (self.finish(self.model_gain * p.uncertainty, false), None),
                Err(e) => (self.finish(0.0, true), Some(e)),
            },
        }
    }
}
