//! Predictive model seam.
//!
//! The controller treats a model as a frozen function from `(grid, action)`
//! to a predicted next grid plus a scalar uncertainty. Models must be
//! side-effect free: they are called concurrently from every agent's
//! decision. Failures are per call and never abort a step.

use crate::spm::{Channel, SensoryGrid};
use ephswarm_data::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Prediction unavailable: {0}")]
    Unavailable(String),

    #[error("Prediction shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        got: (usize, usize, usize),
    },

    #[error("Prediction contains non-finite values")]
    NonFinite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub reconstruction: SensoryGrid,
    pub uncertainty: f64,
}

/// `predict(grid, action) -> (reconstruction, uncertainty)`.
///
/// `action` is expressed in the grid's egocentric frame (forward = +x).
pub trait PredictiveModel: Send + Sync + fmt::Debug {
    fn predict(&self, grid: &SensoryGrid, action: Vec2) -> Result<Prediction, ModelError>;

    fn name(&self) -> &str;

    /// True for the stand-in used when no model is configured.
    fn is_null(&self) -> bool {
        false
    }
}

/// Calls `model` and rejects malformed output.
///
/// Negative uncertainty is read as zero.
pub fn checked_predict(
    model: &dyn PredictiveModel,
    grid: &SensoryGrid,
    action: Vec2,
) -> Result<Prediction, ModelError> {
    let mut prediction = model.predict(grid, action)?;
    if !prediction.reconstruction.same_shape(grid) {
        return Err(ModelError::ShapeMismatch {
            expected: grid.shape(),
            got: prediction.reconstruction.shape(),
        });
    }
    if !prediction.uncertainty.is_finite() || !prediction.reconstruction.is_finite() {
        return Err(ModelError::NonFinite);
    }
    prediction.uncertainty = prediction.uncertainty.max(0.0);
    Ok(prediction)
}

/// Model used when none is attached: echoes the grid with zero uncertainty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullModel;

impl PredictiveModel for NullModel {
    fn predict(&self, grid: &SensoryGrid, _action: Vec2) -> Result<Prediction, ModelError> {
        Ok(Prediction {
            reconstruction: grid.clone(),
            uncertainty: 0.0,
        })
    }

    fn name(&self) -> &str {
        "null"
    }

    fn is_null(&self) -> bool {
        true
    }
}

fn default_horizon() -> f64 {
    1.0
}

fn default_gain() -> f64 {
    1.0
}

/// Deterministic transport model.
///
/// Occupancy in each cell is moved along its ray by the cell's radial
/// velocity minus the candidate action's component along that ray, over
/// `horizon` time units. Radial displacement is converted to bins assuming
/// linear spacing. Uncertainty is `gain` times the mean squared change of
/// occupancy, so actions that reshuffle the percept more are less predictable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdvectionModel {
    #[serde(default = "default_horizon")]
    pub horizon: f64,
    #[serde(default = "default_gain")]
    pub gain: f64,
}

impl Default for AdvectionModel {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
            gain: default_gain(),
        }
    }
}

fn deposit(grid: &mut SensoryGrid, r: i64, t: usize, value: f64) {
    if r < 0 || r as usize >= grid.radial_bins() || value <= 0.0 {
        return;
    }
    let r = r as usize;
    if value > grid.occupancy(r, t) {
        grid.set(Channel::Occupancy, r, t, value);
    }
}

impl PredictiveModel for AdvectionModel {
    fn predict(&self, grid: &SensoryGrid, action: Vec2) -> Result<Prediction, ModelError> {
        if !action.is_finite() {
            return Err(ModelError::Unavailable("non-finite action".into()));
        }
        let nr = grid.radial_bins();
        let nt = grid.angular_bins();
        let bins_per_unit = nr as f64 / grid.radius();

        let mut next = grid.zeros_like();
        for t in 0..nt {
            let ray = Vec2::from_angle(grid.bin_angle(t));
            let closing = action.dot(ray);
            for r in 0..nr {
                next.set(Channel::RadialVelocity, r, t, grid.get(Channel::RadialVelocity, r, t));
                next.set(
                    Channel::TangentialVelocity,
                    r,
                    t,
                    grid.get(Channel::TangentialVelocity, r, t),
                );
                let occ = grid.occupancy(r, t);
                if occ <= 0.0 {
                    continue;
                }
                let shift = (grid.get(Channel::RadialVelocity, r, t) - closing)
                    * self.horizon
                    * bins_per_unit;
                let target = r as f64 + shift;
                let lo = target.floor();
                let frac = target - lo;
                deposit(&mut next, lo as i64, t, occ * (1.0 - frac));
                deposit(&mut next, lo as i64 + 1, t, occ * frac);
            }
        }

        let before = grid.channel(Channel::Occupancy);
        let after = next.channel(Channel::Occupancy);
        let mse = before
            .iter()
            .zip(after)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            / before.len().max(1) as f64;

        Ok(Prediction {
            reconstruction: next,
            uncertainty: self.gain * mse,
        })
    }

    fn name(&self) -> &str {
        "advection"
    }
}

/// Serializable description of a model artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    #[default]
    Null,
    Advection(AdvectionModel),
}

impl ModelSpec {
    #[must_use]
    pub fn build(&self) -> Arc<dyn PredictiveModel> {
        match *self {
            ModelSpec::Null => Arc::new(NullModel),
            ModelSpec::Advection(model) => Arc::new(model),
        }
    }
}
