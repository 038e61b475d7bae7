//! Configuration management for simulation parameters.
//!
//! Strongly-typed sections that map to a `config.toml` (or the `[config]`
//! table of a scenario file). Every section has a `Default`, so a file only
//! needs to name the values it changes.
//!
//! ## Example `config.toml`
//!
//! ```toml
//! [world]
//! width = 40.0
//! height = 40.0
//! topology = "toroidal"
//! seed = 7
//!
//! [sensing]
//! radius = 8.0
//! fov_deg = 180.0
//!
//! [controller]
//! lambda_safety = 50.0
//!
//! [controller.mode]
//! kind = "adaptive_precision"
//! safety = "approach"
//! ```
//!
//! Configuration is validated once, before the first step; a [`SimError::Config`]
//! at that point is fatal.

use crate::ensure_config;
use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};

/// Boundary rule of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// Positions wrap modulo the extent; distances use the shortest image.
    Toroidal,
    /// Positions are clamped to the walls and the outward velocity component is dropped.
    #[default]
    Clamped,
    /// Positions are mirrored back inside and the outward velocity component is reversed.
    Reflective,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct WorldConfig {
    pub width: f64,
    pub height: f64,
    pub topology: Topology,
    pub seed: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 100.0,
            height: 100.0,
            topology: Topology::Clamped,
            seed: 42,
        }
    }
}

/// Radial bin spacing of the sensory grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RadialSpacing {
    Linear,
    /// Bin 0 covers the personal-space disc, the rest are log-spaced out to the radius.
    #[default]
    Log,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SensingConfig {
    pub radius: f64,
    /// Field of view in degrees, centred on the heading. 360 is a full ring.
    pub fov_deg: f64,
    pub radial_bins: usize,
    pub angular_bins: usize,
    pub spacing: RadialSpacing,
    pub personal_space: f64,
    /// Splat kernel widths in bin units.
    pub sigma_r: f64,
    pub sigma_theta: f64,
    /// Distance between perception samples taken along obstacle outlines.
    pub obstacle_spacing: f64,
    /// Kernel widening per unit of lagged haze.
    pub haze_blur: f64,
    /// Softness of the proximity weighting used by the safety term.
    pub proximity_tau: f64,
}

impl Default for SensingConfig {
    fn default() -> Self {
        Self {
            radius: 8.0,
            fov_deg: 360.0,
            radial_bins: 6,
            angular_bins: 12,
            spacing: RadialSpacing::Log,
            personal_space: 1.0,
            sigma_r: 0.5,
            sigma_theta: 0.5,
            obstacle_spacing: 0.5,
            haze_blur: 0.5,
            proximity_tau: 2.0,
        }
    }
}

/// How haze is derived from a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HazeStrategy {
    /// Saturating statistic of mean occupancy against `omega_threshold`.
    #[default]
    Occupancy,
    /// Uncertainty reported by the predictive model.
    Model,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct HazeConfig {
    pub h_max: f64,
    pub omega_threshold: f64,
    pub epsilon: f64,
    /// Haze assumed before the first estimate exists.
    pub prior: f64,
    /// Scale applied to model uncertainty before clamping to `h_max`.
    pub model_gain: f64,
    /// Self-haze raised while an agent makes no progress. Off when absent.
    pub stuck: Option<StuckHazeConfig>,
    /// Uniform environmental haze in `[0, 1]`; safety precision is scaled by `(1 - h)^2`.
    pub environment: f64,
    /// Per-channel haze for the safety term. Occupancy alone is read when absent.
    pub channels: Option<ChannelHazeConfig>,
}

impl Default for HazeConfig {
    fn default() -> Self {
        Self {
            h_max: 1.0,
            omega_threshold: 0.1,
            epsilon: 0.1,
            prior: 0.0,
            model_gain: 1.0,
            stuck: None,
            environment: 0.0,
            channels: None,
        }
    }
}

/// Stuck detection driving self-haze.
///
/// Every step slower than `speed` increments a counter, every other step
/// decrements it. Past `steps`, self-haze rises by `rise` per step up to 1;
/// below it, self-haze decays by `decay`. Self-haze attenuates the safety
/// precision of the frontal sector by `(1 - h)^2`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct StuckHazeConfig {
    pub speed: f64,
    pub steps: u32,
    pub rise: f64,
    pub decay: f64,
    pub sector_half_width_deg: f64,
}

impl Default for StuckHazeConfig {
    fn default() -> Self {
        Self {
            speed: 0.1,
            steps: 50,
            rise: 0.05,
            decay: 0.01,
            sector_half_width_deg: 60.0,
        }
    }
}

/// Static haze per grid channel; each channel's precision is `(1 - h)^gamma`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ChannelHazeConfig {
    pub occupancy: f64,
    /// Haze of the closing-speed reading taken from the radial velocity channel.
    pub closing: f64,
    pub gamma: f64,
}

impl Default for ChannelHazeConfig {
    fn default() -> Self {
        Self {
            occupancy: 0.0,
            closing: 0.0,
            gamma: 2.0,
        }
    }
}

/// Occupancy aggregation used by the safety term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SafetyAggregation {
    /// Mean proximity-weighted occupancy of the sector the motion points into.
    Mean,
    /// Max proximity-weighted occupancy of that sector.
    Max,
    /// Occupancy weighted by the approach rate towards every cell.
    #[default]
    Approach,
}

/// How extra action candidates are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSampling {
    /// Evenly spaced directions at full magnitude with a random phase.
    #[default]
    Ring,
    /// Uniform over the disc of admissible actions.
    Uniform,
    /// Jitter of angle and magnitude around the direct goal action.
    Perturb,
}

/// Experiment condition. Resolved once when the controller is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControllerMode {
    /// Goal term only.
    Baseline,
    /// Goal and safety terms, precision fixed at one.
    SpmOnly { safety: SafetyAggregation },
    /// Goal and safety terms, safety scaled by the lagged occupancy precision.
    AdaptivePrecision { safety: SafetyAggregation },
    /// All three terms; haze may come from the model.
    FullEph {
        safety: SafetyAggregation,
        haze: HazeStrategy,
    },
}

impl Default for ControllerMode {
    fn default() -> Self {
        ControllerMode::FullEph {
            safety: SafetyAggregation::Approach,
            haze: HazeStrategy::Occupancy,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ControllerConfig {
    pub mode: ControllerMode,
    pub lambda_goal: f64,
    pub lambda_safety: f64,
    pub lambda_epistemic: f64,
    /// Number of sampled candidates on top of the built-in ones.
    pub candidates: usize,
    pub sampling: CandidateSampling,
    /// Max angular jitter (radians) for [`CandidateSampling::Perturb`].
    pub perturb_angle: f64,
    /// Cruise speed of the desired velocity. Falls back to `dynamics.max_speed`.
    pub target_speed: Option<f64>,
    /// Half width (degrees) of the sector read by the mean/max safety aggregations.
    pub sector_half_width_deg: f64,
    /// Costs closer than this count as tied.
    pub tie_tolerance: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mode: ControllerMode::default(),
            lambda_goal: 1.0,
            lambda_safety: 10.0,
            lambda_epistemic: 1.0,
            candidates: 16,
            sampling: CandidateSampling::Ring,
            perturb_angle: 0.6,
            target_speed: None,
            sector_half_width_deg: 30.0,
            tie_tolerance: 1e-12,
        }
    }
}

/// Update law applied by the integrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DynamicsLaw {
    /// Action is a force: `v' = v + dt (u - damping v) / mass`.
    FirstOrder { mass: f64, damping: f64 },
    /// Action is a velocity command; the heading turns towards it at a bounded rate.
    HeadingAligned { max_turn_rate: f64 },
}

impl Default for DynamicsLaw {
    fn default() -> Self {
        DynamicsLaw::HeadingAligned {
            max_turn_rate: std::f64::consts::TAU,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DynamicsConfig {
    pub law: DynamicsLaw,
    pub dt: f64,
    pub max_speed: f64,
    /// Action bound for agents that do not carry their own.
    pub max_action: f64,
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            law: DynamicsLaw::default(),
            dt: 0.1,
            max_speed: 1.0,
            max_action: 1.0,
        }
    }
}

/// Response applied while an emergency override holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyResponse {
    /// Brake to a standstill.
    #[default]
    Stop,
    /// Full action directly away from the nearest threat.
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollisionHandling {
    /// Contacts are only counted.
    #[default]
    DetectOnly,
    /// Contacts are counted and a near miss triggers a bounded override.
    Emergency {
        /// Surface gap below which the override fires.
        trigger_distance: f64,
        response: EmergencyResponse,
        /// Steps the override holds once triggered.
        hold_steps: u32,
        /// Steps after release during which it cannot fire again.
        cooldown_steps: u32,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CollisionConfig {
    /// Extra gap added to the sum of radii when testing agent contacts.
    pub contact_margin: f64,
    pub handling: CollisionHandling,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            contact_margin: 0.0,
            handling: CollisionHandling::DetectOnly,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SimConfig {
    pub world: WorldConfig,
    pub sensing: SensingConfig,
    pub haze: HazeConfig,
    pub controller: ControllerConfig,
    pub dynamics: DynamicsConfig,
    pub collision: CollisionConfig,
    /// Steps between periodic summary log lines. Zero disables them.
    pub log_interval: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            sensing: SensingConfig::default(),
            haze: HazeConfig::default(),
            controller: ControllerConfig::default(),
            dynamics: DynamicsConfig::default(),
            collision: CollisionConfig::default(),
            log_interval: 1000,
        }
    }
}

fn finite_positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn finite_non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

impl SimConfig {
    /// Validates all configuration parameters.
    ///
    /// Returns the first violation as [`SimError::Config`]. Bin edge
    /// monotonicity is checked again when the grid layout is built.
    pub fn validate(&self) -> Result<()> {
        // World
        ensure_config!(finite_positive(self.world.width), "World width must be positive");
        ensure_config!(finite_positive(self.world.height), "World height must be positive");

        // Sensing
        let s = &self.sensing;
        ensure_config!(finite_positive(s.radius), "Sensing radius must be positive");
        ensure_config!(
            s.fov_deg.is_finite() && s.fov_deg > 0.0 && s.fov_deg <= 360.0,
            "Field of view must be in (0, 360] degrees"
        );
        ensure_config!(s.radial_bins >= 1, "Radial bin count must be at least 1");
        ensure_config!(s.angular_bins >= 1, "Angular bin count must be at least 1");
        ensure_config!(
            s.radial_bins <= 256 && s.angular_bins <= 256,
            "Bin counts too large (max 256)"
        );
        if s.spacing == RadialSpacing::Log {
            ensure_config!(
                s.radial_bins >= 2,
                "Log spacing needs at least 2 radial bins"
            );
            ensure_config!(
                finite_positive(s.personal_space) && s.personal_space < s.radius,
                "Personal space must be in (0, radius) for log spacing"
            );
        }
        ensure_config!(finite_positive(s.sigma_r), "sigma_r must be positive");
        ensure_config!(finite_positive(s.sigma_theta), "sigma_theta must be positive");
        ensure_config!(
            finite_positive(s.obstacle_spacing),
            "Obstacle sample spacing must be positive"
        );
        ensure_config!(finite_non_negative(s.haze_blur), "Haze blur must be non-negative");
        ensure_config!(finite_positive(s.proximity_tau), "Proximity tau must be positive");

        // Haze
        let h = &self.haze;
        ensure_config!(finite_positive(h.h_max), "h_max must be positive");
        ensure_config!(finite_positive(h.omega_threshold), "omega_threshold must be positive");
        ensure_config!(finite_positive(h.epsilon), "epsilon must be positive");
        ensure_config!(
            finite_non_negative(h.prior) && h.prior <= h.h_max,
            "Haze prior must be in [0, h_max]"
        );
        ensure_config!(finite_non_negative(h.model_gain), "Model gain must be non-negative");
        if let Some(stuck) = &h.stuck {
            ensure_config!(finite_non_negative(stuck.speed), "Stuck speed must be non-negative");
            ensure_config!(
                finite_non_negative(stuck.rise) && finite_non_negative(stuck.decay),
                "Self-haze rise and decay must be non-negative"
            );
            ensure_config!(
                stuck.sector_half_width_deg.is_finite()
                    && stuck.sector_half_width_deg > 0.0
                    && stuck.sector_half_width_deg <= 180.0,
                "Self-haze sector half width must be in (0, 180] degrees"
            );
        }
        ensure_config!(
            (0.0..=1.0).contains(&h.environment),
            "Environmental haze must be in [0, 1]"
        );
        if let Some(channels) = &h.channels {
            ensure_config!(
                (0.0..=1.0).contains(&channels.occupancy) && (0.0..=1.0).contains(&channels.closing),
                "Channel haze must be in [0, 1]"
            );
            ensure_config!(finite_non_negative(channels.gamma), "Channel gamma must be non-negative");
        }

        // Controller
        let c = &self.controller;
        for (name, w) in [
            ("lambda_goal", c.lambda_goal),
            ("lambda_safety", c.lambda_safety),
            ("lambda_epistemic", c.lambda_epistemic),
        ] {
            ensure_config!(finite_non_negative(w), "{name} must be finite and non-negative");
        }
        let active_weight = match c.mode {
            ControllerMode::Baseline => c.lambda_goal,
            ControllerMode::SpmOnly { .. } | ControllerMode::AdaptivePrecision { .. } => {
                c.lambda_goal + c.lambda_safety
            }
            ControllerMode::FullEph { .. } => c.lambda_goal + c.lambda_safety + c.lambda_epistemic,
        };
        ensure_config!(
            active_weight > 0.0,
            "All cost weights active in {:?} are zero; every candidate would tie",
            c.mode
        );
        ensure_config!(c.candidates <= 1024, "Candidate count too large (max 1024)");
        ensure_config!(
            finite_non_negative(c.perturb_angle),
            "Perturbation angle must be non-negative"
        );
        if let Some(speed) = c.target_speed {
            ensure_config!(finite_positive(speed), "Target speed must be positive");
        }
        ensure_config!(
            c.sector_half_width_deg.is_finite()
                && c.sector_half_width_deg > 0.0
                && c.sector_half_width_deg <= 180.0,
            "Sector half width must be in (0, 180] degrees"
        );
        ensure_config!(finite_non_negative(c.tie_tolerance), "Tie tolerance must be non-negative");

        // Dynamics
        let d = &self.dynamics;
        ensure_config!(finite_positive(d.dt), "Timestep must be positive");
        ensure_config!(finite_positive(d.max_speed), "Max speed must be positive");
        ensure_config!(finite_positive(d.max_action), "Max action must be positive");
        match d.law {
            DynamicsLaw::FirstOrder { mass, damping } => {
                ensure_config!(finite_positive(mass), "Mass must be positive");
                ensure_config!(finite_non_negative(damping), "Damping must be non-negative");
            }
            DynamicsLaw::HeadingAligned { max_turn_rate } => {
                ensure_config!(finite_positive(max_turn_rate), "Turn rate must be positive");
            }
        }

        // Collision
        ensure_config!(
            finite_non_negative(self.collision.contact_margin),
            "Contact margin must be non-negative"
        );
        if let CollisionHandling::Emergency {
            trigger_distance,
            hold_steps,
            ..
        } = self.collision.handling
        {
            ensure_config!(
                finite_positive(trigger_distance),
                "Emergency trigger distance must be positive"
            );
            ensure_config!(hold_steps > 0, "Emergency hold must last at least one step");
        }

        Ok(())
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config = toml::from_str::<Self>(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Digest of every behaviour-relevant section, for matching recorded runs to configs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(format!("{:?}", self.world).as_bytes());
        hasher.update(format!("{:?}", self.sensing).as_bytes());
        hasher.update(format!("{:?}", self.haze).as_bytes());
        hasher.update(format!("{:?}", self.controller).as_bytes());
        hasher.update(format!("{:?}", self.dynamics).as_bytes());
        hasher.update(format!("{:?}", self.collision).as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Cruise speed used for the desired velocity.
    #[must_use]
    pub fn target_speed(&self) -> f64 {
        self.controller
            .target_speed
            .unwrap_or(self.dynamics.max_speed)
            .min(self.dynamics.max_speed)
    }
}
