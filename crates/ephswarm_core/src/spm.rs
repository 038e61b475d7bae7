//! Egocentric polar sensory grid (SPM).
//!
//! Each agent's neighbours and nearby obstacle outlines are rotated into the
//! agent's heading frame, binned by (radius, bearing) and splatted with a
//! truncated Gaussian so that small motions change the grid continuously.
//!
//! Channels:
//! - `Occupancy`: max kernel weight landing in the cell, always in `[0, 1]`.
//! - `RadialVelocity`: weight-averaged relative velocity along the line of sight
//!   (positive = receding).
//! - `TangentialVelocity`: weight-averaged relative velocity across it.
//!
//! The grid only spans the sensing disc and the field of view, so every cell
//! outside them is zero by construction.

use crate::config::{RadialSpacing, SensingConfig};
use crate::ensure_config;
use crate::error::{Result, SimError};
use crate::geometry::{frame_heading, normalize_angle, to_local, Arena};
use crate::obstacles::ObstacleField;
use ephswarm_data::{Agent, AgentId, Vec2};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

pub const CHANNELS: usize = 3;

/// Kernel support in standard deviations.
const KERNEL_SIGMAS: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Occupancy = 0,
    RadialVelocity = 1,
    TangentialVelocity = 2,
}

/// A `CHANNELS x radial_bins x angular_bins` tensor, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensoryGrid {
    radial_bins: usize,
    angular_bins: usize,
    /// Field of view in radians, centred on forward.
    fov: f64,
    radius: f64,
    data: Vec<f64>,
}

impl SensoryGrid {
    #[must_use]
    pub fn zeros(radial_bins: usize, angular_bins: usize, fov: f64, radius: f64) -> Self {
        Self {
            radial_bins,
            angular_bins,
            fov,
            radius,
            data: vec![0.0; CHANNELS * radial_bins * angular_bins],
        }
    }

    /// A zeroed grid with the same geometry.
    #[must_use]
    pub fn zeros_like(&self) -> Self {
        Self::zeros(self.radial_bins, self.angular_bins, self.fov, self.radius)
    }

    #[inline]
    #[must_use]
    pub fn shape(&self) -> (usize, usize, usize) {
        (CHANNELS, self.radial_bins, self.angular_bins)
    }

    #[inline]
    #[must_use]
    pub fn radial_bins(&self) -> usize {
        self.radial_bins
    }

    #[inline]
    #[must_use]
    pub fn angular_bins(&self) -> usize {
        self.angular_bins
    }

    #[inline]
    #[must_use]
    pub fn fov(&self) -> f64 {
        self.fov
    }

    #[inline]
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    #[inline]
    fn index(&self, channel: Channel, r: usize, t: usize) -> usize {
        ((channel as usize) * self.radial_bins + r) * self.angular_bins + t
    }

    #[inline]
    #[must_use]
    pub fn get(&self, channel: Channel, r: usize, t: usize) -> f64 {
        self.data[self.index(channel, r, t)]
    }

    #[inline]
    pub fn set(&mut self, channel: Channel, r: usize, t: usize, value: f64) {
        let i = self.index(channel, r, t);
        self.data[i] = value;
    }

    #[inline]
    #[must_use]
    pub fn occupancy(&self, r: usize, t: usize) -> f64 {
        self.get(Channel::Occupancy, r, t)
    }

    #[must_use]
    pub fn channel(&self, channel: Channel) -> &[f64] {
        let n = self.radial_bins * self.angular_bins;
        let start = channel as usize * n;
        &self.data[start..start + n]
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.radial_bins * self.angular_bins
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0)
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    #[must_use]
    pub fn same_shape(&self, other: &SensoryGrid) -> bool {
        self.radial_bins == other.radial_bins && self.angular_bins == other.angular_bins
    }

    #[must_use]
    pub fn mean_occupancy(&self) -> f64 {
        let occ = self.channel(Channel::Occupancy);
        if occ.is_empty() {
            0.0
        } else {
            occ.iter().sum::<f64>() / occ.len() as f64
        }
    }

    #[must_use]
    pub fn max_occupancy(&self) -> f64 {
        self.channel(Channel::Occupancy)
            .iter()
            .copied()
            .fold(0.0, f64::max)
    }

    #[inline]
    #[must_use]
    pub fn angular_width(&self) -> f64 {
        self.fov / self.angular_bins as f64
    }

    /// Egocentric bearing of the centre of angular bin `t`.
    #[inline]
    #[must_use]
    pub fn bin_angle(&self, t: usize) -> f64 {
        -0.5 * self.fov + (t as f64 + 0.5) * self.angular_width()
    }

    #[must_use]
    pub fn is_full_circle(&self) -> bool {
        (self.fov - TAU).abs() < 1e-9
    }
}

/// Fixed bin geometry for a run.
#[derive(Debug, Clone)]
pub struct GridLayout {
    pub radius: f64,
    pub fov: f64,
    pub radial_bins: usize,
    pub angular_bins: usize,
    pub spacing: RadialSpacing,
    pub personal_space: f64,
    /// `radial_bins + 1` strictly increasing edges from 0 to `radius`.
    pub edges: Vec<f64>,
    /// Proximity weight per radial bin, used by the safety term.
    pub proximity: Vec<f64>,
}

impl GridLayout {
    pub fn from_config(config: &SensingConfig) -> Result<Self> {
        let nr = config.radial_bins;
        let radius = config.radius;
        let ps = config.personal_space;
        let edges: Vec<f64> = match config.spacing {
            RadialSpacing::Linear => (0..=nr).map(|i| radius * i as f64 / nr as f64).collect(),
            RadialSpacing::Log => {
                let mut e = vec![0.0];
                for i in 1..=nr {
                    e.push(ps * (radius / ps).powf((i - 1) as f64 / (nr - 1) as f64));
                }
                e
            }
        };
        ensure_config!(
            edges.windows(2).all(|w| w[1] > w[0]),
            "Radial bin edges are not strictly increasing: {edges:?}"
        );

        let mut layout = Self {
            radius,
            fov: config.fov_deg.to_radians(),
            radial_bins: nr,
            angular_bins: config.angular_bins,
            spacing: config.spacing,
            personal_space: ps,
            edges,
            proximity: Vec::new(),
        };
        layout.proximity = (0..nr)
            .map(|r| {
                let d = layout.bin_center_distance(r);
                1.0 / (1.0 + ((d - ps) / config.proximity_tau).exp())
            })
            .collect();
        Ok(layout)
    }

    #[must_use]
    pub fn is_full_circle(&self) -> bool {
        (self.fov - TAU).abs() < 1e-9
    }

    /// Continuous radial coordinate: bin `i` spans `[i, i + 1)`.
    #[must_use]
    pub fn radial_coord(&self, d: f64) -> f64 {
        let nr = self.radial_bins as f64;
        match self.spacing {
            RadialSpacing::Linear => d / self.radius * nr,
            RadialSpacing::Log => {
                let ps = self.personal_space;
                if d < ps {
                    d / ps
                } else {
                    1.0 + (nr - 1.0) * (d / ps).ln() / (self.radius / ps).ln()
                }
            }
        }
    }

    /// Distance at the centre of radial bin `r`.
    #[must_use]
    pub fn bin_center_distance(&self, r: usize) -> f64 {
        let nr = self.radial_bins as f64;
        let rho = r as f64 + 0.5;
        match self.spacing {
            RadialSpacing::Linear => rho * self.radius / nr,
            RadialSpacing::Log => {
                let ps = self.personal_space;
                if r == 0 {
                    0.5 * ps
                } else {
                    ps * (self.radius / ps).powf((rho - 1.0) / (nr - 1.0))
                }
            }
        }
    }

    /// Continuous angular coordinate of a bearing, `None` outside the field of view.
    #[must_use]
    pub fn angular_coord(&self, bearing: f64) -> Option<f64> {
        let half = 0.5 * self.fov;
        let b = normalize_angle(bearing);
        if !self.is_full_circle() && (b < -half || b >= half) {
            return None;
        }
        Some((b + half) / self.fov * self.angular_bins as f64)
    }

    #[must_use]
    pub fn empty_grid(&self) -> SensoryGrid {
        SensoryGrid::zeros(self.radial_bins, self.angular_bins, self.fov, self.radius)
    }
}

/// Accumulates splats before velocity averages are resolved.
struct Splatter<'a> {
    layout: &'a GridLayout,
    grid: SensoryGrid,
    weight: Vec<f64>,
    sigma_r: f64,
    sigma_t: f64,
}

impl Splatter<'_> {
    fn splat(&mut self, rho: f64, alpha: f64, v_radial: f64, v_tangential: f64) {
        let nr = self.layout.radial_bins;
        let nt = self.layout.angular_bins;
        let full = self.layout.is_full_circle();
        let q_cut = 0.5 * KERNEL_SIGMAS * KERNEL_SIGMAS;
        let floor_w = (-q_cut).exp();
        let reach = KERNEL_SIGMAS * self.sigma_r;

        let lo = (rho - 0.5 - reach).ceil().max(0.0) as usize;
        let hi = ((rho - 0.5 + reach).floor()).min(nr as f64 - 1.0);
        if hi < 0.0 {
            return;
        }
        let hi = hi as usize;

        for r in lo..=hi {
            let dr = (r as f64 + 0.5 - rho) / self.sigma_r;
            for t in 0..nt {
                let mut dt = t as f64 + 0.5 - alpha;
                if full {
                    dt -= nt as f64 * (dt / nt as f64).round();
                }
                let dt = dt / self.sigma_t;
                let q = 0.5 * (dr * dr + dt * dt);
                if q >= q_cut {
                    continue;
                }
                let w = ((-q).exp() - floor_w) / (1.0 - floor_w);
                let cell = r * nt + t;
                let occ = self.grid.occupancy(r, t);
                if w > occ {
                    self.grid.set(Channel::Occupancy, r, t, w);
                }
                self.weight[cell] += w;
                let vr = self.grid.get(Channel::RadialVelocity, r, t);
                let vt = self.grid.get(Channel::TangentialVelocity, r, t);
                self.grid.set(Channel::RadialVelocity, r, t, vr + w * v_radial);
                self.grid.set(Channel::TangentialVelocity, r, t, vt + w * v_tangential);
            }
        }
    }

    fn finish(mut self) -> SensoryGrid {
        let nt = self.layout.angular_bins;
        for r in 0..self.layout.radial_bins {
            for t in 0..nt {
                let w = self.weight[r * nt + t];
                if w > 0.0 {
                    let vr = self.grid.get(Channel::RadialVelocity, r, t) / w;
                    let vt = self.grid.get(Channel::TangentialVelocity, r, t) / w;
                    self.grid.set(Channel::RadialVelocity, r, t, vr);
                    self.grid.set(Channel::TangentialVelocity, r, t, vt);
                }
            }
        }
        self.grid
    }
}

fn check_finite(agent: &Agent, step: u64) -> Result<()> {
    let checks = [
        ("position.x", agent.position.x),
        ("position.y", agent.position.y),
        ("velocity.x", agent.velocity.x),
        ("velocity.y", agent.velocity.y),
    ];
    for (quantity, value) in checks {
        if !value.is_finite() {
            return Err(non_finite(agent.id, step, quantity, value));
        }
    }
    Ok(())
}

fn non_finite(agent: AgentId, step: u64, quantity: &'static str, value: f64) -> SimError {
    SimError::NonFinite {
        agent,
        step,
        quantity,
        value,
    }
}

/// Builds sensory grids for every agent of a run.
#[derive(Debug, Clone)]
pub struct GridBuilder {
    layout: GridLayout,
    sigma_r: f64,
    sigma_theta: f64,
    haze_blur: f64,
    epsilon: f64,
}

/// What an observer can see this step.
pub struct Percept<'a> {
    pub observer: &'a Agent,
    pub neighbors: &'a [&'a Agent],
    pub obstacles: &'a ObstacleField,
    pub arena: &'a Arena,
    /// Precision from the previous step; low precision blurs the kernel.
    pub precision_hint: f64,
    pub step: u64,
}

impl GridBuilder {
    pub fn new(config: &SensingConfig, epsilon: f64) -> Result<Self> {
        Ok(Self {
            layout: GridLayout::from_config(config)?,
            sigma_r: config.sigma_r,
            sigma_theta: config.sigma_theta,
            haze_blur: config.haze_blur,
            epsilon,
        })
    }

    #[must_use]
    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Haze implied by a precision value.
    fn haze_from_precision(&self, precision: f64) -> f64 {
        if precision.is_finite() && precision > 0.0 {
            (1.0 / precision - self.epsilon).max(0.0)
        } else {
            0.0
        }
    }

    /// Kernel widths after the haze blur.
    #[must_use]
    pub fn kernel_widths(&self, precision_hint: f64) -> (f64, f64) {
        let scale = 1.0 + self.haze_blur * self.haze_from_precision(precision_hint);
        let mut sigma_t = self.sigma_theta * scale;
        if self.layout.is_full_circle() {
            // Keep the support within half a turn so the wrap stays unambiguous.
            sigma_t = sigma_t.min(self.layout.angular_bins as f64 / (2.0 * KERNEL_SIGMAS));
        }
        (self.sigma_r * scale, sigma_t)
    }

    /// Builds the grid for `percept.observer`.
    ///
    /// Fails only on non-finite positions or velocities of the observer or
    /// of a neighbour it is handed.
    pub fn build(&self, percept: &Percept<'_>) -> Result<SensoryGrid> {
        let observer = percept.observer;
        check_finite(observer, percept.step)?;

        let (sigma_r, sigma_t) = self.kernel_widths(percept.precision_hint);
        let mut splatter = Splatter {
            layout: &self.layout,
            grid: self.layout.empty_grid(),
            weight: vec![0.0; self.layout.radial_bins * self.layout.angular_bins],
            sigma_r,
            sigma_t,
        };

        let heading = frame_heading(observer, percept.arena);
        let forward = Vec2::from_angle(heading);
        let r2 = self.layout.radius * self.layout.radius;

        let mut observe = |rel: Vec2, v_rel: Vec2| {
            let d2 = rel.length_squared();
            if d2 >= r2 {
                return;
            }
            let local = to_local(rel, heading);
            let Some(alpha) = self.layout.angular_coord(local.angle()) else {
                return;
            };
            let rho = self.layout.radial_coord(d2.sqrt());
            let e_r = rel.normalized(1e-12).unwrap_or(forward);
            splatter.splat(rho, alpha, v_rel.dot(e_r), v_rel.dot(e_r.perp()));
        };

        for neighbor in percept.neighbors {
            if neighbor.id == observer.id {
                continue;
            }
            check_finite(neighbor, percept.step)?;
            let rel = percept.arena.relative(observer.position, neighbor.position);
            observe(rel, neighbor.velocity - observer.velocity);
        }

        let still = -observer.velocity;
        for index in 0..percept.obstacles.len() {
            let hit = percept
                .obstacles
                .surface_hit(percept.arena, index, observer.position);
            if !hit.inside && hit.distance() >= self.layout.radius {
                continue;
            }
            for point in percept
                .obstacles
                .perception_points(percept.arena, index, observer.position)
            {
                observe(point - observer.position, still);
            }
        }

        Ok(splatter.finish())
    }
}
