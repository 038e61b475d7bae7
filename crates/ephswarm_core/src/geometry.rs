//! Arena topology and egocentric frame helpers.

use crate::config::{Topology, WorldConfig};
use ephswarm_data::{Agent, Goal, Vec2};
use std::f64::consts::{PI, TAU};

/// Speed below which the velocity does not define a heading.
pub const HEADING_SPEED_EPS: f64 = 1e-6;

/// Wraps an angle into `[-PI, PI)`.
#[inline]
#[must_use]
pub fn normalize_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(TAU) - PI
}

/// Bounded world extent together with its boundary rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arena {
    pub width: f64,
    pub height: f64,
    pub topology: Topology,
}

impl Arena {
    #[must_use]
    pub fn new(width: f64, height: f64, topology: Topology) -> Self {
        Self {
            width,
            height,
            topology,
        }
    }

    #[must_use]
    pub fn from_config(config: &WorldConfig) -> Self {
        Self::new(config.width, config.height, config.topology)
    }

    #[inline]
    #[must_use]
    pub fn is_toroidal(&self) -> bool {
        self.topology == Topology::Toroidal
    }

    /// Displacement from `from` to `to`. On a torus this is the shortest image.
    #[inline]
    #[must_use]
    pub fn relative(&self, from: Vec2, to: Vec2) -> Vec2 {
        let mut d = to - from;
        if self.is_toroidal() {
            d.x -= self.width * (d.x / self.width).round();
            d.y -= self.height * (d.y / self.height).round();
        }
        d
    }

    #[inline]
    #[must_use]
    pub fn distance(&self, from: Vec2, to: Vec2) -> f64 {
        self.relative(from, to).length()
    }

    /// Applies the boundary rule to an integrated position and velocity.
    #[must_use]
    pub fn confine(&self, position: Vec2, velocity: Vec2) -> (Vec2, Vec2) {
        match self.topology {
            Topology::Toroidal => (
                Vec2::new(wrap(position.x, self.width), wrap(position.y, self.height)),
                velocity,
            ),
            Topology::Clamped => {
                let (x, vx) = clamp_axis(position.x, velocity.x, self.width);
                let (y, vy) = clamp_axis(position.y, velocity.y, self.height);
                (Vec2::new(x, y), Vec2::new(vx, vy))
            }
            Topology::Reflective => {
                let (x, vx) = reflect_axis(position.x, velocity.x, self.width);
                let (y, vy) = reflect_axis(position.y, velocity.y, self.height);
                (Vec2::new(x, y), Vec2::new(vx, vy))
            }
        }
    }
}

fn wrap(v: f64, extent: f64) -> f64 {
    let w = v.rem_euclid(extent);
    // rem_euclid of a tiny negative can round up to `extent` itself.
    if w >= extent {
        0.0
    } else {
        w
    }
}

fn clamp_axis(p: f64, v: f64, extent: f64) -> (f64, f64) {
    if p < 0.0 {
        (0.0, v.max(0.0))
    } else if p > extent {
        (extent, v.min(0.0))
    } else {
        (p, v)
    }
}

fn reflect_axis(p: f64, v: f64, extent: f64) -> (f64, f64) {
    if p < 0.0 {
        ((-p).min(extent), v.abs())
    } else if p > extent {
        ((2.0 * extent - p).max(0.0), -v.abs())
    } else {
        (p, v)
    }
}

/// Heading that defines an agent's egocentric forward axis.
///
/// Tracked heading first, then the velocity direction, then the goal direction.
#[must_use]
pub fn frame_heading(agent: &Agent, arena: &Arena) -> f64 {
    if let Some(h) = agent.heading {
        return h;
    }
    if agent.speed() > HEADING_SPEED_EPS {
        return agent.velocity.angle();
    }
    goal_direction(agent, arena).map_or(0.0, Vec2::angle)
}

/// Unit vector from the agent towards its goal, `None` once the goal point is reached.
#[must_use]
pub fn goal_direction(agent: &Agent, arena: &Arena) -> Option<Vec2> {
    match agent.goal {
        Goal::Point { at } => arena.relative(agent.position, at).normalized(1e-9),
        Goal::Direction { towards } => towards.normalized(1e-12),
    }
}

/// Rotates a world-frame vector into the frame whose forward axis is `heading`.
#[inline]
#[must_use]
pub fn to_local(v: Vec2, heading: f64) -> Vec2 {
    v.rotated(-heading)
}

/// Inverse of [`to_local`].
#[inline]
#[must_use]
pub fn to_world(v: Vec2, heading: f64) -> Vec2 {
    v.rotated(heading)
}
