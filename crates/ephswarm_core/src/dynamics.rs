//! State integration under the two supported update laws.
//!
//! The controller asks the integrator two questions before acting:
//! what velocity a candidate action would produce ([`Integrator::predict_velocity`])
//! and which action would produce a desired velocity ([`Integrator::inverse`]).
//! Both agree exactly with [`Integrator::integrate`].

use crate::collision::{CollisionEvent, CollisionKind};
use crate::config::{DynamicsConfig, DynamicsLaw};
use crate::error::{Result, SimError};
use crate::geometry::{normalize_angle, Arena, HEADING_SPEED_EPS};
use crate::obstacles::ObstacleField;
use ephswarm_data::{Agent, Vec2};

/// Result of integrating one agent for one step.
#[derive(Debug, Clone)]
pub struct Integration {
    pub agent: Agent,
    pub contacts: Vec<CollisionEvent>,
}

#[derive(Debug, Clone)]
pub struct Integrator {
    law: DynamicsLaw,
    dt: f64,
    max_speed: f64,
    default_max_action: f64,
    arena: Arena,
}

struct Motion {
    position: Vec2,
    velocity: Vec2,
    heading: Option<f64>,
}

impl Integrator {
    #[must_use]
    pub fn new(config: &DynamicsConfig, arena: Arena) -> Self {
        Self {
            law: config.law,
            dt: config.dt,
            max_speed: config.max_speed,
            default_max_action: config.max_action,
            arena,
        }
    }

    #[inline]
    #[must_use]
    pub fn dt(&self) -> f64 {
        self.dt
    }

    #[inline]
    #[must_use]
    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    #[inline]
    #[must_use]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    #[inline]
    #[must_use]
    pub fn action_limit(&self, agent: &Agent) -> f64 {
        agent.action_limit(self.default_max_action)
    }

    #[inline]
    #[must_use]
    pub fn clamp_action(&self, agent: &Agent, action: Vec2) -> Vec2 {
        action.clamp_length(self.action_limit(agent))
    }

    /// Velocity after one step under `action`, before boundary and obstacle handling.
    #[must_use]
    pub fn predict_velocity(&self, agent: &Agent, action: Vec2) -> Vec2 {
        self.advance(agent, self.clamp_action(agent, action)).velocity
    }

    /// Action whose one-step velocity is as close to `desired` as the limits allow.
    #[must_use]
    pub fn inverse(&self, agent: &Agent, desired: Vec2) -> Vec2 {
        let raw = match self.law {
            DynamicsLaw::FirstOrder { mass, damping } => {
                (desired - agent.velocity) * (mass / self.dt) + agent.velocity * damping
            }
            DynamicsLaw::HeadingAligned { .. } => desired,
        };
        self.clamp_action(agent, raw)
    }

    fn advance(&self, agent: &Agent, u: Vec2) -> Motion {
        match self.law {
            DynamicsLaw::FirstOrder { mass, damping } => {
                let v = agent.velocity;
                let velocity = (v + (u - v * damping) * (self.dt / mass)).clamp_length(self.max_speed);
                let heading = if velocity.length() > HEADING_SPEED_EPS {
                    Some(velocity.angle())
                } else {
                    agent.heading
                };
                Motion {
                    position: agent.position + velocity * self.dt,
                    velocity,
                    heading,
                }
            }
            DynamicsLaw::HeadingAligned { max_turn_rate } => {
                let command = u.length();
                if command < HEADING_SPEED_EPS {
                    return Motion {
                        position: agent.position,
                        velocity: Vec2::ZERO,
                        heading: agent.heading,
                    };
                }
                let h0 = agent.heading.unwrap_or_else(|| {
                    if agent.speed() > HEADING_SPEED_EPS {
                        agent.velocity.angle()
                    } else {
                        u.angle()
                    }
                });
                let max_turn = max_turn_rate * self.dt;
                let delta = normalize_angle(u.angle() - h0).clamp(-max_turn, max_turn);
                let speed = command.min(self.max_speed);
                let h1 = normalize_angle(h0 + delta);
                // Midpoint rule along the turning arc.
                let mid = Vec2::from_angle(h0 + 0.5 * delta);
                Motion {
                    position: agent.position + mid * (speed * self.dt),
                    velocity: Vec2::from_angle(h1) * speed,
                    heading: Some(h1),
                }
            }
        }
    }

    /// Applies `action` to `agent` and resolves boundaries and obstacle contacts.
    ///
    /// Agents overlapping an obstacle are pushed back onto its surface and
    /// lose the velocity component pointing into it; each push is reported.
    pub fn integrate(
        &self,
        agent: &Agent,
        action: Vec2,
        obstacles: &ObstacleField,
        step: u64,
    ) -> Result<Integration> {
        let u = self.clamp_action(agent, action);
        let motion = self.advance(agent, u);
        for (quantity, value) in [
            ("position.x", motion.position.x),
            ("position.y", motion.position.y),
            ("velocity.x", motion.velocity.x),
            ("velocity.y", motion.velocity.y),
        ] {
            if !value.is_finite() {
                return Err(SimError::NonFinite {
                    agent: agent.id,
                    step,
                    quantity,
                    value,
                });
            }
        }

        let (mut position, mut velocity) = self.arena.confine(motion.position, motion.velocity);
        let mut contacts = Vec::new();

        let touching: Vec<usize> = obstacles
            .hits_within(&self.arena, position, agent.radius)
            .map(|hit| hit.index)
            .collect();
        for index in touching {
            let hit = obstacles.surface_hit(&self.arena, index, position);
            let gap = if hit.inside {
                -hit.distance()
            } else {
                hit.distance()
            };
            if gap >= agent.radius {
                continue;
            }
            let outward = if hit.inside { hit.offset } else { -hit.offset };
            let normal = outward
                .normalized(1e-12)
                .or_else(|| (-velocity).normalized(1e-12))
                .unwrap_or(Vec2::new(1.0, 0.0));
            position = hit.point + normal * agent.radius;
            let into = velocity.dot(normal);
            if into < 0.0 {
                velocity -= normal * into;
            }
            contacts.push(CollisionEvent {
                step,
                agent: agent.id,
                kind: CollisionKind::Obstacle { index },
                distance: gap,
            });
        }
        if !contacts.is_empty() {
            (position, velocity) = self.arena.confine(position, velocity);
        }

        let mut next = agent.clone();
        next.position = position;
        next.velocity = velocity;
        next.heading = motion.heading;
        next.last_action = u;
        Ok(Integration {
            agent: next,
            contacts,
        })
    }
}
