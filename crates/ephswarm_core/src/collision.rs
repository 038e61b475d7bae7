//! Contact detection and proximity threats.
//!
//! Contacts are data, never errors: each one is reported once per step as a
//! [`CollisionEvent`]. Agent pairs are checked after the step commits;
//! obstacle contacts come out of the integrator's push-out.

use crate::geometry::Arena;
use crate::obstacles::ObstacleField;
use crate::spatial_hash::SpatialHash;
use ephswarm_data::{Agent, AgentId, Vec2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "with", rename_all = "snake_case")]
pub enum CollisionKind {
    Agent { other: AgentId },
    Obstacle { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionEvent {
    pub step: u64,
    pub agent: AgentId,
    pub kind: CollisionKind,
    /// Centre distance for agent pairs; signed surface gap before push-out for obstacles.
    pub distance: f64,
}

/// Every overlapping agent pair `(i, j)` with `i < j`, ordered by `(i, j)`.
///
/// A pair overlaps when its centre distance is below the sum of radii plus `margin`.
#[must_use]
pub fn detect_agent_contacts(
    agents: &[Agent],
    hash: &SpatialHash,
    arena: &Arena,
    margin: f64,
    step: u64,
) -> Vec<CollisionEvent> {
    let max_radius = agents.iter().map(|a| a.radius).fold(0.0, f64::max);
    let reach = 2.0 * max_radius + margin;
    let mut events = Vec::new();
    let mut nearby = Vec::new();
    for (i, a) in agents.iter().enumerate() {
        hash.query_into(a.position, reach, &mut nearby);
        for &j in &nearby {
            if j <= i {
                continue;
            }
            let b = &agents[j];
            let d = arena.distance(a.position, b.position);
            if d < a.radius + b.radius + margin {
                events.push(CollisionEvent {
                    step,
                    agent: a.id,
                    kind: CollisionKind::Agent { other: b.id },
                    distance: d,
                });
            }
        }
    }
    events
}

/// Closest thing an agent could run into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threat {
    /// Surface-to-surface gap; negative when overlapping.
    pub gap: f64,
    /// Unit vector from the agent towards the threat.
    pub direction: Vec2,
}

/// Nearest agent or obstacle whose gap is below `reach`.
#[must_use]
pub fn nearest_threat(
    index: usize,
    agents: &[Agent],
    hash: &SpatialHash,
    arena: &Arena,
    obstacles: &ObstacleField,
    reach: f64,
) -> Option<Threat> {
    let me = &agents[index];
    let max_radius = agents.iter().map(|a| a.radius).fold(0.0, f64::max);
    let mut best: Option<Threat> = None;
    let mut consider = |gap: f64, offset: Vec2| {
        if gap >= reach || best.is_some_and(|b| b.gap <= gap) {
            return;
        }
        let direction = offset
            .normalized(1e-12)
            .or_else(|| me.velocity.normalized(1e-12))
            .unwrap_or(Vec2::new(1.0, 0.0));
        best = Some(Threat { gap, direction });
    };

    hash.query_callback(me.position, reach + me.radius + max_radius, |j| {
        if j == index {
            return;
        }
        let other = &agents[j];
        let offset = arena.relative(me.position, other.position);
        consider(offset.length() - me.radius - other.radius, offset);
    });

    for i in 0..obstacles.len() {
        let hit = obstacles.surface_hit(arena, i, me.position);
        let gap = if hit.inside {
            -hit.distance() - me.radius
        } else {
            hit.distance() - me.radius
        };
        let offset = if hit.inside { -hit.offset } else { hit.offset };
        consider(gap, offset);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Topology;
    use ephswarm_data::{Goal, Obstacle};

    fn world(positions: &[(f64, f64)], topology: Topology) -> (Vec<Agent>, SpatialHash, Arena) {
        let arena = Arena::new(20.0, 20.0, topology);
        let agents: Vec<Agent> = positions
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| Agent::new(i as u32, Vec2::new(x, y), Goal::default()))
            .collect();
        let mut hash = SpatialHash::new(2.0, &arena);
        hash.build(&agents.iter().map(|a| a.position).collect::<Vec<_>>());
        (agents, hash, arena)
    }

    #[test]
    fn test_overlapping_pair_reported_once() {
        let (agents, hash, arena) =
            world(&[(5.0, 5.0), (5.8, 5.0), (12.0, 12.0)], Topology::Clamped);
        let events = detect_agent_contacts(&agents, &hash, &arena, 0.0, 3);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].agent, AgentId(0));
        assert_eq!(events[0].kind, CollisionKind::Agent { other: AgentId(1) });
        assert_eq!(events[0].step, 3);
    }

    #[test]
    fn test_touching_is_not_a_contact() {
        let (agents, hash, arena) = world(&[(5.0, 5.0), (6.0, 5.0)], Topology::Clamped);
        assert!(detect_agent_contacts(&agents, &hash, &arena, 0.0, 0).is_empty());
        assert_eq!(detect_agent_contacts(&agents, &hash, &arena, 0.1, 0).len(), 1);
    }

    #[test]
    fn test_contact_across_torus_edge() {
        let (agents, hash, arena) = world(&[(0.2, 10.0), (19.9, 10.0)], Topology::Toroidal);
        let events = detect_agent_contacts(&agents, &hash, &arena, 0.0, 0);
        assert_eq!(events.len(), 1);
        assert!((events[0].distance - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_nearest_threat_prefers_closest_surface() {
        let (agents, hash, arena) = world(&[(5.0, 5.0), (8.0, 5.0)], Topology::Clamped);
        let field = ObstacleField::new(vec![Obstacle::point(Vec2::new(5.0, 6.5))], 0.5);
        let threat = nearest_threat(0, &agents, &hash, &arena, &field, 3.0).unwrap();
        assert!((threat.gap - 1.0).abs() < 1e-9);
        assert!((threat.direction.y - 1.0).abs() < 1e-9);
        assert!(nearest_threat(0, &agents, &hash, &arena, &field, 0.5).is_none());
    }
}
