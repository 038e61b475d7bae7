use super::vector::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable index of an agent inside the world arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u32);

impl AgentId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

/// Where an agent wants to go.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Goal {
    /// A target position in world coordinates.
    Point { at: Vec2 },
    /// A fixed travel direction; normalised on use.
    Direction { towards: Vec2 },
}

impl Default for Goal {
    fn default() -> Self {
        Goal::Direction {
            towards: Vec2::new(1.0, 0.0),
        }
    }
}

/// Bounded-duration emergency override bookkeeping.
///
/// `active` counts the steps the override still holds; `cooldown` counts the
/// steps during which a fresh trigger is ignored after a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmergencyState {
    pub active: u32,
    pub cooldown: u32,
}

impl EmergencyState {
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active > 0
    }

    #[inline]
    #[must_use]
    pub fn can_trigger(&self) -> bool {
        self.active == 0 && self.cooldown == 0
    }
}

/// Stuck bookkeeping behind self-haze.
///
/// `counter` rises on every slow step and falls on every other one; `haze`
/// climbs while the counter is past its threshold and decays otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StuckState {
    pub counter: u32,
    pub haze: f64,
}

fn default_precision() -> f64 {
    1.0
}

fn default_radius() -> f64 {
    0.5
}

/// A point agent navigating the arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub position: Vec2,
    #[serde(default)]
    pub velocity: Vec2,
    /// Tracked heading in radians. `None` until the agent first moves, in
    /// which case the egocentric frame falls back to velocity, then goal.
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub goal: Goal,
    #[serde(default)]
    pub group: u16,
    /// Body radius used for contact detection.
    #[serde(default = "default_radius")]
    pub radius: f64,
    /// Per-agent bound on the action magnitude. `None` uses the configured default.
    #[serde(default)]
    pub max_action: Option<f64>,
    /// Precision carried over from the previous step's haze estimate.
    #[serde(default = "default_precision")]
    pub precision: f64,
    /// Haze that produced `precision`.
    #[serde(default)]
    pub haze: f64,
    #[serde(default)]
    pub last_action: Vec2,
    #[serde(default)]
    pub emergency: EmergencyState,
    #[serde(default)]
    pub stuck: StuckState,
}

impl Agent {
    #[must_use]
    pub fn new(id: u32, position: Vec2, goal: Goal) -> Self {
        Self {
            id: AgentId(id),
            position,
            velocity: Vec2::ZERO,
            heading: None,
            goal,
            group: 0,
            radius: default_radius(),
            max_action: None,
            precision: default_precision(),
            haze: 0.0,
            last_action: Vec2::ZERO,
            emergency: EmergencyState::default(),
            stuck: StuckState::default(),
        }
    }

    #[must_use]
    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    #[must_use]
    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: u16) -> Self {
        self.group = group;
        self
    }

    #[must_use]
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    #[must_use]
    pub fn with_max_action(mut self, max_action: f64) -> Self {
        self.max_action = Some(max_action);
        self
    }

    /// Effective action bound given the configured fallback.
    #[inline]
    #[must_use]
    pub fn action_limit(&self, default_limit: f64) -> f64 {
        self.max_action.unwrap_or(default_limit)
    }

    #[inline]
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.velocity.length()
    }
}
