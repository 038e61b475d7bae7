//! Plain data records shared by the swarm engine, the I/O layer and the runner.

pub mod data;

pub use data::agent::{Agent, AgentId, EmergencyState, Goal, StuckState};
pub use data::obstacle::{Obstacle, ObstacleShape};
pub use data::vector::Vec2;
