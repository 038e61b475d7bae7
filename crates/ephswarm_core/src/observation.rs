//! Per-step output handed to loggers, recorders and tests.
//!
//! Nothing in the core reads these back; the serde derives only fix a shape
//! for external consumers.

use crate::collision::CollisionEvent;
use crate::controller::{CandidateSource, FreeEnergyTerms, OverrideKind};
use ephswarm_data::{AgentId, Vec2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentObservation {
    pub id: AgentId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub heading: Option<f64>,
    /// Action applied this step.
    pub action: Vec2,
    /// Haze and precision the step's decision used (lagged by one step).
    pub haze: f64,
    pub precision: f64,
    /// Haze estimated from this step's grid, used from the next step on.
    pub next_haze: f64,
    /// Stuck-driven haze applied to the frontal sector this step.
    #[serde(default)]
    pub self_haze: f64,
    pub override_kind: Option<OverrideKind>,
    pub terms: FreeEnergyTerms,
    pub candidate: CandidateSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Index of the step that produced this report, starting at 0.
    pub step: u64,
    pub observations: Vec<AgentObservation>,
    pub collisions: Vec<CollisionEvent>,
    pub overrides: usize,
    pub model_failures: u64,
}

impl StepReport {
    #[must_use]
    pub fn agent_collisions(&self) -> usize {
        self.collisions
            .iter()
            .filter(|e| matches!(e.kind, crate::collision::CollisionKind::Agent { .. }))
            .count()
    }
}
