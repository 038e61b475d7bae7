//! Expected-free-energy action selection.
//!
//! Every agent scores a small candidate set each step:
//!
//! ```text
//! total(u) = λ_goal · |v'(u) - v_des|²
//!          + λ_safety · Π · S(grid, v'(u))
//!          + λ_epistemic · uncertainty(grid, u)
//! ```
//!
//! where `v'(u)` is the velocity the integrator would produce and `Π` the
//! precision carried over from the previous step. In the precision-weighted
//! modes `S` also applies the agent's [`SafetyModulation`]. The minimum wins; near
//! ties go to the candidate closest to the current velocity. An emergency
//! override, when configured, can replace the winner for a bounded number
//! of steps.

use crate::collision::Threat;
use crate::config::{
    CandidateSampling, CollisionHandling, ControllerMode, EmergencyResponse, HazeStrategy,
    SafetyAggregation, SimConfig,
};
use crate::dynamics::Integrator;
use crate::error::{Result, SimError};
use crate::geometry::{frame_heading, goal_direction, normalize_angle, to_local, Arena, HEADING_SPEED_EPS};
use crate::haze::SafetyModulation;
use crate::model::{checked_predict, PredictiveModel};
use crate::spm::{Channel, GridLayout, SensoryGrid};
use ephswarm_data::{Agent, AgentId, EmergencyState, Goal, Vec2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Controller mode resolved once per run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
    pub safety: Option<SafetyAggregation>,
    /// Safety is scaled by the lagged precision instead of a fixed one.
    pub uses_precision: bool,
    pub uses_epistemic: bool,
    pub haze: HazeStrategy,
}

impl Policy {
    #[must_use]
    pub fn resolve(mode: ControllerMode) -> Self {
        match mode {
            ControllerMode::Baseline => Self {
                safety: None,
                uses_precision: false,
                uses_epistemic: false,
                haze: HazeStrategy::Occupancy,
            },
            ControllerMode::SpmOnly { safety } => Self {
                safety: Some(safety),
                uses_precision: false,
                uses_epistemic: false,
                haze: HazeStrategy::Occupancy,
            },
            ControllerMode::AdaptivePrecision { safety } => Self {
                safety: Some(safety),
                uses_precision: true,
                uses_epistemic: false,
                haze: HazeStrategy::Occupancy,
            },
            ControllerMode::FullEph { safety, haze } => Self {
                safety: Some(safety),
                uses_precision: true,
                uses_epistemic: true,
                haze,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Current velocity.
    Inertia,
    /// Unit goal direction at full action.
    GoalDirect,
    /// Action that reaches the desired velocity in one step.
    Pursuit,
    /// Action that reaches a standstill in one step.
    Brake,
    Sampled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideKind {
    Stop,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FreeEnergyTerms {
    pub goal: f64,
    pub safety: f64,
    pub epistemic: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub action: Vec2,
    pub source: CandidateSource,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    pub candidate: Candidate,
    pub terms: FreeEnergyTerms,
    pub total: f64,
}

/// Outcome of one agent's selection for one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    /// Action handed to the integrator (the override's, when one fired).
    pub action: Vec2,
    /// Terms of the cost-minimizing candidate.
    pub terms: FreeEnergyTerms,
    pub total: f64,
    pub source: CandidateSource,
    pub override_kind: Option<OverrideKind>,
    /// Emergency bookkeeping to commit with the agent.
    pub emergency: EmergencyState,
    /// Predictive-model calls that failed and were scored as zero.
    pub model_failures: u32,
}

/// Read-only inputs of one selection.
pub struct DecisionContext<'a> {
    pub agent: &'a Agent,
    pub grid: &'a SensoryGrid,
    /// Precision carried over from the previous step.
    pub precision: f64,
    /// Self, environmental and per-channel haze weights for this step.
    pub modulation: SafetyModulation,
    pub threat: Option<Threat>,
    pub model: &'a dyn PredictiveModel,
    pub step: u64,
}

#[derive(Debug, Clone)]
pub struct Controller {
    policy: Policy,
    lambda_goal: f64,
    lambda_safety: f64,
    lambda_epistemic: f64,
    sampled: usize,
    sampling: CandidateSampling,
    perturb_angle: f64,
    target_speed: f64,
    sector_half_width: f64,
    tie_tolerance: f64,
    handling: CollisionHandling,
    proximity: Vec<f64>,
}

impl Controller {
    #[must_use]
    pub fn new(config: &SimConfig, layout: &GridLayout) -> Self {
        let c = &config.controller;
        Self {
            policy: Policy::resolve(c.mode),
            lambda_goal: c.lambda_goal,
            lambda_safety: c.lambda_safety,
            lambda_epistemic: c.lambda_epistemic,
            sampled: c.candidates,
            sampling: c.sampling,
            perturb_angle: c.perturb_angle,
            target_speed: config.target_speed(),
            sector_half_width: c.sector_half_width_deg.to_radians(),
            tie_tolerance: c.tie_tolerance,
            handling: config.collision.handling,
            proximity: layout.proximity.clone(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Velocity the agent would like to have this step.
    ///
    /// Point goals taper to `distance / dt` so the agent can stop on the goal.
    #[must_use]
    pub fn desired_velocity(&self, agent: &Agent, arena: &Arena, dt: f64) -> Vec2 {
        match agent.goal {
            Goal::Point { at } => {
                let offset = arena.relative(agent.position, at);
                let d = offset.length();
                if d < 1e-9 {
                    Vec2::ZERO
                } else {
                    offset * (self.target_speed.min(d / dt) / d)
                }
            }
            Goal::Direction { towards } => towards
                .normalized(1e-12)
                .map_or(Vec2::ZERO, |dir| dir * self.target_speed),
        }
    }

    /// Built-in candidates followed by the sampled ones, all within the action limit.
    pub fn candidates<R: Rng>(&self, agent: &Agent, integrator: &Integrator, rng: &mut R) -> Vec<Candidate> {
        let arena = integrator.arena();
        let limit = integrator.action_limit(agent);
        let goal_dir = goal_direction(agent, arena);
        let goal_direct = goal_dir.map_or(Vec2::ZERO, |g| g * limit);
        let desired = self.desired_velocity(agent, arena, integrator.dt());

        let mut out = Vec::with_capacity(4 + self.sampled);
        let mut push = |action: Vec2, source| {
            out.push(Candidate {
                action: action.clamp_length(limit),
                source,
            });
        };
        push(agent.velocity, CandidateSource::Inertia);
        push(goal_direct, CandidateSource::GoalDirect);
        push(integrator.inverse(agent, desired), CandidateSource::Pursuit);
        push(integrator.inverse(agent, Vec2::ZERO), CandidateSource::Brake);

        if self.sampled == 0 {
            return out;
        }
        match self.sampling {
            CandidateSampling::Ring => {
                let step = TAU / self.sampled as f64;
                let phase = rng.gen::<f64>() * step;
                for k in 0..self.sampled {
                    push(
                        Vec2::from_angle(phase + k as f64 * step) * limit,
                        CandidateSource::Sampled,
                    );
                }
            }
            CandidateSampling::Uniform => {
                for _ in 0..self.sampled {
                    let angle = rng.gen_range(0.0..TAU);
                    let magnitude = rng.gen::<f64>().sqrt() * limit;
                    push(Vec2::from_angle(angle) * magnitude, CandidateSource::Sampled);
                }
            }
            CandidateSampling::Perturb => {
                let base = goal_dir.map_or_else(|| frame_heading(agent, arena), Vec2::angle);
                for _ in 0..self.sampled {
                    let angle = base + rng.gen_range(-self.perturb_angle..=self.perturb_angle);
                    let magnitude = limit * rng.gen_range(0.5..=1.0);
                    push(Vec2::from_angle(angle) * magnitude, CandidateSource::Sampled);
                }
            }
        }
        out
    }

    /// Collision cost of moving with world-frame velocity `velocity`, before precision.
    #[must_use]
    pub fn safety_cost(
        &self,
        grid: &SensoryGrid,
        heading: f64,
        velocity: Vec2,
        max_speed: f64,
        modulation: &SafetyModulation,
    ) -> f64 {
        let Some(aggregation) = self.policy.safety else {
            return 0.0;
        };
        let speed = velocity.length();
        if speed < HEADING_SPEED_EPS {
            return 0.0;
        }
        let speed_frac = (speed / max_speed).min(1.0);
        let theta = to_local(velocity, heading).angle();
        let nr = grid.radial_bins();
        let nt = grid.angular_bins();

        let cell = |r: usize, t: usize| {
            let occ = grid.occupancy(r, t);
            if occ == 0.0 {
                return 0.0;
            }
            let weight = match modulation.channels {
                Some(channels) => {
                    let closing = (-grid.get(Channel::RadialVelocity, r, t) / max_speed).max(0.0);
                    channels.occupancy + channels.closing * closing
                }
                None => 1.0,
            };
            occ * weight * modulation.cell_factor(grid.bin_angle(t)) * self.proximity[r]
        };

        match aggregation {
            SafetyAggregation::Approach => {
                let mut sum = 0.0;
                for t in 0..nt {
                    let alignment = (grid.bin_angle(t) - theta).cos().max(0.0);
                    if alignment == 0.0 {
                        continue;
                    }
                    for r in 0..nr {
                        sum += cell(r, t) * alignment;
                    }
                }
                speed_frac * sum
            }
            SafetyAggregation::Mean | SafetyAggregation::Max => {
                let mut sum = 0.0;
                let mut max = 0.0_f64;
                let mut count = 0usize;
                for t in 0..nt {
                    if normalize_angle(grid.bin_angle(t) - theta).abs() > self.sector_half_width {
                        continue;
                    }
                    for r in 0..nr {
                        let v = cell(r, t);
                        sum += v;
                        max = max.max(v);
                        count += 1;
                    }
                }
                if count == 0 {
                    return 0.0;
                }
                let value = if aggregation == SafetyAggregation::Mean {
                    sum / count as f64
                } else {
                    max
                };
                speed_frac * value
            }
        }
    }

    fn score(
        &self,
        ctx: &DecisionContext<'_>,
        integrator: &Integrator,
        candidates: Vec<Candidate>,
        failures: &mut u32,
    ) -> Vec<Scored> {
        let agent = ctx.agent;
        let arena = integrator.arena();
        let heading = frame_heading(agent, arena);
        let desired = self.desired_velocity(agent, arena, integrator.dt());
        let (pi, modulation) = if self.policy.uses_precision {
            (ctx.precision, ctx.modulation)
        } else {
            (1.0, SafetyModulation::NONE)
        };
        let query_model = self.policy.uses_epistemic && !ctx.model.is_null();

        candidates
            .into_iter()
            .map(|candidate| {
                let v_next = integrator.predict_velocity(agent, candidate.action);
                let goal = (v_next - desired).length_squared();
                let safety = pi
                    * self.safety_cost(ctx.grid, heading, v_next, integrator.max_speed(), &modulation);
                let epistemic = if query_model {
                    match checked_predict(ctx.model, ctx.grid, to_local(candidate.action, heading)) {
                        Ok(p) => p.uncertainty,
                        Err(e) => {
                            if *failures == 0 {
                                tracing::warn!(
                                    agent = %agent.id,
                                    step = ctx.step,
                                    model = ctx.model.name(),
                                    error = %e,
                                    "Predictive model failed; epistemic term set to zero"
                                );
                            }
                            *failures += 1;
                            0.0
                        }
                    }
                } else {
                    0.0
                };
                let terms = FreeEnergyTerms {
                    goal,
                    safety,
                    epistemic,
                };
                let total = self.lambda_goal * goal
                    + self.lambda_safety * safety
                    + if self.policy.uses_epistemic {
                        self.lambda_epistemic * epistemic
                    } else {
                        0.0
                    };
                Scored {
                    candidate,
                    terms,
                    total,
                }
            })
            .collect()
    }

    /// Scores the candidate set and applies any emergency override.
    pub fn select_action<R: Rng>(
        &self,
        ctx: &DecisionContext<'_>,
        integrator: &Integrator,
        rng: &mut R,
    ) -> Result<Decision> {
        let candidates = self.candidates(ctx.agent, integrator, rng);
        let mut model_failures = 0;
        let scored = self.score(ctx, integrator, candidates, &mut model_failures);
        let best = pick_minimum(ctx.agent.id, &scored, ctx.agent.velocity, self.tie_tolerance)?;

        let (override_action, emergency) = self.emergency(ctx, integrator);
        let (action, override_kind) = match override_action {
            Some((action, kind)) => {
                tracing::warn!(
                    agent = %ctx.agent.id,
                    step = ctx.step,
                    override_kind = ?kind,
                    gap = ctx.threat.map(|t| t.gap),
                    "Emergency override replaces selected action"
                );
                (action, Some(kind))
            }
            None => (best.candidate.action, None),
        };

        Ok(Decision {
            action,
            terms: best.terms,
            total: best.total,
            source: best.candidate.source,
            override_kind,
            emergency,
            model_failures,
        })
    }

    /// Advances the override state machine and returns the override action, if any.
    fn emergency(
        &self,
        ctx: &DecisionContext<'_>,
        integrator: &Integrator,
    ) -> (Option<(Vec2, OverrideKind)>, EmergencyState) {
        let CollisionHandling::Emergency {
            trigger_distance,
            response,
            hold_steps,
            cooldown_steps,
        } = self.handling
        else {
            return (None, ctx.agent.emergency);
        };

        let mut state = ctx.agent.emergency;
        let fire = if state.active > 0 {
            state.active -= 1;
            if state.active == 0 {
                state.cooldown = cooldown_steps;
            }
            true
        } else if state.cooldown > 0 {
            state.cooldown -= 1;
            false
        } else if ctx.threat.is_some_and(|t| t.gap < trigger_distance) {
            state.active = hold_steps.saturating_sub(1);
            if state.active == 0 {
                state.cooldown = cooldown_steps;
            }
            true
        } else {
            false
        };
        if !fire {
            return (None, state);
        }

        let agent = ctx.agent;
        let brake = (integrator.inverse(agent, Vec2::ZERO), OverrideKind::Stop);
        let action = match (response, ctx.threat) {
            (EmergencyResponse::Escape, Some(threat)) => (
                -threat.direction * integrator.action_limit(agent),
                OverrideKind::Escape,
            ),
            _ => brake,
        };
        (Some(action), state)
    }
}

/// Lowest total cost; every candidate within `tolerance` of the minimum is tied
/// and the one closest to `current` wins.
pub fn pick_minimum(agent: AgentId, scored: &[Scored], current: Vec2, tolerance: f64) -> Result<&Scored> {
    let first = scored.first().ok_or(SimError::EmptyCandidateSet { agent })?;
    let min = scored.iter().map(|s| s.total).fold(f64::INFINITY, f64::min);
    let best = scored
        .iter()
        .filter(|s| s.total <= min + tolerance)
        .min_by(|a, b| {
            let da = (a.candidate.action - current).length_squared();
            let db = (b.candidate.action - current).length_squared();
            da.total_cmp(&db)
        })
        .unwrap_or(first);
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DynamicsLaw, Topology};
    use crate::haze::ChannelPrecision;
    use crate::model::{ModelError, NullModel, Prediction};
    use crate::obstacles::ObstacleField;
    use crate::spm::{GridBuilder, Percept};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[derive(Debug)]
    struct Offline;

    impl PredictiveModel for Offline {
        fn predict(&self, _grid: &SensoryGrid, _action: Vec2) -> std::result::Result<Prediction, ModelError> {
            Err(ModelError::Unavailable("offline".into()))
        }

        fn name(&self) -> &str {
            "offline"
        }
    }

    struct Rig {
        config: SimConfig,
        builder: GridBuilder,
        integrator: Integrator,
        controller: Controller,
    }

    impl Rig {
        fn new(config: SimConfig) -> Self {
            let arena = Arena::from_config(&config.world);
            let builder = GridBuilder::new(&config.sensing, config.haze.epsilon).unwrap();
            let controller = Controller::new(&config, builder.layout());
            let integrator = Integrator::new(&config.dynamics, arena);
            Self {
                config,
                builder,
                integrator,
                controller,
            }
        }

        fn grid(&self, me: &Agent, others: &[Agent]) -> SensoryGrid {
            let refs: Vec<&Agent> = others.iter().collect();
            self.builder
                .build(&Percept {
                    observer: me,
                    neighbors: &refs,
                    obstacles: &ObstacleField::default(),
                    arena: self.integrator.arena(),
                    precision_hint: me.precision,
                    step: 0,
                })
                .unwrap()
        }

        fn decide(&self, me: &Agent, others: &[Agent], model: &dyn PredictiveModel) -> Decision {
            self.decide_with(me, others, model, SafetyModulation::NONE)
        }

        fn decide_with(
            &self,
            me: &Agent,
            others: &[Agent],
            model: &dyn PredictiveModel,
            modulation: SafetyModulation,
        ) -> Decision {
            let grid = self.grid(me, others);
            let ctx = DecisionContext {
                agent: me,
                grid: &grid,
                precision: me.precision,
                modulation,
                threat: None,
                model,
                step: 0,
            };
            let mut rng = ChaCha8Rng::seed_from_u64(self.config.world.seed);
            self.controller
                .select_action(&ctx, &self.integrator, &mut rng)
                .unwrap()
        }
    }

    fn config(mode: ControllerMode) -> SimConfig {
        let mut config = SimConfig::default();
        config.controller.mode = mode;
        config.controller.lambda_safety = 50.0;
        config.sensing.fov_deg = 180.0;
        config.dynamics.law = DynamicsLaw::HeadingAligned {
            max_turn_rate: TAU,
        };
        config.world.topology = Topology::Clamped;
        config
    }

    fn walker() -> Agent {
        Agent::new(
            0,
            Vec2::new(45.0, 50.0),
            Goal::Point {
                at: Vec2::new(95.0, 50.0),
            },
        )
        .with_heading(0.0)
        .with_velocity(Vec2::new(1.0, 0.0))
    }

    fn blocker() -> Agent {
        Agent::new(1, Vec2::new(47.0, 50.0), Goal::default()).with_velocity(Vec2::new(-1.0, 0.0))
    }

    #[test]
    fn test_baseline_heads_straight_for_goal() {
        let rig = Rig::new(config(ControllerMode::Baseline));
        let d = rig.decide(&walker(), &[blocker()], &NullModel);
        assert!((d.action - Vec2::new(1.0, 0.0)).length() < 1e-9);
        assert_eq!(d.terms.safety, 0.0);
        assert!(d.override_kind.is_none());
    }

    #[test]
    fn test_safety_slows_down_in_front_of_oncoming_agent() {
        let rig = Rig::new(config(ControllerMode::AdaptivePrecision {
            safety: SafetyAggregation::Approach,
        }));
        let d = rig.decide(&walker(), &[blocker()], &NullModel);
        assert!(d.action.x < 1.0, "action {:?}", d.action);
    }

    fn adaptive_rig() -> Rig {
        Rig::new(config(ControllerMode::AdaptivePrecision {
            safety: SafetyAggregation::Approach,
        }))
    }

    #[test]
    fn test_self_haze_discounts_obstacles_ahead() {
        let rig = adaptive_rig();
        let grid = rig.grid(&walker(), &[blocker()]);
        let forward = Vec2::new(1.0, 0.0);
        let base = rig.controller.safety_cost(&grid, 0.0, forward, 1.0, &SafetyModulation::NONE);
        assert!(base > 0.0);

        let hazed = SafetyModulation {
            frontal: 0.25,
            frontal_half_width: 60f64.to_radians(),
            ..SafetyModulation::NONE
        };
        let discounted = rig.controller.safety_cost(&grid, 0.0, forward, 1.0, &hazed);
        assert!(discounted > 0.0 && discounted < 0.3 * base, "{discounted} vs {base}");
    }

    #[test]
    fn test_full_environment_haze_silences_safety() {
        let rig = adaptive_rig();
        let grid = rig.grid(&walker(), &[blocker()]);
        let fogged = SafetyModulation {
            environment: 0.0,
            ..SafetyModulation::NONE
        };
        let cost = rig
            .controller
            .safety_cost(&grid, 0.0, Vec2::new(1.0, 0.0), 1.0, &fogged);
        assert_eq!(cost, 0.0);
    }

    #[test]
    fn test_closing_channel_raises_cost_of_oncoming_agent() {
        let rig = adaptive_rig();
        let grid = rig.grid(&walker(), &[blocker()]);
        let forward = Vec2::new(1.0, 0.0);
        let base = rig.controller.safety_cost(&grid, 0.0, forward, 1.0, &SafetyModulation::NONE);
        let with_closing = SafetyModulation {
            channels: Some(ChannelPrecision {
                occupancy: 1.0,
                closing: 1.0,
            }),
            ..SafetyModulation::NONE
        };
        let cost = rig.controller.safety_cost(&grid, 0.0, forward, 1.0, &with_closing);
        assert!(cost > 2.0 * base, "{cost} vs {base}");

        let muted = SafetyModulation {
            channels: Some(ChannelPrecision {
                occupancy: 0.0,
                closing: 0.0,
            }),
            ..SafetyModulation::NONE
        };
        assert_eq!(rig.controller.safety_cost(&grid, 0.0, forward, 1.0, &muted), 0.0);
    }

    #[test]
    fn test_fixed_precision_modes_ignore_modulation() {
        let rig = Rig::new(config(ControllerMode::SpmOnly {
            safety: SafetyAggregation::Approach,
        }));
        let fogged = SafetyModulation {
            environment: 0.0,
            ..SafetyModulation::NONE
        };
        let plain = rig.decide(&walker(), &[blocker()], &NullModel);
        let hazed = rig.decide_with(&walker(), &[blocker()], &NullModel, fogged);
        assert_eq!(plain.action, hazed.action);
        assert_eq!(plain.terms, hazed.terms);

        let adaptive = adaptive_rig();
        let hazed = adaptive.decide_with(&walker(), &[blocker()], &NullModel, fogged);
        assert_eq!(hazed.terms.safety, 0.0);
    }

    #[test]
    fn test_actions_respect_agent_limit() {
        let rig = Rig::new(config(ControllerMode::default()));
        let me = walker().with_max_action(0.3);
        let d = rig.decide(&me, &[blocker()], &NullModel);
        assert!(d.action.length() <= 0.3 + 1e-12);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for c in rig.controller.candidates(&me, &rig.integrator, &mut rng) {
            assert!(c.action.length() <= 0.3 + 1e-12);
        }
    }

    #[test]
    fn test_model_failure_scores_zero_and_continues() {
        let rig = Rig::new(config(ControllerMode::default()));
        let d = rig.decide(&walker(), &[blocker()], &Offline);
        assert_eq!(d.terms.epistemic, 0.0);
        assert_eq!(d.model_failures as usize, 4 + 16);

        let quiet = rig.decide(&walker(), &[blocker()], &NullModel);
        assert_eq!(d.action, quiet.action);
    }

    #[test]
    fn test_empty_candidate_set_is_fatal() {
        let err = pick_minimum(AgentId(5), &[], Vec2::ZERO, 0.0).unwrap_err();
        assert!(matches!(err, SimError::EmptyCandidateSet { agent: AgentId(5) }));
    }

    #[test]
    fn test_ties_prefer_current_velocity() {
        let scored = |x: f64, total: f64| Scored {
            candidate: Candidate {
                action: Vec2::new(x, 0.0),
                source: CandidateSource::Sampled,
            },
            terms: FreeEnergyTerms::default(),
            total,
        };
        let set = [scored(1.0, 2.0), scored(0.4, 2.0), scored(-1.0, 2.0 + 1e-15)];
        let best = pick_minimum(AgentId(0), &set, Vec2::new(0.5, 0.0), 1e-12).unwrap();
        assert_eq!(best.candidate.action.x, 0.4);

        // Without tolerance the slightly dearer candidate is out, even when it matches.
        let strict = pick_minimum(AgentId(0), &set, Vec2::new(-1.0, 0.0), 0.0).unwrap();
        assert_eq!(strict.candidate.action.x, 0.4);
    }

    #[test]
    fn test_near_ties_stay_within_tolerance_of_minimum() {
        let scored = |x: f64, total: f64| Scored {
            candidate: Candidate {
                action: Vec2::new(x, 0.0),
                source: CandidateSource::Sampled,
            },
            terms: FreeEnergyTerms::default(),
            total,
        };
        // Each step is within tolerance of the previous one, but the last is
        // two tolerances above the cheapest.
        let set = [scored(0.0, 1.0), scored(0.5, 1.0 + 0.8), scored(1.0, 1.0 + 1.6)];
        let best = pick_minimum(AgentId(0), &set, Vec2::new(1.0, 0.0), 1.0).unwrap();
        assert_eq!(best.candidate.action.x, 0.5);
        assert!(best.total <= 1.0 + 1.0);

        let reversed = [set[2], set[1], set[0]];
        let best = pick_minimum(AgentId(0), &reversed, Vec2::new(1.0, 0.0), 1.0).unwrap();
        assert_eq!(best.candidate.action.x, 0.5);
    }

    #[test]
    fn test_nan_costs_never_win() {
        let scored = |x: f64, total: f64| Scored {
            candidate: Candidate {
                action: Vec2::new(x, 0.0),
                source: CandidateSource::Sampled,
            },
            terms: FreeEnergyTerms::default(),
            total,
        };
        let set = [scored(1.0, f64::NAN), scored(-1.0, 3.0)];
        let best = pick_minimum(AgentId(0), &set, Vec2::new(1.0, 0.0), 0.0).unwrap();
        assert_eq!(best.candidate.action.x, -1.0);
    }

    #[test]
    fn test_emergency_holds_then_cools_down() {
        let mut cfg = config(ControllerMode::Baseline);
        cfg.collision.handling = CollisionHandling::Emergency {
            trigger_distance: 0.5,
            response: EmergencyResponse::Stop,
            hold_steps: 2,
            cooldown_steps: 2,
        };
        let rig = Rig::new(cfg);
        let grid = rig.grid(&walker(), &[]);
        let threat = Some(Threat {
            gap: 0.1,
            direction: Vec2::new(1.0, 0.0),
        });

        let mut me = walker();
        let mut fired = Vec::new();
        for _ in 0..6 {
            let ctx = DecisionContext {
                agent: &me,
                grid: &grid,
                precision: 1.0,
                modulation: SafetyModulation::NONE,
                threat,
                model: &NullModel,
                step: 0,
            };
            let mut rng = ChaCha8Rng::seed_from_u64(0);
            let d = rig.controller.select_action(&ctx, &rig.integrator, &mut rng).unwrap();
            fired.push(d.override_kind.is_some());
            me.emergency = d.emergency;
        }
        // Trigger, hold, two cooldown steps, trigger, hold.
        assert_eq!(fired, vec![true, true, false, false, true, true]);
    }

    #[test]
    fn test_escape_moves_away_from_threat() {
        let mut cfg = config(ControllerMode::Baseline);
        cfg.collision.handling = CollisionHandling::Emergency {
            trigger_distance: 0.5,
            response: EmergencyResponse::Escape,
            hold_steps: 1,
            cooldown_steps: 0,
        };
        let rig = Rig::new(cfg);
        let me = walker();
        let grid = rig.grid(&me, &[]);
        let ctx = DecisionContext {
            agent: &me,
            grid: &grid,
            precision: 1.0,
            modulation: SafetyModulation::NONE,
            threat: Some(Threat {
                gap: 0.2,
                direction: Vec2::new(0.0, 1.0),
            }),
            model: &NullModel,
            step: 0,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let d = rig.controller.select_action(&ctx, &rig.integrator, &mut rng).unwrap();
        assert_eq!(d.override_kind, Some(OverrideKind::Escape));
        assert!((d.action - Vec2::new(0.0, -1.0)).length() < 1e-12);
    }
}
