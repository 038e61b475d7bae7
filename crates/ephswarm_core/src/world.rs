//! The simulation world and its two-phase step.
//!
//! Each step reads one immutable snapshot of the agents:
//!
//! 1. **Decide** (parallel): grid, threat, action and next haze per agent.
//! 2. **Integrate** (parallel): every agent into a private staging copy.
//! 3. **Commit**: staging is swapped into place only if every agent succeeded.
//! 4. **Contacts**: the spatial index is rebuilt and agent pairs are checked.
//!
//! No agent ever sees a neighbour's state from the step being computed, so
//! results do not depend on thread scheduling. Randomness comes from a
//! per-(seed, step, agent) ChaCha stream for the same reason.

use crate::collision::{detect_agent_contacts, nearest_threat, CollisionEvent};
use crate::config::{CollisionHandling, HazeStrategy, SimConfig};
use crate::controller::{Controller, Decision, DecisionContext, Policy};
use crate::dynamics::Integrator;
use crate::ensure_config;
use crate::error::{Result, SimError};
use crate::geometry::{frame_heading, to_local, Arena};
use crate::haze::{precision, HazeEstimate, HazeEstimator};
use crate::metrics::Metrics;
use crate::model::{NullModel, PredictiveModel};
use crate::observation::{AgentObservation, StepReport};
use crate::obstacles::ObstacleField;
use crate::spatial_hash::SpatialHash;
use crate::spm::{GridBuilder, Percept, SensoryGrid};
use ephswarm_data::{Agent, AgentId, Obstacle, StuckState, Vec2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;

/// Seed of the random stream one agent uses during one step.
#[inline]
#[must_use]
pub fn agent_seed(world_seed: u64, step: u64, id: AgentId) -> u64 {
    world_seed
        .wrapping_add(step.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add(u64::from(id.0))
        .wrapping_add(0x5EED)
}

/// Phase-one output for one agent.
struct Plan {
    decision: Decision,
    estimate: HazeEstimate,
    stuck: StuckState,
}

pub struct World {
    config: SimConfig,
    arena: Arena,
    agents: Vec<Agent>,
    staging: Vec<Agent>,
    positions: Vec<Vec2>,
    obstacles: ObstacleField,
    spatial_hash: SpatialHash,
    grid_builder: GridBuilder,
    haze: HazeEstimator,
    controller: Controller,
    integrator: Integrator,
    model: Arc<dyn PredictiveModel>,
    metrics: Metrics,
    step: u64,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("step", &self.step)
            .field("agents", &self.agents.len())
            .field("obstacles", &self.obstacles.len())
            .field("model", &self.model.name())
            .finish()
    }
}

impl World {
    /// Validates the configuration and the initial state and builds the world.
    ///
    /// `agents[i].id` must equal `i`. Every agent starts from the configured
    /// haze prior. A missing model is replaced by [`NullModel`].
    pub fn new(
        config: SimConfig,
        mut agents: Vec<Agent>,
        obstacles: Vec<Obstacle>,
        model: Option<Arc<dyn PredictiveModel>>,
    ) -> Result<Self> {
        config.validate()?;
        let arena = Arena::from_config(&config.world);

        for (slot, agent) in agents.iter().enumerate() {
            if agent.id.index() != slot {
                return Err(SimError::AgentSlot {
                    slot,
                    found: agent.id,
                });
            }
            for (quantity, value) in [
                ("position.x", agent.position.x),
                ("position.y", agent.position.y),
                ("velocity.x", agent.velocity.x),
                ("velocity.y", agent.velocity.y),
            ] {
                if !value.is_finite() {
                    return Err(SimError::NonFinite {
                        agent: agent.id,
                        step: 0,
                        quantity,
                        value,
                    });
                }
            }
            ensure_config!(
                (0.0..=arena.width).contains(&agent.position.x)
                    && (0.0..=arena.height).contains(&agent.position.y),
                "{} starts outside the arena at {:?}",
                agent.id,
                agent.position
            );
            ensure_config!(
                agent.radius.is_finite() && agent.radius >= 0.0,
                "{} has an invalid radius {}",
                agent.id,
                agent.radius
            );
            if let Some(limit) = agent.max_action {
                ensure_config!(
                    limit.is_finite() && limit > 0.0,
                    "{} has an invalid action limit {limit}",
                    agent.id
                );
            }
        }
        for obstacle in &obstacles {
            ensure_config!(
                obstacle.anchor().is_finite(),
                "Obstacle with non-finite geometry: {obstacle:?}"
            );
        }

        let prior = config.haze.prior;
        let initial_precision = precision(prior, config.haze.epsilon);
        for agent in &mut agents {
            agent.haze = prior;
            agent.precision = initial_precision;
        }

        let policy = Policy::resolve(config.controller.mode);
        let model: Arc<dyn PredictiveModel> = model.unwrap_or_else(|| Arc::new(NullModel));
        if policy.haze == HazeStrategy::Model && model.is_null() {
            tracing::warn!("Model haze strategy without a predictive model; haze stays at zero");
        }

        let grid_builder = GridBuilder::new(&config.sensing, config.haze.epsilon)?;
        let controller = Controller::new(&config, grid_builder.layout());
        let haze = HazeEstimator::new(&config.haze, policy.haze);
        let integrator = Integrator::new(&config.dynamics, arena);
        let max_radius = agents.iter().map(|a| a.radius).fold(0.0, f64::max);
        let cell = config
            .sensing
            .radius
            .max(2.0 * max_radius + config.collision.contact_margin);
        let mut spatial_hash = SpatialHash::new(cell, &arena);
        let positions: Vec<_> = agents.iter().map(|a| a.position).collect();
        spatial_hash.build(&positions);

        tracing::info!(
            agents = agents.len(),
            obstacles = obstacles.len(),
            model = model.name(),
            mode = ?config.controller.mode,
            fingerprint = %config.fingerprint(),
            "World initialized"
        );

        Ok(Self {
            arena,
            staging: Vec::with_capacity(agents.len()),
            agents,
            positions,
            obstacles: ObstacleField::new(obstacles, config.sensing.obstacle_spacing),
            spatial_hash,
            grid_builder,
            haze,
            controller,
            integrator,
            model,
            metrics: Metrics::new(config.log_interval),
            step: 0,
            config,
        })
    }

    #[must_use]
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id.index())
    }

    /// Steps completed so far.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step
    }

    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    #[must_use]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    #[must_use]
    pub fn obstacles(&self) -> &ObstacleField {
        &self.obstacles
    }

    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    #[must_use]
    pub fn model(&self) -> &dyn PredictiveModel {
        self.model.as_ref()
    }

    /// Replaces the static obstacles. Only possible between steps.
    pub fn replace_obstacles(&mut self, obstacles: Vec<Obstacle>) {
        self.obstacles = ObstacleField::new(obstacles, self.config.sensing.obstacle_spacing);
    }

    /// The grid agent `id` would perceive from the current snapshot.
    pub fn grid_for(&self, id: AgentId) -> Result<SensoryGrid> {
        let index = id.index();
        ensure_config!(index < self.agents.len(), "Unknown {id}");
        self.build_grid(index)
    }

    fn build_grid(&self, index: usize) -> Result<SensoryGrid> {
        let agent = &self.agents[index];
        let mut nearby = Vec::new();
        self.spatial_hash.query_within(
            &self.arena,
            &self.positions,
            agent.position,
            self.config.sensing.radius,
            &mut nearby,
        );
        let neighbors: Vec<&Agent> = nearby
            .iter()
            .filter(|&&j| j != index)
            .map(|&j| &self.agents[j])
            .collect();
        self.grid_builder.build(&Percept {
            observer: agent,
            neighbors: &neighbors,
            obstacles: &self.obstacles,
            arena: &self.arena,
            precision_hint: agent.precision,
            step: self.step,
        })
    }

    fn plan(&self, index: usize) -> Result<Plan> {
        let agent = &self.agents[index];
        let grid = self.build_grid(index)?;

        let threat = match self.config.collision.handling {
            CollisionHandling::Emergency { .. } => nearest_threat(
                index,
                &self.agents,
                &self.spatial_hash,
                &self.arena,
                &self.obstacles,
                self.config.sensing.radius,
            ),
            CollisionHandling::DetectOnly => None,
        };

        let stuck = self.haze.update_stuck(agent.stuck, agent.speed());
        let ctx = DecisionContext {
            agent,
            grid: &grid,
            precision: agent.precision,
            modulation: self.haze.modulation(stuck.haze),
            threat,
            model: self.model.as_ref(),
            step: self.step,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(agent_seed(
            self.config.world.seed,
            self.step,
            agent.id,
        ));
        let mut decision = self
            .controller
            .select_action(&ctx, &self.integrator, &mut rng)?;

        let heading = frame_heading(agent, &self.arena);
        let (estimate, error) =
            self.haze
                .estimate(&grid, to_local(decision.action, heading), self.model.as_ref());
        if let Some(e) = error {
            tracing::warn!(
                agent = %agent.id,
                step = self.step,
                error = %e,
                "Predictive model failed; haze set to zero"
            );
            decision.model_failures += 1;
        }
        Ok(Plan {
            decision,
            estimate,
            stuck,
        })
    }

    /// Phase one over the whole snapshot. The lowest failing agent's error wins.
    fn pass_decide(&self) -> Result<Vec<Plan>> {
        let plans: Vec<Result<Plan>> = (0..self.agents.len())
            .into_par_iter()
            .map(|i| self.plan(i))
            .collect();
        plans.into_iter().collect()
    }

    /// Phase two into staging; returns obstacle contacts.
    fn pass_integrate(&mut self, plans: &[Plan]) -> Result<Vec<CollisionEvent>> {
        let step = self.step;
        let results: Vec<Result<_>> = self
            .agents
            .par_iter()
            .zip(plans.par_iter())
            .map(|(agent, plan)| {
                let mut out = self.integrator.integrate(
                    agent,
                    plan.decision.action,
                    &self.obstacles,
                    step,
                )?;
                out.agent.haze = plan.estimate.haze;
                out.agent.precision = plan.estimate.precision;
                out.agent.emergency = plan.decision.emergency;
                out.agent.stuck = plan.stuck;
                Ok(out)
            })
            .collect();

        self.staging.clear();
        let mut contacts = Vec::new();
        for result in results {
            let integration = result?;
            self.staging.push(integration.agent);
            contacts.extend(integration.contacts);
        }
        Ok(contacts)
    }

    fn pass_commit(&mut self) {
        std::mem::swap(&mut self.agents, &mut self.staging);
        self.positions.clear();
        self.positions.extend(self.agents.iter().map(|a| a.position));
        self.spatial_hash.build(&self.positions);
    }

    /// Advances the world by one step.
    ///
    /// On error nothing is committed and the step counter does not move.
    pub fn step(&mut self) -> Result<StepReport> {
        let started = Instant::now();
        match self.try_step() {
            Ok(report) => {
                self.metrics.add_model_failures(report.model_failures);
                self.metrics.record_step(
                    started.elapsed(),
                    self.agents.len(),
                    report.collisions.len(),
                    report.overrides,
                );
                self.step += 1;
                Ok(report)
            }
            Err(e) => {
                tracing::error!(step = self.step, error = %e, "Simulation step aborted");
                Err(e)
            }
        }
    }

    fn try_step(&mut self) -> Result<StepReport> {
        let plans = self.pass_decide()?;
        let mut collisions = self.pass_integrate(&plans)?;

        let previous: Vec<(f64, f64)> = self.agents.iter().map(|a| (a.haze, a.precision)).collect();
        self.pass_commit();
        collisions.extend(detect_agent_contacts(
            &self.agents,
            &self.spatial_hash,
            &self.arena,
            self.config.collision.contact_margin,
            self.step,
        ));

        let observations = self
            .agents
            .iter()
            .zip(&plans)
            .zip(previous)
            .map(|((agent, plan), (haze, precision))| AgentObservation {
                id: agent.id,
                position: agent.position,
                velocity: agent.velocity,
                heading: agent.heading,
                action: plan.decision.action,
                haze,
                precision,
                next_haze: plan.estimate.haze,
                self_haze: plan.stuck.haze,
                override_kind: plan.decision.override_kind,
                terms: plan.decision.terms,
                candidate: plan.decision.source,
            })
            .collect();

        Ok(StepReport {
            step: self.step,
            observations,
            collisions,
            overrides: plans
                .iter()
                .filter(|p| p.decision.override_kind.is_some())
                .count(),
            model_failures: plans
                .iter()
                .map(|p| u64::from(p.decision.model_failures))
                .sum(),
        })
    }

    /// Runs `steps` steps, handing every report to `on_step`.
    pub fn run<F>(&mut self, steps: u64, mut on_step: F) -> Result<()>
    where
        F: FnMut(&StepReport),
    {
        for _ in 0..steps {
            let report = self.step()?;
            on_step(&report);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControllerMode, StuckHazeConfig, Topology};
    use crate::model::{ModelError, Prediction};
    use ephswarm_data::Goal;

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

    fn pair() -> Vec<Agent> {
        vec![
            Agent::new(0, Vec2::new(10.0, 10.0), Goal::Point { at: Vec2::new(30.0, 10.0) }),
            Agent::new(1, Vec2::new(30.0, 12.0), Goal::Point { at: Vec2::new(10.0, 12.0) }),
        ]
    }

    #[test]
    fn test_agent_ids_must_match_slots() {
        let mut agents = pair();
        agents.swap(0, 1);
        let err = World::new(SimConfig::default(), agents, vec![], None).unwrap_err();
        assert!(matches!(err, SimError::AgentSlot { slot: 0, .. }));
        assert!(err.is_config());
    }

    #[test]
    fn test_invalid_config_rejected_before_first_step() {
        let mut config = SimConfig::default();
        config.sensing.radial_bins = 0;
        assert!(World::new(config, pair(), vec![], None).is_err());
    }

    #[test]
    fn test_prior_sets_initial_precision() {
        let mut config = SimConfig::default();
        config.haze.prior = 0.4;
        let world = World::new(config, pair(), vec![], None).unwrap();
        for a in world.agents() {
            assert_eq!(a.haze, 0.4);
            assert!((a.precision - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_step_advances_and_reports_every_agent() {
        let mut world = World::new(SimConfig::default(), pair(), vec![], None).unwrap();
        let report = world.step().unwrap();
        assert_eq!(report.step, 0);
        assert_eq!(report.observations.len(), 2);
        assert_eq!(world.step_count(), 1);
        assert!(world.agents()[0].position.x > 10.0);
    }

    #[test]
    fn test_observation_reports_lagged_precision() {
        let mut config = SimConfig::default();
        config.world.topology = Topology::Toroidal;
        let agents = vec![
            Agent::new(0, Vec2::new(10.0, 10.0), Goal::default()),
            Agent::new(1, Vec2::new(11.5, 10.0), Goal::default()),
        ];
        let mut world = World::new(config, agents, vec![], None).unwrap();
        let first = world.step().unwrap();
        assert_eq!(first.observations[0].haze, 0.0);
        assert!(first.observations[0].next_haze > 0.0);
        let second = world.step().unwrap();
        assert_eq!(second.observations[0].haze, first.observations[0].next_haze);
    }

    #[test]
    fn test_model_failures_do_not_abort_step() {
        let mut config = SimConfig::default();
        config.controller.mode = ControllerMode::default();
        let mut world = World::new(config, pair(), vec![], Some(Arc::new(Offline))).unwrap();
        let report = world.step().unwrap();
        assert!(report.model_failures > 0);
        assert_eq!(world.metrics().model_failure_count(), report.model_failures);
    }

    #[test]
    fn test_non_finite_start_is_rejected_with_agent_id() {
        let mut agents = pair();
        agents[1].velocity = Vec2::new(f64::NAN, 0.0);
        let err = World::new(SimConfig::default(), agents, vec![], None).unwrap_err();
        assert!(matches!(err, SimError::NonFinite { agent: AgentId(1), step: 0, .. }));
    }

    #[test]
    fn test_parked_agent_accumulates_self_haze() {
        let mut config = SimConfig::default();
        config.haze.stuck = Some(StuckHazeConfig {
            steps: 3,
            rise: 0.1,
            ..StuckHazeConfig::default()
        });
        let home = Vec2::new(10.0, 10.0);
        let agents = vec![Agent::new(0, home, Goal::Point { at: home })];
        let mut world = World::new(config, agents, vec![], None).unwrap();

        let mut self_haze = Vec::new();
        for _ in 0..6 {
            let report = world.step().unwrap();
            self_haze.push(report.observations[0].self_haze);
        }
        let expected = [0.0, 0.0, 0.0, 0.1, 0.2, 0.3];
        for (got, want) in self_haze.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{self_haze:?}");
        }
        assert_eq!(world.agents()[0].stuck.counter, 6);
    }

    #[test]
    fn test_self_haze_stays_off_without_stuck_detection() {
        let home = Vec2::new(10.0, 10.0);
        let agents = vec![Agent::new(0, home, Goal::Point { at: home })];
        let mut world = World::new(SimConfig::default(), agents, vec![], None).unwrap();
        for _ in 0..60 {
            let report = world.step().unwrap();
            assert_eq!(report.observations[0].self_haze, 0.0);
        }
        assert_eq!(world.agents()[0].stuck, StuckState::default());
    }

    #[test]
    fn test_grid_for_matches_step_input() {
        let world = World::new(SimConfig::default(), pair(), vec![], None).unwrap();
        let grid = world.grid_for(AgentId(0)).unwrap();
        assert!(grid.is_zero(), "neighbour is beyond the default sensing radius");
        assert!(world.grid_for(AgentId(9)).is_err());
    }
}
