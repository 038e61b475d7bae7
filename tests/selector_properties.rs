mod common;

use common::{AgentBuilder, ScenarioBuilder};
use ephswarm_core::config::{CandidateSampling, ControllerMode, DynamicsLaw, HazeStrategy, SafetyAggregation, Topology};
use ephswarm_core::model::{AdvectionModel, NullModel};
use ephswarm_core::world::World;
use proptest::prelude::*;
use std::sync::Arc;

prop_compose! {
    fn arb_agent()(
        x in 1.0f64..29.0,
        y in 1.0f64..29.0,
        gx in 0.0f64..30.0,
        gy in 0.0f64..30.0,
        vx in -1.0f64..1.0,
        vy in -1.0f64..1.0,
        limit in 0.1f64..2.0
    ) -> AgentBuilder {
        AgentBuilder::new()
            .at(x, y)
            .moving(vx, vy)
            .towards_point(gx, gy)
            .max_action(limit)
    }
}

fn arb_sampling() -> impl Strategy<Value = CandidateSampling> {
    prop_oneof![
        Just(CandidateSampling::Ring),
        Just(CandidateSampling::Uniform),
        Just(CandidateSampling::Perturb),
    ]
}

fn arb_law() -> impl Strategy<Value = DynamicsLaw> {
    prop_oneof![
        Just(DynamicsLaw::FirstOrder { mass: 1.0, damping: 0.5 }),
        Just(DynamicsLaw::HeadingAligned { max_turn_rate: 3.0 }),
    ]
}

fn crowd(agents: Vec<AgentBuilder>, seed: u64) -> ScenarioBuilder {
    let mut builder = ScenarioBuilder::new()
        .with_seed(seed)
        .with_arena(30.0, 30.0, Topology::Toroidal);
    for agent in agents {
        builder = builder.with_agent(agent);
    }
    builder
}

fn positions(world: &World) -> Vec<(u64, u64)> {
    world
        .agents()
        .iter()
        .map(|a| (a.position.x.to_bits(), a.position.y.to_bits()))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_selected_actions_respect_each_agent_limit(
        agents in prop::collection::vec(arb_agent(), 1..12),
        sampling in arb_sampling(),
        law in arb_law(),
        seed in any::<u64>()
    ) {
        let mut world = crowd(agents, seed)
            .with_config(|c| {
                c.controller.sampling = sampling;
                c.dynamics.law = law;
            })
            .build();
        let limits: Vec<f64> = world
            .agents()
            .iter()
            .map(|a| a.action_limit(world.config().dynamics.max_action))
            .collect();

        for _ in 0..10 {
            let report = world.step().unwrap();
            for obs in &report.observations {
                let limit = limits[obs.id.index()];
                prop_assert!(
                    obs.action.length() <= limit + 1e-9,
                    "agent {} action {:?} exceeds {}", obs.id, obs.action, limit
                );
                prop_assert!(obs.velocity.length() <= world.config().dynamics.max_speed + 1e-9);
            }
        }
    }

    #[test]
    fn test_null_model_matches_zero_epistemic_weight(
        agents in prop::collection::vec(arb_agent(), 1..10),
        seed in any::<u64>()
    ) {
        let mode = ControllerMode::FullEph {
            safety: SafetyAggregation::Approach,
            haze: HazeStrategy::Occupancy,
        };
        let with_null = crowd(agents.clone(), seed)
            .with_config(|c| c.controller.mode = mode)
            .with_model(Arc::new(NullModel));
        let muted = crowd(agents, seed)
            .with_config(|c| {
                c.controller.mode = mode;
                c.controller.lambda_epistemic = 0.0;
            })
            .with_model(Arc::new(AdvectionModel::default()));

        let mut a = with_null.build();
        let mut b = muted.build();
        for _ in 0..8 {
            let ra = a.step().unwrap();
            let rb = b.step().unwrap();
            for (oa, ob) in ra.observations.iter().zip(&rb.observations) {
                prop_assert_eq!(oa.action, ob.action);
            }
            prop_assert_eq!(positions(&a), positions(&b));
        }
    }
}
