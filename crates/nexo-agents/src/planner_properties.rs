//! Property-based tests for workflow planning
//!
//! **Property: Default ordering under unusable plans**
//!
//! Whatever the agent pool, an inference service that returns unusable text
//! yields the fixed Security, Performance, Platform, Quality ordering
//! restricted to what the pool covers and nothing else. Each step goes to the
//! first pool agent declaring its specialization.

#[cfg(test)]
mod tests {
    use crate::agents::SharedAgent;
    use crate::inference::InferenceClient;
    use crate::models::{AgentSpecialization, ComplexAgentRequest};
    use crate::planner::WorkflowPlanner;
    use crate::testing::{ScriptedAgent, ScriptedOracle};
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    const CORE: [(AgentSpecialization, &str); 4] = [
        (AgentSpecialization::SecurityAnalysis, "SecurityAnalysis"),
        (
            AgentSpecialization::PerformanceOptimization,
            "PerformanceOptimization",
        ),
        (AgentSpecialization::PlatformSpecific, "PlatformSpecific"),
        (AgentSpecialization::CodeQuality, "QualityAssurance"),
    ];

    fn specialization_strategy() -> impl Strategy<Value = AgentSpecialization> {
        prop::sample::select(AgentSpecialization::ALL.to_vec())
    }

    /// Pools of 0..6 agents, each declaring 1..3 specializations
    fn pool_strategy() -> impl Strategy<Value = Vec<Vec<AgentSpecialization>>> {
        prop::collection::vec(
            prop::collection::vec(specialization_strategy(), 1..3),
            0..6,
        )
    }

    fn build_pool(specs: &[Vec<AgentSpecialization>]) -> Vec<SharedAgent> {
        specs
            .iter()
            .enumerate()
            .map(|(i, declared)| {
                Arc::new(ScriptedAgent::new(
                    format!("agent-{}", i),
                    declared.iter().copied().collect(),
                )) as SharedAgent
            })
            .collect()
    }

    proptest! {
        #[test]
        fn prop_unusable_plan_follows_default_ordering(specs in pool_strategy()) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let pool = build_pool(&specs);
            let workflow = rt.block_on(async {
                let planner = WorkflowPlanner::new(InferenceClient::new(
                    Arc::new(ScriptedOracle::unparseable()),
                    None,
                ));
                planner
                    .create_workflow(&pool, &ComplexAgentRequest::new("task"), &CancellationToken::new())
                    .await
                    .unwrap()
            });

            let expected: Vec<String> = CORE
                .iter()
                .filter(|(spec, _)| pool.iter().any(|a| a.specializations().contains(*spec)))
                .map(|(_, name)| name.to_string())
                .collect();
            prop_assert_eq!(workflow.step_names(), expected);

            let pool_ids: HashSet<&str> = pool.iter().map(|a| a.id()).collect();
            for step in &workflow.steps {
                prop_assert!(pool_ids.contains(step.agent_id()));
                for collaborator in &step.collaborators {
                    prop_assert!(pool_ids.contains(collaborator.id()));
                    prop_assert_ne!(collaborator.id(), step.agent_id());
                }
            }
        }

        #[test]
        fn prop_oracle_failure_assigns_first_covering_agent(specs in pool_strategy()) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let pool = build_pool(&specs);
            let workflow = rt.block_on(async {
                let planner = WorkflowPlanner::new(InferenceClient::new(
                    Arc::new(ScriptedOracle::failing()),
                    None,
                ));
                planner
                    .create_workflow(&pool, &ComplexAgentRequest::new("task"), &CancellationToken::new())
                    .await
                    .unwrap()
            });

            let names: HashSet<String> = workflow.step_names().into_iter().collect();
            prop_assert_eq!(names.len(), workflow.len());
            prop_assert!(workflow.len() <= CORE.len());

            for (spec, name) in CORE {
                let first = pool.iter().find(|a| a.specializations().contains(spec));
                match (first, workflow.step(name)) {
                    (Some(agent), Some(step)) => prop_assert_eq!(step.agent_id(), agent.id()),
                    (None, None) => {}
                    _ => prop_assert!(false, "step {} does not match pool coverage", name),
                }
            }
        }
    }
}
