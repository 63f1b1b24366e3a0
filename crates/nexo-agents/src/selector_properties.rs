//! Property-based tests for agent selection
//!
//! **Property: One capable agent per specialization**
//!
//! For any agent pool and any set of required specializations, selection
//! picks at most one agent per specialization, the picked agent declares
//! that specialization and can handle the request, and no capable candidate
//! scores higher.

#[cfg(test)]
mod tests {
    use crate::agents::SharedAgent;
    use crate::models::{AgentSpecialization, ComplexAgentRequest, SpecializationSet};
    use crate::registry::AgentRegistry;
    use crate::selector::AgentSelector;
    use crate::testing::ScriptedAgent;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug, Clone)]
    struct AgentSpec {
        specializations: Vec<AgentSpecialization>,
        capable: bool,
        score: f64,
    }

    fn specialization_strategy() -> impl Strategy<Value = AgentSpecialization> {
        prop::sample::select(AgentSpecialization::ALL.to_vec())
    }

    fn agent_strategy() -> impl Strategy<Value = AgentSpec> {
        (
            prop::collection::vec(specialization_strategy(), 1..4),
            prop::bool::weighted(0.8),
            prop_oneof![Just(0.5), 0.0f64..1.0],
        )
            .prop_map(|(specializations, capable, score)| AgentSpec {
                specializations,
                capable,
                score,
            })
    }

    fn build(specs: &[AgentSpec]) -> Vec<ScriptedAgent> {
        specs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let agent = ScriptedAgent::new(
                    format!("agent-{:02}", i),
                    spec.specializations.iter().copied().collect(),
                );
                if spec.capable {
                    agent.with_score(spec.score)
                } else {
                    agent.unable()
                }
            })
            .collect()
    }

    proptest! {
        #[test]
        fn prop_selection_is_sound(
            specs in prop::collection::vec(agent_strategy(), 1..8),
            required in prop::collection::vec(specialization_strategy(), 0..6),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let required: SpecializationSet = required.into_iter().collect();
            let agents: Vec<SharedAgent> = build(&specs)
                .into_iter()
                .map(|agent| Arc::new(agent) as SharedAgent)
                .collect();
            let registry = Arc::new(AgentRegistry::from_agents(agents).unwrap());

            let selections = rt.block_on(async {
                AgentSelector::new(registry.clone())
                    .select_with_scores(
                        &required,
                        &ComplexAgentRequest::new("task"),
                        &CancellationToken::new(),
                    )
                    .await
                    .unwrap()
            });

            let mut covered = HashSet::new();
            for selection in &selections {
                prop_assert!(covered.insert(selection.specialization));
                prop_assert!(required.contains(selection.specialization));
                prop_assert!(selection.agent.specializations().contains(selection.specialization));

                let index: usize = selection.agent.id()["agent-".len()..].parse().unwrap();
                prop_assert!(specs[index].capable);

                for (i, spec) in specs.iter().enumerate() {
                    if spec.capable && spec.specializations.contains(&selection.specialization) {
                        let score = spec.score.clamp(0.0, 1.0);
                        prop_assert!(score <= selection.score);
                        if score == selection.score {
                            prop_assert!(i >= index);
                        }
                    }
                }
            }
        }

        #[test]
        fn prop_selected_agents_are_distinct(
            specs in prop::collection::vec(agent_strategy(), 1..8),
            required in prop::collection::vec(specialization_strategy(), 0..6),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let required: SpecializationSet = required.into_iter().collect();
            let agents: Vec<SharedAgent> = build(&specs)
                .into_iter()
                .map(|agent| Arc::new(agent) as SharedAgent)
                .collect();
            let registry = Arc::new(AgentRegistry::from_agents(agents).unwrap());

            let chosen = rt.block_on(async {
                AgentSelector::new(registry)
                    .select_optimal_agents(
                        &required,
                        &ComplexAgentRequest::new("task"),
                        &CancellationToken::new(),
                    )
                    .await
                    .unwrap()
            });

            let ids: HashSet<&str> = chosen.iter().map(|agent| agent.id()).collect();
            prop_assert_eq!(ids.len(), chosen.len());
            prop_assert!(chosen.len() <= required.len());
        }
    }
}
