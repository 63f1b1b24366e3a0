//! Property-based tests for workflow execution
//!
//! **Property: Sequential prefix execution**
//!
//! For any workflow whose steps succeed, fail or ask for termination, the
//! executed steps are the workflow's prefix up to and including the first
//! terminating step, failed steps stay in the result, and no step ever sees
//! the output of a later step.

#[cfg(test)]
mod tests {
    use crate::config::RetryConfig;
    use crate::executor::WorkflowExecutor;
    use crate::models::{AgentRequest, AgentResponse, AgentSpecialization};
    use crate::testing::ScriptedAgent;
    use crate::workflow::{AgentWorkflow, WorkflowStep};
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail,
        Terminate,
    }

    fn behavior_strategy() -> impl Strategy<Value = Behavior> {
        prop_oneof![
            6 => Just(Behavior::Succeed),
            2 => Just(Behavior::Fail),
            1 => Just(Behavior::Terminate),
        ]
    }

    fn agent(index: usize, behavior: Behavior) -> Arc<ScriptedAgent> {
        let agent = ScriptedAgent::new(
            format!("agent-{}", index),
            [AgentSpecialization::CodeQuality].into(),
        )
        .with_response(AgentResponse::success(format!("result-{}", index), 0.8));
        Arc::new(match behavior {
            Behavior::Succeed => agent,
            Behavior::Fail => agent.always_failing("scripted failure"),
            Behavior::Terminate => agent.with_response(
                AgentResponse::success(format!("result-{}", index), 0.8).terminating(),
            ),
        })
    }

    proptest! {
        #[test]
        fn prop_execution_is_an_ordered_prefix(
            behaviors in prop::collection::vec(behavior_strategy(), 1..8),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let agents: Vec<Arc<ScriptedAgent>> = behaviors
                .iter()
                .enumerate()
                .map(|(i, behavior)| agent(i, *behavior))
                .collect();
            let workflow = AgentWorkflow {
                workflow_id: "wf".to_string(),
                name: "property".to_string(),
                steps: agents
                    .iter()
                    .enumerate()
                    .map(|(i, agent)| WorkflowStep {
                        name: format!("S{}", i),
                        assigned_agent: agent.clone(),
                        request: AgentRequest::new(format!("step {}", i)),
                        requires_coordination: false,
                        collaborators: Vec::new(),
                    })
                    .collect(),
                context: HashMap::new(),
            };

            let result = rt.block_on(async {
                WorkflowExecutor::new()
                    .with_retry(RetryConfig::none())
                    .execute(&workflow, &CancellationToken::new())
                    .await
                    .unwrap()
            });

            let expected_len = behaviors
                .iter()
                .position(|b| matches!(b, Behavior::Terminate))
                .map(|position| position + 1)
                .unwrap_or(behaviors.len());
            let expected: Vec<String> = (0..expected_len).map(|i| format!("S{}", i)).collect();
            prop_assert_eq!(&result.step_order, &expected);
            prop_assert_eq!(result.responses.len(), expected_len);

            for (i, behavior) in behaviors.iter().enumerate().take(expected_len) {
                let response = result.response(&format!("S{}", i)).unwrap();
                prop_assert_eq!(response.success, !matches!(behavior, Behavior::Fail));

                let input = &agents[i].received_inputs()[0];
                for later in i..behaviors.len() {
                    let marker = format!("result-{}", later);
                    prop_assert!(!input.contains(&marker));
                }
                for (earlier, earlier_behavior) in behaviors.iter().enumerate().take(i) {
                    let marker = format!("result-{}", earlier);
                    prop_assert_eq!(
                        input.contains(&marker),
                        !matches!(earlier_behavior, Behavior::Fail)
                    );
                }
            }

            for agent in agents.iter().skip(expected_len) {
                prop_assert_eq!(agent.invocation_count(), 0);
            }
        }
    }
}
