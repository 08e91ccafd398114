use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use aiflow_core::error::{AiflowError, Result};
use aiflow_core::traits::{AgentExecutor, ProjectValidator};
use aiflow_core::types::{RunEvent, RunId};
use aiflow_core::{EventBus, FlowContext, Project};
use aiflow_tools::ToolRunner;

use super::router::{ensure_valid, Router, RunResult, DEFAULT_MAX_STEPS};
use crate::validator::Validator;

/// Runs a project end to end with a real agent executor.
///
/// Each step executes the current agent, folds its output into the
/// context, calls the agent's tools, and hands the parsed output to the
/// [`Router`]. Steps are strictly sequential; cancellation is checked before
/// each agent runs.
pub struct WorkflowRunner {
    project: Project,
    executor: Arc<dyn AgentExecutor>,
    tools: Option<ToolRunner>,
    validator: Box<dyn ProjectValidator>,
    event_bus: Option<Arc<EventBus>>,
    cancel: CancellationToken,
    max_steps: usize,
    embed_trace: bool,
}

impl WorkflowRunner {
    pub fn new(project: Project, executor: Arc<dyn AgentExecutor>) -> Self {
        Self {
            project,
            executor,
            tools: None,
            validator: Box::new(Validator),
            event_bus: None,
            cancel: CancellationToken::new(),
            max_steps: DEFAULT_MAX_STEPS,
            embed_trace: false,
        }
    }

    /// Without a tool runner, agents' tool lists are ignored.
    pub fn with_tools(mut self, tools: ToolRunner) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_validator(mut self, validator: Box<dyn ProjectValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_embedded_trace(mut self, embed: bool) -> Self {
        self.embed_trace = embed;
        self
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn publish(&self, event: RunEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    fn fail(&self, run_id: &RunId, err: AiflowError) -> AiflowError {
        self.publish(RunEvent::RunFailed {
            run_id: run_id.clone(),
            error: err.to_string(),
        });
        err
    }

    /// Run the flow under a fresh run id.
    pub async fn run(&self, initial_context: Map<String, Value>) -> Result<RunResult> {
        self.run_with_id(RunId::new(), initial_context).await
    }

    pub async fn run_with_id(
        &self,
        run_id: RunId,
        initial_context: Map<String, Value>,
    ) -> Result<RunResult> {
        let start = Instant::now();
        if let Err(e) = ensure_valid(&self.project, self.validator.as_ref()) {
            return Err(self.fail(&run_id, e));
        }

        let mut context = FlowContext::from_map(self.project.flow.variables.clone());
        context.merge_map(&initial_context);

        let mut router = match Router::new(&self.project, context) {
            Ok(r) => r
                .with_max_steps(self.max_steps)
                .with_embedded_trace(self.embed_trace),
            Err(e) => return Err(self.fail(&run_id, e)),
        };

        info!(run_id = %run_id, entry_agent = %self.project.flow.entry_agent, "Run started");
        self.publish(RunEvent::RunStarted {
            run_id: run_id.clone(),
            entry_agent: self.project.flow.entry_agent.trim().to_string(),
        });

        while let Some(agent_id) = router.current_agent().map(str::to_string) {
            if self.cancel.is_cancelled() {
                router.cancel();
                break;
            }

            let Some(agent) = self.project.agent(&agent_id) else {
                error!(agent_id = %agent_id, "Agent not defined in project");
                return Err(self.fail(&run_id, AiflowError::AgentNotFound(agent_id)));
            };

            let step = router.step_count() + 1;
            info!(agent_id = %agent_id, step, "Executing agent");
            self.publish(RunEvent::AgentStarted {
                step,
                agent_id: agent_id.clone(),
            });

            let raw = match self.executor.execute(agent, router.context()).await {
                Ok(text) => text,
                Err(e) => {
                    error!(agent_id = %agent_id, error = %e, "Agent execution failed");
                    let err = match e {
                        AiflowError::AgentExecution { .. } => e,
                        other => AiflowError::AgentExecution {
                            agent: agent_id.clone(),
                            message: other.to_string(),
                        },
                    };
                    return Err(self.fail(&run_id, err));
                }
            };
            self.publish(RunEvent::AgentCompleted {
                agent_id: agent_id.clone(),
                output: raw.clone(),
            });

            let parsed = router.context_mut().ingest_output(&agent_id, &raw);
            if agent.wants_json() && !parsed.is_object() {
                warn!(agent_id = %agent_id, "Expected a JSON object from agent, keeping raw text");
            }

            if let Some(tools) = self.tools.as_ref().filter(|_| !agent.tools.is_empty()) {
                let input = if parsed.is_object() {
                    parsed.clone()
                } else {
                    Value::Object(Map::new())
                };
                let outcomes = tools
                    .run_for_agent(&agent_id, &agent.tools, router.context_mut(), &input)
                    .await;
                for (tool, outcome) in outcomes {
                    self.publish(RunEvent::ToolFinished {
                        agent_id: agent_id.clone(),
                        tool,
                        outcome,
                    });
                }
            }

            if let Some(to) = router.step(Some(&parsed), Some(&raw)).map(str::to_string) {
                let rule_id = router
                    .last_trace()
                    .and_then(|t| t.selected_rule_id.clone())
                    .unwrap_or_default();
                self.publish(RunEvent::Transition {
                    from: agent_id,
                    to,
                    rule_id,
                });
            }
        }

        let result = router.finish();
        info!(
            run_id = %run_id,
            status = ?result.status,
            steps = result.steps.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Run ended"
        );
        self.publish(RunEvent::RunFinished {
            run_id,
            finished: result.finished,
            steps: result.steps.len(),
            final_agent_id: result.final_agent_id.clone(),
        });
        Ok(result)
    }
}
