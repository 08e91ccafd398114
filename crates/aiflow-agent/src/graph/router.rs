use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use aiflow_core::error::{AiflowError, Result};
use aiflow_core::traits::ProjectValidator;
use aiflow_core::{FlowContext, Project};
use aiflow_expr::{evaluate_with_trace, EvalScope};

/// Default router step ceiling.
pub const DEFAULT_MAX_STEPS: usize = 50;

/// Context key holding the per-step trace when embedding is enabled.
pub const TRACE_KEY: &str = "__trace";

/// Options for a synchronous run driven by caller-supplied outputs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub initial_context: Map<String, Value>,
    /// Agent id to the output that agent "produces" during the run.
    pub outputs_by_agent: HashMap<String, Value>,
    pub max_steps: usize,
    /// Copy the step trace into `context.__trace` at the end of the run.
    pub embed_trace: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            initial_context: Map::new(),
            outputs_by_agent: HashMap::new(),
            max_steps: DEFAULT_MAX_STEPS,
            embed_trace: false,
        }
    }
}

/// Outcome of one rule's condition during a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEvaluation {
    #[serde(rename = "id")]
    pub rule_id: String,
    pub from: String,
    pub to: String,
    pub condition: String,
    pub result: bool,
    /// Lex/parse error text when the condition is malformed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Every rule evaluated while leaving one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub agent_id: String,
    pub evaluations: Vec<RuleEvaluation>,
}

/// Debug record of one step, in the format the trace viewer reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTrace {
    pub step: usize,
    pub agent_id: String,
    pub agent_name: String,
    pub role: String,
    pub input_context: Value,
    pub raw_output: Option<String>,
    pub parsed_output: Option<Value>,
    pub rules_evaluated: Vec<RuleEvaluation>,
    pub selected_rule_id: Option<String>,
    pub next_agent_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// No outgoing rule matched. A dead end is a normal ending.
    Finished,
    /// The step ceiling was reached.
    Truncated,
    /// Stopped between steps on request.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub finished: bool,
    pub status: RunStatus,
    pub visited_agents: Vec<String>,
    pub steps: Vec<ExecutionStep>,
    /// `None` when finished; otherwise the agent that would have run next.
    pub final_agent_id: Option<String>,
    /// The last agent actually visited.
    pub last_agent_id: Option<String>,
    pub context: Value,
    pub trace: Vec<StepTrace>,
}

/// Step engine over a project's rule graph.
///
/// Starts at the entry agent. Each call to [`Router::step`] records the
/// evaluation of every rule leaving the current agent and advances to the
/// first rule that is true and has a target. The context is owned by the
/// router for the whole run and handed back by [`Router::finish`].
pub struct Router<'p> {
    project: &'p Project,
    context: FlowContext,
    current: Option<String>,
    last_agent: Option<String>,
    max_steps: usize,
    step_count: usize,
    embed_trace: bool,
    cancelled: bool,
    visited: Vec<String>,
    steps: Vec<ExecutionStep>,
    trace: Vec<StepTrace>,
    input_snapshot: Value,
}

impl<'p> Router<'p> {
    pub fn new(project: &'p Project, context: FlowContext) -> Result<Self> {
        let entry = project.flow.entry_agent.trim();
        if entry.is_empty() {
            return Err(AiflowError::MissingEntryAgent);
        }
        let input_snapshot = Value::Object(context.as_map().clone());
        Ok(Self {
            project,
            context,
            current: Some(entry.to_string()),
            last_agent: None,
            max_steps: DEFAULT_MAX_STEPS,
            step_count: 0,
            embed_trace: false,
            cancelled: false,
            visited: Vec::new(),
            steps: Vec::new(),
            trace: Vec::new(),
            input_snapshot,
        })
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_embedded_trace(mut self, embed: bool) -> Self {
        self.embed_trace = embed;
        self
    }

    /// The agent to run next, or `None` once the run is over.
    pub fn current_agent(&self) -> Option<&str> {
        if self.cancelled || self.step_count >= self.max_steps {
            return None;
        }
        self.current.as_deref()
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn context(&self) -> &FlowContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut FlowContext {
        &mut self.context
    }

    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    pub fn last_trace(&self) -> Option<&StepTrace> {
        self.trace.last()
    }

    /// Leave the current agent given its output.
    ///
    /// Returns the chosen target, or `None` on a dead end. Calling this after
    /// the run is over is a no-op.
    pub fn step(&mut self, output: Option<&Value>, raw_output: Option<&str>) -> Option<&str> {
        let agent_id = self.current_agent()?.to_string();
        let project = self.project;

        self.visited.push(agent_id.clone());
        self.last_agent = Some(agent_id.clone());

        let scope = EvalScope::new(self.context.as_map(), output, Some(&agent_id));
        let mut evaluations = Vec::new();
        let mut winner = None;

        for rule in project.rules_from(&agent_id) {
            let condition = rule.effective_condition();
            let (result, error) = match evaluate_with_trace(condition, &scope) {
                Ok(trace) => (trace.matched(), None),
                Err(e) => {
                    warn!(rule = %rule.id, agent_id = %agent_id, error = %e, "Condition failed to parse, treating as no match");
                    (false, Some(e.to_string()))
                }
            };
            debug!(rule = %rule.id, to = %rule.to, result, "Rule evaluated");

            if result && winner.is_none() && !rule.to.trim().is_empty() {
                winner = Some(rule);
            }
            evaluations.push(RuleEvaluation {
                rule_id: rule.id.clone(),
                from: rule.from.clone(),
                to: rule.to.clone(),
                condition: condition.to_string(),
                result,
                error,
            });
        }

        let next = winner.map(|r| r.to.trim().to_string());
        let agent = project.agent(&agent_id);
        self.trace.push(StepTrace {
            step: self.visited.len(),
            agent_id: agent_id.clone(),
            agent_name: agent.map(|a| a.display_name().to_string()).unwrap_or_default(),
            role: agent.map(|a| a.role.clone()).unwrap_or_default(),
            input_context: std::mem::take(&mut self.input_snapshot),
            raw_output: raw_output.map(str::to_string),
            parsed_output: output.cloned(),
            rules_evaluated: evaluations.clone(),
            selected_rule_id: winner.map(|r| r.id.clone()),
            next_agent_id: next.clone(),
        });
        self.steps.push(ExecutionStep {
            agent_id: agent_id.clone(),
            evaluations,
        });

        match next {
            Some(to) => {
                info!(from = %agent_id, to = %to, rule = ?winner.map(|r| &r.id), "Transition");
                self.step_count += 1;
                self.input_snapshot = Value::Object(self.context.as_map().clone());
                self.current = Some(to);
            }
            None => {
                info!(agent_id = %agent_id, "No matching rule, flow finished");
                self.current = None;
            }
        }
        self.current.as_deref()
    }

    /// Stop before the current agent runs.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn status(&self) -> RunStatus {
        if self.cancelled && self.current.is_some() {
            RunStatus::Cancelled
        } else if self.current.is_none() {
            RunStatus::Finished
        } else {
            RunStatus::Truncated
        }
    }

    pub fn finish(self) -> RunResult {
        let status = self.status();
        match status {
            RunStatus::Finished => info!(steps = self.visited.len(), "Run finished"),
            RunStatus::Truncated => warn!(
                max_steps = self.max_steps,
                next = ?self.current,
                "Step ceiling reached, run truncated"
            ),
            RunStatus::Cancelled => info!(next = ?self.current, "Run cancelled"),
        }

        let mut context = self.context;
        if self.embed_trace {
            if let Ok(trace) = serde_json::to_value(&self.trace) {
                context.set(TRACE_KEY, trace);
            }
        }

        RunResult {
            finished: status == RunStatus::Finished,
            status,
            visited_agents: self.visited,
            steps: self.steps,
            final_agent_id: self.current,
            last_agent_id: self.last_agent,
            context: context.into_value(),
            trace: self.trace,
        }
    }
}

/// Validate the project and route it to completion using the outputs in
/// `options` instead of executing agents.
///
/// Fails only when the validator reports errors or the flow has no entry
/// agent. Dead ends and the step ceiling are normal results.
pub fn run_flow(
    project: &Project,
    options: RunOptions,
    validator: &dyn ProjectValidator,
) -> Result<RunResult> {
    ensure_valid(project, validator)?;

    let RunOptions {
        initial_context,
        outputs_by_agent,
        max_steps,
        embed_trace,
    } = options;

    let mut router = Router::new(project, FlowContext::from_map(initial_context))?
        .with_max_steps(max_steps)
        .with_embedded_trace(embed_trace);

    while let Some(agent_id) = router.current_agent().map(str::to_string) {
        let output = outputs_by_agent.get(&agent_id);
        let raw = output.map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        router.step(output, raw.as_deref());
    }

    Ok(router.finish())
}

/// Run the validator and turn error-level issues into a fatal error.
pub(crate) fn ensure_valid(project: &Project, validator: &dyn ProjectValidator) -> Result<()> {
    let issues = validator.validate(project);
    for issue in issues.iter().filter(|i| !i.is_error()) {
        warn!(code = %issue.code, "{}", issue.message);
    }
    let codes: Vec<String> = issues
        .iter()
        .filter(|i| i.is_error())
        .map(|i| i.code.clone())
        .collect();
    if codes.is_empty() {
        Ok(())
    } else {
        Err(AiflowError::Validation { codes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiflow_core::{Agent, Flow, Rule, ValidationIssue};
    use serde_json::json;

    struct AcceptAll;

    impl ProjectValidator for AcceptAll {
        fn validate(&self, _project: &Project) -> Vec<ValidationIssue> {
            Vec::new()
        }
    }

    struct Rejecting(Vec<ValidationIssue>);

    impl ProjectValidator for Rejecting {
        fn validate(&self, _project: &Project) -> Vec<ValidationIssue> {
            self.0.clone()
        }
    }

    fn project(entry: &str, agents: &[&str], logic: Vec<Rule>) -> Project {
        Project {
            flow: Flow {
                entry_agent: entry.to_string(),
                agents: agents.iter().map(|a| a.to_string()).collect(),
                logic,
                ..Default::default()
            },
            agents: agents.iter().map(|a| Agent::new(*a)).collect(),
            ..Default::default()
        }
    }

    fn ctx(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn outputs(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_valid_project_runs_to_dead_end() {
        let p = project(
            "triage",
            &["triage", "responder"],
            vec![Rule::new("r1", "triage", "responder", "always")],
        );
        let result = run_flow(&p, RunOptions::default(), &AcceptAll).unwrap();

        assert!(result.finished);
        assert_eq!(result.status, RunStatus::Finished);
        assert_eq!(result.visited_agents, vec!["triage", "responder"]);
        assert_eq!(result.final_agent_id, None);
        assert_eq!(result.last_agent_id.as_deref(), Some("responder"));
        assert_eq!(result.steps.len(), 2);
        assert!(result.steps[1].evaluations.is_empty());
    }

    #[test]
    fn test_validation_errors_block_the_run() {
        let p = project("triage", &["triage"], vec![]);
        let validator = Rejecting(vec![
            ValidationIssue::warning("RULE_UNKNOWN_TO", "ignored"),
            ValidationIssue::error("MISSING_ENTRY_AGENT", "no entry"),
        ]);
        let err = run_flow(&p, RunOptions::default(), &validator).unwrap_err();
        match err {
            AiflowError::Validation { codes } => assert_eq!(codes, vec!["MISSING_ENTRY_AGENT"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_composite_condition_routes_away_from_blocked() {
        let p = project(
            "start",
            &["start", "blocked", "allowed"],
            vec![
                Rule::new(
                    "r1",
                    "start",
                    "blocked",
                    "user.role == \"blocked\" OR user.age < 18",
                ),
                Rule::new(
                    "r2",
                    "start",
                    "allowed",
                    "NOT (user.role == \"blocked\" OR user.age < 18)",
                ),
            ],
        );
        let options = RunOptions {
            initial_context: ctx(json!({ "user": { "role": "admin", "age": 25 } })),
            ..Default::default()
        };
        let result = run_flow(&p, options, &AcceptAll).unwrap();

        assert_eq!(result.visited_agents, vec!["start", "allowed"]);
        let evals = &result.steps[0].evaluations;
        assert_eq!(evals.len(), 2);
        assert!(!evals[0].result);
        assert!(evals[1].result);
    }

    #[test]
    fn test_contains_on_tags() {
        let rules = vec![
            Rule::new("vip", "start", "priority", "contains(user.tags, \"vip\")"),
            Rule::new("rest", "start", "standard", "always"),
        ];
        let p = project("start", &["start", "priority", "standard"], rules);

        let vip = RunOptions {
            initial_context: ctx(json!({ "user": { "tags": ["vip", "gold"] } })),
            ..Default::default()
        };
        let result = run_flow(&p, vip, &AcceptAll).unwrap();
        assert_eq!(result.visited_agents, vec!["start", "priority"]);

        let gold = RunOptions {
            initial_context: ctx(json!({ "user": { "tags": ["gold"] } })),
            ..Default::default()
        };
        let result = run_flow(&p, gold, &AcceptAll).unwrap();
        assert_eq!(result.visited_agents, vec!["start", "standard"]);
    }

    #[test]
    fn test_output_score_picks_branch() {
        let rules = vec![
            Rule::new("high", "triage", "urgent", "output.score > 0.7"),
            Rule::new("default", "triage", "queue", ""),
        ];
        let p = project("triage", &["triage", "urgent", "queue"], rules);

        let high = RunOptions {
            outputs_by_agent: outputs(&[("triage", json!({ "score": 0.9 }))]),
            ..Default::default()
        };
        let result = run_flow(&p, high, &AcceptAll).unwrap();
        assert_eq!(result.visited_agents, vec!["triage", "urgent"]);
        // Both rules are recorded even though the first one won.
        assert!(result.steps[0].evaluations.iter().all(|e| e.result));
        assert_eq!(result.steps[0].evaluations[1].condition, "always");

        let low = RunOptions {
            outputs_by_agent: outputs(&[("triage", json!({ "score": 0.5 }))]),
            ..Default::default()
        };
        let result = run_flow(&p, low, &AcceptAll).unwrap();
        assert_eq!(result.visited_agents, vec!["triage", "queue"]);
    }

    #[test]
    fn test_classification_reads_output_then_context() {
        let rules = vec![Rule::new(
            "r1",
            "triage",
            "network",
            "classification == 'Network Issue'",
        )];
        let p = project("triage", &["triage", "network"], rules);

        let from_output = RunOptions {
            outputs_by_agent: outputs(&[("triage", json!({ "classification": "Network Issue" }))]),
            ..Default::default()
        };
        let result = run_flow(&p, from_output, &AcceptAll).unwrap();
        assert_eq!(result.visited_agents, vec!["triage", "network"]);

        let from_context = RunOptions {
            initial_context: ctx(json!({ "classification": "Billing Issue" })),
            ..Default::default()
        };
        let result = run_flow(&p, from_context, &AcceptAll).unwrap();
        assert_eq!(result.visited_agents, vec!["triage"]);
        assert!(result.finished);
    }

    #[test]
    fn test_entry_without_rules_finishes_with_null_final() {
        let p = project("start", &["start"], vec![]);
        let result = run_flow(&p, RunOptions::default(), &AcceptAll).unwrap();
        assert!(result.finished);
        assert_eq!(result.final_agent_id, None);
        assert_eq!(result.visited_agents, vec!["start"]);
    }

    #[test]
    fn test_cycle_is_truncated_at_max_steps() {
        let rules = vec![
            Rule::new("ab", "a", "b", "always"),
            Rule::new("ba", "b", "a", "always"),
        ];
        let p = project("a", &["a", "b"], rules);
        let options = RunOptions {
            max_steps: 5,
            ..Default::default()
        };
        let result = run_flow(&p, options, &AcceptAll).unwrap();

        assert!(!result.finished);
        assert_eq!(result.status, RunStatus::Truncated);
        assert_eq!(result.steps.len(), 5);
        assert_eq!(result.visited_agents, vec!["a", "b", "a", "b", "a"]);
        assert_eq!(result.final_agent_id.as_deref(), Some("b"));
        assert_eq!(result.last_agent_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_zero_max_steps_truncates_at_entry() {
        let p = project("a", &["a"], vec![]);
        let options = RunOptions {
            max_steps: 0,
            ..Default::default()
        };
        let result = run_flow(&p, options, &AcceptAll).unwrap();
        assert!(!result.finished);
        assert!(result.visited_agents.is_empty());
        assert_eq!(result.final_agent_id.as_deref(), Some("a"));
        assert_eq!(result.last_agent_id, None);
    }

    #[test]
    fn test_true_rule_without_target_is_skipped() {
        let rules = vec![
            Rule::new("empty", "a", "", "always"),
            Rule::new("real", "a", "b", "always"),
        ];
        let p = project("a", &["a", "b"], rules);
        let result = run_flow(&p, RunOptions::default(), &AcceptAll).unwrap();
        assert_eq!(result.visited_agents, vec!["a", "b"]);
        assert_eq!(result.trace[0].selected_rule_id.as_deref(), Some("real"));
    }

    #[test]
    fn test_malformed_condition_records_error_and_continues() {
        let rules = vec![
            Rule::new("bad", "a", "b", "score >"),
            Rule::new("ok", "a", "c", "always"),
        ];
        let p = project("a", &["a", "b", "c"], rules);
        let result = run_flow(&p, RunOptions::default(), &AcceptAll).unwrap();

        let bad = &result.steps[0].evaluations[0];
        assert!(!bad.result);
        assert!(bad.error.is_some());
        assert_eq!(result.visited_agents, vec!["a", "c"]);
    }

    #[test]
    fn test_non_boolean_condition_does_not_match() {
        let rules = vec![
            Rule::new("num", "a", "b", "score"),
            Rule::new("fallback", "a", "c", "always"),
        ];
        let p = project("a", &["a", "b", "c"], rules);
        let options = RunOptions {
            initial_context: ctx(json!({ "score": 3 })),
            ..Default::default()
        };
        let result = run_flow(&p, options, &AcceptAll).unwrap();
        assert!(!result.steps[0].evaluations[0].result);
        assert!(result.steps[0].evaluations[0].error.is_none());
        assert_eq!(result.visited_agents, vec!["a", "c"]);
    }

    #[test]
    fn test_embedded_trace_in_context() {
        let p = project("a", &["a", "b"], vec![Rule::new("r1", "a", "b", "always")]);
        let options = RunOptions {
            initial_context: ctx(json!({ "ticket": "wifi" })),
            outputs_by_agent: outputs(&[("a", json!("plain text"))]),
            embed_trace: true,
            ..Default::default()
        };
        let result = run_flow(&p, options, &AcceptAll).unwrap();

        let trace = result.context[TRACE_KEY].as_array().unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0]["step"], 1);
        assert_eq!(trace[0]["agentId"], "a");
        assert_eq!(trace[0]["inputContext"], json!({ "ticket": "wifi" }));
        assert_eq!(trace[0]["rawOutput"], "plain text");
        assert_eq!(trace[0]["rulesEvaluated"][0]["id"], "r1");
        assert_eq!(trace[0]["selectedRuleId"], "r1");
        assert_eq!(trace[0]["nextAgentId"], "b");
        assert_eq!(trace[1]["nextAgentId"], Value::Null);
    }

    #[test]
    fn test_router_cancel_keeps_pending_agent() {
        let p = project("a", &["a", "b"], vec![Rule::new("r1", "a", "b", "always")]);
        let mut router = Router::new(&p, FlowContext::new()).unwrap();
        assert_eq!(router.step(None, None), Some("b"));
        router.cancel();
        assert_eq!(router.current_agent(), None);
        assert_eq!(router.step(None, None), None);

        let result = router.finish();
        assert_eq!(result.status, RunStatus::Cancelled);
        assert_eq!(result.final_agent_id.as_deref(), Some("b"));
        assert_eq!(result.visited_agents, vec!["a"]);
    }

    #[test]
    fn test_missing_entry_agent() {
        let p = project("  ", &["a"], vec![]);
        assert!(matches!(
            run_flow(&p, RunOptions::default(), &AcceptAll),
            Err(AiflowError::MissingEntryAgent)
        ));
    }

    #[test]
    fn test_run_result_serializes_camel_case() {
        let p = project("a", &["a"], vec![]);
        let result = run_flow(&p, RunOptions::default(), &AcceptAll).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["finished"], true);
        assert_eq!(json["status"], "finished");
        assert_eq!(json["visitedAgents"], json!(["a"]));
        assert_eq!(json["finalAgentId"], Value::Null);
        assert_eq!(json["lastAgentId"], "a");
    }
}
