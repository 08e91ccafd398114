//! Rule-driven flow execution.
//!
//! A flow is a directed graph of agents connected by conditioned `Rule`s.
//! The `Router` is the synchronous state machine: given the output of the
//! current agent it evaluates every outgoing rule, records the audit trail,
//! and moves to the first matching target. `run_flow` drives it with mock
//! outputs; the `WorkflowRunner` drives it with a real `AgentExecutor` and
//! the tool runner, publishing `RunEvent`s along the way.

pub mod executor;
pub mod router;

pub use executor::WorkflowRunner;
pub use router::{
    run_flow, ExecutionStep, Router, RuleEvaluation, RunOptions, RunResult, RunStatus, StepTrace,
    TRACE_KEY,
};
