pub mod graph;
pub mod run_log;
pub mod simulated;
pub mod validator;

pub use graph::{
    run_flow, ExecutionStep, Router, RuleEvaluation, RunOptions, RunResult, RunStatus, StepTrace,
    WorkflowRunner, TRACE_KEY,
};
pub use run_log::RunLogger;
pub use simulated::SimulatedExecutor;
pub use validator::Validator;
