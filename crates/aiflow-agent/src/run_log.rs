use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use aiflow_core::event::EventBus;
use aiflow_core::types::{RunEvent, RunId};

/// JSONL audit logger for a single run.
///
/// Subscribes to the EventBus and appends one JSON object per event to
/// `{log_dir}/{run_id}/{timestamp}.jsonl`, flushing after every line so a
/// crashed run still leaves a readable log.
pub struct RunLogger {
    log_dir: PathBuf,
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Subscribe now and write in a background task; the task yields the
    /// log file path when done.
    ///
    /// Stops on `RunFinished`/`RunFailed`, on cancellation, or when the bus
    /// closes.
    pub fn spawn(
        self,
        event_bus: &EventBus,
        run_id: RunId,
        cancel: CancellationToken,
    ) -> JoinHandle<Option<PathBuf>> {
        let mut rx = event_bus.subscribe();
        tokio::spawn(async move { self.drain(&mut rx, run_id, cancel).await })
    }

    async fn drain(
        self,
        rx: &mut tokio::sync::broadcast::Receiver<RunEvent>,
        run_id: RunId,
        cancel: CancellationToken,
    ) -> Option<PathBuf> {
        let run_dir = self.log_dir.join(&run_id.0);
        if let Err(e) = tokio::fs::create_dir_all(&run_dir).await {
            error!(error = %e, "Failed to create log directory");
            return None;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_path = run_dir.join(format!("{timestamp}.jsonl"));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return None;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");

        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            let entry = event_to_entry(&run_id.0, &event);
                            if let Ok(json) = serde_json::to_string(&entry) {
                                let line = format!("{json}\n");
                                if let Err(e) = writer.write_all(line.as_bytes()).await {
                                    error!(error = %e, "Failed to write log entry");
                                    break;
                                }
                                if let Err(e) = writer.flush().await {
                                    error!(error = %e, "Failed to flush log");
                                }
                            }

                            if event.is_terminal() {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
        Some(log_path)
    }
}

fn event_to_entry(run_id: &str, event: &RunEvent) -> LogEntry {
    let (event_type, agent_id, detail) = match event {
        RunEvent::RunStarted { entry_agent, .. } => (
            "run_started",
            None,
            Some(serde_json::json!({ "entry_agent": entry_agent })),
        ),
        RunEvent::AgentStarted { step, agent_id } => (
            "agent_started",
            Some(agent_id.clone()),
            Some(serde_json::json!({ "step": step })),
        ),
        RunEvent::AgentCompleted { agent_id, output } => (
            "agent_completed",
            Some(agent_id.clone()),
            Some(serde_json::json!({ "output_preview": truncate_str(output, 200) })),
        ),
        RunEvent::ToolFinished {
            agent_id,
            tool,
            outcome,
        } => (
            "tool_finished",
            Some(agent_id.clone()),
            Some(serde_json::json!({
                "tool": tool,
                "ok": outcome.ok,
                "error": outcome.error,
            })),
        ),
        RunEvent::Transition { from, to, rule_id } => (
            "transition",
            Some(from.clone()),
            Some(serde_json::json!({ "to": to, "rule_id": rule_id })),
        ),
        RunEvent::RunFinished {
            finished,
            steps,
            final_agent_id,
            ..
        } => (
            "run_finished",
            None,
            Some(serde_json::json!({
                "finished": finished,
                "steps": steps,
                "final_agent_id": final_agent_id,
            })),
        ),
        RunEvent::RunFailed { error, .. } => (
            "run_failed",
            None,
            Some(serde_json::json!({ "error": error })),
        ),
    };

    LogEntry {
        timestamp: Utc::now().to_rfc3339(),
        run_id: run_id.to_string(),
        event_type: event_type.to_string(),
        agent_id,
        detail,
    }
}

/// Truncate on a char boundary at or below `max_len` bytes.
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
