//! Stuck-task monitoring.
//!
//! Tasks report heartbeats while they run; the monitor reclaims tasks whose
//! heartbeat has gone stale, retrying them while attempts remain and
//! dead-lettering them after.

use crate::context::AppContext;
use crate::error::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// A task is stuck after this long without a heartbeat.
pub const DEFAULT_STUCK_THRESHOLD_MINUTES: i64 = 30;

/// Monitor sweep interval.
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(300);

/// Action taken for one stuck task.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum StuckAction {
    AutoRetried,
    MovedToDeadLetter,
    Reported,
}

/// Result of one monitor sweep.
#[derive(Debug, Clone, Serialize)]
pub struct StuckReport {
    pub stuck_count: usize,
    pub actions: Vec<(String, StuckAction)>,
}

/// One monitor sweep: find stuck tasks and reclaim them.
pub async fn monitor_stuck_tasks(
    ctx: &AppContext,
    threshold_minutes: i64,
    auto_retry: bool,
) -> Result<StuckReport> {
    let stuck = ctx.queue.stuck_tasks(threshold_minutes).await?;
    let mut actions = Vec::new();

    for task in &stuck {
        warn!(
            task_id = %task.task_id,
            task_type = %task.task_type,
            last_heartbeat = ?task.heartbeat_at,
            "Stuck task detected"
        );

        let reason = format!(
            "Stuck task detected (no heartbeat for {} min)",
            threshold_minutes
        );
        if task.retry_count >= task.max_retries {
            ctx.queue
                .dead_letter(
                    &task.task_id,
                    &format!("{} after {} retries", reason, task.retry_count),
                )
                .await?;
            actions.push((task.task_id.clone(), StuckAction::MovedToDeadLetter));
        } else if auto_retry {
            ctx.queue.reset_for_retry(&task.task_id, &reason).await?;
            info!(task_id = %task.task_id, "Auto-retried stuck task");
            actions.push((task.task_id.clone(), StuckAction::AutoRetried));
        } else {
            actions.push((task.task_id.clone(), StuckAction::Reported));
        }
    }

    Ok(StuckReport {
        stuck_count: stuck.len(),
        actions,
    })
}

/// Background monitor loop. Runs until the owning task is aborted.
pub async fn run_stuck_monitor(
    ctx: Arc<AppContext>,
    interval: Duration,
    threshold_minutes: i64,
    auto_retry: bool,
) {
    info!(
        interval_secs = interval.as_secs(),
        threshold_minutes, "Stuck-task monitor started"
    );
    loop {
        tokio::time::sleep(interval).await;
        match monitor_stuck_tasks(&ctx, threshold_minutes, auto_retry).await {
            Ok(report) if report.stuck_count > 0 => {
                warn!(stuck = report.stuck_count, "Stuck-task monitor found tasks");
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Stuck-task monitor error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::test_context;
    use crate::queue::durable::{EnqueueOptions, TaskStatus};
    use serde_json::json;

    #[tokio::test]
    async fn test_stuck_task_auto_retried_then_dead_lettered() {
        let tc = test_context(vec![]).await;
        let task_id = tc
            .ctx
            .queue
            .enqueue(
                "graph_run",
                json!({"chat_id": "42"}),
                EnqueueOptions {
                    max_retries: Some(1),
                    ..EnqueueOptions::default()
                },
            )
            .await
            .unwrap();

        // First stall: retries remain, so it is reset to pending.
        tc.ctx.queue.dequeue(None, 1).await.unwrap();
        let report = monitor_stuck_tasks(&tc.ctx, 0, true).await.unwrap();
        assert_eq!(report.stuck_count, 1);
        assert_eq!(report.actions[0].1, StuckAction::AutoRetried);
        let task = tc.ctx.queue.get(&task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);

        // Second stall: retry budget exhausted, off to the DLQ.
        tc.ctx.queue.dequeue(None, 1).await.unwrap();
        let report = monitor_stuck_tasks(&tc.ctx, 0, true).await.unwrap();
        assert_eq!(report.actions[0].1, StuckAction::MovedToDeadLetter);
        assert_eq!(
            tc.ctx.queue.get(&task_id).await.unwrap().unwrap().status,
            TaskStatus::DeadLetter
        );
    }

    #[tokio::test]
    async fn test_healthy_task_not_touched() {
        let tc = test_context(vec![]).await;
        tc.ctx
            .queue
            .enqueue("graph_run", json!({"chat_id": "42"}), EnqueueOptions::default())
            .await
            .unwrap();
        tc.ctx.queue.dequeue(None, 1).await.unwrap();

        // Fresh heartbeat, generous threshold.
        let report = monitor_stuck_tasks(&tc.ctx, 30, true).await.unwrap();
        assert_eq!(report.stuck_count, 0);
    }

    #[tokio::test]
    async fn test_report_only_when_auto_retry_off() {
        let tc = test_context(vec![]).await;
        let task_id = tc
            .ctx
            .queue
            .enqueue("graph_run", json!({"chat_id": "42"}), EnqueueOptions::default())
            .await
            .unwrap();
        tc.ctx.queue.dequeue(None, 1).await.unwrap();

        let report = monitor_stuck_tasks(&tc.ctx, 0, false).await.unwrap();
        assert_eq!(report.actions[0].1, StuckAction::Reported);
        assert_eq!(
            tc.ctx.queue.get(&task_id).await.unwrap().unwrap().status,
            TaskStatus::InProgress
        );
    }
}
