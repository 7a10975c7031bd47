//! Recurring snapshot runs driven by cron expressions.

use crate::utils::{Result, SnapsyncError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Blocking work run each time a schedule fires
pub type Task = Arc<dyn Fn() + Send + Sync + 'static>;

/// Registry of recurring tasks keyed by snapshot definition name
pub struct SnapshotScheduler {
    scheduler: Mutex<JobScheduler>,
    registry: Mutex<HashMap<String, Uuid>>,
}

impl SnapshotScheduler {
    pub async fn new() -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            registry: Mutex::new(HashMap::new()),
        })
    }

    /// Register `task` to run on `cron_expression` under `name`.
    ///
    /// The task runs on the blocking thread pool, so a slow snapshot never
    /// stalls the scheduler loop. Overlapping runs of the same definition
    /// are the task's business (see [`crate::snapshot::lock`]).
    pub async fn schedule(&self, name: &str, cron_expression: &str, task: Task) -> Result<()> {
        let mut registry = self.registry.lock().await;
        if registry.contains_key(name) {
            return Err(SnapsyncError::Scheduler(format!(
                "snapshot {} is already scheduled",
                name
            )));
        }

        let expression = normalize_cron(cron_expression);
        let snapshot = name.to_string();
        let job = Job::new_async(expression.as_str(), move |_uuid, _lock| {
            let task = task.clone();
            let snapshot = snapshot.clone();
            Box::pin(async move {
                tracing::debug!(snapshot = %snapshot, "Schedule fired");
                if let Err(e) = tokio::task::spawn_blocking(move || task()).await {
                    tracing::error!(snapshot = %snapshot, error = %e, "Scheduled snapshot task panicked");
                }
            })
        })
        .map_err(|e| {
            SnapsyncError::Scheduler(format!(
                "can't add cron job for snapshot {}, cron string is '{}': {}",
                name, cron_expression, e
            ))
        })?;

        let id = self.scheduler.lock().await.add(job).await?;
        registry.insert(name.to_string(), id);
        tracing::info!(snapshot = %name, cron = %cron_expression, "Snapshot scheduled");
        Ok(())
    }

    /// Remove the schedule of `name`; `false` when it wasn't scheduled
    pub async fn unschedule(&self, name: &str) -> Result<bool> {
        let Some(id) = self.registry.lock().await.remove(name) else {
            return Ok(false);
        };
        self.scheduler.lock().await.remove(&id).await?;
        tracing::info!(snapshot = %name, "Snapshot unscheduled");
        Ok(true)
    }

    /// Names with an active schedule, sorted
    pub async fn scheduled(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn start(&self) -> Result<()> {
        self.scheduler.lock().await.start().await?;
        Ok(())
    }

    /// Stop firing schedules. Tasks already running finish on their own.
    pub async fn shutdown(&self) -> Result<()> {
        self.scheduler.lock().await.shutdown().await?;
        self.registry.lock().await.clear();
        Ok(())
    }
}

/// Accept classic 5-field cron expressions by adding a seconds field
pub fn normalize_cron(expression: &str) -> String {
    let expression = expression.trim();
    if expression.split_whitespace().count() == 5 {
        format!("0 {}", expression)
    } else {
        expression.to_string()
    }
}
