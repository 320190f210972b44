//! The task handler: job definitions (schedule, optional event trigger, a
//! command body to run) and the running-task bookkeeping that coordinates
//! action/done/error flows with subscribers via the bus.
//!
//! Grounded on the `jobs`/`add_job`/`start_task` command surface referenced
//! from `original_source/ckcore/core/cli/command.py` and `cli.py`, and the
//! "emit on mutation" idiom already present in
//! `graph/src/components/store.rs`'s `StoreEvent`/`EntityChange` plumbing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crate::events::{EventBus, Message};

/// What causes a job to run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Trigger {
    /// A cron-style schedule, stored verbatim; evaluating it against wall
    /// clock time is a scheduler-loop concern outside this module.
    Cron(String),
    /// Fire when `event_type` is observed on the bus, waiting at most 24h
    /// for the next occurrence.
    Event { event_type: String, max_wait: Duration },
}

/// Whether a new run is allowed while a previous run of the same job is
/// still active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurpassBehavior {
    Skip,
    Parallel,
    Replace,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: String,
    pub trigger: Trigger,
    pub command: String,
    pub surpass_behavior: SurpassBehavior,
}

#[derive(Debug, Fail)]
pub enum WorkflowError {
    #[fail(display = "unknown job: {}", _0)]
    UnknownJob(String),
    #[fail(display = "job {} is already running and its surpass behavior forbids a parallel run", _0)]
    AlreadyRunning(String),
}

struct RunningTask {
    task_id: String,
    job_id: String,
    started_at: SystemTime,
}

/// Coordinates scheduled/event-triggered jobs: `add_job`/`delete_job`
/// register definitions, `start_task_by_descriptor_id` starts a run subject
/// to `surpass_behavior`, and action/done/error messages flow through the
/// shared `EventBus`.
pub struct TaskHandler {
    bus: Arc<EventBus>,
    jobs: Mutex<HashMap<String, JobDefinition>>,
    running: Mutex<Vec<RunningTask>>,
}

impl TaskHandler {
    pub fn new(bus: Arc<EventBus>) -> Self {
        TaskHandler {
            bus,
            jobs: Mutex::new(HashMap::new()),
            running: Mutex::new(Vec::new()),
        }
    }

    pub fn add_job(&self, job: JobDefinition) {
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
    }

    pub fn delete_job(&self, job_id: &str) -> Result<(), WorkflowError> {
        self.jobs
            .lock()
            .unwrap()
            .remove(job_id)
            .map(|_| ())
            .ok_or_else(|| WorkflowError::UnknownJob(job_id.to_owned()))
    }

    pub fn jobs(&self) -> Vec<JobDefinition> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }

    pub fn running_task_ids(&self, job_id: &str) -> Vec<String> {
        self.running
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.job_id == job_id)
            .map(|t| t.task_id.clone())
            .collect()
    }

    /// Start a run of `job_id`, subject to its `surpass_behavior`. Returns
    /// the started `task_id`.
    pub fn start_task_by_descriptor_id(&self, job_id: &str, task_id: impl Into<String>) -> Result<String, WorkflowError> {
        let jobs = self.jobs.lock().unwrap();
        let job = jobs.get(job_id).ok_or_else(|| WorkflowError::UnknownJob(job_id.to_owned()))?;
        let mut running = self.running.lock().unwrap();
        let already_running = running.iter().any(|t| t.job_id == job_id);
        if already_running {
            match job.surpass_behavior {
                SurpassBehavior::Skip => return Err(WorkflowError::AlreadyRunning(job_id.to_owned())),
                SurpassBehavior::Replace => running.retain(|t| t.job_id != job_id),
                SurpassBehavior::Parallel => {}
            }
        }
        let task_id = task_id.into();
        running.push(RunningTask {
            task_id: task_id.clone(),
            job_id: job_id.to_owned(),
            started_at: SystemTime::now(),
        });
        drop(running);
        drop(jobs);
        self.bus.emit(Message::Action {
            message_type: "job_started".to_owned(),
            task_id: task_id.clone(),
            step: job_id.to_owned(),
        });
        Ok(task_id)
    }

    pub fn task_done(&self, task_id: &str, subscriber_id: &str) {
        self.running.lock().unwrap().retain(|t| t.task_id != task_id);
        self.bus.emit(Message::ActionDone {
            message_type: "job_finished".to_owned(),
            task_id: task_id.to_owned(),
            step: String::new(),
            subscriber_id: subscriber_id.to_owned(),
        });
    }

    pub fn task_failed(&self, task_id: &str, subscriber_id: &str, error: impl Into<String>) {
        self.running.lock().unwrap().retain(|t| t.task_id != task_id);
        self.bus.emit(Message::ActionError {
            message_type: "job_finished".to_owned(),
            task_id: task_id.to_owned(),
            step: String::new(),
            subscriber_id: subscriber_id.to_owned(),
            error: error.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, surpass: SurpassBehavior) -> JobDefinition {
        JobDefinition {
            id: id.to_owned(),
            trigger: Trigger::Cron("0 * * * *".to_owned()),
            command: "echo hi".to_owned(),
            surpass_behavior: surpass,
        }
    }

    #[test]
    fn skip_surpass_behavior_rejects_parallel_run() {
        let bus = std::sync::Arc::new(EventBus::new());
        let handler = TaskHandler::new(bus.clone());
        handler.add_job(job("nightly", SurpassBehavior::Skip));
        handler.start_task_by_descriptor_id("nightly", "t1").unwrap();
        let err = handler.start_task_by_descriptor_id("nightly", "t2").unwrap_err();
        assert!(matches!(err, WorkflowError::AlreadyRunning(_)));
    }

    #[test]
    fn parallel_surpass_behavior_allows_concurrent_runs() {
        let bus = std::sync::Arc::new(EventBus::new());
        let handler = TaskHandler::new(bus.clone());
        handler.add_job(job("nightly", SurpassBehavior::Parallel));
        handler.start_task_by_descriptor_id("nightly", "t1").unwrap();
        handler.start_task_by_descriptor_id("nightly", "t2").unwrap();
        assert_eq!(handler.running_task_ids("nightly").len(), 2);
    }

    #[test]
    fn task_done_clears_running_entry() {
        let bus = std::sync::Arc::new(EventBus::new());
        let handler = TaskHandler::new(bus.clone());
        handler.add_job(job("nightly", SurpassBehavior::Skip));
        handler.start_task_by_descriptor_id("nightly", "t1").unwrap();
        handler.task_done("t1", "worker-1");
        assert!(handler.running_task_ids("nightly").is_empty());
    }
}
