//! The durable in-process worker task queue: `Task(id, name, attrs, data,
//! deadline)`, worker attachment by name/attribute filter, dispatch to the
//! first eligible attached worker, retry-on-error up to a configurable
//! limit, and deadline reaping.
//!
//! Grounded on the worker dispatch/retry usage patterns referenced from
//! `original_source/ckworker` and the queue/stream idiom of
//! `graph/src/components/store.rs::StoreEventStream`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use serde_json::Value as Json;

/// A unit of work a worker can claim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub attrs: HashMap<String, String>,
    pub data: Json,
}

/// What a worker declares it can handle when it attaches.
#[derive(Clone, Debug)]
pub struct WorkerDescriptor {
    pub worker_id: String,
    pub task_names: Vec<String>,
    pub attr_filter: HashMap<String, String>,
}

impl WorkerDescriptor {
    fn matches(&self, task: &Task) -> bool {
        self.task_names.iter().any(|n| n == &task.name)
            && self
                .attr_filter
                .iter()
                .all(|(k, v)| task.attrs.get(k).map(|actual| actual == v).unwrap_or(false))
    }
}

#[derive(Debug, Fail)]
pub enum TaskError {
    #[fail(display = "unknown task: {}", _0)]
    NotFound(String),
    #[fail(display = "task {} is not in flight", _0)]
    NotInFlight(String),
}

struct InFlight {
    worker_id: String,
    retry_counter: usize,
    deadline: SystemTime,
}

struct QueueState {
    queued: VecDeque<Task>,
    in_flight: HashMap<String, InFlight>,
    workers: Vec<WorkerDescriptor>,
}

/// The outcome of reaping a single expired in-flight task.
#[derive(Debug, PartialEq)]
pub enum ReapOutcome {
    Requeued(String),
    Failed(String),
}

/// Durable worker task queue, `retry_limit` controlling how many times an
/// errored task is re-queued before it fails outright (resolved as 3 by
/// default via [`crate::config::Config`]).
pub struct TaskQueue {
    state: Mutex<QueueState>,
    retry_limit: usize,
    task_deadline: Duration,
}

impl TaskQueue {
    pub fn new(retry_limit: usize, task_deadline: Duration) -> Self {
        TaskQueue {
            state: Mutex::new(QueueState {
                queued: VecDeque::new(),
                in_flight: HashMap::new(),
                workers: Vec::new(),
            }),
            retry_limit,
            task_deadline,
        }
    }

    pub fn attach_worker(&self, descriptor: WorkerDescriptor) {
        self.state.lock().unwrap().workers.push(descriptor);
    }

    pub fn detach_worker(&self, worker_id: &str) {
        self.state.lock().unwrap().workers.retain(|w| w.worker_id != worker_id);
    }

    pub fn submit(&self, task: Task) {
        self.state.lock().unwrap().queued.push_back(task);
    }

    /// Dispatch the oldest queued task this worker is eligible for. If no
    /// queued task matches, the task stays queued.
    pub fn fetch_next(&self, worker_id: &str) -> Option<Task> {
        let mut state = self.state.lock().unwrap();
        let descriptor = state.workers.iter().find(|w| w.worker_id == worker_id)?.clone();
        let position = state.queued.iter().position(|t| descriptor.matches(t))?;
        let task = state.queued.remove(position)?;
        state.in_flight.insert(
            task.id.clone(),
            InFlight {
                worker_id: worker_id.to_owned(),
                retry_counter: 0,
                deadline: SystemTime::now() + self.task_deadline,
            },
        );
        Some(task)
    }

    /// `acknowledge_task`: the task resolves successfully.
    pub fn acknowledge(&self, task_id: &str) -> Result<(), TaskError> {
        let mut state = self.state.lock().unwrap();
        state
            .in_flight
            .remove(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_owned()))?;
        Ok(())
    }

    /// `error_task`: increments the retry counter and re-queues below the
    /// limit; above the limit the task fails.
    pub fn error_task(&self, task_id: &str, task: Task) -> Result<ReapOutcome, TaskError> {
        let mut state = self.state.lock().unwrap();
        let in_flight = state
            .in_flight
            .get_mut(task_id)
            .ok_or_else(|| TaskError::NotInFlight(task_id.to_owned()))?;
        in_flight.retry_counter += 1;
        if in_flight.retry_counter >= self.retry_limit {
            state.in_flight.remove(task_id);
            Ok(ReapOutcome::Failed(task_id.to_owned()))
        } else {
            state.in_flight.remove(task_id);
            state.queued.push_back(task);
            Ok(ReapOutcome::Requeued(task_id.to_owned()))
        }
    }

    /// Sweep in-flight tasks past their deadline, retrying or failing each.
    pub fn reap_expired(&self, pending: &HashMap<String, Task>) -> Vec<ReapOutcome> {
        let now = SystemTime::now();
        let expired: Vec<String> = {
            let state = self.state.lock().unwrap();
            state
                .in_flight
                .iter()
                .filter(|(_, flight)| flight.deadline <= now)
                .map(|(id, _)| id.clone())
                .collect()
        };
        expired
            .into_iter()
            .filter_map(|id| pending.get(&id).and_then(|task| self.error_task(&id, task.clone()).ok()))
            .collect()
    }

    pub fn queued_len(&self) -> usize {
        self.state.lock().unwrap().queued.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.state.lock().unwrap().in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, name: &str) -> Task {
        Task {
            id: id.to_owned(),
            name: name.to_owned(),
            attrs: HashMap::new(),
            data: Json::Null,
        }
    }

    #[test]
    fn dispatch_matches_first_eligible_worker() {
        let queue = TaskQueue::new(3, Duration::from_secs(30));
        queue.attach_worker(WorkerDescriptor {
            worker_id: "w1".into(),
            task_names: vec!["tag".into()],
            attr_filter: HashMap::new(),
        });
        queue.submit(task("t1", "tag"));
        let fetched = queue.fetch_next("w1").unwrap();
        assert_eq!(fetched.id, "t1");
        assert_eq!(queue.in_flight_len(), 1);
    }

    #[test]
    fn task_stays_queued_when_no_worker_matches() {
        let queue = TaskQueue::new(3, Duration::from_secs(30));
        queue.attach_worker(WorkerDescriptor {
            worker_id: "w1".into(),
            task_names: vec!["other".into()],
            attr_filter: HashMap::new(),
        });
        queue.submit(task("t1", "tag"));
        assert!(queue.fetch_next("w1").is_none());
        assert_eq!(queue.queued_len(), 1);
    }

    #[test]
    fn error_task_requeues_below_retry_limit_then_fails() {
        let queue = TaskQueue::new(2, Duration::from_secs(30));
        queue.attach_worker(WorkerDescriptor {
            worker_id: "w1".into(),
            task_names: vec!["tag".into()],
            attr_filter: HashMap::new(),
        });
        let t = task("t1", "tag");
        queue.submit(t.clone());
        queue.fetch_next("w1").unwrap();
        let outcome = queue.error_task("t1", t.clone()).unwrap();
        assert_eq!(outcome, ReapOutcome::Requeued("t1".into()));
        queue.fetch_next("w1").unwrap();
        let outcome = queue.error_task("t1", t).unwrap();
        assert_eq!(outcome, ReapOutcome::Failed("t1".into()));
    }

    #[test]
    fn acknowledge_clears_in_flight_task() {
        let queue = TaskQueue::new(3, Duration::from_secs(30));
        queue.attach_worker(WorkerDescriptor {
            worker_id: "w1".into(),
            task_names: vec!["tag".into()],
            attr_filter: HashMap::new(),
        });
        queue.submit(task("t1", "tag"));
        queue.fetch_next("w1").unwrap();
        queue.acknowledge("t1").unwrap();
        assert_eq!(queue.in_flight_len(), 0);
    }
}
