use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(Uuid);

impl TaskHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Runs one-shot tasks after a delay. Periodic work reschedules itself.
pub trait Scheduler: Send + Sync {
    fn schedule_after(&self, delay: Duration, task: Task) -> TaskHandle;

    /// Returns `true` if the task was still pending and will not run.
    fn cancel(&self, handle: TaskHandle) -> bool;
}

/// Scheduler backed by the tokio timer wheel.
pub struct TokioScheduler {
    runtime: Handle,
    tasks: Arc<Mutex<HashMap<TaskHandle, JoinHandle<()>>>>,
}

impl TokioScheduler {
    /// Binds to the runtime of the calling context.
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current().context("tokio scheduler needs a running runtime")?;
        Ok(Self::with_handle(runtime))
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let registry = Arc::clone(&self.tasks);
        // Registered under the lock so the task cannot finish before it is tracked.
        let mut tasks = self.tasks.lock();
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if registry.lock().remove(&handle).is_some() {
                task();
            }
        });
        tasks.insert(handle, join);
        handle
    }

    fn cancel(&self, handle: TaskHandle) -> bool {
        match self.tasks.lock().remove(&handle) {
            Some(join) => {
                join.abort();
                true
            }
            None => false,
        }
    }
}

struct ManualState {
    now: Duration,
    sequence: u64,
    queue: BTreeMap<(Duration, u64), (TaskHandle, Task)>,
    index: HashMap<TaskHandle, (Duration, u64)>,
}

/// Virtual-clock scheduler. Nothing runs until [`ManualScheduler::advance`].
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: Duration::ZERO,
                sequence: 0,
                queue: BTreeMap::new(),
                index: HashMap::new(),
            }),
        }
    }

    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Moves the clock forward by `by`, running every task that falls due in
    /// deadline order, including tasks scheduled by tasks run here. Returns
    /// the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().now + by;
        let mut ran = 0;
        loop {
            let next = {
                let mut state = self.state.lock();
                let due = state
                    .queue
                    .first_key_value()
                    .map(|(key, _)| *key)
                    .filter(|(deadline, _)| *deadline <= target);
                match due {
                    Some(key) => {
                        let (handle, task) = match state.queue.remove(&key) {
                            Some(entry) => entry,
                            None => break,
                        };
                        state.index.remove(&handle);
                        state.now = key.0;
                        Some(task)
                    }
                    None => None,
                }
            };
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        self.state.lock().now = target;
        ran
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_after(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let mut state = self.state.lock();
        let key = (state.now + delay, state.sequence);
        state.sequence += 1;
        state.queue.insert(key, (handle, task));
        state.index.insert(handle, key);
        handle
    }

    fn cancel(&self, handle: TaskHandle) -> bool {
        let mut state = self.state.lock();
        match state.index.remove(&handle) {
            Some(key) => state.queue.remove(&key).is_some(),
            None => false,
        }
    }
}

/// Holds every task until the test runs it. `cancel` never succeeds, so a
/// task that was already handed to the executor can still fire later.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct HeldScheduler {
    tasks: Mutex<Vec<Task>>,
}

#[cfg(test)]
impl HeldScheduler {
    pub(crate) fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Removes and returns the oldest held task.
    pub(crate) fn take_next(&self) -> Option<Task> {
        let mut tasks = self.tasks.lock();
        if tasks.is_empty() {
            None
        } else {
            Some(tasks.remove(0))
        }
    }
}

#[cfg(test)]
impl Scheduler for HeldScheduler {
    fn schedule_after(&self, _delay: Duration, task: Task) -> TaskHandle {
        self.tasks.lock().push(task);
        TaskHandle::new()
    }

    fn cancel(&self, _handle: TaskHandle) -> bool {
        false
    }
}
