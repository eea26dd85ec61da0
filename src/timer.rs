//! Timer service collaborator.
//!
//! The real-time driver never creates threads itself: it asks a
//! [`TimerService`] to run a callback after a delay and keeps the returned
//! [`TimerHandle`] to cancel it. [`ThreadedTimerService`] is the stock
//! implementation, one worker thread serving a deadline-ordered heap.

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::SchedulingError;

/// Work run by the timer service.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Cancellable handle of a scheduled task.
pub trait TimerHandle: Send + Sync {
    /// Prevents the task from running if it has not started yet.
    /// Cancelling twice is a no-op.
    fn cancel(&self);

    fn is_cancelled(&self) -> bool;
}

/// Runs tasks after a wall-clock delay.
pub trait TimerService: Send + Sync {
    fn schedule(&self, task: TimerTask, delay: Duration) -> Result<Arc<dyn TimerHandle>, SchedulingError>;

    fn schedule_immediate(&self, task: TimerTask) -> Result<Arc<dyn TimerHandle>, SchedulingError> {
        self.schedule(task, Duration::ZERO)
    }

    /// True once no new task is accepted.
    fn is_shutdown(&self) -> bool;

    /// True once shut down and every accepted task has run or was dropped.
    fn is_terminated(&self) -> bool;

    /// Stops accepting tasks; already scheduled tasks still run.
    fn shutdown(&self);

    /// Stops accepting tasks and drops every pending one.
    fn shutdown_now(&self);
}

#[derive(Debug, Default)]
struct FlagHandle {
    cancelled: AtomicBool,
}

impl TimerHandle for FlagHandle {
    fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::SeqCst)
    }
}

struct Entry {
    deadline: Instant,
    seq: u64,
    handle: Arc<FlagHandle>,
    task: TimerTask,
}

// Reversed, so the max-heap pops the earliest deadline first.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Entry {}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    shutdown: bool,
    terminated: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    wakeup: Condvar,
}

/// Timer service backed by a single worker thread.
///
/// Tasks run one at a time on the worker, in deadline order; ties run in
/// scheduling order. A panicking task is logged and does not take the
/// worker down.
pub struct ThreadedTimerService {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadedTimerService {
    pub fn new() -> Result<Self, SchedulingError> {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("devs-timer".to_string())
            .spawn(move || worker_loop(&worker_shared))
            .map_err(|e| SchedulingError::Rejected(e.to_string()))?;
        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Number of tasks waiting for their deadline.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().heap.len()
    }

    /// Blocks until the service terminated or `timeout` elapsed. Returns
    /// whether it terminated.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.shared.queue.lock();
        while !queue.terminated {
            if self.shared.wakeup.wait_until(&mut queue, deadline).timed_out() {
                return queue.terminated;
            }
        }
        true
    }
}

fn worker_loop(shared: &Shared) {
    let mut queue = shared.queue.lock();
    loop {
        let Some(deadline) = queue.heap.peek().map(|e| e.deadline) else {
            if queue.shutdown {
                break;
            }
            shared.wakeup.wait(&mut queue);
            continue;
        };
        if deadline > Instant::now() {
            shared.wakeup.wait_until(&mut queue, deadline);
            continue;
        }
        let Some(entry) = queue.heap.pop() else {
            continue;
        };
        if entry.handle.is_cancelled() {
            continue;
        }
        let task = entry.task;
        parking_lot::MutexGuard::unlocked(&mut queue, move || {
            if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                tracing::error!("timer task panicked");
            }
        });
    }
    queue.terminated = true;
    shared.wakeup.notify_all();
    tracing::debug!("timer worker terminated");
}

impl TimerService for ThreadedTimerService {
    fn schedule(&self, task: TimerTask, delay: Duration) -> Result<Arc<dyn TimerHandle>, SchedulingError> {
        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            return Err(SchedulingError::Shutdown);
        }
        let handle = Arc::new(FlagHandle::default());
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.heap.push(Entry {
            deadline: Instant::now() + delay,
            seq,
            handle: Arc::clone(&handle),
            task,
        });
        self.shared.wakeup.notify_all();
        Ok(handle)
    }

    fn is_shutdown(&self) -> bool {
        self.shared.queue.lock().shutdown
    }

    fn is_terminated(&self) -> bool {
        self.shared.queue.lock().terminated
    }

    fn shutdown(&self) {
        self.shared.queue.lock().shutdown = true;
        self.shared.wakeup.notify_all();
    }

    fn shutdown_now(&self) {
        let dropped = {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
            std::mem::take(&mut queue.heap)
        };
        self.shared.wakeup.notify_all();
        if !dropped.is_empty() {
            tracing::debug!(dropped = dropped.len(), "timer service dropped pending tasks");
        }
    }
}

impl Drop for ThreadedTimerService {
    fn drop(&mut self) {
        self.shutdown_now();
        if let Some(worker) = self.worker.lock().take() {
            // The last reference may be dropped by a task on the worker.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl std::fmt::Debug for ThreadedTimerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queue = self.shared.queue.lock();
        f.debug_struct("ThreadedTimerService")
            .field("pending", &queue.heap.len())
            .field("shutdown", &queue.shutdown)
            .field("terminated", &queue.terminated)
            .finish()
    }
}
