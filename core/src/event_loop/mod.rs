//! Event Loop
//!
//! Serializes all access to a VM. The loop owns the VM and a task queue;
//! `LoopHandle`s add work to the queue from any thread and the loop thread
//! runs it one task at a time, never preempting a running task.
//!
//! Ordering: among eligible tasks the one that became ready earliest runs
//! first. `ready` makes a task eligible now, so it runs ahead of future
//! timers and behind anything already eligible.
//!
//! Cancellation is checked between tasks. Once the loop exits the queue is
//! closed and every waiting caller receives `CallError::LoopStopped`.

mod queue;
pub mod task;

#[cfg(test)]
mod tests;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::interpreter::errors;
use crate::interpreter::{ExecError, Fault, Val, Vm};
use queue::{Due, Queue};
pub use task::{Callee, Task, TaskBody, TaskId, TaskKind};

/* ===================== Errors ===================== */

/// Outcome of a single call routed through the loop
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    /// The script threw; the loop keeps running
    #[error("uncaught exception: {}", .0.to_display_string())]
    Exception(Val),

    /// The task hit a fault and the loop stopped
    #[error("fatal interpreter fault: {0}")]
    Fatal(String),

    /// The loop exited before the task ran
    #[error("event loop is not running")]
    LoopStopped,
}

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoopError {
    #[error("event loop cancelled")]
    Cancelled,

    #[error("event loop stopped by fault: {0}")]
    Fatal(Fault),

    #[error("failed to start event loop runtime: {0}")]
    Runtime(String),
}

/* ===================== Completion ===================== */

/// Result of a task, delivered once it has executed
#[must_use = "a completion does nothing unless waited on"]
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Result<Val, CallError>>,
}

impl Completion {
    fn channel() -> (queue::Reply, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    pub async fn wait(self) -> Result<Val, CallError> {
        self.rx.await.unwrap_or(Err(CallError::LoopStopped))
    }

    /// Block the current thread until the task has run
    ///
    /// Panics if called from inside an async runtime; use `wait` there.
    pub fn wait_blocking(self) -> Result<Val, CallError> {
        self.rx.blocking_recv().unwrap_or(Err(CallError::LoopStopped))
    }
}

/* ===================== Handle ===================== */

struct Shared {
    queue: Mutex<Queue>,
    wake: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Thread-safe entry point into a loop's queue
#[derive(Clone)]
pub struct LoopHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl LoopHandle {
    /// Enqueue a task. Timers start counting down now; calls wait for `ready`.
    pub fn add(&self, task: Task) -> TaskId {
        let timer = task.kind.is_timer();
        let id = self.shared.lock().insert(task, Instant::now());
        if timer {
            self.shared.wake.notify_one();
        }
        id
    }

    /// Mark an added task runnable now and get its completion
    pub fn ready(&self, id: TaskId) -> Completion {
        let (tx, completion) = Completion::channel();
        self.shared.lock().mark_ready(id, Some(tx), Instant::now());
        self.shared.wake.notify_one();
        completion
    }

    /// Add and ready a new task in one step
    pub fn submit(&self, task: Task) -> Completion {
        let (tx, completion) = Completion::channel();
        {
            let mut queue = self.shared.lock();
            let now = Instant::now();
            let id = queue.insert(task, now);
            queue.mark_ready(id, Some(tx), now);
        }
        self.shared.wake.notify_one();
        completion
    }

    /// Add and ready a task nobody waits on
    pub fn post(&self, task: Task) -> TaskId {
        let id = {
            let mut queue = self.shared.lock();
            let now = Instant::now();
            let id = queue.insert(task, now);
            queue.mark_ready(id, None, now);
            id
        };
        self.shared.wake.notify_one();
        id
    }

    /// Cancel a pending timer. Unknown, fired or non-timer ids are ignored.
    pub fn clear(&self, id: TaskId) -> bool {
        self.shared.lock().cancel_timer(id)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().is_closed()
    }
}

/* ===================== Loop ===================== */

/// Promise table size below which the loop never sweeps it
const PROMISE_SWEEP_FLOOR: usize = 256;

/// The loop and the VM it owns
///
/// Dropping the loop closes its queue. Between tasks the loop forgets settled
/// promises that no scope, job or queued task can reach; a promise handle
/// returned to the host is not a root and may be forgotten too.
pub struct Loop {
    vm: Vm,
    shared: Arc<Shared>,
    promises_after_sweep: usize,
}

impl Loop {
    pub fn new(vm: Vm) -> Self {
        Self {
            vm,
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue::new()),
                wake: Notify::new(),
            }),
            promises_after_sweep: 0,
        }
    }

    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            shared: self.shared.clone(),
        }
    }

    /// The VM, for setup before the loop starts
    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }

    /// Run on a fresh current-thread runtime, blocking the calling thread
    pub fn run_blocking(self, cancel: CancellationToken) -> Result<(), LoopError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| LoopError::Runtime(e.to_string()))?;
        runtime.block_on(self.run(cancel))
    }

    /// Execute tasks until cancelled or a fault occurs
    ///
    /// Never returns `Ok`: a loop only ends through cancellation or a fault.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), LoopError> {
        debug!("Event loop started");
        self.schedule_jobs();
        loop {
            if cancel.is_cancelled() {
                debug!("Event loop received cancellation");
                return Err(LoopError::Cancelled);
            }

            let (due, deadline) = {
                let mut queue = self.shared.lock();
                match queue.pop_due(Instant::now()) {
                    Some(due) => (Some(due), None),
                    None => (None, queue.next_deadline()),
                }
            };

            match due {
                Some(due) => self.execute(due)?,
                None => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            debug!("Event loop received cancellation");
                            return Err(LoopError::Cancelled);
                        }
                        _ = self.shared.wake.notified() => {}
                        _ = sleep_until(deadline) => {}
                    }
                }
            }
        }
    }

    fn execute(&mut self, due: Due) -> Result<(), LoopError> {
        let Due {
            id,
            kind,
            body,
            delay,
            completion,
        } = due;
        let fired_at = Instant::now();
        trace!("Executing task {} ({})", id, kind);

        let vm = &mut self.vm;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_body(vm, body)))
            .unwrap_or_else(|payload| Err(Fault::HostPanic(panic_message(payload)).into()));

        self.schedule_jobs();
        for (promise, reason) in self.vm.take_unhandled_rejections() {
            warn!(
                "Unhandled promise rejection ({:?}): {}",
                promise,
                self.vm.describe(&reason)
            );
        }

        match outcome {
            Ok(value) => {
                if let Some(tx) = completion {
                    let _ = tx.send(Ok(value));
                }
            }
            Err(ExecError::Throw(value)) => match completion {
                Some(tx) => {
                    let _ = tx.send(Err(CallError::Exception(value)));
                }
                None => warn!(
                    "Uncaught exception in {} task {}: {}",
                    kind,
                    id,
                    self.vm.describe(&value)
                ),
            },
            Err(ExecError::Fault(fault)) => {
                error!("Fatal fault in {} task {}: {}", kind, id, fault);
                if let Some(tx) = completion {
                    let _ = tx.send(Err(CallError::Fatal(fault.to_string())));
                }
                return Err(LoopError::Fatal(fault));
            }
        }

        if kind == TaskKind::Interval {
            self.shared.lock().reschedule(id, fired_at + delay);
        }
        self.sweep_promises();
        Ok(())
    }

    /// Sweep the promise table once it has doubled since the last sweep
    fn sweep_promises(&mut self) {
        let count = self.vm.promise_count();
        if count < PROMISE_SWEEP_FLOOR.max(self.promises_after_sweep * 2) {
            return;
        }
        let held = self.shared.lock().collect_promise_ids();
        let dropped = self.vm.collect_promises(held);
        self.promises_after_sweep = self.vm.promise_count();
        trace!(
            "Swept {} settled promises, {} remain",
            dropped,
            self.promises_after_sweep
        );
    }

    /// Queue promise reactions produced by the last task as ready calls
    fn schedule_jobs(&mut self) {
        let jobs = self.vm.take_jobs();
        if jobs.is_empty() {
            return;
        }
        let mut queue = self.shared.lock();
        let now = Instant::now();
        for job in jobs {
            let id = queue.insert(Task::job(job), now);
            queue.mark_ready(id, None, now);
        }
    }
}

impl Drop for Loop {
    fn drop(&mut self) {
        let dropped = self.shared.lock().close();
        if dropped > 0 {
            debug!("Event loop closed with {} pending tasks", dropped);
        }
    }
}

fn run_body(vm: &mut Vm, body: TaskBody) -> Result<Val, ExecError> {
    match body {
        TaskBody::Call { callee, args } => {
            let func = match callee {
                Callee::Value(func) => func,
                Callee::Global(name) => vm
                    .global(&name)
                    .ok_or_else(|| errors::reference_error(format!("{} is not defined", name)))?,
            };
            vm.call(&func, args)
        }
        TaskBody::Eval { source } => vm.eval(&source),
        TaskBody::GetGlobal { name } => Ok(vm.global(&name).unwrap_or(Val::Undefined)),
        TaskBody::SetGlobal { name, value } => {
            vm.set_global(&name, value);
            Ok(Val::Undefined)
        }
        TaskBody::Settle {
            promise,
            settlement,
        } => {
            vm.settle_promise(promise, settlement)?;
            Ok(Val::Undefined)
        }
        TaskBody::Job(job) => {
            vm.run_job(job)?;
            Ok(Val::Undefined)
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
