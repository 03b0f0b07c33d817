//! Tasks: units of work the loop runs against its VM

use crate::interpreter::{Job, PromiseId, Settlement, Val};
use std::fmt;
use std::time::Duration;

/// Id of a task, unique within one loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Runs once, when marked ready
    Call,
    /// One-shot timer
    Timeout,
    /// Repeating timer
    Interval,
    /// Delivery of an off-thread result, runs once when marked ready
    IoCompletion,
}

impl TaskKind {
    pub fn is_timer(self) -> bool {
        matches!(self, TaskKind::Timeout | TaskKind::Interval)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Call => "call",
            TaskKind::Timeout => "timeout",
            TaskKind::Interval => "interval",
            TaskKind::IoCompletion => "io",
        };
        f.write_str(name)
    }
}

/// What a call task invokes
#[derive(Debug, Clone)]
pub enum Callee {
    /// A function value captured from the VM
    Value(Val),
    /// A global looked up when the task runs
    Global(String),
}

impl From<Val> for Callee {
    fn from(value: Val) -> Self {
        Callee::Value(value)
    }
}

impl From<&str> for Callee {
    fn from(name: &str) -> Self {
        Callee::Global(name.to_string())
    }
}

impl From<String> for Callee {
    fn from(name: String) -> Self {
        Callee::Global(name)
    }
}

/// The work a task performs on the VM
#[derive(Debug, Clone)]
pub enum TaskBody {
    Call { callee: Callee, args: Vec<Val> },
    Eval { source: String },
    GetGlobal { name: String },
    SetGlobal { name: String, value: Val },
    Settle { promise: PromiseId, settlement: Settlement },
    Job(Job),
}

impl TaskBody {
    /// Push every promise handle this body carries onto `out`
    pub fn collect_promise_ids(&self, out: &mut Vec<PromiseId>) {
        match self {
            TaskBody::Call { callee, args } => {
                if let Callee::Value(value) = callee {
                    value.collect_promise_ids(out);
                }
                for arg in args {
                    arg.collect_promise_ids(out);
                }
            }
            TaskBody::SetGlobal { value, .. } => value.collect_promise_ids(out),
            TaskBody::Settle {
                promise,
                settlement,
            } => {
                out.push(*promise);
                settlement.value().collect_promise_ids(out);
            }
            TaskBody::Job(job) => job.collect_promise_ids(out),
            TaskBody::Eval { .. } | TaskBody::GetGlobal { .. } => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub kind: TaskKind,
    pub body: TaskBody,
    /// Timer delay, or interval period
    pub delay: Duration,
}

impl Task {
    pub fn call(callee: impl Into<Callee>, args: Vec<Val>) -> Self {
        Self::immediate(TaskKind::Call, TaskBody::Call {
            callee: callee.into(),
            args,
        })
    }

    pub fn eval(source: impl Into<String>) -> Self {
        Self::immediate(TaskKind::Call, TaskBody::Eval {
            source: source.into(),
        })
    }

    pub fn get_global(name: impl Into<String>) -> Self {
        Self::immediate(TaskKind::Call, TaskBody::GetGlobal { name: name.into() })
    }

    pub fn set_global(name: impl Into<String>, value: Val) -> Self {
        Self::immediate(TaskKind::Call, TaskBody::SetGlobal {
            name: name.into(),
            value,
        })
    }

    pub fn job(job: Job) -> Self {
        Self::immediate(TaskKind::Call, TaskBody::Job(job))
    }

    pub fn io_completion(body: TaskBody) -> Self {
        Self::immediate(TaskKind::IoCompletion, body)
    }

    pub fn timeout(callback: Val, args: Vec<Val>, delay: Duration) -> Self {
        Self {
            kind: TaskKind::Timeout,
            body: TaskBody::Call {
                callee: Callee::Value(callback),
                args,
            },
            delay,
        }
    }

    /// Repeating timer; the period is clamped to at least one millisecond
    pub fn interval(callback: Val, args: Vec<Val>, period: Duration) -> Self {
        Self {
            kind: TaskKind::Interval,
            body: TaskBody::Call {
                callee: Callee::Value(callback),
                args,
            },
            delay: period.max(MIN_INTERVAL),
        }
    }

    fn immediate(kind: TaskKind, body: TaskBody) -> Self {
        Self {
            kind,
            body,
            delay: Duration::ZERO,
        }
    }
}

pub const MIN_INTERVAL: Duration = Duration::from_millis(1);
