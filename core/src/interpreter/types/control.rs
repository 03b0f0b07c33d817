//! Control flow and execution outcome types

use super::values::Val;

/* ===================== Control Flow ===================== */

/// Control flow state
///
/// Statement and expression evaluation return `Err(Control)` for anything
/// other than normal completion. The evaluator unwinds until a frame that
/// handles the variant: loops take Break/Continue, calls take Return,
/// try/catch takes Throw. Nothing in a script takes Fault.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Break,
    Continue,
    Return(Val),
    Throw(Val),
    Fault(Fault),
}

pub type Exec<T> = Result<T, Control>;

/* ===================== Faults ===================== */

/// An interpreter-level failure that script code cannot catch
///
/// A fault leaves the VM in a state that can't be trusted, so whoever runs
/// the VM is expected to stop using it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Fault {
    #[error("maximum call depth of {limit} exceeded")]
    CallDepthExceeded { limit: usize },

    #[error("dangling {kind} handle {id}")]
    DanglingHandle { kind: &'static str, id: u64 },

    #[error("host function panicked: {0}")]
    HostPanic(String),
}

/* ===================== Public Outcome ===================== */

/// Error returned by the VM's public entry points
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecError {
    /// A script-level exception; `catch` could have handled it
    #[error("uncaught exception: {}", .0.to_display_string())]
    Throw(Val),

    #[error(transparent)]
    Fault(#[from] Fault),
}

impl ExecError {
    pub fn is_fault(&self) -> bool {
        matches!(self, ExecError::Fault(_))
    }
}

impl From<ExecError> for Control {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Throw(v) => Control::Throw(v),
            ExecError::Fault(f) => Control::Fault(f),
        }
    }
}

impl From<Fault> for Control {
    fn from(fault: Fault) -> Self {
        Control::Fault(fault)
    }
}
