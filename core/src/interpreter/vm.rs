//! Virtual Machine state
//!
//! The VM holds all interpreter state:
//! - scopes: Arena of lexical scopes (globals live in `ScopeId::GLOBAL`)
//! - natives: Host and stdlib functions reachable through `Val::Native`
//! - promises: Promise table plus the queue of reaction jobs
//!
//! The VM contains only plain data, so it can be built on one thread and
//! handed to another. It is not synchronized: whoever owns it must make sure
//! a single thread drives it at a time.

use super::errors;
use super::parser;
use super::promise::{Job, PromiseState, PromiseTable, Reaction, Settlement};
use super::scope::{ScopeId, Scopes};
use super::statements;
use super::stdlib::{self, StdlibFunc};
use super::types::{Closure, Control, ExecError, Fault, NativeId, PromiseId, Val};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Call depth at which a runaway recursion becomes a fault
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// Host function signature
pub type NativeFn = Arc<dyn Fn(&mut Vm, Vec<Val>) -> Result<Val, ExecError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefineError {
    #[error("global '{0}' is already defined")]
    AlreadyDefined(String),
}

enum Native {
    Stdlib(StdlibFunc),
    Host { name: String, func: NativeFn },
}

/* ===================== VM ===================== */

pub struct Vm {
    pub(crate) scopes: Scopes,
    natives: Vec<Native>,
    promises: PromiseTable,
    jobs: VecDeque<Job>,
    depth: usize,
    max_call_depth: usize,
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("natives", &self.natives.len())
            .field("promises", &self.promises.len())
            .field("jobs", &self.jobs.len())
            .field("depth", &self.depth)
            .field("max_call_depth", &self.max_call_depth)
            .finish()
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Create a VM with the standard library installed
    pub fn new() -> Self {
        Self::with_max_call_depth(DEFAULT_MAX_CALL_DEPTH)
    }

    pub fn with_max_call_depth(max_call_depth: usize) -> Self {
        let mut vm = Vm {
            scopes: Scopes::new(),
            natives: Vec::new(),
            promises: PromiseTable::default(),
            jobs: VecDeque::new(),
            depth: 0,
            max_call_depth,
        };
        stdlib::inject_stdlib(&mut vm);
        vm
    }

    pub fn max_call_depth(&self) -> usize {
        self.max_call_depth
    }

    /* ===================== Globals ===================== */

    /// Wrap a host function as a callable value without binding it to a name
    pub fn native<F>(&mut self, name: &str, func: F) -> Val
    where
        F: Fn(&mut Vm, Vec<Val>) -> Result<Val, ExecError> + Send + Sync + 'static,
    {
        self.natives.push(Native::Host {
            name: name.to_string(),
            func: Arc::new(func),
        });
        Val::Native(NativeId(self.natives.len() - 1))
    }

    pub(crate) fn stdlib_value(&mut self, func: StdlibFunc) -> Val {
        self.natives.push(Native::Stdlib(func));
        Val::Native(NativeId(self.natives.len() - 1))
    }

    /// Register a host function as a new global
    pub fn define_native<F>(&mut self, name: &str, func: F) -> Result<(), DefineError>
    where
        F: Fn(&mut Vm, Vec<Val>) -> Result<Val, ExecError> + Send + Sync + 'static,
    {
        if self.has_global(name) {
            return Err(DefineError::AlreadyDefined(name.to_string()));
        }
        let value = self.native(name, func);
        self.define_global(name, value)
    }

    /// Bind a new global; fails if the name is taken
    pub fn define_global(&mut self, name: &str, value: Val) -> Result<(), DefineError> {
        if self.has_global(name) {
            return Err(DefineError::AlreadyDefined(name.to_string()));
        }
        self.scopes.declare(ScopeId::GLOBAL, name, value, false);
        Ok(())
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.scopes.lookup(ScopeId::GLOBAL, name).is_some()
    }

    pub fn global(&self, name: &str) -> Option<Val> {
        self.scopes.lookup(ScopeId::GLOBAL, name).cloned()
    }

    /// Create or overwrite a global
    pub fn set_global(&mut self, name: &str, value: Val) {
        match self.scopes.slot_mut(ScopeId::GLOBAL, name) {
            Some(slot) => slot.value = value,
            None => self.scopes.declare(ScopeId::GLOBAL, name, value, false),
        }
    }

    fn native_name(&self, id: NativeId) -> Option<&str> {
        match self.natives.get(id.0)? {
            Native::Host { name, .. } => Some(name.as_str()),
            Native::Stdlib(func) => Some(func.name()),
        }
    }

    /// Human readable form of a value, naming native functions
    pub fn describe(&self, value: &Val) -> String {
        match value {
            Val::Native(id) => match self.native_name(*id) {
                Some(name) => format!("[function {}]", name),
                None => value.to_display_string(),
            },
            other => other.to_display_string(),
        }
    }

    /* ===================== Execution ===================== */

    /// Run a program in the global scope
    ///
    /// Returns the value of the last expression statement executed at top
    /// level, which is what a REPL would print.
    pub fn eval(&mut self, source: &str) -> Result<Val, ExecError> {
        let program =
            parser::parse_program(source).map_err(|e| errors::syntax_error(e.to_string()))?;
        statements::exec_program(self, &program)
    }

    /// Call a function value synchronously
    pub fn call(&mut self, callee: &Val, args: Vec<Val>) -> Result<Val, ExecError> {
        match callee {
            Val::Func(closure) => self.call_closure(closure.clone(), args),
            Val::Native(id) => self.call_native(*id, args),
            other => Err(errors::type_error(format!(
                "{} is not a function",
                other.to_display_string()
            ))),
        }
    }

    fn call_closure(&mut self, closure: Arc<Closure>, args: Vec<Val>) -> Result<Val, ExecError> {
        if self.depth >= self.max_call_depth {
            return Err(Fault::CallDepthExceeded {
                limit: self.max_call_depth,
            }
            .into());
        }

        self.depth += 1;
        let scope = self.scopes.push(closure.scope);
        let mut args = args.into_iter();
        for param in &closure.def.params {
            let value = args.next().unwrap_or(Val::Undefined);
            self.scopes.declare(scope, param, value, false);
        }
        let result = statements::exec_body(self, &closure.def.body, scope);
        self.scopes.release(scope);
        self.depth -= 1;

        match result {
            Ok(()) => Ok(Val::Undefined),
            Err(Control::Return(v)) => Ok(v),
            Err(Control::Throw(v)) => Err(ExecError::Throw(v)),
            Err(Control::Fault(f)) => Err(ExecError::Fault(f)),
            Err(Control::Break) | Err(Control::Continue) => {
                Err(errors::syntax_error("Illegal break or continue statement"))
            }
        }
    }

    fn call_native(&mut self, id: NativeId, args: Vec<Val>) -> Result<Val, ExecError> {
        match self.natives.get(id.0) {
            Some(Native::Stdlib(func)) => {
                let func = *func;
                stdlib::call_stdlib_func(func, self, &mut Val::Undefined, args)
            }
            Some(Native::Host { func, .. }) => {
                let func = func.clone();
                func(self, args)
            }
            None => Err(Fault::DanglingHandle {
                kind: "native",
                id: id.0 as u64,
            }
            .into()),
        }
    }

    /* ===================== Promises ===================== */

    pub fn create_promise(&mut self) -> PromiseId {
        self.promises.create()
    }

    pub fn promise_state(&self, id: PromiseId) -> Option<PromiseState> {
        self.promises.state(id).cloned()
    }

    pub fn resolve_promise(&mut self, id: PromiseId, value: Val) -> Result<(), Fault> {
        self.settle_promise(id, Settlement::Fulfilled(value))
    }

    pub fn reject_promise(&mut self, id: PromiseId, reason: Val) -> Result<(), Fault> {
        self.settle_promise(id, Settlement::Rejected(reason))
    }

    /// Settle a promise, queueing the jobs of its reactions
    ///
    /// Fulfilling with another promise adopts that promise's eventual state.
    pub fn settle_promise(&mut self, id: PromiseId, settlement: Settlement) -> Result<(), Fault> {
        if !self.promises.contains(id) {
            return Err(dangling_promise(id));
        }
        match settlement {
            Settlement::Fulfilled(Val::Promise(inner)) if inner == id => {
                let err = errors::ErrorInfo::new(
                    errors::TYPE_ERROR,
                    "Chaining cycle detected for promise",
                );
                self.settle_promise(id, Settlement::Rejected(Val::Error(err)))
            }
            Settlement::Fulfilled(Val::Promise(inner)) => self.subscribe(
                inner,
                Reaction {
                    on_fulfilled: None,
                    on_rejected: None,
                    derived: id,
                },
            ),
            settlement => {
                let jobs = self
                    .promises
                    .settle(id, settlement)
                    .ok_or_else(|| dangling_promise(id))?;
                self.jobs.extend(jobs);
                Ok(())
            }
        }
    }

    pub(crate) fn subscribe(&mut self, id: PromiseId, reaction: Reaction) -> Result<(), Fault> {
        match self.promises.subscribe(id, reaction) {
            Some(Some(job)) => {
                self.jobs.push_back(job);
                Ok(())
            }
            Some(None) => Ok(()),
            None => Err(dangling_promise(id)),
        }
    }

    /// Drain the reaction jobs queued so far
    pub fn take_jobs(&mut self) -> Vec<Job> {
        self.jobs.drain(..).collect()
    }

    /// Forget settled promises that nothing can reach any more
    ///
    /// Roots are the live scopes, the queued jobs and `held`, the promise
    /// handles kept outside the VM. Only call this between tasks: values in
    /// the middle of an evaluation are invisible to it. A collected handle
    /// that resurfaces later is a dangling-handle fault.
    pub fn collect_promises(&mut self, held: impl IntoIterator<Item = PromiseId>) -> usize {
        let mut roots: Vec<PromiseId> = held.into_iter().collect();
        for value in self.scopes.values() {
            value.collect_promise_ids(&mut roots);
        }
        for job in &self.jobs {
            job.collect_promise_ids(&mut roots);
        }
        self.promises.sweep(roots)
    }

    /// Number of entries in the promise table
    pub fn promise_count(&self) -> usize {
        self.promises.len()
    }

    /// Run one reaction job
    ///
    /// A handler's exception rejects the derived promise; only faults are
    /// returned as errors.
    pub fn run_job(&mut self, job: Job) -> Result<(), ExecError> {
        let Job {
            reaction,
            settlement,
        } = job;
        let handler = match &settlement {
            Settlement::Fulfilled(_) => reaction.on_fulfilled,
            Settlement::Rejected(_) => reaction.on_rejected,
        };
        let next = match handler {
            None => settlement,
            Some(handler) => match self.call(&handler, vec![settlement.value().clone()]) {
                Ok(v) => Settlement::Fulfilled(v),
                Err(ExecError::Throw(e)) => Settlement::Rejected(e),
                Err(fault) => return Err(fault),
            },
        };
        self.settle_promise(reaction.derived, next)?;
        Ok(())
    }

    /// Run queued jobs (and the jobs they queue) until none are left
    pub fn run_jobs(&mut self) -> Result<(), ExecError> {
        while let Some(job) = self.jobs.pop_front() {
            self.run_job(job)?;
        }
        Ok(())
    }

    /// Rejected promises that nobody handled since the last call
    pub fn take_unhandled_rejections(&mut self) -> Vec<(PromiseId, Val)> {
        self.promises.take_unhandled()
    }
}

fn dangling_promise(id: PromiseId) -> Fault {
    Fault::DanglingHandle {
        kind: "promise",
        id: id.0,
    }
}
