//! Cell
//!
//! A cell is one VM plus the event loop that owns it, running on a
//! dedicated thread. Everything that touches the VM after construction goes
//! through the loop as a task, so at most one thread ever drives it.
//!
//! Lifecycle: Created → Running → Stopping → Stopped, or Abandoned when the
//! loop thread does not finish within the stop timeout. A running task is
//! never interrupted, so an abandoned loop thread keeps going until its task
//! returns.

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bindings::{Binding, BindingContext, Fetcher, RegistrationError};
use crate::config::Config;
use crate::event_loop::{CallError, Callee, Loop, LoopError, LoopHandle, Task};
use crate::interpreter::{Val, Vm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Created,
    Running,
    Stopping,
    Stopped,
    Abandoned,
}

#[derive(Debug, thiserror::Error)]
pub enum CellError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error("stopping the cell timed out after {0:?}")]
    StopTimeout(Duration),

    #[error(transparent)]
    Loop(#[from] LoopError),

    #[error("failed to spawn cell thread: {0}")]
    Spawn(#[source] std::io::Error),
}

type Setup = Box<dyn FnOnce(&mut Vm) + Send>;

/* ===================== Builder ===================== */

pub struct CellBuilder {
    id: String,
    config: Config,
    bindings: Vec<Binding>,
    fetcher: Option<Arc<dyn Fetcher>>,
    setup: Vec<Setup>,
}

impl CellBuilder {
    pub fn config(mut self, config: &Config) -> Self {
        self.config = config.clone();
        self
    }

    /// Replace the installed bindings (all of them by default)
    pub fn bindings(mut self, bindings: impl IntoIterator<Item = Binding>) -> Self {
        self.bindings = bindings.into_iter().collect();
        self
    }

    /// Use a custom fetcher instead of the HTTP client
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Prepare the VM before it moves to the loop thread
    ///
    /// Runs before the bindings are installed.
    pub fn setup(mut self, f: impl FnOnce(&mut Vm) + Send + 'static) -> Self {
        self.setup.push(Box::new(f));
        self
    }

    /// Install the bindings and start the loop thread
    ///
    /// Returns as soon as the thread is spawned.
    pub fn build(self) -> Result<Cell, CellError> {
        let CellBuilder {
            id,
            config,
            bindings,
            fetcher,
            setup,
        } = self;

        let mut lp = Loop::new(Vm::with_max_call_depth(config.cell.max_call_depth));
        let handle = lp.handle();
        for f in setup {
            f(lp.vm_mut());
        }

        let ctx = match fetcher {
            Some(fetcher) => BindingContext::new(fetcher),
            None => BindingContext::from_config(&config.fetch),
        };
        for binding in &bindings {
            binding.install(lp.vm_mut(), &handle, &ctx)?;
        }

        let cancel = CancellationToken::new();
        let stopped = CancellationToken::new();
        let terminal = Arc::new(OnceLock::new());
        let state = Arc::new(Mutex::new(CellState::Created));

        let thread_body = {
            let id = id.clone();
            let cancel = cancel.clone();
            let stopped = stopped.clone();
            let terminal = terminal.clone();
            let state = state.clone();
            move || {
                // trips `stopped` on the way out, panic or not
                let _done = stopped.drop_guard();
                match lp.run_blocking(cancel) {
                    Ok(()) | Err(LoopError::Cancelled) => info!("Cell {} stopped", id),
                    Err(e) => {
                        error!("Cell {} loop failed: {}", id, e);
                        let _ = terminal.set(e);
                    }
                }
                *lock(&state) = CellState::Stopped;
            }
        };

        thread::Builder::new()
            .name(format!("jail-cell-{}", id))
            .stack_size(config.cell.thread_stack_size)
            .spawn(thread_body)
            .map_err(CellError::Spawn)?;

        {
            let mut state = lock(&state);
            if *state == CellState::Created {
                *state = CellState::Running;
            }
        }
        info!("Cell {} started", id);

        Ok(Cell {
            id,
            handle,
            cancel,
            stopped,
            terminal,
            state,
            stop_timeout: config.cell.stop_timeout(),
        })
    }
}

/* ===================== Cell ===================== */

pub struct Cell {
    id: String,
    handle: LoopHandle,
    cancel: CancellationToken,
    stopped: CancellationToken,
    terminal: Arc<OnceLock<LoopError>>,
    state: Arc<Mutex<CellState>>,
    stop_timeout: Duration,
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

fn lock(state: &Mutex<CellState>) -> MutexGuard<'_, CellState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Cell {
    /// A cell with every binding and the default configuration
    pub fn new(id: impl Into<String>) -> Result<Cell, CellError> {
        Self::builder(id).build()
    }

    pub fn builder(id: impl Into<String>) -> CellBuilder {
        CellBuilder {
            id: id.into(),
            config: Config::default(),
            bindings: Binding::ALL.to_vec(),
            fetcher: None,
            setup: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> CellState {
        *lock(&self.state)
    }

    /// Cancel the loop and wait, up to the stop timeout, for it to exit
    ///
    /// Pure cancellation is `Ok`; a loop that had already failed reports its
    /// error. Calling again waits again, or returns at once if the loop is
    /// already gone.
    pub async fn stop(&self) -> Result<(), CellError> {
        self.cancel.cancel();
        {
            let mut state = lock(&self.state);
            if matches!(*state, CellState::Created | CellState::Running) {
                *state = CellState::Stopping;
            }
        }

        match tokio::time::timeout(self.stop_timeout, self.stopped.cancelled()).await {
            Ok(()) => match self.terminal.get() {
                Some(e) => Err(CellError::Loop(e.clone())),
                None => Ok(()),
            },
            Err(_) => {
                warn!(
                    "Cell {} did not stop within {:?}; abandoning its loop thread",
                    self.id, self.stop_timeout
                );
                let mut state = lock(&self.state);
                if *state != CellState::Stopped {
                    *state = CellState::Abandoned;
                }
                Err(CellError::StopTimeout(self.stop_timeout))
            }
        }
    }

    /// Queue a call and make it runnable now, then wait for its result
    pub async fn call_async(
        &self,
        callee: impl Into<Callee>,
        args: Vec<Val>,
    ) -> Result<Val, CallError> {
        let id = self.handle.add(Task::call(callee, args));
        self.handle.ready(id).wait().await
    }

    /// `call_async` for threads outside any async runtime
    pub fn call_blocking(
        &self,
        callee: impl Into<Callee>,
        args: Vec<Val>,
    ) -> Result<Val, CallError> {
        let id = self.handle.add(Task::call(callee, args));
        self.handle.ready(id).wait_blocking()
    }

    /// Evaluate source in the global scope; yields the last expression value
    pub async fn run_script(&self, source: impl Into<String>) -> Result<Val, CallError> {
        self.handle.submit(Task::eval(source)).wait().await
    }

    /// Read a global; missing globals read as undefined
    pub async fn get(&self, name: &str) -> Result<Val, CallError> {
        self.handle.submit(Task::get_global(name)).wait().await
    }

    pub async fn set(&self, name: &str, value: Val) -> Result<(), CallError> {
        self.handle
            .submit(Task::set_global(name, value))
            .wait()
            .await
            .map(|_| ())
    }
}

impl Drop for Cell {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
