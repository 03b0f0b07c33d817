//! Host bindings
//!
//! The fixed set of host capabilities a cell can expose to scripts. Each
//! binding installs globals into a VM before the loop starts and gets the
//! loop handle explicitly, so nothing reaches back into the cell.

pub mod console;
pub mod fetch;
pub mod timers;


use std::fmt;
use std::sync::Arc;

use crate::config::FetchConfig;
use crate::event_loop::LoopHandle;
use crate::interpreter::{DefineError, Vm};
pub use fetch::{FetchError, FetchRequest, FetchResponse, Fetcher, UreqFetcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    /// setTimeout, setInterval, clearTimeout, clearInterval
    Timers,
    /// fetch
    Fetch,
    /// console.log / info / warn / error
    Console,
}

impl Binding {
    pub const ALL: [Binding; 3] = [Binding::Timers, Binding::Fetch, Binding::Console];

    pub fn name(self) -> &'static str {
        match self {
            Binding::Timers => "timers",
            Binding::Fetch => "fetch",
            Binding::Console => "console",
        }
    }

    /// Install this binding's globals into `vm`
    pub fn install(
        self,
        vm: &mut Vm,
        handle: &LoopHandle,
        ctx: &BindingContext,
    ) -> Result<(), RegistrationError> {
        let result = match self {
            Binding::Timers => timers::install(vm, handle),
            Binding::Fetch => fetch::install(vm, handle, ctx.fetcher.clone()),
            Binding::Console => console::install(vm),
        };
        result.map_err(|source| RegistrationError {
            binding: self,
            source,
        })
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("failed to install {binding} binding: {source}")]
pub struct RegistrationError {
    pub binding: Binding,
    #[source]
    pub source: DefineError,
}

/// Collaborators the bindings need
#[derive(Clone)]
pub struct BindingContext {
    pub fetcher: Arc<dyn Fetcher>,
}

impl BindingContext {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Context backed by a real HTTP client
    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(Arc::new(UreqFetcher::new(config)))
    }
}

impl fmt::Debug for BindingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingContext").finish_non_exhaustive()
    }
}
