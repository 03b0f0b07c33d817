pub mod bindings;
pub mod cell;
pub mod cli;
pub mod config;
pub mod event_loop;
pub mod interpreter;
pub mod jail;

// Re-export main types
pub use bindings::{Binding, FetchRequest, FetchResponse, Fetcher};
pub use cell::{Cell, CellBuilder, CellError, CellState};
pub use config::Config;
pub use event_loop::{CallError, Callee, LoopError};
pub use interpreter::{Val, Vm};
pub use jail::{Jail, JailError};
