//! Embedded script interpreter
//!
//! A small JavaScript-flavoured language: the parser builds an AST with
//! pest, and `Vm` walks it. The VM is deliberately single-threaded and
//! unsynchronized; `event_loop` is what makes it safe to share.

pub mod convert;
pub mod errors;
pub mod expressions;
pub mod parser;
pub mod promise;
pub mod scope;
pub mod statements;
pub mod stdlib;
pub mod types;
pub mod vm;

#[cfg(test)]
mod tests;

pub use convert::{json_to_val, val_to_json};
pub use errors::ErrorInfo;
pub use parser::{parse_program, ParseError};
pub use promise::{Job, PromiseState, Settlement};
pub use types::{ExecError, Fault, PromiseId, Val};
pub use vm::{DefineError, NativeFn, Vm, DEFAULT_MAX_CALL_DEPTH};
