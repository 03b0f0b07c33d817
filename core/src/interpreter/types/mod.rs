//! Type definitions for the interpreter
//!
//! - AST nodes (Stmt, Expr)
//! - Runtime values (Val)
//! - Control flow (Control, Fault, ExecError)

pub mod ast;
pub mod control;
pub mod values;

pub use ast::{AssignOp, BinaryOp, Expr, FuncDef, LogicalOp, MemberAccess, Stmt, UnaryOp, VarKind};
pub use control::{Control, Exec, ExecError, Fault};
pub use values::{format_number, Closure, NativeId, PromiseId, Val, MAX_VALUE_DEPTH};
