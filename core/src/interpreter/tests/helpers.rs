//! Test helpers for interpreter tests

use crate::interpreter::errors::ErrorInfo;
use crate::interpreter::{ExecError, Val, Vm};

/// Evaluate source in a fresh VM and drain promise jobs
pub fn eval(source: &str) -> Val {
    let mut vm = Vm::new();
    let result = vm.eval(source).expect("eval failed");
    vm.run_jobs().expect("jobs failed");
    result
}

/// Evaluate source, run jobs, then read a global
pub fn eval_global(source: &str, name: &str) -> Val {
    let mut vm = Vm::new();
    vm.eval(source).expect("eval failed");
    vm.run_jobs().expect("jobs failed");
    vm.global(name).unwrap_or(Val::Undefined)
}

pub fn eval_err(source: &str) -> ExecError {
    let mut vm = Vm::new();
    vm.eval(source).expect_err("expected eval to fail")
}

/// The error value thrown by `source`
pub fn thrown_error(source: &str) -> ErrorInfo {
    match eval_err(source) {
        ExecError::Throw(Val::Error(info)) => info,
        other => panic!("expected a thrown error value, got {:?}", other),
    }
}

pub fn num(n: f64) -> Val {
    Val::Num(n)
}

pub fn s(text: &str) -> Val {
    Val::Str(text.to_string())
}
