//! Statement execution

use super::errors;
use super::expressions::{
    binary_op, eval_expr, eval_segments, make_closure, read_place, write_place, Segment,
};
use super::scope::ScopeId;
use super::types::{
    AssignOp, Control, Exec, ExecError, Expr, MemberAccess, Stmt, Val, VarKind,
};
use super::vm::Vm;

/* ===================== Entry Points ===================== */

/// Execute a whole program in the global scope
pub fn exec_program(vm: &mut Vm, program: &[Stmt]) -> Result<Val, ExecError> {
    match run_program(vm, program) {
        Ok(v) | Err(Control::Return(v)) => Ok(v),
        Err(Control::Throw(v)) => Err(ExecError::Throw(v)),
        Err(Control::Fault(f)) => Err(ExecError::Fault(f)),
        Err(Control::Break) | Err(Control::Continue) => {
            Err(errors::syntax_error("Illegal break or continue statement"))
        }
    }
}

fn run_program(vm: &mut Vm, program: &[Stmt]) -> Exec<Val> {
    hoist(vm, program, ScopeId::GLOBAL);
    let mut last = Val::Undefined;
    for stmt in program {
        match stmt {
            Stmt::Expr { expr } => last = eval_expr(vm, expr, ScopeId::GLOBAL)?,
            other => exec_stmt(vm, other, ScopeId::GLOBAL)?,
        }
    }
    Ok(last)
}

/// Execute a function body directly in `scope`
pub fn exec_body(vm: &mut Vm, body: &[Stmt], scope: ScopeId) -> Exec<()> {
    hoist(vm, body, scope);
    for stmt in body {
        exec_stmt(vm, stmt, scope)?;
    }
    Ok(())
}

/// Function declarations are visible from the top of their block
fn hoist(vm: &mut Vm, body: &[Stmt], scope: ScopeId) {
    for stmt in body {
        if let Stmt::Function { def } = stmt {
            if let Some(name) = &def.name {
                let closure = make_closure(vm, def, scope);
                vm.scopes.declare(scope, name, closure, false);
            }
        }
    }
}

fn exec_block(vm: &mut Vm, body: &[Stmt], parent: ScopeId) -> Exec<()> {
    let scope = vm.scopes.push(parent);
    let result = exec_body(vm, body, scope);
    vm.scopes.release(scope);
    result
}

/* ===================== Statements ===================== */

pub fn exec_stmt(vm: &mut Vm, stmt: &Stmt, scope: ScopeId) -> Exec<()> {
    match stmt {
        Stmt::Block { body } => exec_block(vm, body, scope),

        Stmt::Declare {
            var_kind,
            name,
            init,
        } => {
            let value = match init {
                Some(expr) => eval_expr(vm, expr, scope)?,
                None => Val::Undefined,
            };
            vm.scopes
                .declare(scope, name, value, *var_kind == VarKind::Const);
            Ok(())
        }

        Stmt::Assign {
            var,
            path,
            op,
            value,
        } => exec_assign(vm, scope, var, path, *op, value),

        // Hoisted when the enclosing block was entered
        Stmt::Function { .. } => Ok(()),

        Stmt::If {
            test,
            then_s,
            else_s,
        } => {
            if eval_expr(vm, test, scope)?.is_truthy() {
                exec_stmt(vm, then_s, scope)
            } else if let Some(else_s) = else_s {
                exec_stmt(vm, else_s, scope)
            } else {
                Ok(())
            }
        }

        Stmt::While { test, body } => {
            while eval_expr(vm, test, scope)?.is_truthy() {
                match exec_stmt(vm, body, scope) {
                    Ok(()) | Err(Control::Continue) => {}
                    Err(Control::Break) => break,
                    Err(other) => return Err(other),
                }
            }
            Ok(())
        }

        Stmt::For {
            init,
            test,
            update,
            body,
        } => {
            let loop_scope = vm.scopes.push(scope);
            let result = exec_for(vm, loop_scope, init.as_deref(), test.as_ref(), update.as_deref(), body);
            vm.scopes.release(loop_scope);
            result
        }

        Stmt::Return { value } => {
            let v = match value {
                Some(expr) => eval_expr(vm, expr, scope)?,
                None => Val::Undefined,
            };
            Err(Control::Return(v))
        }

        Stmt::Throw { value } => {
            let v = eval_expr(vm, value, scope)?;
            Err(Control::Throw(v))
        }

        Stmt::Try {
            body,
            catch_var,
            catch_body,
            finally_body,
        } => exec_try(
            vm,
            scope,
            body,
            catch_var.as_deref(),
            catch_body.as_deref(),
            finally_body.as_deref(),
        ),

        Stmt::Break => Err(Control::Break),
        Stmt::Continue => Err(Control::Continue),
        Stmt::Empty => Ok(()),

        Stmt::Expr { expr } => {
            eval_expr(vm, expr, scope)?;
            Ok(())
        }
    }
}

fn exec_for(
    vm: &mut Vm,
    scope: ScopeId,
    init: Option<&Stmt>,
    test: Option<&Expr>,
    update: Option<&Stmt>,
    body: &Stmt,
) -> Exec<()> {
    if let Some(init) = init {
        exec_stmt(vm, init, scope)?;
    }
    loop {
        if let Some(test) = test {
            if !eval_expr(vm, test, scope)?.is_truthy() {
                break;
            }
        }
        match exec_stmt(vm, body, scope) {
            Ok(()) | Err(Control::Continue) => {}
            Err(Control::Break) => break,
            Err(other) => return Err(other),
        }
        if let Some(update) = update {
            exec_stmt(vm, update, scope)?;
        }
    }
    Ok(())
}

fn exec_try(
    vm: &mut Vm,
    scope: ScopeId,
    body: &Stmt,
    catch_var: Option<&str>,
    catch_body: Option<&Stmt>,
    finally_body: Option<&Stmt>,
) -> Exec<()> {
    let result = match (exec_stmt(vm, body, scope), catch_body) {
        (Err(Control::Throw(err)), Some(catch_body)) => {
            let catch_scope = vm.scopes.push(scope);
            if let Some(var) = catch_var {
                vm.scopes.declare(catch_scope, var, err, false);
            }
            let r = exec_stmt(vm, catch_body, catch_scope);
            vm.scopes.release(catch_scope);
            r
        }
        (other, _) => other,
    };

    // Faults unwind straight through finally blocks
    if matches!(result, Err(Control::Fault(_))) {
        return result;
    }
    if let Some(finally_body) = finally_body {
        exec_stmt(vm, finally_body, scope)?;
    }
    result
}

/* ===================== Assignment ===================== */

fn exec_assign(
    vm: &mut Vm,
    scope: ScopeId,
    var: &str,
    path: &[MemberAccess],
    op: AssignOp,
    value: &Expr,
) -> Exec<()> {
    let segments: Vec<Segment<'_>> = path
        .iter()
        .map(|access| match access {
            MemberAccess::Prop { property } => Segment::Prop(property),
            MemberAccess::Index { expr } => Segment::Index(expr),
        })
        .collect();
    let keys = eval_segments(vm, &segments, scope)?;
    let rhs = eval_expr(vm, value, scope)?;

    let value = match op.binary_op() {
        None => rhs,
        Some(bin) => {
            let current = read_place(vm, scope, var, &keys)?;
            binary_op(bin, &current, &rhs)?
        }
    };

    write_place(vm, scope, var, &keys, value)
}
