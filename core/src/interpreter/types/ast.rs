//! Abstract Syntax Tree node types

use std::sync::Arc;

/// Variable declaration kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Let,
    Const,
    Var,
}

/// Member access segment for assignment paths
#[derive(Debug, Clone)]
pub enum MemberAccess {
    Prop { property: String },
    Index { expr: Expr },
}

/// Assignment operator (`=`, `+=`, `-=`, `*=`, `/=`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

impl AssignOp {
    /// Operator a compound assignment applies; `None` for plain `=`
    pub fn binary_op(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Set => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
        }
    }
}

/// A function literal: declaration, expression or arrow function
///
/// Shared behind an `Arc` so closures created from the same literal don't
/// copy the body.
#[derive(Debug, Clone)]
pub struct FuncDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

/// Statement AST node
#[derive(Debug, Clone)]
pub enum Stmt {
    Block {
        body: Vec<Stmt>,
    },
    Declare {
        var_kind: VarKind,
        name: String,
        init: Option<Expr>,
    },
    Assign {
        var: String,
        path: Vec<MemberAccess>,
        op: AssignOp,
        value: Expr,
    },
    /// Function declaration; hoisted to the top of its enclosing block
    Function {
        def: Arc<FuncDef>,
    },
    If {
        test: Expr,
        then_s: Box<Stmt>,
        else_s: Option<Box<Stmt>>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Box<Stmt>>,
        body: Box<Stmt>,
    },
    Return {
        value: Option<Expr>,
    },
    Throw {
        value: Expr,
    },
    Try {
        body: Box<Stmt>,
        catch_var: Option<String>,
        catch_body: Option<Box<Stmt>>,
        finally_body: Option<Box<Stmt>>,
    },
    Break,
    Continue,
    Empty,
    Expr {
        expr: Expr,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Expression AST node
#[derive(Debug, Clone)]
pub enum Expr {
    LitUndefined,
    LitNull,
    LitBool {
        v: bool,
    },
    LitNum {
        v: f64,
    },
    LitStr {
        v: String,
    },
    Array {
        elements: Vec<Expr>,
    },
    Object {
        properties: Vec<(String, Expr)>,
    },
    Ident {
        name: String,
    },
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Function {
        def: Arc<FuncDef>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
}
