//! PEST-based parser for scripts
//!
//! Produces the statement list executed by the VM. Keyword tokens are
//! atomic rules so `if`/`iffy` tokenize correctly; they carry no information
//! and are dropped while building the AST.

use pest::Parser;
use pest_derive::Parser;
use std::sync::Arc;

use super::types::{
    AssignOp, BinaryOp, Expr, FuncDef, LogicalOp, MemberAccess, Stmt, UnaryOp, VarKind,
};

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "interpreter/script.pest"]
struct ScriptParser;

type Pair<'i> = pest::iterators::Pair<'i, Rule>;

/* ===================== Error Types ===================== */

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("{0}")]
    Syntax(String),

    #[error("{0}")]
    Build(String),
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        ParseError::Syntax(err.to_string())
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Public API ===================== */

/// Parse a source string into a list of top-level statements
pub fn parse_program(source: &str) -> ParseResult<Vec<Stmt>> {
    let mut pairs = ScriptParser::parse(Rule::program, source)?;
    let program = expect(&mut pairs, "program")?;
    program
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(build_statement)
        .collect()
}

/* ===================== Pair Helpers ===================== */

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_function
            | Rule::kw_return
            | Rule::kw_if
            | Rule::kw_else
            | Rule::kw_while
            | Rule::kw_for
            | Rule::kw_break
            | Rule::kw_continue
            | Rule::kw_throw
            | Rule::kw_try
            | Rule::kw_catch
            | Rule::kw_finally
    )
}

/// Inner pairs without keyword tokens
fn children(pair: Pair<'_>) -> impl Iterator<Item = Pair<'_>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn expect<'i>(pairs: &mut impl Iterator<Item = Pair<'i>>, what: &str) -> ParseResult<Pair<'i>> {
    pairs
        .next()
        .ok_or_else(|| ParseError::Build(format!("expected {}", what)))
}

fn unexpected<T>(pair: &Pair<'_>) -> ParseResult<T> {
    let (line, col) = pair.as_span().start_pos().line_col();
    Err(ParseError::Build(format!(
        "unexpected {:?} at {}:{}",
        pair.as_rule(),
        line,
        col
    )))
}

/* ===================== Statements ===================== */

fn build_statement(pair: Pair<'_>) -> ParseResult<Stmt> {
    match pair.as_rule() {
        Rule::block => Ok(Stmt::Block {
            body: build_block(pair)?,
        }),
        Rule::function_decl => Ok(Stmt::Function {
            def: build_function(pair)?,
        }),
        Rule::var_decl => build_declare(pair),
        Rule::if_stmt => build_if(pair),
        Rule::while_stmt => {
            let mut inner = children(pair);
            let test = build_expression(expect(&mut inner, "condition")?)?;
            let body = build_statement(expect(&mut inner, "loop body")?)?;
            Ok(Stmt::While {
                test,
                body: Box::new(body),
            })
        }
        Rule::for_stmt => build_for(pair),
        Rule::return_stmt => {
            let value = children(pair).next().map(build_expression).transpose()?;
            Ok(Stmt::Return { value })
        }
        Rule::throw_stmt => {
            let value = build_expression(expect(&mut children(pair), "thrown value")?)?;
            Ok(Stmt::Throw { value })
        }
        Rule::try_stmt => build_try(pair),
        Rule::break_stmt => Ok(Stmt::Break),
        Rule::continue_stmt => Ok(Stmt::Continue),
        Rule::empty_stmt => Ok(Stmt::Empty),
        Rule::assign => build_assign(pair),
        Rule::expr_stmt => {
            let expr = build_expression(expect(&mut children(pair), "expression")?)?;
            Ok(Stmt::Expr { expr })
        }
        _ => unexpected(&pair),
    }
}

fn build_block(pair: Pair<'_>) -> ParseResult<Vec<Stmt>> {
    children(pair).map(build_statement).collect()
}

fn build_declare(pair: Pair<'_>) -> ParseResult<Stmt> {
    let mut inner = children(pair);
    let kind_pair = expect(&mut inner, "declaration kind")?;
    let var_kind = match kind_pair.as_str() {
        "let" => VarKind::Let,
        "const" => VarKind::Const,
        "var" => VarKind::Var,
        _ => return unexpected(&kind_pair),
    };
    let name = expect(&mut inner, "variable name")?.as_str().to_string();
    let init = inner.next().map(build_expression).transpose()?;

    if var_kind == VarKind::Const && init.is_none() {
        return Err(ParseError::Build(format!(
            "Missing initializer in const declaration '{}'",
            name
        )));
    }

    Ok(Stmt::Declare {
        var_kind,
        name,
        init,
    })
}

fn build_if(pair: Pair<'_>) -> ParseResult<Stmt> {
    let mut inner = children(pair);
    let test = build_expression(expect(&mut inner, "condition")?)?;
    let then_s = build_statement(expect(&mut inner, "if body")?)?;
    let else_s = match inner.next() {
        Some(p) => Some(Box::new(build_statement(p)?)),
        None => None,
    };
    Ok(Stmt::If {
        test,
        then_s: Box::new(then_s),
        else_s,
    })
}

fn build_for(pair: Pair<'_>) -> ParseResult<Stmt> {
    let mut inner = children(pair);
    let init = build_for_clause(expect(&mut inner, "for initializer")?)?;
    let test = expect(&mut inner, "for condition")?
        .into_inner()
        .next()
        .map(build_expression)
        .transpose()?;
    let update = build_for_clause(expect(&mut inner, "for update")?)?;
    let body = build_statement(expect(&mut inner, "for body")?)?;

    Ok(Stmt::For {
        init: init.map(Box::new),
        test,
        update: update.map(Box::new),
        body: Box::new(body),
    })
}

/// `for (<init>; ...; <update>)` clause: declaration, assignment or expression
fn build_for_clause(pair: Pair<'_>) -> ParseResult<Option<Stmt>> {
    let Some(inner) = pair.into_inner().next() else {
        return Ok(None);
    };
    let stmt = match inner.as_rule() {
        Rule::var_decl => build_declare(inner)?,
        Rule::assign => build_assign(inner)?,
        _ => Stmt::Expr {
            expr: build_expression(inner)?,
        },
    };
    Ok(Some(stmt))
}

fn build_try(pair: Pair<'_>) -> ParseResult<Stmt> {
    let mut inner = children(pair);
    let body = Stmt::Block {
        body: build_block(expect(&mut inner, "try block")?)?,
    };

    let mut catch_var = None;
    let mut catch_body = None;
    let mut finally_body = None;
    for clause in inner {
        match clause.as_rule() {
            Rule::catch_clause => {
                for part in children(clause) {
                    match part.as_rule() {
                        Rule::identifier => catch_var = Some(part.as_str().to_string()),
                        Rule::block => {
                            catch_body = Some(Box::new(Stmt::Block {
                                body: build_block(part)?,
                            }))
                        }
                        _ => return unexpected(&part),
                    }
                }
            }
            Rule::finally_clause => {
                let block = expect(&mut children(clause), "finally block")?;
                finally_body = Some(Box::new(Stmt::Block {
                    body: build_block(block)?,
                }));
            }
            _ => return unexpected(&clause),
        }
    }

    Ok(Stmt::Try {
        body: Box::new(body),
        catch_var,
        catch_body,
        finally_body,
    })
}

fn build_assign(pair: Pair<'_>) -> ParseResult<Stmt> {
    let mut inner = children(pair);
    let var = expect(&mut inner, "assignment target")?.as_str().to_string();

    let mut path = Vec::new();
    let mut op = AssignOp::Set;
    let mut value = None;
    while let Some(part) = inner.next() {
        match part.as_rule() {
            Rule::dot_access | Rule::index_access => path.push(build_member_access(part)?),
            Rule::assign_op => {
                op = match part.as_str() {
                    "=" => AssignOp::Set,
                    "+=" => AssignOp::Add,
                    "-=" => AssignOp::Sub,
                    "*=" => AssignOp::Mul,
                    "/=" => AssignOp::Div,
                    _ => return unexpected(&part),
                };
                value = Some(build_expression(expect(&mut inner, "assigned value")?)?);
            }
            Rule::incr_op => {
                op = if part.as_str() == "++" {
                    AssignOp::Add
                } else {
                    AssignOp::Sub
                };
                value = Some(Expr::LitNum { v: 1.0 });
            }
            _ => return unexpected(&part),
        }
    }

    let value = value.ok_or_else(|| ParseError::Build(format!("missing value for '{}'", var)))?;
    Ok(Stmt::Assign {
        var,
        path,
        op,
        value,
    })
}

fn build_member_access(pair: Pair<'_>) -> ParseResult<MemberAccess> {
    let rule = pair.as_rule();
    let inner = expect(&mut pair.into_inner(), "member")?;
    match rule {
        Rule::dot_access => Ok(MemberAccess::Prop {
            property: inner.as_str().to_string(),
        }),
        _ => Ok(MemberAccess::Index {
            expr: build_expression(inner)?,
        }),
    }
}

/* ===================== Functions ===================== */

fn build_function(pair: Pair<'_>) -> ParseResult<Arc<FuncDef>> {
    let mut name = None;
    let mut params = Vec::new();
    let mut body = Vec::new();
    for part in children(pair) {
        match part.as_rule() {
            Rule::identifier => name = Some(part.as_str().to_string()),
            Rule::params => {
                params = part.into_inner().map(|p| p.as_str().to_string()).collect();
            }
            Rule::block => body = build_block(part)?,
            _ => return unexpected(&part),
        }
    }
    Ok(Arc::new(FuncDef { name, params, body }))
}

fn build_arrow(pair: Pair<'_>) -> ParseResult<Arc<FuncDef>> {
    let mut inner = children(pair);
    let params = expect(&mut inner, "arrow parameters")?
        .into_inner()
        .map(|p| p.as_str().to_string())
        .collect();
    let body_pair = expect(&mut inner, "arrow body")?;
    let body = match body_pair.as_rule() {
        Rule::block => build_block(body_pair)?,
        _ => vec![Stmt::Return {
            value: Some(build_expression(body_pair)?),
        }],
    };
    Ok(Arc::new(FuncDef {
        name: None,
        params,
        body,
    }))
}

/* ===================== Expressions ===================== */

fn build_expression(pair: Pair<'_>) -> ParseResult<Expr> {
    match pair.as_rule() {
        Rule::arrow_function => Ok(Expr::Function {
            def: build_arrow(pair)?,
        }),
        Rule::conditional => {
            let mut inner = children(pair);
            let test = build_expression(expect(&mut inner, "expression")?)?;
            match inner.next() {
                None => Ok(test),
                Some(consequent) => {
                    let consequent = build_expression(consequent)?;
                    let alternate = build_expression(expect(&mut inner, "':' branch")?)?;
                    Ok(Expr::Conditional {
                        test: Box::new(test),
                        consequent: Box::new(consequent),
                        alternate: Box::new(alternate),
                    })
                }
            }
        }
        Rule::logical_or | Rule::logical_and => build_logical(pair),
        Rule::equality | Rule::comparison | Rule::additive | Rule::multiplicative => {
            build_binary(pair)
        }
        Rule::unary => build_unary(pair),
        Rule::postfix => build_postfix(pair),

        Rule::number => {
            let v = pair
                .as_str()
                .parse::<f64>()
                .map_err(|e| ParseError::Build(format!("invalid number '{}': {}", pair.as_str(), e)))?;
            Ok(Expr::LitNum { v })
        }
        Rule::string => Ok(Expr::LitStr {
            v: build_string(pair)?,
        }),
        Rule::boolean => Ok(Expr::LitBool {
            v: pair.as_str() == "true",
        }),
        Rule::null_lit => Ok(Expr::LitNull),
        Rule::undefined_lit => Ok(Expr::LitUndefined),
        Rule::identifier => Ok(Expr::Ident {
            name: pair.as_str().to_string(),
        }),
        Rule::function_expr => Ok(Expr::Function {
            def: build_function(pair)?,
        }),
        Rule::array_lit => {
            let elements = children(pair)
                .map(build_expression)
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(Expr::Array { elements })
        }
        Rule::object_lit => {
            let mut properties = Vec::new();
            for prop in children(pair) {
                let mut inner = prop.into_inner();
                let key_pair = expect(&mut inner, "property key")?;
                let key = match key_pair.as_rule() {
                    Rule::string => build_string(key_pair)?,
                    _ => key_pair.as_str().to_string(),
                };
                let value = match inner.next() {
                    Some(value) => build_expression(value)?,
                    // Shorthand `{ name }`
                    None => Expr::Ident { name: key.clone() },
                };
                properties.push((key, value));
            }
            Ok(Expr::Object { properties })
        }
        _ => unexpected(&pair),
    }
}

fn build_logical(pair: Pair<'_>) -> ParseResult<Expr> {
    let mut inner = children(pair);
    let mut left = build_expression(expect(&mut inner, "operand")?)?;
    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_str() {
            "&&" => LogicalOp::And,
            "||" => LogicalOp::Or,
            _ => return unexpected(&op_pair),
        };
        let right = build_expression(expect(&mut inner, "right operand")?)?;
        left = Expr::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn build_binary(pair: Pair<'_>) -> ParseResult<Expr> {
    let mut inner = children(pair);
    let mut left = build_expression(expect(&mut inner, "operand")?)?;
    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_str() {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "===" => BinaryOp::StrictEq,
            "!==" => BinaryOp::StrictNe,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            _ => return unexpected(&op_pair),
        };
        let right = build_expression(expect(&mut inner, "right operand")?)?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn build_unary(pair: Pair<'_>) -> ParseResult<Expr> {
    let mut ops = Vec::new();
    let mut operand = None;
    for part in children(pair) {
        match part.as_rule() {
            Rule::op_unary => ops.push(match part.as_str() {
                "!" => UnaryOp::Not,
                "-" => UnaryOp::Neg,
                _ => UnaryOp::TypeOf,
            }),
            _ => operand = Some(build_expression(part)?),
        }
    }
    let mut expr = operand.ok_or_else(|| ParseError::Build("expected operand".to_string()))?;
    for op in ops.into_iter().rev() {
        expr = Expr::Unary {
            op,
            operand: Box::new(expr),
        };
    }
    Ok(expr)
}

fn build_postfix(pair: Pair<'_>) -> ParseResult<Expr> {
    let mut inner = children(pair);
    let mut expr = build_expression(expect(&mut inner, "primary expression")?)?;
    for suffix in inner {
        expr = match suffix.as_rule() {
            Rule::call_args => Expr::Call {
                callee: Box::new(expr),
                args: suffix
                    .into_inner()
                    .map(build_expression)
                    .collect::<ParseResult<Vec<_>>>()?,
            },
            Rule::dot_access => Expr::Member {
                object: Box::new(expr),
                property: expect(&mut suffix.into_inner(), "property name")?
                    .as_str()
                    .to_string(),
            },
            Rule::index_access => Expr::Index {
                object: Box::new(expr),
                index: Box::new(build_expression(expect(
                    &mut suffix.into_inner(),
                    "index expression",
                )?)?),
            },
            _ => return unexpected(&suffix),
        };
    }
    Ok(expr)
}

/* ===================== Strings ===================== */

fn build_string(pair: Pair<'_>) -> ParseResult<String> {
    let inner = expect(&mut pair.into_inner(), "string body")?;
    unescape(inner.as_str())
}

fn unescape(raw: &str) -> ParseResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| ParseError::Build(format!("invalid unicode escape '\\u{}'", hex)))?;
                out.push(code);
            }
            Some(other) => out.push(other),
            None => return Err(ParseError::Build("unterminated escape".to_string())),
        }
    }
    Ok(out)
}
