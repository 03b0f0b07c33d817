//! Standard library globals and methods

use super::helpers::{eval, num, s, thrown_error};
use crate::interpreter::Val;

#[test]
fn test_math() {
    assert_eq!(eval("Math.floor(2.7)"), num(2.0));
    assert_eq!(eval("Math.ceil(2.1)"), num(3.0));
    assert_eq!(eval("Math.abs(-3)"), num(3.0));
    assert_eq!(eval("Math.round(2.5)"), num(3.0));
    assert_eq!(eval("Math.round(-2.5)"), num(-2.0));
    assert_eq!(eval("Math.min(3, 1, 2)"), num(1.0));
    assert_eq!(eval("Math.max(3, 1, 2)"), num(3.0));
    assert_eq!(eval("Math.pow(2, 10)"), num(1024.0));
    assert_eq!(eval("Math.sqrt(16)"), num(4.0));
}

#[test]
fn test_json_stringify() {
    assert_eq!(
        eval("JSON.stringify({ b: 1, a: [true, null], skip: undefined })"),
        s(r#"{"a":[true,null],"b":1}"#)
    );
    assert_eq!(eval("JSON.stringify('x')"), s("\"x\""));
    assert_eq!(eval("JSON.stringify(undefined)"), Val::Undefined);
    assert_eq!(eval("JSON.stringify([1], null, 2)"), s("[\n  1\n]"));
}

#[test]
fn test_json_parse() {
    assert_eq!(eval(r#"JSON.parse('{"x": [1, 2]}').x[1]"#), num(2.0));
    assert_eq!(thrown_error("JSON.parse('{bad')").name, "SyntaxError");
}

#[test]
fn test_list_methods() {
    assert_eq!(
        eval("[1, 2].concat([3], 4)"),
        Val::List(vec![num(1.0), num(2.0), num(3.0), num(4.0)])
    );
    assert_eq!(eval("[1, null, 'x'].join('-')"), s("1--x"));
    assert_eq!(eval("['a', 'b'].indexOf('b')"), num(1.0));
    assert_eq!(eval("['a', 'b'].indexOf('z')"), num(-1.0));
    assert_eq!(
        eval("let l = [1, 2, 3]; let last = l.pop(); [last, l.length]"),
        Val::List(vec![num(3.0), num(2.0)])
    );
}

#[test]
fn test_push_through_nested_path() {
    assert_eq!(
        eval("let o = { items: [] }; o.items.push('a'); o.items.push('b'); o.items.join('')"),
        s("ab")
    );
}

#[test]
fn test_string_methods() {
    assert_eq!(eval("'Hello'.toUpperCase()"), s("HELLO"));
    assert_eq!(eval("'Hello'.toLowerCase()"), s("hello"));
    assert_eq!(eval("'héllo wörld'.indexOf('w')"), num(6.0));
}

#[test]
fn test_date_now() {
    assert_eq!(eval("typeof Date.now()"), s("number"));
    assert_eq!(eval("Date.now() > 1600000000000"), Val::Bool(true));
}

#[test]
fn test_error_values() {
    assert_eq!(eval("Error('m').message"), s("m"));
    assert_eq!(eval("Error('m').name"), s("Error"));
    assert_eq!(eval("typeof Error('m')"), s("object"));
}
