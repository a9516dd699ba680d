//! Shared helpers for integration tests: fixture paths, a CLI runner and a
//! tiny evaluator for the scripts the fixtures compile to.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::Output;

use blockphase::error::EvalError;
use blockphase::evaluator::GameState;
use serde_json::{Value, json};

/// Absolute path of a file under `tests/fixtures`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Runs the `blockphase` binary to completion.
pub fn run_cli(args: &[&str]) -> Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_blockphase"))
        .args(args)
        .env_remove("BLOCKPHASE_LOG_LEVEL")
        .output()
        .expect("failed to run blockphase")
}

/// Evaluates the small subset of script the fixtures produce, one statement
/// per line:
///
/// - `return <expr>`
/// - `<variable> = <expr>`
/// - `<action>(<expr>, ..)`, appended to the `calls` list in the state
///
/// Expressions are integers, `true`/`false`, variables and fully
/// parenthesized binary operations.
pub fn toy_evaluator(source: &str, state: &mut GameState) -> Result<Value, EvalError> {
    let mut result = Value::Null;
    for line in source.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(expr) = line.strip_prefix("return ") {
            return eval_expr(expr, state);
        }
        if let Some((target, expr)) = line.split_once(" = ") {
            let value = eval_expr(expr, state)?;
            state.set(target, value.clone());
            result = value;
            continue;
        }
        if let Some((action, rest)) = line.split_once('(') {
            let args = rest
                .strip_suffix(')')
                .ok_or_else(|| EvalError::new(format!("cannot parse: {line}")))?;
            let args = args
                .split(", ")
                .filter(|a| !a.is_empty())
                .map(|a| eval_expr(a, state))
                .collect::<Result<Vec<_>, _>>()?;
            let mut calls = state.get("calls").cloned().unwrap_or_else(|| json!([]));
            if let Some(list) = calls.as_array_mut() {
                list.push(json!({ "action": action, "args": args }));
            }
            state.set("calls", calls);
            continue;
        }
        return Err(EvalError::new(format!("cannot parse: {line}")));
    }
    Ok(result)
}

fn eval_expr(expr: &str, state: &GameState) -> Result<Value, EvalError> {
    let tokens = tokenize(expr);
    let (value, rest) = parse(&tokens, state)?;
    if rest.is_empty() {
        Ok(value)
    } else {
        Err(EvalError::new(format!("trailing input in: {expr}")))
    }
}

fn tokenize(expr: &str) -> Vec<String> {
    expr.replace('(', " ( ")
        .replace(')', " ) ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn parse<'t>(tokens: &'t [String], state: &GameState) -> Result<(Value, &'t [String]), EvalError> {
    let Some((first, rest)) = tokens.split_first() else {
        return Err(EvalError::new("unexpected end of expression"));
    };
    match first.as_str() {
        "(" => {
            let (lhs, rest) = parse(rest, state)?;
            let Some((op, rest)) = rest.split_first() else {
                return Err(EvalError::new("missing operator"));
            };
            let (rhs, rest) = parse(rest, state)?;
            let Some((close, rest)) = rest.split_first() else {
                return Err(EvalError::new("missing ')'"));
            };
            if close != ")" {
                return Err(EvalError::new(format!("expected ')', got {close}")));
            }
            Ok((apply(op, &lhs, &rhs)?, rest))
        }
        "true" => Ok((json!(true), rest)),
        "false" => Ok((json!(false), rest)),
        token => {
            if let Ok(n) = token.parse::<i64>() {
                return Ok((json!(n), rest));
            }
            let value = state
                .get(token)
                .cloned()
                .ok_or_else(|| EvalError::new(format!("no such property: {token}")))?;
            Ok((value, rest))
        }
    }
}

fn apply(op: &str, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    let (Some(a), Some(b)) = (lhs.as_i64(), rhs.as_i64()) else {
        return Err(EvalError::new(format!("non-integer operands for {op}")));
    };
    Ok(match op {
        "+" => json!(a + b),
        "-" => json!(a - b),
        "*" => json!(a * b),
        ">" => json!(a > b),
        ">=" => json!(a >= b),
        "<" => json!(a < b),
        "<=" => json!(a <= b),
        "==" => json!(a == b),
        "!=" => json!(a != b),
        _ => return Err(EvalError::new(format!("unsupported operator {op}"))),
    })
}
