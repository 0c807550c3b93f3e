//! Expression evaluation
//!
//! Expressions are evaluated against a [`Bindings`] lookup and, inside
//! collection clauses, a current element whose members bare field names
//! resolve to.
//!
//! Conditions (`where`, `when`, `if`, match guards) use [`evaluate_condition`]:
//! `and` / `or` / `not` short-circuit, and any read of an undefined variable
//! makes the enclosing comparison "not satisfied" instead of failing.

use std::collections::{BTreeMap, HashMap};

use regex::{Regex, RegexBuilder};
use thiserror::Error;

use super::types::ast::{BinaryOp, Expr, UnaryOp};
use super::types::values::format_number;
use super::types::Value;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("'{0}' is not defined")]
    Undefined(String),

    #[error("cannot apply '{op}' to {left} and {right}")]
    Type {
        op: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid regex /{pattern}/: {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{function}() expects {expected}")]
    Argument {
        function: String,
        expected: &'static str,
    },
}

/// Variable lookup used while evaluating
pub trait Bindings {
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl Bindings for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Bindings for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/* ===================== Values ===================== */

/// Evaluate an expression to a value
pub fn evaluate(
    expr: &Expr,
    bindings: &dyn Bindings,
    element: Option<&Value>,
) -> Result<Value, EvalError> {
    match expr {
        Expr::Lit { v, .. } => Ok(Value::from(v)),
        Expr::Empty { .. } => Ok(Value::Null),
        Expr::Var { name, path, .. } => lookup_path(bindings, name, path),
        Expr::Field { name, .. } => {
            if let Some(found) = element.and_then(|e| e.get(name)) {
                return Ok(found.clone());
            }
            bindings
                .lookup(name)
                .ok_or_else(|| EvalError::Undefined(name.clone()))
        }
        Expr::Regex { pattern, .. } => Ok(Value::Str(pattern.clone())),
        Expr::List { elements, .. } => elements
            .iter()
            .map(|e| evaluate(e, bindings, element))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Expr::Object { properties, .. } => {
            let mut fields = BTreeMap::new();
            for (key, value) in properties {
                fields.insert(key.clone(), evaluate(value, bindings, element)?);
            }
            Ok(Value::Obj(fields))
        }
        Expr::Unary { op, operand, .. } => {
            let value = evaluate(operand, bindings, element)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                UnaryOp::Neg => match value {
                    Value::Num(n) => Ok(Value::Num(-n)),
                    other => Err(EvalError::Type {
                        op: "-".into(),
                        left: "nothing",
                        right: other.type_name(),
                    }),
                },
            }
        }
        Expr::Binary {
            op, left, right, ..
        } => binary(*op, left, right, bindings, element),
        Expr::Call { function, args, .. } => {
            let args = args
                .iter()
                .map(|a| evaluate(a, bindings, element))
                .collect::<Result<Vec<_>, _>>()?;
            call(function, args)
        }
    }
}

fn lookup_path(bindings: &dyn Bindings, name: &str, path: &[String]) -> Result<Value, EvalError> {
    let root = bindings
        .lookup(name)
        .ok_or_else(|| EvalError::Undefined(name.to_string()))?;
    if path.is_empty() {
        return Ok(root);
    }
    root.get_path(path)
        .cloned()
        .ok_or_else(|| EvalError::Undefined(format!("{}: {}", name, path.join("."))))
}

fn binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    bindings: &dyn Bindings,
    element: Option<&Value>,
) -> Result<Value, EvalError> {
    match op {
        BinaryOp::And => {
            let l = evaluate(left, bindings, element)?;
            if !l.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(evaluate(right, bindings, element)?.is_truthy()))
        }
        BinaryOp::Or => {
            let l = evaluate(left, bindings, element)?;
            if l.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(evaluate(right, bindings, element)?.is_truthy()))
        }
        BinaryOp::Eq | BinaryOp::NotEq if matches!(right, Expr::Empty { .. }) => {
            // An undefined value is empty
            let value = match evaluate(left, bindings, element) {
                Err(EvalError::Undefined(_)) => Value::Null,
                other => other?,
            };
            let empty = value.is_empty();
            Ok(Value::Bool(if op == BinaryOp::Eq { empty } else { !empty }))
        }
        BinaryOp::Matches => {
            let subject = evaluate(left, bindings, element)?;
            let regex = match right {
                Expr::Regex { pattern, flags, .. } => build_regex(pattern, flags)?,
                other => {
                    let pattern = evaluate(other, bindings, element)?.to_string();
                    build_regex(&pattern, "")?
                }
            };
            Ok(Value::Bool(regex.is_match(&subject.to_string())))
        }
        _ => {
            let l = evaluate(left, bindings, element)?;
            let r = evaluate(right, bindings, element)?;
            apply(op, l, r)
        }
    }
}

/// Apply a non short-circuiting operator to two values
pub fn apply(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    use std::cmp::Ordering;

    let type_error = |l: &Value, r: &Value| EvalError::Type {
        op: op.as_str().to_string(),
        left: l.type_name(),
        right: r.type_name(),
    };
    let ordered = |accept: fn(Ordering) -> bool| {
        Value::Bool(left.compare(&right).map(accept).unwrap_or(false))
    };

    match op {
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::NotEq => Ok(Value::Bool(left != right)),
        BinaryOp::Lt => Ok(ordered(|o| o == Ordering::Less)),
        BinaryOp::Le => Ok(ordered(|o| o != Ordering::Greater)),
        BinaryOp::Gt => Ok(ordered(|o| o == Ordering::Greater)),
        BinaryOp::Ge => Ok(ordered(|o| o != Ordering::Less)),
        BinaryOp::Contains => Ok(Value::Bool(match (&left, &right) {
            (Value::Str(haystack), needle) => haystack.contains(&needle.to_string()),
            (Value::List(items), needle) => items.contains(needle),
            (Value::Obj(fields), Value::Str(key)) => fields.contains_key(key),
            _ => false,
        })),
        BinaryOp::Add => match (left, right) {
            (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a + b)),
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (Value::Str(a), b) => Ok(Value::Str(format!("{}{}", a, b))),
            (a, Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            (a, b) => Err(type_error(&a, &b)),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (Value::Num(a), Value::Num(b)) = (&left, &right) else {
                return Err(type_error(&left, &right));
            };
            let (a, b) = (*a, *b);
            match op {
                BinaryOp::Sub => Ok(Value::Num(a - b)),
                BinaryOp::Mul => Ok(Value::Num(a * b)),
                _ if b == 0.0 => Err(EvalError::DivisionByZero),
                BinaryOp::Div => Ok(Value::Num(a / b)),
                _ => Ok(Value::Num(a % b)),
            }
        }
        BinaryOp::And | BinaryOp::Or | BinaryOp::Matches => Err(type_error(&left, &right)),
    }
}

/* ===================== Conditions ===================== */

/// Outcome of a condition. `Undefined` survives negation, so a condition
/// that read an undefined name is never satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Truth {
    Satisfied,
    Unsatisfied,
    Undefined,
}

/// Evaluate a condition; reads of undefined names are "not satisfied"
pub fn evaluate_condition(
    expr: &Expr,
    bindings: &dyn Bindings,
    element: Option<&Value>,
) -> Result<bool, EvalError> {
    Ok(truth(expr, bindings, element)? == Truth::Satisfied)
}

fn truth(expr: &Expr, bindings: &dyn Bindings, element: Option<&Value>) -> Result<Truth, EvalError> {
    match expr {
        Expr::Binary {
            op: BinaryOp::And,
            left,
            right,
            ..
        } => match truth(left, bindings, element)? {
            Truth::Satisfied => truth(right, bindings, element),
            other => Ok(other),
        },
        Expr::Binary {
            op: BinaryOp::Or,
            left,
            right,
            ..
        } => {
            let left = truth(left, bindings, element)?;
            if left == Truth::Satisfied {
                return Ok(left);
            }
            Ok(match truth(right, bindings, element)? {
                Truth::Unsatisfied => left,
                right => right,
            })
        }
        Expr::Unary {
            op: UnaryOp::Not,
            operand,
            ..
        } => Ok(match truth(operand, bindings, element)? {
            Truth::Satisfied => Truth::Unsatisfied,
            Truth::Unsatisfied => Truth::Satisfied,
            Truth::Undefined => Truth::Undefined,
        }),
        other => match evaluate(other, bindings, element) {
            Ok(value) if value.is_truthy() => Ok(Truth::Satisfied),
            Ok(_) => Ok(Truth::Unsatisfied),
            Err(EvalError::Undefined(name)) => {
                tracing::trace!(%name, "Condition reads an undefined value");
                Ok(Truth::Undefined)
            }
            Err(err) => Err(err),
        },
    }
}

/* ===================== Regex ===================== */

/// Compile a regex literal; `i`, `m`, `s` and `x` flags are honoured
pub fn build_regex(pattern: &str, flags: &str) -> Result<Regex, EvalError> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            _ => &mut builder,
        };
    }
    builder.build().map_err(|e| EvalError::InvalidRegex {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/* ===================== Functions ===================== */

pub const AGGREGATES: &[&str] = &["sum", "count", "avg", "min", "max", "first", "last"];

/// Aggregate a sequence of values
pub fn aggregate(function: &str, values: Vec<Value>) -> Result<Value, EvalError> {
    let numbers = |values: &[Value]| -> Result<Vec<f64>, EvalError> {
        values
            .iter()
            .map(|v| {
                v.as_num().ok_or_else(|| EvalError::Argument {
                    function: function.to_string(),
                    expected: "numbers",
                })
            })
            .collect()
    };

    match function {
        "sum" => Ok(Value::Num(numbers(&values)?.iter().sum())),
        "count" => Ok(Value::Num(values.len() as f64)),
        "avg" => {
            let nums = numbers(&values)?;
            if nums.is_empty() {
                return Ok(Value::Num(0.0));
            }
            Ok(Value::Num(nums.iter().sum::<f64>() / nums.len() as f64))
        }
        "min" | "max" => {
            let want = if function == "min" {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Greater
            };
            let mut best: Option<Value> = None;
            for value in values {
                best = match best {
                    Some(current) if value.compare(&current) != Some(want) => Some(current),
                    _ => Some(value),
                };
            }
            Ok(best.unwrap_or_default())
        }
        "first" => Ok(values.into_iter().next().unwrap_or_default()),
        "last" => Ok(values.into_iter().last().unwrap_or_default()),
        other => Err(EvalError::UnknownFunction(other.to_string())),
    }
}

/// Built-in function call. Aggregates take either one list or several values.
pub fn call(function: &str, mut args: Vec<Value>) -> Result<Value, EvalError> {
    let name = function.to_ascii_lowercase();
    if AGGREGATES.contains(&name.as_str()) {
        let values = if args.len() == 1 && matches!(args[0], Value::List(_)) {
            match args.pop() {
                Some(Value::List(items)) => items,
                _ => Vec::new(),
            }
        } else {
            args
        };
        return aggregate(&name, values);
    }

    let single = |args: Vec<Value>| -> Result<Value, EvalError> {
        let mut args = args.into_iter();
        match (args.next(), args.next()) {
            (Some(value), None) => Ok(value),
            _ => Err(EvalError::Argument {
                function: name.clone(),
                expected: "one argument",
            }),
        }
    };

    match name.as_str() {
        "length" => Ok(Value::Num(length(&single(args)?) as f64)),
        "uppercase" => Ok(Value::Str(single(args)?.to_string().to_uppercase())),
        "lowercase" => Ok(Value::Str(single(args)?.to_string().to_lowercase())),
        "string" => Ok(Value::Str(single(args)?.to_string())),
        "number" => match single(args)? {
            Value::Num(n) => Ok(Value::Num(n)),
            Value::Str(s) => s.trim().parse::<f64>().map(Value::Num).map_err(|_| {
                EvalError::Argument {
                    function: name.clone(),
                    expected: "a numeric string",
                }
            }),
            _ => Err(EvalError::Argument {
                function: name.clone(),
                expected: "a number or string",
            }),
        },
        _ => Err(EvalError::UnknownFunction(function.to_string())),
    }
}

/// Element count of lists and objects, character count of everything else
pub fn length(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::List(items) => items.len(),
        Value::Obj(fields) => fields.len(),
        Value::Str(s) => s.chars().count(),
        Value::Num(n) => format_number(*n).chars().count(),
        Value::Bool(b) => b.to_string().len(),
    }
}

#[cfg(test)]
mod tests {
    use maplit::hashmap;

    use super::*;
    use crate::parser::parse_expression;

    fn eval(source: &str, bindings: &HashMap<String, Value>) -> Result<Value, EvalError> {
        let expr = parse_expression(source).unwrap();
        evaluate(&expr, bindings, None)
    }

    fn cond(source: &str, bindings: &HashMap<String, Value>) -> bool {
        let expr = parse_expression(source).unwrap();
        evaluate_condition(&expr, bindings, None).unwrap()
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        let env = hashmap! { "x".to_string() => Value::from(10i64) };
        assert_eq!(eval("<x> + 2 * 3", &env), Ok(Value::from(16i64)));
        assert_eq!(eval("(<x> + 2) * 3", &env), Ok(Value::from(36i64)));
        assert_eq!(eval("<x> % 4", &env), Ok(Value::from(2i64)));
        assert_eq!(eval("<x> / 0", &env), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_string_concatenation() {
        let env = hashmap! { "name".to_string() => Value::from("Ada") };
        assert_eq!(eval("\"Hello, \" + <name>", &env), Ok(Value::from("Hello, Ada")));
        assert_eq!(eval("\"n=\" + 3", &env), Ok(Value::from("n=3")));
    }

    #[test]
    fn test_member_paths() {
        let env = hashmap! {
            "order".to_string() => Value::object([
                ("items", Value::List(vec![Value::from("a"), Value::from("b")])),
            ]),
        };
        assert_eq!(eval("<order: items.first>", &env), Ok(Value::from("a")));
        assert_eq!(eval("<order: items.1>", &env), Ok(Value::from("b")));
        assert!(matches!(
            eval("<order: missing>", &env),
            Err(EvalError::Undefined(_))
        ));
    }

    #[test]
    fn test_undefined_is_not_satisfied() {
        let env = HashMap::new();
        assert!(!cond("<missing> > 3", &env));
        assert!(!cond("<missing> == 1 and true", &env));
        assert!(cond("<missing> == 1 or true", &env));
        assert!(cond("<missing> is empty", &env));
        assert!(!cond("<missing> is not empty", &env));
    }

    #[test]
    fn test_negation_keeps_undefined_unsatisfied() {
        let env = hashmap! { "x".to_string() => Value::from(1i64) };
        assert!(!cond("not <missing> == 1", &env));
        assert!(!cond("not (<missing> > 3 and true)", &env));
        assert!(!cond("not (<missing> > 3 or <x> == 2)", &env));
        assert!(cond("not (<missing> > 3) or <x> == 1", &env));
        assert!(cond("not (<x> == 2)", &env));
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        let env = hashmap! { "x".to_string() => Value::from(0i64) };
        // The right side would divide by zero
        assert!(!cond("<x> > 0 and 10 / <x> > 1", &env));
        assert!(cond("<x> == 0 or 10 / <x> > 1", &env));
    }

    #[test]
    fn test_contains_and_matches() {
        let env = hashmap! {
            "tags".to_string() => Value::List(vec![Value::from("vip")]),
            "email".to_string() => Value::from("ADA@example.com"),
        };
        assert!(cond("<tags> contains \"vip\"", &env));
        assert!(cond("<email> matches /^ada@/i", &env));
        assert!(!cond("<email> matches /^ada@/", &env));
    }

    #[test]
    fn test_invalid_regex_is_an_error() {
        let expr = parse_expression("<x> matches /(/").unwrap();
        let env = hashmap! { "x".to_string() => Value::from("a") };
        assert!(matches!(
            evaluate_condition(&expr, &env, None),
            Err(EvalError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_fields_resolve_against_element_first() {
        let expr = parse_expression("status == \"active\"").unwrap();
        let element = Value::object([("status", Value::from("active"))]);
        let env = hashmap! { "status".to_string() => Value::from("closed") };
        assert!(evaluate_condition(&expr, &env, Some(&element)).unwrap());
        assert!(!evaluate_condition(&expr, &env, None).unwrap());
    }

    #[test]
    fn test_aggregates() {
        let nums = vec![Value::from(3i64), Value::from(1i64), Value::from(2i64)];
        assert_eq!(aggregate("sum", nums.clone()), Ok(Value::from(6i64)));
        assert_eq!(aggregate("count", nums.clone()), Ok(Value::from(3i64)));
        assert_eq!(aggregate("avg", nums.clone()), Ok(Value::from(2i64)));
        assert_eq!(aggregate("min", nums.clone()), Ok(Value::from(1i64)));
        assert_eq!(aggregate("max", nums.clone()), Ok(Value::from(3i64)));
        assert_eq!(aggregate("first", nums.clone()), Ok(Value::from(3i64)));
        assert_eq!(aggregate("last", nums), Ok(Value::from(2i64)));
        assert_eq!(aggregate("sum", Vec::new()), Ok(Value::from(0i64)));
        assert!(aggregate("median", Vec::new()).is_err());
    }

    #[test]
    fn test_function_calls() {
        let env = hashmap! {
            "xs".to_string() => Value::List(vec![Value::from(1i64), Value::from(4i64)]),
        };
        assert_eq!(eval("sum(<xs>)", &env), Ok(Value::from(5i64)));
        assert_eq!(eval("max(1, 7, 3)", &env), Ok(Value::from(7i64)));
        assert_eq!(eval("length(\"héllo\")", &env), Ok(Value::from(5i64)));
        assert_eq!(eval("uppercase(\"abc\")", &env), Ok(Value::from("ABC")));
        assert!(matches!(
            eval("shout(\"abc\")", &env),
            Err(EvalError::UnknownFunction(_))
        ));
    }
}
