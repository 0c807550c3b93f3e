//! Source printer - renders an AST back into source text
//!
//! Printing then re-parsing yields the same tree (ignoring spans).

use std::fmt::{self, Write};

use crate::executor::types::ast::{
    ActionStmt, BinaryOp, Expr, FeatureSet, Literal, ObjectDescriptor, Pattern, Program,
    ResultDescriptor, Stmt, UnaryOp, VarRef,
};
use crate::executor::types::values::format_number;

const INDENT: &str = "    ";

/// Render a whole program
pub fn render_program(program: &Program) -> String {
    program
        .feature_sets
        .iter()
        .map(|fs| fs.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "({}: {}) {{", self.name, self.activity)?;
        let mut body = String::new();
        write_block(&mut body, &self.body, 1)?;
        f.write_str(&body)?;
        writeln!(f, "}}")
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_stmt(&mut out, self, 0)?;
        f.write_str(out.trim_end())
    }
}

impl fmt::Display for ActionStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> ", self.verb)?;
        if let Some(article) = self.result.article {
            write!(f, "{} ", article.as_str())?;
        }
        write!(f, "{} {}", self.result, self.object.preposition.as_str())?;
        if let Some(article) = self.object.article {
            write!(f, " {}", article.as_str())?;
        }
        write!(f, " {}", self.object)?;
        if let Some(condition) = &self.object.condition {
            write!(f, " where {}", condition)?;
        }
        if let Some(argument) = &self.object.argument {
            write!(f, " with {}", argument)?;
        }
        if let Some(when) = &self.when {
            write!(f, " when {}", when)?;
        }
        write!(f, ".")
    }
}

impl fmt::Display for ResultDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "<{}: {}>", self.base, q),
            None => write!(f, "<{}>", self.base),
        }
    }
}

/// Renders the source part only; clauses belong to the statement
impl fmt::Display for ObjectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(value) = &self.value {
            return write!(f, "{}", value);
        }
        match &self.qualifier {
            Some(q) => write!(f, "<{}: {}>", self.base, q),
            None => write!(f, "<{}>", self.base),
        }
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "<{}>", self.name)
        } else {
            write!(f, "<{}: {}>", self.name, self.path.join("."))
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Literal { v } => write!(f, "{}", literal(v)),
            Pattern::Variable { var } => write!(f, "{}", var),
            Pattern::Regex { pattern, flags } => write!(f, "{}", regex(pattern, flags)),
            Pattern::Wildcard => write!(f, "_"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&expr(self))
    }
}

/* ===================== Statements ===================== */

fn write_block(out: &mut String, body: &[Stmt], depth: usize) -> fmt::Result {
    for stmt in body {
        write_stmt(out, stmt, depth)?;
    }
    Ok(())
}

fn write_stmt(out: &mut String, stmt: &Stmt, depth: usize) -> fmt::Result {
    let pad = INDENT.repeat(depth);
    match stmt {
        Stmt::Action(action) => writeln!(out, "{}{}", pad, action),
        Stmt::Publish {
            alias, variable, ..
        } => writeln!(out, "{}<Publish> as <{}> <{}>.", pad, alias, variable),
        Stmt::Transition {
            target,
            field,
            from,
            to,
            ..
        } => writeln!(
            out,
            "{}<Accept> the <transition: {}_to_{}> on <{}: {}>.",
            pad, from, to, target, field
        ),
        Stmt::If {
            test,
            then_s,
            else_s,
            ..
        } => {
            write!(out, "{}", pad)?;
            write_if(out, test, then_s, else_s.as_deref(), depth)?;
            writeln!(out)
        }
        Stmt::When { test, body, .. } => {
            writeln!(out, "{}when {} {{", pad, test)?;
            write_block(out, body, depth + 1)?;
            writeln!(out, "{}}}", pad)
        }
        Stmt::Match {
            subject,
            cases,
            otherwise,
            ..
        } => {
            writeln!(out, "{}match {} {{", pad, subject)?;
            let case_pad = INDENT.repeat(depth + 1);
            for case in cases {
                write!(out, "{}case {}", case_pad, case.pattern)?;
                if let Some(guard) = &case.guard {
                    write!(out, " where {}", guard)?;
                }
                writeln!(out, " {{")?;
                write_block(out, &case.body, depth + 2)?;
                writeln!(out, "{}}}", case_pad)?;
            }
            if let Some(body) = otherwise {
                writeln!(out, "{}otherwise {{", case_pad)?;
                write_block(out, body, depth + 2)?;
                writeln!(out, "{}}}", case_pad)?;
            }
            writeln!(out, "{}}}", pad)
        }
        Stmt::ForEach {
            binding,
            index,
            collection,
            filter,
            parallel,
            body,
            ..
        } => {
            write!(out, "{}", pad)?;
            if *parallel {
                write!(out, "parallel ")?;
            }
            write!(out, "for each <{}>", binding)?;
            if let Some(index) = index {
                write!(out, " at <{}>", index)?;
            }
            write!(out, " in {}", collection)?;
            if let Some(filter) = filter {
                write!(out, " where {}", filter)?;
            }
            writeln!(out, " {{")?;
            write_block(out, body, depth + 1)?;
            writeln!(out, "{}}}", pad)
        }
        Stmt::ForRange {
            binding,
            from,
            to,
            body,
            ..
        } => {
            writeln!(out, "{}for <{}> from {} to {} {{", pad, binding, from, to)?;
            write_block(out, body, depth + 1)?;
            writeln!(out, "{}}}", pad)
        }
    }
}

fn write_if(
    out: &mut String,
    test: &Expr,
    then_s: &[Stmt],
    else_s: Option<&[Stmt]>,
    depth: usize,
) -> fmt::Result {
    let pad = INDENT.repeat(depth);
    writeln!(out, "if {} then {{", test)?;
    write_block(out, then_s, depth + 1)?;
    write!(out, "{}}}", pad)?;
    match else_s {
        Some(
            [Stmt::If {
                test,
                then_s,
                else_s,
                ..
            }],
        ) => {
            write!(out, " else ")?;
            write_if(out, test, then_s, else_s.as_deref(), depth)
        }
        Some(body) => {
            writeln!(out, " else {{")?;
            write_block(out, body, depth + 1)?;
            write!(out, "{}}}", pad)
        }
        None => Ok(()),
    }
}

/* ===================== Expressions ===================== */

/// Binding strength; higher binds tighter
fn precedence(e: &Expr) -> u8 {
    match e {
        Expr::Binary { op, .. } => match op {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 6,
            _ => 4,
        },
        Expr::Unary {
            op: UnaryOp::Not, ..
        } => 3,
        Expr::Unary {
            op: UnaryOp::Neg, ..
        } => 7,
        _ => 8,
    }
}

fn wrapped(e: &Expr, min: u8) -> String {
    if precedence(e) < min {
        format!("({})", expr(e))
    } else {
        expr(e)
    }
}

fn expr(e: &Expr) -> String {
    match e {
        Expr::Lit { v, .. } => literal(v),
        Expr::Empty { .. } => "empty".to_string(),
        Expr::Var { name, path, .. } if path.is_empty() => format!("<{}>", name),
        Expr::Var { name, path, .. } => format!("<{}: {}>", name, path.join(".")),
        Expr::Field { name, .. } => name.clone(),
        Expr::Regex { pattern, flags, .. } => regex(pattern, flags),
        Expr::List { elements, .. } => format!(
            "[{}]",
            elements.iter().map(expr).collect::<Vec<_>>().join(", ")
        ),
        Expr::Object { properties, .. } if properties.is_empty() => "{}".to_string(),
        Expr::Object { properties, .. } => format!(
            "{{ {} }}",
            properties
                .iter()
                .map(|(k, v)| format!("{}: {}", key(k), expr(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Expr::Unary { op, operand, .. } => match op {
            UnaryOp::Not => format!("not {}", wrapped(operand, 3)),
            UnaryOp::Neg => format!("-{}", wrapped(operand, 7)),
        },
        Expr::Binary {
            op, left, right, ..
        } => {
            let p = precedence(e);
            let (left_min, right_min) = if op.is_comparison() {
                (p + 1, p + 1)
            } else {
                (p, p + 1)
            };
            if matches!(right.as_ref(), Expr::Empty { .. }) {
                let is = if *op == BinaryOp::NotEq {
                    "is not"
                } else {
                    "is"
                };
                return format!("{} {} empty", wrapped(left, left_min), is);
            }
            format!(
                "{} {} {}",
                wrapped(left, left_min),
                op.as_str(),
                wrapped(right, right_min)
            )
        }
        Expr::Call { function, args, .. } => format!(
            "{}({})",
            function,
            args.iter().map(expr).collect::<Vec<_>>().join(", ")
        ),
    }
}

fn literal(v: &Literal) -> String {
    match v {
        Literal::Null => "null".to_string(),
        Literal::Bool(b) => b.to_string(),
        Literal::Num(n) => format_number(*n),
        Literal::Str(s) => quote(s),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn regex(pattern: &str, flags: &str) -> String {
    format!("/{}/{}", pattern.replace('/', "\\/"), flags)
}

fn key(k: &str) -> String {
    let bare = k
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && k.chars().all(|c| c.is_alphanumeric() || c == '_');
    if bare {
        k.to_string()
    } else {
        quote(k)
    }
}
