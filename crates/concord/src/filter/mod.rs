//! Boolean filter expressions over catalog records.
//!
//! A [`Filter`] is compiled once per request and evaluated once per
//! candidate record. Evaluation never fails: selectors that do not resolve
//! against a record simply make the comparison false.

mod parser;
mod value;

pub use parser::{Expr, MAX_NESTING, MatchExpr, MatchOp};
pub use value::{Accessor, Selectable, Value};

use concord_common::ConcordError;

/// A compiled, immutable filter expression
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    /// `None` matches everything
    expr: Option<Expr>,
}

impl Filter {
    /// Compile filter text. Blank text compiles to an always-true filter.
    pub fn compile(text: &str) -> Result<Self, ConcordError> {
        let expr = parser::parse(text)?;
        Ok(Self { expr })
    }

    pub fn is_always(&self) -> bool {
        self.expr.is_none()
    }

    pub fn matches<T: Selectable>(&self, record: &T) -> bool {
        match &self.expr {
            Some(expr) => eval(expr, record),
            None => true,
        }
    }

    /// Keep only the matching records, preserving order
    pub fn apply<T: Selectable>(&self, records: Vec<T>) -> Vec<T> {
        if self.is_always() {
            return records;
        }
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}

fn eval<T: Selectable>(expr: &Expr, record: &T) -> bool {
    match expr {
        Expr::And(terms) => terms.iter().all(|term| eval(term, record)),
        Expr::Or(terms) => terms.iter().any(|term| eval(term, record)),
        Expr::Not(inner) => !eval(inner, record),
        Expr::Match(m) => eval_match(m, record),
    }
}

fn eval_match<T: Selectable>(m: &MatchExpr, record: &T) -> bool {
    let Some((head, rest)) = m.selector.split_first() else {
        return false;
    };
    let Some(root) = record.select(head) else {
        return false;
    };

    let mut leaves = Vec::new();
    collect_leaves(&root, rest, &mut leaves);
    if leaves.is_empty() {
        return false;
    }

    let literal = m.value.as_deref().unwrap_or_default();
    match m.op {
        MatchOp::Equal => leaves.iter().any(|leaf| leaf_equals(leaf, literal)),
        MatchOp::NotEqual => !leaves.iter().any(|leaf| leaf_equals(leaf, literal)),
        MatchOp::In => leaves.iter().any(|leaf| leaf_contains(leaf, literal)),
        MatchOp::NotIn => !leaves.iter().any(|leaf| leaf_contains(leaf, literal)),
        MatchOp::IsEmpty => leaves.iter().any(|leaf| leaf.is_empty()),
        MatchOp::IsNotEmpty => !leaves.iter().any(|leaf| leaf.is_empty()),
    }
}

/// Walk the remaining path. Sequences are crossed element-wise, so a path
/// through a list resolves to every element's value at that path.
fn collect_leaves<'a>(value: &'a Value, path: &[String], out: &mut Vec<&'a Value>) {
    let Some((segment, rest)) = path.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Value::Map(map) => {
            if let Some(child) = map.get(segment) {
                collect_leaves(child, rest, out);
            }
        }
        Value::List(items) => {
            for item in items {
                collect_leaves(item, path, out);
            }
        }
        _ => {}
    }
}

/// Equality with "contains" semantics for sequence-valued fields
fn leaf_equals(leaf: &Value, literal: &str) -> bool {
    match leaf {
        Value::List(items) => items.iter().any(|item| scalar_equals(item, literal)),
        other => scalar_equals(other, literal),
    }
}

/// Membership: list element, map key, or substring
fn leaf_contains(leaf: &Value, literal: &str) -> bool {
    match leaf {
        Value::List(items) => items.iter().any(|item| scalar_equals(item, literal)),
        Value::Map(map) => map.contains_key(literal),
        Value::String(s) => s.contains(literal),
        other => scalar_equals(other, literal),
    }
}

fn scalar_equals(value: &Value, literal: &str) -> bool {
    match value {
        Value::String(s) => s == literal || numeric_equals(s, literal),
        Value::Number(n) => literal.parse::<f64>().is_ok_and(|lit| lit == *n),
        Value::Bool(b) => literal.parse::<bool>().is_ok_and(|lit| lit == *b),
        Value::Null | Value::List(_) | Value::Map(_) => false,
    }
}

/// Numeric strings compare by value, so "1" equals "1.0"
fn numeric_equals(left: &str, right: &str) -> bool {
    match (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
        (Ok(l), Ok(r)) => l == r,
        _ => false,
    }
}
