//! The restricted guard expression language for `conditional` nodes (§4.3):
//! comparisons over upstream outputs plus literals, combined with boolean
//! combinators. Deliberately not a general expression engine — the grammar
//! is fixed to exactly what `selected_edge` routing needs:
//!
//! ```text
//! expr       := clause (("&&" | "||") clause)*
//! clause     := field op literal
//! field      := identifier ("." identifier)*
//! op         := "==" | "!=" | "<=" | ">=" | "<" | ">"
//! literal    := json-ish scalar (string, number, bool, null)
//! ```
//!
//! Evaluation is left-associative with no operator precedence between `&&`
//! and `||` and no parentheses, matching the grammar above exactly.

use serde_json::Value;
use std::collections::HashMap;

use crate::error::GraphError;

#[derive(Debug, Clone, PartialEq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Combinator {
    And,
    Or,
}

#[derive(Debug, Clone)]
struct Clause {
    field: String,
    op: Op,
    literal: Value,
}

/// A compiled guard expression, ready to be evaluated against a map of
/// upstream node outputs.
#[derive(Debug, Clone)]
pub struct Guard {
    clauses: Vec<Clause>,
    combinators: Vec<Combinator>,
}

impl Guard {
    /// Parse a guard expression. Rejected at validation time (not at
    /// evaluation time) so malformed guards never reach the executor.
    pub fn parse(source: &str) -> Result<Self, GraphError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(invalid(source, "empty guard expression"));
        }

        let mut clauses = Vec::new();
        let mut combinators = Vec::new();
        let mut iter = tokens.into_iter().peekable();

        loop {
            let field = iter.next().ok_or_else(|| invalid(source, "expected field"))?;
            let op_tok = iter.next().ok_or_else(|| invalid(source, "expected operator"))?;
            let op = parse_op(&op_tok).ok_or_else(|| invalid(source, &format!("unknown operator '{op_tok}'")))?;
            let literal_tok = iter.next().ok_or_else(|| invalid(source, "expected literal"))?;
            let literal = parse_literal(&literal_tok);
            clauses.push(Clause { field, op, literal });

            match iter.next() {
                None => break,
                Some(tok) if tok == "&&" => combinators.push(Combinator::And),
                Some(tok) if tok == "||" => combinators.push(Combinator::Or),
                Some(other) => return Err(invalid(source, &format!("expected '&&' or '||', got '{other}'"))),
            }
        }

        Ok(Guard { clauses, combinators })
    }

    /// Evaluate the guard against upstream node outputs, keyed by node id.
    /// Fields are dotted paths: `node_id.field.sub_field`.
    pub fn evaluate(&self, upstream_outputs: &HashMap<String, Value>) -> bool {
        let mut result = eval_clause(&self.clauses[0], upstream_outputs);
        for (combinator, clause) in self.combinators.iter().zip(self.clauses.iter().skip(1)) {
            let next = eval_clause(clause, upstream_outputs);
            result = match combinator {
                Combinator::And => result && next,
                Combinator::Or => result || next,
            };
        }
        result
    }

    /// The set of upstream node ids this guard references, used to confirm
    /// guards reference only upstream outputs (§3.1 edge invariant).
    pub fn referenced_node_ids(&self) -> Vec<String> {
        self.clauses
            .iter()
            .filter_map(|c| c.field.split('.').next().map(|s| s.to_string()))
            .collect()
    }
}

fn eval_clause(clause: &Clause, outputs: &HashMap<String, Value>) -> bool {
    let mut parts = clause.field.split('.');
    let Some(node_id) = parts.next() else { return false };
    let Some(mut current) = outputs.get(node_id).cloned() else { return false };
    for part in parts {
        current = match current.get(part) {
            Some(v) => v.clone(),
            None => return false,
        };
    }
    compare(&current, &clause.op, &clause.literal)
}

fn compare(actual: &Value, op: &Op, literal: &Value) -> bool {
    match op {
        Op::Eq => actual == literal,
        Op::Ne => actual != literal,
        _ => {
            let (Some(a), Some(b)) = (as_f64(actual), as_f64(literal)) else { return false };
            match op {
                Op::Lt => a < b,
                Op::Le => a <= b,
                Op::Gt => a > b,
                Op::Ge => a >= b,
                Op::Eq | Op::Ne => unreachable!(),
            }
        }
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    v.as_f64()
}

fn parse_op(tok: &str) -> Option<Op> {
    match tok {
        "==" => Some(Op::Eq),
        "!=" => Some(Op::Ne),
        "<=" => Some(Op::Le),
        ">=" => Some(Op::Ge),
        "<" => Some(Op::Lt),
        ">" => Some(Op::Gt),
        _ => None,
    }
}

fn parse_literal(tok: &str) -> Value {
    if let Some(stripped) = tok.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Value::String(stripped.to_string());
    }
    match tok {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => tok
            .parse::<f64>()
            .map(|n| serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null))
            .unwrap_or_else(|_| Value::String(tok.to_string())),
    }
}

fn tokenize(source: &str) -> Result<Vec<String>, GraphError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            let mut literal = String::from("\"");
            chars.next();
            for ch in chars.by_ref() {
                literal.push(ch);
                if ch == '"' {
                    break;
                }
            }
            tokens.push(literal);
            continue;
        }
        if "=!<>".contains(c) {
            let mut op = String::from(c);
            chars.next();
            if let Some(&next) = chars.peek() {
                if next == '=' {
                    op.push(next);
                    chars.next();
                }
            }
            tokens.push(op);
            continue;
        }
        if c == '&' || c == '|' {
            let mut combinator = String::from(c);
            chars.next();
            if let Some(&next) = chars.peek() {
                if next == c {
                    combinator.push(next);
                    chars.next();
                }
            }
            if combinator.len() != 2 {
                return Err(invalid(source, "expected '&&' or '||'"));
            }
            tokens.push(combinator);
            continue;
        }
        let mut word = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || "=!<>&|".contains(c) {
                break;
            }
            word.push(c);
            chars.next();
        }
        tokens.push(word);
    }
    Ok(tokens)
}

fn invalid(source: &str, reason: &str) -> GraphError {
    GraphError::InvalidGuard {
        source: String::new(),
        target: String::new(),
        reason: format!("{reason} (in '{source}')"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn simple_equality_guard() {
        let guard = Guard::parse(r#"classify.category == "billing""#).unwrap();
        let ok = outputs(&[("classify", serde_json::json!({ "category": "billing" }))]);
        assert!(guard.evaluate(&ok));
        let bad = outputs(&[("classify", serde_json::json!({ "category": "support" }))]);
        assert!(!guard.evaluate(&bad));
    }

    #[test]
    fn numeric_comparison_and_combinator() {
        let guard = Guard::parse("score.value >= 0.5 && score.confident == true").unwrap();
        let data = outputs(&[("score", serde_json::json!({ "value": 0.8, "confident": true }))]);
        assert!(guard.evaluate(&data));
    }

    #[test]
    fn malformed_guard_is_rejected_at_parse_time() {
        assert!(Guard::parse("score.value >>= 1").is_err());
    }

    #[test]
    fn referenced_node_ids_extracts_upstream_dependency() {
        let guard = Guard::parse("classify.category == \"x\"").unwrap();
        assert_eq!(guard.referenced_node_ids(), vec!["classify".to_string()]);
    }
}
