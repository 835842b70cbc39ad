//! Remote search filters.
//!
//! Odoo encodes filters ("domains") as a flat prefix-notation array where
//! `&` and `|` consume the next two operands and `!` the next one. That
//! encoding is only produced at the wire boundary ([`Domain::to_prefix`]);
//! everywhere else a filter is an explicit tree.
//!
//! # YAML form
//!
//! ```yaml
//! domain:
//!   and:
//!     - [website_published, "=", true]
//!     - or:
//!         - [lang, "=", en_US]
//!         - not: [name, ilike, draft]
//! ```

use std::fmt;

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Comparison operator of a leaf condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not in")]
    NotIn,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "not like")]
    NotLike,
    #[serde(rename = "ilike")]
    Ilike,
    #[serde(rename = "not ilike")]
    NotIlike,
    #[serde(rename = "=like")]
    EqLike,
    #[serde(rename = "child_of")]
    ChildOf,
    #[serde(rename = "parent_of")]
    ParentOf,
}

impl Operator {
    /// Wire spelling of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::Like => "like",
            Operator::NotLike => "not like",
            Operator::Ilike => "ilike",
            Operator::NotIlike => "not ilike",
            Operator::EqLike => "=like",
            Operator::ChildOf => "child_of",
            Operator::ParentOf => "parent_of",
        }
    }

    fn takes_list(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    fn accepts_list(&self) -> bool {
        matches!(
            self,
            Operator::In | Operator::NotIn | Operator::ChildOf | Operator::ParentOf
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `[field, operator, value]` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

/// A boolean filter over remote records.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "DomainRepr")]
pub enum Domain {
    Leaf(Condition),
    And(Vec<Domain>),
    Or(Vec<Domain>),
    Not(Box<Domain>),
}

/// Reasons a domain tree is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("condition has an empty field name")]
    EmptyField,

    #[error("operator '{op}' on '{field}' requires a list value")]
    ExpectedList { field: String, op: &'static str },

    #[error("operator '{op}' on '{field}' does not accept a list value")]
    UnexpectedList { field: String, op: &'static str },
}

/// Matches every record; Odoo's `TRUE_LEAF`.
fn true_leaf() -> Value {
    json!([1, "=", 1])
}

/// Matches no record; Odoo's `FALSE_LEAF`.
fn false_leaf() -> Value {
    json!([0, "=", 1])
}

impl Default for Domain {
    fn default() -> Self {
        Domain::all()
    }
}

impl Domain {
    /// The empty conjunction: matches every record in scope.
    pub fn all() -> Self {
        Domain::And(Vec::new())
    }

    pub fn leaf(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Domain::Leaf(Condition {
            field: field.into(),
            op,
            value: value.into(),
        })
    }

    /// Conjunction of `self` and `other`, flattening nested `And` groups.
    pub fn and(self, other: Domain) -> Self {
        match (self, other) {
            (Domain::And(mut left), Domain::And(right)) => {
                left.extend(right);
                Domain::And(left)
            }
            (Domain::And(mut left), right) => {
                left.push(right);
                Domain::And(left)
            }
            (left, Domain::And(mut right)) => {
                right.insert(0, left);
                Domain::And(right)
            }
            (left, right) => Domain::And(vec![left, right]),
        }
    }

    /// Disjunction of `self` and `other`, flattening nested `Or` groups.
    pub fn or(self, other: Domain) -> Self {
        match (self, other) {
            (Domain::Or(mut left), Domain::Or(right)) => {
                left.extend(right);
                Domain::Or(left)
            }
            (Domain::Or(mut left), right) => {
                left.push(right);
                Domain::Or(left)
            }
            (left, Domain::Or(mut right)) => {
                right.insert(0, left);
                Domain::Or(right)
            }
            (left, right) => Domain::Or(vec![left, right]),
        }
    }

    pub fn negate(self) -> Self {
        Domain::Not(Box::new(self))
    }

    /// Check every leaf for shape errors the remote side would reject.
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            Domain::Leaf(cond) => {
                if cond.field.trim().is_empty() {
                    return Err(DomainError::EmptyField);
                }
                let is_list = cond.value.is_array();
                if cond.op.takes_list() && !is_list {
                    return Err(DomainError::ExpectedList {
                        field: cond.field.clone(),
                        op: cond.op.as_str(),
                    });
                }
                if is_list && !cond.op.accepts_list() {
                    return Err(DomainError::UnexpectedList {
                        field: cond.field.clone(),
                        op: cond.op.as_str(),
                    });
                }
                Ok(())
            }
            Domain::And(parts) | Domain::Or(parts) => parts.iter().try_for_each(Domain::validate),
            Domain::Not(inner) => inner.validate(),
        }
    }

    /// Encode into Odoo's prefix-notation array.
    ///
    /// A top-level empty conjunction encodes as `[]`; empty groups nested
    /// under another operator encode as `TRUE_LEAF` / `FALSE_LEAF` so the
    /// operator arity stays intact.
    pub fn to_prefix(&self) -> Value {
        let mut out = Vec::new();
        self.encode_into(&mut out, false);
        Value::Array(out)
    }

    fn encode_into(&self, out: &mut Vec<Value>, nested: bool) {
        match self {
            Domain::Leaf(cond) => {
                out.push(json!([cond.field, cond.op.as_str(), cond.value]));
            }
            Domain::And(parts) => encode_group(out, "&", parts, nested, true_leaf),
            Domain::Or(parts) => encode_group(out, "|", parts, true, false_leaf),
            Domain::Not(inner) => {
                out.push(Value::from("!"));
                inner.encode_into(out, true);
            }
        }
    }
}

fn encode_group(
    out: &mut Vec<Value>,
    op: &str,
    parts: &[Domain],
    nested: bool,
    empty: fn() -> Value,
) {
    match parts {
        [] => {
            if nested {
                out.push(empty());
            }
        }
        [only] => only.encode_into(out, nested),
        _ => {
            for _ in 1..parts.len() {
                out.push(Value::from(op));
            }
            for part in parts {
                part.encode_into(out, true);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// YAML representation
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum DomainRepr {
    Leaf(String, Operator, Value),
    And { and: Vec<DomainRepr> },
    Or { or: Vec<DomainRepr> },
    Not { not: Box<DomainRepr> },
}

impl From<DomainRepr> for Domain {
    fn from(repr: DomainRepr) -> Self {
        match repr {
            DomainRepr::Leaf(field, op, value) => Domain::Leaf(Condition { field, op, value }),
            DomainRepr::And { and } => Domain::And(and.into_iter().map(Domain::from).collect()),
            DomainRepr::Or { or } => Domain::Or(or.into_iter().map(Domain::from).collect()),
            DomainRepr::Not { not } => Domain::Not(Box::new(Domain::from(*not))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
