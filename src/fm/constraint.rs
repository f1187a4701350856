//! Cross-tree constraints.
//!
//! A CTC is a small expression AST over feature paths and literal
//! values. Linking resolves every `Var` against a model's lookup and is
//! pure: it returns a new constraint and records problems in the error
//! accumulator instead of raising. Evaluation is tri-valued; a missing
//! binding makes the result unknown.

use std::cmp::Ordering;
use std::fmt;

use crate::core::value::Value;
use crate::errors::{DeclError, DeclErrors};
use crate::fm::attribute::AttributeSpec;
use crate::fm::config::Configuration;
use crate::fm::feature::{Lookup, SymKind, SymbolId};
use crate::fm::result::{CtcResult, ReasonTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn apply(&self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "Eq",
            CmpOp::Ne => "Ne",
            CmpOp::Lt => "Lt",
            CmpOp::Le => "Le",
            CmpOp::Gt => "Gt",
            CmpOp::Ge => "Ge",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Var {
        name: String,
        resolved: Option<SymbolId>,
    },
    Lit(Value),
    Not(Box<Constraint>),
    And(Vec<Constraint>),
    Or(Vec<Constraint>),
    /// Exactly one operand true.
    Xor(Vec<Constraint>),
    /// At most one operand true.
    Conflict(Vec<Constraint>),
    Impl(Box<Constraint>, Box<Constraint>),
    Iff(Box<Constraint>, Box<Constraint>),
    Cmp {
        op: CmpOp,
        lhs: Box<Constraint>,
        rhs: Box<Constraint>,
    },
}

impl Constraint {
    pub fn var(name: impl Into<String>) -> Constraint {
        Constraint::Var {
            name: name.into(),
            resolved: None,
        }
    }

    pub fn lit(value: impl Into<Value>) -> Constraint {
        Constraint::Lit(value.into())
    }

    pub fn not(inner: impl Into<Constraint>) -> Constraint {
        Constraint::Not(Box::new(inner.into()))
    }

    pub fn and<I, C>(parts: I) -> Constraint
    where
        I: IntoIterator<Item = C>,
        C: Into<Constraint>,
    {
        Constraint::And(parts.into_iter().map(Into::into).collect())
    }

    pub fn or<I, C>(parts: I) -> Constraint
    where
        I: IntoIterator<Item = C>,
        C: Into<Constraint>,
    {
        Constraint::Or(parts.into_iter().map(Into::into).collect())
    }

    pub fn xor<I, C>(parts: I) -> Constraint
    where
        I: IntoIterator<Item = C>,
        C: Into<Constraint>,
    {
        Constraint::Xor(parts.into_iter().map(Into::into).collect())
    }

    pub fn conflict<I, C>(parts: I) -> Constraint
    where
        I: IntoIterator<Item = C>,
        C: Into<Constraint>,
    {
        Constraint::Conflict(parts.into_iter().map(Into::into).collect())
    }

    pub fn implies(p: impl Into<Constraint>, q: impl Into<Constraint>) -> Constraint {
        Constraint::Impl(Box::new(p.into()), Box::new(q.into()))
    }

    pub fn iff(p: impl Into<Constraint>, q: impl Into<Constraint>) -> Constraint {
        Constraint::Iff(Box::new(p.into()), Box::new(q.into()))
    }

    pub fn cmp(op: CmpOp, lhs: impl Into<Constraint>, rhs: impl Into<Constraint>) -> Constraint {
        Constraint::Cmp {
            op,
            lhs: Box::new(lhs.into()),
            rhs: Box::new(rhs.into()),
        }
    }

    pub fn eq(lhs: impl Into<Constraint>, rhs: impl Into<Constraint>) -> Constraint {
        Self::cmp(CmpOp::Eq, lhs, rhs)
    }

    pub fn ne(lhs: impl Into<Constraint>, rhs: impl Into<Constraint>) -> Constraint {
        Self::cmp(CmpOp::Ne, lhs, rhs)
    }

    pub fn lt(lhs: impl Into<Constraint>, rhs: impl Into<Constraint>) -> Constraint {
        Self::cmp(CmpOp::Lt, lhs, rhs)
    }

    pub fn le(lhs: impl Into<Constraint>, rhs: impl Into<Constraint>) -> Constraint {
        Self::cmp(CmpOp::Le, lhs, rhs)
    }

    pub fn gt(lhs: impl Into<Constraint>, rhs: impl Into<Constraint>) -> Constraint {
        Self::cmp(CmpOp::Gt, lhs, rhs)
    }

    pub fn ge(lhs: impl Into<Constraint>, rhs: impl Into<Constraint>) -> Constraint {
        Self::cmp(CmpOp::Ge, lhs, rhs)
    }

    /// Resolve every `Var` against `lookup`. Pure: returns the linked
    /// constraint; unresolved names and ill-typed comparisons are
    /// recorded in `errors`, never raised.
    pub fn link(&self, location: &str, lookup: &Lookup, errors: &mut DeclErrors) -> Constraint {
        match self {
            Constraint::Var { name, .. } => Constraint::Var {
                name: name.clone(),
                resolved: lookup.resolve(name, location, errors),
            },
            Constraint::Lit(v) => Constraint::Lit(v.clone()),
            Constraint::Not(inner) => Constraint::not(inner.link(location, lookup, errors)),
            Constraint::And(parts) => {
                Constraint::And(parts.iter().map(|p| p.link(location, lookup, errors)).collect())
            }
            Constraint::Or(parts) => {
                Constraint::Or(parts.iter().map(|p| p.link(location, lookup, errors)).collect())
            }
            Constraint::Xor(parts) => {
                Constraint::Xor(parts.iter().map(|p| p.link(location, lookup, errors)).collect())
            }
            Constraint::Conflict(parts) => Constraint::Conflict(
                parts.iter().map(|p| p.link(location, lookup, errors)).collect(),
            ),
            Constraint::Impl(p, q) => Constraint::implies(
                p.link(location, lookup, errors),
                q.link(location, lookup, errors),
            ),
            Constraint::Iff(p, q) => Constraint::iff(
                p.link(location, lookup, errors),
                q.link(location, lookup, errors),
            ),
            Constraint::Cmp { op, lhs, rhs } => {
                let lhs = lhs.link(location, lookup, errors);
                let rhs = rhs.link(location, lookup, errors);
                let linked = Constraint::Cmp {
                    op: *op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                };
                linked.check_comparison(lookup, errors);
                linked
            }
        }
    }

    /// Declaration check for comparisons: both operands must be `Var` or
    /// `Lit`, and their domains must agree.
    fn check_comparison(&self, lookup: &Lookup, errors: &mut DeclErrors) {
        let Constraint::Cmp { lhs, rhs, .. } = self else {
            return;
        };
        let mut kinds = Vec::new();
        for operand in [lhs.as_ref(), rhs.as_ref()] {
            match operand {
                Constraint::Var { resolved, .. } => {
                    if let Some(id) = resolved {
                        let kind = match lookup.kind(*id) {
                            SymKind::Feature => "bool",
                            SymKind::Attribute(spec) => spec.domain_kind(),
                        };
                        kinds.push(kind);
                    }
                }
                Constraint::Lit(value) => kinds.push(AttributeSpec::value_domain_kind(value)),
                other => {
                    errors.add(DeclError::ConfigShape {
                        name: other.to_string(),
                        detail: "comparison operands must be Var or Lit".to_string(),
                    });
                }
            }
        }
        if kinds.len() == 2 && kinds[0] != kinds[1] && kinds[0] != "enum" && kinds[1] != "enum" {
            errors.add(DeclError::DomainMismatch {
                constraint: self.to_string(),
                left: kinds[0].to_string(),
                right: kinds[1].to_string(),
            });
        }
    }

    /// The value of a leaf operand under a configuration.
    fn operand_value(&self, conf: &Configuration) -> Result<Value, String> {
        match self {
            Constraint::Lit(v) => Ok(v.clone()),
            Constraint::Var { name, resolved } => match resolved {
                Some(id) => conf
                    .value(*id)
                    .cloned()
                    .ok_or_else(|| name.clone()),
                None => Err(name.clone()),
            },
            other => Err(other.to_string()),
        }
    }

    fn child_expected(&self, expected: Option<bool>) -> Option<bool> {
        match self {
            Constraint::And(_) => match expected {
                Some(true) => Some(true),
                _ => None,
            },
            Constraint::Or(_) => match expected {
                Some(false) => Some(false),
                _ => None,
            },
            Constraint::Not(_) => expected.map(|e| !e),
            _ => None,
        }
    }

    /// Tri-valued evaluation against a linked configuration. `None`
    /// means unknown: a referenced binding was missing.
    pub fn eval(&self, conf: &Configuration, expected: Option<bool>) -> CtcResult {
        let computed: Option<bool> = match self {
            Constraint::Lit(v) => Some(v.truthy()),
            Constraint::Var { name, resolved } => match resolved.and_then(|id| conf.value(id)) {
                Some(v) => Some(v.truthy()),
                None => {
                    let mut reason = ReasonTree::new(self.to_string());
                    reason.value_none(name.clone());
                    return CtcResult::unknown(reason);
                }
            },
            Constraint::Not(inner) => {
                let sub = inner.eval(conf, self.child_expected(expected));
                return self.finish(sub.value.map(|v| !v), vec![sub], expected);
            }
            Constraint::And(parts) | Constraint::Or(parts) | Constraint::Xor(parts)
            | Constraint::Conflict(parts) => {
                let subs: Vec<CtcResult> = parts
                    .iter()
                    .map(|p| p.eval(conf, self.child_expected(expected)))
                    .collect();
                let values: Vec<Option<bool>> = subs.iter().map(|s| s.value).collect();
                let folded = match self {
                    Constraint::And(_) => kleene_all(&values),
                    Constraint::Or(_) => kleene_any(&values),
                    Constraint::Xor(_) => exact_count(&values, |n| n == 1),
                    _ => exact_count(&values, |n| n <= 1),
                };
                return self.finish(folded, subs, expected);
            }
            Constraint::Impl(p, q) => {
                let sp = p.eval(conf, None);
                let sq = q.eval(conf, None);
                let folded = kleene_any(&[sp.value.map(|v| !v), sq.value]);
                return self.finish(folded, vec![sp, sq], expected);
            }
            Constraint::Iff(p, q) => {
                let sp = p.eval(conf, None);
                let sq = q.eval(conf, None);
                let folded = match (sp.value, sq.value) {
                    (Some(a), Some(b)) => Some(a == b),
                    _ => None,
                };
                return self.finish(folded, vec![sp, sq], expected);
            }
            Constraint::Cmp { op, lhs, rhs } => {
                match (lhs.operand_value(conf), rhs.operand_value(conf)) {
                    (Ok(a), Ok(b)) => match a.compare(&b) {
                        Some(ord) => Some(op.apply(ord)),
                        None => {
                            let mut reason = ReasonTree::new(self.to_string());
                            reason.value_mismatch(self.to_string(), Some(a), Some(b));
                            return CtcResult::unknown(reason);
                        }
                    },
                    (Err(name), _) | (_, Err(name)) => {
                        let mut reason = ReasonTree::new(self.to_string());
                        reason.value_none(name);
                        return CtcResult::unknown(reason);
                    }
                }
            }
        };
        self.finish(computed, Vec::new(), expected)
    }

    fn finish(
        &self,
        computed: Option<bool>,
        subs: Vec<CtcResult>,
        expected: Option<bool>,
    ) -> CtcResult {
        let disagrees = match (computed, expected) {
            (Some(c), Some(e)) => c != e,
            (None, Some(_)) => true,
            _ => false,
        };
        if !disagrees {
            return CtcResult {
                value: computed,
                reason: None,
            };
        }
        let mut reason = ReasonTree::new(self.to_string());
        reason.value_mismatch(
            self.to_string(),
            expected.map(Value::Bool),
            computed.map(Value::Bool),
        );
        for sub in subs {
            if let Some(sub_reason) = sub.reason {
                reason.sub(sub_reason);
            }
        }
        CtcResult {
            value: computed,
            reason: Some(reason),
        }
    }
}

fn kleene_all(values: &[Option<bool>]) -> Option<bool> {
    if values.iter().any(|v| *v == Some(false)) {
        Some(false)
    } else if values.iter().any(Option::is_none) {
        None
    } else {
        Some(true)
    }
}

fn kleene_any(values: &[Option<bool>]) -> Option<bool> {
    if values.iter().any(|v| *v == Some(true)) {
        Some(true)
    } else if values.iter().any(Option::is_none) {
        None
    } else {
        Some(false)
    }
}

fn exact_count(values: &[Option<bool>], pred: impl Fn(usize) -> bool) -> Option<bool> {
    if values.iter().any(Option::is_none) {
        return None;
    }
    let n = values.iter().filter(|v| **v == Some(true)).count();
    Some(pred(n))
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Var { name, .. } => write!(f, "Var({})", name),
            Constraint::Lit(v) => write!(f, "Lit({})", v),
            Constraint::Not(inner) => write!(f, "Not({})", inner),
            Constraint::And(parts) => write!(f, "And({})", join(parts)),
            Constraint::Or(parts) => write!(f, "Or({})", join(parts)),
            Constraint::Xor(parts) => write!(f, "Xor({})", join(parts)),
            Constraint::Conflict(parts) => write!(f, "Conflict({})", join(parts)),
            Constraint::Impl(p, q) => write!(f, "Impl({}, {})", p, q),
            Constraint::Iff(p, q) => write!(f, "Iff({}, {})", p, q),
            Constraint::Cmp { op, lhs, rhs } => write!(f, "{}({}, {})", op, lhs, rhs),
        }
    }
}

fn join(parts: &[Constraint]) -> String {
    parts
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<&str> for Constraint {
    fn from(name: &str) -> Self {
        Constraint::var(name)
    }
}

impl From<bool> for Constraint {
    fn from(b: bool) -> Self {
        Constraint::Lit(Value::Bool(b))
    }
}

impl From<i64> for Constraint {
    fn from(i: i64) -> Self {
        Constraint::Lit(Value::Int(i))
    }
}

impl From<Value> for Constraint {
    fn from(v: Value) -> Self {
        Constraint::Lit(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fm::feature::{Feature, FeatureModel};

    fn model() -> FeatureModel {
        let root = Feature::and("Root").child("x").child("y");
        let model = FeatureModel::check(root);
        assert!(model.errors().is_empty());
        model
    }

    #[test]
    fn test_link_resolves_vars() {
        let m = model();
        let mut errors = DeclErrors::new();
        let linked = Constraint::implies("x", "y").link("Root", m.lookup(), &mut errors);
        assert!(errors.is_empty());
        match linked {
            Constraint::Impl(p, _) => match *p {
                Constraint::Var { resolved, .. } => assert!(resolved.is_some()),
                _ => panic!("expected Var"),
            },
            _ => panic!("expected Impl"),
        }
    }

    #[test]
    fn test_link_records_unresolved() {
        let m = model();
        let mut errors = DeclErrors::new();
        Constraint::var("ghost").link("Root", m.lookup(), &mut errors);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_impl_eval() {
        let m = model();
        let mut errors = DeclErrors::new();
        let ctc = Constraint::implies("x", "y").link("Root", m.lookup(), &mut errors);
        let (conf, link_errors) =
            m.link_config([("x", Value::Bool(true)), ("y", Value::Bool(false))]);
        assert!(link_errors.is_empty());
        let res = ctc.eval(&conf, Some(true));
        assert_eq!(res.value, Some(false));
        let reason = res.reason.expect("expected a reason");
        assert!(reason.reference.starts_with("Impl"));
    }

    #[test]
    fn test_unknown_on_missing_binding() {
        let m = model();
        let mut errors = DeclErrors::new();
        let ctc = Constraint::var("x").link("Root", m.lookup(), &mut errors);
        let (conf, _) = m.link_config([("y", Value::Bool(true))]);
        let res = ctc.eval(&conf, None);
        assert_eq!(res.value, None);
    }

    #[test]
    fn test_cross_domain_comparison_is_decl_error() {
        let root = Feature::and("Root")
            .attribute("size", AttributeSpec::int(0, 10))
            .attribute("label", AttributeSpec::string());
        let m = FeatureModel::check(root);
        assert!(m.errors().is_empty());
        let mut errors = DeclErrors::new();
        Constraint::lt("size", "label").link("Root", m.lookup(), &mut errors);
        assert!(errors
            .errors()
            .iter()
            .any(|e| matches!(e, DeclError::DomainMismatch { .. })));
    }
}
