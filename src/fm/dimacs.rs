//! DIMACS CNF export.
//!
//! Variables are positive integers allocated root-first in tree order.
//! Group clauses range over the children of each feature; every CTC is
//! asserted at the top level, with clause-level simplification so that a
//! negated conjunction of literals becomes a single clause and Tseitin
//! variables appear only for genuinely nested structure. Models that
//! carry attributes are rejected.

use std::collections::HashMap;
use std::fmt;

use smallvec::SmallVec;

use crate::errors::ModelError;
use crate::fm::config::Configuration;
use crate::fm::constraint::Constraint;
use crate::fm::feature::{FeatureModel, GroupKind, LinkedFeature, SymbolId};
use crate::logic::sat::{Clause, Solver};

/// A literal-or-constant produced while translating a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimacsLit {
    True,
    False,
    Lit(i32),
}

impl DimacsLit {
    fn negate(self) -> DimacsLit {
        match self {
            DimacsLit::True => DimacsLit::False,
            DimacsLit::False => DimacsLit::True,
            DimacsLit::Lit(l) => DimacsLit::Lit(-l),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dimacs {
    next_var: i32,
    vars: HashMap<SymbolId, i32>,
    comments: Vec<String>,
    clauses: Vec<Clause>,
}

impl Dimacs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variable for a feature symbol, allocated on first use.
    pub fn var(&mut self, id: SymbolId) -> i32 {
        if let Some(&v) = self.vars.get(&id) {
            return v;
        }
        self.next_var += 1;
        self.vars.insert(id, self.next_var);
        self.next_var
    }

    /// Fresh Tseitin variable for a compound sub-formula.
    pub fn fresh(&mut self) -> i32 {
        self.next_var += 1;
        self.next_var
    }

    pub fn add_comment(&mut self, text: impl Into<String>) {
        self.comments.push(text.into());
    }

    pub fn add_clause(&mut self, lits: &[i32]) {
        self.clauses.push(SmallVec::from_slice(lits));
    }

    pub fn num_vars(&self) -> i32 {
        self.next_var
    }

    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn var_of(&self, id: SymbolId) -> Option<i32> {
        self.vars.get(&id).copied()
    }

    /// Assumption literals for the feature bindings of a configuration.
    pub fn assumption_lits(&self, conf: &Configuration) -> Vec<i32> {
        let mut lits = Vec::new();
        for (id, binding) in conf.iter() {
            if let (Some(&v), Some(b)) = (self.vars.get(&id), binding.value.as_bool()) {
                lits.push(if b { v } else { -v });
            }
        }
        lits
    }

    pub fn is_satisfiable(&self, assumptions: &[i32]) -> bool {
        Solver::with_clauses(self.next_var as usize, self.clauses.to_vec())
            .is_satisfiable(assumptions)
    }

    pub fn all_models(&self, vars: &[i32]) -> Vec<HashMap<i32, bool>> {
        Solver::with_clauses(self.next_var as usize, self.clauses.to_vec()).all_models(&[], vars)
    }
}

impl fmt::Display for Dimacs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for comment in &self.comments {
            writeln!(f, "c {}", comment)?;
        }
        writeln!(f, "p cnf {} {}", self.next_var, self.clauses.len())?;
        for clause in &self.clauses {
            for lit in clause {
                write!(f, "{} ", lit)?;
            }
            writeln!(f, "0")?;
        }
        Ok(())
    }
}

impl Constraint {
    /// Translate to a literal, adding Tseitin definitions for compound
    /// sub-expressions. Constant sub-results are folded away.
    pub fn add_to_dimacs(&self, d: &mut Dimacs) -> Result<DimacsLit, ModelError> {
        match self {
            Constraint::Var { name, resolved } => match resolved {
                Some(id) => Ok(DimacsLit::Lit(d.var(*id))),
                None => Err(ModelError::UnsupportedConstraint {
                    constraint: format!("unlinked Var({})", name),
                }),
            },
            Constraint::Lit(v) => Ok(if v.truthy() {
                DimacsLit::True
            } else {
                DimacsLit::False
            }),
            Constraint::Not(inner) => Ok(inner.add_to_dimacs(d)?.negate()),
            Constraint::And(parts) => {
                let lits = collect_lits(parts, d)?;
                if lits.falses > 0 {
                    return Ok(DimacsLit::False);
                }
                Ok(define_conjunction(&lits.lits, d))
            }
            Constraint::Or(parts) => {
                let lits = collect_lits(parts, d)?;
                if lits.trues > 0 {
                    return Ok(DimacsLit::True);
                }
                Ok(define_disjunction(&lits.lits, d))
            }
            Constraint::Xor(parts) => {
                let lits = collect_lits(parts, d)?;
                match lits.trues {
                    0 => Ok(define_exactly_one(&lits.lits, d)),
                    1 => {
                        let negated: Vec<i32> = lits.lits.iter().map(|l| -l).collect();
                        Ok(define_conjunction(&negated, d))
                    }
                    _ => Ok(DimacsLit::False),
                }
            }
            Constraint::Conflict(parts) => {
                let lits = collect_lits(parts, d)?;
                match lits.trues {
                    0 => Ok(define_at_most_one(&lits.lits, d)),
                    1 => {
                        let negated: Vec<i32> = lits.lits.iter().map(|l| -l).collect();
                        Ok(define_conjunction(&negated, d))
                    }
                    _ => Ok(DimacsLit::False),
                }
            }
            Constraint::Impl(p, q) => {
                let lp = p.add_to_dimacs(d)?;
                let lq = q.add_to_dimacs(d)?;
                match (lp, lq) {
                    (DimacsLit::False, _) | (_, DimacsLit::True) => Ok(DimacsLit::True),
                    (DimacsLit::True, lq) => Ok(lq),
                    (lp, DimacsLit::False) => Ok(lp.negate()),
                    (DimacsLit::Lit(p), DimacsLit::Lit(q)) => {
                        let v = d.fresh();
                        d.add_clause(&[-v, -p, q]);
                        d.add_clause(&[v, p]);
                        d.add_clause(&[v, -q]);
                        Ok(DimacsLit::Lit(v))
                    }
                }
            }
            Constraint::Iff(p, q) => {
                let lp = p.add_to_dimacs(d)?;
                let lq = q.add_to_dimacs(d)?;
                match (lp, lq) {
                    (DimacsLit::True, lq) => Ok(lq),
                    (lp, DimacsLit::True) => Ok(lp),
                    (DimacsLit::False, lq) => Ok(lq.negate()),
                    (lp, DimacsLit::False) => Ok(lp.negate()),
                    (DimacsLit::Lit(p), DimacsLit::Lit(q)) => {
                        let v = d.fresh();
                        d.add_clause(&[-v, -p, q]);
                        d.add_clause(&[-v, p, -q]);
                        d.add_clause(&[v, p, q]);
                        d.add_clause(&[v, -p, -q]);
                        Ok(DimacsLit::Lit(v))
                    }
                }
            }
            Constraint::Cmp { .. } => Err(ModelError::UnsupportedConstraint {
                constraint: self.to_string(),
            }),
        }
    }

    /// Assert the constraint true at the top level, preferring direct
    /// clause shapes over Tseitin definitions.
    pub fn assert_into(&self, d: &mut Dimacs) -> Result<(), ModelError> {
        match self {
            Constraint::Lit(v) => {
                if !v.truthy() {
                    d.add_clause(&[]);
                }
                Ok(())
            }
            Constraint::Var { .. } => {
                if let DimacsLit::Lit(l) = self.add_to_dimacs(d)? {
                    d.add_clause(&[l]);
                }
                Ok(())
            }
            Constraint::Not(inner) => inner.assert_false_into(d),
            Constraint::And(parts) => {
                for part in parts {
                    part.assert_into(d)?;
                }
                Ok(())
            }
            Constraint::Or(parts) => {
                let lits = collect_lits(parts, d)?;
                if lits.trues == 0 {
                    d.add_clause(&lits.lits);
                }
                Ok(())
            }
            Constraint::Impl(p, q) => {
                let lp = p.add_to_dimacs(d)?;
                let lq = q.add_to_dimacs(d)?;
                match (lp, lq) {
                    (DimacsLit::False, _) | (_, DimacsLit::True) => {}
                    (DimacsLit::True, DimacsLit::False) => d.add_clause(&[]),
                    (DimacsLit::True, DimacsLit::Lit(q)) => d.add_clause(&[q]),
                    (DimacsLit::Lit(p), DimacsLit::False) => d.add_clause(&[-p]),
                    (DimacsLit::Lit(p), DimacsLit::Lit(q)) => d.add_clause(&[-p, q]),
                }
                Ok(())
            }
            Constraint::Iff(p, q) => {
                let lp = p.add_to_dimacs(d)?;
                let lq = q.add_to_dimacs(d)?;
                match (lp, lq) {
                    (DimacsLit::True, DimacsLit::True) | (DimacsLit::False, DimacsLit::False) => {}
                    (DimacsLit::True, DimacsLit::False) | (DimacsLit::False, DimacsLit::True) => {
                        d.add_clause(&[])
                    }
                    (DimacsLit::True, DimacsLit::Lit(l)) | (DimacsLit::Lit(l), DimacsLit::True) => {
                        d.add_clause(&[l])
                    }
                    (DimacsLit::False, DimacsLit::Lit(l))
                    | (DimacsLit::Lit(l), DimacsLit::False) => d.add_clause(&[-l]),
                    (DimacsLit::Lit(p), DimacsLit::Lit(q)) => {
                        d.add_clause(&[-p, q]);
                        d.add_clause(&[p, -q]);
                    }
                }
                Ok(())
            }
            Constraint::Conflict(parts) => {
                let lits = collect_lits(parts, d)?;
                if lits.trues > 1 {
                    d.add_clause(&[]);
                    return Ok(());
                }
                if lits.trues == 1 {
                    for &l in &lits.lits {
                        d.add_clause(&[-l]);
                    }
                    return Ok(());
                }
                for (i, &a) in lits.lits.iter().enumerate() {
                    for &b in &lits.lits[..i] {
                        d.add_clause(&[-b, -a]);
                    }
                }
                Ok(())
            }
            Constraint::Xor(parts) => {
                let lits = collect_lits(parts, d)?;
                match lits.trues {
                    0 => {
                        d.add_clause(&lits.lits);
                        for (i, &a) in lits.lits.iter().enumerate() {
                            for &b in &lits.lits[..i] {
                                d.add_clause(&[-b, -a]);
                            }
                        }
                    }
                    1 => {
                        for &l in &lits.lits {
                            d.add_clause(&[-l]);
                        }
                    }
                    _ => d.add_clause(&[]),
                }
                Ok(())
            }
            Constraint::Cmp { .. } => Err(ModelError::UnsupportedConstraint {
                constraint: self.to_string(),
            }),
        }
    }

    fn assert_false_into(&self, d: &mut Dimacs) -> Result<(), ModelError> {
        match self {
            Constraint::Lit(v) => {
                if v.truthy() {
                    d.add_clause(&[]);
                }
                Ok(())
            }
            Constraint::Var { .. } => {
                if let DimacsLit::Lit(l) = self.add_to_dimacs(d)? {
                    d.add_clause(&[-l]);
                }
                Ok(())
            }
            Constraint::Not(inner) => inner.assert_into(d),
            // The negation of a conjunction is one clause of negated
            // literals.
            Constraint::And(parts) => {
                let lits = collect_lits(parts, d)?;
                if lits.falses == 0 {
                    let negated: Vec<i32> = lits.lits.iter().map(|l| -l).collect();
                    d.add_clause(&negated);
                }
                Ok(())
            }
            Constraint::Or(parts) => {
                for part in parts {
                    part.assert_false_into(d)?;
                }
                Ok(())
            }
            Constraint::Impl(p, q) => {
                p.assert_into(d)?;
                q.assert_false_into(d)
            }
            Constraint::Iff(p, q) => {
                let lp = p.add_to_dimacs(d)?;
                let lq = q.add_to_dimacs(d)?;
                match (lp, lq) {
                    (DimacsLit::True, DimacsLit::False) | (DimacsLit::False, DimacsLit::True) => {}
                    (DimacsLit::True, DimacsLit::True) | (DimacsLit::False, DimacsLit::False) => {
                        d.add_clause(&[])
                    }
                    (DimacsLit::True, DimacsLit::Lit(l)) | (DimacsLit::Lit(l), DimacsLit::True) => {
                        d.add_clause(&[-l])
                    }
                    (DimacsLit::False, DimacsLit::Lit(l))
                    | (DimacsLit::Lit(l), DimacsLit::False) => d.add_clause(&[l]),
                    (DimacsLit::Lit(p), DimacsLit::Lit(q)) => {
                        d.add_clause(&[p, q]);
                        d.add_clause(&[-p, -q]);
                    }
                }
                Ok(())
            }
            _ => {
                match self.add_to_dimacs(d)? {
                    DimacsLit::True => d.add_clause(&[]),
                    DimacsLit::False => {}
                    DimacsLit::Lit(l) => d.add_clause(&[-l]),
                }
                Ok(())
            }
        }
    }
}

struct CollectedLits {
    lits: Vec<i32>,
    trues: usize,
    falses: usize,
}

fn collect_lits(parts: &[Constraint], d: &mut Dimacs) -> Result<CollectedLits, ModelError> {
    let mut out = CollectedLits {
        lits: Vec::with_capacity(parts.len()),
        trues: 0,
        falses: 0,
    };
    for part in parts {
        match part.add_to_dimacs(d)? {
            DimacsLit::True => out.trues += 1,
            DimacsLit::False => out.falses += 1,
            DimacsLit::Lit(l) => out.lits.push(l),
        }
    }
    Ok(out)
}

fn define_conjunction(lits: &[i32], d: &mut Dimacs) -> DimacsLit {
    match lits.len() {
        0 => DimacsLit::True,
        1 => DimacsLit::Lit(lits[0]),
        _ => {
            let v = d.fresh();
            for &l in lits {
                d.add_clause(&[-v, l]);
            }
            let mut big: Vec<i32> = lits.iter().map(|l| -l).collect();
            big.push(v);
            d.add_clause(&big);
            DimacsLit::Lit(v)
        }
    }
}

fn define_disjunction(lits: &[i32], d: &mut Dimacs) -> DimacsLit {
    match lits.len() {
        0 => DimacsLit::False,
        1 => DimacsLit::Lit(lits[0]),
        _ => {
            let v = d.fresh();
            for &l in lits {
                d.add_clause(&[v, -l]);
            }
            let mut big: Vec<i32> = lits.to_vec();
            big.push(-v);
            d.add_clause(&big);
            DimacsLit::Lit(v)
        }
    }
}

fn define_exactly_one(lits: &[i32], d: &mut Dimacs) -> DimacsLit {
    match lits.len() {
        0 => DimacsLit::False,
        1 => DimacsLit::Lit(lits[0]),
        _ => {
            let v = d.fresh();
            for (i, &a) in lits.iter().enumerate() {
                d.add_clause(&[v, -a]);
                for &b in &lits[..i] {
                    d.add_clause(&[-b, -a]);
                }
            }
            let mut big: Vec<i32> = lits.to_vec();
            big.push(-v);
            d.add_clause(&big);
            DimacsLit::Lit(v)
        }
    }
}

fn define_at_most_one(lits: &[i32], d: &mut Dimacs) -> DimacsLit {
    if lits.len() <= 1 {
        return DimacsLit::True;
    }
    let v = d.fresh();
    for (i, &a) in lits.iter().enumerate() {
        d.add_clause(&[v, -a]);
        for &b in &lits[..i] {
            d.add_clause(&[-b, -a]);
        }
    }
    DimacsLit::Lit(v)
}

impl FeatureModel {
    /// Translate the model into DIMACS CNF. Rejected for ill-defined
    /// models and for models carrying attributes.
    pub fn to_dimacs(&self) -> Result<Dimacs, ModelError> {
        self.ensure_well_defined()?;
        if self.has_attributes() {
            return Err(ModelError::AttributesUnsupported);
        }
        let mut d = Dimacs::new();
        let root = self.root();
        let vroot = d.var(root.id);
        if root.name.is_some() {
            let path = self.lookup().path(root.id).to_string();
            d.add_comment(format!("{} -> {}", path, vroot));
        }
        // The root is asserted.
        d.add_clause(&[vroot]);
        self.emit_node(root, &mut d)?;
        Ok(d)
    }

    fn emit_node(&self, node: &LinkedFeature, d: &mut Dimacs) -> Result<(), ModelError> {
        let v = d.var(node.id);
        let mut child_vars = Vec::with_capacity(node.children.len());
        for child in &node.children {
            let vc = d.var(child.id);
            if child.name.is_some() {
                let path = self.lookup().path(child.id).to_string();
                d.add_comment(format!("{} -> {}", path, vc));
            }
            child_vars.push(vc);
        }
        match node.kind {
            GroupKind::And => {
                for &vc in &child_vars {
                    d.add_clause(&[v, -vc]);
                    d.add_clause(&[-v, vc]);
                }
            }
            GroupKind::Any => {
                for &vc in &child_vars {
                    d.add_clause(&[v, -vc]);
                }
            }
            GroupKind::Or => {
                for &vc in &child_vars {
                    d.add_clause(&[v, -vc]);
                }
                if !child_vars.is_empty() {
                    let mut big = child_vars.clone();
                    big.push(-v);
                    d.add_clause(&big);
                }
            }
            GroupKind::Xor => {
                for (i, &vc) in child_vars.iter().enumerate() {
                    d.add_clause(&[v, -vc]);
                    for &prev in &child_vars[..i] {
                        d.add_clause(&[-prev, -vc]);
                    }
                }
                if !child_vars.is_empty() {
                    let mut big = child_vars.clone();
                    big.push(-v);
                    d.add_clause(&big);
                }
            }
        }
        for ctc in &node.ctcs {
            ctc.assert_into(d)?;
        }
        for child in &node.children {
            self.emit_node(child, d)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fm::attribute::AttributeSpec;
    use crate::fm::feature::Feature;

    #[test]
    fn test_attributes_rejected() {
        let root = Feature::and("Root").attribute("size", AttributeSpec::int(0, 10));
        let model = FeatureModel::check(root);
        assert!(matches!(
            model.to_dimacs(),
            Err(ModelError::AttributesUnsupported)
        ));
    }

    #[test]
    fn test_and_group_clauses() {
        let root = Feature::and("Root").child("a");
        let model = FeatureModel::check(root);
        let d = model.to_dimacs().unwrap();
        assert_eq!(d.num_vars(), 2);
        // root assert + parent<=>child
        assert_eq!(d.num_clauses(), 3);
        assert!(d.is_satisfiable(&[]));
        assert!(!d.is_satisfiable(&[-2]));
    }

    #[test]
    fn test_ctc_no_tseitin_for_negated_conjunction() {
        let root = Feature::or("Root")
            .child("a")
            .child("b")
            .ctc(Constraint::not(Constraint::and(["a", "b"])));
        let model = FeatureModel::check(root);
        let d = model.to_dimacs().unwrap();
        assert_eq!(d.num_vars(), 3);
        let mut clauses: Vec<Vec<i32>> = d
            .clauses()
            .iter()
            .map(|c| {
                let mut v: Vec<i32> = c.to_vec();
                v.sort_unstable();
                v
            })
            .collect();
        clauses.sort();
        let mut expected = vec![
            vec![1],
            vec![-1, 2, 3],
            vec![-2, 1],
            vec![-3, 1],
            vec![-3, -2],
        ];
        for c in &mut expected {
            c.sort_unstable();
        }
        expected.sort();
        assert_eq!(clauses, expected);
    }

    #[test]
    fn test_dimacs_text_format() {
        let root = Feature::and("Root").child("a");
        let model = FeatureModel::check(root);
        let d = model.to_dimacs().unwrap();
        let text = d.to_string();
        assert!(text.contains("c Root -> 1"));
        assert!(text.contains("c Root.a -> 2"));
        assert!(text.contains("p cnf 2 3"));
        assert!(text.lines().any(|l| l == "1 0"));
    }

    #[test]
    fn test_tseitin_for_nested_ctc() {
        // Impl over an Or needs a definition variable for the Or.
        let root = Feature::and("Root")
            .child("a")
            .child("b")
            .child("c")
            .ctc(Constraint::implies(
                Constraint::or(["a", "b"]),
                Constraint::var("c"),
            ));
        let model = FeatureModel::check(root);
        let d = model.to_dimacs().unwrap();
        assert!(d.num_vars() > 4);
        assert!(d.is_satisfiable(&[]));
    }
}
