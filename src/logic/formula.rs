//! Propositional formulas over interned atoms.
//!
//! Every logical type lowers to one of these; the subtype-relation store
//! contributes implication clauses. CNF lowering uses Tseitin variables
//! for nested structure.

use crate::core::AtomId;
use crate::logic::sat::Cnf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    True,
    False,
    Atom(AtomId),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

impl Formula {
    /// Conjunction with flattening and constant folding.
    pub fn and(parts: Vec<Formula>) -> Formula {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Formula::True => {}
                Formula::False => return Formula::False,
                Formula::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Formula::True,
            1 => flat.into_iter().next().unwrap(),
            _ => Formula::And(flat),
        }
    }

    /// Disjunction with flattening and constant folding.
    pub fn or(parts: Vec<Formula>) -> Formula {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Formula::False => {}
                Formula::True => return Formula::True,
                Formula::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Formula::False,
            1 => flat.into_iter().next().unwrap(),
            _ => Formula::Or(flat),
        }
    }

    pub fn not(inner: Formula) -> Formula {
        match inner {
            Formula::True => Formula::False,
            Formula::False => Formula::True,
            Formula::Not(f) => *f,
            other => Formula::Not(Box::new(other)),
        }
    }

    /// Whether the formula contains a negation anywhere. Checks with a
    /// negated side take the slow all-models subtype path.
    pub fn has_negation(&self) -> bool {
        match self {
            Formula::True | Formula::False | Formula::Atom(_) => false,
            Formula::Not(_) => true,
            Formula::And(parts) | Formula::Or(parts) => parts.iter().any(Formula::has_negation),
        }
    }

    pub fn atoms(&self, out: &mut Vec<AtomId>) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Atom(a) => {
                if !out.contains(a) {
                    out.push(*a);
                }
            }
            Formula::Not(inner) => inner.atoms(out),
            Formula::And(parts) | Formula::Or(parts) => {
                for part in parts {
                    part.atoms(out);
                }
            }
        }
    }

    /// Lower the formula into `cnf`, returning the literal that is
    /// equivalent to the formula. Atoms map to their own variables;
    /// compound sub-formulas get fresh Tseitin variables.
    pub fn to_lit(&self, cnf: &mut Cnf) -> i32 {
        match self {
            Formula::True => {
                let v = cnf.fresh_var();
                cnf.add_clause(&[v]);
                v
            }
            Formula::False => {
                let v = cnf.fresh_var();
                cnf.add_clause(&[-v]);
                v
            }
            Formula::Atom(a) => cnf.var_for_atom(*a),
            Formula::Not(inner) => -inner.to_lit(cnf),
            Formula::And(parts) => {
                let lits: Vec<i32> = parts.iter().map(|p| p.to_lit(cnf)).collect();
                let v = cnf.fresh_var();
                for &lit in &lits {
                    cnf.add_clause(&[-v, lit]);
                }
                let mut big: Vec<i32> = lits.iter().map(|l| -l).collect();
                big.push(v);
                cnf.add_clause(&big);
                v
            }
            Formula::Or(parts) => {
                let lits: Vec<i32> = parts.iter().map(|p| p.to_lit(cnf)).collect();
                let v = cnf.fresh_var();
                for &lit in &lits {
                    cnf.add_clause(&[v, -lit]);
                }
                let mut big = lits;
                big.push(-v);
                cnf.add_clause(&big);
                v
            }
        }
    }

    /// Assert the formula true at the top level of `cnf`, avoiding
    /// Tseitin variables where a direct clause shape exists.
    pub fn assert_true(&self, cnf: &mut Cnf) {
        match self {
            Formula::True => {}
            Formula::False => cnf.add_clause(&[]),
            Formula::Atom(a) => {
                let v = cnf.var_for_atom(*a);
                cnf.add_clause(&[v]);
            }
            Formula::Not(inner) => inner.assert_false(cnf),
            Formula::And(parts) => {
                for part in parts {
                    part.assert_true(cnf);
                }
            }
            Formula::Or(parts) => {
                let lits: Vec<i32> = parts.iter().map(|p| p.to_lit(cnf)).collect();
                cnf.add_clause(&lits);
            }
        }
    }

    pub fn assert_false(&self, cnf: &mut Cnf) {
        match self {
            Formula::True => cnf.add_clause(&[]),
            Formula::False => {}
            Formula::Atom(a) => {
                let v = cnf.var_for_atom(*a);
                cnf.add_clause(&[-v]);
            }
            Formula::Not(inner) => inner.assert_true(cnf),
            // ¬(p ∧ q) is the single clause (¬p ∨ ¬q) when parts are flat
            Formula::And(parts) => {
                let lits: Vec<i32> = parts.iter().map(|p| p.to_lit(cnf)).collect();
                let negated: Vec<i32> = lits.iter().map(|l| -l).collect();
                cnf.add_clause(&negated);
            }
            Formula::Or(parts) => {
                for part in parts {
                    part.assert_false(cnf);
                }
            }
        }
    }
}
