//! A small DPLL satisfiability kernel.
//!
//! Sized for feature models and subtype formulas: variables are in the
//! hundreds at most, so unit propagation plus chronological backtracking
//! is enough. All-models enumeration (needed by the slow subtype path)
//! works by adding blocking clauses over the variables of interest.

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::core::AtomId;

pub type Clause = SmallVec<[i32; 4]>;
pub type Model = Vec<bool>;

/// A CNF under construction. Literals are signed 1-indexed variables.
#[derive(Debug, Clone, Default)]
pub struct Cnf {
    num_vars: i32,
    clauses: Vec<Clause>,
    atom_vars: HashMap<AtomId, i32>,
}

impl Cnf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_var(&mut self) -> i32 {
        self.num_vars += 1;
        self.num_vars
    }

    /// Variable standing for an interned atom, allocated on first use.
    pub fn var_for_atom(&mut self, atom: AtomId) -> i32 {
        if let Some(&v) = self.atom_vars.get(&atom) {
            return v;
        }
        let v = self.fresh_var();
        self.atom_vars.insert(atom, v);
        v
    }

    pub fn atom_var(&self, atom: AtomId) -> Option<i32> {
        self.atom_vars.get(&atom).copied()
    }

    pub fn atom_vars(&self) -> impl Iterator<Item = (AtomId, i32)> + '_ {
        self.atom_vars.iter().map(|(&a, &v)| (a, v))
    }

    pub fn add_clause(&mut self, lits: &[i32]) {
        self.clauses.push(SmallVec::from_slice(lits));
    }

    pub fn num_vars(&self) -> i32 {
        self.num_vars
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }
}

/// DPLL solver over a snapshot of a `Cnf`.
pub struct Solver {
    num_vars: usize,
    clauses: Vec<Clause>,
}

impl Solver {
    pub fn new(cnf: &Cnf) -> Self {
        Self {
            num_vars: cnf.num_vars as usize,
            clauses: cnf.clauses().to_vec(),
        }
    }

    pub fn with_clauses(num_vars: usize, clauses: Vec<Clause>) -> Self {
        Self { num_vars, clauses }
    }

    /// Solve under the given assumption literals. Returns an assignment
    /// indexed by variable (1-based variable v at index v-1), or None if
    /// unsatisfiable.
    pub fn solve(&self, assumptions: &[i32]) -> Option<Model> {
        let mut assign: Vec<Option<bool>> = vec![None; self.num_vars];
        for &lit in assumptions {
            let var = lit.unsigned_abs() as usize;
            if var == 0 || var > self.num_vars {
                continue;
            }
            let value = lit > 0;
            match assign[var - 1] {
                Some(existing) if existing != value => return None,
                _ => assign[var - 1] = Some(value),
            }
        }
        if self.dpll(&mut assign) {
            Some(assign.into_iter().map(|v| v.unwrap_or(false)).collect())
        } else {
            None
        }
    }

    pub fn is_satisfiable(&self, assumptions: &[i32]) -> bool {
        self.solve(assumptions).is_some()
    }

    /// Enumerate every satisfying assignment projected onto `vars`
    /// (1-based variable numbers). Distinct projections only.
    pub fn all_models(&self, assumptions: &[i32], vars: &[i32]) -> Vec<HashMap<i32, bool>> {
        let mut solver = Solver {
            num_vars: self.num_vars,
            clauses: self.clauses.clone(),
        };
        let mut models = Vec::new();
        while let Some(model) = solver.solve(assumptions) {
            let projected: HashMap<i32, bool> = vars
                .iter()
                .filter(|&&v| v >= 1 && (v as usize) <= model.len())
                .map(|&v| (v, model[v as usize - 1]))
                .collect();
            // Block this projection and continue.
            let blocking: Clause = projected
                .iter()
                .map(|(&v, &val)| if val { -v } else { v })
                .collect();
            models.push(projected);
            if blocking.is_empty() {
                break;
            }
            solver.clauses.push(blocking);
        }
        models
    }

    fn dpll(&self, assign: &mut Vec<Option<bool>>) -> bool {
        // Unit propagation to fixpoint.
        loop {
            let mut propagated = false;
            for clause in &self.clauses {
                let mut unassigned: Option<i32> = None;
                let mut satisfied = false;
                let mut open = 0usize;
                for &lit in clause {
                    let var = lit.unsigned_abs() as usize;
                    match assign.get(var - 1).copied().flatten() {
                        Some(value) => {
                            if value == (lit > 0) {
                                satisfied = true;
                                break;
                            }
                        }
                        None => {
                            open += 1;
                            unassigned = Some(lit);
                        }
                    }
                }
                if satisfied {
                    continue;
                }
                match open {
                    0 => return false, // conflict
                    1 => {
                        let lit = unassigned.unwrap();
                        assign[lit.unsigned_abs() as usize - 1] = Some(lit > 0);
                        propagated = true;
                    }
                    _ => {}
                }
            }
            if !propagated {
                break;
            }
        }

        // Pick the first unassigned variable and branch.
        let next = match assign.iter().position(Option::is_none) {
            Some(i) => i,
            None => return true,
        };
        for value in [true, false] {
            let mut trial = assign.clone();
            trial[next] = Some(value);
            if self.dpll(&mut trial) {
                *assign = trial;
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cnf(clauses: &[&[i32]], num_vars: i32) -> Cnf {
        let mut c = Cnf::new();
        while c.num_vars() < num_vars {
            c.fresh_var();
        }
        for clause in clauses {
            c.add_clause(clause);
        }
        c
    }

    #[test]
    fn test_simple_sat() {
        let c = cnf(&[&[1, 2], &[-1, 2]], 2);
        let model = Solver::new(&c).solve(&[]).unwrap();
        assert!(model[1]); // 2 must be true
    }

    #[test]
    fn test_unsat() {
        let c = cnf(&[&[1], &[-1]], 1);
        assert!(Solver::new(&c).solve(&[]).is_none());
    }

    #[test]
    fn test_assumptions() {
        let c = cnf(&[&[1, 2]], 2);
        assert!(Solver::new(&c).is_satisfiable(&[-1]));
        assert!(!Solver::new(&c).is_satisfiable(&[-1, -2]));
    }

    #[test]
    fn test_all_models_projection() {
        // x1 xor x2 style: exactly one of two.
        let c = cnf(&[&[1, 2], &[-1, -2]], 2);
        let models = Solver::new(&c).all_models(&[], &[1, 2]);
        assert_eq!(models.len(), 2);
        assert!(models.iter().any(|m| m[&1] && !m[&2]));
        assert!(models.iter().any(|m| !m[&1] && m[&2]));
    }
}
