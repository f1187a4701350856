//! Logical types: type constructors whose instance and subclass checks
//! reduce to propositional reasoning over a subtype-relation formula.
//!
//! Every constructor lowers to a `Formula` over interned atoms
//! (`type:<fqname>`, `instance:function`, `instance:literal:<v>`). The
//! subtype relation is a monotonically growing set of atom implications
//! seeded from observed class bases. `TypeMatching` is a side channel
//! that matches on class names and never touches the store.

use std::fmt;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use petgraph::graphmap::DiGraphMap;

use crate::core::intern;
use crate::core::value::Value;
use crate::core::AtomId;
use crate::logic::formula::Formula;
use crate::logic::sat::{Cnf, Solver};

/// Advisory signature carried by `Function` types. All `Function` types
/// are equivalent to the subtype checker regardless of this field; it is
/// used only when rendering (kept from the source behavior, see
/// DESIGN.md).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionSig {
    pub params: Vec<String>,
    pub doc: Option<String>,
}

/// A logical type.
#[derive(Debug, Clone, PartialEq)]
pub enum Ty {
    Any,
    Never,
    /// Concrete user type identified by fully qualified name.
    Class(String),
    Union(Vec<Ty>),
    Intersection(Vec<Ty>),
    /// Negation. Constructing one routes every containing check through
    /// the slower all-models path.
    Not(Box<Ty>),
    /// Inhabited by exactly one value; instance check is value equality.
    Literal(Value),
    /// All callables; the signature is advisory only.
    Function(Option<FunctionSig>),
    /// Matches any class whose fully qualified name, or any base's name,
    /// matches the regex. Does not interact with the subtype store.
    TypeMatching(String),
    /// A type decorated with a name and documentation; logically the
    /// same as the enclosed type.
    Parameter {
        name: String,
        ty: Box<Ty>,
        desc: String,
    },
}

impl Ty {
    pub fn class(name: impl Into<String>) -> Ty {
        Ty::Class(name.into())
    }

    pub fn int() -> Ty {
        Ty::Class("builtins.int".into())
    }

    pub fn float() -> Ty {
        Ty::Class("builtins.float".into())
    }

    pub fn bool_() -> Ty {
        Ty::Class("builtins.bool".into())
    }

    pub fn str_() -> Ty {
        Ty::Class("builtins.str".into())
    }

    pub fn list() -> Ty {
        Ty::Class("builtins.list".into())
    }

    pub fn none() -> Ty {
        Ty::Literal(Value::None)
    }

    pub fn union(types: Vec<Ty>) -> Ty {
        Ty::Union(types)
    }

    pub fn intersection(types: Vec<Ty>) -> Ty {
        Ty::Intersection(types)
    }

    /// `Optional(T)` is `Union(T, Literal(None))`; parameters annotated
    /// with it are auto-none for the dispatcher's default filling.
    pub fn optional(ty: Ty) -> Ty {
        Ty::Union(vec![ty, Ty::none()])
    }

    pub fn negation(ty: Ty) -> Ty {
        Ty::Not(Box::new(ty))
    }

    pub fn literal(value: impl Into<Value>) -> Ty {
        Ty::Literal(value.into())
    }

    pub fn function() -> Ty {
        Ty::Function(None)
    }

    pub fn matching(pattern: impl Into<String>) -> Ty {
        Ty::TypeMatching(pattern.into())
    }

    pub fn parameter(name: impl Into<String>, ty: Ty, desc: impl Into<String>) -> Ty {
        Ty::Parameter {
            name: name.into(),
            ty: Box::new(ty),
            desc: desc.into(),
        }
    }

    /// The "auto-none" marker consulted by the overload dispatcher:
    /// `Optional`-built unions and `Parameter` annotations get a `None`
    /// default when none was declared.
    pub fn auto_none(&self) -> bool {
        match self {
            Ty::Parameter { .. } => true,
            Ty::Union(types) => types.iter().any(|t| matches!(t, Ty::Literal(Value::None))),
            _ => false,
        }
    }

    /// Lower to a propositional formula over atoms.
    pub fn formula(&self) -> Formula {
        match self {
            Ty::Any => Formula::True,
            Ty::Never => Formula::False,
            Ty::Class(name) => Formula::Atom(class_atom(name)),
            Ty::Union(types) => Formula::or(types.iter().map(Ty::formula).collect()),
            Ty::Intersection(types) => Formula::and(types.iter().map(Ty::formula).collect()),
            Ty::Not(inner) => Formula::not(inner.formula()),
            Ty::Literal(value) => Formula::Atom(literal_atom(value)),
            Ty::Function(_) => Formula::Atom(function_atom()),
            // Inert atom: the matching semantics live outside the store.
            Ty::TypeMatching(pattern) => {
                Formula::Atom(intern::intern(&format!("instance:matching:{}", pattern)))
            }
            Ty::Parameter { ty, .. } => ty.formula(),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Any => write!(f, "Any"),
            Ty::Never => write!(f, "Never"),
            Ty::Class(name) => write!(f, "{}", short_name(name)),
            Ty::Union(types) => {
                let parts: Vec<String> = types.iter().map(|t| t.to_string()).collect();
                write!(f, "Union({})", parts.join(", "))
            }
            Ty::Intersection(types) => {
                let parts: Vec<String> = types.iter().map(|t| t.to_string()).collect();
                write!(f, "Intersection({})", parts.join(", "))
            }
            Ty::Not(inner) => write!(f, "Not({})", inner),
            Ty::Literal(value) => write!(f, "Literal({})", value),
            Ty::Function(_) => write!(f, "Function"),
            Ty::TypeMatching(pattern) => write!(f, "/{}/", pattern),
            Ty::Parameter { name, ty, .. } => write!(f, "P({}: {})", name, ty),
        }
    }
}

fn short_name(name: &str) -> &str {
    name.strip_prefix("builtins.").unwrap_or(name)
}

pub(crate) fn class_atom(name: &str) -> AtomId {
    intern::intern(&format!("type:{}", name))
}

pub(crate) fn literal_atom(value: &Value) -> AtomId {
    intern::intern(&format!("instance:literal:{}", value))
}

pub(crate) fn function_atom() -> AtomId {
    intern::intern("instance:function")
}

/// Monotonic store of observed subtype relations between type atoms.
///
/// Concurrent readers are safe; writers serialize on the inner lock.
/// Operations take the store explicitly; `TypeStore::global()` is the
/// process-wide convenience instance.
pub struct TypeStore {
    rel: RwLock<DiGraphMap<AtomId, ()>>,
    bases: DashMap<String, Vec<String>>,
}

static GLOBAL_STORE: Lazy<TypeStore> = Lazy::new(TypeStore::new);

impl TypeStore {
    pub fn new() -> Self {
        let store = Self {
            rel: RwLock::new(DiGraphMap::new()),
            bases: DashMap::new(),
        };
        // NoneType's only inhabitant is the literal None, and every
        // callable is an instance:function. Seeding these keeps
        // isinstance and issubclass aligned for Optional and Function.
        store.add_implication(class_atom("builtins.NoneType"), literal_atom(&Value::None));
        store.add_implication(class_atom("builtins.function"), function_atom());
        store.observe_class("builtins.bool", &["builtins.int"]);
        store
    }

    pub fn global() -> &'static TypeStore {
        &GLOBAL_STORE
    }

    /// Record a class and its structural bases. Entries are only added;
    /// existing entries remain sound.
    pub fn observe_class(&self, name: &str, bases: &[&str]) {
        {
            let mut known = self.bases.entry(name.to_string()).or_default();
            for base in bases {
                if !known.iter().any(|b| b.as_str() == *base) {
                    known.push(base.to_string());
                }
            }
        }
        for base in bases {
            self.add_implication(class_atom(name), class_atom(base));
        }
    }

    fn add_implication(&self, from: AtomId, to: AtomId) {
        self.rel.write().add_edge(from, to, ());
    }

    /// Name plus transitive bases, breadth-first.
    pub fn mro(&self, name: &str) -> Vec<String> {
        let mut out = vec![name.to_string()];
        let mut i = 0;
        while i < out.len() {
            if let Some(bases) = self.bases.get(&out[i]) {
                for base in bases.iter() {
                    if !out.contains(base) {
                        out.push(base.clone());
                    }
                }
            }
            i += 1;
        }
        out
    }

    fn assert_relation(&self, cnf: &mut Cnf) {
        let rel = self.rel.read();
        for (from, to, _) in rel.all_edges() {
            let vf = cnf.var_for_atom(from);
            let vt = cnf.var_for_atom(to);
            cnf.add_clause(&[-vf, vt]);
        }
    }

    /// `issubclass(sub, sup)`: does the formula of `sub`, under the
    /// subtype relation, entail the formula of `sup`?
    pub fn is_subclass(&self, sub: &Ty, sup: &Ty) -> bool {
        // TypeMatching is a side channel over class names.
        match (sub, sup) {
            (Ty::TypeMatching(a), Ty::TypeMatching(b)) => return a == b,
            (_, Ty::TypeMatching(pattern)) => return self.matches_pattern(sub, pattern),
            (Ty::TypeMatching(_), _) => return matches!(sup, Ty::Any),
            _ => {}
        }

        let fa = sub.formula();
        let fb = sup.formula();

        if !fa.has_negation() && !fb.has_negation() {
            // Fast path: UNSAT(rel ∧ A ∧ ¬B) means A entails B.
            let mut cnf = Cnf::new();
            self.assert_relation(&mut cnf);
            fa.assert_true(&mut cnf);
            fb.assert_false(&mut cnf);
            return !Solver::new(&cnf).is_satisfiable(&[]);
        }

        self.is_subclass_slow(&fa, &fb)
    }

    /// Slow path used when negation appears: compare minimal satisfying
    /// assignments of A against those of A∧B and A∧¬B.
    fn is_subclass_slow(&self, fa: &Formula, fb: &Formula) -> bool {
        let lhs = self.models_of(&[fa]);
        let rhs_with = self.models_of(&[fa, fb]);
        if rhs_with.is_empty() {
            return false;
        }
        let neg = Formula::not(fb.clone());
        let rhs_without = self.models_of(&[fa, &neg]);
        if rhs_without.is_empty() {
            return true;
        }

        let mut lhs_inter: Option<Vec<AtomId>> = None;
        for model in &lhs {
            lhs_inter = Some(match lhs_inter {
                None => model.clone(),
                Some(acc) => acc.into_iter().filter(|a| model.contains(a)).collect(),
            });
        }
        let lhs_inter = lhs_inter.unwrap_or_default();
        let union = |models: &[Vec<AtomId>]| -> Vec<AtomId> {
            let mut out = Vec::new();
            for model in models {
                for &a in model {
                    if !out.contains(&a) {
                        out.push(a);
                    }
                }
            }
            out
        };
        let with_union = union(&rhs_with);
        let without_union = union(&rhs_without);
        with_union
            .iter()
            .filter(|a| !without_union.contains(a))
            .all(|a| lhs_inter.contains(a))
    }

    /// Satisfying assignments of the conjunction of `formulas` under the
    /// relation, projected onto the true atoms of each model.
    fn models_of(&self, formulas: &[&Formula]) -> Vec<Vec<AtomId>> {
        let mut cnf = Cnf::new();
        self.assert_relation(&mut cnf);
        for formula in formulas {
            formula.assert_true(&mut cnf);
        }
        let atom_vars: Vec<(AtomId, i32)> = cnf.atom_vars().collect();
        let vars: Vec<i32> = atom_vars.iter().map(|(_, v)| *v).collect();
        Solver::new(&cnf)
            .all_models(&[], &vars)
            .into_iter()
            .map(|model| {
                atom_vars
                    .iter()
                    .filter(|(_, v)| model.get(v).copied().unwrap_or(false))
                    .map(|(a, _)| *a)
                    .collect()
            })
            .collect()
    }

    fn matches_pattern(&self, ty: &Ty, pattern: &str) -> bool {
        let re = match regex::Regex::new(&format!("^(?:{})$", pattern)) {
            Ok(re) => re,
            Err(_) => return false,
        };
        let full_match = |name: &str| re.is_match(name);
        match ty {
            Ty::Class(name) => self.mro(name).iter().any(|n| full_match(n)),
            Ty::Parameter { ty, .. } => self.matches_pattern(ty, pattern),
            Ty::Union(types) => types.iter().all(|t| self.matches_pattern(t, pattern)),
            _ => false,
        }
    }

    /// `isinstance(value, ty)`. Equivalent to
    /// `is_subclass(type_of(value), ty)` except for `Literal`, whose
    /// instance check is value equality.
    pub fn is_instance(&self, value: &Value, ty: &Ty) -> bool {
        match ty {
            Ty::Any => true,
            Ty::Never => false,
            Ty::Literal(expected) => value == expected,
            Ty::Parameter { ty, .. } => self.is_instance(value, ty),
            Ty::Union(types) => types.iter().any(|t| self.is_instance(value, t)),
            Ty::Intersection(types) => types.iter().all(|t| self.is_instance(value, t)),
            Ty::Not(inner) => !self.is_instance(value, inner),
            Ty::Function(_) => matches!(value, Value::Callable { .. }),
            Ty::TypeMatching(pattern) => {
                self.matches_pattern(&Ty::Class(value.class_name()), pattern)
            }
            Ty::Class(name) => {
                let actual = value.class_name();
                actual == *name || self.mro(&actual).iter().any(|n| n == name)
            }
        }
    }

    /// The concrete class type of a value.
    pub fn type_of(&self, value: &Value) -> Ty {
        Ty::Class(value.class_name())
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}
