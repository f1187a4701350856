//! Universally quantified properties, checked with proptest.

use proptest::prelude::*;

use dopple::{Constraint, Feature, FeatureModel, Ty, TypeStore, Value};

fn sample_model() -> FeatureModel {
    let model = FeatureModel::check(
        Feature::and("Root")
            .child("x")
            .child(Feature::or("grp").child("a").child("b"))
            .child(Feature::xor("mode").child("fast").child("safe"))
            .ctc(Constraint::implies("fast", "a")),
    );
    assert!(model.errors().is_empty());
    model
}

const NAMES: [&str; 8] = ["Root", "x", "grp", "a", "b", "mode", "fast", "safe"];

fn partial_config() -> impl Strategy<Value = Vec<(&'static str, Value)>> {
    proptest::collection::vec(
        (0usize..NAMES.len(), any::<bool>()),
        0..NAMES.len(),
    )
    .prop_map(|picks| {
        picks
            .into_iter()
            .map(|(i, b)| (NAMES[i], Value::Bool(b)))
            .collect()
    })
}

proptest! {
    /// Closure is idempotent: close(close(c)) == close(c).
    #[test]
    fn prop_closure_idempotent(pairs in partial_config()) {
        let model = sample_model();
        let (once, _) = model.close([pairs]);
        let twice = model.close_linked(&[&once]);
        prop_assert_eq!(once.to_map(&model), twice.to_map(&model));
    }

    /// Every selected feature in a closed configuration has a selected
    /// ancestor chain up to the root.
    #[test]
    fn prop_closure_selects_ancestors(pairs in partial_config()) {
        let model = sample_model();
        let (closed, _) = model.close([pairs]);
        let map = closed.to_map(&model);
        let selected = |name: &str| map.get(name) == Some(&Value::Bool(true));
        let parent = |name: &str| match name {
            "x" | "grp" | "mode" => Some("Root"),
            "a" | "b" => Some("grp"),
            "fast" | "safe" => Some("mode"),
            _ => None,
        };
        for name in NAMES {
            if selected(name) {
                let mut current = name;
                while let Some(up) = parent(current) {
                    prop_assert!(selected(up), "{} selected but ancestor {} is not", name, up);
                    current = up;
                }
            }
        }
    }

    /// Evaluation of a total configuration agrees with SAT over the
    /// exported CNF.
    #[test]
    fn prop_eval_matches_sat(bits in 0u32..(1 << 8)) {
        let model = sample_model();
        let dimacs = model.to_dimacs().unwrap();
        let pairs: Vec<(&str, Value)> = NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| (*name, Value::Bool(bits & (1 << i) != 0)))
            .collect();
        let (conf, errors) = model.link_config(pairs);
        prop_assert!(errors.is_empty());
        let result = model.eval(&conf);
        let valid = result.value && result.nvalue;
        let sat = dimacs.is_satisfiable(&dimacs.assumption_lits(&conf));
        prop_assert_eq!(valid, sat);
    }

    /// isinstance(v, T) agrees with issubclass(type(v), T) whenever T is
    /// not a Literal.
    #[test]
    fn prop_instance_matches_subclass(choice in 0usize..4, ty_choice in 0usize..5) {
        let store = TypeStore::new();
        let value = match choice {
            0 => Value::Int(3),
            1 => Value::Str("s".into()),
            2 => Value::Bool(true),
            _ => Value::None,
        };
        let ty = match ty_choice {
            0 => Ty::int(),
            1 => Ty::str_(),
            2 => Ty::union(vec![Ty::int(), Ty::str_()]),
            3 => Ty::optional(Ty::int()),
            _ => Ty::Any,
        };
        let lhs = store.is_instance(&value, &ty);
        let rhs = store.is_subclass(&store.type_of(&value), &ty);
        prop_assert_eq!(lhs, rhs);
    }
}

/// Subtype entailment is transitive through observed relations.
#[test]
fn test_subclass_transitive_chain() {
    let store = TypeStore::new();
    store.observe_class("t.A", &["t.B"]);
    store.observe_class("t.B", &["t.C"]);
    store.observe_class("t.C", &["t.D"]);

    let names = ["t.A", "t.B", "t.C", "t.D"];
    for (i, a) in names.iter().enumerate() {
        for (j, b) in names.iter().enumerate() {
            for (k, c) in names.iter().enumerate() {
                let ab = store.is_subclass(&Ty::class(*a), &Ty::class(*b));
                let bc = store.is_subclass(&Ty::class(*b), &Ty::class(*c));
                let ac = store.is_subclass(&Ty::class(*a), &Ty::class(*c));
                if ab && bc {
                    assert!(ac, "{} <: {} and {} <: {} but not {} <: {}", a, b, b, c, a, c);
                }
                // The chain itself is ordered.
                if i <= j && j <= k {
                    assert!(ab && bc && ac);
                }
            }
        }
    }
}

/// Well-formed models check cleanly.
#[test]
fn test_well_formed_models_have_no_errors() {
    let shapes = [
        FeatureModel::check(Feature::and("A").child("b").child("c")),
        FeatureModel::check(Feature::xor("Top").child(Feature::or("mid").child("leaf"))),
        FeatureModel::check(
            Feature::any("Opt")
                .child("one")
                .ctc(Constraint::implies("one", "Opt")),
        ),
    ];
    for model in &shapes {
        let errors = model.errors();
        assert!(errors.is_empty(), "unexpected errors: {}", errors);
    }
}
