//! End-to-end feature diagram scenarios: closure under groups, CTC
//! propagation into reasons, and DIMACS round-trips.

use dopple::{Constraint, Feature, FeatureModel, ReasonEntry, Value};

#[test]
fn test_closure_respects_xor() {
    let model = FeatureModel::check(Feature::xor("Root").child("a").child("b"));
    assert!(model.errors().is_empty());

    let (closed, errors) = model.close([[("a", Value::Bool(true))]]);
    assert!(errors.is_empty());

    let map = closed.to_map(&model);
    assert_eq!(map.get("Root"), Some(&Value::Bool(true)));
    assert_eq!(map.get("a"), Some(&Value::Bool(true)));
    assert_eq!(map.get("b"), Some(&Value::Bool(false)));
}

#[test]
fn test_ctc_propagation_produces_reason() {
    let model = FeatureModel::check(
        Feature::and("Root")
            .child("x")
            .child("y")
            .ctc(Constraint::implies("x", "y")),
    );
    assert!(model.errors().is_empty());

    let (conf, errors) =
        model.link_config([("x", Value::Bool(true)), ("y", Value::Bool(false))]);
    assert!(errors.is_empty());

    let result = model.eval(&conf);
    assert!(!result.value);

    let reason = result.reason.expect("evaluation must explain the failure");
    match reason.find("Impl") {
        Some(ReasonEntry::ValueMismatch { expected, observed, .. }) => {
            assert_eq!(expected, &Some(Value::Bool(true)));
            assert_eq!(observed, &Some(Value::Bool(false)));
        }
        other => panic!("expected a value mismatch citing the implication, got {:?}", other),
    }
}

#[test]
fn test_dimacs_round_trip() {
    let model = FeatureModel::check(
        Feature::or("Root")
            .child("a")
            .child("b")
            .ctc(Constraint::not(Constraint::and(["a", "b"]))),
    );
    assert!(model.errors().is_empty());

    let dimacs = model.to_dimacs().unwrap();
    assert_eq!(dimacs.num_vars(), 3);
    assert_eq!(dimacs.num_clauses(), 5);

    let mut clauses: Vec<Vec<i32>> = dimacs
        .clauses()
        .iter()
        .map(|c| {
            let mut clause: Vec<i32> = c.to_vec();
            clause.sort_unstable();
            clause
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
    for clause in &mut expected {
        clause.sort_unstable();
    }
    expected.sort();
    assert_eq!(clauses, expected);

    // A SAT sweep finds exactly the two one-hot assignments.
    let models = dimacs.all_models(&[2, 3]);
    assert_eq!(models.len(), 2);
    assert!(models.iter().any(|m| m[&2] && !m[&3]));
    assert!(models.iter().any(|m| !m[&2] && m[&3]));
}

#[test]
fn test_dimacs_text_export() {
    let model = FeatureModel::check(Feature::or("Root").child("a").child("b"));
    let dimacs = model.to_dimacs().unwrap();
    let text = dimacs.to_string();

    assert!(text.contains("c Root -> 1"));
    assert!(text.contains("c Root.a -> 2"));
    assert!(text.contains("c Root.b -> 3"));
    let header: Vec<&str> = text
        .lines()
        .filter(|line| !line.starts_with('c'))
        .collect();
    assert_eq!(header[0], "p cnf 3 4");
    assert!(header[1..].iter().all(|line| line.ends_with(" 0")));
}

#[test]
fn test_eval_agrees_with_sat_on_total_configs() {
    let model = FeatureModel::check(
        Feature::and("Root")
            .child("x")
            .child(Feature::or("grp").child("a").child("b"))
            .ctc(Constraint::implies("x", "a")),
    );
    assert!(model.errors().is_empty());
    let dimacs = model.to_dimacs().unwrap();

    let names = ["Root", "x", "grp", "a", "b"];
    for bits in 0..(1u32 << names.len()) {
        let pairs: Vec<(&str, Value)> = names
            .iter()
            .enumerate()
            .map(|(i, name)| (*name, Value::Bool(bits & (1 << i) != 0)))
            .collect();
        let (conf, errors) = model.link_config(pairs);
        assert!(errors.is_empty());
        let result = model.eval(&conf);
        let valid = result.value && result.nvalue;
        let sat = dimacs.is_satisfiable(&dimacs.assumption_lits(&conf));
        assert_eq!(valid, sat, "disagreement on assignment {:05b}", bits);
    }
}

#[test]
fn test_multi_config_closure_later_wins() {
    let model = FeatureModel::check(
        Feature::and("Root").child(Feature::xor("mode").child("fast").child("safe")),
    );
    let (closed, _) = model.close([
        vec![("fast", Value::Bool(true))],
        vec![("safe", Value::Bool(true))],
    ]);
    let map = closed.to_map(&model);
    assert_eq!(map.get("fast"), Some(&Value::Bool(false)));
    assert_eq!(map.get("safe"), Some(&Value::Bool(true)));
    assert_eq!(map.get("Root"), Some(&Value::Bool(true)));
}
