//! Delta-operation scenarios: `original` rewriting and copy-on-write
//! locality across variant builds.

use std::sync::Arc;

use dopple::{DeltaError, GraphBuilder, Value, Variant};

fn seed_mcm() -> Variant {
    let mut g = GraphBuilder::new();
    let m = g.module("M").unwrap();
    let c = g.class(m, "C", &[]).unwrap();
    g.function(c, "def m(self):\n    return 1\n").unwrap();
    Variant::new(g.finish())
}

#[test]
fn test_original_rewriting_chains() {
    let variant = seed_mcm();
    let mut build = variant.build();

    build
        .at("M.C")
        .unwrap()
        .modify_function("m", "def new(self):\n    return original(self) + 1\n")
        .unwrap();

    let instance = build.instantiate("M.C").unwrap();
    assert_eq!(build.call_method(&instance, "m", vec![]).unwrap(), Value::Int(2));
    // The previous definition is reachable at m#0.
    assert!(build.resolve("M.C.m#0").is_ok());
    assert_eq!(
        build.call("M.C.m#0", vec![instance.clone()]).unwrap(),
        Value::Int(1)
    );

    build
        .at("M.C")
        .unwrap()
        .modify_function("m", "def new2(self):\n    return original(self) * 10\n")
        .unwrap();

    assert_eq!(build.call_method(&instance, "m", vec![]).unwrap(), Value::Int(20));
    assert!(build.resolve("M.C.m#0").is_ok());
    assert!(build.resolve("M.C.m#1").is_ok());
}

#[test]
fn test_modify_without_original_does_not_shadow() {
    let variant = seed_mcm();
    let mut build = variant.build();
    build
        .at("M.C")
        .unwrap()
        .modify_function("m", "def m(self):\n    return 7\n")
        .unwrap();
    let instance = build.instantiate("M.C").unwrap();
    assert_eq!(build.call_method(&instance, "m", vec![]).unwrap(), Value::Int(7));
    assert!(build.resolve("M.C.m#0").is_err());
}

#[test]
fn test_copy_on_write_locality_across_builds() {
    let variant = seed_mcm();
    let class_id = {
        let build = variant.build();
        build.resolve("M.C").unwrap()
    };
    let seed_class = variant.seed().node_arc(class_id);

    let mut v1 = variant.build();
    let v2 = variant.build();

    v1.at("M.C")
        .unwrap()
        .modify_function("m", "def new(self):\n    return original(self) + 1\n")
        .unwrap();

    // The original registry is unchanged by identity.
    assert!(Arc::ptr_eq(&variant.seed().node_arc(class_id), &seed_class));
    assert!(!variant
        .seed()
        .node(class_id)
        .members()
        .unwrap()
        .contains("m#0"));

    // V1's class is a fresh replica; V2 still shares with the seed and
    // never with V1.
    assert!(!Arc::ptr_eq(&v1.node_arc(class_id), &seed_class));
    assert!(Arc::ptr_eq(&v2.node_arc(class_id), &seed_class));
    assert!(!Arc::ptr_eq(&v2.node_arc(class_id), &v1.node_arc(class_id)));

    // Behavior diverges accordingly.
    let inst = v1.instantiate("M.C").unwrap();
    assert_eq!(v1.call_method(&inst, "m", vec![]).unwrap(), Value::Int(2));
    let inst2 = v2.instantiate("M.C").unwrap();
    assert_eq!(v2.call_method(&inst2, "m", vec![]).unwrap(), Value::Int(1));
}

#[test]
fn test_no_reachable_seed_node_is_mutated() {
    let variant = seed_mcm();
    let snapshot: Vec<_> = (0..variant.seed().len() as u32)
        .map(|i| variant.seed().node_arc(dopple::delta::NodeId(i)))
        .collect();

    let mut build = variant.build();
    let mut cursor = build.at("M.C").unwrap();
    cursor
        .modify_function("m", "def new(self):\n    return original(self) + 1\n")
        .unwrap();
    cursor.add_value("version", Value::Int(2)).unwrap();
    build.at("M").unwrap().add_value("extra", Value::Int(1)).unwrap();

    for (i, before) in snapshot.iter().enumerate() {
        let after = variant.seed().node_arc(dopple::delta::NodeId(i as u32));
        assert!(Arc::ptr_eq(before, &after), "seed node {} was replaced", i);
    }
}

#[test]
fn test_add_remove_preconditions() {
    let variant = seed_mcm();
    let mut build = variant.build();
    let mut cursor = build.at("M.C").unwrap();

    assert!(matches!(
        cursor.add_function_named("m", "def m(self):\n    return 0\n"),
        Err(DeltaError::AlreadyExists { .. })
    ));
    assert!(matches!(
        cursor.remove("ghost"),
        Err(DeltaError::Missing { .. })
    ));

    cursor.add_value("counter", Value::Int(0)).unwrap();
    cursor.remove("counter").unwrap();
    assert!(build.resolve("M.C.counter").is_err());
}

#[test]
fn test_extends_delta_changes_method_resolution() {
    let mut g = GraphBuilder::new();
    let m = g.module("app").unwrap();
    let base = g.class(m, "Base", &[]).unwrap();
    g.function(base, "def ping(self):\n    return 'base'\n").unwrap();
    let other = g.class(m, "Other", &[]).unwrap();
    g.function(other, "def ping(self):\n    return 'other'\n").unwrap();
    let child = g.class(m, "Child", &[base]).unwrap();
    let variant = Variant::new(g.finish());

    let mut build = variant.build();
    let inst = build.instantiate("app.Child").unwrap();
    assert_eq!(
        build.call_method(&inst, "ping", vec![]).unwrap(),
        Value::Str("base".into())
    );

    build.cursor(child).set_extends(&[other]).unwrap();
    assert_eq!(
        build.call_method(&inst, "ping", vec![]).unwrap(),
        Value::Str("other".into())
    );

    // remove_extends fails fast when a named base is absent.
    let err = build.cursor(child).remove_extends(&[base]).unwrap_err();
    assert!(matches!(err, DeltaError::NotABase { .. }));
}
