//! Overload dispatch by logical type (scenario: int/str/tagged).

use dopple::{CallArgs, CallError, Overload, Param, Signature, Ty, Value};

fn overloaded() -> Overload {
    Overload::new("f")
        .register(
            Signature::new(vec![Param::new("x", Ty::int())]).with_doc("integer form"),
            |_| Ok(Value::Str("int".into())),
        )
        .register(
            Signature::new(vec![Param::new("x", Ty::str_())]).with_doc("string form"),
            |_| Ok(Value::Str("str".into())),
        )
        .register(
            Signature::new(vec![
                Param::new("x", Ty::union(vec![Ty::int(), Ty::str_()])),
                Param::new("tag", Ty::literal("T")).keyword_only(),
            ])
            .with_doc("tagged form"),
            |_| Ok(Value::Str("tagged".into())),
        )
}

#[test]
fn test_dispatch_by_type() {
    let f = overloaded();
    assert_eq!(
        f.call(CallArgs::positional([Value::Int(3)])).unwrap(),
        Value::Str("int".into())
    );
    assert_eq!(
        f.call(CallArgs::positional([Value::Str("hi".into())]))
            .unwrap(),
        Value::Str("str".into())
    );
    assert_eq!(
        f.call(CallArgs::positional([Value::Int(3)]).keyword("tag", Value::Str("T".into())))
            .unwrap(),
        Value::Str("tagged".into())
    );
}

#[test]
fn test_no_match_lists_all_signatures() {
    let f = overloaded();
    let err = f.call(CallArgs::positional([Value::Float(3.5)])).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("f(x: int)"));
    assert!(message.contains("f(x: str)"));
    assert!(message.contains("f(x: Union(int, str), tag: Literal(T))"));
    assert!(message.contains("integer form"));
    assert_eq!(err.options.len(), 3);
    assert!(!err.failures.is_empty());
}

#[test]
fn test_wrong_literal_tag_fails_tagged_option() {
    let f = overloaded();
    let err = f
        .call(CallArgs::positional([Value::Int(3)]).keyword("tag", Value::Str("U".into())))
        .unwrap_err();
    assert!(err
        .failures
        .iter()
        .any(|failure| failure.contains("tag")));
}

#[test]
fn test_undispatch_falls_through_and_exhausts() {
    let f = Overload::new("g")
        .register(Signature::new(vec![Param::new("x", Ty::int())]), |_| {
            Err(CallError::Undispatch)
        })
        .register(Signature::new(vec![Param::new("x", Ty::int())]), |_| {
            Err(CallError::Undispatch)
        });
    let err = f.call(CallArgs::positional([Value::Int(1)])).unwrap_err();
    // Every body undispatched; the error reports both attempts.
    assert_eq!(err.failures.len(), 2);
    assert!(err.failures.iter().all(|f| f.contains("undispatched")));
}

#[test]
fn test_pre_bind_hook_transforms_arguments() {
    let f = Overload::new("h")
        .pre_bind_hook(|mut args| {
            // Normalize a leading float into an int before matching.
            if let Some(Value::Float(x)) = args.pos.first().cloned() {
                args.pos[0] = Value::Int(x as i64);
            }
            args
        })
        .register(Signature::new(vec![Param::new("x", Ty::int())]), |b| {
            Ok(b.get("x").cloned().unwrap())
        });
    assert_eq!(
        f.call(CallArgs::positional([Value::Float(4.0)])).unwrap(),
        Value::Int(4)
    );
}

#[test]
fn test_parameter_annotation_dispatches_like_inner_type() {
    let f = Overload::new("p").register(
        Signature::new(vec![Param::new(
            "x",
            Ty::parameter("x", Ty::int(), "the count"),
        )]),
        |b| Ok(b.get("x").cloned().unwrap()),
    );
    assert_eq!(
        f.call(CallArgs::positional([Value::Int(9)])).unwrap(),
        Value::Int(9)
    );
    // Parameter is an auto-none marker: with defaults filled, a call
    // that provides no matching value binds None rather than failing.
    assert_eq!(f.call(CallArgs::default()).unwrap(), Value::None);

    // Without default filling the same option must fail to match, and
    // an unconsumed argument of the wrong type fails the option too.
    let strict = Overload::new("p").with_fill_defaults(false).register(
        Signature::new(vec![Param::new(
            "x",
            Ty::parameter("x", Ty::int(), "the count"),
        )]),
        |b| Ok(b.get("x").cloned().unwrap()),
    );
    assert!(strict
        .call(CallArgs::positional([Value::Str("no".into())]))
        .is_err());
}
