//! Overload dispatcher.
//!
//! An `Overload` holds an ordered list of (signature, body) options for
//! one name. Calls bind arguments against each option in registration
//! order; the first match runs, unless an accumulate monoid was given,
//! in which case every matching option runs and the results are folded.
//! A body may raise `CallError::Undispatch` to resume matching with the
//! next option.

pub mod signature;

use std::sync::Arc;

use tracing::debug;

use crate::core::value::Value;
use crate::errors::{CallError, OverloadError};
use crate::logic::types::TypeStore;
pub use signature::{Bindings, CallArgs, Param, ParamKind, Signature};

pub type Body = Arc<dyn Fn(&Bindings) -> Result<Value, CallError> + Send + Sync>;
pub type PreBindHook = Arc<dyn Fn(CallArgs) -> CallArgs + Send + Sync>;
/// Transforms bindings after a signature match; threads a user-chosen
/// accumulator through the hook chain.
pub type PostBindHook =
    Arc<dyn Fn(Option<Value>, &Signature, Bindings) -> (Option<Value>, Bindings) + Send + Sync>;

/// Monoid folding results when every matching option runs.
#[derive(Clone)]
pub struct Monoid {
    pub zero: Value,
    pub plus: Arc<dyn Fn(Value, Value) -> Value + Send + Sync>,
}

impl Monoid {
    pub fn new(zero: Value, plus: impl Fn(Value, Value) -> Value + Send + Sync + 'static) -> Self {
        Self {
            zero,
            plus: Arc::new(plus),
        }
    }
}

struct OverloadOption {
    sig: Signature,
    body: Body,
}

enum BindFailure {
    KeywordType { param: String, found: String },
    NoValue { param: String },
    AmbiguousPositional { param: String },
    LeftoverPositional(usize),
    LeftoverKeyword(Vec<String>),
}

impl BindFailure {
    fn render(&self) -> String {
        match self {
            Self::KeywordType { param, found } => {
                format!("keyword '{}' has incompatible type ({})", param, found)
            }
            Self::NoValue { param } => format!("no value for parameter '{}'", param),
            Self::AmbiguousPositional { param } => {
                format!("more than one positional value matches parameter '{}'", param)
            }
            Self::LeftoverPositional(n) => format!("{} positional value(s) left over", n),
            Self::LeftoverKeyword(names) => {
                format!("unexpected keyword(s): {}", names.join(", "))
            }
        }
    }
}

pub struct Overload {
    name: String,
    options: Vec<OverloadOption>,
    pre_bind_hooks: Vec<PreBindHook>,
    post_bind_hooks: Vec<PostBindHook>,
    accumulate: Option<Monoid>,
    fill_defaults: bool,
    store: &'static TypeStore,
}

impl Overload {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Vec::new(),
            pre_bind_hooks: Vec::new(),
            post_bind_hooks: Vec::new(),
            accumulate: None,
            fill_defaults: true,
            store: TypeStore::global(),
        }
    }

    pub fn with_accumulate(mut self, monoid: Monoid) -> Self {
        self.accumulate = Some(monoid);
        self
    }

    pub fn with_fill_defaults(mut self, fill: bool) -> Self {
        self.fill_defaults = fill;
        self
    }

    pub fn pre_bind_hook(mut self, hook: impl Fn(CallArgs) -> CallArgs + Send + Sync + 'static) -> Self {
        self.pre_bind_hooks.push(Arc::new(hook));
        self
    }

    pub fn post_bind_hook(
        mut self,
        hook: impl Fn(Option<Value>, &Signature, Bindings) -> (Option<Value>, Bindings)
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.post_bind_hooks.push(Arc::new(hook));
        self
    }

    /// Register an option. Options match in registration order. When a
    /// parameter's annotation is the auto-none marker and it has no
    /// default, its default becomes `None`.
    pub fn register(
        mut self,
        mut sig: Signature,
        body: impl Fn(&Bindings) -> Result<Value, CallError> + Send + Sync + 'static,
    ) -> Self {
        if self.fill_defaults {
            for param in &mut sig.params {
                if param.default.is_none() && param.ty.auto_none() {
                    param.default = Some(Value::None);
                }
            }
        }
        self.options.push(OverloadOption {
            sig,
            body: Arc::new(body),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Render every registered signature under the overload's name.
    pub fn render_options(&self) -> Vec<String> {
        self.options
            .iter()
            .map(|o| o.sig.render(&self.name))
            .collect()
    }

    /// Dispatch a call.
    pub fn call(&self, args: CallArgs) -> Result<Value, OverloadError> {
        let mut args = args;
        for hook in &self.pre_bind_hooks {
            args = hook(args);
        }
        let rendered_args = args.render();

        let mut failures: Vec<String> = Vec::new();
        let mut acc = self.accumulate.as_ref().map(|m| m.zero.clone());
        let mut matched = false;

        for option in &self.options {
            let bindings = match self.bind(&option.sig, &args) {
                Ok(b) => b,
                Err(failure) => {
                    failures.push(format!(
                        "{}: {}",
                        option.sig.render(&self.name),
                        failure.render()
                    ));
                    continue;
                }
            };
            debug!(name = %self.name, "signature matched");
            match (option.body)(&bindings) {
                Ok(result) => match (&self.accumulate, acc.take()) {
                    (Some(monoid), Some(current)) => {
                        acc = Some((monoid.plus)(current, result));
                        matched = true;
                    }
                    _ => return Ok(result),
                },
                Err(CallError::Undispatch) => {
                    debug!(name = %self.name, "option undispatched, resuming");
                    failures.push(format!(
                        "{}: body undispatched",
                        option.sig.render(&self.name)
                    ));
                }
                Err(CallError::Failure(message)) => {
                    failures.push(format!("{}: {}", option.sig.render(&self.name), message));
                }
            }
        }

        if matched {
            return Ok(acc.expect("accumulator present in accumulate mode"));
        }
        Err(OverloadError {
            name: self.name.clone(),
            arguments: rendered_args,
            options: self.render_options(),
            failures,
        })
    }

    /// Bind `args` against one signature. Matching rules, in order per
    /// parameter: keyword by name, positional head, unique positional
    /// scan, declared default. Leftovers are only allowed into varargs
    /// and varkwargs parameters.
    fn bind(&self, sig: &Signature, args: &CallArgs) -> Result<Bindings, BindFailure> {
        let mut positional: Vec<Value> = args.pos.clone();
        let mut keywords: Vec<(String, Value)> = args.kw.clone();
        let mut bound = Bindings::default();
        let mut had_varargs = false;
        let mut had_varkwargs = false;

        for param in &sig.params {
            match param.kind {
                ParamKind::VarArgs => {
                    had_varargs = true;
                    continue;
                }
                ParamKind::VarKwargs => {
                    had_varkwargs = true;
                    continue;
                }
                _ => {}
            }

            if let Some(i) = keywords.iter().position(|(name, _)| *name == param.name) {
                let (_, value) = keywords.remove(i);
                if self.store.is_instance(&value, &param.ty) {
                    bound.set(&param.name, value);
                    continue;
                }
                return Err(BindFailure::KeywordType {
                    param: param.name.clone(),
                    found: value.class_name(),
                });
            }

            let head_matches = param.kind == ParamKind::PositionalOrKeyword
                && !positional.is_empty()
                && self.store.is_instance(&positional[0], &param.ty);
            if head_matches {
                bound.set(&param.name, positional.remove(0));
                continue;
            }

            // Scan the remaining positional values for exactly one of
            // the right type.
            let matching: Vec<usize> = positional
                .iter()
                .enumerate()
                .filter(|(_, v)| self.store.is_instance(v, &param.ty))
                .map(|(i, _)| i)
                .collect();
            match matching.len() {
                1 => {
                    bound.set(&param.name, positional.remove(matching[0]));
                }
                0 => match &param.default {
                    Some(default) => bound.set(&param.name, default.clone()),
                    None => {
                        return Err(BindFailure::NoValue {
                            param: param.name.clone(),
                        })
                    }
                },
                _ => {
                    return Err(BindFailure::AmbiguousPositional {
                        param: param.name.clone(),
                    })
                }
            }
        }

        if !positional.is_empty() && !had_varargs {
            return Err(BindFailure::LeftoverPositional(positional.len()));
        }
        if !keywords.is_empty() && !had_varkwargs {
            return Err(BindFailure::LeftoverKeyword(
                keywords.iter().map(|(n, _)| n.clone()).collect(),
            ));
        }
        bound.varargs = positional;
        bound.varkwargs = keywords;

        let mut bindings = bound;
        let mut acc: Option<Value> = None;
        for hook in &self.post_bind_hooks {
            let (next_acc, next_bindings) = hook(acc, sig, bindings);
            acc = next_acc;
            bindings = next_bindings;
        }
        Ok(bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::types::Ty;

    fn str_result(s: &str) -> Result<Value, CallError> {
        Ok(Value::Str(s.to_string()))
    }

    fn sample() -> Overload {
        Overload::new("f")
            .register(Signature::new(vec![Param::new("x", Ty::int())]), |_| {
                str_result("int")
            })
            .register(Signature::new(vec![Param::new("x", Ty::str_())]), |_| {
                str_result("str")
            })
    }

    #[test]
    fn test_first_match_wins() {
        let f = sample();
        let result = f.call(CallArgs::positional([Value::Int(3)])).unwrap();
        assert_eq!(result, Value::Str("int".into()));
        let result = f.call(CallArgs::positional([Value::Str("hi".into())])).unwrap();
        assert_eq!(result, Value::Str("str".into()));
    }

    #[test]
    fn test_no_match_renders_options() {
        let f = sample();
        let err = f.call(CallArgs::positional([Value::Float(3.5)])).unwrap_err();
        assert_eq!(err.options.len(), 2);
        assert!(err.to_string().contains("f(x: int)"));
        assert!(err.to_string().contains("f(x: str)"));
    }

    #[test]
    fn test_undispatch_resumes() {
        let f = Overload::new("f")
            .register(Signature::new(vec![Param::new("x", Ty::Any)]), |_| {
                Err(CallError::Undispatch)
            })
            .register(Signature::new(vec![Param::new("x", Ty::int())]), |_| {
                str_result("second")
            });
        let result = f.call(CallArgs::positional([Value::Int(1)])).unwrap();
        assert_eq!(result, Value::Str("second".into()));
    }

    #[test]
    fn test_positional_scan_binds_out_of_order() {
        let f = Overload::new("f").register(
            Signature::new(vec![
                Param::new("count", Ty::int()),
                Param::new("label", Ty::str_()),
            ]),
            |b| Ok(b.get("label").cloned().unwrap()),
        );
        // label arrives first; the scan finds the unique int for count.
        let result = f
            .call(CallArgs::positional([
                Value::Str("name".into()),
                Value::Int(7),
            ]))
            .unwrap();
        assert_eq!(result, Value::Str("name".into()));
    }

    #[test]
    fn test_ambiguous_scan_fails_option() {
        let f = Overload::new("f").register(
            Signature::new(vec![
                Param::new("label", Ty::str_()),
                Param::new("count", Ty::int()).keyword_only(),
            ]),
            |_| str_result("never"),
        );
        // Two ints could fill `count`; the option must fail rather than
        // guess.
        let err = f
            .call(CallArgs::positional([
                Value::Str("a".into()),
                Value::Int(1),
                Value::Int(2),
            ]))
            .unwrap_err();
        assert!(err.failures.iter().any(|f| f.contains("more than one")));
    }

    #[test]
    fn test_accumulate_runs_all_options() {
        let monoid = Monoid::new(Value::Int(0), |a, b| match (a, b) {
            (Value::Int(x), Value::Int(y)) => Value::Int(x + y),
            (a, _) => a,
        });
        let f = Overload::new("f")
            .with_accumulate(monoid)
            .register(Signature::new(vec![Param::new("x", Ty::int())]), |_| {
                Ok(Value::Int(1))
            })
            .register(Signature::new(vec![Param::new("x", Ty::Any)]), |_| {
                Ok(Value::Int(10))
            });
        let result = f.call(CallArgs::positional([Value::Int(5)])).unwrap();
        assert_eq!(result, Value::Int(11));
    }

    #[test]
    fn test_auto_none_default() {
        let f = Overload::new("f").register(
            Signature::new(vec![
                Param::new("x", Ty::int()),
                Param::new("extra", Ty::optional(Ty::str_())),
            ]),
            |b| Ok(b.get("extra").cloned().unwrap()),
        );
        let result = f.call(CallArgs::positional([Value::Int(1)])).unwrap();
        assert_eq!(result, Value::None);
    }

    #[test]
    fn test_varargs_collect_leftovers() {
        let f = Overload::new("f").register(
            Signature::new(vec![Param::new("x", Ty::int()), Param::varargs("rest")]),
            |b| Ok(Value::Int(b.varargs.len() as i64)),
        );
        let result = f
            .call(CallArgs::positional([
                Value::Int(1),
                Value::Str("a".into()),
                Value::Str("b".into()),
            ]))
            .unwrap();
        assert_eq!(result, Value::Int(2));
    }

    #[test]
    fn test_post_bind_hook_rewrites() {
        let f = Overload::new("f")
            .post_bind_hook(|acc, _sig, mut b| {
                if b.get("x") == Some(&Value::Int(1)) {
                    b.set("x", Value::Int(100));
                }
                (acc, b)
            })
            .register(Signature::new(vec![Param::new("x", Ty::int())]), |b| {
                Ok(b.get("x").cloned().unwrap())
            });
        let result = f.call(CallArgs::positional([Value::Int(1)])).unwrap();
        assert_eq!(result, Value::Int(100));
    }
}
