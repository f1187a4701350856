//! Explicit signature records for the overload dispatcher.
//!
//! Signatures are built once at registration; the dispatcher never
//! introspects callables at call time.

use std::fmt;

use crate::core::value::Value;
use crate::logic::types::Ty;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    PositionalOrKeyword,
    KeywordOnly,
    /// Collects leftover positional values.
    VarArgs,
    /// Collects leftover keyword values.
    VarKwargs,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
    pub default: Option<Value>,
    pub kind: ParamKind,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Ty) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            kind: ParamKind::PositionalOrKeyword,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn keyword_only(mut self) -> Self {
        self.kind = ParamKind::KeywordOnly;
        self
    }

    pub fn varargs(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: Ty::Any,
            default: None,
            kind: ParamKind::VarArgs,
        }
    }

    pub fn varkwargs(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: Ty::Any,
            default: None,
            kind: ParamKind::VarKwargs,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Signature {
    pub params: Vec<Param>,
    pub doc: Option<String>,
}

impl Signature {
    pub fn new(params: Vec<Param>) -> Self {
        Self { params, doc: None }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn has_varargs(&self) -> bool {
        self.params.iter().any(|p| p.kind == ParamKind::VarArgs)
    }

    pub fn has_varkwargs(&self) -> bool {
        self.params.iter().any(|p| p.kind == ParamKind::VarKwargs)
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Render with an overload name substituted in, the way every
    /// registered option is shown under the first method's name.
    pub fn render(&self, name: &str) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                let mut out = match p.kind {
                    ParamKind::VarArgs => format!("*{}", p.name),
                    ParamKind::VarKwargs => format!("**{}", p.name),
                    _ => format!("{}: {}", p.name, p.ty),
                };
                if let Some(default) = &p.default {
                    out.push_str(&format!(" = {}", default));
                }
                out
            })
            .collect();
        let mut rendered = format!("{}({})", name, params.join(", "));
        if let Some(doc) = &self.doc {
            rendered.push_str(&format!("  # {}", doc));
        }
        rendered
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render("<fn>"))
    }
}

/// Arguments to one dispatch: positional values plus keyword bindings.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub pos: Vec<Value>,
    pub kw: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            pos: values.into_iter().map(Into::into).collect(),
            kw: Vec::new(),
        }
    }

    pub fn keyword(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kw.push((name.into(), value.into()));
        self
    }

    pub fn render(&self) -> String {
        let mut parts: Vec<String> = self.pos.iter().map(|v| v.to_string()).collect();
        parts.extend(self.kw.iter().map(|(k, v)| format!("{}={}", k, v)));
        format!("({})", parts.join(", "))
    }
}

/// Values bound to a signature after a successful match.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    pub named: Vec<(String, Value)>,
    pub varargs: Vec<Value>,
    pub varkwargs: Vec<(String, Value)>,
}

impl Bindings {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.named.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.named.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.named.push((name, value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let sig = Signature::new(vec![
            Param::new("x", Ty::int()),
            Param::new("tag", Ty::literal("T")).keyword_only(),
        ])
        .with_doc("tagged form");
        let rendered = sig.render("f");
        assert!(rendered.starts_with("f(x: int, tag: Literal(T))"));
        assert!(rendered.contains("tagged form"));
    }

    #[test]
    fn test_bindings_set_overwrites() {
        let mut b = Bindings::default();
        b.set("x", Value::Int(1));
        b.set("x", Value::Int(2));
        assert_eq!(b.get("x"), Some(&Value::Int(2)));
        assert_eq!(b.named.len(), 1);
    }
}
