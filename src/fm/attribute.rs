//! Attribute domain specifications.
//!
//! An attribute constrains the value a configuration may bind at
//! `feature.attr`. Bounds are optional; an absent bound is unbounded.

use std::fmt;

use crate::core::value::Value;
use crate::errors::DeclError;

/// Inclusive numeric range with optional bounds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Domain {
    pub lo: Option<f64>,
    pub hi: Option<f64>,
}

impl Domain {
    pub fn new(lo: Option<f64>, hi: Option<f64>) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, x: f64) -> bool {
        self.lo.map_or(true, |lo| x >= lo) && self.hi.map_or(true, |hi| x <= hi)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lo = self.lo.map_or("-inf".to_string(), |v| v.to_string());
        let hi = self.hi.map_or("+inf".to_string(), |v| v.to_string());
        write!(f, "[{}, {}]", lo, hi)
    }
}

/// The domain specification of one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeSpec {
    Bool,
    Str,
    /// Value must be one of a fixed non-empty set.
    Enum(Vec<Value>),
    Int(Domain),
    Float(Domain),
    /// Value must be an instance of the named class.
    Class(String),
    /// A list whose length lies in `size` and whose elements satisfy
    /// `elem` (any element when absent).
    List {
        size: Domain,
        elem: Option<Box<AttributeSpec>>,
    },
}

impl AttributeSpec {
    pub fn bool_() -> Self {
        AttributeSpec::Bool
    }

    pub fn string() -> Self {
        AttributeSpec::Str
    }

    /// Rejects an empty domain eagerly.
    pub fn enumeration(values: Vec<Value>) -> Result<Self, DeclError> {
        if values.is_empty() {
            return Err(DeclError::EmptyEnum {
                attribute: String::new(),
            });
        }
        Ok(AttributeSpec::Enum(values))
    }

    pub fn int(lo: impl Into<Option<i64>>, hi: impl Into<Option<i64>>) -> Self {
        AttributeSpec::Int(Domain::new(
            lo.into().map(|v| v as f64),
            hi.into().map(|v| v as f64),
        ))
    }

    pub fn float(lo: impl Into<Option<f64>>, hi: impl Into<Option<f64>>) -> Self {
        AttributeSpec::Float(Domain::new(lo.into(), hi.into()))
    }

    pub fn class(name: impl Into<String>) -> Self {
        AttributeSpec::Class(name.into())
    }

    pub fn list(size: Domain, elem: Option<AttributeSpec>) -> Self {
        AttributeSpec::List {
            size,
            elem: elem.map(Box::new),
        }
    }

    /// Does `value` satisfy this specification?
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            AttributeSpec::Bool => matches!(value, Value::Bool(_)),
            AttributeSpec::Str => matches!(value, Value::Str(_)),
            AttributeSpec::Enum(values) => values.contains(value),
            AttributeSpec::Int(domain) => match value {
                Value::Int(i) => domain.contains(*i as f64),
                _ => false,
            },
            AttributeSpec::Float(domain) => match value {
                Value::Float(x) => domain.contains(*x),
                _ => false,
            },
            AttributeSpec::Class(name) => match value {
                Value::Instance(inst) => {
                    inst.class == *name
                        || crate::logic::TypeStore::global()
                            .mro(&inst.class)
                            .iter()
                            .any(|n| n == name)
                }
                _ => false,
            },
            AttributeSpec::List { size, elem } => match value {
                Value::List(items) => {
                    size.contains(items.len() as f64)
                        && elem
                            .as_ref()
                            .map_or(true, |spec| items.iter().all(|item| spec.accepts(item)))
                }
                _ => false,
            },
        }
    }

    /// Coarse domain family, used to reject cross-domain comparisons at
    /// declaration time.
    pub fn domain_kind(&self) -> &'static str {
        match self {
            AttributeSpec::Bool => "bool",
            AttributeSpec::Str => "str",
            AttributeSpec::Enum(_) => "enum",
            AttributeSpec::Int(_) | AttributeSpec::Float(_) => "numeric",
            AttributeSpec::Class(_) => "class",
            AttributeSpec::List { .. } => "list",
        }
    }

    /// Domain family of a literal value, for the same check.
    pub fn value_domain_kind(value: &Value) -> &'static str {
        match value {
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
            Value::Int(_) | Value::Float(_) => "numeric",
            Value::Instance(_) => "class",
            Value::List(_) => "list",
            Value::None | Value::Callable { .. } => "other",
        }
    }
}

impl fmt::Display for AttributeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeSpec::Bool => write!(f, "bool"),
            AttributeSpec::Str => write!(f, "str"),
            AttributeSpec::Enum(values) => {
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "in [{}]", rendered.join(", "))
            }
            AttributeSpec::Int(domain) => write!(f, "int in {}", domain),
            AttributeSpec::Float(domain) => write!(f, "float in {}", domain),
            AttributeSpec::Class(name) => write!(f, "{}", name),
            AttributeSpec::List { size, elem } => match elem {
                Some(spec) => write!(f, "list({}) of size in {}", spec, size),
                None => write!(f, "list of size in {}", size),
            },
        }
    }
}
