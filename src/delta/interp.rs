//! Minimal interpreter for artifact function bodies.
//!
//! Executes the statement and expression subset that delta-modified
//! definitions actually use: constants, names, attribute access, calls,
//! arithmetic, comparisons, boolean operators, return, local assignment
//! and `if`. Anything outside the subset fails loudly with
//! `DeltaError::Unsupported` rather than approximating.

use std::collections::HashMap;

use rustpython_parser::ast::{self, Expr, Stmt};

use crate::core::value::Value;
use crate::delta::artifact::{EnvBinding, FunctionNode, Node, NodeId};
use crate::delta::build::VariantBuild;
use crate::errors::DeltaError;

/// A runtime slot: a plain value, a graph node, or a callable bound to
/// an optional receiver.
#[derive(Debug, Clone)]
enum Rt {
    Val(Value),
    Node(NodeId),
    Bound { func: NodeId, recv: Option<Value> },
}

enum Flow {
    Normal,
    Return(Value),
}

pub(crate) struct Interp<'a> {
    build: &'a VariantBuild,
}

impl<'a> Interp<'a> {
    pub fn new(build: &'a VariantBuild) -> Self {
        Self { build }
    }

    /// Call the node at `id` with positional values.
    pub fn call_node(&self, id: NodeId, args: Vec<Value>) -> Result<Value, DeltaError> {
        match self.build.node(id) {
            Node::Function(func) => self.call_function(func, args),
            Node::Class(_) => self.instantiate_class(id, args),
            other => Err(DeltaError::Unsupported {
                what: format!("calling a {}", other.kind_name()),
            }),
        }
    }

    pub fn call_method(
        &self,
        receiver: &Value,
        name: &str,
        mut args: Vec<Value>,
    ) -> Result<Value, DeltaError> {
        let Value::Instance(inst) = receiver else {
            return Err(DeltaError::Unsupported {
                what: format!("method call on a {}", receiver.kind_name()),
            });
        };
        let class_id = self.build.resolve(&inst.class)?;
        let func_id =
            self.build
                .find_member(class_id, name)
                .ok_or_else(|| DeltaError::Missing {
                    kind: "Class",
                    owner: inst.class.clone(),
                    member: name.to_string(),
                })?;
        args.insert(0, receiver.clone());
        self.call_node(func_id, args)
    }

    fn instantiate_class(&self, id: NodeId, args: Vec<Value>) -> Result<Value, DeltaError> {
        if !args.is_empty() {
            return Err(DeltaError::Unsupported {
                what: "constructor arguments".to_string(),
            });
        }
        let path = self.build.path_of(id).ok_or_else(|| DeltaError::PathUnresolved {
            path: self.build.node(id).name().to_string(),
        })?;
        self.build.instantiate(&path)
    }

    fn call_function(&self, func: &FunctionNode, args: Vec<Value>) -> Result<Value, DeltaError> {
        if func.params.len() != args.len() {
            return Err(DeltaError::Arity {
                function: func.name.clone(),
                expected: func.params.len(),
                found: args.len(),
            });
        }
        let mut scope: HashMap<String, Rt> = HashMap::new();
        for (name, binding) in &func.env {
            let slot = match binding {
                EnvBinding::Node(id) => Rt::Node(*id),
                EnvBinding::Value(v) => Rt::Val(v.clone()),
            };
            scope.insert(name.clone(), slot);
        }
        for (param, arg) in func.params.iter().zip(args) {
            scope.insert(param.clone(), Rt::Val(arg));
        }
        match self.exec_block(&func.body, &mut scope)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::None),
        }
    }

    fn exec_block(
        &self,
        stmts: &[Stmt],
        scope: &mut HashMap<String, Rt>,
    ) -> Result<Flow, DeltaError> {
        for stmt in stmts {
            match stmt {
                Stmt::Return(ret) => {
                    let value = match &ret.value {
                        Some(expr) => self.eval_value(expr, scope)?,
                        None => Value::None,
                    };
                    return Ok(Flow::Return(value));
                }
                Stmt::Assign(assign) => {
                    let value = self.eval(&assign.value, scope)?;
                    match assign.targets.as_slice() {
                        [Expr::Name(name)] => {
                            scope.insert(name.id.to_string(), value);
                        }
                        _ => {
                            return Err(DeltaError::Unsupported {
                                what: "non-name assignment target".to_string(),
                            })
                        }
                    }
                }
                Stmt::Expr(e) => {
                    self.eval(&e.value, scope)?;
                }
                Stmt::If(branch) => {
                    let test = self.eval_value(&branch.test, scope)?;
                    let flow = if test.truthy() {
                        self.exec_block(&branch.body, scope)?
                    } else {
                        self.exec_block(&branch.orelse, scope)?
                    };
                    if let Flow::Return(_) = flow {
                        return Ok(flow);
                    }
                }
                Stmt::Pass(_) => {}
                other => {
                    return Err(DeltaError::Unsupported {
                        what: format!("statement {:?}", stmt_kind(other)),
                    })
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn eval_value(&self, expr: &Expr, scope: &mut HashMap<String, Rt>) -> Result<Value, DeltaError> {
        match self.eval(expr, scope)? {
            Rt::Val(v) => Ok(v),
            Rt::Bound { func, .. } => Ok(Value::Callable {
                name: self.build.node(func).name().to_string(),
            }),
            Rt::Node(id) => Ok(Value::Callable {
                name: self.build.node(id).name().to_string(),
            }),
        }
    }

    fn eval(&self, expr: &Expr, scope: &mut HashMap<String, Rt>) -> Result<Rt, DeltaError> {
        match expr {
            Expr::Constant(c) => Ok(Rt::Val(constant_value(&c.value)?)),
            Expr::Name(name) => scope
                .get(name.id.as_str())
                .cloned()
                .ok_or_else(|| DeltaError::UnknownName {
                    name: name.id.to_string(),
                }),
            Expr::Attribute(attr) => {
                let base = self.eval(&attr.value, scope)?;
                self.attribute(base, attr.attr.as_str())
            }
            Expr::Call(call) => {
                let target = self.eval(&call.func, scope)?;
                let mut args = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    args.push(self.eval_value(arg, scope)?);
                }
                if !call.keywords.is_empty() {
                    return Err(DeltaError::Unsupported {
                        what: "keyword arguments".to_string(),
                    });
                }
                match target {
                    Rt::Bound { func, recv } => {
                        let mut argv = args;
                        if let Some(receiver) = recv {
                            argv.insert(0, receiver);
                        }
                        self.call_node(func, argv).map(Rt::Val)
                    }
                    Rt::Node(id) => self.call_node(id, args).map(Rt::Val),
                    Rt::Val(v) => Err(DeltaError::Unsupported {
                        what: format!("calling a {}", v.kind_name()),
                    }),
                }
            }
            Expr::BinOp(op) => {
                let left = self.eval_value(&op.left, scope)?;
                let right = self.eval_value(&op.right, scope)?;
                binary(&op.op, left, right).map(Rt::Val)
            }
            Expr::UnaryOp(op) => {
                let operand = self.eval_value(&op.operand, scope)?;
                unary(&op.op, operand).map(Rt::Val)
            }
            Expr::BoolOp(op) => {
                // Python-style: the last evaluated operand is the result.
                let mut result = Value::None;
                for (i, part) in op.values.iter().enumerate() {
                    result = self.eval_value(part, scope)?;
                    let stop = match op.op {
                        ast::BoolOp::And => !result.truthy(),
                        ast::BoolOp::Or => result.truthy(),
                    };
                    if stop && i + 1 < op.values.len() {
                        break;
                    }
                }
                Ok(Rt::Val(result))
            }
            Expr::Compare(cmp) => {
                if cmp.ops.len() != 1 || cmp.comparators.len() != 1 {
                    return Err(DeltaError::Unsupported {
                        what: "chained comparison".to_string(),
                    });
                }
                let left = self.eval_value(&cmp.left, scope)?;
                let right = self.eval_value(&cmp.comparators[0], scope)?;
                compare(&cmp.ops[0], left, right).map(Rt::Val)
            }
            Expr::IfExp(e) => {
                let test = self.eval_value(&e.test, scope)?;
                if test.truthy() {
                    self.eval(&e.body, scope)
                } else {
                    self.eval(&e.orelse, scope)
                }
            }
            Expr::List(list) => {
                let mut items = Vec::with_capacity(list.elts.len());
                for elt in &list.elts {
                    items.push(self.eval_value(elt, scope)?);
                }
                Ok(Rt::Val(Value::List(items)))
            }
            _ => Err(DeltaError::Unsupported {
                what: "expression form".to_string(),
            }),
        }
    }

    fn attribute(&self, base: Rt, name: &str) -> Result<Rt, DeltaError> {
        match base {
            Rt::Node(id) => {
                let member = self
                    .build
                    .find_member(id, name)
                    .ok_or_else(|| DeltaError::Missing {
                        kind: self.build.node(id).kind_name(),
                        owner: self.build.node(id).name().to_string(),
                        member: name.to_string(),
                    })?;
                Ok(self.wrap_member(member, None))
            }
            Rt::Val(Value::Instance(inst)) => {
                if let Some(field) = inst.field(name) {
                    return Ok(Rt::Val(field.clone()));
                }
                let class_id = self.build.resolve(&inst.class)?;
                let member = self
                    .build
                    .find_member(class_id, name)
                    .ok_or_else(|| DeltaError::Missing {
                        kind: "Class",
                        owner: inst.class.clone(),
                        member: name.to_string(),
                    })?;
                Ok(self.wrap_member(member, Some(Value::Instance(inst))))
            }
            other => Err(DeltaError::Unsupported {
                what: format!("attribute access on {:?}", rt_kind(&other)),
            }),
        }
    }

    fn wrap_member(&self, id: NodeId, recv: Option<Value>) -> Rt {
        match self.build.node(id) {
            Node::Function(_) => Rt::Bound { func: id, recv },
            Node::Value(v) => Rt::Val(v.clone()),
            Node::Class(_) | Node::Module(_) => Rt::Node(id),
        }
    }
}

fn rt_kind(rt: &Rt) -> &'static str {
    match rt {
        Rt::Val(_) => "value",
        Rt::Node(_) => "node",
        Rt::Bound { .. } => "bound method",
    }
}

fn stmt_kind(stmt: &Stmt) -> &'static str {
    match stmt {
        Stmt::For(_) => "for",
        Stmt::While(_) => "while",
        Stmt::FunctionDef(_) => "nested def",
        Stmt::ClassDef(_) => "nested class",
        _ => "unsupported",
    }
}

fn constant_value(constant: &ast::Constant) -> Result<Value, DeltaError> {
    match constant {
        ast::Constant::None => Ok(Value::None),
        ast::Constant::Bool(b) => Ok(Value::Bool(*b)),
        ast::Constant::Str(s) => Ok(Value::Str(s.clone())),
        ast::Constant::Int(i) => i
            .to_string()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| DeltaError::Unsupported {
                what: "big integer literal".to_string(),
            }),
        ast::Constant::Float(x) => Ok(Value::Float(*x)),
        _ => Err(DeltaError::Unsupported {
            what: "constant form".to_string(),
        }),
    }
}

fn binary(op: &ast::Operator, left: Value, right: Value) -> Result<Value, DeltaError> {
    use ast::Operator::*;
    let unsupported = |left: &Value, right: &Value| DeltaError::Unsupported {
        what: format!("binary op on {} and {}", left.kind_name(), right.kind_name()),
    };
    match op {
        Add => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            (Value::List(a), Value::List(b)) => {
                let mut out = a.clone();
                out.extend(b.clone());
                Ok(Value::List(out))
            }
            _ => numeric(&left, &right, |a, b| a + b).ok_or_else(|| unsupported(&left, &right)),
        },
        Sub => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
            _ => numeric(&left, &right, |a, b| a - b).ok_or_else(|| unsupported(&left, &right)),
        },
        Mult => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
            _ => numeric(&left, &right, |a, b| a * b).ok_or_else(|| unsupported(&left, &right)),
        },
        Div => numeric(&left, &right, |a, b| a / b).ok_or_else(|| unsupported(&left, &right)),
        Mod => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) if *b != 0 => Ok(Value::Int(a.rem_euclid(*b))),
            _ => Err(unsupported(&left, &right)),
        },
        _ => Err(DeltaError::Unsupported {
            what: "binary operator".to_string(),
        }),
    }
}

fn numeric(left: &Value, right: &Value, f: impl Fn(f64, f64) -> f64) -> Option<Value> {
    let as_f64 = |v: &Value| match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    };
    Some(Value::Float(f(as_f64(left)?, as_f64(right)?)))
}

fn unary(op: &ast::UnaryOp, operand: Value) -> Result<Value, DeltaError> {
    match op {
        ast::UnaryOp::Not => Ok(Value::Bool(!operand.truthy())),
        ast::UnaryOp::USub => match operand {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(x) => Ok(Value::Float(-x)),
            other => Err(DeltaError::Unsupported {
                what: format!("negating a {}", other.kind_name()),
            }),
        },
        _ => Err(DeltaError::Unsupported {
            what: "unary operator".to_string(),
        }),
    }
}

fn compare(op: &ast::CmpOp, left: Value, right: Value) -> Result<Value, DeltaError> {
    use ast::CmpOp::*;
    match op {
        Is => Ok(Value::Bool(left == Value::None && right == Value::None)),
        IsNot => Ok(Value::Bool(!(left == Value::None && right == Value::None))),
        Eq => Ok(Value::Bool(left == right)),
        NotEq => Ok(Value::Bool(left != right)),
        Lt | LtE | Gt | GtE => {
            let ord = left.compare(&right).ok_or_else(|| DeltaError::Unsupported {
                what: format!(
                    "ordering {} against {}",
                    left.kind_name(),
                    right.kind_name()
                ),
            })?;
            let result = match op {
                Lt => ord == std::cmp::Ordering::Less,
                LtE => ord != std::cmp::Ordering::Greater,
                Gt => ord == std::cmp::Ordering::Greater,
                GtE => ord != std::cmp::Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
        _ => Err(DeltaError::Unsupported {
            what: "comparison operator".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::artifact::GraphBuilder;
    use crate::delta::build::Variant;

    fn build_with(source: &str) -> (Variant, String) {
        let mut g = GraphBuilder::new();
        let m = g.module("M").unwrap();
        g.function(m, source).unwrap();
        (Variant::new(g.finish()), "M".to_string())
    }

    #[test]
    fn test_call_simple_function() {
        let (variant, _) = build_with("def add(x, y):\n    return x + y\n");
        let build = variant.build();
        let result = build
            .call("M.add", vec![Value::Int(2), Value::Int(3)])
            .unwrap();
        assert_eq!(result, Value::Int(5));
    }

    #[test]
    fn test_arity_mismatch() {
        let (variant, _) = build_with("def one(x):\n    return x\n");
        let build = variant.build();
        let err = build.call("M.one", vec![]).unwrap_err();
        assert!(matches!(err, DeltaError::Arity { .. }));
    }

    #[test]
    fn test_locals_and_if() {
        let source = "def clamp(x):\n    limit = 10\n    if x > limit:\n        return limit\n    return x\n";
        let (variant, _) = build_with(source);
        let build = variant.build();
        assert_eq!(build.call("M.clamp", vec![Value::Int(99)]).unwrap(), Value::Int(10));
        assert_eq!(build.call("M.clamp", vec![Value::Int(3)]).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_method_call_through_instance() {
        let mut g = GraphBuilder::new();
        let m = g.module("M").unwrap();
        let c = g.class(m, "C", &[]).unwrap();
        g.function(c, "def m(self):\n    return 1\n").unwrap();
        let variant = Variant::new(g.finish());
        let build = variant.build();
        let instance = build.instantiate("M.C").unwrap();
        let result = build.call_method(&instance, "m", vec![]).unwrap();
        assert_eq!(result, Value::Int(1));
    }

    #[test]
    fn test_method_resolves_through_bases() {
        let mut g = GraphBuilder::new();
        let m = g.module("M").unwrap();
        let base = g.class(m, "Base", &[]).unwrap();
        g.function(base, "def greet(self):\n    return 'hi'\n").unwrap();
        g.class(m, "Derived", &[base]).unwrap();
        let variant = Variant::new(g.finish());
        let build = variant.build();
        let instance = build.instantiate("M.Derived").unwrap();
        let result = build.call_method(&instance, "greet", vec![]).unwrap();
        assert_eq!(result, Value::Str("hi".into()));
    }

    #[test]
    fn test_unsupported_statement_fails_loudly() {
        let (variant, _) = build_with("def spin(x):\n    while x:\n        pass\n    return x\n");
        let build = variant.build();
        let err = build.call("M.spin", vec![Value::Int(0)]).unwrap_err();
        assert!(matches!(err, DeltaError::Unsupported { .. }));
    }
}
