//! Parsing of delta function sources and rewriting of `original`.
//!
//! When a modified definition references the bare name `original`, every
//! free occurrence is rewritten into an attribute access on the owning
//! object under a fresh member name (`name#0`, `name#1`, ...) that holds
//! the shadowed previous definition. `self.original` is rewritten the
//! same way for methods that go through the receiver.

use rustpython_parser::ast::{self, Expr, Stmt};
use rustpython_parser::{parse, Mode};

use crate::errors::DeltaError;

pub(crate) const ORIGINAL: &str = "original";

#[derive(Debug, Clone)]
pub(crate) struct ParsedFunction {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

/// Parse a single `def` from source. Leading indentation is stripped the
/// way a decorator body would be.
pub(crate) fn parse_function(source: &str) -> Result<ParsedFunction, DeltaError> {
    let source = dedent(source);
    let module = parse(&source, Mode::Module, "<delta>").map_err(|e| DeltaError::Parse {
        message: e.to_string(),
    })?;
    let ast::Mod::Module(module) = module else {
        return Err(DeltaError::Parse {
            message: "expected a module".to_string(),
        });
    };
    for stmt in module.body {
        if let Stmt::FunctionDef(def) = stmt {
            let params = def
                .args
                .posonlyargs
                .iter()
                .chain(def.args.args.iter())
                .map(|arg| arg.def.arg.to_string())
                .collect();
            return Ok(ParsedFunction {
                name: def.name.to_string(),
                params,
                body: def.body,
            });
        }
    }
    Err(DeltaError::Parse {
        message: "source does not define a function".to_string(),
    })
}

/// Strip the common leading indentation of all non-empty lines.
fn dedent(source: &str) -> String {
    let indent = source
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    source
        .lines()
        .map(|line| if line.len() >= indent { &line[indent..] } else { line })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Does the body reference `original` anywhere we rewrite?
pub(crate) fn uses_original(body: &[Stmt]) -> bool {
    body.iter().any(stmt_uses_original)
}

fn stmt_uses_original(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return(ret) => ret.value.as_deref().map_or(false, expr_uses_original),
        Stmt::Assign(assign) => expr_uses_original(&assign.value),
        Stmt::Expr(e) => expr_uses_original(&e.value),
        Stmt::If(branch) => {
            expr_uses_original(&branch.test)
                || branch.body.iter().any(stmt_uses_original)
                || branch.orelse.iter().any(stmt_uses_original)
        }
        _ => false,
    }
}

fn expr_uses_original(expr: &Expr) -> bool {
    match expr {
        Expr::Name(name) => name.id.as_str() == ORIGINAL,
        Expr::Attribute(attr) => {
            attr.attr.as_str() == ORIGINAL && is_self(&attr.value)
                || expr_uses_original(&attr.value)
        }
        Expr::Call(call) => {
            expr_uses_original(&call.func) || call.args.iter().any(expr_uses_original)
        }
        Expr::BinOp(op) => expr_uses_original(&op.left) || expr_uses_original(&op.right),
        Expr::UnaryOp(op) => expr_uses_original(&op.operand),
        Expr::BoolOp(op) => op.values.iter().any(expr_uses_original),
        Expr::Compare(cmp) => {
            expr_uses_original(&cmp.left) || cmp.comparators.iter().any(expr_uses_original)
        }
        Expr::IfExp(e) => {
            expr_uses_original(&e.test)
                || expr_uses_original(&e.body)
                || expr_uses_original(&e.orelse)
        }
        _ => false,
    }
}

fn is_self(expr: &Expr) -> bool {
    matches!(expr, Expr::Name(name) if name.id.as_str() == "self")
}

/// Rewrite every free `original` in `body` into `<alias>.<fresh>`, and
/// `self.original` into `self.<fresh>`. One pass, idempotent per call.
pub(crate) fn rewrite_original(body: Vec<Stmt>, alias: &str, fresh: &str) -> Vec<Stmt> {
    body.into_iter()
        .map(|stmt| rewrite_stmt(stmt, alias, fresh))
        .collect()
}

fn rewrite_stmt(stmt: Stmt, alias: &str, fresh: &str) -> Stmt {
    match stmt {
        Stmt::Return(mut ret) => {
            ret.value = ret.value.map(|e| Box::new(rewrite_expr(*e, alias, fresh)));
            Stmt::Return(ret)
        }
        Stmt::Assign(mut assign) => {
            assign.value = Box::new(rewrite_expr(*assign.value, alias, fresh));
            Stmt::Assign(assign)
        }
        Stmt::Expr(mut e) => {
            e.value = Box::new(rewrite_expr(*e.value, alias, fresh));
            Stmt::Expr(e)
        }
        Stmt::If(mut branch) => {
            branch.test = Box::new(rewrite_expr(*branch.test, alias, fresh));
            branch.body = rewrite_original(branch.body, alias, fresh);
            branch.orelse = rewrite_original(branch.orelse, alias, fresh);
            Stmt::If(branch)
        }
        other => other,
    }
}

fn rewrite_expr(expr: Expr, alias: &str, fresh: &str) -> Expr {
    match expr {
        Expr::Name(name) if name.id.as_str() == ORIGINAL => {
            let range = name.range;
            Expr::Attribute(ast::ExprAttribute {
                range,
                value: Box::new(Expr::Name(ast::ExprName {
                    range,
                    id: ast::Identifier::new(alias.to_string()),
                    ctx: ast::ExprContext::Load,
                })),
                attr: ast::Identifier::new(fresh.to_string()),
                ctx: ast::ExprContext::Load,
            })
        }
        Expr::Attribute(mut attr) => {
            if attr.attr.as_str() == ORIGINAL && is_self(&attr.value) {
                attr.attr = ast::Identifier::new(fresh.to_string());
                Expr::Attribute(attr)
            } else {
                attr.value = Box::new(rewrite_expr(*attr.value, alias, fresh));
                Expr::Attribute(attr)
            }
        }
        Expr::Call(mut call) => {
            call.func = Box::new(rewrite_expr(*call.func, alias, fresh));
            call.args = call
                .args
                .into_iter()
                .map(|a| rewrite_expr(a, alias, fresh))
                .collect();
            Expr::Call(call)
        }
        Expr::BinOp(mut op) => {
            op.left = Box::new(rewrite_expr(*op.left, alias, fresh));
            op.right = Box::new(rewrite_expr(*op.right, alias, fresh));
            Expr::BinOp(op)
        }
        Expr::UnaryOp(mut op) => {
            op.operand = Box::new(rewrite_expr(*op.operand, alias, fresh));
            Expr::UnaryOp(op)
        }
        Expr::BoolOp(mut op) => {
            op.values = op
                .values
                .into_iter()
                .map(|v| rewrite_expr(v, alias, fresh))
                .collect();
            Expr::BoolOp(op)
        }
        Expr::Compare(mut cmp) => {
            cmp.left = Box::new(rewrite_expr(*cmp.left, alias, fresh));
            cmp.comparators = cmp
                .comparators
                .into_iter()
                .map(|c| rewrite_expr(c, alias, fresh))
                .collect();
            Expr::Compare(cmp)
        }
        Expr::IfExp(mut e) => {
            e.test = Box::new(rewrite_expr(*e.test, alias, fresh));
            e.body = Box::new(rewrite_expr(*e.body, alias, fresh));
            e.orelse = Box::new(rewrite_expr(*e.orelse, alias, fresh));
            Expr::IfExp(e)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_function() {
        let parsed = parse_function("def m(self, x):\n    return x\n").unwrap();
        assert_eq!(parsed.name, "m");
        assert_eq!(parsed.params, vec!["self", "x"]);
        assert_eq!(parsed.body.len(), 1);
    }

    #[test]
    fn test_dedent() {
        let parsed = parse_function("    def m(self):\n        return 1\n").unwrap();
        assert_eq!(parsed.name, "m");
    }

    #[test]
    fn test_detects_original() {
        let with = parse_function("def m(self):\n    return original(self) + 1\n").unwrap();
        assert!(uses_original(&with.body));
        let without = parse_function("def m(self):\n    return 1\n").unwrap();
        assert!(!uses_original(&without.body));
    }

    #[test]
    fn test_rewrite_replaces_name() {
        let parsed = parse_function("def m(self):\n    return original(self) + 1\n").unwrap();
        let body = rewrite_original(parsed.body, "__owner", "m#0");
        assert!(!uses_original(&body));
        // The call target is now an attribute on the owner alias.
        let Stmt::Return(ret) = &body[0] else {
            panic!("expected return");
        };
        let Expr::BinOp(op) = ret.value.as_deref().unwrap() else {
            panic!("expected binop");
        };
        let Expr::Call(call) = op.left.as_ref() else {
            panic!("expected call");
        };
        let Expr::Attribute(attr) = call.func.as_ref() else {
            panic!("expected attribute");
        };
        assert_eq!(attr.attr.as_str(), "m#0");
    }

    #[test]
    fn test_rewrite_self_original() {
        let parsed = parse_function("def m(self):\n    return self.original(self)\n").unwrap();
        let body = rewrite_original(parsed.body, "__owner", "m#1");
        assert!(!uses_original(&body));
    }
}
