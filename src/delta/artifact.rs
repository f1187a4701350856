//! The artifact graph: modules, classes, functions, and plain values.
//!
//! Nodes live in an arena and reference each other by `NodeId`, so a
//! variant build can localize a node without touching its parents'
//! member entries. Function sources are parsed eagerly; parse errors
//! surface when the graph is built, not when a body first runs.

use std::sync::Arc;

use rustpython_parser::ast;

use crate::core::value::Value;
use crate::errors::DeltaError;
use crate::logic::types::TypeStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Ordered member table of a module or class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Members(Vec<(String, NodeId)>);

impl Members {
    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, id)| *id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn insert(&mut self, name: impl Into<String>, id: NodeId) {
        self.0.push((name.into(), id));
    }

    /// Replace the binding for `name`, keeping its position.
    pub fn set(&mut self, name: &str, id: NodeId) {
        match self.0.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = id,
            None => self.0.push((name.to_string(), id)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<NodeId> {
        let i = self.0.iter().position(|(n, _)| n == name)?;
        Some(self.0.remove(i).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeId)> + '_ {
        self.0.iter().map(|(n, id)| (n.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleNode {
    pub name: String,
    pub members: Members,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassNode {
    pub name: String,
    pub bases: Vec<NodeId>,
    pub members: Members,
}

/// A binding captured by a function, resolved when the body runs.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvBinding {
    Node(NodeId),
    Value(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionNode {
    pub name: String,
    pub params: Vec<String>,
    pub source: Option<String>,
    pub body: Vec<ast::Stmt>,
    pub env: Vec<(String, EnvBinding)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Module(ModuleNode),
    Class(ClassNode),
    Function(FunctionNode),
    Value(Value),
}

impl Node {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Module(_) => "Module",
            Node::Class(_) => "Class",
            Node::Function(_) => "Function",
            Node::Value(_) => "Value",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Module(m) => &m.name,
            Node::Class(c) => &c.name,
            Node::Function(f) => &f.name,
            Node::Value(_) => "<value>",
        }
    }

    pub fn members(&self) -> Option<&Members> {
        match self {
            Node::Module(m) => Some(&m.members),
            Node::Class(c) => Some(&c.members),
            _ => None,
        }
    }

    pub fn members_mut(&mut self) -> Option<&mut Members> {
        match self {
            Node::Module(m) => Some(&mut m.members),
            Node::Class(c) => Some(&mut c.members),
            _ => None,
        }
    }
}

/// An immutable seed graph shared by every variant built from it.
#[derive(Debug)]
pub struct Artifacts {
    pub(crate) nodes: Vec<Arc<Node>>,
    pub(crate) roots: Vec<(String, NodeId)>,
}

impl Artifacts {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    /// Handle for identity assertions: two builds share a node exactly
    /// when their arcs are pointer-equal.
    pub fn node_arc(&self, id: NodeId) -> Arc<Node> {
        Arc::clone(&self.nodes[id.0 as usize])
    }

    pub fn roots(&self) -> &[(String, NodeId)] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Builder for seed graphs.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    paths: Vec<String>,
    roots: Vec<(String, NodeId)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, node: Node, path: String) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.paths.push(path);
        id
    }

    fn attach(&mut self, parent: NodeId, name: &str, id: NodeId) -> Result<(), DeltaError> {
        let owner = &mut self.nodes[parent.0 as usize];
        let kind = owner.kind_name();
        let owner_name = owner.name().to_string();
        let members = owner.members_mut().ok_or(DeltaError::NotAClass {
            owner: owner_name.clone(),
            op: "add",
        })?;
        if members.contains(name) {
            return Err(DeltaError::AlreadyExists {
                kind,
                owner: owner_name,
                member: name.to_string(),
            });
        }
        members.insert(name, id);
        Ok(())
    }

    /// Declare a root module.
    pub fn module(&mut self, name: impl Into<String>) -> Result<NodeId, DeltaError> {
        let name = name.into();
        if self.roots.iter().any(|(n, _)| *n == name) {
            return Err(DeltaError::DuplicateRoot { name });
        }
        let id = self.alloc(
            Node::Module(ModuleNode {
                name: name.clone(),
                members: Members::default(),
            }),
            name.clone(),
        );
        self.roots.push((name, id));
        Ok(id)
    }

    pub fn submodule(&mut self, parent: NodeId, name: impl Into<String>) -> Result<NodeId, DeltaError> {
        let name = name.into();
        let path = format!("{}.{}", self.paths[parent.0 as usize], name);
        let id = self.alloc(
            Node::Module(ModuleNode {
                name: name.clone(),
                members: Members::default(),
            }),
            path,
        );
        self.attach(parent, &name, id)?;
        Ok(id)
    }

    /// Declare a class. Its bases are observed into the global subtype
    /// store so the logical-type runtime can reason about it.
    pub fn class(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        bases: &[NodeId],
    ) -> Result<NodeId, DeltaError> {
        let name = name.into();
        let path = format!("{}.{}", self.paths[parent.0 as usize], name);
        let base_paths: Vec<String> = bases
            .iter()
            .map(|b| self.paths[b.0 as usize].clone())
            .collect();
        let base_refs: Vec<&str> = base_paths.iter().map(String::as_str).collect();
        TypeStore::global().observe_class(&path, &base_refs);
        let id = self.alloc(
            Node::Class(ClassNode {
                name: name.clone(),
                bases: bases.to_vec(),
                members: Members::default(),
            }),
            path,
        );
        self.attach(parent, &name, id)?;
        Ok(id)
    }

    /// Declare a function from source; the name comes from the `def`.
    pub fn function(&mut self, parent: NodeId, source: &str) -> Result<NodeId, DeltaError> {
        let parsed = crate::delta::original::parse_function(source)?;
        let name = parsed.name.clone();
        let path = format!("{}.{}", self.paths[parent.0 as usize], name);
        let id = self.alloc(
            Node::Function(FunctionNode {
                name: name.clone(),
                params: parsed.params,
                source: Some(source.to_string()),
                body: parsed.body,
                env: Vec::new(),
            }),
            path,
        );
        self.attach(parent, &name, id)?;
        Ok(id)
    }

    pub fn value(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        value: Value,
    ) -> Result<NodeId, DeltaError> {
        let name = name.into();
        let path = format!("{}.{}", self.paths[parent.0 as usize], name);
        let id = self.alloc(Node::Value(value), path);
        self.attach(parent, &name, id)?;
        Ok(id)
    }

    pub fn finish(self) -> Artifacts {
        Artifacts {
            nodes: self.nodes.into_iter().map(Arc::new).collect(),
            roots: self.roots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_simple_graph() {
        let mut g = GraphBuilder::new();
        let m = g.module("M").unwrap();
        let c = g.class(m, "C", &[]).unwrap();
        g.function(c, "def m(self):\n    return 1\n").unwrap();
        g.value(m, "answer", Value::Int(42)).unwrap();
        let seed = g.finish();
        assert_eq!(seed.len(), 4);
        let class = seed.node(c);
        assert!(class.members().unwrap().contains("m"));
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let mut g = GraphBuilder::new();
        let m = g.module("M").unwrap();
        g.value(m, "x", Value::Int(1)).unwrap();
        let err = g.value(m, "x", Value::Int(2)).unwrap_err();
        assert!(matches!(err, DeltaError::AlreadyExists { .. }));
    }

    #[test]
    fn test_duplicate_root_rejected() {
        let mut g = GraphBuilder::new();
        g.module("M").unwrap();
        assert!(matches!(
            g.module("M"),
            Err(DeltaError::DuplicateRoot { .. })
        ));
    }

    #[test]
    fn test_class_bases_observed() {
        let mut g = GraphBuilder::new();
        let m = g.module("zoo").unwrap();
        let animal = g.class(m, "Animal", &[]).unwrap();
        g.class(m, "Cat", &[animal]).unwrap();
        let store = TypeStore::global();
        assert!(store.mro("zoo.Cat").contains(&"zoo.Animal".to_string()));
    }

    #[test]
    fn test_parse_error_surfaces() {
        let mut g = GraphBuilder::new();
        let m = g.module("M").unwrap();
        let err = g.function(m, "def broken(:\n").unwrap_err();
        assert!(matches!(err, DeltaError::Parse { .. }));
    }
}
