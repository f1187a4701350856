//! Variant builds: copy-on-write views over a seed artifact graph.
//!
//! A `Variant` is a factory; each `build()` yields an independent
//! `VariantBuild` whose node table shares the seed's nodes through
//! `Arc`s. The first mutation of a node localizes it (clone-on-write),
//! so no delta ever mutates the seed graph, and node ids stay stable so
//! parents never need patching. `Cursor` exposes the delta operations.

use std::sync::Arc;

use tracing::debug;

use crate::core::value::{Instance, Value};
use crate::delta::artifact::{
    Artifacts, ClassNode, EnvBinding, FunctionNode, Members, ModuleNode, Node, NodeId,
};
use crate::delta::original;
use crate::errors::DeltaError;

/// Factory for variant builds over one seed graph.
pub struct Variant {
    seed: Arc<Artifacts>,
}

impl Variant {
    pub fn new(seed: Artifacts) -> Self {
        Self {
            seed: Arc::new(seed),
        }
    }

    pub fn seed(&self) -> &Artifacts {
        &self.seed
    }

    /// A fresh build sharing every node with the seed until mutated.
    pub fn build(&self) -> VariantBuild {
        VariantBuild {
            nodes: self.seed.nodes.clone(),
            roots: self.seed.roots.clone(),
        }
    }
}

/// One variant under construction.
#[derive(Debug)]
pub struct VariantBuild {
    nodes: Vec<Arc<Node>>,
    roots: Vec<(String, NodeId)>,
}

impl VariantBuild {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    /// Handle for identity assertions against the seed or other builds.
    pub fn node_arc(&self, id: NodeId) -> Arc<Node> {
        Arc::clone(&self.nodes[id.0 as usize])
    }

    pub fn roots(&self) -> &[(String, NodeId)] {
        &self.roots
    }

    /// Localize a node for mutation. Shared nodes are cloned; the seed
    /// and sibling builds are never touched.
    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        Arc::make_mut(&mut self.nodes[id.0 as usize])
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Arc::new(node));
        id
    }

    /// Resolve a dotted path from the root modules.
    pub fn resolve(&self, path: &str) -> Result<NodeId, DeltaError> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut current = self
            .roots
            .iter()
            .find(|(name, _)| name == first)
            .map(|(_, id)| *id)
            .ok_or_else(|| DeltaError::PathUnresolved {
                path: path.to_string(),
            })?;
        for segment in segments {
            let members = self.node(current).members().ok_or_else(|| {
                DeltaError::PathUnresolved {
                    path: path.to_string(),
                }
            })?;
            current = members.get(segment).ok_or_else(|| DeltaError::PathUnresolved {
                path: path.to_string(),
            })?;
        }
        Ok(current)
    }

    /// Dotted path of a node, by search from the roots.
    pub fn path_of(&self, id: NodeId) -> Option<String> {
        fn walk(
            build: &VariantBuild,
            current: NodeId,
            target: NodeId,
            prefix: &str,
        ) -> Option<String> {
            if current == target {
                return Some(prefix.to_string());
            }
            let members = build.node(current).members()?;
            for (name, child) in members.iter() {
                let path = format!("{}.{}", prefix, name);
                if let Some(found) = walk(build, child, target, &path) {
                    return Some(found);
                }
            }
            None
        }
        for (name, root) in &self.roots {
            if let Some(found) = walk(self, *root, id, name) {
                return Some(found);
            }
        }
        None
    }

    /// Cursor over the node at `path`.
    pub fn at(&mut self, path: &str) -> Result<Cursor<'_>, DeltaError> {
        let id = self.resolve(path)?;
        Ok(Cursor { build: self, id })
    }

    pub fn cursor(&mut self, id: NodeId) -> Cursor<'_> {
        Cursor { build: self, id }
    }

    /// Instantiate the class at `path`.
    pub fn instantiate(&self, path: &str) -> Result<Value, DeltaError> {
        let id = self.resolve(path)?;
        match self.node(id) {
            Node::Class(_) => Ok(Value::Instance(Instance::new(path))),
            other => Err(DeltaError::NotAClass {
                owner: other.name().to_string(),
                op: "instantiate",
            }),
        }
    }

    /// Call the function at `path`.
    pub fn call(&self, path: &str, args: Vec<Value>) -> Result<Value, DeltaError> {
        let id = self.resolve(path)?;
        crate::delta::interp::Interp::new(self).call_node(id, args)
    }

    /// Call a method on an instance, resolving through the class's
    /// bases depth-first.
    pub fn call_method(
        &self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, DeltaError> {
        crate::delta::interp::Interp::new(self).call_method(receiver, name, args)
    }

    /// Method lookup through a class's bases, depth-first left-to-right.
    pub(crate) fn find_member(&self, class_id: NodeId, name: &str) -> Option<NodeId> {
        match self.node(class_id) {
            Node::Class(class) => {
                if let Some(found) = class.members.get(name) {
                    return Some(found);
                }
                for &base in &class.bases {
                    if let Some(found) = self.find_member(base, name) {
                        return Some(found);
                    }
                }
                None
            }
            other => other.members().and_then(|m| m.get(name)),
        }
    }
}

/// A wrapper over one node exposing the delta operations. Mutations
/// localize the target before touching it.
pub struct Cursor<'a> {
    build: &'a mut VariantBuild,
    id: NodeId,
}

impl<'a> Cursor<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node(&self) -> &Node {
        self.build.node(self.id)
    }

    /// Descend to a member.
    pub fn member(self, name: &str) -> Result<Cursor<'a>, DeltaError> {
        let id = self
            .node()
            .members()
            .and_then(|m| m.get(name))
            .ok_or_else(|| self.missing(name))?;
        Ok(Cursor {
            build: self.build,
            id,
        })
    }

    fn missing(&self, member: &str) -> DeltaError {
        let node = self.node();
        DeltaError::Missing {
            kind: node.kind_name(),
            owner: node.name().to_string(),
            member: member.to_string(),
        }
    }

    fn exists(&self, member: &str) -> DeltaError {
        let node = self.node();
        DeltaError::AlreadyExists {
            kind: node.kind_name(),
            owner: node.name().to_string(),
            member: member.to_string(),
        }
    }

    fn members_mut(&mut self, op: &'static str) -> Result<&mut Members, DeltaError> {
        let owner = self.build.node(self.id);
        if owner.members().is_none() {
            return Err(DeltaError::NotAClass {
                owner: owner.name().to_string(),
                op,
            });
        }
        Ok(self
            .build
            .node_mut(self.id)
            .members_mut()
            .expect("checked above"))
    }

    fn check_absent(&self, name: &str) -> Result<(), DeltaError> {
        match self.node().members() {
            Some(members) if members.contains(name) => Err(self.exists(name)),
            _ => Ok(()),
        }
    }

    /// `add(name, value)`: fails if the member already exists.
    pub fn add_value(&mut self, name: &str, value: Value) -> Result<(), DeltaError> {
        self.check_absent(name)?;
        let id = self.build.alloc(Node::Value(value));
        self.members_mut("add")?.insert(name, id);
        debug!(member = name, "added value");
        Ok(())
    }

    /// `add` with a function body; the member name comes from the `def`
    /// unless overridden with `add_function_named`.
    pub fn add_function(&mut self, source: &str) -> Result<(), DeltaError> {
        let parsed = original::parse_function(source)?;
        let name = parsed.name.clone();
        self.install_function(&name, source, parsed, false)
    }

    pub fn add_function_named(&mut self, name: &str, source: &str) -> Result<(), DeltaError> {
        let parsed = original::parse_function(source)?;
        self.install_function(name, source, parsed, false)
    }

    /// `add` of a nested class.
    pub fn add_class(&mut self, name: &str, bases: &[NodeId]) -> Result<(), DeltaError> {
        self.check_absent(name)?;
        let path = self
            .build
            .path_of(self.id)
            .map(|p| format!("{}.{}", p, name))
            .unwrap_or_else(|| name.to_string());
        let base_paths: Vec<String> = bases
            .iter()
            .filter_map(|b| self.build.path_of(*b))
            .collect();
        let base_refs: Vec<&str> = base_paths.iter().map(String::as_str).collect();
        crate::logic::types::TypeStore::global().observe_class(&path, &base_refs);
        let id = self.build.alloc(Node::Class(ClassNode {
            name: name.to_string(),
            bases: bases.to_vec(),
            members: Members::default(),
        }));
        self.members_mut("add")?.insert(name, id);
        Ok(())
    }

    pub fn add_module(&mut self, name: &str) -> Result<(), DeltaError> {
        self.check_absent(name)?;
        let id = self.build.alloc(Node::Module(ModuleNode {
            name: name.to_string(),
            members: Members::default(),
        }));
        self.members_mut("add")?.insert(name, id);
        Ok(())
    }

    /// `remove(name)`: fails if the member is absent.
    pub fn remove(&mut self, name: &str) -> Result<(), DeltaError> {
        if self.node().members().map_or(true, |m| !m.contains(name)) {
            return Err(self.missing(name));
        }
        self.members_mut("remove")?.remove(name);
        debug!(member = name, "removed member");
        Ok(())
    }

    /// `modify(name, value)`: fails if the member is absent.
    pub fn modify_value(&mut self, name: &str, value: Value) -> Result<(), DeltaError> {
        if self.node().members().map_or(true, |m| !m.contains(name)) {
            return Err(self.missing(name));
        }
        let id = self.build.alloc(Node::Value(value));
        self.members_mut("modify")?.set(name, id);
        Ok(())
    }

    /// `modify(name, fn)`. If the new body references `original`, the
    /// previous definition is copied to a fresh `name#k` member and the
    /// body is rewritten so `original(...)` resolves to it.
    pub fn modify_function(&mut self, name: &str, source: &str) -> Result<(), DeltaError> {
        if self.node().members().map_or(true, |m| !m.contains(name)) {
            return Err(self.missing(name));
        }
        let parsed = original::parse_function(source)?;
        self.install_function(name, source, parsed, true)
    }

    fn install_function(
        &mut self,
        name: &str,
        source: &str,
        parsed: original::ParsedFunction,
        replace: bool,
    ) -> Result<(), DeltaError> {
        if !replace {
            self.check_absent(name)?;
        }
        let mut body = parsed.body;
        let mut env = Vec::new();
        if replace && original::uses_original(&body) {
            let members = self.node().members().expect("owner has members");
            let fresh = fresh_member_name(members, name);
            let previous = members.get(name).expect("presence checked");
            let alias = owner_alias(&parsed.params);
            body = original::rewrite_original(body, &alias, &fresh);
            env.push((alias, EnvBinding::Node(self.id)));
            // The shadowed definition stays reachable at name#k.
            self.members_mut("modify")?.insert(fresh.as_str(), previous);
            debug!(member = name, shadow = %fresh, "rewrote original reference");
        }
        let id = self.build.alloc(Node::Function(FunctionNode {
            name: name.to_string(),
            params: parsed.params,
            source: Some(source.to_string()),
            body,
            env,
        }));
        let members = self.members_mut(if replace { "modify" } else { "add" })?;
        if replace {
            members.set(name, id);
        } else {
            members.insert(name, id);
        }
        Ok(())
    }

    fn class_mut(&mut self, op: &'static str) -> Result<&mut ClassNode, DeltaError> {
        match self.build.node(self.id) {
            Node::Class(_) => match self.build.node_mut(self.id) {
                Node::Class(class) => Ok(class),
                _ => unreachable!(),
            },
            other => Err(DeltaError::NotAClass {
                owner: other.name().to_string(),
                op,
            }),
        }
    }

    /// Append bases not already present, preserving order.
    pub fn add_extends(&mut self, bases: &[NodeId]) -> Result<(), DeltaError> {
        let class = self.class_mut("add_extends")?;
        for &base in bases {
            if !class.bases.contains(&base) {
                class.bases.push(base);
            }
        }
        Ok(())
    }

    /// Remove bases; fails fast when any named base is not currently a
    /// base, without partial mutation.
    pub fn remove_extends(&mut self, bases: &[NodeId]) -> Result<(), DeltaError> {
        let current = match self.build.node(self.id) {
            Node::Class(class) => class.bases.clone(),
            other => {
                return Err(DeltaError::NotAClass {
                    owner: other.name().to_string(),
                    op: "remove_extends",
                })
            }
        };
        let absent: Vec<String> = bases
            .iter()
            .copied()
            .filter(|b| !current.contains(b))
            .map(|b| self.build.node(b).name().to_string())
            .collect();
        if !absent.is_empty() {
            return Err(DeltaError::NotABase {
                class: self.node().name().to_string(),
                bases: absent,
            });
        }
        let class = self.class_mut("remove_extends")?;
        class.bases.retain(|b| !bases.contains(b));
        Ok(())
    }

    /// Replace the base list atomically, dropping duplicates while
    /// preserving first occurrence.
    pub fn set_extends(&mut self, bases: &[NodeId]) -> Result<(), DeltaError> {
        let class = self.class_mut("set_extends")?;
        let mut deduped = Vec::with_capacity(bases.len());
        for &base in bases {
            if !deduped.contains(&base) {
                deduped.push(base);
            }
        }
        class.bases = deduped;
        Ok(())
    }
}

/// Smallest `name#k` not already present on the owner.
fn fresh_member_name(members: &Members, name: &str) -> String {
    let mut k = 0;
    loop {
        let candidate = format!("{}#{}", name, k);
        if !members.contains(&candidate) {
            return candidate;
        }
        k += 1;
    }
}

/// Alias under which the owner is bound inside a rewritten body; must
/// not collide with any parameter.
fn owner_alias(params: &[String]) -> String {
    let mut alias = "__delta_owner__".to_string();
    while params.iter().any(|p| *p == alias) {
        alias.push('_');
    }
    alias
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::artifact::GraphBuilder;

    fn seed() -> Artifacts {
        let mut g = GraphBuilder::new();
        let m = g.module("M").unwrap();
        let c = g.class(m, "C", &[]).unwrap();
        g.function(c, "def m(self):\n    return 1\n").unwrap();
        g.value(m, "answer", Value::Int(42)).unwrap();
        g.finish()
    }

    #[test]
    fn test_add_fails_on_existing() {
        let variant = Variant::new(seed());
        let mut build = variant.build();
        let mut cursor = build.at("M").unwrap();
        let err = cursor.add_value("answer", Value::Int(0)).unwrap_err();
        assert!(matches!(err, DeltaError::AlreadyExists { .. }));
    }

    #[test]
    fn test_remove_fails_on_absent() {
        let variant = Variant::new(seed());
        let mut build = variant.build();
        let mut cursor = build.at("M").unwrap();
        assert!(matches!(
            cursor.remove("ghost"),
            Err(DeltaError::Missing { .. })
        ));
        cursor.remove("answer").unwrap();
        assert!(build.resolve("M.answer").is_err());
    }

    #[test]
    fn test_modify_fails_on_absent() {
        let variant = Variant::new(seed());
        let mut build = variant.build();
        let mut cursor = build.at("M.C").unwrap();
        let err = cursor
            .modify_function("ghost", "def ghost(self):\n    return 0\n")
            .unwrap_err();
        assert!(matches!(err, DeltaError::Missing { .. }));
    }

    #[test]
    fn test_cow_leaves_seed_untouched() {
        let variant = Variant::new(seed());
        let class_id = {
            let mut build = variant.build();
            let id = build.resolve("M.C").unwrap();
            let mut cursor = build.cursor(id);
            cursor
                .modify_function("m", "def m(self):\n    return 2\n")
                .unwrap();
            // The build's class node is now a local replica...
            assert!(!Arc::ptr_eq(
                &build.node_arc(id),
                &variant.seed().node_arc(id)
            ));
            id
        };
        // ...and the seed still sees the original function.
        let seed_class = variant.seed().node(class_id);
        assert!(seed_class.members().unwrap().contains("m"));
        assert!(!seed_class.members().unwrap().contains("m#0"));
    }

    #[test]
    fn test_extends_operations() {
        let mut g = GraphBuilder::new();
        let m = g.module("zoo").unwrap();
        let a = g.class(m, "A", &[]).unwrap();
        let b = g.class(m, "B", &[]).unwrap();
        let c = g.class(m, "C", &[a]).unwrap();
        let variant = Variant::new(g.finish());
        let mut build = variant.build();

        let mut cursor = build.cursor(c);
        cursor.add_extends(&[a, b]).unwrap();
        match build.node(c) {
            Node::Class(class) => assert_eq!(class.bases, vec![a, b]),
            _ => panic!("expected class"),
        }

        let mut cursor = build.cursor(c);
        assert!(matches!(
            cursor.remove_extends(&[b, m]),
            Err(DeltaError::NotABase { .. })
        ));
        // Fail-fast left the bases unchanged.
        match build.node(c) {
            Node::Class(class) => assert_eq!(class.bases, vec![a, b]),
            _ => panic!("expected class"),
        }

        let mut cursor = build.cursor(c);
        cursor.set_extends(&[b, b, a]).unwrap();
        match build.node(c) {
            Node::Class(class) => assert_eq!(class.bases, vec![b, a]),
            _ => panic!("expected class"),
        }
    }
}
