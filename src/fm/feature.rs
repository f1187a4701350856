//! Feature diagrams, generalized as groups.
//!
//! A tree of feature nodes is built with the `Feature` builder, then
//! checked into a `FeatureModel`. Checking assigns every node and
//! attribute a dotted path (anonymous nodes use their sibling index),
//! builds the lookup, links cross-tree constraints, and accumulates
//! declaration errors instead of raising.

use std::collections::HashMap;

use tracing::debug;

use crate::core::path::Path;
use crate::core::value::Value;
use crate::errors::{DeclError, DeclErrors};
use crate::fm::attribute::AttributeSpec;
use crate::fm::config::Configuration;
use crate::fm::constraint::Constraint;
use crate::fm::result::{CtcResult, EvalResult, ReasonTree};

/// Identifies a feature or attribute within one checked model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone)]
pub enum SymKind {
    Feature,
    Attribute(AttributeSpec),
}

/// Legacy name kept public: what kind of symbol an id denotes.
pub type SymbolKind = SymKind;

/// Path/name tables produced by `check()`.
#[derive(Debug, Default)]
pub struct Lookup {
    paths: Vec<Path>,
    kinds: Vec<SymKind>,
    by_path: HashMap<String, SymbolId>,
    by_name: HashMap<String, Vec<SymbolId>>,
}

impl Lookup {
    fn alloc(&mut self, path: Path, kind: SymKind) -> SymbolId {
        let id = SymbolId(self.paths.len() as u32);
        self.by_path.insert(path.to_string(), id);
        self.paths.push(path);
        self.kinds.push(kind);
        id
    }

    fn register_name(&mut self, name: &str, id: SymbolId, errors: &mut DeclErrors) {
        let entry = self.by_name.entry(name.to_string()).or_default();
        if let Some(first) = entry.first() {
            errors.add(DeclError::DuplicateName {
                name: name.to_string(),
                first: self.paths[first.0 as usize].to_string(),
                second: self.paths[id.0 as usize].to_string(),
            });
        }
        entry.push(id);
    }

    /// Resolve a reference: a full dotted path, or a unique declared
    /// name. Failures are recorded, not raised.
    pub fn resolve(&self, name: &str, location: &str, errors: &mut DeclErrors) -> Option<SymbolId> {
        if let Some(&id) = self.by_path.get(name) {
            return Some(id);
        }
        match self.by_name.get(name).map(Vec::as_slice) {
            Some([id]) => Some(*id),
            Some(ids) if ids.len() > 1 => {
                errors.add(DeclError::Ambiguous {
                    name: name.to_string(),
                    candidates: ids.iter().map(|i| self.paths[i.0 as usize].to_string()).collect(),
                });
                None
            }
            _ => {
                errors.add(DeclError::Unresolved {
                    name: name.to_string(),
                    location: location.to_string(),
                });
                None
            }
        }
    }

    pub fn path(&self, id: SymbolId) -> &Path {
        &self.paths[id.0 as usize]
    }

    pub fn kind(&self, id: SymbolId) -> &SymKind {
        &self.kinds[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Group kind: how children truths aggregate into the parent's truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    And,
    Any,
    Or,
    Xor,
}

impl GroupKind {
    pub(crate) fn compute(&self, values: &[bool]) -> bool {
        match self {
            GroupKind::And => values.iter().all(|v| *v),
            GroupKind::Any => true,
            GroupKind::Or => values.iter().any(|v| *v),
            GroupKind::Xor => values.iter().filter(|v| **v).count() == 1,
        }
    }

    pub(crate) fn child_expected(&self, expected: Option<bool>) -> Option<bool> {
        match self {
            GroupKind::And => match expected {
                Some(true) => Some(true),
                _ => None,
            },
            GroupKind::Or => match expected {
                Some(false) => Some(false),
                _ => None,
            },
            GroupKind::Any | GroupKind::Xor => None,
        }
    }
}

/// Reserved keyword slots a tag may not shadow.
const RESERVED_SLOTS: &[&str] = &[
    "name", "children", "ctcs", "attributes", "lookup", "dom", "errors",
];

/// Builder for one feature node. Bare strings passed to `child` are
/// sugar for an `And` leaf of that name.
#[derive(Debug, Clone)]
pub struct Feature {
    pub(crate) name: Option<String>,
    pub(crate) kind: GroupKind,
    pub(crate) children: Vec<Feature>,
    pub(crate) attributes: Vec<(String, AttributeSpec)>,
    pub(crate) ctcs: Vec<Constraint>,
    pub(crate) tags: Vec<(String, Value)>,
}

impl Feature {
    fn new(kind: GroupKind, name: Option<String>) -> Self {
        Self {
            name,
            kind,
            children: Vec::new(),
            attributes: Vec::new(),
            ctcs: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn and(name: impl Into<String>) -> Self {
        Self::new(GroupKind::And, Some(name.into()))
    }

    pub fn any(name: impl Into<String>) -> Self {
        Self::new(GroupKind::Any, Some(name.into()))
    }

    pub fn or(name: impl Into<String>) -> Self {
        Self::new(GroupKind::Or, Some(name.into()))
    }

    pub fn xor(name: impl Into<String>) -> Self {
        Self::new(GroupKind::Xor, Some(name.into()))
    }

    /// Anonymous node of the given kind, addressed by sibling index.
    pub fn anonymous(kind: GroupKind) -> Self {
        Self::new(kind, None)
    }

    // Purely syntactic aliases.

    pub fn mandatory(name: impl Into<String>) -> Self {
        Self::and(name)
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self::any(name)
    }

    pub fn alternative(name: impl Into<String>) -> Self {
        Self::xor(name)
    }

    pub fn child(mut self, child: impl Into<Feature>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I, C>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Feature>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    pub fn ctc(mut self, constraint: Constraint) -> Self {
        self.ctcs.push(constraint);
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, spec: AttributeSpec) -> Self {
        self.attributes.push((name.into(), spec));
        self
    }

    /// Free-form tag. Names colliding with reserved slots are rejected
    /// eagerly.
    pub fn tag(mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<Self, DeclError> {
        let name = name.into();
        if RESERVED_SLOTS.contains(&name.as_str()) {
            return Err(DeclError::ReservedTag { name });
        }
        self.tags.push((name, value.into()));
        Ok(self)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn has_attributes(&self) -> bool {
        !self.attributes.is_empty()
    }
}

impl From<&str> for Feature {
    fn from(name: &str) -> Self {
        Feature::and(name)
    }
}

/// A feature node after checking: path assigned, constraints linked.
#[derive(Debug, Clone)]
pub struct LinkedFeature {
    pub(crate) id: SymbolId,
    pub(crate) name: Option<String>,
    pub(crate) kind: GroupKind,
    pub(crate) children: Vec<LinkedFeature>,
    pub(crate) attributes: Vec<(String, SymbolId, AttributeSpec)>,
    pub(crate) ctcs: Vec<Constraint>,
    #[allow(dead_code)]
    pub(crate) tags: Vec<(String, Value)>,
}

/// A checked feature diagram. Immutable after `check()`.
#[derive(Debug)]
pub struct FeatureModel {
    root: LinkedFeature,
    lookup: Lookup,
    errors: DeclErrors,
    has_attributes: bool,
}

impl FeatureModel {
    /// Walk the tree depth-first, assign paths, build the lookup, link
    /// every CTC. Declaration errors are accumulated on the model.
    pub fn check(root: Feature) -> FeatureModel {
        let mut lookup = Lookup::default();
        let mut errors = DeclErrors::new();
        let mut has_attributes = false;

        // First pass: allocate ids for features and attributes so that
        // forward references in CTCs resolve.
        fn allocate(
            node: &Feature,
            path: &Path,
            index: usize,
            lookup: &mut Lookup,
            errors: &mut DeclErrors,
            has_attributes: &mut bool,
        ) {
            let segment = node
                .name
                .clone()
                .unwrap_or_else(|| index.to_string());
            let local = path.child(segment);
            let id = lookup.alloc(local.clone(), SymKind::Feature);
            if let Some(name) = &node.name {
                lookup.register_name(name, id, errors);
            }
            for (attr_name, spec) in &node.attributes {
                *has_attributes = true;
                let attr_path = local.child(attr_name.clone());
                let attr_id = lookup.alloc(attr_path, SymKind::Attribute(spec.clone()));
                lookup.register_name(attr_name, attr_id, errors);
            }
            for (i, child) in node.children.iter().enumerate() {
                allocate(child, &local, i, lookup, errors, has_attributes);
            }
        }
        allocate(&root, &Path::root(), 0, &mut lookup, &mut errors, &mut has_attributes);

        // Second pass: rebuild the tree with ids and linked constraints.
        fn link(
            node: Feature,
            path: &Path,
            index: usize,
            lookup: &Lookup,
            errors: &mut DeclErrors,
        ) -> LinkedFeature {
            let segment = node.name.clone().unwrap_or_else(|| index.to_string());
            let local = path.child(segment);
            let id = lookup.by_path[&local.to_string()];
            let attributes = node
                .attributes
                .into_iter()
                .map(|(name, spec)| {
                    let attr_id = lookup.by_path[&local.child(name.clone()).to_string()];
                    (name, attr_id, spec)
                })
                .collect();
            let location = local.to_string();
            let ctcs = node
                .ctcs
                .iter()
                .map(|c| c.link(&location, lookup, errors))
                .collect();
            let children = node
                .children
                .into_iter()
                .enumerate()
                .map(|(i, child)| link(child, &local, i, lookup, errors))
                .collect();
            LinkedFeature {
                id,
                name: node.name,
                kind: node.kind,
                children,
                attributes,
                ctcs,
                tags: node.tags,
            }
        }
        let root = link(root, &Path::root(), 0, &lookup, &mut errors);

        debug!(
            symbols = lookup.len(),
            errors = errors.len(),
            "feature model checked"
        );
        FeatureModel {
            root,
            lookup,
            errors,
            has_attributes,
        }
    }

    /// Declaration errors accumulated by `check()`. Empty iff the model
    /// is well defined.
    pub fn errors(&self) -> &DeclErrors {
        &self.errors
    }

    pub fn lookup(&self) -> &Lookup {
        &self.lookup
    }

    pub(crate) fn root(&self) -> &LinkedFeature {
        &self.root
    }

    pub fn has_attributes(&self) -> bool {
        self.has_attributes
    }

    pub(crate) fn ensure_well_defined(&self) -> Result<(), crate::errors::ModelError> {
        if self.errors.has_errors() {
            return Err(crate::errors::ModelError::IllDefined {
                errors: self.errors.len(),
            });
        }
        Ok(())
    }

    /// Link a standalone constraint against this model.
    pub fn link_constraint(
        &self,
        constraint: &Constraint,
    ) -> Result<(Constraint, DeclErrors), crate::errors::ModelError> {
        self.ensure_well_defined()?;
        let mut errors = DeclErrors::new();
        let linked = constraint.link("", &self.lookup, &mut errors);
        Ok((linked, errors))
    }

    /// Evaluate a linked configuration against the model, expecting the
    /// root to be `true`.
    pub fn eval(&self, conf: &Configuration) -> EvalResult {
        self.eval_expected(conf, Some(true))
    }

    pub fn eval_expected(&self, conf: &Configuration, expected: Option<bool>) -> EvalResult {
        let result = self.eval_node(&self.root, conf, expected);
        if let Some(reason) = &result.reason {
            debug!(reference = %reason.reference, "evaluation produced a reason");
        }
        result
    }

    fn eval_node(
        &self,
        node: &LinkedFeature,
        conf: &Configuration,
        expected: Option<bool>,
    ) -> EvalResult {
        let child_expected = node.kind.child_expected(expected);
        let child_results: Vec<EvalResult> = node
            .children
            .iter()
            .map(|child| self.eval_node(child, conf, child_expected))
            .collect();
        let attr_results: Vec<CtcResult> = node
            .attributes
            .iter()
            .map(|(name, id, spec)| self.eval_attribute(node, name, *id, spec, conf, child_expected))
            .collect();
        let ctc_results: Vec<CtcResult> = node
            .ctcs
            .iter()
            .map(|ctc| ctc.eval(conf, child_expected))
            .collect();

        // Group aggregation over children, attributes and CTCs; unknown
        // counts as false.
        let mut agg_inputs: Vec<bool> = child_results.iter().map(|r| r.nvalue).collect();
        agg_inputs.extend(attr_results.iter().map(|r| r.value.unwrap_or(false)));
        agg_inputs.extend(ctc_results.iter().map(|r| r.value.unwrap_or(false)));
        let nvalue_sub = node.kind.compute(&agg_inputs);

        let value_subs = child_results.iter().all(|r| r.value);
        let mut snodes: Vec<String> = child_results
            .iter()
            .flat_map(|r| r.snodes.iter().cloned())
            .collect();

        let self_path = self.lookup.path(node.id).to_string();
        let mut local_reason: Option<ReasonTree> = None;
        let nvalue_local;
        if node.name.is_some() {
            match conf.value(node.id) {
                None => {
                    let mut reason = ReasonTree::new(self_path.clone());
                    reason.value_none(self_path.clone());
                    local_reason = Some(reason);
                    nvalue_local = false;
                }
                Some(v) => match v.as_bool() {
                    None => {
                        let mut reason = ReasonTree::new(self_path.clone());
                        reason.value_mismatch(self_path.clone(), None, Some(v.clone()));
                        local_reason = Some(reason);
                        nvalue_local = false;
                    }
                    Some(false) if !snodes.is_empty() => {
                        let mut reason = ReasonTree::new(self_path.clone());
                        reason.dependencies(self_path.clone(), snodes.clone());
                        local_reason = Some(reason);
                        nvalue_local = false;
                    }
                    Some(true) if !nvalue_sub => {
                        let mut reason = ReasonTree::new(self_path.clone());
                        reason.value_mismatch(
                            self_path.clone(),
                            Some(Value::Bool(true)),
                            Some(Value::Bool(false)),
                        );
                        local_reason = Some(reason);
                        nvalue_local = true;
                    }
                    Some(local) => {
                        if local {
                            snodes.push(self_path.clone());
                        }
                        nvalue_local = local;
                    }
                },
            }
        } else {
            nvalue_local = nvalue_sub;
        }

        let value = value_subs && local_reason.is_none();
        let disagrees = expected.map_or(false, |e| nvalue_local != e);
        let reason = if disagrees || !value {
            let mut reason = local_reason.unwrap_or_else(|| ReasonTree::new(self_path.clone()));
            if disagrees {
                reason.value_mismatch(
                    self_path,
                    expected.map(Value::Bool),
                    Some(Value::Bool(nvalue_local)),
                );
            }
            for sub in child_results
                .iter()
                .filter_map(|r| r.reason.clone())
                .chain(attr_results.into_iter().filter_map(|r| r.reason))
                .chain(ctc_results.into_iter().filter_map(|r| r.reason))
            {
                reason.sub(sub);
            }
            Some(reason)
        } else {
            local_reason
        };

        EvalResult {
            value,
            nvalue: nvalue_local,
            snodes,
            reason,
        }
    }

    fn eval_attribute(
        &self,
        owner: &LinkedFeature,
        name: &str,
        id: SymbolId,
        spec: &AttributeSpec,
        conf: &Configuration,
        expected: Option<bool>,
    ) -> CtcResult {
        let path = self.lookup.path(id).to_string();
        // Attributes may only be bound when the owning feature is true.
        let owner_selected = conf.value(owner.id).map_or(false, Value::truthy);
        match conf.value(id) {
            None => {
                let mut reason = ReasonTree::new(path.clone());
                reason.value_none(path);
                CtcResult {
                    value: Some(false),
                    reason: Some(reason),
                }
            }
            Some(value) => {
                if owner.name.is_some() && !owner_selected {
                    let mut reason = ReasonTree::new(path.clone());
                    reason.dependencies(path, vec![self.lookup.path(owner.id).to_string()]);
                    return CtcResult {
                        value: Some(false),
                        reason: Some(reason),
                    };
                }
                let ok = spec.accepts(value);
                if expected.map_or(false, |e| e != ok) {
                    let mut reason = ReasonTree::new(path.clone());
                    reason.value_mismatch(format!("{} ({})", name, spec), None, Some(value.clone()));
                    CtcResult {
                        value: Some(ok),
                        reason: Some(reason),
                    }
                } else {
                    CtcResult::known(ok)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_well_formed() {
        let root = Feature::and("Root").child("a").child(Feature::or("grp").child("b").child("c"));
        let model = FeatureModel::check(root);
        assert!(model.errors().is_empty());
        assert_eq!(model.lookup().len(), 5);
    }

    #[test]
    fn test_duplicate_names_are_errors() {
        let root = Feature::and("Root").child("a").child("a");
        let model = FeatureModel::check(root);
        assert!(model.errors().has_errors());
    }

    #[test]
    fn test_anonymous_nodes_use_index_paths() {
        let root = Feature::and("Root").child(Feature::anonymous(GroupKind::Or).child("a"));
        let model = FeatureModel::check(root);
        assert!(model.errors().is_empty());
        let mut errors = DeclErrors::new();
        let id = model.lookup().resolve("Root.0.a", "", &mut errors).unwrap();
        assert_eq!(model.lookup().path(id).to_string(), "Root.0.a");
    }

    #[test]
    fn test_reserved_tags_rejected() {
        let result = Feature::and("Root").tag("lookup", Value::Int(1));
        assert!(result.is_err());
        let ok = Feature::and("Root").tag("owner", "team").unwrap();
        assert_eq!(ok.tags.len(), 1);
    }

    #[test]
    fn test_unresolved_ctc_var_is_error() {
        let root = Feature::and("Root").child("a").ctc(Constraint::var("missing"));
        let model = FeatureModel::check(root);
        assert!(model.errors().has_errors());
    }

    #[test]
    fn test_eval_and_group() {
        let root = Feature::and("Root").child("x").child("y");
        let model = FeatureModel::check(root);
        let (conf, _) = model.link_config([
            ("Root", Value::Bool(true)),
            ("x", Value::Bool(true)),
            ("y", Value::Bool(true)),
        ]);
        let res = model.eval(&conf);
        assert!(res.value);
        assert!(res.nvalue);
        assert!(res.reason.is_none());
    }

    #[test]
    fn test_eval_xor_two_selected() {
        let root = Feature::xor("Root").child("a").child("b");
        let model = FeatureModel::check(root);
        let (conf, _) = model.link_config([
            ("Root", Value::Bool(true)),
            ("a", Value::Bool(true)),
            ("b", Value::Bool(true)),
        ]);
        let res = model.eval(&conf);
        assert!(!res.value);
        assert!(res.reason.is_some());
    }
}
