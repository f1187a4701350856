//! Configurations: linking user maps against a model, and closure of
//! partial configurations to a fixed point.
//!
//! Closure keeps an origin index per binding; when two inputs disagree,
//! the later index wins. Attributes of deselected features are dropped.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::core::value::Value;
use crate::errors::{DeclError, DeclErrors};
use crate::fm::feature::{FeatureModel, GroupKind, LinkedFeature, SymKind, SymbolId};

/// A linked configuration: a finite mapping from symbols to values with
/// the origin index of each binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    values: HashMap<SymbolId, Binding>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub value: Value,
    pub origin: usize,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: SymbolId, value: Value, origin: usize) {
        self.values.insert(id, Binding { value, origin });
    }

    pub fn value(&self, id: SymbolId) -> Option<&Value> {
        self.values.get(&id).map(|b| &b.value)
    }

    pub fn binding(&self, id: SymbolId) -> Option<&Binding> {
        self.values.get(&id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Binding)> + '_ {
        self.values.iter().map(|(&id, b)| (id, b))
    }

    /// Render against a model: named symbols by their declared name,
    /// anonymous features by full path.
    pub fn to_map(&self, model: &FeatureModel) -> BTreeMap<String, Value> {
        let lookup = model.lookup();
        self.values
            .iter()
            .map(|(&id, binding)| {
                let path = lookup.path(id);
                let key = match lookup.kind(id) {
                    SymKind::Feature => match path.last() {
                        Some(last) if !last.chars().all(|c| c.is_ascii_digit()) => {
                            last.to_string()
                        }
                        _ => path.to_string(),
                    },
                    SymKind::Attribute(_) => path.last().unwrap_or_default().to_string(),
                };
                (key, binding.value.clone())
            })
            .collect()
    }
}

impl FeatureModel {
    /// Link a name→value map against the model's lookup. Unresolved
    /// names are recorded, not raised.
    pub fn link_config<I, S>(&self, pairs: I) -> (Configuration, DeclErrors)
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        self.link_config_indexed(pairs, 0)
    }

    fn link_config_indexed<I, S>(&self, pairs: I, origin: usize) -> (Configuration, DeclErrors)
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        let mut conf = Configuration::new();
        let mut errors = DeclErrors::new();
        for (name, value) in pairs {
            match self.lookup().resolve(name.as_ref(), "<configuration>", &mut errors) {
                Some(id) => {
                    if matches!(self.lookup().kind(id), SymKind::Feature)
                        && value.as_bool().is_none()
                    {
                        errors.add(DeclError::ConfigShape {
                            name: name.as_ref().to_string(),
                            detail: format!("feature bindings must be booleans (found {})", value),
                        });
                    }
                    conf.insert(id, value, origin);
                }
                None => {}
            }
        }
        (conf, errors)
    }

    /// Close one or more partial configurations to a fixed point under
    /// the group rules. Later configurations win on disagreement. The
    /// result is a total assignment over features; attribute bindings
    /// are carried through unless their owning feature is deselected.
    pub fn close<I, P, S>(&self, configs: I) -> (Configuration, DeclErrors)
    where
        I: IntoIterator<Item = P>,
        P: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        let mut errors = DeclErrors::new();
        let mut linked = Vec::new();
        for (i, pairs) in configs.into_iter().enumerate() {
            let (conf, conf_errors) = self.link_config_indexed(pairs, i);
            errors.merge(conf_errors);
            linked.push(conf);
        }
        let refs: Vec<&Configuration> = linked.iter().collect();
        (self.close_linked(&refs), errors)
    }

    /// Closure over already-linked configurations.
    pub fn close_linked(&self, configs: &[&Configuration]) -> Configuration {
        let mut state: HashMap<SymbolId, (Value, i64)> = HashMap::new();
        for conf in configs {
            for (id, binding) in conf.iter() {
                state.insert(id, (binding.value.clone(), binding.origin as i64));
            }
        }

        self.close_pass1(self.root(), &mut state);

        let root_selected = state
            .get(&self.root().id)
            .map_or(false, |(v, _)| v.truthy());
        let mut out = Configuration::new();
        self.close_pass2(self.root(), root_selected, &state, &mut out);
        debug!(bindings = out.len(), "configuration closed");
        out
    }

    fn close_pass1(&self, node: &LinkedFeature, state: &mut HashMap<SymbolId, (Value, i64)>) {
        self.infer_update(node, state);
        for child in &node.children {
            self.close_pass1(child, state);
        }
        self.infer_update(node, state);
    }

    fn infer_update(&self, node: &LinkedFeature, state: &mut HashMap<SymbolId, (Value, i64)>) {
        let (idx, v_local, v_subs) = infer(node, state);
        if let Some(v) = v_local {
            state.insert(node.id, (Value::Bool(v), idx));
        }
        for (child, v) in node.children.iter().zip(v_subs) {
            if let Some(v) = v {
                state.insert(child.id, (Value::Bool(v), idx));
            }
        }
    }

    fn close_pass2(
        &self,
        node: &LinkedFeature,
        v_local: bool,
        state: &HashMap<SymbolId, (Value, i64)>,
        out: &mut Configuration,
    ) {
        let (_, _, v_subs) = infer(node, state);
        out.insert(node.id, Value::Bool(v_local), 0);
        for (child, v) in node.children.iter().zip(v_subs) {
            // A deselected feature deselects everything below it.
            let child_value = v_local && v.unwrap_or(false);
            self.close_pass2(child, child_value, state, out);
        }
        if v_local {
            for (_, attr_id, _) in &node.attributes {
                if let Some((value, _)) = state.get(attr_id) {
                    out.insert(*attr_id, value.clone(), 0);
                }
            }
        }
    }
}

/// Per-group inference: the propagated value of the node and each child,
/// with the origin index that justified it.
fn infer(
    node: &LinkedFeature,
    state: &HashMap<SymbolId, (Value, i64)>,
) -> (i64, Option<bool>, Vec<Option<bool>>) {
    let get = |id: SymbolId| -> Option<(bool, i64)> {
        state.get(&id).map(|(v, i)| (v.truthy(), *i))
    };

    match node.kind {
        GroupKind::And => {
            // The newest binding among the node and its children wins
            // and propagates to every older or missing slot.
            let mut idx = -1i64;
            let mut value: Option<bool> = None;
            let mut consider = |entry: Option<(bool, i64)>| {
                if let Some((v, i)) = entry {
                    if i > idx {
                        idx = i;
                        value = Some(v);
                    }
                }
            };
            consider(get(node.id));
            for child in &node.children {
                consider(get(child.id));
            }
            let default_for = |entry: Option<(bool, i64)>| -> Option<bool> {
                match entry {
                    None => value,
                    Some((_, i)) if i < idx => value,
                    Some((v, _)) => Some(v),
                }
            };
            let v_local = default_for(get(node.id));
            let v_subs = node
                .children
                .iter()
                .map(|c| default_for(get(c.id)))
                .collect();
            (idx, v_local, v_subs)
        }
        GroupKind::Any | GroupKind::Or | GroupKind::Xor => {
            // A selected child selects the parent when its binding is
            // newer than the parent's own.
            let mut idx_subs = -1i64;
            let mut v_subs: Vec<Option<bool>> = Vec::with_capacity(node.children.len());
            for child in &node.children {
                match get(child.id) {
                    Some((v, i)) => {
                        if v && i > idx_subs {
                            idx_subs = i;
                        }
                        v_subs.push(Some(v));
                    }
                    None => v_subs.push(None),
                }
            }
            let (mut v_local, mut idx_local) = get(node.id).unwrap_or((false, -1));
            if idx_subs > idx_local {
                idx_local = idx_subs;
                v_local = true;
            }
            if node.kind == GroupKind::Xor && idx_subs > -1 {
                // The newest selected child wins; every sibling is
                // forced off.
                v_subs = node
                    .children
                    .iter()
                    .map(|c| Some(get(c.id) == Some((true, idx_subs))))
                    .collect();
            }
            (idx_local, Some(v_local), v_subs)
        }
    }
}
