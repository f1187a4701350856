//! Evaluation results and reason trees.
//!
//! Reasons are data, never errors: evaluation always returns, and the
//! reason tree explains any disagreement between the observed truth and
//! the expectation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::value::Value;

/// One reason node. `reference` is the dotted path (or rendering) of the
/// offending feature, attribute, or constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ReasonEntry {
    ValueMismatch {
        reference: String,
        expected: Option<Value>,
        observed: Option<Value>,
    },
    ValueNone {
        reference: String,
    },
    Dependencies {
        reference: String,
        selected: Vec<String>,
    },
    Sub(ReasonTree),
}

/// A tree of reasons rooted at one feature or constraint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReasonTree {
    pub reference: String,
    pub entries: Vec<ReasonEntry>,
}

impl ReasonTree {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            entries: Vec::new(),
        }
    }

    pub fn value_mismatch(
        &mut self,
        reference: impl Into<String>,
        expected: Option<Value>,
        observed: Option<Value>,
    ) {
        self.entries.push(ReasonEntry::ValueMismatch {
            reference: reference.into(),
            expected,
            observed,
        });
    }

    pub fn value_none(&mut self, reference: impl Into<String>) {
        self.entries.push(ReasonEntry::ValueNone {
            reference: reference.into(),
        });
    }

    pub fn dependencies(&mut self, reference: impl Into<String>, selected: Vec<String>) {
        self.entries.push(ReasonEntry::Dependencies {
            reference: reference.into(),
            selected,
        });
    }

    /// Aggregate a child reason, preserving child order.
    pub fn sub(&mut self, child: ReasonTree) {
        self.entries.push(ReasonEntry::Sub(child));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Depth-first search for an entry whose reference contains `needle`.
    pub fn find(&self, needle: &str) -> Option<&ReasonEntry> {
        for entry in &self.entries {
            match entry {
                ReasonEntry::Sub(tree) => {
                    if let Some(found) = tree.find(needle) {
                        return Some(found);
                    }
                }
                ReasonEntry::ValueMismatch { reference, .. }
                | ReasonEntry::ValueNone { reference }
                | ReasonEntry::Dependencies { reference, .. } => {
                    if reference.contains(needle) {
                        return Some(entry);
                    }
                }
            }
        }
        None
    }
}

impl fmt::Display for ReasonTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn render(tree: &ReasonTree, indent: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let pad = "  ".repeat(indent);
            writeln!(f, "{}{}:", pad, tree.reference)?;
            for entry in &tree.entries {
                match entry {
                    ReasonEntry::ValueMismatch { reference, expected, observed } => {
                        writeln!(
                            f,
                            "{}  {} expected {} but observed {}",
                            pad,
                            reference,
                            render_opt(expected),
                            render_opt(observed)
                        )?;
                    }
                    ReasonEntry::ValueNone { reference } => {
                        writeln!(f, "{}  {} has no value", pad, reference)?;
                    }
                    ReasonEntry::Dependencies { reference, selected } => {
                        writeln!(
                            f,
                            "{}  {} is deselected but depends on selected {}",
                            pad,
                            reference,
                            selected.join(", ")
                        )?;
                    }
                    ReasonEntry::Sub(child) => render(child, indent + 1, f)?,
                }
            }
            Ok(())
        }
        fn render_opt(v: &Option<Value>) -> String {
            match v {
                Some(v) => v.to_string(),
                None => "<none>".to_string(),
            }
        }
        render(self, 0, f)
    }
}

/// Result of evaluating a feature (sub)tree against a configuration.
#[derive(Debug, Clone)]
pub struct EvalResult {
    /// Whether the sub-evaluation itself is consistent.
    pub value: bool,
    /// The logical truth of the feature: its group aggregation.
    pub nvalue: bool,
    /// Sub-features that were selected, as dotted paths.
    pub snodes: Vec<String>,
    /// Present only when the observed truth disagrees with the
    /// expectation.
    pub reason: Option<ReasonTree>,
}

impl EvalResult {
    pub fn ok(nvalue: bool, snodes: Vec<String>) -> Self {
        Self {
            value: true,
            nvalue,
            snodes,
            reason: None,
        }
    }
}

/// Result of evaluating one cross-tree constraint: tri-valued truth plus
/// an optional reason. `None` means unknown (a referenced binding was
/// missing).
#[derive(Debug, Clone)]
pub struct CtcResult {
    pub value: Option<bool>,
    pub reason: Option<ReasonTree>,
}

impl CtcResult {
    pub fn known(value: bool) -> Self {
        Self {
            value: Some(value),
            reason: None,
        }
    }

    pub fn unknown(reason: ReasonTree) -> Self {
        Self {
            value: None,
            reason: Some(reason),
        }
    }
}
