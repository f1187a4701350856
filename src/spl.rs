//! Product lines: a feature model driving guarded deltas over a seed
//! artifact graph.
//!
//! Deriving a variant closes the input configurations, validates the
//! result against the model, then applies every activated delta to a
//! fresh build in registration order.

use tracing::{debug, info};

use crate::core::value::Value;
use crate::delta::{Variant, VariantBuild};
use crate::errors::{DeclErrors, DeriveError, DeltaError};
use crate::fm::{Configuration, Constraint, FeatureModel};

pub type DeltaOp = Box<dyn Fn(&mut VariantBuild) -> Result<(), DeltaError> + Send + Sync>;

/// When a registered delta is applied.
pub enum Guard {
    /// Activated when the named feature is selected.
    Feature(String),
    /// Activated when a constraint over the model holds.
    When(Constraint),
}

struct RegisteredDelta {
    name: String,
    guard: Guard,
    op: DeltaOp,
}

pub struct ProductLine {
    model: FeatureModel,
    variant: Variant,
    deltas: Vec<RegisteredDelta>,
}

impl ProductLine {
    /// Requires a well-defined feature model.
    pub fn new(model: FeatureModel, variant: Variant) -> Result<Self, DeclErrors> {
        if model.errors().has_errors() {
            return Err(model.errors().clone());
        }
        Ok(Self {
            model,
            variant,
            deltas: Vec::new(),
        })
    }

    pub fn model(&self) -> &FeatureModel {
        &self.model
    }

    /// Register a guarded delta. Deltas apply in registration order.
    /// Constraint guards are linked now; linking problems are returned
    /// instead of being deferred to derive time.
    pub fn delta(
        mut self,
        name: impl Into<String>,
        guard: Guard,
        op: impl Fn(&mut VariantBuild) -> Result<(), DeltaError> + Send + Sync + 'static,
    ) -> Result<Self, DeclErrors> {
        let guard = match guard {
            Guard::When(constraint) => {
                let (linked, errors) = self
                    .model
                    .link_constraint(&constraint)
                    .map_err(|_| self.model.errors().clone())?;
                if errors.has_errors() {
                    return Err(errors);
                }
                Guard::When(linked)
            }
            feature => feature,
        };
        self.deltas.push(RegisteredDelta {
            name: name.into(),
            guard,
            op: Box::new(op),
        });
        Ok(self)
    }

    fn guard_active(
        &self,
        guard: &Guard,
        conf: &Configuration,
        errors: &mut DeclErrors,
    ) -> bool {
        match guard {
            Guard::Feature(name) => {
                match self.model.lookup().resolve(name, "<delta guard>", errors) {
                    Some(id) => conf.value(id).map_or(false, Value::truthy),
                    None => false,
                }
            }
            Guard::When(constraint) => constraint.eval(conf, None).value == Some(true),
        }
    }

    /// Close and validate the configurations, then apply the activated
    /// deltas to a fresh build.
    pub fn derive<I, P, S>(&self, configs: I) -> Result<VariantBuild, DeriveError>
    where
        I: IntoIterator<Item = P>,
        P: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        let (closed, errors) = self.model.close(configs);
        if errors.has_errors() {
            return Err(DeriveError::Decl(errors));
        }
        let result = self.model.eval(&closed);
        if !(result.value && result.nvalue) {
            let reason = result.reason.unwrap_or_default();
            return Err(DeriveError::Invalid(reason));
        }

        let mut build = self.variant.build();
        let mut guard_errors = DeclErrors::new();
        for delta in &self.deltas {
            if !self.guard_active(&delta.guard, &closed, &mut guard_errors) {
                debug!(delta = %delta.name, "delta inactive");
                continue;
            }
            debug!(delta = %delta.name, "applying delta");
            (delta.op)(&mut build).map_err(|error| DeriveError::Delta {
                delta: delta.name.clone(),
                error,
            })?;
        }
        info!(deltas = self.deltas.len(), "variant derived");
        Ok(build)
    }
}
