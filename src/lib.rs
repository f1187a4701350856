//! dopple - a delta-oriented software product-line engine.
//!
//! Three tightly coupled cores: declarative feature diagrams with
//! cross-tree constraints, closure and DIMACS export; a logical-type
//! runtime whose instance/subclass checks reduce to SAT over a subtype
//! relation; and delta operations over a Python-flavored artifact graph
//! with copy-on-write locality and `original(...)` rewriting. A
//! configuration of the feature model selects deltas; applying them in
//! order produces a variant of the artifact graph.

pub mod core;
pub mod delta;
pub mod dispatch;
pub mod errors;
pub mod fm;
pub mod logging;
pub mod logic;
pub mod spl;

// Re-export commonly used items for convenience
pub use crate::core::{Path, Value};
pub use delta::{Artifacts, Cursor, GraphBuilder, Variant, VariantBuild};
pub use dispatch::{Bindings, CallArgs, Monoid, Overload, Param, Signature};
pub use errors::{
    CallError, DeclError, DeclErrors, DeltaError, DeriveError, ModelError, OverloadError,
};
pub use fm::{
    AttributeSpec, CmpOp, Configuration, Constraint, Dimacs, EvalResult, Feature, FeatureModel,
    GroupKind, ReasonEntry, ReasonTree, SubdiagramRegistry,
};
pub use logging::{init_dev_logging, init_logging, init_prod_logging, LogConfig, LogFormat, LogOutput};
pub use logic::{Formula, FunctionSig, Ty, TypeStore};
pub use spl::{Guard, ProductLine};
