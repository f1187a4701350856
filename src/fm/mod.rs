pub mod attribute;
pub mod config;
pub mod constraint;
pub mod dimacs;
pub mod feature;
pub mod reference;
pub mod result;

pub use attribute::AttributeSpec;
pub use config::Configuration;
pub use constraint::{CmpOp, Constraint};
pub use dimacs::Dimacs;
pub use feature::{Feature, FeatureModel, GroupKind, SymbolId, SymbolKind};
pub use reference::SubdiagramRegistry;
pub use result::{EvalResult, ReasonEntry, ReasonTree};
