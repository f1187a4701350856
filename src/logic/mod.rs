pub mod formula;
pub mod sat;
pub mod types;

pub use formula::Formula;
pub use sat::{Cnf, Model, Solver};
pub use types::{FunctionSig, Ty, TypeStore};
