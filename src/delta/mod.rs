pub mod artifact;
pub mod build;
pub(crate) mod interp;
pub(crate) mod original;

pub use artifact::{
    Artifacts, ClassNode, EnvBinding, FunctionNode, GraphBuilder, Members, ModuleNode, Node,
    NodeId,
};
pub use build::{Cursor, Variant, VariantBuild};
