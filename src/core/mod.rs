pub mod intern;
pub mod path;
pub mod value;

pub use intern::{AtomId, Interner};
pub use path::Path;
pub use value::Value;
