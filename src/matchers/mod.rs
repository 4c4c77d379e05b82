//! Reusable predicates the rule catalog is assembled from.

pub mod call;
pub mod keyword;
pub mod literal;
pub mod structural;

pub use call::CallMatcher;
pub use keyword::PrimitiveTable;
pub use literal::{Deobfuscator, LiteralMatcher};
