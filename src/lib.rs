//! Rule-based security auditing for Python syntax trees.
//!
//! The core works on the [`node`] model only: [`traverse`] walks it,
//! [`registry`] dispatches visited nodes to the rules built by
//! [`patterns::build`], and [`report`] carries the findings out. Source
//! parsing ([`ast`], [`lower`]) and file discovery ([`walk`]) sit outside it.
//!
//! ```no_run
//! use astguard::{ast, patterns};
//!
//! let registry = patterns::build(&patterns::RuleSetConfig::default())?;
//! for d in ast::scan_source(b"import hashlib\nhashlib.md5(b'')\n", &registry)? {
//!     println!("{d}");
//! }
//! # Ok::<(), astguard::errors::AuditError>(())
//! ```

pub mod ast;
pub mod errors;
pub mod lower;
pub mod matchers;
pub mod node;
pub mod patterns;
pub mod registry;
pub mod report;
pub mod traverse;
pub mod utils;
pub mod walk;
