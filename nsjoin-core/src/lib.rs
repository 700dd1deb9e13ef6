//! nsjoin Core - Foundation types and errors
//!
//! This crate provides the types shared by the namespace joiner and the CLI:
//! the target process identifier, the namespace kinds, and the error taxonomy.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{NamespaceKind, TargetPid};
