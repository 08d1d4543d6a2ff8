//! Table processors and the name-to-implementation registry.
//!
//! A processor is the pluggable unit a client selects by name at startup.
//! Each one consumes a table and produces a (possibly transformed) table;
//! the bridge imposes no other contract.
//!
//! ## Built-in processors
//! - `identity`: pass the table through unchanged (the default)
//! - `reverse`: reverse the row order

pub mod identity;
pub mod reverse;

use crate::table::Table;
use std::sync::Arc;

/// A named table transformation.
///
/// Implementations are shared read-only across the process lifetime, so
/// they must be `Send + Sync`.
pub trait Processor: Send + Sync {
    /// Transform one table into another.
    fn process(&self, table: Table) -> Table;
}

/// Processor identifiers this build knows about.
pub const KNOWN_PROCESSORS: &[&str] = &["identity", "reverse"];

/// Registry resolution errors
#[derive(Debug)]
pub enum RegistryError {
    /// No processor registered under the requested identifier
    UnknownProcessor(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::UnknownProcessor(name) => write!(
                f,
                "Unknown processor '{}' (known: {})",
                name,
                KNOWN_PROCESSORS.join(", ")
            ),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Resolve a processor identifier to its implementation.
///
/// Called once at startup; a failure here must abort the process before the
/// listener binds, so a missing processor never silently degrades to
/// pass-through.
pub fn resolve(identifier: &str) -> Result<Arc<dyn Processor>, RegistryError> {
    match identifier {
        "identity" => Ok(Arc::new(identity::Identity)),
        "reverse" => Ok(Arc::new(reverse::Reverse)),
        other => Err(RegistryError::UnknownProcessor(other.to_string())),
    }
}
