//! # sqlgate-sql
//!
//! Text-level SQL helpers used before a statement reaches the database:
//!
//! - [`classify`]: leading-keyword classification into an [`OperationKind`]
//! - [`referenced_schemas`]: schema qualifiers of every relation, for the
//!   policy-gated free execute path
//! - [`bound_select`]: the outer `LIMIT` wrapper enforcing row caps
//!
//! [`OperationKind`]: sqlgate_core::OperationKind

pub mod bound;
pub mod classify;
pub mod error;
pub mod schemas;

pub use bound::{bound_select, strip_terminator};
pub use classify::classify;
pub use error::SqlError;
pub use schemas::{SchemaReferences, referenced_schemas};
