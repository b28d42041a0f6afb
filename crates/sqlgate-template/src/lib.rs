//! # sqlgate-template
//!
//! The catalog of SQL templates the gateway exposes.
//!
//! - [`TemplateStore`] resolves safe names under a trusted root and caches
//!   each template for the life of the process.
//! - [`Template::render`] inlines sanitized `{schema}` / `{view}` identifiers
//!   and leaves data values as bound parameters.

pub mod error;
pub mod render;
pub mod store;

pub use error::TemplateError;
pub use render::{
    IDENTIFIER_PLACEHOLDERS, RenderedStatement, SCHEMA_PLACEHOLDER, Substitutions, Template,
    VIEW_PLACEHOLDER, check_identifier,
};
pub use store::{TemplateStore, validate_template_name};
