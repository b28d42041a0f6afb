//! Error types for the template store.

use sqlgate_core::IdentifierError;
use thiserror::Error;

/// Errors raised while loading or rendering templates.
///
/// Messages never carry caller-supplied text that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unsafe template name")]
    UnsafeTemplateName,

    #[error("template not found: {name}")]
    TemplateNotFound { name: String },

    #[error("template {name} could not be read")]
    Unreadable { name: String },

    #[error("missing substitution for placeholder '{placeholder}'")]
    MissingSubstitution { placeholder: String },

    #[error("unsupported substitution placeholder")]
    UnsupportedSubstitution { placeholder: String },

    #[error("substitution for '{placeholder}' is not a valid identifier")]
    InvalidIdentifier {
        placeholder: String,
        #[source]
        reason: IdentifierError,
    },
}
