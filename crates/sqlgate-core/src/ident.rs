//! Identifier sanitizer.
//!
//! Schema and view names are the only values ever inlined into SQL text.
//! They must pass [`sanitize_identifier`] first; the function validates and
//! never rewrites, so the text that reaches the statement is exactly what
//! the caller supplied.

use thiserror::Error;

/// Longest accepted identifier part (Postgres `NAMEDATALEN - 1`).
pub const MAX_IDENTIFIER_PART_LEN: usize = 63;

/// Longest accepted identifier, including an optional `schema.` qualifier.
pub const MAX_IDENTIFIER_LEN: usize = MAX_IDENTIFIER_PART_LEN * 2 + 1;

/// Why an identifier was rejected.
///
/// The rejected text is deliberately not carried in the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("invalid identifier: empty")]
    Empty,

    #[error("invalid identifier: longer than {max} characters")]
    TooLong { max: usize },

    #[error("invalid identifier: disallowed character")]
    InvalidCharacter,

    #[error("invalid identifier: more than one qualifier")]
    TooManyParts,

    #[error("invalid identifier: empty qualifier part")]
    EmptyPart,
}

/// Validate a raw schema/table identifier.
///
/// Accepts `[A-Za-z0-9_]+` with at most one `.` separating a schema from an
/// object name, and returns the input unchanged.
pub fn sanitize_identifier(raw: &str) -> Result<&str, IdentifierError> {
    if raw.is_empty() {
        return Err(IdentifierError::Empty);
    }
    if raw.len() > MAX_IDENTIFIER_LEN {
        return Err(IdentifierError::TooLong {
            max: MAX_IDENTIFIER_LEN,
        });
    }

    let mut parts = 0usize;
    for part in raw.split('.') {
        parts += 1;
        if parts > 2 {
            return Err(IdentifierError::TooManyParts);
        }
        if part.is_empty() {
            return Err(IdentifierError::EmptyPart);
        }
        if part.len() > MAX_IDENTIFIER_PART_LEN {
            return Err(IdentifierError::TooLong {
                max: MAX_IDENTIFIER_PART_LEN,
            });
        }
        if !part.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Err(IdentifierError::InvalidCharacter);
        }
    }

    Ok(raw)
}
