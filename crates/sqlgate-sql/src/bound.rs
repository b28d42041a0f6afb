//! Row-cap wrapper for SELECT statements.

/// Alias given to the wrapped statement.
pub const BOUNDED_ALIAS: &str = "bounded";

/// Wrap a SELECT so the database itself enforces `row_limit`.
///
/// Trailing semicolons are dropped and the inner text sits on its own lines,
/// so a trailing `--` comment cannot swallow the closing parenthesis.
pub fn bound_select(sql: &str, row_limit: u32) -> String {
    let inner = strip_terminator(sql);
    format!("SELECT * FROM (\n{inner}\n) AS {BOUNDED_ALIAS} LIMIT {row_limit}")
}

/// Remove trailing whitespace and statement terminators.
pub fn strip_terminator(sql: &str) -> &str {
    sql.trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}
