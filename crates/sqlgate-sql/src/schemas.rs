//! Schema references in caller-supplied SQL.
//!
//! The free execute path authorizes every schema a statement touches, so it
//! needs the qualifier of each relation. Relations without a qualifier are
//! reported separately and resolve to the default schema.

use crate::error::SqlError;
use sqlparser::ast::{ObjectName, Statement, visit_relations};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::collections::BTreeSet;
use std::ops::ControlFlow;

/// Schemas referenced by the relations of a statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReferences {
    /// Lower-cased qualifiers, e.g. `itsm` for `itsm.incident`.
    pub qualified: BTreeSet<String>,
    /// Whether any relation appeared without a schema qualifier.
    pub has_unqualified: bool,
}

impl SchemaReferences {
    /// Every schema to authorize, substituting `default_schema` for
    /// unqualified relations (and for statements with no relations at all).
    pub fn resolve(&self, default_schema: &str) -> BTreeSet<String> {
        let mut schemas = self.qualified.clone();
        if self.has_unqualified || schemas.is_empty() {
            schemas.insert(default_schema.to_lowercase());
        }
        schemas
    }
}

/// Collect the schema qualifiers of every relation in `sql`.
pub fn referenced_schemas(sql: &str) -> Result<SchemaReferences, SqlError> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql).map_err(|e| {
        tracing::debug!(error = %e, "Statement did not parse for schema extraction");
        SqlError::Unparseable
    })?;

    let mut refs = SchemaReferences::default();
    let mut ctes = BTreeSet::new();
    for statement in &statements {
        collect_cte_names(statement, &mut ctes);
        let flow = visit_relations(statement, |relation: &ObjectName| {
            match record(relation, &ctes, &mut refs) {
                Ok(()) => ControlFlow::Continue(()),
                Err(e) => ControlFlow::Break(e),
            }
        });
        if let ControlFlow::Break(e) = flow {
            return Err(e);
        }
    }
    Ok(refs)
}

fn record(
    relation: &ObjectName,
    ctes: &BTreeSet<String>,
    refs: &mut SchemaReferences,
) -> Result<(), SqlError> {
    let parts: Vec<String> = relation.0.iter().map(|p| p.to_string()).collect();
    match parts.len() {
        0 => {}
        1 => {
            if !ctes.contains(&normalize(&parts[0])) {
                refs.has_unqualified = true;
            }
        }
        n => {
            refs.qualified.insert(schema_key(&parts[n - 2])?);
        }
    }
    Ok(())
}

/// Policy key for a schema qualifier. Unquoted names fold to lower case as
/// Postgres folds them; a quoted name is only accepted when it is already
/// lower-case, since `"Secret"` and `secret` are different schemas.
fn schema_key(part: &str) -> Result<String, SqlError> {
    match part.strip_prefix('"').and_then(|p| p.strip_suffix('"')) {
        Some(quoted) if quoted != quoted.to_lowercase() => {
            Err(SqlError::CaseSensitiveSchema(quoted.to_string()))
        }
        Some(quoted) => Ok(quoted.to_string()),
        None => Ok(part.to_lowercase()),
    }
}

/// CTE names referenced later as relations are not schema objects.
fn collect_cte_names(statement: &Statement, names: &mut BTreeSet<String>) {
    if let Statement::Query(query) = statement
        && let Some(with) = &query.with
    {
        for cte in &with.cte_tables {
            names.insert(normalize(&cte.alias.name.to_string()));
        }
    }
}

/// Strip identifier quotes and lower-case; policy keys are lower-case.
fn normalize(part: &str) -> String {
    part.trim_matches('"').to_lowercase()
}
