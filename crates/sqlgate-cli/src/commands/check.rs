//! `sqlgate check` command implementation.
//!
//! Validates the configuration and the template catalog without touching
//! the database:
//! - Config validation (row limits, schema names, concurrency)
//! - Template root and safe template names
//! - Templates that would always be denied or can never render
//! - Tool name collisions and risky guardrail settings

use super::load_config;
use anyhow::Result;
use sqlgate_core::{GatewayConfig, OperationKind};
use sqlgate_sql::classify;
use sqlgate_template::{IDENTIFIER_PLACEHOLDERS, TemplateStore};
use std::path::Path;

/// Names of the fixed MCP tools; a template stem equal to one is shadowed.
const BUILTIN_TOOLS: [&str; 5] = [
    "render_template",
    "query_template",
    "execute_query",
    "list_templates",
    "api_info",
];

// ============================================================================
// Check Result Types
// ============================================================================

/// Severity level for check results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single check finding.
#[derive(Debug, Clone)]
pub struct CheckFinding {
    pub severity: Severity,
    /// Category of the check that produced this finding.
    pub category: &'static str,
    pub message: String,
    /// Template file the finding refers to, if any.
    pub template: Option<String>,
}

impl CheckFinding {
    fn error(category: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            category,
            message: message.into(),
            template: None,
        }
    }

    fn warning(category: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            category,
            message: message.into(),
            template: None,
        }
    }

    fn info(category: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            category,
            message: message.into(),
            template: None,
        }
    }

    fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }
}

/// Results from running all checks.
#[derive(Debug, Default)]
pub struct CheckResults {
    pub findings: Vec<CheckFinding>,
}

impl CheckResults {
    fn push(&mut self, finding: CheckFinding) {
        self.findings.push(finding);
    }

    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }

    /// Print human-readable summary, most severe first.
    pub fn print_summary(&self) {
        let mut findings: Vec<_> = self.findings.iter().collect();
        findings.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.category.cmp(b.category)));

        if !findings.is_empty() {
            println!("{}", "─".repeat(60));
        }
        for finding in findings {
            print_finding(finding);
        }

        println!();
        println!("{}", "═".repeat(60));
        if self.has_errors() {
            println!(
                "❌ {} error(s), {} warning(s)",
                self.count(Severity::Error),
                self.count(Severity::Warning)
            );
        } else if self.count(Severity::Warning) > 0 {
            println!(
                "⚠️  Checks passed with {} warning(s)",
                self.count(Severity::Warning)
            );
        } else {
            println!("✅ All checks passed!");
        }
    }
}

fn print_finding(finding: &CheckFinding) {
    let icon = match finding.severity {
        Severity::Error => "✗",
        Severity::Warning => "⚠",
        Severity::Info => "ℹ",
    };
    let location = finding
        .template
        .as_deref()
        .map(|t| format!(" [{t}]"))
        .unwrap_or_default();
    println!(
        "  {} {} [{}]{}: {}",
        icon, finding.severity, finding.category, location, finding.message
    );
}

// ============================================================================
// Main Check Runner
// ============================================================================

/// Run every check and return the findings without printing.
pub async fn run_quiet(config_path: &Path) -> Result<CheckResults> {
    let config = load_config(config_path)?;
    let mut results = CheckResults::default();

    if let Err(e) = config.validate() {
        results.push(CheckFinding::error("config", e.to_string()));
    }
    check_guardrails(&config, &mut results);
    check_templates(&config, &mut results).await;

    Ok(results)
}

/// Run all checks; fails if any check reported an error.
pub async fn execute(config_path: &Path) -> Result<()> {
    println!("🔍 Checking sqlgate configuration ({})...", config_path.display());
    println!();

    let results = run_quiet(config_path).await?;
    results.print_summary();

    if results.has_errors() {
        anyhow::bail!(
            "Configuration has {} error(s).",
            results.count(Severity::Error)
        );
    }
    Ok(())
}

fn check_guardrails(config: &GatewayConfig, results: &mut CheckResults) {
    if config.guardrails.free_execute {
        results.push(CheckFinding::warning(
            "guardrails",
            "free_execute is enabled; callers may submit their own SQL",
        ));
    }
    if config.permissions.read_only {
        results.push(CheckFinding::info(
            "permissions",
            "read_only is set; every write is denied",
        ));
    }
    let pool = config.upstream.pool.max_connections as usize;
    if config.guardrails.max_concurrent_queries > pool {
        results.push(CheckFinding::warning(
            "guardrails",
            format!(
                "max_concurrent_queries ({}) exceeds pool max_connections ({pool})",
                config.guardrails.max_concurrent_queries
            ),
        ));
    }
}

async fn check_templates(config: &GatewayConfig, results: &mut CheckResults) {
    let root = &config.templates.root;
    if !root.is_dir() {
        results.push(CheckFinding::error(
            "templates",
            format!("template root {} is not a directory", root.display()),
        ));
        return;
    }

    let store = TemplateStore::new(root.clone());
    let names = match store.list().await {
        Ok(names) => names,
        Err(e) => {
            results.push(CheckFinding::error("templates", e.to_string()));
            return;
        }
    };
    if names.is_empty() {
        results.push(CheckFinding::warning(
            "templates",
            format!("no templates found under {}", root.display()),
        ));
    }

    for name in names {
        let template = match store.load(&name).await {
            Ok(template) => template,
            Err(e) => {
                results.push(CheckFinding::error("templates", e.to_string()).with_template(&name));
                continue;
            }
        };

        for placeholder in template.placeholders() {
            if !IDENTIFIER_PLACEHOLDERS.contains(&placeholder.as_str()) {
                results.push(
                    CheckFinding::error(
                        "placeholders",
                        format!("unsupported placeholder {{{placeholder}}}; only {{schema}} and {{view}} are substituted"),
                    )
                    .with_template(&name),
                );
            }
        }

        match classify(template.text()) {
            OperationKind::Unknown => results.push(
                CheckFinding::error(
                    "classification",
                    "statement cannot be classified and will always be denied",
                )
                .with_template(&name),
            ),
            kind if kind.is_write() && !config.permissions.global_default(kind) => {
                results.push(
                    CheckFinding::info(
                        "permissions",
                        format!("{kind} is denied unless a schema override grants it"),
                    )
                    .with_template(&name),
                )
            }
            _ => {}
        }

        if BUILTIN_TOOLS.contains(&template.stem()) {
            results.push(
                CheckFinding::warning(
                    "tools",
                    format!("tool name {} is taken by a built-in tool", template.stem()),
                )
                .with_template(&name),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, extra: &str) -> std::path::PathBuf {
        let path = dir.join("sqlgate.yaml");
        std::fs::write(&path, format!("templates:\n  root: sql\n{extra}")).unwrap();
        path
    }

    fn categories(results: &CheckResults, severity: Severity) -> Vec<&'static str> {
        results
            .findings
            .iter()
            .filter(|f| f.severity == severity)
            .map(|f| f.category)
            .collect()
    }

    #[tokio::test]
    async fn clean_catalog_passes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sql")).unwrap();
        std::fs::write(dir.path().join("sql/get_version.sql"), "SELECT version();").unwrap();
        let config = write_config(dir.path(), "");

        let results = run_quiet(&config).await.unwrap();
        assert!(!results.has_errors(), "{:?}", results.findings);
    }

    #[tokio::test]
    async fn bad_templates_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let sql = dir.path().join("sql");
        std::fs::create_dir(&sql).unwrap();
        std::fs::write(sql.join("multi.sql"), "SELECT 1; SELECT 2").unwrap();
        std::fs::write(sql.join("table.sql"), "SELECT * FROM {table}").unwrap();
        std::fs::write(sql.join("api_info.sql"), "SELECT 1").unwrap();
        let config = write_config(dir.path(), "guardrails:\n  free_execute: true\n");

        let results = run_quiet(&config).await.unwrap();
        assert!(results.has_errors());
        let errors = categories(&results, Severity::Error);
        assert!(errors.contains(&"classification"));
        assert!(errors.contains(&"placeholders"));
        let warnings = categories(&results, Severity::Warning);
        assert!(warnings.contains(&"tools"));
        assert!(warnings.contains(&"guardrails"));
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), "");

        let results = run_quiet(&config).await.unwrap();
        assert_eq!(categories(&results, Severity::Error), vec!["templates"]);
    }
}
