//! Template store.
//!
//! Templates live as `*.sql` files directly under a trusted root. Names are
//! checked against a safe-name pattern before any path is built, so nothing
//! outside the root is ever opened. Each name is read from disk at most once
//! per process; concurrent first loads of the same name wait on one shared
//! cell while loads of other names proceed independently.

use crate::error::TemplateError;
use crate::render::Template;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// Required template file extension.
pub const TEMPLATE_EXTENSION: &str = ".sql";

/// Longest accepted template name.
pub const MAX_TEMPLATE_NAME_LEN: usize = 128;

type Slot = Arc<OnceCell<Arc<Template>>>;

/// Loads and caches templates from a fixed root directory.
pub struct TemplateStore {
    root: PathBuf,
    slots: Mutex<HashMap<String, Slot>>,
    disk_reads: AtomicUsize,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            slots: Mutex::new(HashMap::new()),
            disk_reads: AtomicUsize::new(0),
        }
    }

    /// The trusted template root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load a template by file name, e.g. `get_version.sql`.
    pub async fn load(&self, name: &str) -> Result<Arc<Template>, TemplateError> {
        validate_template_name(name)?;

        let slot = self.slot(name);
        match slot.get_or_try_init(|| self.read_from_disk(name)).await {
            Ok(template) => Ok(Arc::clone(template)),
            Err(e) => {
                self.evict_failed(name, &slot);
                Err(e)
            }
        }
    }

    /// Names of every loadable template under the root, sorted.
    pub async fn list(&self) -> Result<Vec<String>, TemplateError> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            tracing::warn!(root = %self.root.display(), error = %e, "Template root unreadable");
            TemplateError::Unreadable {
                name: self.root.display().to_string(),
            }
        })?;

        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && validate_template_name(name).is_ok()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Number of templates read from disk so far.
    pub fn disk_reads(&self) -> usize {
        self.disk_reads.load(Ordering::Relaxed)
    }

    fn slot(&self, name: &str) -> Slot {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(slots.entry(name.to_string()).or_default())
    }

    /// Drop the slot of a failed load so requests for names that do not
    /// exist leave nothing behind. A slot another caller has since filled or
    /// replaced is kept.
    fn evict_failed(&self, name: &str, slot: &Slot) {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(current) = slots.get(name)
            && Arc::ptr_eq(current, slot)
            && !current.initialized()
        {
            slots.remove(name);
        }
    }

    async fn read_from_disk(&self, name: &str) -> Result<Arc<Template>, TemplateError> {
        let path = self.root.join(name);
        self.disk_reads.fetch_add(1, Ordering::Relaxed);

        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                tracing::debug!(template = name, bytes = text.len(), "Loaded SQL template");
                Ok(Arc::new(Template::new(name, text)))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(TemplateError::TemplateNotFound {
                name: name.to_string(),
            }),
            Err(e) => {
                tracing::warn!(template = name, error = %e, "Failed to read SQL template");
                Err(TemplateError::Unreadable {
                    name: name.to_string(),
                })
            }
        }
    }
}

/// Check a template name against the safe-name pattern: a bare file name of
/// ASCII letters, digits, `_` and `.`, ending in `.sql`, not starting with
/// `.` and never containing `..`.
pub fn validate_template_name(name: &str) -> Result<(), TemplateError> {
    let stem_ok = name
        .strip_suffix(TEMPLATE_EXTENSION)
        .is_some_and(|stem| !stem.is_empty());

    let safe = stem_ok
        && name.len() <= MAX_TEMPLATE_NAME_LEN
        && !name.starts_with('.')
        && !name.contains("..")
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.');

    if safe {
        Ok(())
    } else {
        tracing::debug!(name, "Rejected unsafe template name");
        Err(TemplateError::UnsafeTemplateName)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn store_with(files: &[(&str, &str)]) -> (tempfile::TempDir, TemplateStore) {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in files {
            fs::write(dir.path().join(name), body).unwrap();
        }
        let store = TemplateStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn safe_names() {
        for ok in ["get_version.sql", "a.sql", "Report_2024.v2.sql"] {
            assert!(validate_template_name(ok).is_ok(), "{ok}");
        }
    }

    #[test]
    fn unsafe_names() {
        for bad in [
            "../etc/passwd.sql",
            "..\\secret.sql",
            "/etc/passwd.sql",
            "C:\\x.sql",
            "sub/dir.sql",
            ".hidden.sql",
            "a..b.sql",
            "noext",
            ".sql",
            "query.txt",
            "sp ace.sql",
            "",
        ] {
            assert_eq!(
                validate_template_name(bad),
                Err(TemplateError::UnsafeTemplateName),
                "{bad:?}"
            );
        }
        let long = format!("{}.sql", "a".repeat(MAX_TEMPLATE_NAME_LEN));
        assert!(validate_template_name(&long).is_err());
    }

    #[tokio::test]
    async fn traversal_never_reads_disk() {
        let (_dir, store) = store_with(&[("ok.sql", "SELECT 1")]);
        for bad in ["../ok.sql", "..\\ok.sql", "/tmp/ok.sql"] {
            assert_eq!(
                store.load(bad).await.unwrap_err(),
                TemplateError::UnsafeTemplateName
            );
        }
        assert_eq!(store.disk_reads(), 0);
    }

    #[tokio::test]
    async fn loads_and_caches() {
        let (dir, store) = store_with(&[("get_version.sql", "SELECT version();")]);

        let first = store.load("get_version.sql").await.unwrap();
        assert_eq!(first.text(), "SELECT version();");
        assert!(first.placeholders().is_empty());

        // Edits after the first load are not observed.
        fs::write(dir.path().join("get_version.sql"), "SELECT 2").unwrap();
        let second = store.load("get_version.sql").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.disk_reads(), 1);
    }

    #[tokio::test]
    async fn missing_template() {
        let (_dir, store) = store_with(&[]);
        assert_eq!(
            store.load("nope.sql").await.unwrap_err(),
            TemplateError::TemplateNotFound {
                name: "nope.sql".to_string()
            }
        );
    }

    #[tokio::test]
    async fn failed_load_is_not_cached() {
        let (dir, store) = store_with(&[]);
        assert!(store.load("late.sql").await.is_err());

        fs::write(dir.path().join("late.sql"), "SELECT 1").unwrap();
        let template = store.load("late.sql").await.unwrap();
        assert_eq!(template.text(), "SELECT 1");
    }

    #[tokio::test]
    async fn missing_names_leave_no_cache_entries() {
        let (_dir, store) = store_with(&[("kept.sql", "SELECT 1")]);
        for i in 0..1000 {
            assert!(store.load(&format!("x{i}.sql")).await.is_err());
        }
        store.load("kept.sql").await.unwrap();

        let slots = store.slots.lock().unwrap();
        assert_eq!(slots.len(), 1);
        assert!(slots.contains_key("kept.sql"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_loads_read_once() {
        let (_dir, store) = store_with(&[("a.sql", "SELECT 1"), ("b.sql", "SELECT 2")]);
        let store = Arc::new(store);

        let loads = (0..32).map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let name = if i % 2 == 0 { "a.sql" } else { "b.sql" };
                store.load(name).await.unwrap()
            })
        });
        let results = futures::future::join_all(loads).await;

        let a: Vec<_> = results
            .iter()
            .map(|r| r.as_ref().unwrap())
            .filter(|t| t.name() == "a.sql")
            .collect();
        assert_eq!(a.len(), 16);
        assert!(a.windows(2).all(|w| Arc::ptr_eq(w[0], w[1])));
        assert_eq!(store.disk_reads(), 2);
    }

    #[tokio::test]
    async fn lists_only_safe_sql_files() {
        let (dir, store) = store_with(&[
            ("b.sql", "SELECT 1"),
            ("a.sql", "SELECT 1"),
            ("notes.txt", "x"),
            (".hidden.sql", "x"),
        ]);
        fs::create_dir(dir.path().join("nested.sql")).unwrap();

        assert_eq!(
            store.list().await.unwrap(),
            vec!["a.sql".to_string(), "b.sql".to_string()]
        );
    }
}
