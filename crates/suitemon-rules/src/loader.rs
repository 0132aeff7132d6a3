use crate::Rule;
use std::path::{Path, PathBuf};

/// Discovers rule documents beneath a catalog directory.
///
/// Every `*.toml` file is a single rule; its id is the catalog-relative path
/// with separators normalized to `/` and the extension stripped, so a rule's
/// id is stable across platforms and reload cycles. Malformed documents are
/// logged and skipped; they never break loading of the rest of the catalog.
pub struct RuleCatalog {
    root: PathBuf,
}

impl RuleCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads the catalog. The result is sorted by rule id, which fixes the
    /// first-match evaluation order independently of filesystem enumeration.
    pub fn load(&self) -> Vec<Rule> {
        let mut paths = Vec::new();
        collect_documents(&self.root, &mut paths);

        let mut documents: Vec<(String, PathBuf)> = paths
            .into_iter()
            .filter_map(|path| rule_id(&self.root, &path).map(|id| (id, path)))
            .collect();
        documents.sort();

        let mut rules = Vec::with_capacity(documents.len());
        for (id, path) in documents {
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(rule = %id, error = %e, "Failed to read rule document, skipping");
                    continue;
                }
            };
            match toml::from_str::<Rule>(&content) {
                Ok(mut rule) => {
                    rule.id = id;
                    rules.push(rule);
                }
                Err(e) => {
                    tracing::warn!(rule = %id, error = %e, "Invalid rule document, skipping");
                }
            }
        }

        tracing::debug!(count = rules.len(), catalog = %self.root.display(), "Rule catalog loaded");
        rules
    }
}

fn collect_documents(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to read catalog directory");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_documents(&path, out);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            out.push(path);
        }
    }
}

fn rule_id(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let segments: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(segments.join("/"))
}
