//! File discovery for comparison inputs.
//!
//! Walks an input directory and classifies candidate files by extension:
//! `.tf` is configuration declaration text, `.json` and `.tfstate` are JSON
//! documents (state files or reference policies; which one is decided at
//! parse time from the document shape). Results come back ordered by path so
//! comparison runs are deterministic.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::diagnostics::Diagnostic;

/// Coarse classification by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFileKind {
    ConfigText,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub kind: SourceFileKind,
}

fn classify(path: &Path) -> Option<SourceFileKind> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("tf") => Some(SourceFileKind::ConfigText),
        Some("json") | Some("tfstate") => Some(SourceFileKind::Json),
        _ => None,
    }
}

/// Discover comparison input files under `dir`. A missing directory is a
/// warning, not an error: the result is simply empty and the batch continues.
pub fn discover_files(dir: &Path, recursive: bool) -> (Vec<DiscoveredFile>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();

    if !dir.is_dir() {
        diagnostics.push(Diagnostic::warning(
            dir.display().to_string(),
            "directory does not exist; skipping",
        ));
        return (Vec::new(), diagnostics);
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).max_depth(max_depth).into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Failed to read directory entry under {:?}: {}", dir, e);
                diagnostics.push(Diagnostic::warning(dir.display().to_string(), e.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(kind) = classify(entry.path()) {
            files.push(DiscoveredFile {
                path: entry.path().to_path_buf(),
                kind,
            });
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    (files, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn classifies_and_orders_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b_policies.tf"), "").unwrap();
        fs::write(dir.path().join("a_baseline.json"), "{}").unwrap();
        fs::write(dir.path().join("terraform.tfstate"), "{}").unwrap();
        fs::write(dir.path().join("notes.md"), "").unwrap();

        let (files, diags) = discover_files(dir.path(), false);
        assert!(diags.is_empty());
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a_baseline.json", "b_policies.tf", "terraform.tfstate"]);
        assert_eq!(files[0].kind, SourceFileKind::Json);
        assert_eq!(files[1].kind, SourceFileKind::ConfigText);
        assert_eq!(files[2].kind, SourceFileKind::Json);
    }

    #[test]
    fn missing_directory_warns_and_returns_empty() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let (files, diags) = discover_files(&missing, false);
        assert!(files.is_empty());
        assert_eq!(diags.len(), 1);
        assert!(!diags[0].is_error());
    }

    #[test]
    fn recursion_is_opt_in() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("modules");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("nested.tf"), "").unwrap();
        fs::write(dir.path().join("top.tf"), "").unwrap();

        let (flat, _) = discover_files(dir.path(), false);
        assert_eq!(flat.len(), 1);
        let (deep, _) = discover_files(dir.path(), true);
        assert_eq!(deep.len(), 2);
    }
}
