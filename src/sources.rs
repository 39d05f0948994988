//! Raw document loading for a school's data directory.
//!
//! Only plain-text formats are read here (`.txt`, `.md`); anything that
//! needs a format-specific extractor should be converted to text before it
//! lands in the data directory.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use philosophy_rag_core::models::School;

const INCLUDE_GLOBS: [&str; 3] = ["**/*.txt", "**/*.md", "**/*.markdown"];
const EXCLUDE_GLOBS: [&str; 2] = ["**/.*", "**/.*/**"];

/// One document's text, keyed by its path relative to the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub source: String,
    pub text: String,
}

/// Read every text document under `school.data_dir`, sorted by path.
pub fn scan_school_documents(school: &School) -> Result<Vec<SourceDocument>> {
    let root = &school.data_dir;
    if !root.is_dir() {
        bail!(
            "Data directory for school '{}' does not exist: {}",
            school.id,
            root.display()
        );
    }

    let include_set = build_globset(&INCLUDE_GLOBS)?;
    let exclude_set = build_globset(&EXCLUDE_GLOBS)?;

    let mut docs = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let bytes = std::fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes).replace("\r\n", "\n");
        if text.trim().is_empty() {
            tracing::debug!(school = %school.id, source = %rel_str, "skipping empty document");
            continue;
        }
        docs.push(SourceDocument {
            source: rel_str,
            text,
        });
    }

    // Sort for deterministic chunk order
    docs.sort_by(|a, b| a.source.cmp(&b.source));
    Ok(docs)
}

/// Digest over every document's path and text, for change detection.
pub fn corpus_hash(docs: &[SourceDocument]) -> String {
    let mut hasher = Sha256::new();
    for doc in docs {
        hasher.update(doc.source.as_bytes());
        hasher.update([0u8]);
        hasher.update(doc.text.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn school(dir: &std::path::Path) -> School {
        School {
            id: "stoicism".into(),
            name: "Stoicism".into(),
            description: String::new(),
            persona: String::new(),
            data_dir: dir.to_path_buf(),
            threshold: 0.3,
            refusal: String::new(),
            reflection_questions: vec![],
            off_topic_terms: vec![],
        }
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("letters")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();
        fs::write(root.join("b.md"), "Amor fati.").unwrap();
        fs::write(root.join("letters/a.txt"), "Seneca\r\nto Lucilius").unwrap();
        fs::write(root.join("notes.pdf"), "binary").unwrap();
        fs::write(root.join(".hidden.txt"), "secret").unwrap();
        fs::write(root.join(".cache/x.txt"), "cached").unwrap();
        fs::write(root.join("empty.txt"), "  \n").unwrap();

        let docs = scan_school_documents(&school(root)).unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(names, vec!["b.md", "letters/a.txt"]);
        assert_eq!(docs[1].text, "Seneca\nto Lucilius");
    }

    #[test]
    fn test_missing_dir_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(scan_school_documents(&school(&tmp.path().join("nope"))).is_err());
    }

    #[test]
    fn test_corpus_hash_changes_with_content() {
        let a = vec![SourceDocument {
            source: "a.txt".into(),
            text: "x".into(),
        }];
        let b = vec![SourceDocument {
            source: "a.txt".into(),
            text: "y".into(),
        }];
        assert_eq!(corpus_hash(&a), corpus_hash(&a.clone()));
        assert_ne!(corpus_hash(&a), corpus_hash(&b));
    }
}
