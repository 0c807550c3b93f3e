//! Source files and linking
//!
//! An application is made of several `.aro` files. Linking parses each one
//! and concatenates their feature sets into a single program, tagging every
//! feature set with the file it came from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::events::{LifecyclePhase, TriggerPattern};
use crate::executor::types::Program;
use crate::parser::{parse_program, ParseError};

const SOURCE_EXTENSION: &str = "aro";

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file}: {}", summarize(.errors))]
    Syntax { file: String, errors: Vec<ParseError> },

    #[error("'{event}' is handled in both {first} and {second}")]
    DuplicateLifecycle {
        event: String,
        first: String,
        second: String,
    },
}

fn summarize(errors: &[ParseError]) -> String {
    match errors {
        [] => "syntax errors".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Display name, usually the file name
    pub name: String,
    pub source: String,
    pub path: Option<PathBuf>,
    /// SHA-256 of the source text, hex encoded
    pub hash: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            name: name.into(),
            hash: content_hash(&source),
            source,
            path: None,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LinkError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| LinkError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mut file = Self::new(name, source);
        file.path = Some(path.to_path_buf());
        Ok(file)
    }

    /// Every `.aro` file directly inside `dir`, sorted by file name
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<Self>, LinkError> {
        let dir = dir.as_ref();
        let io_error = |source| LinkError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();
        paths.iter().map(Self::from_path).collect()
    }
}

pub fn content_hash(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

/// Parse and combine source files into one program.
///
/// Fails on the first file with syntax errors, and when feature sets in two
/// different files handle the same lifecycle event.
pub fn link(files: &[SourceFile]) -> Result<Program, LinkError> {
    let mut program = Program::default();
    let mut lifecycle: HashMap<LifecyclePhase, String> = HashMap::new();

    for file in files {
        let output = parse_program(&file.source);
        if output.has_errors() {
            return Err(LinkError::Syntax {
                file: file.name.clone(),
                errors: output.diagnostics,
            });
        }
        tracing::debug!(
            file = %file.name,
            hash = %file.hash,
            feature_sets = output.program.feature_sets.len(),
            "Source file linked"
        );

        for mut feature_set in output.program.feature_sets {
            if let TriggerPattern::Lifecycle(phase) =
                TriggerPattern::derive(&feature_set.name, &feature_set.activity)
            {
                // duplicates inside one file are left to the analyzer warning
                match lifecycle.get(&phase) {
                    Some(first) if *first != file.name => {
                        return Err(LinkError::DuplicateLifecycle {
                            event: phase.event_name().to_string(),
                            first: first.clone(),
                            second: file.name.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        lifecycle.insert(phase, file.name.clone());
                    }
                }
            }
            feature_set.origin = Some(file.name.clone());
            program.feature_sets.push(feature_set);
        }
    }
    Ok(program)
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    const START: &str = "(Application-Start: Demo) { <Log> the <message> to the <console> with \"up\". }";

    #[test]
    fn test_hash_identifies_content() {
        let a = SourceFile::new("a.aro", START);
        let b = SourceFile::new("b.aro", START);
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);
        assert_ne!(a.hash, SourceFile::new("c.aro", "").hash);
    }

    #[test]
    fn test_link_tags_origin() {
        let files = vec![
            SourceFile::new("main.aro", START),
            SourceFile::new(
                "users.aro",
                "(List Users: Users) { <Return> an <OK: status> for the <request>. }",
            ),
        ];
        let program = assert_ok!(link(&files));
        assert_eq!(program.feature_sets.len(), 2);
        assert_eq!(program.feature_sets[0].origin.as_deref(), Some("main.aro"));
        assert_eq!(
            program.find("List Users").and_then(|fs| fs.origin.as_deref()),
            Some("users.aro")
        );
    }

    #[test]
    fn test_duplicate_lifecycle_across_files() {
        let files = vec![
            SourceFile::new("main.aro", START),
            SourceFile::new("extra.aro", START),
        ];
        match link(&files) {
            Err(LinkError::DuplicateLifecycle {
                event,
                first,
                second,
            }) => {
                assert_eq!(event, "Application-Start");
                assert_eq!(first, "main.aro");
                assert_eq!(second, "extra.aro");
            }
            other => panic!("expected duplicate lifecycle, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_lifecycle_in_one_file_links() {
        let source = r#"
            (Application-Start: First) { <Log> the <message> to the <console> with "one". }
            (Application-Start: Second) { <Log> the <message> to the <console> with "two". }
        "#;
        let program = assert_ok!(link(&[SourceFile::new("main.aro", source)]));
        assert_eq!(program.feature_sets.len(), 2);

        let files = vec![
            SourceFile::new("main.aro", source),
            SourceFile::new("extra.aro", START),
        ];
        let err = assert_err!(link(&files));
        assert!(matches!(
            err,
            LinkError::DuplicateLifecycle { ref first, ref second, .. }
                if first == "main.aro" && second == "extra.aro"
        ));
    }

    #[test]
    fn test_syntax_errors_name_the_file() {
        let files = vec![SourceFile::new("broken.aro", "(Oops: Demo) { <Create> the <x> with 1 }")];
        let err = assert_err!(link(&files));
        assert!(matches!(&err, LinkError::Syntax { file, .. } if file == "broken.aro"));
        assert!(err.to_string().starts_with("broken.aro: "));
    }

    #[test]
    fn test_load_dir_picks_sorted_sources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.aro"), START).unwrap();
        std::fs::write(
            dir.path().join("a.aro"),
            "(Ping: Ping Handler) { <Log> the <message> to the <console> with \"ping\". }",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a source").unwrap();

        let files = assert_ok!(SourceFile::load_dir(dir.path()));
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.aro", "b.aro"]);
        assert!(files[0].path.is_some());
        assert_eq!(link(&files).unwrap().feature_sets.len(), 2);
    }
}
