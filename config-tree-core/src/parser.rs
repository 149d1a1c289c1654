use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::normalize::normalize;
use crate::tree::ConfigNode;

/// Errors that can occur while parsing a document into a [`ConfigNode`] tree.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Input could not be tokenized as JSON.
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Failed to read input file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// Structural issue in the document.
    #[error("malformed config: {0}")]
    Malformed(String),
    /// A file includes itself, directly or through other files.
    #[error("detected include loop on '{include}' in file '{path}'")]
    IncludeLoop { include: String, path: PathBuf },
    /// A nested include could not be read or expanded.
    #[error("problem with include '{include}' of '{path}': {source}")]
    Include {
        include: String,
        path: PathBuf,
        #[source]
        source: Box<ParseError>,
    },
}

/// Parse JSON bytes into a normalized [`ConfigNode`] tree.
///
/// The document root must be a map; daemons always report their
/// configuration as a single object keyed by the configuration root name.
pub fn parse(bytes: &[u8]) -> Result<ConfigNode, ParseError> {
    let value: Value = serde_json::from_slice(bytes)?;
    if !value.is_object() {
        return Err(ParseError::Malformed(
            "document root must be a map".to_string(),
        ));
    }
    Ok(normalize(&ConfigNode::from(value)))
}

/// Parse a JSON string into a normalized [`ConfigNode`] tree.
pub fn parse_str(text: &str) -> Result<ConfigNode, ParseError> {
    parse(text.as_bytes())
}

/// Parse a JSON file into a [`ConfigNode`] tree.
pub fn parse_file(path: &Path) -> Result<ConfigNode, ParseError> {
    let bytes = fs::read(path)?;
    parse(&bytes)
}

/// Parse a JSON file after expanding `<?include "file.json" ?>` statements.
pub fn parse_file_with_includes(path: &Path) -> Result<ConfigNode, ParseError> {
    let text = expand_includes(path)?;
    parse_str(&text)
}

/// Read a file and recursively replace include statements with the content
/// of the referenced files.
///
/// Include paths may be absolute or relative to the including file and must
/// carry a `.json` extension. A file reachable from itself is rejected.
pub fn expand_includes(path: &Path) -> Result<String, ParseError> {
    let root = fs::canonicalize(path)?;
    let mut parents = BTreeSet::new();
    parents.insert(root.clone());
    expand_includes_inner(&root, &parents)
}

fn expand_includes_inner(path: &Path, parents: &BTreeSet<PathBuf>) -> Result<String, ParseError> {
    let mut text = fs::read_to_string(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("/"));

    let matches: Vec<(usize, usize, String)> = include_pattern()
        .captures_iter(&text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let include = caps.get(1)?;
            Some((whole.start(), whole.end(), include.as_str().to_string()))
        })
        .collect();

    // Replace from the end so earlier offsets stay valid.
    for (start, end, include) in matches.into_iter().rev() {
        let candidate = Path::new(&include);
        let nested = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            base_dir.join(candidate)
        };
        let nested = fs::canonicalize(&nested).map_err(|err| ParseError::Include {
            include: include.clone(),
            path: path.to_path_buf(),
            source: Box::new(ParseError::Io(err)),
        })?;

        if parents.contains(&nested) {
            return Err(ParseError::IncludeLoop {
                include,
                path: path.to_path_buf(),
            });
        }

        let mut nested_parents = parents.clone();
        nested_parents.insert(nested.clone());
        let content =
            expand_includes_inner(&nested, &nested_parents).map_err(|err| match err {
                loop_err @ ParseError::IncludeLoop { .. } => loop_err,
                other => ParseError::Include {
                    include: include.clone(),
                    path: path.to_path_buf(),
                    source: Box::new(other),
                },
            })?;

        text.replace_range(start..end, &content);
    }

    Ok(text)
}

fn include_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"<\?include\s*"([^"]+\.json)"\s*\?>"#).expect("include pattern is valid")
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{expand_includes, parse, parse_file_with_includes, ParseError};

    #[test]
    fn rejects_non_map_root() {
        let err = parse(b"[1, 2]").expect_err("list root must fail");
        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn expands_relative_and_nested_includes() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("sub")).expect("mkdir");
        fs::write(
            dir.path().join("main.json"),
            r#"{"Dhcp4": {"loggers": <?include "sub/loggers.json"?>}}"#,
        )
        .expect("write main");
        fs::write(
            dir.path().join("sub/loggers.json"),
            r#"[{"name": "kea-dhcp4", "output_options": <?include "outputs.json" ?>}]"#,
        )
        .expect("write loggers");
        fs::write(
            dir.path().join("sub/outputs.json"),
            r#"[{"output": "/var/log/kea.log"}]"#,
        )
        .expect("write outputs");

        let node = parse_file_with_includes(&dir.path().join("main.json")).expect("parse");
        let loggers = node.items(&["Dhcp4", "loggers"]);
        assert_eq!(loggers.len(), 1);
        assert_eq!(
            loggers[0].items(&["output_options"])[0].get_str(&["output"]),
            Some("/var/log/kea.log")
        );
    }

    #[test]
    fn detects_include_loops() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("a.json"), r#"{"x": <?include "b.json"?>}"#).expect("write a");
        fs::write(dir.path().join("b.json"), r#"{"y": <?include "a.json"?>}"#).expect("write b");

        let err = expand_includes(&dir.path().join("a.json")).expect_err("loop");
        assert!(matches!(err, ParseError::IncludeLoop { .. }), "{err}");
    }

    #[test]
    fn missing_include_reports_the_including_file() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("a.json"), r#"{"x": <?include "gone.json"?>}"#)
            .expect("write a");

        let err = expand_includes(&dir.path().join("a.json")).expect_err("missing include");
        match err {
            ParseError::Include { include, .. } => assert_eq!(include, "gone.json"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
