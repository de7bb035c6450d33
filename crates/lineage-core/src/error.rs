use std::path::PathBuf;

/// Errors that can occur across the lineage workspace.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary crate converts to `miette` diagnostics at the boundary.
///
/// Unparsable fragments are deliberately absent: a line that cannot be parsed
/// is an ordinary outcome of normalization, not a failure of the comparison.
///
/// # Examples
///
/// ```
/// use lineage_core::LineageError;
///
/// let err = LineageError::Config("threshold out of range".into());
/// assert!(err.to_string().contains("threshold out of range"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum LineageError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    #[diagnostic(code(lineage::io))]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(lineage::config), help("run `lineage init` to write a valid .lineage.toml"))]
    Config(String),

    /// A `@@` header that does not follow `@@ -s1[,c1] +s2[,c2] @@`.
    #[error("malformed hunk header: {0}")]
    #[diagnostic(code(lineage::diff::header))]
    MalformedHunkHeader(String),

    /// Diff content that contradicts its own hunk headers.
    #[error("malformed diff: {0}")]
    #[diagnostic(code(lineage::diff))]
    MalformedDiff(String),

    /// Two snippets that must not be compared with each other.
    #[error("ineligible comparison: {0}")]
    #[diagnostic(
        code(lineage::ineligible),
        help("compare versions of one snippet group, older first, with matching prompt ids")
    )]
    Ineligible(String),

    /// Misuse of the evolution graph (non-adjacent versions, empty line text).
    #[error("graph contract violation: {0}")]
    #[diagnostic(code(lineage::graph))]
    GraphContract(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    #[diagnostic(code(lineage::serialization))]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(lineage::config::toml))]
    Toml(#[from] toml::de::Error),

    /// A snippet file name that does not follow `<Name>_<Variant>_v<N>[_<prompt>]`.
    #[error("invalid snippet file name: {0}")]
    #[diagnostic(
        code(lineage::snippet_name),
        help("name snippet files <Name>_<Variant>_v<N>[_<prompt>].java")
    )]
    InvalidSnippetName(String),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    #[diagnostic(code(lineage::io::not_found))]
    FileNotFound(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: LineageError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn hunk_header_error_displays_line() {
        let err = LineageError::MalformedHunkHeader("@@ -x +1 @@".into());
        assert_eq!(err.to_string(), "malformed hunk header: @@ -x +1 @@");
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = LineageError::FileNotFound(PathBuf::from("/tmp/BinarySearch_KF0_v0.java"));
        assert!(err.to_string().contains("BinarySearch_KF0_v0.java"));
    }
}
