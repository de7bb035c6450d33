use std::collections::BTreeMap;

use serde::Serialize;
use similar::{DiffTag, TextDiff};

use lineage_core::{CodeLine, DiffHunk, HunkHeader, LineId, LineageError, LogContext};

/// A zero-context unified diff with stably indexed lines.
///
/// Every line keeps its position as its [`LineId`], headers included, so matched pairs
/// can refer back to the exact line they came from even when the same text occurs
/// several times.
///
/// # Examples
///
/// ```
/// use lineage_core::LogContext;
/// use lineage_core::text::DEFAULT_STOPWORDS;
/// use lineage_difflens::parser::IndexedDiff;
///
/// let diff = IndexedDiff::from_texts(
///     "int x = 0;\nreturn x;\n",
///     "int y = 0;\nreturn y;\n",
///     DEFAULT_STOPWORDS,
///     &LogContext::disabled(),
/// )
/// .unwrap();
/// assert_eq!(diff.hunks().len(), 1);
/// assert_eq!(diff.content_lines().count(), 4);
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedDiff {
    lines: Vec<String>,
    hunks: Vec<DiffHunk>,
    #[serde(skip)]
    content: BTreeMap<LineId, CodeLine>,
}

impl IndexedDiff {
    /// Diff two texts and index the result.
    ///
    /// # Errors
    ///
    /// See [`IndexedDiff::parse`].
    pub fn from_texts<S: AsRef<str>>(
        old: &str,
        new: &str,
        stopwords: &[S],
        ctx: &LogContext,
    ) -> Result<Self, LineageError> {
        Self::parse(unified_diff(old, new), stopwords, ctx)
    }

    /// Index already rendered diff lines.
    ///
    /// A `@@` header owns the next `old_lines + new_lines` lines. Lines outside any
    /// block (file preambles) are kept in the index but never matched. Inside a block,
    /// lines without a `+`/`-` sign are logged and excluded.
    ///
    /// # Errors
    ///
    /// Returns [`LineageError::MalformedHunkHeader`] for a header that does not parse,
    /// and [`LineageError::MalformedDiff`] when a block runs into another `@` line.
    pub fn parse<S: AsRef<str>>(
        lines: Vec<String>,
        stopwords: &[S],
        ctx: &LogContext,
    ) -> Result<Self, LineageError> {
        let mut hunks = Vec::new();
        let mut content = BTreeMap::new();

        let mut i = 0;
        while i < lines.len() {
            if !lines[i].starts_with("@@") {
                i += 1;
                continue;
            }

            let header = parse_hunk_header(lines[i].trim())?;
            let end = i + 1 + header.block_len();
            if end > lines.len() {
                tracing::warn!(
                    parent: ctx.span(),
                    header = %lines[i],
                    missing = end - lines.len(),
                    "hunk block is truncated"
                );
            }

            let mut hunk = DiffHunk {
                header_id: LineId(i),
                header,
                lines: Vec::new(),
            };
            for (k, raw) in lines.iter().enumerate().take(end).skip(i + 1) {
                if raw.starts_with('@') {
                    return Err(LineageError::MalformedDiff(format!(
                        "line {k} inside the block of `{}` is a header: {raw}",
                        lines[i]
                    )));
                }
                match CodeLine::parse(LineId(k), raw, stopwords) {
                    Some(line) => {
                        hunk.lines.push(line.id);
                        content.insert(line.id, line);
                    }
                    None => {
                        tracing::warn!(parent: ctx.span(), line = k, text = %raw, "diff line has no +/- sign");
                    }
                }
            }
            hunks.push(hunk);
            i = end;
        }

        Ok(Self {
            lines,
            hunks,
            content,
        })
    }

    /// Every diff line, indexed by [`LineId`].
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Hunks in diff order.
    pub fn hunks(&self) -> &[DiffHunk] {
        &self.hunks
    }

    /// The content line at `id`, if it belongs to a hunk.
    pub fn line(&self, id: LineId) -> Option<&CodeLine> {
        self.content.get(&id)
    }

    /// All content lines of all hunks, in diff order.
    pub fn content_lines(&self) -> impl Iterator<Item = &CodeLine> {
        self.content.values()
    }

    /// Content lines of one hunk, in diff order.
    pub fn hunk_lines<'a>(&'a self, hunk: &'a DiffHunk) -> impl Iterator<Item = &'a CodeLine> {
        hunk.lines.iter().filter_map(|id| self.content.get(id))
    }

    /// Whether the two texts were identical.
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }
}

/// Render a zero-context unified diff of two texts.
///
/// Line terminators are normalized first, so a missing final newline is not a change.
/// Headers follow the classic range conventions: the count is omitted when it is 1, and
/// an empty range points at the line before it.
///
/// # Examples
///
/// ```
/// use lineage_difflens::parser::unified_diff;
///
/// let diff = unified_diff("a\nb\nc", "a\nB\nc\nd\n");
/// assert_eq!(diff, vec!["--- old", "+++ new", "@@ -2 +2 @@", "-b", "+B", "@@ -3,0 +4 @@", "+d"]);
/// assert!(unified_diff("same\n", "same").is_empty());
/// ```
pub fn unified_diff(old: &str, new: &str) -> Vec<String> {
    let old = normalize_text(old);
    let new = normalize_text(new);
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let diff = TextDiff::from_lines(old.as_str(), new.as_str());
    let mut out = Vec::new();

    for group in diff.grouped_ops(0) {
        let changes: Vec<_> = group
            .iter()
            .map(|op| op.as_tag_tuple())
            .filter(|(tag, _, _)| *tag != DiffTag::Equal)
            .collect();
        let (Some(first), Some(last)) = (changes.first(), changes.last()) else {
            continue;
        };

        if out.is_empty() {
            out.push("--- old".to_string());
            out.push("+++ new".to_string());
        }
        out.push(format!(
            "@@ -{} +{} @@",
            format_range(first.1.start, last.1.end),
            format_range(first.2.start, last.2.end)
        ));
        for (tag, old_range, new_range) in &changes {
            if matches!(tag, DiffTag::Delete | DiffTag::Replace) {
                out.extend(old_range.clone().map(|k| format!("-{}", old_lines[k])));
            }
            if matches!(tag, DiffTag::Insert | DiffTag::Replace) {
                out.extend(new_range.clone().map(|k| format!("+{}", new_lines[k])));
            }
        }
    }
    out
}

fn normalize_text(text: &str) -> String {
    text.lines().map(|l| format!("{l}\n")).collect()
}

fn format_range(start: usize, stop: usize) -> String {
    let length = stop - start;
    let beginning = if length == 0 { start } else { start + 1 };
    if length == 1 {
        format!("{beginning}")
    } else {
        format!("{beginning},{length}")
    }
}

/// Parse `@@ -s1[,c1] +s2[,c2] @@[ section]`.
///
/// # Errors
///
/// Returns [`LineageError::MalformedHunkHeader`] naming the offending line.
///
/// # Examples
///
/// ```
/// use lineage_difflens::parser::parse_hunk_header;
///
/// let h = parse_hunk_header("@@ -3,2 +3 @@").unwrap();
/// assert_eq!((h.old_start, h.old_lines, h.new_start, h.new_lines), (3, 2, 3, 1));
/// assert!(parse_hunk_header("@@ -x +1 @@").is_err());
/// ```
pub fn parse_hunk_header(line: &str) -> Result<HunkHeader, LineageError> {
    let inner = line
        .strip_prefix("@@ ")
        .and_then(|s| {
            let end = s.find(" @@")?;
            Some(&s[..end])
        })
        .ok_or_else(|| LineageError::MalformedHunkHeader(line.to_string()))?;

    let parts: Vec<&str> = inner.split(' ').collect();
    if parts.len() != 2 {
        return Err(LineageError::MalformedHunkHeader(line.to_string()));
    }

    let old = parts[0]
        .strip_prefix('-')
        .ok_or_else(|| LineageError::MalformedHunkHeader(line.to_string()))?;
    let new = parts[1]
        .strip_prefix('+')
        .ok_or_else(|| LineageError::MalformedHunkHeader(line.to_string()))?;

    let (old_start, old_lines) = parse_range(old, line)?;
    let (new_start, new_lines) = parse_range(new, line)?;

    Ok(HunkHeader {
        old_start,
        old_lines,
        new_start,
        new_lines,
    })
}

fn parse_range(range: &str, context: &str) -> Result<(u32, u32), LineageError> {
    let invalid = || LineageError::MalformedHunkHeader(context.to_string());
    if let Some((start, count)) = range.split_once(',') {
        let s = start.parse().map_err(|_| invalid())?;
        let c = count.parse().map_err(|_| invalid())?;
        Ok((s, c))
    } else {
        let s = range.parse().map_err(|_| invalid())?;
        Ok((s, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_core::text::DEFAULT_STOPWORDS;
    use lineage_core::LineSign;

    fn parse(lines: &[&str]) -> Result<IndexedDiff, LineageError> {
        IndexedDiff::parse(
            lines.iter().map(|l| l.to_string()).collect(),
            DEFAULT_STOPWORDS,
            &LogContext::disabled(),
        )
    }

    #[test]
    fn header_with_section_text() {
        let h = parse_hunk_header("@@ -10,0 +11,2 @@ public void run() {").unwrap();
        assert_eq!(h.old_lines, 0);
        assert_eq!(h.new_start, 11);
        assert_eq!(h.block_len(), 2);
    }

    #[test]
    fn header_errors_name_the_line() {
        for bad in ["@@ -1 @@", "@@ 1 +1 @@", "@@ -1 +a,2 @@", "@@@ -1 +1 @@@", "@@ -1 +1"] {
            let err = parse_hunk_header(bad).unwrap_err();
            assert!(
                matches!(err, LineageError::MalformedHunkHeader(ref l) if l == bad),
                "{bad}: {err}"
            );
        }
    }

    #[test]
    fn identical_texts_have_no_hunks() {
        let diff = IndexedDiff::from_texts("a\nb\n", "a\nb", DEFAULT_STOPWORDS, &LogContext::disabled())
            .unwrap();
        assert!(diff.is_empty());
        assert!(diff.lines().is_empty());
    }

    #[test]
    fn pure_deletion_range() {
        let diff = unified_diff("a\nb\nc\n", "a\nc\n");
        assert_eq!(diff[2], "@@ -2 +1,0 @@");
        assert_eq!(diff[3], "-b");
    }

    #[test]
    fn insertion_at_start() {
        let diff = unified_diff("b\n", "a\nb\n");
        assert_eq!(diff[2], "@@ -0,0 +1 @@");
    }

    #[test]
    fn block_sizing_uses_both_counts() {
        let diff = parse(&[
            "--- old",
            "+++ new",
            "@@ -1,2 +1 @@",
            "-int x = 0;",
            "-int y = 0;",
            "+int z = 0;",
            "@@ -5 +4,0 @@",
            "-return x;",
        ])
        .unwrap();
        assert_eq!(diff.hunks().len(), 2);
        assert_eq!(diff.hunks()[0].lines, vec![LineId(3), LineId(4), LineId(5)]);
        assert_eq!(diff.hunks()[1].lines, vec![LineId(7)]);
        assert_eq!(diff.line(LineId(5)).unwrap().sign, LineSign::Added);
        assert!(diff.line(LineId(0)).is_none(), "preamble is not content");
    }

    #[test]
    fn header_inside_block_is_malformed() {
        let err = parse(&["@@ -1,2 +1 @@", "-a;", "@@ -3 +3 @@", "+b;"]).unwrap_err();
        assert!(matches!(err, LineageError::MalformedDiff(_)));
    }

    #[test]
    fn unsigned_line_inside_block_is_excluded() {
        let diff = parse(&["@@ -1 +1 @@", " context", "+b;"]).unwrap();
        assert_eq!(diff.hunks()[0].lines, vec![LineId(2)]);
    }

    #[test]
    fn malformed_header_is_fatal() {
        let err = parse(&["@@ -a +1 @@", "-x;", "+y;"]).unwrap_err();
        assert!(matches!(err, LineageError::MalformedHunkHeader(_)));
    }

    #[test]
    fn rendered_diff_reparses() {
        let old = "int a = 1;\nint b = 2;\nreturn a + b;\n";
        let new = "int a = 1;\nint c = 3;\nint b = 2;\nreturn a * b;\n";
        let diff = IndexedDiff::from_texts(old, new, DEFAULT_STOPWORDS, &LogContext::disabled())
            .unwrap();
        let total: usize = diff.hunks().iter().map(|h| h.header.block_len()).sum();
        assert_eq!(total, diff.content_lines().count());
    }
}
