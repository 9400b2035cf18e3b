use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location span.
///
/// Lines are 1-based. Columns are 0-based character offsets into the line,
/// the convention Python tooling uses when it reports error positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    #[serde(rename = "line")]
    pub start_line: u32,
    #[serde(rename = "column")]
    pub start_col: u32,
    pub end_line: u32,
    #[serde(rename = "end_column")]
    pub end_col: u32,
}

impl Span {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// A zero-width span at a single position.
    pub fn point(line: u32, col: u32) -> Self {
        Self::new(line, col, line, col)
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        let (start_line, start_col) = self.start().min(other.start());
        let (end_line, end_col) = self.end().max(other.end());
        Span::new(start_line, start_col, end_line, end_col)
    }

    /// `(line, column)` of the first character, usable as a sort key.
    pub fn start(&self) -> (u32, u32) {
        (self.start_line, self.start_col)
    }

    pub fn end(&self) -> (u32, u32) {
        (self.end_line, self.end_col)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// A submission's text plus a line index for rendering code context.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            name: name.into(),
            source,
            line_starts,
        }
    }

    /// Source line by 1-based number, without its line terminator.
    pub fn line(&self, line_number: u32) -> Option<&str> {
        let idx = line_number.checked_sub(1)? as usize;
        let start = *self.line_starts.get(idx)?;
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&next| next - 1)
            .unwrap_or(self.source.len());
        Some(self.source[start..end].trim_end_matches('\r'))
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_is_zero_width() {
        let s = Span::point(4, 0);
        assert_eq!(s.start(), (4, 0));
        assert_eq!(s.end(), (4, 0));
    }

    #[test]
    fn merge_across_lines() {
        let a = Span::new(1, 4, 1, 9);
        let b = Span::new(3, 0, 3, 6);
        let merged = a.merge(b);
        assert_eq!(merged, Span::new(1, 4, 3, 6));
        assert_eq!(b.merge(a), merged);
    }

    #[test]
    fn merge_same_line_keeps_outer_columns() {
        let merged = Span::new(2, 5, 2, 10).merge(Span::new(2, 1, 2, 7));
        assert_eq!(merged, Span::new(2, 1, 2, 10));
    }

    #[test]
    fn display_is_line_colon_column() {
        assert_eq!(Span::new(7, 3, 7, 9).to_string(), "7:3");
    }

    #[test]
    fn serializes_with_line_and_column_names() {
        let json = serde_json::to_string(&Span::new(2, 4, 2, 8)).unwrap();
        assert!(json.contains("\"line\":2"));
        assert!(json.contains("\"column\":4"));
        assert!(json.contains("\"end_column\":8"));
    }

    #[test]
    fn source_lines_by_number() {
        let src = SourceFile::new("main.py", "def f():\n    return 1\nf()");
        assert_eq!(src.line(1), Some("def f():"));
        assert_eq!(src.line(2), Some("    return 1"));
        assert_eq!(src.line(3), Some("f()"));
        assert_eq!(src.line(0), None);
        assert_eq!(src.line(4), None);
        assert_eq!(src.line_count(), 3);
    }

    #[test]
    fn crlf_terminators_are_stripped() {
        let src = SourceFile::new("main.py", "x = 1\r\ny = 2\r\n");
        assert_eq!(src.line(1), Some("x = 1"));
        assert_eq!(src.line(2), Some("y = 2"));
        assert_eq!(src.line(3), Some(""));
    }

    #[test]
    fn empty_source_has_one_empty_line() {
        let src = SourceFile::new("main.py", "");
        assert_eq!(src.line_count(), 1);
        assert_eq!(src.line(1), Some(""));
    }
}
