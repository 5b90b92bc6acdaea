//! Source Location Utilities
//!
//! Locations in a decoded result are byte ranges into the source that was
//! handed to the engine. Line and column information is not part of the wire
//! format; [`LineIndex`] recovers it on demand.

use std::fmt;

use serde::Serialize;

/// A byte range `[start, end)` into the parsed source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Location {
    /// Start byte offset
    pub start: u32,
    /// End byte offset (exclusive)
    pub end: u32,
}

impl Location {
    /// Create a new location
    #[inline]
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    /// Check if the location covers no bytes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether the location is well formed for a source of `source_len` bytes
    #[inline]
    pub fn fits(&self, source_len: usize) -> bool {
        self.start <= self.end && self.end as usize <= source_len
    }

    /// The bytes of `source` covered by this location
    ///
    /// Returns `None` when the location does not fit the given source.
    pub fn slice<'a>(&self, source: &'a [u8]) -> Option<&'a [u8]> {
        source.get(self.start as usize..self.end as usize)
    }

    /// Check whether `offset` falls inside this location
    #[inline]
    pub fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Return a location starting at self and ending at the end of other
    ///
    /// Returns `None` if self starts after other.
    pub fn join(&self, other: &Location) -> Option<Location> {
        if self.start > other.start {
            None
        } else {
            Some(Location {
                start: self.start,
                end: self.end.max(other.end),
            })
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A line/column position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineColumn {
    /// Line number, counted from the configured start line
    pub line: i32,
    /// Column in bytes from the start of the line (0-based)
    pub column: u32,
}

impl fmt::Display for LineColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Offsets of line starts in a source buffer
///
/// Built once per source; lookups are a binary search.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset at which each line begins (first entry is always 0)
    line_starts: Vec<u32>,
    /// Number the first line is reported as
    start_line: i32,
}

impl LineIndex {
    /// Index a source whose first line is line 1
    pub fn new(source: &[u8]) -> Self {
        Self::with_start_line(source, 1)
    }

    /// Index a source whose first line carries the given number
    ///
    /// Matches the starting line passed in the parser options.
    pub fn with_start_line(source: &[u8], start_line: i32) -> Self {
        let mut line_starts = Vec::with_capacity(source.len() / 32 + 1);
        line_starts.push(0);
        line_starts.extend(memchr::memchr_iter(b'\n', source).map(|pos| pos as u32 + 1));

        Self {
            line_starts,
            start_line,
        }
    }

    /// Number of lines in the source
    #[inline]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Line and column of a byte offset
    pub fn line_column(&self, offset: u32) -> LineColumn {
        let index = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };

        // Saturates for start lines near i32::MAX
        let offset_lines = i32::try_from(index).unwrap_or(i32::MAX);
        LineColumn {
            line: self.start_line.saturating_add(offset_lines),
            column: offset - self.line_starts[index],
        }
    }

    /// Line and column of the start of a location
    #[inline]
    pub fn start_of(&self, location: &Location) -> LineColumn {
        self.line_column(location.start)
    }

    /// Line and column of the end of a location
    #[inline]
    pub fn end_of(&self, location: &Location) -> LineColumn {
        self.line_column(location.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_basics() {
        let loc = Location::new(2, 5);
        assert_eq!(loc.len(), 3);
        assert!(!loc.is_empty());
        assert!(loc.contains(2));
        assert!(!loc.contains(5));
        assert_eq!(loc.to_string(), "2..5");
    }

    #[test]
    fn test_location_slice() {
        let source = b"puts 1";
        assert_eq!(Location::new(0, 4).slice(source), Some(&b"puts"[..]));
        assert_eq!(Location::new(5, 9).slice(source), None);
    }

    #[test]
    fn test_location_fits() {
        assert!(Location::new(0, 0).fits(0));
        assert!(Location::new(1, 3).fits(3));
        assert!(!Location::new(1, 4).fits(3));
        assert!(!Location::new(3, 1).fits(3));
    }

    #[test]
    fn test_location_join() {
        let a = Location::new(0, 2);
        let b = Location::new(4, 7);
        assert_eq!(a.join(&b), Some(Location::new(0, 7)));
        assert_eq!(b.join(&a), None);
    }

    #[test]
    fn test_line_index() {
        let source = b"a = 1\nb = 2\n\nc";
        let index = LineIndex::new(source);
        assert_eq!(index.line_count(), 4);

        assert_eq!(index.line_column(0), LineColumn { line: 1, column: 0 });
        assert_eq!(index.line_column(4), LineColumn { line: 1, column: 4 });
        assert_eq!(index.line_column(6), LineColumn { line: 2, column: 0 });
        assert_eq!(index.line_column(12), LineColumn { line: 3, column: 0 });
        assert_eq!(index.line_column(13), LineColumn { line: 4, column: 0 });
    }

    #[test]
    fn test_line_index_start_line() {
        let source = b"x\ny";
        let index = LineIndex::with_start_line(source, 10);
        let loc = Location::new(2, 3);
        assert_eq!(index.start_of(&loc).line, 11);
        assert_eq!(index.end_of(&loc).column, 1);
    }

    #[test]
    fn test_line_index_start_line_saturates() {
        let source = b"a\nb\nc";
        let index = LineIndex::with_start_line(source, i32::MAX - 1);
        assert_eq!(index.line_column(0).line, i32::MAX - 1);
        assert_eq!(index.line_column(2).line, i32::MAX);
        assert_eq!(index.line_column(4).line, i32::MAX);

        let index = LineIndex::with_start_line(source, i32::MIN);
        assert_eq!(index.line_column(4).line, i32::MIN + 2);
    }
}
