//! Source locations within a JSON document

use std::fmt;

/// 1-based line and column plus byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonLocation {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

impl Default for JsonLocation {
    fn default() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

impl fmt::Display for JsonLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsonSpan {
    pub start: JsonLocation,
    pub end: JsonLocation,
}

impl JsonSpan {
    pub fn new(start: JsonLocation, end: JsonLocation) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for JsonSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] - [{}]", self.start, self.end)
    }
}
