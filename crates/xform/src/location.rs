use core::fmt;
use std::sync::Arc;

/// Best-effort source position of an event or expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Location {
    pub system_id: Option<Arc<str>>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl Location {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn new(system_id: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Self { system_id: Some(system_id.into()), line: Some(line), column: Some(column) }
    }

    pub fn at_line(line: u32) -> Self {
        Self { system_id: None, line: Some(line), column: None }
    }

    pub fn is_unknown(&self) -> bool {
        self.system_id.is_none() && self.line.is_none()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.system_id, self.line) {
            (Some(sys), Some(line)) => write!(f, "{sys}#{line}"),
            (Some(sys), None) => write!(f, "{sys}"),
            (None, Some(line)) => write!(f, "line {line}"),
            (None, None) => write!(f, "unknown location"),
        }
    }
}
