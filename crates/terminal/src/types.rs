//! Terminal data types.

use settings::constants::session::{DEFAULT_COLS, DEFAULT_ROWS};
use std::fmt;
use std::str::FromStr;

/// Terminal dimensions in rows and columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl TermSize {
    /// Build a size, clamping each dimension to at least one cell.
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols: cols.max(1),
            rows: rows.max(1),
        }
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self {
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }
}

impl fmt::Display for TermSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Parses `<cols>x<rows>`, e.g. `120x40`.
impl FromStr for TermSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (cols, rows) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected <cols>x<rows>, got '{}'", s))?;
        let cols = cols
            .trim()
            .parse::<u16>()
            .map_err(|e| format!("invalid column count '{}': {}", cols, e))?;
        let rows = rows
            .trim()
            .parse::<u16>()
            .map_err(|e| format!("invalid row count '{}': {}", rows, e))?;
        Ok(Self::new(cols, rows))
    }
}
