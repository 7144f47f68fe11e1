use std::fmt;

/// Widest column the service reads when it scans a whole tab (`ZZ`).
pub const MAX_COLUMNS: u32 = 702;

/// Converts a 1-based column number to its A1 letters: 1 -> A, 26 -> Z, 27 -> AA.
///
/// Column 0 has no letters and yields an empty string.
pub fn a1_col(mut n: u32) -> String {
    let mut letters = Vec::new();
    while n > 0 {
        let r = (n - 1) % 26;
        letters.push(b'A' + r as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// The part of a tab a range covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Span {
    /// A whole sheet row, e.g. `1:1`.
    Row(u32),
    /// Every row of an inclusive column interval, e.g. `A:ZZ`.
    Columns { first: u32, last: u32 },
    /// `width` cells of one row starting at column A, e.g. `A5:F5`.
    RowCells { row: u32, width: u32 },
}

/// A rectangular range on a named tab.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct A1Range {
    pub tab: String,
    pub span: Span,
}

impl A1Range {
    /// The header row of `tab`.
    pub fn header(tab: &str) -> Self {
        A1Range {
            tab: tab.to_string(),
            span: Span::Row(1),
        }
    }

    /// Every populated row of `tab`, header included, up to column `ZZ`.
    pub fn all_rows(tab: &str) -> Self {
        A1Range {
            tab: tab.to_string(),
            span: Span::Columns {
                first: 1,
                last: MAX_COLUMNS,
            },
        }
    }

    /// Column A of `tab`; the anchor the API uses to find the end of a table.
    pub fn first_column(tab: &str) -> Self {
        A1Range {
            tab: tab.to_string(),
            span: Span::Columns { first: 1, last: 1 },
        }
    }

    /// The first `width` cells of sheet row `row`.
    pub fn row_cells(tab: &str, row: u32, width: usize) -> Self {
        A1Range {
            tab: tab.to_string(),
            span: Span::RowCells {
                row,
                width: u32::try_from(width).unwrap_or(MAX_COLUMNS),
            },
        }
    }

    /// Row and column (both 1-based) of the top-left cell.
    pub fn origin(&self) -> (u32, u32) {
        match self.span {
            Span::Row(row) => (row, 1),
            Span::Columns { first, .. } => (1, first),
            Span::RowCells { row, .. } => (row, 1),
        }
    }
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if needs_quoting(&self.tab) {
            write!(f, "'{}'!", self.tab.replace('\'', "''"))?;
        } else {
            write!(f, "{}!", self.tab)?;
        }

        match self.span {
            Span::Row(row) => write!(f, "{row}:{row}"),
            Span::Columns { first, last } => write!(f, "{}:{}", a1_col(first), a1_col(last)),
            Span::RowCells { row, width } => {
                write!(f, "A{row}:{}{row}", a1_col(width.max(1)))
            }
        }
    }
}

fn needs_quoting(tab: &str) -> bool {
    !tab.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
