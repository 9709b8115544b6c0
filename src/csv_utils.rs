//! Shared CSV utilities for the OPCOM report parser
//!
//! The report mixes free-text title lines with delimited table rows and the
//! delimiter is not guaranteed, so each line is split on its own by trying
//! the known delimiters in a fixed order.

use csv::{ReaderBuilder, StringRecord, Trim};

/// Minimum cell count for a line to count as a table row
pub const MIN_ROW_CELLS: usize = 3;

/// Delimiters tried when splitting a line, in attempt order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Semicolon,
    Tab,
}

impl Delimiter {
    /// Order in which [`split_row`] tries delimiters
    pub const ATTEMPT_ORDER: [Delimiter; 3] =
        [Delimiter::Comma, Delimiter::Semicolon, Delimiter::Tab];

    /// Delimiter byte for `csv::ReaderBuilder`
    pub fn as_byte(self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Semicolon => b';',
            Delimiter::Tab => b'\t',
        }
    }
}

/// Outcome of splitting one line
#[derive(Debug, Clone, PartialEq)]
pub enum RowSplit {
    /// First delimiter that produced at least [`MIN_ROW_CELLS`] cells
    Cells {
        delimiter: Delimiter,
        cells: Vec<String>,
    },

    /// No delimiter produced enough cells
    Unstructured,
}

impl RowSplit {
    /// Cells of a structured row, `None` if unstructured
    pub fn cells(&self) -> Option<&[String]> {
        match self {
            RowSplit::Cells { cells, .. } => Some(cells),
            RowSplit::Unstructured => None,
        }
    }
}

/// Strip surrounding whitespace and quotes from a cell
pub fn clean_cell(cell: &str) -> String {
    cell.trim().trim_matches('"').trim().to_string()
}

fn read_single_record(line: &str, delimiter: Delimiter) -> Option<StringRecord> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter.as_byte())
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(line.as_bytes());

    reader.records().next().and_then(|result| result.ok())
}

/// Split one line into cleaned cells
///
/// # Example
///
/// ```rust
/// use opcom_dam_prices::csv_utils::{split_row, Delimiter, RowSplit};
///
/// let split = split_row(r#""Romania","1","443,76""#);
/// assert_eq!(
///     split.cells().unwrap(),
///     &["Romania".to_string(), "1".to_string(), "443,76".to_string()]
/// );
/// assert!(matches!(split, RowSplit::Cells { delimiter: Delimiter::Comma, .. }));
///
/// assert_eq!(split_row("Raport PZU"), RowSplit::Unstructured);
/// ```
pub fn split_row(line: &str) -> RowSplit {
    for delimiter in Delimiter::ATTEMPT_ORDER {
        let Some(record) = read_single_record(line, delimiter) else {
            continue;
        };

        if record.len() >= MIN_ROW_CELLS {
            return RowSplit::Cells {
                delimiter,
                cells: record.iter().map(clean_cell).collect(),
            };
        }
    }

    RowSplit::Unstructured
}
