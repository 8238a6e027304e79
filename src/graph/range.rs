use tracing::warn;

/// Spreadsheet column letters for a 1-based column number (1 = A, 27 = AA).
pub fn column_letter(column: usize) -> String {
    let mut letters = Vec::new();
    let mut n = column;
    while n > 0 {
        let remainder = (n - 1) % 26;
        letters.push(b'A' + remainder as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Row number of the last cell in a range address such as `App!A1:F42`.
pub fn last_row_from_address(address: &str) -> Option<u32> {
    let end_cell = address.rsplit('!').next()?.rsplit(':').next()?;
    let digits_start = end_cell
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    end_cell[digits_start..].parse().ok()
}

/// Prefix a cell range with its sheet, quoting names Excel would not accept bare
pub fn qualified_address(sheet_name: &str, range: &str) -> String {
    let bare = sheet_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    match bare {
        true => format!("{}!{}", sheet_name, range),
        false => format!("'{}'!{}", sheet_name.replace('\'', "''"), range),
    }
}

/// Body of an OData string literal: single quotes are doubled
pub fn odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowSource {
    RowCount,
    Address,
    /// Neither source was usable; the sheet is treated as empty
    Assumed,
}

/// Occupied extent of a worksheet, recomputed before every append
#[derive(Debug, Clone, PartialEq)]
pub struct WorksheetRange {
    pub sheet_name: String,
    pub last_row_index: u32,
    pub column_count: usize,
    pub source: RowSource,
}

impl WorksheetRange {
    /// Prefer the reported row count, then the trailing row of the address,
    /// then assume an empty sheet.
    pub fn from_used_range(
        sheet_name: &str,
        row_count: Option<u32>,
        address: Option<&str>,
        column_count: usize,
    ) -> Self {
        let (last_row_index, source) = match (row_count, address.and_then(last_row_from_address)) {
            (Some(rows), _) if rows > 0 => (rows, RowSource::RowCount),
            (_, Some(rows)) => (rows, RowSource::Address),
            _ => {
                warn!(
                    sheet = sheet_name,
                    ?address,
                    "Could not determine used range, assuming empty sheet"
                );
                (0, RowSource::Assumed)
            }
        };

        Self {
            sheet_name: sheet_name.to_string(),
            last_row_index,
            column_count,
            source,
        }
    }

    pub fn empty(sheet_name: &str, column_count: usize) -> Self {
        Self::from_used_range(sheet_name, None, None, column_count)
    }

    /// Address of the block `row_count` rows tall directly below the used range
    pub fn append_target(&self, row_count: usize) -> String {
        let first = self.last_row_index as usize + 1;
        let last = self.last_row_index as usize + row_count;
        let range = format!("A{}:{}{}", first, column_letter(self.column_count), last);
        qualified_address(&self.sheet_name, &range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        let cases = [(1, "A"), (2, "B"), (26, "Z"), (27, "AA"), (52, "AZ"), (702, "ZZ"), (703, "AAA")];
        for (column, expected) in cases {
            assert_eq!(column_letter(column), expected, "column {column}");
        }
        assert_eq!(column_letter(0), "");
    }

    #[test]
    fn test_last_row_from_address() {
        assert_eq!(last_row_from_address("App!A1:F42"), Some(42));
        assert_eq!(last_row_from_address("'Deal Log'!A1:AB1200"), Some(1200));
        assert_eq!(last_row_from_address("Sheet1!C7"), Some(7));
        assert_eq!(last_row_from_address("Sheet1!A:F"), None);
        assert_eq!(last_row_from_address(""), None);
    }

    #[test]
    fn test_append_target_after_row_count() {
        let range = WorksheetRange::from_used_range("App", Some(10), Some("App!A1:D10"), 4);
        assert_eq!(range.source, RowSource::RowCount);
        assert_eq!(range.append_target(3), "App!A11:D13");
    }

    #[test]
    fn test_append_target_from_address_fallback() {
        let range = WorksheetRange::from_used_range("App", None, Some("App!A1:B7"), 2);
        assert_eq!(range.source, RowSource::Address);
        assert_eq!(range.append_target(1), "App!A8:B8");

        let zero_rows = WorksheetRange::from_used_range("App", Some(0), Some("App!A1:B3"), 2);
        assert_eq!(zero_rows.last_row_index, 3);
    }

    #[test]
    fn test_append_target_on_unknown_sheet_starts_at_top() {
        let range = WorksheetRange::from_used_range("App", None, Some("garbage"), 3);
        assert_eq!(range.source, RowSource::Assumed);
        assert_eq!(range.append_target(2), "App!A1:C2");
        assert_eq!(WorksheetRange::empty("App", 1).append_target(1), "App!A1:A1");
    }

    #[test]
    fn test_qualified_address_quotes_names() {
        assert_eq!(qualified_address("Sheet1", "A1:B2"), "Sheet1!A1:B2");
        assert_eq!(qualified_address("Deal Log", "A1"), "'Deal Log'!A1");
        assert_eq!(qualified_address("Bob's", "A1"), "'Bob''s'!A1");
    }

    #[test]
    fn test_odata_literal_doubles_quotes() {
        assert_eq!(odata_literal("App!A1:B2"), "App!A1:B2");
        assert_eq!(odata_literal("'Used AMS'!A6:A6"), "''Used AMS''!A6:A6");
    }
}
