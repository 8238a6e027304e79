use crate::error::{AppError, Result};
use tracing::warn;

/// Ordered mapping from column header to cell text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetRow {
    cells: Vec<(String, String)>,
}

impl SheetRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, header: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(header, value);
        self
    }

    /// Set `header` to `value`, keeping the header's original position if present
    pub fn insert(&mut self, header: impl Into<String>, value: impl Into<String>) {
        let header = header.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(h, _)| *h == header) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((header, value)),
        }
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(h, _)| h.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// JSON object keyed by header
    pub fn to_json(&self) -> serde_json::Value {
        self.cells
            .iter()
            .map(|(h, v)| (h.clone(), serde_json::Value::String(v.clone())))
            .collect::<serde_json::Map<_, _>>()
            .into()
    }

    /// Rows of a table whose first row holds the headers
    pub fn from_table(rows: &[Vec<String>]) -> Vec<SheetRow> {
        let Some((headers, data)) = rows.split_first() else {
            return Vec::new();
        };

        data.iter()
            .map(|row| {
                headers
                    .iter()
                    .enumerate()
                    .map(|(i, h)| (h.clone(), row.get(i).cloned().unwrap_or_default()))
                    .collect()
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SheetRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = SheetRow::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

/// Rows flattened to a rectangle under the first row's headers
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    pub headers: Vec<String>,
    pub values: Vec<Vec<String>>,
}

impl RowBatch {
    /// Missing headers become empty cells; headers the first row lacks are dropped.
    pub fn from_rows(rows: &[SheetRow]) -> Result<Self> {
        let first = rows
            .first()
            .ok_or_else(|| AppError::Graph("No rows to append".to_string()))?;
        if first.is_empty() {
            return Err(AppError::Graph("First row has no columns".to_string()));
        }

        let headers: Vec<String> = first.headers().map(str::to_string).collect();

        let values = rows
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let dropped: Vec<&str> = row
                    .headers()
                    .filter(|h| !headers.iter().any(|known| known == h))
                    .collect();
                if !dropped.is_empty() {
                    warn!(row = idx, ?dropped, "Dropping columns not in the batch headers");
                }

                headers
                    .iter()
                    .map(|h| row.get(h).unwrap_or_default().to_string())
                    .collect()
            })
            .collect();

        Ok(Self { headers, values })
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// Rows from CSV text whose first record holds the headers
pub fn rows_from_csv<R: std::io::Read>(reader: R) -> Result<Vec<SheetRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|e| AppError::Graph(format!("Failed to read CSV headers: {}", e)))?
        .clone();

    reader
        .records()
        .map(|record| {
            let record =
                record.map_err(|e| AppError::Graph(format!("Failed to read CSV record: {}", e)))?;
            Ok(headers
                .iter()
                .zip(record.iter().chain(std::iter::repeat("")))
                .collect())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_insert_keeps_position() {
        let mut row = SheetRow::new().with("A", "1").with("B", "2");
        row.insert("A", "3");

        assert_eq!(row.headers().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(row.get("A"), Some("3"));
        assert_eq!(row.get("C"), None);
    }

    #[test]
    fn test_batch_uses_first_row_headers() {
        let rows = vec![
            SheetRow::new().with("Customer", "Acme").with("Stock", "S1").with("Amount", "100"),
            SheetRow::new().with("Amount", "250").with("Customer", "Beta"),
            SheetRow::new().with("Customer", "Gamma").with("Extra", "dropped"),
        ];

        let batch = RowBatch::from_rows(&rows).unwrap();

        assert_eq!(batch.headers, strings(&["Customer", "Stock", "Amount"]));
        assert_eq!(
            batch.values,
            vec![
                strings(&["Acme", "S1", "100"]),
                strings(&["Beta", "", "250"]),
                strings(&["Gamma", "", ""]),
            ]
        );
        assert_eq!(batch.width(), 3);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_batch_rejects_empty_input() {
        assert!(RowBatch::from_rows(&[]).is_err());
        assert!(RowBatch::from_rows(&[SheetRow::new()]).is_err());
    }

    #[test]
    fn test_from_table() {
        let table = vec![
            strings(&["Stock", "Model"]),
            strings(&["U100", "6120M"]),
            strings(&["U101"]),
        ];
        let rows = SheetRow::from_table(&table);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Model"), Some("6120M"));
        assert_eq!(rows[1].get("Model"), Some(""));
        assert!(SheetRow::from_table(&[]).is_empty());
    }

    #[test]
    fn test_rows_from_csv() {
        let csv = "Customer,Stock,Amount\nAcme,U100,\"1,250.00\"\nBeta,U101\n";
        let rows = rows_from_csv(csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Amount"), Some("1,250.00"));
        assert_eq!(rows[1].headers().collect::<Vec<_>>(), vec!["Customer", "Stock", "Amount"]);
        assert_eq!(rows[1].get("Amount"), Some(""));
    }

    #[test]
    fn test_to_json() {
        let row = SheetRow::new().with("Stock", "U100").with("Model", "6120M");
        assert_eq!(row.to_json(), serde_json::json!({"Stock": "U100", "Model": "6120M"}));
    }
}
