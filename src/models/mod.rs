pub mod row;

pub use row::{RowBatch, SheetRow, rows_from_csv};
