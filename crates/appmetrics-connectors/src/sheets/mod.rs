//! Destination spreadsheet access: open a tab, read a column, append rows.

mod google_sheets;

use appmetrics_core::{SheetRow, SheetTarget};

use crate::error::ConnectorError;

pub use google_sheets::{GoogleSheetsStore, a1_range, column_letter};

/// An opened tab. Only obtainable through [`SheetStore::open`], which checks the tab exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetHandle {
    pub sheet_id: String,
    pub tab: String,
}

/// Tabular store holding one tracking tab per app. Writes are append-only.
pub trait SheetStore {
    /// Fails when the spreadsheet or the tab does not exist or is not accessible.
    fn open(&self, target: &SheetTarget) -> Result<SheetHandle, ConnectorError>;

    /// Every cell of the 1-based `column`, top to bottom, as display strings.
    fn read_column(&self, handle: &SheetHandle, column: usize) -> Result<Vec<String>, ConnectorError>;

    /// Appends `rows` after the last non-empty row, in order.
    fn append_rows(&self, handle: &SheetHandle, rows: &[SheetRow]) -> Result<(), ConnectorError>;
}
