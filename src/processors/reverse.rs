//! Row-reversing processor.

use super::Processor;
use crate::table::Table;

/// Reverses the row order; columns keep their first-seen order.
pub struct Reverse;

impl Processor for Reverse {
    fn process(&self, table: Table) -> Table {
        let (columns, mut rows) = table.into_parts();
        rows.reverse();
        Table::from_parts(columns, rows)
    }
}
