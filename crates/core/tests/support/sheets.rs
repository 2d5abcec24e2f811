//! In-memory spreadsheet serving A1 range reads from a fixed grid.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use orderlink_core::sheets::column_index;
use orderlink_core::sheets::ports::{CellGrid, CellUpdate, RowHighlight, SheetsClient, SheetsError};
use parking_lot::Mutex;

/// One sheet; row 1 of the grid is sheet row 1.
#[derive(Default, Clone)]
pub struct FakeSheets {
    grid: Arc<Mutex<CellGrid>>,
    reads: Arc<Mutex<Vec<String>>>,
    updates: Arc<Mutex<Vec<CellUpdate>>>,
    highlights: Arc<Mutex<Vec<(u32, RowHighlight)>>>,
    failing_reads: Arc<AtomicUsize>,
    fail_writes: bool,
}

fn split_cell(cell: &str) -> (Option<usize>, Option<u32>) {
    let letters: String = cell.chars().take_while(char::is_ascii_alphabetic).collect();
    let digits: String = cell.chars().skip_while(char::is_ascii_alphabetic).collect();
    let column = if letters.is_empty() { None } else { column_index(&letters).ok() };
    (column, digits.parse().ok())
}

impl FakeSheets {
    pub fn new(rows: Vec<Vec<&str>>) -> Self {
        let grid = rows.into_iter().map(|row| row.into_iter().map(str::to_string).collect()).collect();
        Self { grid: Arc::new(Mutex::new(grid)), ..Self::default() }
    }

    /// The next `count` reads fail with a retryable 503.
    pub fn fail_next_reads(self, count: usize) -> Self {
        self.failing_reads.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().clone()
    }

    pub fn updates(&self) -> Vec<CellUpdate> {
        self.updates.lock().clone()
    }

    pub fn highlights(&self) -> Vec<(u32, RowHighlight)> {
        self.highlights.lock().clone()
    }

    /// Apply recorded single-cell writes to the grid, as the real sheet would.
    pub fn apply_updates(&self) {
        let updates = self.updates.lock().clone();
        let mut grid = self.grid.lock();
        for update in updates {
            let cell = update.range.rsplit('!').next().unwrap_or_default();
            let (Some(column), Some(row)) = split_cell(cell) else { continue };
            let row_index = row as usize - 1;
            while grid.len() <= row_index {
                grid.push(Vec::new());
            }
            let target = &mut grid[row_index];
            while target.len() <= column {
                target.push(String::new());
            }
            target[column] = update.values[0][0].clone();
        }
    }

    fn slice(&self, range: &str) -> CellGrid {
        let cells = range.rsplit('!').next().unwrap_or_default();
        let (start, end) = cells.split_once(':').unwrap_or((cells, cells));
        let (start_col, start_row) = split_cell(start);
        let (end_col, end_row) = split_cell(end);

        let grid = self.grid.lock();
        let first = start_row.unwrap_or(1) as usize - 1;
        let last = end_row.map_or(grid.len(), |row| (row as usize).min(grid.len()));
        let col_from = start_col.unwrap_or(0);
        let col_to = end_col.map_or(usize::MAX, |col| col + 1);

        (first..last)
            .map(|index| {
                let row = &grid[index];
                row.iter().skip(col_from).take(col_to.saturating_sub(col_from)).cloned().collect()
            })
            .collect()
    }
}

#[async_trait]
impl SheetsClient for FakeSheets {
    async fn read_range(&self, _token: &str, _spreadsheet_id: &str, range: &str) -> Result<CellGrid, SheetsError> {
        self.reads.lock().push(range.to_string());
        if self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SheetsError::Http { status: 503, message: "backend error".into() });
        }
        Ok(self.slice(range))
    }

    async fn update_values(&self, _token: &str, _spreadsheet_id: &str, updates: &[CellUpdate]) -> Result<(), SheetsError> {
        if self.fail_writes {
            return Err(SheetsError::RateLimited);
        }
        self.updates.lock().extend_from_slice(updates);
        Ok(())
    }

    async fn highlight_rows(
        &self,
        _token: &str,
        _spreadsheet_id: &str,
        _sheet_name: &str,
        rows: &[(u32, RowHighlight)],
    ) -> Result<(), SheetsError> {
        if self.fail_writes {
            return Err(SheetsError::RateLimited);
        }
        self.highlights.lock().extend_from_slice(rows);
        Ok(())
    }
}
