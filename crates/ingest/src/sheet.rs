/// An inclusive rectangle of merged cells, zero-based sheet coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

/// One worksheet as a grid of raw cell text plus its merged ranges.
///
/// Rows may be ragged; `cell` treats anything out of bounds as blank.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    rows: Vec<Vec<String>>,
    merges: Vec<CellRange>,
}

impl Sheet {
    pub fn new(rows: Vec<Vec<String>>, merges: Vec<CellRange>) -> Self {
        Sheet { rows, merges }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Propagates each merged range's top-left value into every covered
    /// cell, so row-wise processing never sees blanks caused by merging.
    pub fn fill_merged_regions(&mut self) {
        for range in self.merges.clone() {
            let value = self.cell(range.start_row, range.start_col).to_string();
            for row in range.start_row..=range.end_row {
                for col in range.start_col..=range.end_col {
                    self.set_cell(row, col, value.clone());
                }
            }
        }
    }

    fn set_cell(&mut self, row: usize, col: usize, value: String) {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let r = &mut self.rows[row];
        if r.len() <= col {
            r.resize_with(col + 1, String::new);
        }
        r[col] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(cells: &[&[&str]]) -> Vec<Vec<String>> {
        cells
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn fill_propagates_top_left_value() {
        let mut sheet = Sheet::new(
            grid(&[&["Particulars", "", "Debit"], &["x", "y", "z"]]),
            vec![CellRange { start_row: 0, start_col: 0, end_row: 0, end_col: 1 }],
        );
        sheet.fill_merged_regions();
        assert_eq!(sheet.cell(0, 0), "Particulars");
        assert_eq!(sheet.cell(0, 1), "Particulars");
        assert_eq!(sheet.cell(0, 2), "Debit");
        assert_eq!(sheet.cell(1, 1), "y");
    }

    #[test]
    fn fill_extends_ragged_rows() {
        let mut sheet = Sheet::new(
            grid(&[&["v"]]),
            vec![CellRange { start_row: 0, start_col: 0, end_row: 2, end_col: 1 }],
        );
        sheet.fill_merged_regions();
        assert_eq!(sheet.cell(2, 1), "v");
        assert_eq!(sheet.cell(3, 0), "");
    }

    #[test]
    fn out_of_bounds_cell_is_blank() {
        let sheet = Sheet::new(grid(&[&["a"]]), Vec::new());
        assert_eq!(sheet.cell(9, 9), "");
    }
}
