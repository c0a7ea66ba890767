use std::path::Path;

use calamine::{open_workbook, Data, Reader, Xlsx};

use crate::error::IngestError;
use crate::sheet::{CellRange, Sheet};

/// Loads one worksheet into a raw text grid with its merged ranges.
///
/// Excel datetimes are rendered as ISO date text, so everything downstream
/// of the loader works on text until field derivation.
pub fn read_sheet(path: &Path, sheet_name: &str) -> Result<Sheet, IngestError> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    if !workbook.sheet_names().iter().any(|n| n == sheet_name) {
        return Err(IngestError::SheetNotFound(sheet_name.to_string()));
    }

    workbook.load_merged_regions()?;
    let merges: Vec<CellRange> = workbook
        .merged_regions_by_sheet(sheet_name)
        .into_iter()
        .map(|(_, _, dimensions)| CellRange {
            start_row: dimensions.start.0 as usize,
            start_col: dimensions.start.1 as usize,
            end_row: dimensions.end.0 as usize,
            end_col: dimensions.end.1 as usize,
        })
        .collect();

    let range = workbook.worksheet_range(sheet_name)?;
    let (height, width) = match range.end() {
        Some((row, col)) => (row as usize + 1, col as usize + 1),
        None => (0, 0),
    };

    // The grid is addressed in absolute sheet coordinates so merged ranges
    // line up even when the used range starts below A1.
    let mut rows = vec![vec![String::new(); width]; height];
    if let Some(start) = range.start() {
        for (i, row) in range.rows().enumerate() {
            let r = start.0 as usize + i;
            for (j, value) in row.iter().enumerate() {
                let c = start.1 as usize + j;
                rows[r][c] = cell_text(value);
            }
        }
    }

    Ok(Sheet::new(rows, merges))
}

fn cell_text(value: &Data) -> String {
    match value {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(n) => {
            // Integers without the trailing ".0" Excel stores them with.
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{n}")
            }
        }
        Data::Int(n) => format!("{n}"),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|naive| naive.date().format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) => s.split('T').next().unwrap_or_default().to_string(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
    }
}
