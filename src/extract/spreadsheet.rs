//! Workbook text extraction (XLSX, XLS, ODS).

use std::io::Cursor;

use async_trait::async_trait;
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};

use super::error::ExtractError;
use super::types::{Diagnostic, DocumentFormat, Extraction, ExtractionBuilder, Section};
use super::FormatExtractor;

/// One worksheet's rendered rows.
#[derive(Debug)]
struct SheetContent {
    name: String,
    rows: Result<Vec<String>, ExtractError>,
}

/// Extracts tab-separated rows from every sheet of a workbook.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpreadsheetExtractor;

impl SpreadsheetExtractor {
    pub fn new() -> Self {
        Self
    }

    pub async fn extract(&self, content: &[u8]) -> Extraction {
        let mut builder = ExtractionBuilder::new(DocumentFormat::Spreadsheet);

        let owned = content.to_vec();
        let sheets = match tokio::task::spawn_blocking(move || read_workbook(owned)).await {
            Ok(Ok(sheets)) => sheets,
            Ok(Err(e)) => {
                tracing::warn!("XLSX Extraction Error: {}", e);
                builder.fail(format!("XLSX Extraction Error: {}", e));
                return builder.finish();
            }
            Err(e) => {
                tracing::error!("Workbook reader task failed: {}", e);
                builder.fail(format!("XLSX Extraction Error: {}", e));
                return builder.finish();
            }
        };

        for (idx, sheet) in sheets.into_iter().enumerate() {
            builder.visit_unit();
            match sheet.rows {
                Ok(rows) if !rows.is_empty() => {
                    builder.push_section(Section::sheet(&sheet.name, rows.join("\n")));
                }
                Ok(_) => tracing::debug!("Sheet '{}' has no content", sheet.name),
                Err(e) => {
                    tracing::warn!("Could not read sheet '{}': {}", sheet.name, e);
                    builder.push_diagnostic(Diagnostic::unit(
                        idx as u32 + 1,
                        format!("{}: {}", sheet.name, e),
                    ));
                }
            }
        }

        builder.finish()
    }
}

#[async_trait]
impl FormatExtractor for SpreadsheetExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Spreadsheet
    }

    /// Workbooks carry no images worth scanning; the flag is ignored.
    async fn extract(&self, content: &[u8], _scan_images: bool) -> Extraction {
        SpreadsheetExtractor::extract(self, content).await
    }
}

fn read_workbook(content: Vec<u8>) -> Result<Vec<SheetContent>, ExtractError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(content))?;
    let names = workbook.sheet_names();
    tracing::debug!("Workbook has {} sheet(s)", names.len());

    let sheets = names
        .into_iter()
        .map(|name| {
            let rows = workbook
                .worksheet_range(&name)
                .map(|range| sheet_rows(&range))
                .map_err(ExtractError::from);
            SheetContent { name, rows }
        })
        .collect();

    Ok(sheets)
}

/// Non-blank rows of a sheet, cells joined with tabs.
///
/// Columns before the used range are kept as empty cells so positions match
/// what the sheet shows.
fn sheet_rows(range: &Range<Data>) -> Vec<String> {
    let leading = range.start().map(|(_, col)| col as usize).unwrap_or(0);

    range
        .rows()
        .filter_map(|row| {
            let cells: Vec<String> = std::iter::repeat(String::new())
                .take(leading)
                .chain(row.iter().map(cell_text))
                .collect();
            let line = cells.join("\t");
            if line.trim().is_empty() {
                None
            } else {
                Some(line)
            }
        })
        .collect()
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Bool(true) => "True".to_string(),
        Data::Bool(false) => "False".to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(datetime) => datetime.to_string(),
            None => dt.as_f64().to_string(),
        },
        other => other.to_string().trim().to_string(),
    }
}
