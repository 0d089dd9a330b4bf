//! Writes tables into worksheets with the report's look: YaHei 12pt, centered,
//! thin borders, rows of height 18 and columns as wide as their content.

use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};

pub const FONT_NAME: &str = "Microsoft YaHei";
pub const FONT_SIZE: f64 = 12.0;
pub const ROW_HEIGHT: f64 = 18.0;
/// Header of the column that gets the wider treatment.
pub const TITLE_HEADER: &str = "题目名称";
const TITLE_WIDTH_CAP: f64 = 80.0;

#[derive(Clone, PartialEq, Debug)]
pub enum Cell {
    Text(String),
    Number(u64),
}

impl Cell {
    fn display(&self) -> String {
        match self {
            Cell::Text(text) => text.clone(),
            Cell::Number(n) => n.to_string(),
        }
    }

    /// Blank strings and zeros do not widen a column.
    fn is_blank(&self) -> bool {
        match self {
            Cell::Text(text) => text.is_empty(),
            Cell::Number(n) => *n == 0,
        }
    }
}

pub struct Table<'a> {
    pub sheet_name: &'a str,
    pub headers: &'a [&'a str],
    pub rows: Vec<Vec<Cell>>,
}

/// Approximate rendered width: CJK and other non-ASCII characters count 1.8,
/// ASCII 1.1.
pub fn text_width(text: &str) -> f64 {
    text.chars()
        .map(|c| if c.is_ascii() { 1.1 } else { 1.8 })
        .sum()
}

pub fn column_widths(table: &Table) -> Vec<f64> {
    table
        .headers
        .iter()
        .enumerate()
        .map(|(col, &header)| {
            let longest = std::iter::once(text_width(header))
                .chain(
                    table
                        .rows
                        .iter()
                        .filter_map(|row| row.get(col))
                        .filter(|cell| !cell.is_blank())
                        .map(|cell| text_width(&cell.display())),
                )
                .fold(0.0, f64::max);
            if header == TITLE_HEADER {
                (longest + 8.0).min(TITLE_WIDTH_CAP)
            } else {
                longest + 4.0
            }
        })
        .collect()
}

fn body_format() -> Format {
    Format::new()
        .set_font_name(FONT_NAME)
        .set_font_size(FONT_SIZE)
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_border(FormatBorder::Thin)
}

/// Appends a worksheet holding `table`.
pub fn write_table(workbook: &mut Workbook, table: &Table) -> Result<(), XlsxError> {
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(table.sheet_name)?;
    let body = body_format();
    let header = body.clone().set_bold();

    for (col, title) in table.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &header)?;
    }
    worksheet.set_row_height(0, ROW_HEIGHT)?;
    for (i, row) in table.rows.iter().enumerate() {
        let row_num = i as u32 + 1;
        for (col, cell) in row.iter().enumerate() {
            write_cell(worksheet, row_num, col as u16, cell, &body)?;
        }
        worksheet.set_row_height(row_num, ROW_HEIGHT)?;
    }
    for (col, width) in column_widths(table).into_iter().enumerate() {
        worksheet.set_column_width(col as u16, width)?;
    }
    Ok(())
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &Cell,
    format: &Format,
) -> Result<(), XlsxError> {
    match cell {
        Cell::Text(text) if text.is_empty() => worksheet.write_blank(row, col, format)?,
        Cell::Text(text) => worksheet.write_string_with_format(row, col, text, format)?,
        Cell::Number(n) => worksheet.write_number_with_format(row, col, *n as f64, format)?,
    };
    Ok(())
}
