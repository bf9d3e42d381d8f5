//! Markdown rendering of normalized tables
//!
//! Produces a pipe table with aligned columns, one page of rows at a time.

use crate::schema::NormalizedTable;

/// Options for markdown rendering
#[derive(Debug, Clone)]
pub struct MarkdownOptions {
    /// Rows per page; `None` renders every row
    pub page_size: Option<usize>,
    /// Page to render (0-based)
    pub page: usize,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            page_size: Some(10),
            page: 0,
        }
    }
}

/// Number of pages the table spans under `options`
pub fn page_count(table: &NormalizedTable, options: &MarkdownOptions) -> usize {
    match options.page_size {
        Some(size) if size > 0 => table.row_count().div_ceil(size).max(1),
        _ => 1,
    }
}

/// Format a table as markdown
///
/// An empty table renders as an empty string. A page past the end renders
/// the header only.
pub fn table_to_markdown(table: &NormalizedTable, options: &MarkdownOptions) -> String {
    if table.is_empty() {
        return String::new();
    }

    let rows: Vec<&Vec<String>> = match options.page_size {
        Some(size) if size > 0 => table
            .rows()
            .iter()
            .skip(options.page.saturating_mul(size))
            .take(size)
            .collect(),
        _ => table.rows().iter().collect(),
    };

    let header: Vec<String> = table.columns().iter().map(|c| escape_cell(c)).collect();
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|c| escape_cell(c)).collect())
        .collect();

    // Calculate column widths for alignment
    let col_widths: Vec<usize> = (0..header.len())
        .map(|col| {
            body.iter()
                .map(|row| row[col].chars().count())
                .chain(std::iter::once(header[col].chars().count()))
                .max()
                .unwrap_or(3)
                .max(3)
        })
        .collect();

    let mut output = String::new();
    push_row(&mut output, &header, &col_widths);
    output.push('|');
    for width in &col_widths {
        output.push_str(&format!(" {} |", "-".repeat(*width)));
    }
    output.push('\n');
    for row in &body {
        push_row(&mut output, row, &col_widths);
    }

    output
}

fn push_row(output: &mut String, cells: &[String], widths: &[usize]) {
    output.push('|');
    for (cell, width) in cells.iter().zip(widths) {
        // `{:width$}` pads by chars, which keeps accented names aligned
        output.push_str(&format!(" {:width$} |", cell, width = width));
    }
    output.push('\n');
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}
