use std::sync::{Arc, Mutex};

use crate::models::enums::ResultDisplayType;
use crate::models::structs::{ResultSection, ResultTable};

/// Ruler shown under target banners and between errors.
pub const DEFAULT_DASH_COUNT: usize = 50;

/// Appends above this size go through the chunked path so the UI thread can
/// keep repainting between chunks.
const CHUNK_THRESHOLD: usize = 10_000;
const CHUNK_SIZE: usize = 5_000;

/// A run of dashes; zero means the short default ruler.
pub fn print_dashes(count: usize) -> String {
    if count == 0 {
        "─".repeat(39)
    } else {
        "─".repeat(count)
    }
}

/// Display width per column: the longer of the header and the longest
/// rendered cell.
fn column_widths(table: &ResultTable) -> Vec<usize> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let cell_max = table
                .rows
                .iter()
                .map(|row| row.get(i).map(|v| v.chars().count()).unwrap_or(0))
                .max()
                .unwrap_or(0);
            col.name.chars().count().max(cell_max)
        })
        .collect()
}

fn pad_right(value: &str, width: usize) -> String {
    let len = value.chars().count();
    if len >= width {
        value.to_string()
    } else {
        format!("{}{}", value, " ".repeat(width - len))
    }
}

/// Render one target's tables into text sections. Empty result sets become
/// empty sections; with `ignore_empty` a target whose sets hold no rows at
/// all renders to nothing.
pub fn render_tables(
    tables: &[ResultTable],
    display_type: ResultDisplayType,
    delimiter: &str,
    ignore_empty: bool,
) -> Vec<ResultSection> {
    let ssms_style = display_type == ResultDisplayType::TextSqlFormatted;
    let delimiter = if ssms_style {
        " "
    } else if delimiter.is_empty() {
        "\t"
    } else {
        delimiter
    };

    let total_rows: usize = tables.iter().map(ResultTable::row_count).sum();
    if total_rows == 0 && ignore_empty {
        return Vec::new();
    }

    let mut sections = Vec::with_capacity(tables.len());
    for table in tables {
        let mut section = ResultSection::default();

        if !table.rows.is_empty() {
            let widths = column_widths(table);

            let mut header = String::new();
            for (col, width) in table.columns.iter().zip(&widths) {
                header.push_str(&pad_right(&col.name, *width));
                header.push_str(delimiter);
            }
            section.header = header.trim_end().to_string();

            if ssms_style && !widths.is_empty() {
                let ruler: Vec<String> = widths.iter().map(|w| print_dashes(*w)).collect();
                section.add_row(ruler.join(" "));
            }

            for row in &table.rows {
                let mut line = String::new();
                for (value, width) in row.iter().zip(&widths) {
                    if ssms_style {
                        line.push_str(&pad_right(value, *width + 1));
                    } else {
                        line.push_str(value);
                        line.push_str(delimiter);
                    }
                }
                section.add_row(line.trim_end().to_string());
            }
        }

        sections.push(section);
    }
    sections
}

/// The banner line identifying a target in the shared text pane.
pub fn target_banner(database: &str, server: &str) -> String {
    format!(
        "{}\t ({})\n{}",
        database,
        server,
        print_dashes(DEFAULT_DASH_COUNT)
    )
}

/// One target's sections as display text.
///
/// `hide_headers` is the first-header-only mode: no banner, and once any
/// target has shown a header (`first_already_shown`) later ones emit rows
/// only. The caller flips the flag when this returns non-empty text.
pub fn target_text(
    sections: &[ResultSection],
    database: &str,
    server: &str,
    hide_headers: bool,
    first_already_shown: bool,
) -> String {
    let mut out = String::new();

    if !hide_headers {
        out.push_str(&target_banner(database, server));
        out.push('\n');
    }

    for section in sections {
        if hide_headers {
            if section.header.is_empty() {
                continue;
            }
            if first_already_shown {
                out.push_str(&section.rows_text());
            } else {
                out.push_str(&section.header);
                out.push('\n');
                out.push_str(&section.rows_text());
            }
            out.push('\n');
            if sections.len() > 1 {
                out.push('\n');
            }
        } else {
            out.push_str(&section.header);
            out.push('\n');
            out.push_str(&section.rows_text());
            out.push_str("\n\n\n");
        }
    }

    if out.trim().is_empty() { String::new() } else { out }
}

/// Append to the shared results buffer. Large text goes in fixed-size chunks
/// under the lock so concurrent appenders interleave whole chunks, never
/// partial lines of a copy in progress.
pub fn append_chunked(buffer: &Arc<Mutex<String>>, text: &str) {
    if text.len() <= CHUNK_THRESHOLD {
        if let Ok(mut guard) = buffer.lock() {
            guard.push_str(text);
        }
        return;
    }

    if let Ok(mut guard) = buffer.lock() {
        let mut start = 0;
        while start < text.len() {
            let mut end = (start + CHUNK_SIZE).min(text.len());
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            guard.push_str(&text[start..end]);
            start = end;
        }
    }
}

/// Error text for one failed target, in the shape the error pane shows.
pub fn format_target_error(server: &str, database: &str, message: &str) -> String {
    format!(
        "{}.{}\n{}\n{}",
        server,
        database,
        message,
        print_dashes(DEFAULT_DASH_COUNT)
    )
}
