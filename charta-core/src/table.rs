//! Table extraction — turns raw chart-to-text model output into a normalized table
//!
//! The model emits rows separated by a `<0x0A>` marker with `|`-delimited cells.
//! Two pure parsing strategies are tried in first-success order:
//! - **pipe** — split cells on `|`, first pipe line (or a `TITLE` line) is the title
//! - **whitespace** — fallback for output without pipes; splits on whitespace and
//!   decides between a header row and synthetic `Column N` headers
//!
//! Extraction never fails: if both strategies come up empty, a single placeholder
//! row is emitted so the caller always has a renderable table.

use serde::{Deserialize, Serialize};

/// Row-break marker emitted by the chart-to-text model.
pub const ROW_BREAK: &str = "<0x0A>";

/// Placeholder cell used when no data could be extracted.
pub const NO_DATA_PLACEHOLDER: &str = "No data extracted";

const DEFAULT_TITLE: &str = "Chart";

/// A normalized chart table. Invariant: every row has exactly
/// `headers.len()` cells (enforced by padding, never truncation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartTable {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ChartTable {
    /// Boxed grid rendering for display.
    pub fn render_grid(&self) -> String {
        let widths = column_widths(&self.headers, &self.rows);
        let border = |fill: char| -> String {
            let mut s = String::from("+");
            for w in &widths {
                s.extend(std::iter::repeat(fill).take(w + 2));
                s.push('+');
            }
            s
        };

        let mut out = String::new();
        out.push_str(&border('-'));
        out.push('\n');
        out.push_str(&render_row(&self.headers, &widths));
        out.push('\n');
        out.push_str(&border('='));
        for row in &self.rows {
            out.push('\n');
            out.push_str(&render_row(row, &widths));
            out.push('\n');
            out.push_str(&border('-'));
        }
        out
    }

    /// Pipe-delimited rendering for reuse as LLM input.
    pub fn render_pipe(&self) -> String {
        let widths = column_widths(&self.headers, &self.rows);
        let mut out = render_row(&self.headers, &widths);
        out.push('\n');
        out.push('|');
        for w in &widths {
            out.extend(std::iter::repeat('-').take(w + 2));
            out.push('|');
        }
        for row in &self.rows {
            out.push('\n');
            out.push_str(&render_row(row, &widths));
        }
        out
    }
}

/// Result of extracting a table from raw model output, including both rendered
/// views and the original text for diagnostics.
#[derive(Debug, Clone)]
pub struct ExtractedTable {
    pub table: ChartTable,
    /// Grid rendering for display.
    pub formatted_table: String,
    /// Pipe rendering for LLM prompts.
    pub table_str: String,
    /// Raw model output the table was parsed from.
    pub raw_text: String,
}

/// Extract a normalized table from raw chart-to-text model output.
pub fn extract_table(raw: &str) -> ExtractedTable {
    let lines: Vec<&str> = raw.split(ROW_BREAK).collect();

    let (pipe_title, pipe_body) = parse_pipe_lines(&lines);

    let (title, body) = match pipe_body {
        Some(body) => (pipe_title, Some(body)),
        None => {
            tracing::debug!("pipe table extraction incomplete, trying whitespace parsing");
            let (ws_title, ws_body) = parse_whitespace_lines(&lines);
            (ws_title.or(pipe_title), ws_body)
        }
    };

    let (headers, rows) = body.unwrap_or_else(|| {
        tracing::warn!("no parseable rows in model output, emitting placeholder table");
        (
            vec!["Column 1".to_string()],
            vec![vec![NO_DATA_PLACEHOLDER.to_string()]],
        )
    });

    let (headers, rows) = normalize(headers, rows);
    let table = ChartTable {
        title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        headers,
        rows,
    };

    let formatted_table = table.render_grid();
    let table_str = table.render_pipe();

    tracing::debug!(
        title = %table.title,
        columns = table.headers.len(),
        rows = table.rows.len(),
        "table extraction complete"
    );

    ExtractedTable {
        table,
        formatted_table,
        table_str,
        raw_text: raw.to_string(),
    }
}

/// Primary strategy: `|`-delimited cells.
///
/// The first pipe line, or any line containing `TITLE`, yields the title (last
/// cell). The first pipe line after the title is the header row; remaining pipe
/// lines are data. Returns `(title, None)` when headers or rows end up empty.
fn parse_pipe_lines(lines: &[&str]) -> (Option<String>, Option<(Vec<String>, Vec<Vec<String>>)>) {
    let mut title = None;
    let mut headers: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !line.contains('|') {
            continue;
        }
        let parts: Vec<String> = line
            .split('|')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        if i == 0 || line.to_uppercase().contains("TITLE") {
            title = parts.last().cloned();
        } else if headers.is_empty() {
            headers = parts;
        } else if !parts.is_empty() {
            rows.push(parts);
        }
    }

    if headers.is_empty() || rows.is_empty() {
        (title, None)
    } else {
        (title, Some((headers, rows)))
    }
}

/// Fallback strategy: whitespace-separated tokens.
///
/// Title comes from the text after the first `:` on the first line, if any.
/// Lines with two or more tokens are candidate rows; when every token of the
/// first candidate is non-numeric it becomes the header row, otherwise synthetic
/// `Column N` headers are generated and all candidates are data. A header row
/// with no data rows counts as failure, like the pipe strategy.
fn parse_whitespace_lines(
    lines: &[&str],
) -> (Option<String>, Option<(Vec<String>, Vec<Vec<String>>)>) {
    let title = lines
        .first()
        .and_then(|l| l.split_once(':'))
        .map(|(_, rest)| rest.trim().to_string());

    let mut candidates: Vec<Vec<String>> = Vec::new();
    for line in lines {
        if line.trim().is_empty() || line.to_uppercase().contains("TITLE") {
            continue;
        }
        let parts: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if parts.len() >= 2 {
            candidates.push(parts);
        }
    }

    let Some(first) = candidates.first() else {
        return (title, None);
    };

    let (headers, rows) = if first.iter().all(|tok| !looks_numeric(tok)) {
        (candidates[0].clone(), candidates[1..].to_vec())
    } else {
        (synthetic_headers(first.len()), candidates)
    };

    // A lone header line is not a table; let the placeholder branch take over.
    if rows.is_empty() {
        return (title, None);
    }
    (title, Some((headers, rows)))
}

/// Pad headers and rows with empty cells so every row matches the widest one.
fn normalize(
    mut headers: Vec<String>,
    mut rows: Vec<Vec<String>>,
) -> (Vec<String>, Vec<Vec<String>>) {
    let max_cols = headers
        .len()
        .max(rows.iter().map(Vec::len).max().unwrap_or(0))
        .max(1);

    if headers.is_empty() {
        headers = synthetic_headers(max_cols);
    } else {
        headers.resize(max_cols, String::new());
    }
    for row in &mut rows {
        row.resize(max_cols, String::new());
    }
    (headers, rows)
}

fn synthetic_headers(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("Column {i}")).collect()
}

/// A token is numeric when, after stripping `.` and `%`, only digits remain.
fn looks_numeric(token: &str) -> bool {
    let stripped: String = token.chars().filter(|c| *c != '.' && *c != '%').collect();
    !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit())
}

// Widths are in characters, not bytes, so multibyte cells stay aligned.
fn cell_width(cell: &str) -> usize {
    cell.chars().count()
}

fn column_widths(headers: &[String], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| cell_width(h)).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() && cell_width(cell) > widths[i] {
                widths[i] = cell_width(cell);
            }
        }
    }
    widths
}

fn render_row(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::from("|");
    for (cell, w) in cells.iter().zip(widths) {
        s.push(' ');
        s.push_str(cell);
        s.extend(std::iter::repeat(' ').take(w.saturating_sub(cell_width(cell)) + 1));
        s.push('|');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_table_extracts_headers_and_rows() {
        let raw = "Sales by Region<0x0A>Region|Amount<0x0A>East|100<0x0A>West|200";
        let extracted = extract_table(raw);
        assert_eq!(extracted.table.headers, vec!["Region", "Amount"]);
        assert_eq!(
            extracted.table.rows,
            vec![vec!["East", "100"], vec!["West", "200"]]
        );
    }

    #[test]
    fn title_line_sets_title_from_last_cell() {
        let raw = "TITLE | Quarterly Revenue<0x0A>Quarter|Revenue<0x0A>Q1|42<0x0A>Q2|57";
        let extracted = extract_table(raw);
        assert_eq!(extracted.table.title, "Quarterly Revenue");
        assert_eq!(extracted.table.headers, vec!["Quarter", "Revenue"]);
        assert_eq!(extracted.table.rows.len(), 2);
    }

    #[test]
    fn every_row_padded_to_header_length() {
        let raw = "TITLE | Mixed<0x0A>A|B|C<0x0A>1|2<0x0A>3|4|5|6";
        let extracted = extract_table(raw);
        let cols = extracted.table.headers.len();
        assert_eq!(cols, 4);
        for row in &extracted.table.rows {
            assert_eq!(row.len(), cols);
        }
        // Padding, not truncation: the wide row keeps all of its cells.
        assert_eq!(extracted.table.rows[1], vec!["3", "4", "5", "6"]);
    }

    #[test]
    fn whitespace_fallback_with_textual_first_row_uses_it_as_headers() {
        let raw = "Title: Pets per House<0x0A>Kind Count<0x0A>Cats 3<0x0A>Dogs 2";
        let extracted = extract_table(raw);
        assert_eq!(extracted.table.title, "Pets per House");
        assert_eq!(extracted.table.headers, vec!["Kind", "Count"]);
        assert_eq!(
            extracted.table.rows,
            vec![vec!["Cats", "3"], vec!["Dogs", "2"]]
        );
    }

    #[test]
    fn whitespace_fallback_with_numeric_first_row_generates_headers() {
        let raw = "10 20<0x0A>30 40";
        let extracted = extract_table(raw);
        assert_eq!(extracted.table.headers, vec!["Column 1", "Column 2"]);
        assert_eq!(
            extracted.table.rows,
            vec![vec!["10", "20"], vec!["30", "40"]]
        );
    }

    #[test]
    fn percent_and_decimal_tokens_count_as_numeric() {
        assert!(looks_numeric("42.5%"));
        assert!(looks_numeric("100"));
        assert!(!looks_numeric("East"));
        assert!(!looks_numeric("%"));
        assert!(!looks_numeric(""));
    }

    #[test]
    fn unparseable_output_yields_single_placeholder_row() {
        let extracted = extract_table("nothing useful here");
        assert_eq!(extracted.table.headers, vec!["Column 1"]);
        assert_eq!(extracted.table.rows, vec![vec![NO_DATA_PLACEHOLDER]]);
    }

    #[test]
    fn header_only_output_yields_placeholder_not_empty_table() {
        // A lone textual line would otherwise become a header row with no data.
        let extracted = extract_table("Alpha Beta");
        assert_eq!(extracted.table.headers, vec!["Column 1"]);
        assert_eq!(extracted.table.rows, vec![vec![NO_DATA_PLACEHOLDER]]);
    }

    #[test]
    fn empty_input_yields_placeholder_not_panic() {
        let extracted = extract_table("");
        assert_eq!(extracted.table.title, "Chart");
        assert_eq!(extracted.table.rows.len(), 1);
    }

    #[test]
    fn raw_text_is_preserved_for_diagnostics() {
        let raw = "A|B<0x0A>x|y<0x0A>1|2";
        let extracted = extract_table(raw);
        assert_eq!(extracted.raw_text, raw);
    }

    #[test]
    fn grid_rendering_boxes_every_row() {
        let table = ChartTable {
            title: "T".to_string(),
            headers: vec!["Region".to_string(), "Amount".to_string()],
            rows: vec![vec!["East".to_string(), "100".to_string()]],
        };
        let grid = table.render_grid();
        assert!(grid.starts_with("+--------+--------+"));
        assert!(grid.contains("| Region | Amount |"));
        assert!(grid.contains("+========+========+"));
        assert!(grid.contains("| East   | 100    |"));
    }

    #[test]
    fn multibyte_cells_align_by_character_count() {
        let table = ChartTable {
            title: "T".to_string(),
            headers: vec!["Región".to_string(), "Café".to_string()],
            rows: vec![vec!["Österreich".to_string(), "12".to_string()]],
        };
        let pipe = table.render_pipe();
        let lines: Vec<&str> = pipe.lines().collect();
        assert_eq!(lines[0], "| Región     | Café |");
        assert_eq!(lines[2], "| Österreich | 12   |");
        // Every rendered line spans the same number of characters.
        let width = lines[0].chars().count();
        assert!(lines.iter().all(|l| l.chars().count() == width));
    }

    #[test]
    fn pipe_rendering_has_separator_under_headers() {
        let table = ChartTable {
            title: "T".to_string(),
            headers: vec!["A".to_string(), "B".to_string()],
            rows: vec![vec!["1".to_string(), "2".to_string()]],
        };
        let pipe = table.render_pipe();
        let lines: Vec<&str> = pipe.lines().collect();
        assert_eq!(lines[0], "| A | B |");
        assert_eq!(lines[1], "|---|---|");
        assert_eq!(lines[2], "| 1 | 2 |");
    }
}
