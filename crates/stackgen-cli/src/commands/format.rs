//! Table output

/// Render rows as a column-aligned table with headers.
///
/// Cells are left-aligned and separated by two spaces; trailing padding is
/// trimmed from each line.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let num_cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < num_cols {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let line = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:<width$}", cell, width = w)
            })
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut out = line(headers.to_vec());
    out.push('\n');
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

/// Print rows as a column-aligned table with headers
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_align_to_widest_cell() {
        let rows = vec![
            vec!["api".to_string(), "apps".to_string()],
            vec!["billing".to_string(), "functions".to_string()],
        ];
        let table = render_table(&["NAME", "TYPE"], &rows);
        assert_eq!(
            table,
            "NAME     TYPE\napi      apps\nbilling  functions\n"
        );
    }

    #[test]
    fn test_headers_only_when_empty() {
        assert_eq!(render_table(&["NAME", "TYPE"], &[]), "NAME  TYPE\n");
    }
}
