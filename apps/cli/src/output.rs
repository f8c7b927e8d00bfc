//! Plain-text table output for the terminal.

/// Print rows as a simple aligned table: header, separator, data.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() && cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    println!("{}", format_row(headers.iter().map(|s| s.to_string()), &widths));
    println!(
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  ")
    );
    for row in rows {
        println!("{}", format_row(row.iter().cloned(), &widths));
    }
}

fn format_row(cells: impl Iterator<Item = String>, widths: &[usize]) -> String {
    cells
        .enumerate()
        .map(|(i, cell)| {
            let width = widths.get(i).copied().unwrap_or(0);
            format!("{cell:<width$}")
        })
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_row_pads_to_column_width() {
        let widths = vec![10, 5];
        let row = format_row(
            ["2024-03-01".to_string(), "1.5".to_string()].into_iter(),
            &widths,
        );
        assert_eq!(row, "2024-03-01  1.5");

        let short = format_row(["a".to_string(), "b".to_string()].into_iter(), &widths);
        assert_eq!(short, "a           b");
    }
}
