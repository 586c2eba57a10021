/*!
 * Operator reports.
 *
 * `Table` is the text table printed by status and calculation commands. It
 * renders with box borders and centred cells, and serializes to JSON for
 * tooling.
 */
use std::fmt;

use serde::{Deserialize, Serialize};

/// Text shown for a reading that is not available
pub const UNDEFINED: &str = "undefined";

/// Format an optional reading with four decimals
pub fn format_reading(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.4}", v),
        None => UNDEFINED.to_string(),
    }
}

/// A titled table of strings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    title: Option<String>,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Create a table with the given column headers
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: None,
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Set the title printed above the headers
    pub fn with_title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Append a row; missing cells are shown as `-`, extra cells are dropped
    pub fn add_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row: Vec<String> = cells.into_iter().map(Into::into).collect();
        row.resize(self.columns.len(), "-".to_string());
        self.rows.push(row);
    }

    /// Title, if any
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Column headers
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in insertion order
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Cell of the first row whose first cell is `key`
    pub fn cell(&self, key: &str, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .find(|row| row.first().map(String::as_str) == Some(key))
            .and_then(|row| row.get(index))
            .map(String::as_str)
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }
        if let Some(title) = &self.title {
            let inner: usize = widths.iter().map(|w| w + 3).sum::<usize>().saturating_sub(3);
            let needed = title.chars().count();
            if needed > inner {
                if let Some(last) = widths.last_mut() {
                    *last += needed - inner;
                }
            }
        }
        widths
    }
}

fn border(f: &mut fmt::Formatter<'_>, widths: &[usize]) -> fmt::Result {
    write!(f, "+")?;
    for width in widths {
        write!(f, "{}+", "-".repeat(width + 2))?;
    }
    writeln!(f)
}

fn line(f: &mut fmt::Formatter<'_>, widths: &[usize], cells: &[String]) -> fmt::Result {
    write!(f, "|")?;
    for (width, cell) in widths.iter().zip(cells) {
        write!(f, " {:^width$} |", cell, width = width)?;
    }
    writeln!(f)
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.widths();
        if let Some(title) = &self.title {
            let inner: usize = widths.iter().map(|w| w + 3).sum::<usize>().saturating_sub(3);
            writeln!(f, "+{}+", "-".repeat(inner + 2))?;
            writeln!(f, "| {:^inner$} |", title, inner = inner)?;
        }
        border(f, &widths)?;
        line(f, &widths, &self.columns)?;
        border(f, &widths)?;
        for row in &self.rows {
            line(f, &widths, row)?;
        }
        border(f, &widths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let mut table = Table::new(["Motor", "User", "Dial"]).with_title("Status");
        table.add_row(["x1", "1.0000", "0.5000"]);
        table.add_row(["Theta", "2.0000"]);

        let text = table.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1].trim_matches('|').trim(), "Status");
        assert_eq!(lines[3], "| Motor |  User  |  Dial  |");
        assert!(lines.iter().all(|l| l.chars().count() == lines[0].chars().count()));
        assert_eq!(table.cell("Theta", "Dial"), Some("-"));
        assert_eq!(table.cell("x1", "User"), Some("1.0000"));
    }

    #[test]
    fn test_long_title_widens_table() {
        let mut table = Table::new(["a", "b"]).with_title("A rather long title");
        table.add_row(["1", "2"]);
        let text = table.to_string();
        let widths: Vec<usize> = text.lines().map(|l| l.chars().count()).collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_format_reading() {
        assert_eq!(format_reading(Some(1.23456)), "1.2346");
        assert_eq!(format_reading(None), UNDEFINED);
    }

    #[test]
    fn test_serialize() {
        let mut table = Table::new(["Theta"]);
        table.add_row(["5"]);
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["rows"][0][0], "5");
        assert!(json["title"].is_null());
    }
}
