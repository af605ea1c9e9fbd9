//! ASCII table rendering for worker listings

use std::fmt;

use crate::registry::WorkerInfo;

/// Placeholder for an empty cell
pub const NOT_AVAILABLE: &str = "N/A";

/// Column headers of a worker listing
pub const WORKER_HEADERS: [&str; 4] = ["ID", "URL", "Stream", "Port"];

/// A bordered, left-aligned text table
///
/// ```text
/// +----+----------------+--------+-------+
/// | ID | URL            | Stream | Port  |
/// +----+----------------+--------+-------+
/// | 1  | twitch.tv/chan | 720p   | N/A   |
/// +----+----------------+--------+-------+
/// ```
#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Table with one row per worker
    pub fn workers<'a>(workers: impl IntoIterator<Item = &'a WorkerInfo>) -> Self {
        let mut table = Self::new(WORKER_HEADERS);
        for info in workers {
            table.add_row([
                info.id.to_string(),
                info.url.clone(),
                info.quality.clone().unwrap_or_else(|| NOT_AVAILABLE.into()),
                info.port
                    .map(|port| port.to_string())
                    .unwrap_or_else(|| NOT_AVAILABLE.into()),
            ]);
        }
        table
    }

    /// Append a row; missing cells render empty, extra cells are dropped
    pub fn add_row<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row: Vec<String> = row.into_iter().map(Into::into).collect();
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }
        widths
    }
}

fn write_border(f: &mut fmt::Formatter<'_>, widths: &[usize]) -> fmt::Result {
    f.write_str("+")?;
    for width in widths {
        write!(f, "{}+", "-".repeat(width + 2))?;
    }
    f.write_str("\n")
}

fn write_row(f: &mut fmt::Formatter<'_>, widths: &[usize], cells: &[String]) -> fmt::Result {
    f.write_str("|")?;
    for (width, cell) in widths.iter().zip(cells) {
        let pad = width - cell.chars().count();
        write!(f, " {}{} |", cell, " ".repeat(pad))?;
    }
    f.write_str("\n")
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.widths();

        write_border(f, &widths)?;
        write_row(f, &widths, &self.headers)?;
        write_border(f, &widths)?;
        for row in &self.rows {
            write_row(f, &widths, row)?;
        }
        write_border(f, &widths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::WorkerStatus;

    fn info(id: u32, url: &str, quality: Option<&str>, port: Option<u16>) -> WorkerInfo {
        WorkerInfo {
            id,
            url: url.into(),
            quality: quality.map(Into::into),
            port,
            status: WorkerStatus::Running,
            failure: None,
            cmdline: None,
        }
    }

    #[test]
    fn test_worker_table() {
        let workers = vec![
            info(1, "twitch.tv/chan", Some("720p"), None),
            info(12, "rtmp://host/app", Some("live"), Some(50001)),
        ];

        let expected = "\
+----+-----------------+--------+-------+
| ID | URL             | Stream | Port  |
+----+-----------------+--------+-------+
| 1  | twitch.tv/chan  | 720p   | N/A   |
| 12 | rtmp://host/app | live   | 50001 |
+----+-----------------+--------+-------+
";
        assert_eq!(Table::workers(&workers).to_string(), expected);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let mut table = Table::new(["a", "b"]);
        table.add_row(["x"]);

        assert_eq!(table.len(), 1);
        assert_eq!(table.to_string().lines().nth(3), Some("| x |   |"));
    }

    #[test]
    fn test_missing_quality() {
        let table = Table::workers(&[info(3, "u", None, None)]);
        assert!(table.to_string().contains("| 3  | u   | N/A    | N/A  |"));
    }
}
