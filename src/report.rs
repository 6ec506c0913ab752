use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

/// Separator between fields of a report row and between opcodes of a sequence.
pub(crate) const FIELD_DELIMITER: &str = ",";
/// Wraps fields that contain the delimiter or a line break.
pub(crate) const QUOTE: char = '"';
pub(crate) const LINE_TERMINATOR: &str = "\n";

/// Output encoding for reports.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Csv,
    Json,
}

/// Tabular result of one analysis operation.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub(crate) struct Report {
    pub(crate) title: String,
    pub(crate) columns: Vec<String>,
    pub(crate) rows: Vec<Vec<String>>,
}

impl Report {
    pub(crate) fn new(title: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            title: title.into(),
            columns: columns.iter().map(|column| column.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub(crate) fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub(crate) fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Csv => Ok(self.to_csv()),
            OutputFormat::Json => {
                let mut text =
                    serde_json::to_string_pretty(self).context("failed to serialize report")?;
                text.push_str(LINE_TERMINATOR);
                Ok(text)
            }
        }
    }

    /// One delimited line per row, without a header line.
    pub(crate) fn to_csv(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let fields = row.iter().map(|field| escape_field(field)).collect::<Vec<_>>();
            out.push_str(&fields.join(FIELD_DELIMITER));
            out.push_str(LINE_TERMINATOR);
        }
        out
    }
}

/// Keep the first `limit` entries; 0 keeps everything.
pub(crate) fn limit_rows<T>(mut rows: Vec<T>, limit: usize) -> Vec<T> {
    if limit > 0 {
        rows.truncate(limit);
    }
    rows
}

/// Share of `count` in `total` as a percentage with two decimals.
pub(crate) fn percent(count: u64, total: u64) -> String {
    if total == 0 {
        return format!("{:.2}", 0.0);
    }
    format!("{:.2}", count as f64 * 100.0 / total as f64)
}

fn escape_field(field: &str) -> String {
    if !field.contains(FIELD_DELIMITER) && !field.contains(QUOTE) && !field.contains('\n') {
        return field.to_string();
    }
    let doubled = field.replace(QUOTE, &format!("{QUOTE}{QUOTE}"));
    format!("{QUOTE}{doubled}{QUOTE}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Report {
        let mut report = Report::new("histogram", &["opcode", "count"]);
        report.push_row(vec!["ALOAD_0".to_string(), "3".to_string()]);
        report.push_row(vec!["RETURN".to_string(), "1".to_string()]);
        report
    }

    #[test]
    fn csv_has_one_line_per_row() {
        assert_eq!("ALOAD_0,3\nRETURN,1\n", sample().to_csv());
    }

    #[test]
    fn csv_quotes_fields_containing_delimiters() {
        let mut report = Report::new("t", &["a"]);
        report.push_row(vec!["a,b".to_string(), "say \"hi\"".to_string()]);

        assert_eq!("\"a,b\",\"say \"\"hi\"\"\"\n", report.to_csv());
    }

    #[test]
    fn json_keeps_title_and_columns() {
        let text = sample().render(OutputFormat::Json).expect("render json");
        let value: serde_json::Value = serde_json::from_str(&text).expect("parse json");

        assert_eq!(value["title"], "histogram");
        assert_eq!(value["columns"][1], "count");
        assert_eq!(value["rows"][0][0], "ALOAD_0");
    }

    #[test]
    fn limit_zero_keeps_everything() {
        assert_eq!(vec![1, 2, 3], limit_rows(vec![1, 2, 3], 0));
        assert_eq!(vec![1, 2], limit_rows(vec![1, 2, 3], 2));
        assert_eq!(vec![1, 2, 3], limit_rows(vec![1, 2, 3], 10));
    }

    #[test]
    fn percent_has_two_decimals() {
        assert_eq!("33.33", percent(1, 3));
        assert_eq!("100.00", percent(4, 4));
        assert_eq!("0.00", percent(0, 0));
    }
}
