//! Output formatting for CLI

use alpaca_conform::{LedgerEntry, RunReport};
use alpaca_conform_common::Outcome;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// Build a table from a list of items
pub fn table<T: TableDisplay>(items: &[T]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(T::headers());
    for item in items {
        table.add_row(item.row());
    }
    table
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        println!("No items found.");
        return;
    }

    match format {
        OutputFormat::Table => println!("{}", table(items)),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                let row = item.row();
                for (header, value) in T::headers().iter().zip(row.iter()) {
                    println!("{}: {}", header, value);
                }
            }
        }
    }
}

/// One classified message in a report listing
#[derive(Debug, Clone, Serialize)]
pub struct FindingRow {
    pub outcome: Outcome,
    pub test: String,
    pub message: String,
}

impl FindingRow {
    fn from_entries(outcome: Outcome, entries: &[LedgerEntry]) -> impl Iterator<Item = FindingRow> + '_ {
        entries.iter().map(move |entry| FindingRow {
            outcome,
            test: entry.test.clone(),
            message: entry.message.clone(),
        })
    }
}

impl TableDisplay for FindingRow {
    fn headers() -> Vec<&'static str> {
        vec!["Outcome", "Test", "Message"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.outcome.to_string(), self.test.clone(), self.message.clone()]
    }
}

/// Every non-OK message of a report, errors first
pub fn finding_rows(report: &RunReport) -> Vec<FindingRow> {
    FindingRow::from_entries(Outcome::Error, &report.errors)
        .chain(FindingRow::from_entries(Outcome::Issue, &report.issues))
        .chain(FindingRow::from_entries(Outcome::Info, &report.information))
        .collect()
}

/// Print the final report of a run
pub fn print_report(report: &RunReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
        }
        OutputFormat::Plain => {
            println!();
            println!("{}", report.render());
        }
        OutputFormat::Table => {
            println!();
            let rows = finding_rows(report);
            if !rows.is_empty() {
                println!("{}", table(&rows));
            }
            if report.interrupted {
                print_warning(&report.summary());
            } else if report.verdict() == 0 {
                print_success(&report.summary());
            } else {
                print_error(&report.summary());
            }
            println!(
                "   {} {}  {} {}ms",
                "Device:".bold(),
                report.url,
                "Duration:".bold(),
                report.duration_ms
            );
        }
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message.green());
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message.red());
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message.yellow());
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpaca_conform_common::DeviceType;

    fn entry(test: &str, message: &str) -> LedgerEntry {
        LedgerEntry {
            test: test.into(),
            message: message.into(),
            context: None,
        }
    }

    #[test]
    fn test_finding_rows_are_ordered_by_severity() {
        let report = RunReport {
            device_type: DeviceType::Focuser,
            device_number: 0,
            url: "http://127.0.0.1:11111/api/v1/focuser/0".into(),
            started_at: Default::default(),
            duration_ms: 5,
            interrupted: false,
            errors: vec![entry("GET Position", "broken")],
            issues: vec![entry("PUT Move", "wrong")],
            information: vec![entry("PUT SetSwitch", "omitted")],
        };

        let rows = finding_rows(&report);
        let outcomes: Vec<Outcome> = rows.iter().map(|r| r.outcome).collect();
        assert_eq!(outcomes, [Outcome::Error, Outcome::Issue, Outcome::Info]);
        assert_eq!(rows[1].row(), ["ISSUE", "PUT Move", "wrong"]);
    }
}
