//! Status output formatting.

use std::collections::BTreeMap;
use std::fmt::Write;

use colored::Colorize;
use serde_json::Value;
use tabled::{Table, Tabled};

use crate::resource::SpecHasher;

/// Formatter for the `status` command.
#[derive(Debug, Default)]
pub struct StatusFormatter;

/// One persisted part as a table row.
#[derive(Tabled)]
struct PartRow {
    #[tabled(rename = "Part")]
    part: String,
    #[tabled(rename = "Converged")]
    converged: String,
    #[tabled(rename = "Changed")]
    changed: String,
    #[tabled(rename = "Hash")]
    hash: String,
}

impl StatusFormatter {
    /// Creates a new formatter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Renders the persisted parts of a cluster.
    #[must_use]
    pub fn format_parts(&self, cluster: &str, parts: &BTreeMap<String, Value>) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Cluster: {}", cluster.bold());

        if parts.is_empty() {
            let _ = writeln!(output, "No persisted state.");
            return output;
        }

        let rows: Vec<PartRow> = parts
            .iter()
            .map(|(name, blob)| PartRow {
                part: name.clone(),
                converged: Self::flag(blob, "converged"),
                changed: Self::flag(blob, "changed"),
                hash: blob
                    .get("hash")
                    .and_then(Value::as_str)
                    .map(SpecHasher::short)
                    .unwrap_or_default(),
            })
            .collect();

        let _ = writeln!(output, "{}", Table::new(rows));
        output
    }

    fn flag(blob: &Value, key: &str) -> String {
        match blob.get(key).and_then(Value::as_bool) {
            Some(true) => "yes".green().to_string(),
            Some(false) => "no".yellow().to_string(),
            None => String::from("-"),
        }
    }
}
