//! Output formatting for the `skill-forge` CLI.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Supported output formats (no `Table`/`Compact` — this workspace's
/// command outputs are records and trees, not tabular lists).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Compact single-line JSON.
    Json,
    /// Pretty-printed, indented JSON.
    JsonPretty,
    /// Human-readable text (used for `session`, which renders its own tree).
    Text,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Json => "json",
            Self::JsonPretty => "json-pretty",
            Self::Text => "text",
        };
        f.write_str(s)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "json-pretty" | "json_pretty" | "jsonpretty" => Ok(Self::JsonPretty),
            "text" => Ok(Self::Text),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Print `value` to stdout in the requested format. `Text` falls back to
/// pretty JSON, since most command outputs here are records, not prose.
pub fn print_value<T: Serialize>(format: OutputFormat, value: &T) {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(value).unwrap_or_default()),
        OutputFormat::JsonPretty | OutputFormat::Text => {
            println!("{}", serde_json::to_string_pretty(value).unwrap_or_default())
        }
    }
}
