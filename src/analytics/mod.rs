//! End-of-run analytics over a device log.
//!
//! [`LogAnalytics::parse`] reconstructs per-item time series from the item
//! lines of a log; statistics, crash detection and value-change detection
//! then read those series. Every operation produces a text section that the
//! owning Worker appends to the same log. Existing lines are never touched.

mod change;
mod crash;
pub mod patterns;
mod statistics;

pub use change::ChangeEvent;
pub use crash::{parse_uptime, CrashEvent};
pub use patterns::ItemPatterns;
pub use statistics::ItemStatistics;

use crate::config::AnalyticsSelection;
use crate::devlog::TIMESTAMP_WIDTH;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Value recorded when an item line carries no extractable value
pub const ERROR_MARKER: &str = "error";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalyticsError {
    #[error("item '{0}' is not parsed from the log")]
    NotParsed(String),
    #[error("item '{item}' has a non-integral value '{value}'")]
    NonNumeric { item: String, value: String },
    #[error("item '{0}' has no usable values")]
    NoValues(String),
}

/// One reading of one item: the 19-character timestamp prefix of its log
/// line and the extracted value (or [`ERROR_MARKER`])
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: String,
    pub value: String,
}

impl LogRecord {
    pub fn is_error(&self) -> bool {
        self.value == ERROR_MARKER
    }
}

/// Item label → readings in file order
pub type ParsedSeries = HashMap<String, Vec<LogRecord>>;

/// Findings of one analysis plus the text section describing them
#[derive(Debug, Clone, PartialEq)]
pub struct Report<T> {
    pub findings: Vec<T>,
    pub text: String,
}

/// Accumulates `LEVEL : source : operation - message` lines
pub(crate) struct Section {
    source: String,
    operation: &'static str,
    text: String,
}

impl Section {
    pub(crate) fn new(source: &str, operation: &'static str) -> Self {
        Self {
            source: source.to_string(),
            operation,
            text: String::from("\n"),
        }
    }

    pub(crate) fn info(&mut self, message: impl AsRef<str>) {
        self.push("INFO", message.as_ref());
    }

    pub(crate) fn warn(&mut self, message: impl AsRef<str>) {
        self.push("WARNING", message.as_ref());
    }

    pub(crate) fn error(&mut self, message: impl AsRef<str>) {
        self.push("ERROR", message.as_ref());
    }

    /// Free-form block (statistics tables)
    pub(crate) fn raw(&mut self, block: &str) {
        self.text.push_str(block);
    }

    fn push(&mut self, level: &str, message: &str) {
        self.text.push_str(&format!(
            "{} : {} : {} - {}\n",
            level, self.source, self.operation, message
        ));
    }

    pub(crate) fn finish(self) -> String {
        self.text
    }
}

/// Analytics state for one log file.
///
/// Parsed series persist across calls so that the three analyses share a
/// single parse pass.
#[derive(Debug, Clone, Default)]
pub struct LogAnalytics {
    source: String,
    series: ParsedSeries,
}

impl LogAnalytics {
    /// `source` names the producing worker in report lines (e.g. `SNMP-MONITOR`)
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            series: ParsedSeries::new(),
        }
    }

    pub fn series(&self) -> &ParsedSeries {
        &self.series
    }

    pub fn records(&self, item: &str) -> Option<&[LogRecord]> {
        self.series.get(item).map(Vec::as_slice)
    }

    /// Parse item lines from a log. Items parsed by an earlier call are skipped.
    pub fn parse<R: BufRead>(&mut self, reader: R, patterns: &ItemPatterns) -> io::Result<String> {
        let mut section = Section::new(&self.source, "parse");
        section.info("Checking the items to parse.");

        let pending: Vec<(&str, &regex::Regex)> = patterns
            .iter()
            .filter(|(item, _)| !self.series.contains_key(*item))
            .collect();
        if pending.is_empty() {
            section.warn("Nothing to parse. The values of the supplied items have already been parsed.");
            return Ok(section.finish());
        }

        let markers: Vec<String> = pending
            .iter()
            .map(|(item, _)| format!("| ITEM: {} query result:", item))
            .collect();
        let mut parsed: ParsedSeries = pending
            .iter()
            .map(|(item, _)| (item.to_string(), Vec::new()))
            .collect();

        section.info("Started parsing the log.");
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let Some(position) = markers.iter().position(|m| line.contains(m.as_str())) else {
                continue;
            };
            let (item, pattern) = pending[position];
            let timestamp = line.get(..TIMESTAMP_WIDTH).unwrap_or(&line).to_string();
            let value = match patterns::extract(pattern, &line) {
                Some(value) => value.to_string(),
                None => {
                    section.warn(format!(
                        "Couldn't retrieve value of {} from line {}",
                        item,
                        index + 1
                    ));
                    ERROR_MARKER.to_string()
                }
            };
            if let Some(records) = parsed.get_mut(item) {
                records.push(LogRecord { timestamp, value });
            }
        }
        section.info("Finished parsing the log.");

        self.series.extend(parsed);
        Ok(section.finish())
    }

    /// Parse a log file by path
    pub fn parse_file(&mut self, path: &Path, patterns: &ItemPatterns) -> io::Result<String> {
        let file = File::open(path)?;
        self.parse(BufReader::new(file), patterns)
    }

    pub fn generate_statistics(&self, items: &[String]) -> Report<ItemStatistics> {
        statistics::generate(&self.source, &self.series, items)
    }

    pub fn detect_crashes(&self, uptime_item: &str) -> Report<CrashEvent> {
        crash::detect(&self.source, &self.series, uptime_item)
    }

    pub fn value_changes(&self, items: &[String]) -> Report<ChangeEvent> {
        change::detect(&self.source, &self.series, items)
    }
}

/// Run every analysis selected for a device against its finished log and
/// return the text to append. Errors are folded into the text.
pub fn end_of_run(path: &Path, selection: &AnalyticsSelection, source: &str) -> String {
    if selection.is_empty() {
        return String::new();
    }

    let patterns = ItemPatterns::for_selection(selection);
    let mut analytics = LogAnalytics::new(source);
    let mut text = match analytics.parse_file(path, &patterns) {
        Ok(text) => text,
        Err(e) => {
            let mut section = Section::new(source, "parse");
            section.error(format!("Unable to read {}: {}", path.display(), e));
            return section.finish();
        }
    };

    if !selection.statistics.is_empty() {
        text.push_str(&analytics.generate_statistics(&selection.statistics).text);
    }
    if let Some(item) = &selection.detect_crashes {
        text.push_str(&analytics.detect_crashes(item).text);
    }
    if !selection.check_values_change.is_empty() {
        text.push_str(&analytics.value_changes(&selection.check_values_change).text);
    }
    text
}
