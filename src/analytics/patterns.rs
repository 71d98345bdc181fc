use crate::config::AnalyticsSelection;
use regex::Regex;
use std::sync::OnceLock;

/// Integral-looking value right after the two-space result separator.
/// Anything with dots or slashes still matches so statistics can report it
/// as non-numeric instead of silently dropping the line.
const NUMERIC_VALUE: &str = r"result:\s\s(-?[0-9][0-9\-./\\]*)";
/// Uptime renderings all start with a digit (`12345`, `3 days, 4:05:06`)
const UPTIME_VALUE: &str = r"result:\s\s(\d[^\r\n]*)";
/// Any non-blank value
const ANY_VALUE: &str = r"result:\s\s(\S[^\r\n]*)";

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("built-in value pattern is valid"))
        .clone()
}

pub fn numeric_value() -> Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    compiled(&CELL, NUMERIC_VALUE)
}

pub fn uptime_value() -> Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    compiled(&CELL, UPTIME_VALUE)
}

pub fn any_value() -> Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    compiled(&CELL, ANY_VALUE)
}

/// `{item label → extraction pattern}` consumed once by the parser.
///
/// The value is capture group 1 when the pattern has one, the whole match
/// otherwise.
#[derive(Debug, Clone, Default)]
pub struct ItemPatterns {
    entries: Vec<(String, Regex)>,
}

impl ItemPatterns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the map for a device's analytics selection.
    ///
    /// An item selected for several analyses gets one pattern:
    /// crash item over statistics over change detection.
    pub fn for_selection(selection: &AnalyticsSelection) -> Self {
        let mut patterns = Self::new();
        for item in &selection.check_values_change {
            patterns.insert(item, any_value());
        }
        for item in &selection.statistics {
            patterns.insert(item, numeric_value());
        }
        if let Some(item) = &selection.detect_crashes {
            patterns.insert(item, uptime_value());
        }
        patterns
    }

    /// Insert or replace the pattern for an item
    pub fn insert(&mut self, item: &str, pattern: Regex) {
        match self.entries.iter_mut().find(|(label, _)| label == item) {
            Some(entry) => entry.1 = pattern,
            None => self.entries.push((item.to_string(), pattern)),
        }
    }

    pub fn get(&self, item: &str) -> Option<&Regex> {
        self.entries
            .iter()
            .find(|(label, _)| label == item)
            .map(|(_, pattern)| pattern)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Regex)> {
        self.entries.iter().map(|(label, pattern)| (label.as_str(), pattern))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Apply an extraction pattern to one log line
pub(crate) fn extract<'a>(pattern: &Regex, line: &'a str) -> Option<&'a str> {
    let captures = pattern.captures(line)?;
    let matched = captures.get(1).or_else(|| captures.get(0))?;
    Some(matched.as_str().trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_crash_over_statistics_over_change() {
        let selection = AnalyticsSelection {
            statistics: vec!["uptime".into(), "cpu".into()],
            detect_crashes: Some("uptime".into()),
            check_values_change: vec!["cpu".into(), "serial".into()],
        };
        let patterns = ItemPatterns::for_selection(&selection);
        assert_eq!(patterns.len(), 3);
        assert_eq!(patterns.get("uptime").unwrap().as_str(), UPTIME_VALUE);
        assert_eq!(patterns.get("cpu").unwrap().as_str(), NUMERIC_VALUE);
        assert_eq!(patterns.get("serial").unwrap().as_str(), ANY_VALUE);
    }

    #[test]
    fn test_numeric_pattern_rejects_error_lines() {
        let pattern = numeric_value();
        assert_eq!(
            extract(&pattern, "2024-01-01 00:00:00,000 | ITEM: cpu query result:  42"),
            Some("42")
        );
        assert_eq!(
            extract(&pattern, "2024-01-01 00:00:00,000 | ITEM: cpu query result: ERROR: Timeout"),
            None
        );
    }

    #[test]
    fn test_uptime_pattern_keeps_whole_rendering() {
        let pattern = uptime_value();
        assert_eq!(
            extract(&pattern, "ts | ITEM: up query result:  3 days, 4:05:06.07"),
            Some("3 days, 4:05:06.07")
        );
    }

    #[test]
    fn test_pattern_without_group_uses_whole_match() {
        let pattern = Regex::new(r"\d+ percent").unwrap();
        assert_eq!(
            extract(&pattern, "ts | ITEM: x query result:  100 percent"),
            Some("100 percent")
        );
    }
}
