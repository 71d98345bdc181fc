use super::{AnalyticsError, ParsedSeries, Report, Section};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ItemStatistics {
    pub item: String,
    /// Smallest value and the timestamp it was first recorded at
    pub minimum: (i64, String),
    /// Largest value and the timestamp it was first recorded at
    pub maximum: (i64, String),
    pub mean: f64,
    pub median: f64,
    /// Most frequent values, in order of first occurrence
    pub modes: Vec<i64>,
    pub count: usize,
}

impl ItemStatistics {
    fn render(&self) -> String {
        let modes: Vec<String> = self.modes.iter().map(i64::to_string).collect();
        format!(
            "Stats for item {} are:\n Minimum: {} (value first recorded at {})\n \
             Maximum: {} (value first recorded at {})\n Average: {}\n Median: {}\n \
             Most common values: [{}]\n Number of values used for the calculations: {}\n\n",
            self.item,
            self.minimum.0,
            self.minimum.1,
            self.maximum.0,
            self.maximum.1,
            self.mean,
            self.median,
            modes.join(", "),
            self.count
        )
    }
}

pub(super) fn generate(source: &str, series: &ParsedSeries, items: &[String]) -> Report<ItemStatistics> {
    let mut section = Section::new(source, "statistics");
    section.info("Started generating statistics.");

    let mut findings = Vec::new();
    for item in items {
        match summarize(series, item) {
            Ok(stats) => {
                section.raw(&stats.render());
                findings.push(stats);
            }
            Err(e) => section.error(format!("{}. Skipping it.", e)),
        }
    }

    section.info("Finished generating statistics for the items provided.");
    Report {
        findings,
        text: section.finish(),
    }
}

fn summarize(series: &ParsedSeries, item: &str) -> Result<ItemStatistics, AnalyticsError> {
    let records = series
        .get(item)
        .ok_or_else(|| AnalyticsError::NotParsed(item.to_string()))?;

    let mut samples: Vec<(i64, &str)> = Vec::with_capacity(records.len());
    for record in records.iter().filter(|r| !r.is_error()) {
        let value = record
            .value
            .trim()
            .parse::<i64>()
            .map_err(|_| AnalyticsError::NonNumeric {
                item: item.to_string(),
                value: record.value.clone(),
            })?;
        samples.push((value, record.timestamp.as_str()));
    }
    if samples.is_empty() {
        return Err(AnalyticsError::NoValues(item.to_string()));
    }

    // Strict comparisons keep the first occurrence
    let mut minimum = samples[0];
    let mut maximum = samples[0];
    for &sample in &samples[1..] {
        if sample.0 < minimum.0 {
            minimum = sample;
        }
        if sample.0 > maximum.0 {
            maximum = sample;
        }
    }

    let values: Vec<i64> = samples.iter().map(|(v, _)| *v).collect();
    Ok(ItemStatistics {
        item: item.to_string(),
        minimum: (minimum.0, minimum.1.to_string()),
        maximum: (maximum.0, maximum.1.to_string()),
        mean: mean(&values),
        median: median(&values),
        modes: modes(&values),
        count: values.len(),
    })
}

fn mean(values: &[i64]) -> f64 {
    let sum: i128 = values.iter().map(|v| *v as i128).sum();
    sum as f64 / values.len() as f64
}

fn median(values: &[i64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid] as f64
    } else {
        (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
    }
}

fn modes(values: &[i64]) -> Vec<i64> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    let mut order = Vec::new();
    for value in values {
        let count = counts.entry(*value).or_insert(0);
        if *count == 0 {
            order.push(*value);
        }
        *count += 1;
    }
    let best = counts.values().copied().max().unwrap_or(0);
    order.into_iter().filter(|v| counts[v] == best).collect()
}

#[cfg(test)]
mod tests {
    use super::super::LogRecord;
    use super::*;

    fn series(item: &str, values: &[&str]) -> ParsedSeries {
        let records = values
            .iter()
            .enumerate()
            .map(|(i, v)| LogRecord {
                timestamp: format!("2024-01-01 00:00:{:02}", i),
                value: v.to_string(),
            })
            .collect();
        ParsedSeries::from([(item.to_string(), records)])
    }

    #[test]
    fn test_statistics_of_simple_series() {
        let report = generate("T", &series("cpu", &["10", "20", "20", "30"]), &["cpu".into()]);
        let stats = &report.findings[0];
        assert_eq!(stats.minimum, (10, "2024-01-01 00:00:00".to_string()));
        assert_eq!(stats.maximum, (30, "2024-01-01 00:00:03".to_string()));
        assert_eq!(stats.mean, 20.0);
        assert_eq!(stats.median, 20.0);
        assert_eq!(stats.modes, vec![20]);
        assert_eq!(stats.count, 4);
        assert!(report.text.contains("Most common values: [20]"));
    }

    #[test]
    fn test_min_and_max_use_first_occurrence() {
        let report = generate("T", &series("x", &["5", "1", "9", "1", "9"]), &["x".into()]);
        let stats = &report.findings[0];
        assert_eq!(stats.minimum.1, "2024-01-01 00:00:01");
        assert_eq!(stats.maximum.1, "2024-01-01 00:00:02");
        assert_eq!(stats.modes, vec![1, 9]);
        assert_eq!(stats.median, 5.0);
    }

    #[test]
    fn test_even_count_median_and_fractional_mean() {
        let report = generate("T", &series("x", &["1", "2"]), &["x".into()]);
        assert_eq!(report.findings[0].median, 1.5);
        assert_eq!(report.findings[0].mean, 1.5);
    }

    #[test]
    fn test_error_records_are_dropped() {
        let report = generate("T", &series("x", &["error", "4", "error"]), &["x".into()]);
        assert_eq!(report.findings[0].count, 1);
    }

    #[test]
    fn test_non_numeric_series_is_skipped() {
        let report = generate("T", &series("x", &["1", "2.5"]), &["x".into()]);
        assert!(report.findings.is_empty());
        assert!(report.text.contains("non-integral value '2.5'. Skipping it."));
    }

    #[test]
    fn test_all_error_series_is_skipped() {
        let report = generate("T", &series("x", &["error"]), &["x".into()]);
        assert!(report.findings.is_empty());
        assert!(report.text.contains("has no usable values"));
    }

    #[test]
    fn test_unparsed_item_does_not_block_others() {
        let report = generate(
            "T",
            &series("x", &["3"]),
            &["missing".into(), "x".into()],
        );
        assert_eq!(report.findings.len(), 1);
        assert!(report.text.contains("item 'missing' is not parsed from the log"));
    }
}
