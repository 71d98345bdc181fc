use super::{ParsedSeries, Report, Section};
use chrono::NaiveDateTime;

/// Slack absorbing the time spent between reading the uptime and stamping the line
const PROCESSING_SLACK_SECS: i64 = 1;

const RECORD_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// An uptime discontinuity between two successful readings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashEvent {
    /// Iteration (1-based record index) whose uptime was too low
    pub iteration: usize,
    pub timestamp: String,
    pub expected_uptime: i64,
    pub actual_uptime: i64,
    /// The crash happened after this iteration
    pub last_successful_iteration: usize,
}

/// Last record with a usable uptime
#[derive(Debug, Clone, Copy)]
struct Reference {
    iteration: usize,
    timestamp: NaiveDateTime,
    uptime: i64,
}

/// Decode an uptime rendering into seconds.
///
/// Digit groups are read as days, hours, minutes, seconds. Four or more
/// groups use the first four (`3 days, 4:05:06.07`); fewer are right-aligned,
/// so a bare `100` is 100 seconds and `4:05:06` is hours:minutes:seconds.
pub fn parse_uptime(value: &str) -> Option<i64> {
    let groups: Vec<i64> = value
        .split(|c: char| !c.is_ascii_digit())
        .filter(|g| !g.is_empty())
        .map(|g| g.parse::<i64>())
        .collect::<Result<_, _>>()
        .ok()?;
    if groups.is_empty() {
        return None;
    }

    let fields: [i64; 4] = if groups.len() >= 4 {
        [groups[0], groups[1], groups[2], groups[3]]
    } else {
        let mut fields = [0; 4];
        fields[4 - groups.len()..].copy_from_slice(&groups);
        fields
    };
    // Absurd day counts would overflow; treat them as unreadable
    fields
        .iter()
        .zip([86_400, 3_600, 60, 1])
        .try_fold(0i64, |total, (field, unit)| {
            field.checked_mul(unit).and_then(|secs| total.checked_add(secs))
        })
}

pub(super) fn detect(source: &str, series: &ParsedSeries, uptime_item: &str) -> Report<CrashEvent> {
    let mut section = Section::new(source, "crash_detector");
    section.info("Started operation.");

    let records = match series.get(uptime_item) {
        Some(records) if !records.is_empty() => records,
        _ => {
            section.error(format!(
                "There are no parsed values for '{}'. Cannot continue.",
                uptime_item
            ));
            return Report {
                findings: Vec::new(),
                text: section.finish(),
            };
        }
    };

    let mut findings = Vec::new();
    let mut reference: Option<Reference> = None;
    for (index, record) in records.iter().enumerate() {
        let iteration = index + 1;
        if record.is_error() {
            section.warn(format!("Error at value retrieval in iteration {}", iteration));
            continue;
        }
        let timestamp = match NaiveDateTime::parse_from_str(&record.timestamp, RECORD_TIMESTAMP_FORMAT) {
            Ok(timestamp) => timestamp,
            Err(e) => {
                section.warn(format!(
                    "Unreadable timestamp '{}' in iteration {}: {}",
                    record.timestamp, iteration, e
                ));
                continue;
            }
        };
        let Some(uptime) = parse_uptime(&record.value) else {
            section.warn(format!(
                "Unreadable uptime '{}' in iteration {}",
                record.value, iteration
            ));
            continue;
        };

        let current = Reference {
            iteration,
            timestamp,
            uptime,
        };
        let Some(previous) = reference.replace(current) else {
            section.error(format!(
                "Couldn't compare uptime values in iteration {} because no previous \
                 successful iteration was recorded.",
                iteration
            ));
            continue;
        };

        let true_interval = (timestamp - previous.timestamp).num_seconds();
        let expected_uptime = previous
            .uptime
            .saturating_add(true_interval)
            .saturating_sub(PROCESSING_SLACK_SECS);
        if uptime < expected_uptime {
            section.info(format!(
                "CRASH detected in iteration {}: Expected uptime is {} seconds and the retrieved \
                 uptime is {} seconds. Last successful iteration is {}, it is possible that the \
                 crash occurred immediately after that iteration.",
                iteration, expected_uptime, uptime, previous.iteration
            ));
            findings.push(CrashEvent {
                iteration,
                timestamp: record.timestamp.clone(),
                expected_uptime,
                actual_uptime: uptime,
                last_successful_iteration: previous.iteration,
            });
        }
    }

    section.info(format!("{} iterations were checked for crashes.", records.len()));
    section.info("Operation finished.");
    Report {
        findings,
        text: section.finish(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::LogRecord;
    use super::*;

    fn series(records: &[(&str, &str)]) -> ParsedSeries {
        let records = records
            .iter()
            .map(|(ts, v)| LogRecord {
                timestamp: ts.to_string(),
                value: v.to_string(),
            })
            .collect();
        ParsedSeries::from([("uptime".to_string(), records)])
    }

    #[test]
    fn test_parse_uptime_four_fields() {
        assert_eq!(parse_uptime("1 day, 2:03:04"), Some(86_400 + 7_200 + 180 + 4));
        assert_eq!(parse_uptime("0 days, 00:01:40.25"), Some(100));
    }

    #[test]
    fn test_parse_uptime_fewer_fields_right_aligned() {
        assert_eq!(parse_uptime("100"), Some(100));
        assert_eq!(parse_uptime("2:05"), Some(125));
        assert_eq!(parse_uptime("1:00:00"), Some(3_600));
    }

    #[test]
    fn test_parse_uptime_without_digits() {
        assert_eq!(parse_uptime("n/a"), None);
        assert_eq!(parse_uptime(""), None);
    }

    #[test]
    fn test_parse_uptime_overflow_is_unreadable() {
        assert_eq!(parse_uptime("123456789012345678 days, 1:02:03"), None);
        assert_eq!(parse_uptime("99999999999999999999"), None);
        assert_eq!(parse_uptime("9223372036854775807"), Some(i64::MAX));
    }

    #[test]
    fn test_huge_day_count_is_skipped_as_unreadable() {
        let report = detect(
            "T",
            &series(&[
                ("2024-01-01 00:00:00", "0 days, 1:00:00"),
                ("2024-01-01 00:00:10", "123456789012345678 days, 1:02:03"),
                ("2024-01-01 00:00:20", "0 days, 1:00:20"),
            ]),
            "uptime",
        );
        assert!(report.findings.is_empty());
        assert!(report.text.contains("Unreadable uptime '123456789012345678 days, 1:02:03' in iteration 2"));
    }

    #[test]
    fn test_expected_uptime_saturates_near_the_limit() {
        let report = detect(
            "T",
            &series(&[
                ("2024-01-01 00:00:00", "9223372036854775807"),
                ("2024-01-01 00:00:10", "9223372036854775807"),
            ]),
            "uptime",
        );
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_uptime_drop_is_a_crash_anchored_at_previous_iteration() {
        let report = detect(
            "T",
            &series(&[("2024-01-01 00:00:00", "100"), ("2024-01-01 00:00:10", "90")]),
            "uptime",
        );
        assert_eq!(
            report.findings,
            vec![CrashEvent {
                iteration: 2,
                timestamp: "2024-01-01 00:00:10".to_string(),
                expected_uptime: 109,
                actual_uptime: 90,
                last_successful_iteration: 1,
            }]
        );
        assert!(report.text.contains("Last successful iteration is 1"));
    }

    #[test]
    fn test_growing_uptime_is_not_a_crash() {
        let report = detect(
            "T",
            &series(&[("2024-01-01 00:00:00", "100"), ("2024-01-01 00:00:10", "115")]),
            "uptime",
        );
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_one_second_slack_is_tolerated() {
        let report = detect(
            "T",
            &series(&[("2024-01-01 00:00:00", "100"), ("2024-01-01 00:00:10", "109")]),
            "uptime",
        );
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_errors_carry_reference_forward() {
        let report = detect(
            "T",
            &series(&[
                ("2024-01-01 00:00:00", "error"),
                ("2024-01-01 00:00:05", "100"),
                ("2024-01-01 00:00:10", "error"),
                ("2024-01-01 00:00:15", "3"),
            ]),
            "uptime",
        );
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].iteration, 4);
        assert_eq!(report.findings[0].last_successful_iteration, 2);
        assert_eq!(report.findings[0].expected_uptime, 109);
        assert!(report.text.contains("no previous successful iteration"));
    }

    #[test]
    fn test_reference_advances_after_a_crash() {
        let report = detect(
            "T",
            &series(&[
                ("2024-01-01 00:00:00", "500"),
                ("2024-01-01 00:00:10", "5"),
                ("2024-01-01 00:00:20", "15"),
            ]),
            "uptime",
        );
        assert_eq!(report.findings.len(), 1);
    }

    #[test]
    fn test_missing_item_is_reported_not_fatal() {
        let report = detect("T", &ParsedSeries::new(), "uptime");
        assert!(report.findings.is_empty());
        assert!(report.text.contains("There are no parsed values for 'uptime'"));
    }
}
