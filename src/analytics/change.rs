use super::{ParsedSeries, Report, Section};

/// A value that differs from the item's running baseline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub item: String,
    pub timestamp: String,
    pub from: String,
    pub to: String,
}

pub(super) fn detect(source: &str, series: &ParsedSeries, items: &[String]) -> Report<ChangeEvent> {
    let mut section = Section::new(source, "value_change");
    section.info("Started operation.");

    let mut findings = Vec::new();
    for item in items {
        section.info(format!("Now checking the values of '{}'.", item));
        let Some(records) = series.get(item) else {
            section.error(format!("Item {} is not parsed from the log. Skipping it.", item));
            continue;
        };

        let mut baseline: Option<&str> = None;
        for record in records {
            let value = record.value.trim();
            if record.is_error() {
                section.warn(format!(
                    "Cannot check if there was a value change at {} because there was an error in parsing it.",
                    record.timestamp
                ));
                continue;
            }
            match baseline {
                None => {
                    section.info(format!(
                        "The first value of item {} is {} retrieved at {}.",
                        item, value, record.timestamp
                    ));
                    baseline = Some(value);
                }
                Some(previous) if previous != value => {
                    section.info(format!(
                        "A change in value of {} from {} to {} was detected at {}.",
                        item, previous, value, record.timestamp
                    ));
                    findings.push(ChangeEvent {
                        item: item.clone(),
                        timestamp: record.timestamp.clone(),
                        from: previous.to_string(),
                        to: value.to_string(),
                    });
                    baseline = Some(value);
                }
                Some(_) => {}
            }
        }
        section.info(format!("Finished checking the change in values of {}.", item));
    }

    Report {
        findings,
        text: section.finish(),
    }
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
    fn test_changes_are_reported_against_running_baseline() {
        let report = detect("T", &series("fw", &["5", "5", "7", "7", "9"]), &["fw".into()]);
        assert_eq!(
            report.findings,
            vec![
                ChangeEvent {
                    item: "fw".into(),
                    timestamp: "2024-01-01 00:00:02".into(),
                    from: "5".into(),
                    to: "7".into(),
                },
                ChangeEvent {
                    item: "fw".into(),
                    timestamp: "2024-01-01 00:00:04".into(),
                    from: "7".into(),
                    to: "9".into(),
                },
            ]
        );
    }

    #[test]
    fn test_errors_do_not_move_the_baseline() {
        let report = detect("T", &series("fw", &["error", "a", "error", "a"]), &["fw".into()]);
        assert!(report.findings.is_empty());
        assert!(report.text.contains("The first value of item fw is a"));
        assert!(report.text.contains("WARNING : T : value_change - Cannot check"));
    }

    #[test]
    fn test_unparsed_item_is_skipped() {
        let report = detect("T", &ParsedSeries::new(), &["fw".into()]);
        assert!(report.findings.is_empty());
        assert!(report.text.contains("Item fw is not parsed from the log. Skipping it."));
    }
}
