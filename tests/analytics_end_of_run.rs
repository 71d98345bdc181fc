use dut_monitor::analytics::{end_of_run, LogAnalytics};
use dut_monitor::analytics::ItemPatterns;
use dut_monitor::config::AnalyticsSelection;
use dut_monitor::devlog::DeviceLog;
use std::fs;

const RECORDED: &str = "\
2024-03-01 10:00:00,000 | INFO : SNMP-MONITOR : run - Worker operation started.
2024-03-01 10:00:00,010 | ITEM: sysUpTime.0 query result:  0 days, 1:00:00.00
2024-03-01 10:00:00,020 | ITEM: ifNumber.0 query result:  4
2024-03-01 10:00:00,030 | ITEM: sysDescr.0 query result:  RSP 1.0
2024-03-01 10:00:10,010 | ITEM: sysUpTime.0 query result:  0 days, 1:00:10.00
2024-03-01 10:00:10,020 | ITEM: ifNumber.0 query result: ERROR: request timed out
2024-03-01 10:00:10,030 | ITEM: sysDescr.0 query result:  RSP 1.0
2024-03-01 10:00:20,010 | ITEM: sysUpTime.0 query result:  0 days, 0:00:03.00
2024-03-01 10:00:20,020 | ITEM: ifNumber.0 query result:  6
2024-03-01 10:00:20,030 | ITEM: sysDescr.0 query result:  RSP 1.1
";

fn selection() -> AnalyticsSelection {
    AnalyticsSelection {
        statistics: vec!["ifNumber.0".into()],
        detect_crashes: Some("sysUpTime.0".into()),
        check_values_change: vec!["sysDescr.0".into()],
    }
}

#[test]
fn test_report_is_appended_after_recorded_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("device.log");
    fs::write(&path, RECORDED).unwrap();

    let report = end_of_run(&path, &selection(), "SNMP-MONITOR");
    let mut log = DeviceLog::create("10.0.0.1", &path)
        .unwrap()
        .with_source("SNMP-MONITOR");
    log.append_raw(&report);
    drop(log);

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with(RECORDED), "recorded lines must be untouched");

    let appended = &text[RECORDED.len()..];
    assert!(appended.contains("Stats for item ifNumber.0 are:"));
    assert!(appended.contains("CRASH detected in iteration 3"));
    assert!(appended.contains("3 iterations were checked for crashes."));
    assert!(appended.contains("A change in value of sysDescr.0 from RSP 1.0 to RSP 1.1"));
}

#[test]
fn test_analyses_share_one_parse() {
    let selection = selection();
    let patterns = ItemPatterns::for_selection(&selection);
    let mut analytics = LogAnalytics::new("SNMP-MONITOR");
    analytics.parse(RECORDED.as_bytes(), &patterns).unwrap();

    let uptime = analytics.records("sysUpTime.0").unwrap();
    assert_eq!(uptime.len(), 3);
    assert_eq!(uptime[0].timestamp, "2024-03-01 10:00:00");

    let ifs = analytics.records("ifNumber.0").unwrap();
    assert!(ifs[1].is_error());

    let crashes = analytics.detect_crashes("sysUpTime.0");
    assert_eq!(crashes.findings.len(), 1);
    assert_eq!(crashes.findings[0].last_successful_iteration, 2);

    let changes = analytics.value_changes(&selection.check_values_change);
    assert_eq!(changes.findings.len(), 1);
    assert_eq!(changes.findings[0].to, "RSP 1.1");

    // A second parse of the same items is a no-op
    let again = analytics.parse(RECORDED.as_bytes(), &patterns).unwrap();
    assert!(again.contains("Nothing to parse"));
    assert_eq!(analytics.records("sysUpTime.0").unwrap().len(), 3);
}

#[test]
fn test_missing_log_folds_error_into_report() {
    let dir = tempfile::tempdir().unwrap();
    let report = end_of_run(&dir.path().join("absent.log"), &selection(), "CLI-MONITOR");
    assert!(report.contains("ERROR : CLI-MONITOR : parse - Unable to read"));
}

#[test]
fn test_empty_selection_appends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("device.log");
    fs::write(&path, RECORDED).unwrap();
    assert!(end_of_run(&path, &AnalyticsSelection::default(), "SNMP-MONITOR").is_empty());
}
