use super::client::SnmpGet;
use crate::devlog::DeviceLog;

/// Queries every configured item once per iteration through one session
pub struct SnmpPoller {
    session: Box<dyn SnmpGet + Send>,
    items: Vec<String>,
}

impl SnmpPoller {
    pub fn new(session: Box<dyn SnmpGet + Send>, items: Vec<String>) -> Self {
        Self { session, items }
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// One GET per item. A failing item is logged and the rest still run.
    /// Returns the number of items that failed.
    pub fn poll(&mut self, log: &mut DeviceLog) -> usize {
        let mut failures = 0;
        for item in &self.items {
            match self.session.get(item) {
                Ok(value) => log.item_value(item, &value.to_string()),
                Err(e) => {
                    failures += 1;
                    log.item_error(item, e);
                }
            }
        }
        failures
    }
}

impl std::fmt::Debug for SnmpPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnmpPoller").field("items", &self.items).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snmp::{SnmpError, SnmpResult, SnmpValue};

    struct FlakyAgent;

    impl SnmpGet for FlakyAgent {
        fn get(&mut self, item: &str) -> SnmpResult<SnmpValue> {
            match item {
                "sysUpTime.0" => Ok(SnmpValue::TimeTicks(12_345)),
                "sysName.0" => Ok(SnmpValue::String("switch-1".into())),
                other => Err(SnmpError::InvalidOid(other.to_string())),
            }
        }
    }

    #[test]
    fn test_failed_item_does_not_abort_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snmp.log");
        let mut log = DeviceLog::create("dev", &path).unwrap();
        let mut poller = SnmpPoller::new(
            Box::new(FlakyAgent),
            vec!["sysUpTime.0".into(), "bogus".into(), "sysName.0".into()],
        );

        assert_eq!(poller.poll(&mut log), 1);
        drop(log);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("ITEM: sysUpTime.0 query result:  0 days, 0:02:03.45"));
        assert!(lines[1].ends_with("ITEM: bogus query result: ERROR: Invalid OID: bogus"));
        assert!(lines[2].ends_with("ITEM: sysName.0 query result:  switch-1"));
    }

    struct MultiLineDescr;

    impl SnmpGet for MultiLineDescr {
        fn get(&mut self, _item: &str) -> SnmpResult<SnmpValue> {
            Ok(SnmpValue::String("Hirschmann RSP\r\nSW: 08.0.00".into()))
        }
    }

    #[test]
    fn test_multi_line_string_is_one_log_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snmp.log");
        let mut log = DeviceLog::create("dev", &path).unwrap();
        let mut poller = SnmpPoller::new(Box::new(MultiLineDescr), vec!["sysDescr.0".into()]);

        assert_eq!(poller.poll(&mut log), 0);
        drop(log);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.trim_end().ends_with("ITEM: sysDescr.0 query result:  Hirschmann RSP SW: 08.0.00"));
    }
}
