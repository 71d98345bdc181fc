//! Per-device append-only log.
//!
//! One [`DeviceLog`] exists per Worker and it is the only writer of its file.
//! Every line is `"<timestamp> | <message>"` where the timestamp's first 19
//! characters are `YYYY-MM-DD HH:MM:SS`; the analytics parser depends on that.

use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";
/// Width of the `YYYY-MM-DD HH:MM:SS` prefix
pub const TIMESTAMP_WIDTH: usize = 19;

const BANNER_WIDTH: usize = 50;

/// Build the log file path for a device.
///
/// Spaces, slashes and colons in the target are replaced so that a
/// transport command like `telnet localhost 30000` becomes a valid file name.
pub fn log_file_path(
    log_dir: &Path,
    utility: &str,
    device_target: &str,
    started: DateTime<Local>,
) -> PathBuf {
    let sanitized: String = device_target
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect();
    log_dir.join(format!(
        "logfile_{}_{}_{}.log",
        utility,
        sanitized,
        started.format("%d_%b_%Y_%H_%M_%S")
    ))
}

pub struct DeviceLog {
    device_id: String,
    /// Component name used in event lines (`CLI-MONITOR`)
    source: String,
    path: PathBuf,
    file: File,
}

impl DeviceLog {
    /// Open (or create) the log file in append mode
    pub fn create(device_id: impl Into<String>, path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            device_id: device_id.into(),
            source: String::from("DUT-MONITOR"),
            path,
            file,
        })
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Append one timestamped line
    pub fn line(&mut self, message: &str) {
        let stamped = format!("{} | {}\n", Local::now().format(TIMESTAMP_FORMAT), message);
        tracing::debug!("[{}] {}", self.device_id, message);
        self.write(stamped.as_bytes());
    }

    /// `LEVEL : SOURCE : operation - message` line. Warnings and errors are
    /// also raised to the process log.
    pub fn event(&mut self, level: &str, operation: &str, message: impl std::fmt::Display) {
        let message = format!("{} : {} : {} - {}", level, self.source, operation, message);
        match level {
            "ERROR" | "CRITICAL" => tracing::error!("[{}] {}", self.device_id, message),
            "WARNING" => tracing::warn!("[{}] {}", self.device_id, message),
            _ => {}
        }
        self.line(&message);
    }

    /// Successful item read. Multi-line values are folded onto the item line.
    pub fn item_value(&mut self, label: &str, value: &str) {
        self.line(&format!("ITEM: {} query result:  {}", label, single_line(value)));
    }

    /// Failed item read. Analytics records these as `error`.
    pub fn item_error(&mut self, label: &str, error: impl std::fmt::Display) {
        let message = error.to_string();
        self.line(&format!(
            "ITEM: {} query result: ERROR: {}",
            label,
            single_line(&message)
        ));
    }

    pub fn iteration_started(&mut self, iteration: u64) {
        let rule = "#".repeat(BANNER_WIDTH);
        self.line(&format!("{} Iteration number #{} started {}", rule, iteration, rule));
    }

    pub fn iteration_finished(&mut self) {
        let rule = "#".repeat(2 * BANNER_WIDTH + 29);
        self.line(&format!("{}\n\n", rule));
    }

    /// Append text verbatim (used for the analytics sections)
    pub fn append_raw(&mut self, text: &str) {
        self.write(text.as_bytes());
    }

    fn write(&mut self, bytes: &[u8]) {
        if let Err(e) = self.file.write_all(bytes).and_then(|_| self.file.flush()) {
            tracing::error!(
                "Failed to write device log {} for {}: {}",
                self.path.display(),
                self.device_id,
                e
            );
        }
    }
}

/// Join the lines of a value with single spaces
fn single_line(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl std::fmt::Debug for DeviceLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLog")
            .field("device_id", &self.device_id)
            .field("source", &self.source)
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_file_path_sanitizes_target() {
        let started = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        let path = log_file_path(Path::new("logs"), "cli", "telnet localhost 30000", started);
        assert_eq!(
            path,
            Path::new("logs").join("logfile_cli_telnet_localhost_30000_07_Mar_2024_09_05_01.log")
        );
    }

    #[test]
    fn test_item_lines_have_fixed_width_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.log");
        let mut log = DeviceLog::create("dev", &path).unwrap();
        log.item_value("sysUpTime.0", "42\n");
        log.item_error("ifNumber.0", "Timeout ");
        drop(log);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("| ITEM: sysUpTime.0 query result:  42"));
        assert!(lines[1].ends_with("| ITEM: ifNumber.0 query result: ERROR: Timeout"));
        let stamp = &lines[0][..TIMESTAMP_WIDTH];
        assert!(chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S").is_ok());
        assert_eq!(&lines[0][TIMESTAMP_WIDTH..TIMESTAMP_WIDTH + 1], ",");
    }

    #[test]
    fn test_multi_line_values_stay_on_the_item_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.log");
        let mut log = DeviceLog::create("dev", &path).unwrap();
        log.item_value("sysDescr.0", "Hirschmann RSP\r\nSW: 08.0.00\rHW: 1.2");
        log.item_error("sysName.0", "agent said:\nno such name");
        drop(log);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains('\r'));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            let stamp = &line[..TIMESTAMP_WIDTH];
            assert!(chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S").is_ok());
        }
        assert!(lines[0].ends_with("| ITEM: sysDescr.0 query result:  Hirschmann RSP SW: 08.0.00 HW: 1.2"));
        assert!(lines[1].ends_with("| ITEM: sysName.0 query result: ERROR: agent said: no such name"));
    }

    #[test]
    fn test_event_lines_carry_level_and_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.log");
        let mut log = DeviceLog::create("dev", &path).unwrap().with_source("CLI-MONITOR");
        log.event("ERROR", "login", "CLI connection dead.");
        drop(log);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("| ERROR : CLI-MONITOR : login - CLI connection dead.\n"));
    }

    #[test]
    fn test_create_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dev.log");
        let mut first = DeviceLog::create("dev", &path).unwrap();
        first.line("one");
        drop(first);
        let mut second = DeviceLog::create("dev", &path).unwrap();
        second.append_raw("two\n");
        drop(second);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("| one\ntwo\n"));
    }
}
