//! Dotted-table value extraction.
//!
//! Device `show` commands print `Label..........Value` rows. The grammar is:
//! the label, optional blanks, a run of two or more dots, then the value up
//! to the end of the line (trimmed, must not be empty).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("label '{0}' not found in command output")]
    LabelNotFound(String),
    #[error("label '{0}' is not followed by a dotted leader")]
    MissingLeader(String),
    #[error("label '{0}' has an empty value")]
    EmptyValue(String),
}

/// Find `label` in `output` and return its dotted-table value.
///
/// The first row that parses wins. When none does, the error describes the
/// first occurrence of the label.
pub fn dotted_value<'a>(output: &'a str, label: &str) -> Result<&'a str, ExtractError> {
    if label.is_empty() {
        return Err(ExtractError::LabelNotFound(String::new()));
    }

    let mut first_error = None;
    for (position, _) in output.match_indices(label) {
        let rest = &output[position + label.len()..];
        let row = rest.split('\n').next().unwrap_or(rest);
        match value_after_leader(row, label) {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    Err(first_error.unwrap_or_else(|| ExtractError::LabelNotFound(label.to_string())))
}

fn value_after_leader<'a>(row: &'a str, label: &str) -> Result<&'a str, ExtractError> {
    let row = row.trim_start_matches([' ', '\t']);
    let dots = row.len() - row.trim_start_matches('.').len();
    if dots < 2 {
        return Err(ExtractError::MissingLeader(label.to_string()));
    }
    let value = row[dots..].trim();
    if value.is_empty() {
        return Err(ExtractError::EmptyValue(label.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOW_SYSTEM_INFO: &str = "show system info\r\n\r\n\
System Description.........................Hirschmann Railswitch\r\n\
System uptime..............................3 days, 4 hrs, 5 mins, 6 secs\r\n\
Temperature (C)............................-5\r\n\
Serial number..............................\r\n";

    #[test]
    fn test_extracts_trimmed_value() {
        assert_eq!(
            dotted_value(SHOW_SYSTEM_INFO, "System uptime"),
            Ok("3 days, 4 hrs, 5 mins, 6 secs")
        );
        assert_eq!(dotted_value(SHOW_SYSTEM_INFO, "Temperature (C)"), Ok("-5"));
    }

    #[test]
    fn test_missing_label() {
        assert_eq!(
            dotted_value(SHOW_SYSTEM_INFO, "CPU utilization"),
            Err(ExtractError::LabelNotFound("CPU utilization".into()))
        );
    }

    #[test]
    fn test_label_without_leader() {
        assert_eq!(
            dotted_value("System uptime: 12\r\n", "System uptime"),
            Err(ExtractError::MissingLeader("System uptime".into()))
        );
        assert_eq!(
            dotted_value("System uptime.12\r\n", "System uptime"),
            Err(ExtractError::MissingLeader("System uptime".into()))
        );
    }

    #[test]
    fn test_empty_value() {
        assert_eq!(
            dotted_value(SHOW_SYSTEM_INFO, "Serial number"),
            Err(ExtractError::EmptyValue("Serial number".into()))
        );
    }

    #[test]
    fn test_later_row_used_when_echo_contains_label() {
        let output = "show Power state\r\nPower state......on\r\n";
        assert_eq!(dotted_value(output, "Power state"), Ok("on"));
    }

    #[test]
    fn test_leader_after_blanks() {
        assert_eq!(dotted_value("Fan speed  ....  1200 rpm\n", "Fan speed"), Ok("1200 rpm"));
    }
}
