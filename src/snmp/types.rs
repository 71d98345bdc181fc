#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpError {
    RequestFailed(String),
    InvalidOid(String),
    /// Session could not be created (bad address, socket error)
    SessionUnavailable(String),
    /// Agent answered but has no value at the requested OID
    NoSuchObject(String),
    AuthFailure,
}

impl std::fmt::Display for SnmpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestFailed(msg) => write!(f, "SNMP request failed: {}", msg),
            Self::InvalidOid(oid) => write!(f, "Invalid OID: {}", oid),
            Self::SessionUnavailable(msg) => write!(f, "SNMP session unavailable: {}", msg),
            Self::NoSuchObject(oid) => write!(f, "No such object available at {}", oid),
            Self::AuthFailure => write!(f, "Authentication failure"),
        }
    }
}

impl std::error::Error for SnmpError {}

pub type SnmpResult<T> = Result<T, SnmpError>;

/// SNMP value returned from a GET operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpValue {
    Integer(i64),
    String(String),
    OctetString(Vec<u8>),
    Oid(String),
    Counter32(u32),
    Counter64(u64),
    Gauge32(u32),
    /// Hundredths of a second
    TimeTicks(u32),
    IpAddress(String),
    Null,
    Unsupported(String),
}

impl SnmpValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SnmpValue::Integer(v) => Some(*v),
            SnmpValue::Counter32(v) => Some(*v as i64),
            SnmpValue::Counter64(v) => Some(*v as i64),
            SnmpValue::Gauge32(v) => Some(*v as i64),
            SnmpValue::TimeTicks(v) => Some(*v as i64),
            _ => None,
        }
    }
}

/// Rendering written to the device log after `query result:`
impl std::fmt::Display for SnmpValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::String(s) => write!(f, "{}", s),
            Self::OctetString(bytes) => {
                let hex: Vec<String> = bytes.iter().map(|b| format!("{:02X}", b)).collect();
                write!(f, "{}", hex.join(" "))
            }
            Self::Oid(oid) => write!(f, "{}", oid),
            Self::Counter32(v) | Self::Gauge32(v) => write!(f, "{}", v),
            Self::Counter64(v) => write!(f, "{}", v),
            Self::TimeTicks(ticks) => {
                let hundredths = ticks % 100;
                let total_secs = ticks / 100;
                let days = total_secs / 86_400;
                let hours = (total_secs % 86_400) / 3_600;
                let minutes = (total_secs % 3_600) / 60;
                let seconds = total_secs % 60;
                write!(
                    f,
                    "{} days, {}:{:02}:{:02}.{:02}",
                    days, hours, minutes, seconds, hundredths
                )
            }
            Self::IpAddress(ip) => write!(f, "{}", ip),
            Self::Null => write!(f, "NULL"),
            Self::Unsupported(raw) => write!(f, "{}", raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::parse_uptime;

    #[test]
    fn test_snmp_error_display() {
        assert_eq!(
            format!("{}", SnmpError::RequestFailed("test error".to_string())),
            "SNMP request failed: test error"
        );
        assert_eq!(
            format!("{}", SnmpError::InvalidOid("ifFoo".to_string())),
            "Invalid OID: ifFoo"
        );
        assert_eq!(
            format!("{}", SnmpError::NoSuchObject("1.3.6.1.2.1.1.9.0".to_string())),
            "No such object available at 1.3.6.1.2.1.1.9.0"
        );
        assert_eq!(format!("{}", SnmpError::AuthFailure), "Authentication failure");
    }

    #[test]
    fn test_snmp_error_is_error() {
        let error: &dyn std::error::Error = &SnmpError::AuthFailure;
        assert_eq!(format!("{}", error), "Authentication failure");
    }

    #[test]
    fn test_snmp_value_as_i64() {
        assert_eq!(SnmpValue::Integer(42).as_i64(), Some(42));
        assert_eq!(SnmpValue::Counter32(100).as_i64(), Some(100));
        assert_eq!(SnmpValue::TimeTicks(200).as_i64(), Some(200));
        assert_eq!(SnmpValue::String("test".to_string()).as_i64(), None);
    }

    #[test]
    fn test_timeticks_render_as_four_fields() {
        // 1 day, 2 h, 3 min, 4.56 s
        let ticks = ((86_400 + 7_200 + 180 + 4) * 100 + 56) as u32;
        let rendered = SnmpValue::TimeTicks(ticks).to_string();
        assert_eq!(rendered, "1 days, 2:03:04.56");
        assert_eq!(parse_uptime(&rendered), Some(86_400 + 7_200 + 180 + 4));
    }

    #[test]
    fn test_plain_values_render_verbatim() {
        assert_eq!(SnmpValue::Integer(-3).to_string(), "-3");
        assert_eq!(SnmpValue::String("RSP-35".into()).to_string(), "RSP-35");
        assert_eq!(SnmpValue::OctetString(vec![0x00, 0x1a]).to_string(), "00 1A");
        assert_eq!(SnmpValue::Null.to_string(), "NULL");
    }
}
