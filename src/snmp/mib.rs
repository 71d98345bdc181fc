//! Well-known MIB-II scalar names.
//!
//! Profiles may list `sysUpTime.0` instead of `1.3.6.1.2.1.1.3.0`. Only the
//! scalars below are known; anything else must be numeric.

use super::types::{SnmpError, SnmpResult};

const WELL_KNOWN: &[(&str, &str)] = &[
    ("sysDescr.0", "1.3.6.1.2.1.1.1.0"),
    ("sysObjectID.0", "1.3.6.1.2.1.1.2.0"),
    ("sysUpTime.0", "1.3.6.1.2.1.1.3.0"),
    ("sysContact.0", "1.3.6.1.2.1.1.4.0"),
    ("sysName.0", "1.3.6.1.2.1.1.5.0"),
    ("sysLocation.0", "1.3.6.1.2.1.1.6.0"),
    ("sysServices.0", "1.3.6.1.2.1.1.7.0"),
    ("ifNumber.0", "1.3.6.1.2.1.2.1.0"),
];

/// Resolve an item to a dotted numeric OID without the leading dot
pub fn resolve(item: &str) -> SnmpResult<String> {
    let trimmed = item.trim();
    let numeric = trimmed.strip_prefix('.').unwrap_or(trimmed);
    if !numeric.is_empty()
        && numeric.split('.').all(|arc| !arc.is_empty() && arc.bytes().all(|b| b.is_ascii_digit()))
    {
        return Ok(numeric.to_string());
    }

    // Net-SNMP style module prefix: SNMPv2-MIB::sysUpTime.0
    let name = trimmed.rsplit("::").next().unwrap_or(trimmed);
    WELL_KNOWN
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, oid)| oid.to_string())
        .ok_or_else(|| SnmpError::InvalidOid(item.to_string()))
}
