use super::mib;
use super::types::{SnmpError, SnmpResult, SnmpValue};
use crate::config::SnmpSettings;
use crate::secret::SecretString;
use snmp2::{Oid, SyncSession};
use std::str::FromStr;
use std::time::Duration;

const SNMP_TIMEOUT_SECS: u64 = 5;

/// A single synchronous SNMP GET
pub trait SnmpGet {
    fn get(&mut self, item: &str) -> SnmpResult<SnmpValue>;
}

impl<T: SnmpGet + ?Sized> SnmpGet for Box<T> {
    fn get(&mut self, item: &str) -> SnmpResult<SnmpValue> {
        (**self).get(item)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SnmpVersion {
    V1,
    V2c,
}

/// Persistent v1/v2c session for one device.
///
/// The underlying socket is created on first use and re-created on the next
/// GET if creation failed, so a host that resolves late still gets polled.
pub struct Snmp2Session {
    addr: String,
    community: SecretString,
    version: SnmpVersion,
    timeout: Duration,
    session: Option<SyncSession>,
}

impl Snmp2Session {
    pub fn new(host: &str, settings: &SnmpSettings) -> SnmpResult<Self> {
        Ok(Self {
            addr: format!("{}:{}", host.trim(), settings.port),
            community: settings.community.clone(),
            version: parse_snmp_version(&settings.version)?,
            timeout: Duration::from_secs(SNMP_TIMEOUT_SECS),
            session: None,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn session(&mut self) -> SnmpResult<&mut SyncSession> {
        if self.session.is_none() {
            let session = create_session(
                &self.addr,
                self.community.expose().as_bytes(),
                Some(self.timeout),
                self.version,
            )?;
            tracing::info!(
                "Created SNMP session for {} (version: {:?})",
                self.addr,
                self.version
            );
            self.session = Some(session);
        }
        self.session
            .as_mut()
            .ok_or_else(|| SnmpError::SessionUnavailable(self.addr.clone()))
    }
}

impl std::fmt::Debug for Snmp2Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snmp2Session")
            .field("addr", &self.addr)
            .field("version", &self.version)
            .field("community", &"[REDACTED]")
            .field("connected", &self.session.is_some())
            .finish()
    }
}

impl SnmpGet for Snmp2Session {
    fn get(&mut self, item: &str) -> SnmpResult<SnmpValue> {
        let oid = mib::resolve(item)?;
        let session = self.session()?;
        perform_get(session, &oid)
    }
}

fn create_session(
    addr: &str,
    community: &[u8],
    timeout: Option<Duration>,
    version: SnmpVersion,
) -> SnmpResult<SyncSession> {
    let req_id = 1;

    let result = match version {
        SnmpVersion::V1 => SyncSession::new_v1(addr, community, timeout, req_id),
        SnmpVersion::V2c => SyncSession::new_v2c(addr, community, timeout, req_id),
    };

    result.map_err(|e| {
        SnmpError::SessionUnavailable(format!("Failed to create session for {}: {}", addr, e))
    })
}

fn perform_get(session: &mut SyncSession, oid: &str) -> SnmpResult<SnmpValue> {
    let oid_parsed = Oid::from_str(oid).map_err(|_| SnmpError::InvalidOid(oid.to_string()))?;

    let mut response = session.get(&oid_parsed).map_err(map_snmp_error)?;

    if response.error_status != 0 {
        return Err(SnmpError::RequestFailed(format!(
            "SNMP error status: {}",
            response.error_status
        )));
    }

    let (_, value) = response
        .varbinds
        .next()
        .ok_or(SnmpError::RequestFailed("No varbinds in response".into()))?;

    match value {
        snmp2::Value::NoSuchObject | snmp2::Value::NoSuchInstance | snmp2::Value::EndOfMibView => {
            Err(SnmpError::NoSuchObject(oid.to_string()))
        }
        other => Ok(convert_value(other)),
    }
}

fn parse_snmp_version(version: &str) -> SnmpResult<SnmpVersion> {
    match version.trim().to_lowercase().as_str() {
        "1" | "v1" | "snmpv1" => Ok(SnmpVersion::V1),
        "2c" | "v2c" | "snmpv2c" | "2" | "v2" => Ok(SnmpVersion::V2c),
        _ => Err(SnmpError::SessionUnavailable(format!(
            "Unsupported SNMP version: '{}'",
            version
        ))),
    }
}

fn map_snmp_error(err: snmp2::Error) -> SnmpError {
    match &err {
        snmp2::Error::CommunityMismatch => SnmpError::AuthFailure,
        _ => {
            tracing::debug!("SNMP error: {:?}", err);
            SnmpError::RequestFailed(format!("{:?}", err))
        }
    }
}

fn convert_value(value: snmp2::Value) -> SnmpValue {
    match value {
        snmp2::Value::Integer(i) => SnmpValue::Integer(i),
        snmp2::Value::OctetString(bytes) => String::from_utf8(bytes.to_vec())
            .map(SnmpValue::String)
            .unwrap_or_else(|_| SnmpValue::OctetString(bytes.to_vec())),
        snmp2::Value::ObjectIdentifier(oid) => SnmpValue::Oid(oid.to_string()),
        snmp2::Value::Counter32(c) => SnmpValue::Counter32(c),
        snmp2::Value::Counter64(c) => SnmpValue::Counter64(c),
        snmp2::Value::Unsigned32(g) => SnmpValue::Gauge32(g),
        snmp2::Value::Timeticks(t) => SnmpValue::TimeTicks(t),
        snmp2::Value::IpAddress(ip) => {
            SnmpValue::IpAddress(format!("{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3]))
        }
        snmp2::Value::Null => SnmpValue::Null,
        other => SnmpValue::Unsupported(format!("{:?}", other)),
    }
}
