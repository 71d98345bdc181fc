mod client;
pub mod mib;
mod poller;
mod types;

pub use client::{Snmp2Session, SnmpGet};
pub use poller::SnmpPoller;
pub use types::{SnmpError, SnmpResult, SnmpValue};
