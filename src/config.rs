use crate::secret::SecretString;
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_CLI_USERNAME: &str = "admin";
const DEFAULT_CLI_PASSWORD: &str = "private";
const DEFAULT_SNMP_COMMUNITY: &str = "public";
const DEFAULT_SNMP_VERSION: &str = "2c";
const DEFAULT_SNMP_PORT: u16 = 161;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("mandatory key '{0}' is missing")]
    MissingKey(&'static str),
    #[error("unknown utility '{0}' (expected 'cli' or 'snmp')")]
    UnknownUtility(String),
    #[error("items for utility '{utility}' must be {expected}")]
    ItemKind {
        utility: &'static str,
        expected: &'static str,
    },
    #[error("item list is empty")]
    NoItems,
    #[error("interval must be greater than zero")]
    InvalidInterval,
}

/// Polling utility used for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Utility {
    Cli,
    Snmp,
}

impl Utility {
    pub fn parse(value: &str) -> Result<Self, ProfileError> {
        match value.trim().to_lowercase().as_str() {
            "cli" => Ok(Self::Cli),
            "snmp" => Ok(Self::Snmp),
            _ => Err(ProfileError::UnknownUtility(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Snmp => "snmp",
        }
    }
}

impl std::fmt::Display for Utility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a profile's `items` list as written in the JSON document
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ItemSpec {
    Oid(String),
    Pair(String, String),
    Command { command: String, label: String },
}

/// A CLI item: the command that prints the value and the label it is printed under
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CliItem {
    pub command: String,
    pub label: String,
}

/// Deduplicated items of a validated profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Items {
    Oids(Vec<String>),
    Commands(Vec<CliItem>),
}

impl Items {
    pub fn len(&self) -> usize {
        match self {
            Self::Oids(oids) => oids.len(),
            Self::Commands(commands) => commands.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Labels the items are logged under (the OID itself for SNMP)
    pub fn labels(&self) -> Vec<&str> {
        match self {
            Self::Oids(oids) => oids.iter().map(String::as_str).collect(),
            Self::Commands(commands) => commands.iter().map(|c| c.label.as_str()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CliCredentials {
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: SecretString,
}

impl Default for CliCredentials {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: default_password(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnmpSettings {
    #[serde(default = "default_community")]
    pub community: SecretString,
    #[serde(default = "default_snmp_version")]
    pub version: String,
    #[serde(default = "default_snmp_port")]
    pub port: u16,
}

impl Default for SnmpSettings {
    fn default() -> Self {
        Self {
            community: default_community(),
            version: default_snmp_version(),
            port: default_snmp_port(),
        }
    }
}

fn default_username() -> String {
    DEFAULT_CLI_USERNAME.to_string()
}

fn default_password() -> SecretString {
    SecretString::new(DEFAULT_CLI_PASSWORD)
}

fn default_community() -> SecretString {
    SecretString::new(DEFAULT_SNMP_COMMUNITY)
}

fn default_snmp_version() -> String {
    DEFAULT_SNMP_VERSION.to_string()
}

fn default_snmp_port() -> u16 {
    DEFAULT_SNMP_PORT
}

/// Profile as read from the configuration document, before validation.
///
/// `timeout` distinguishes "key absent" (`None`) from "explicitly null"
/// (`Some(None)`, meaning unbounded).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawProfile {
    pub device_target: Option<String>,
    pub utility: Option<String>,
    pub items: Option<Vec<ItemSpec>>,
    pub interval: Option<u64>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub timeout: Option<Option<u64>>,
    pub statistics: Option<Vec<String>>,
    pub detect_crashes: Option<String>,
    pub check_values_change: Option<Vec<String>>,
    pub credentials: Option<CliCredentials>,
    pub snmp: Option<SnmpSettings>,
}

fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<u64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u64>::deserialize(deserializer).map(Some)
}

/// End-of-run analytics requested for a device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyticsSelection {
    pub statistics: Vec<String>,
    pub detect_crashes: Option<String>,
    pub check_values_change: Vec<String>,
}

impl AnalyticsSelection {
    pub fn is_empty(&self) -> bool {
        self.statistics.is_empty()
            && self.detect_crashes.is_none()
            && self.check_values_change.is_empty()
    }
}

/// Validated, immutable device profile handed to a Worker
#[derive(Debug, Clone)]
pub struct Profile {
    pub device_target: String,
    pub utility: Utility,
    pub items: Items,
    pub interval: Duration,
    pub timeout: Option<Duration>,
    pub analytics: AnalyticsSelection,
    pub credentials: CliCredentials,
    pub snmp: SnmpSettings,
}

impl Profile {
    /// Device id used by the orchestrator registry
    pub fn device_id(&self) -> &str {
        &self.device_target
    }
}

impl RawProfile {
    pub fn validate(self) -> Result<Profile, ProfileError> {
        let device_target = self
            .device_target
            .filter(|t| !t.trim().is_empty())
            .ok_or(ProfileError::MissingKey("device-target"))?;
        let utility = Utility::parse(&self.utility.ok_or(ProfileError::MissingKey("utility"))?)?;
        let specs = self.items.ok_or(ProfileError::MissingKey("items"))?;
        let interval = self.interval.ok_or(ProfileError::MissingKey("interval"))?;
        let timeout = self.timeout.ok_or(ProfileError::MissingKey("timeout"))?;

        if interval == 0 {
            return Err(ProfileError::InvalidInterval);
        }

        let items = collect_items(utility, specs)?;
        if items.is_empty() {
            return Err(ProfileError::NoItems);
        }

        let analytics = AnalyticsSelection {
            statistics: self.statistics.unwrap_or_default(),
            detect_crashes: self.detect_crashes,
            check_values_change: self.check_values_change.unwrap_or_default(),
        };
        warn_unpolled(&device_target, &items, &analytics);

        Ok(Profile {
            device_target,
            utility,
            items,
            interval: Duration::from_secs(interval),
            timeout: timeout.map(Duration::from_secs),
            analytics,
            credentials: self.credentials.unwrap_or_default(),
            snmp: self.snmp.unwrap_or_default(),
        })
    }
}

fn collect_items(utility: Utility, specs: Vec<ItemSpec>) -> Result<Items, ProfileError> {
    match utility {
        Utility::Snmp => {
            let mut oids = Vec::with_capacity(specs.len());
            for spec in specs {
                match spec {
                    ItemSpec::Oid(oid) => oids.push(oid),
                    _ => {
                        return Err(ProfileError::ItemKind {
                            utility: "snmp",
                            expected: "OID or MIB name strings",
                        })
                    }
                }
            }
            Ok(Items::Oids(dedup(oids)))
        }
        Utility::Cli => {
            let mut commands = Vec::with_capacity(specs.len());
            for spec in specs {
                match spec {
                    ItemSpec::Pair(command, label) | ItemSpec::Command { command, label } => {
                        commands.push(CliItem { command, label })
                    }
                    ItemSpec::Oid(_) => {
                        return Err(ProfileError::ItemKind {
                            utility: "cli",
                            expected: "[command, label] pairs",
                        })
                    }
                }
            }
            Ok(Items::Commands(dedup(commands)))
        }
    }
}

/// Set semantics, first occurrence wins the position
fn dedup<T: Clone + Eq + std::hash::Hash>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}

fn warn_unpolled(device: &str, items: &Items, analytics: &AnalyticsSelection) {
    let labels = items.labels();
    let selected = analytics
        .statistics
        .iter()
        .chain(analytics.detect_crashes.iter())
        .chain(analytics.check_values_change.iter());
    for item in selected {
        if !labels.contains(&item.as_str()) {
            tracing::warn!(
                "Device {}: analytics item '{}' is not polled; its report will be skipped",
                device,
                item
            );
        }
    }
}

/// Parse a JSON profile list. A document that is not a list is fatal; a
/// list entry that does not decode is logged and skipped.
pub fn parse_profiles(text: &str) -> Result<Vec<RawProfile>> {
    let document: serde_json::Value =
        serde_json::from_str(text).context("Profile document is not valid JSON")?;
    let entries = match document {
        serde_json::Value::Array(entries) => entries,
        other => anyhow::bail!(
            "Profile document must be a list of profiles, got {}",
            json_kind(&other)
        ),
    };

    let mut profiles = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<RawProfile>(entry) {
            Ok(profile) => profiles.push(profile),
            Err(e) => tracing::error!("Skipping profile #{}: {}", index + 1, e),
        }
    }
    Ok(profiles)
}

/// Load the profile list from a JSON file
pub fn load_profiles(path: impl AsRef<Path>) -> Result<Vec<RawProfile>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile file {}", path.display()))?;
    parse_profiles(&text)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "an object",
    }
}
