//! The polling collaborator contract.
//!
//! A poller asks a device for metric values by identifier. Identifiers are
//! dotted object identifiers; returned rows map each instance identifier
//! (the requested identifier plus an index suffix) to a typed value.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::PollError;

/// Standard management port.
pub const DEFAULT_PORT: u16 = 161;

/// A typed scalar returned by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Counter(u64),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetricValue {
    /// The value as an unsigned integer, if it can be read as one.
    ///
    /// Negative numbers and unparsable text yield `None`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            MetricValue::Counter(v) => Some(*v),
            MetricValue::Integer(v) => u64::try_from(*v).ok(),
            MetricValue::Float(v) if v.is_finite() && *v >= 0.0 => Some(*v as u64),
            MetricValue::Float(_) => None,
            MetricValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Text values as-is, numbers formatted.
    pub fn as_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Counter(v) => write!(f, "{v}"),
            MetricValue::Integer(v) => write!(f, "{v}"),
            MetricValue::Float(v) => write!(f, "{v}"),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        MetricValue::Counter(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

/// Instance identifier to value.
pub type Row = BTreeMap<String, MetricValue>;

/// First entry of `row` whose identifier is `prefix` or lies under it.
pub fn find_by_prefix<'a>(row: &'a Row, prefix: &str) -> Option<(&'a str, &'a MetricValue)> {
    row.iter()
        .find(|(k, _)| {
            k.as_str() == prefix
                || (k.starts_with(prefix) && k.as_bytes().get(prefix.len()) == Some(&b'.'))
        })
        .map(|(k, v)| (k.as_str(), v))
}

/// Authentication for device polling.
///
/// Version 3 user credentials are only used when user, authentication and
/// privacy passwords are all known. Otherwise a version 2 community applies.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    V2 {
        community: String,
    },
    V3 {
        user: String,
        auth_password: String,
        priv_password: String,
    },
}

impl Credentials {
    /// Pick v3 when all three parts are present and non-empty.
    pub fn resolve(
        user: Option<&str>,
        auth_password: Option<&str>,
        priv_password: Option<&str>,
        community: &str,
    ) -> Self {
        let present = |s: Option<&str>| s.filter(|v| !v.is_empty()).map(str::to_string);
        match (present(user), present(auth_password), present(priv_password)) {
            (Some(user), Some(auth_password), Some(priv_password)) => Credentials::V3 {
                user,
                auth_password,
                priv_password,
            },
            _ => Credentials::V2 {
                community: community.to_string(),
            },
        }
    }

    pub fn is_v3(&self) -> bool {
        matches!(self, Credentials::V3 { .. })
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Credentials::V2 {
            community: "public".to_string(),
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::V2 { .. } => f.debug_struct("V2").finish_non_exhaustive(),
            Credentials::V3 { user, .. } => f
                .debug_struct("V3")
                .field("user", user)
                .finish_non_exhaustive(),
        }
    }
}

/// A device to poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Device name, lowercase.
    pub name: String,
    /// Address to contact, when the name does not resolve.
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Target {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().to_lowercase(),
            address: None,
            port: DEFAULT_PORT,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Host to contact: the address when known, else the name.
    pub fn host(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.name)
    }
}

/// Fetches metric values from devices.
#[async_trait]
pub trait Poller: Send + Sync {
    /// Read single values. Returns every instance under the requested ids.
    async fn poll_scalar(
        &self,
        target: &Target,
        credentials: &Credentials,
        metric_ids: &[&str],
    ) -> Result<Row, PollError>;

    /// Read a table. Each returned row holds one instance of the requested
    /// columns. `row_hint` bounds the number of rows when known.
    async fn poll_table(
        &self,
        target: &Target,
        credentials: &Credentials,
        metric_ids: &[&str],
        row_hint: Option<u32>,
    ) -> Result<Vec<Row>, PollError>;
}
