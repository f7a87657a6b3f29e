//! Configuration for tail operations.
//!
//! Every component takes its configuration as an explicit value; nothing is
//! read from process-wide state after construction.
//!
//! ## Environment variables
//!
//! ```bash
//! CHRONIK_TAIL_DIAL_TIMEOUT_SECS=10
//! CHRONIK_TAIL_READ_TIMEOUT_SECS=10
//! CHRONIK_TAIL_GROUP_JOIN_TIMEOUT_SECS=30
//! CHRONIK_TAIL_COORDINATION_TIMEOUT_SECS=10
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TailError};

/// Default listener name when resolving broker endpoints from ZooKeeper.
pub const DEFAULT_LISTENER: &str = "PLAINTEXT";

/// Default number of records replayed before following.
pub const DEFAULT_TAIL_COUNT: u64 = 20;

/// Timeouts applied to each I/O call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Broker dial and per-partition watermark query (default: 10s)
    pub dial_timeout_secs: u64,

    /// Single record fetch (default: 10s)
    pub read_timeout_secs: u64,

    /// Waiting for a group assignment (default: 30s)
    pub group_join_timeout_secs: u64,

    /// ZooKeeper connect and each tree read (default: 10s)
    pub coordination_timeout_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            dial_timeout_secs: 10,
            read_timeout_secs: 10,
            group_join_timeout_secs: 30,
            coordination_timeout_secs: 10,
        }
    }
}

impl TimeoutConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let secs = |name: &str, default: u64| {
            lookup(name)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };
        let defaults = Self::default();
        Self {
            dial_timeout_secs: secs("CHRONIK_TAIL_DIAL_TIMEOUT_SECS", defaults.dial_timeout_secs),
            read_timeout_secs: secs("CHRONIK_TAIL_READ_TIMEOUT_SECS", defaults.read_timeout_secs),
            group_join_timeout_secs: secs(
                "CHRONIK_TAIL_GROUP_JOIN_TIMEOUT_SECS",
                defaults.group_join_timeout_secs,
            ),
            coordination_timeout_secs: secs(
                "CHRONIK_TAIL_COORDINATION_TIMEOUT_SECS",
                defaults.coordination_timeout_secs,
            ),
        }
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn group_join_timeout(&self) -> Duration {
        Duration::from_secs(self.group_join_timeout_secs)
    }

    pub fn coordination_timeout(&self) -> Duration {
        Duration::from_secs(self.coordination_timeout_secs)
    }
}

/// PEM material for TLS connections to brokers.
///
/// Holds already-loaded contents, not file paths.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsMaterial {
    pub ca_pem: Option<String>,
    pub cert_pem: Option<String>,
    #[serde(skip_serializing)]
    pub key_pem: Option<String>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca_pem", &self.ca_pem.as_ref().map(|_| "<pem>"))
            .field("cert_pem", &self.cert_pem.as_ref().map(|_| "<pem>"))
            .field("key_pem", &self.key_pem.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl TlsMaterial {
    /// Validate TLS material.
    ///
    /// Returns `Ok(None)` when nothing was supplied (plaintext). A client
    /// certificate without its key, or a key without its certificate, is a
    /// configuration error.
    pub fn new(
        ca_pem: Option<String>,
        cert_pem: Option<String>,
        key_pem: Option<String>,
    ) -> Result<Option<Self>> {
        let ca_pem = ca_pem.filter(|s| !s.trim().is_empty());
        let cert_pem = cert_pem.filter(|s| !s.trim().is_empty());
        let key_pem = key_pem.filter(|s| !s.trim().is_empty());

        match (&cert_pem, &key_pem) {
            (Some(_), None) => {
                return Err(TailError::Configuration(
                    "client certificate supplied without a private key".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(TailError::Configuration(
                    "private key supplied without a client certificate".to_string(),
                ))
            }
            _ => {}
        }

        if ca_pem.is_none() && cert_pem.is_none() {
            return Ok(None);
        }

        Ok(Some(Self {
            ca_pem,
            cert_pem,
            key_pem,
        }))
    }
}

/// How broker connections are established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialConfig {
    pub timeout: Duration,
    pub tls: Option<TlsMaterial>,
}

impl DialConfig {
    pub fn new(timeout: Duration, tls: Option<TlsMaterial>) -> Self {
        Self { timeout, tls }
    }

    pub fn plaintext(timeout: Duration) -> Self {
        Self { timeout, tls: None }
    }
}

/// Where the broker topology comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterSource {
    /// Discover brokers from the ZooKeeper tree under `/{cluster}`
    ZooKeeper { hosts: String, cluster: String },

    /// Use a fixed broker address list
    Static(Vec<String>),
}

impl ClusterSource {
    /// Parse a comma-separated broker list, ignoring empty entries.
    pub fn from_broker_list(list: &str) -> Result<Self> {
        let brokers: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        if brokers.is_empty() {
            return Err(TailError::Configuration(
                "broker list is empty".to_string(),
            ));
        }
        Ok(ClusterSource::Static(brokers))
    }
}

/// Termination behavior of the read loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadMode {
    /// Emit exactly this many records, then stop
    FixedCount(u64),

    /// Emit until cancelled or a read fails
    Follow,
}

/// Everything one tail invocation needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailConfig {
    pub topic: String,
    pub tail_count: u64,
    pub follow: bool,
    pub listener: String,
    /// Caller identity used to derive the consumer group id
    pub actor: String,
    pub timeouts: TimeoutConfig,
    pub tls: Option<TlsMaterial>,
}

impl TailConfig {
    pub fn new(topic: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            tail_count: DEFAULT_TAIL_COUNT,
            follow: false,
            listener: DEFAULT_LISTENER.to_string(),
            actor: actor.into(),
            timeouts: TimeoutConfig::default(),
            tls: None,
        }
    }

    pub fn with_tail_count(mut self, tail_count: u64) -> Self {
        self.tail_count = tail_count;
        self
    }

    pub fn with_follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    pub fn with_listener(mut self, listener: impl Into<String>) -> Self {
        self.listener = listener.into();
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_tls(mut self, tls: Option<TlsMaterial>) -> Self {
        self.tls = tls;
        self
    }

    pub fn read_mode(&self) -> ReadMode {
        if self.follow {
            ReadMode::Follow
        } else {
            ReadMode::FixedCount(self.tail_count)
        }
    }

    pub fn dial_config(&self) -> DialConfig {
        DialConfig::new(self.timeouts.dial_timeout(), self.tls.clone())
    }

    /// Check the fields a tail run cannot start without.
    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(TailError::InvalidInput("topic name is required".to_string()));
        }
        if self.actor.trim().is_empty() {
            return Err(TailError::InvalidInput(
                "caller identity is required to derive the group id".to_string(),
            ));
        }
        if self.listener.trim().is_empty() {
            return Err(TailError::InvalidInput("listener name is empty".to_string()));
        }
        if self.timeouts.read_timeout_secs == 0 || self.timeouts.dial_timeout_secs == 0 {
            return Err(TailError::Configuration(
                "dial and read timeouts must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}
