//! Broker records and listener endpoint resolution.
//!
//! Pure parsing only. A broker registration node is decoded once into a
//! [`BrokerRecord`]; the [`ClusterTopology`] built from those records is a
//! read-only lookup from listener name to `host:port` candidates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TailError};

/// Separator between the listener name and the address in an endpoint.
const LISTENER_SEPARATOR: &str = "://";

/// Broker registration JSON as stored under `/{cluster}/brokers/ids/{id}`.
#[derive(Debug, Clone, Deserialize)]
struct BrokerRegistration {
    #[serde(default)]
    listener_security_protocol_map: BTreeMap<String, String>,
    #[serde(default)]
    endpoints: Vec<String>,
    #[serde(default)]
    jmx_port: i64,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    port: i64,
    #[serde(default)]
    version: i64,
}

/// One broker as advertised in the coordination tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokerRecord {
    pub id: i32,
    pub host: Option<String>,
    pub port: i64,
    pub jmx_port: i64,
    pub version: i64,
    pub timestamp: Option<String>,
    pub raw_endpoints: Vec<String>,
    pub security_protocols: BTreeMap<String, String>,
    /// listener name -> `host:port`
    pub endpoints: BTreeMap<String, String>,
}

impl BrokerRecord {
    /// Decode a broker registration node.
    ///
    /// `path` is only used for error reporting.
    pub fn parse(id: i32, path: &str, data: &[u8]) -> Result<Self> {
        let registration: BrokerRegistration =
            serde_json::from_slice(data).map_err(|e| TailError::CorruptMetadata {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        let host = registration.host.filter(|h| !h.is_empty());
        let mut endpoints = BTreeMap::new();

        for raw in &registration.endpoints {
            let (listener, address) =
                raw.split_once(LISTENER_SEPARATOR)
                    .ok_or_else(|| TailError::CorruptMetadata {
                        path: path.to_string(),
                        reason: format!("endpoint {:?} has no listener prefix", raw),
                    })?;

            if listener.is_empty() {
                return Err(TailError::CorruptMetadata {
                    path: path.to_string(),
                    reason: format!("endpoint {:?} has an empty listener name", raw),
                });
            }

            if let Some(address) = resolve_address(address, host.as_deref()) {
                endpoints.insert(listener.to_string(), address);
            }
        }

        Ok(Self {
            id,
            host,
            port: registration.port,
            jmx_port: registration.jmx_port,
            version: registration.version,
            timestamp: registration.timestamp,
            raw_endpoints: registration.endpoints,
            security_protocols: registration.listener_security_protocol_map,
            endpoints,
        })
    }

    /// Address advertised for `listener`, if any.
    pub fn endpoint(&self, listener: &str) -> Option<&str> {
        self.endpoints.get(listener).map(String::as_str)
    }

    /// Security protocol mapped to `listener`, if the broker declares one.
    pub fn security_protocol(&self, listener: &str) -> Option<&str> {
        self.security_protocols.get(listener).map(String::as_str)
    }
}

/// Fill an empty host with the broker's advertised host.
///
/// Returns `None` when no usable address remains.
fn resolve_address(address: &str, advertised_host: Option<&str>) -> Option<String> {
    let address = address.trim();
    if address.is_empty() {
        return None;
    }

    match address.rsplit_once(':') {
        Some(("", port)) if !port.is_empty() => {
            advertised_host.map(|host| format!("{}:{}", host, port))
        }
        Some((_, "")) => None,
        _ => Some(address.to_string()),
    }
}

/// Where a topology came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TopologyOrigin {
    Coordination,
    Static,
}

/// Ordered collection of brokers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterTopology {
    origin: TopologyOrigin,
    brokers: Vec<BrokerRecord>,
    /// Addresses supplied directly, in caller order
    static_addresses: Vec<String>,
}

impl ClusterTopology {
    pub fn from_records(brokers: Vec<BrokerRecord>) -> Self {
        Self {
            origin: TopologyOrigin::Coordination,
            brokers,
            static_addresses: Vec::new(),
        }
    }

    /// One broker per address, no listener distinction.
    pub fn from_static<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let static_addresses: Vec<String> = addresses
            .into_iter()
            .map(Into::into)
            .filter(|a: &String| !a.trim().is_empty())
            .collect();

        Self {
            origin: TopologyOrigin::Static,
            brokers: Vec::new(),
            static_addresses,
        }
    }

    pub fn origin(&self) -> TopologyOrigin {
        self.origin
    }

    /// `host:port` of every broker advertising `listener`, in broker order.
    ///
    /// Static topologies ignore the listener and return every address.
    pub fn endpoints_for(&self, listener: &str) -> Vec<String> {
        match self.origin {
            TopologyOrigin::Static => self.static_addresses.clone(),
            TopologyOrigin::Coordination => self
                .brokers
                .iter()
                .filter_map(|b| b.endpoint(listener))
                .map(String::from)
                .collect(),
        }
    }
}
