//! Host reservation domain model.
//!
//! A `Host` maps a set of DHCP identifiers (hardware address, DUID, ...) to
//! reservation parameters. Its `LocalHost` entries tie it to the daemons
//! that serve it; per-daemon boot parameters live there. The optional
//! subnet association resolves the subnet id each daemon knows the
//! reservation under (0 means the reservation is global).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::app::DaemonRef;
use crate::error::{Result, RoostError};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentifierKind {
    HwAddress,
    Duid,
    CircuitId,
    ClientId,
    FlexId,
}

impl IdentifierKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentifierKind::HwAddress => "hw-address",
            IdentifierKind::Duid => "duid",
            IdentifierKind::CircuitId => "circuit-id",
            IdentifierKind::ClientId => "client-id",
            IdentifierKind::FlexId => "flex-id",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IdentifierKind {
    type Err = RoostError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hw-address" => Ok(IdentifierKind::HwAddress),
            "duid" => Ok(IdentifierKind::Duid),
            "circuit-id" => Ok(IdentifierKind::CircuitId),
            "client-id" => Ok(IdentifierKind::ClientId),
            "flex-id" => Ok(IdentifierKind::FlexId),
            _ => Err(RoostError::UnknownIdentifierKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostIdentifier {
    pub kind: IdentifierKind,
    /// Raw identifier octets, carried as lowercase hex in serialized form.
    #[serde(with = "hex")]
    pub value: Vec<u8>,
}

impl HostIdentifier {
    pub fn new(kind: IdentifierKind, value: Vec<u8>) -> Self {
        Self { kind, value }
    }

    /// Parse the textual forms daemons and operators use:
    /// `01:02:03:04:05:06`, `01-02-03-04-05-06` or `010203040506`.
    pub fn parse(kind: IdentifierKind, s: &str) -> Result<Self> {
        let cleaned: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        let value =
            hex::decode(&cleaned).map_err(|_| RoostError::InvalidIdentifier(s.to_string()))?;
        if value.is_empty() {
            return Err(RoostError::InvalidIdentifier(s.to_string()));
        }
        Ok(Self { kind, value })
    }

    /// Unseparated lowercase hex, the form Kea commands expect.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.value)
    }
}

// ---------------------------------------------------------------------------
// Subnet association
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSubnet {
    pub daemon_id: i64,
    /// Subnet id in that daemon's own configuration.
    pub local_subnet_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default)]
    pub local_subnets: Vec<LocalSubnet>,
}

// ---------------------------------------------------------------------------
// LocalHost
// ---------------------------------------------------------------------------

/// Association between a host and one daemon serving its reservation,
/// with the parameters specific to that daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalHost {
    pub daemon_id: i64,
    /// Resolved daemon and owning app connectivity. Filled by store
    /// hydration or the caller; never persisted.
    #[serde(skip)]
    pub daemon: Option<DaemonRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub client_classes: Vec<String>,
}

impl LocalHost {
    pub fn new(daemon_id: i64) -> Self {
        Self {
            daemon_id,
            daemon: None,
            next_server: None,
            server_hostname: None,
            boot_file_name: None,
            client_classes: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Host {
    #[serde(default)]
    pub id: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<Subnet>,
    #[serde(default)]
    pub identifiers: Vec<HostIdentifier>,
    /// Reserved addresses; `/`-suffixed entries are delegated prefixes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_reservations: Vec<String>,
    #[serde(default)]
    pub local_hosts: Vec<LocalHost>,
}

impl Host {
    pub fn daemon_ids(&self) -> Vec<i64> {
        self.local_hosts.iter().map(|lh| lh.daemon_id).collect()
    }

    pub fn local_host(&self, daemon_id: i64) -> Option<&LocalHost> {
        self.local_hosts.iter().find(|lh| lh.daemon_id == daemon_id)
    }

    /// Identifier used to address this reservation in deletion commands.
    pub fn primary_identifier(&self) -> Option<&HostIdentifier> {
        self.identifiers.first()
    }

    /// Subnet id of this reservation as `daemon_id` knows it, or 0 when
    /// the reservation is global.
    pub fn local_subnet_id(&self, daemon_id: i64) -> i64 {
        self.subnet
            .as_ref()
            .and_then(|s| {
                s.local_subnets
                    .iter()
                    .find(|ls| ls.daemon_id == daemon_id)
            })
            .map(|ls| ls.local_subnet_id)
            .unwrap_or(0)
    }

    /// Check the host can be turned into daemon commands: at least one
    /// association, and every association resolved to its daemon and app.
    pub fn ensure_dispatchable(&self) -> Result<()> {
        if self.local_hosts.is_empty() {
            return Err(RoostError::NoDaemonAssociations(self.id));
        }
        for lh in &self.local_hosts {
            let daemon = lh
                .daemon
                .as_ref()
                .ok_or(RoostError::UnresolvedDaemon(self.id))?;
            if daemon.app.is_none() {
                return Err(RoostError::UnresolvedApp(self.id));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
