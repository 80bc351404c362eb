use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, RoostError};

// ---------------------------------------------------------------------------
// AppKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppKind {
    Kea,
    Bind9,
}

impl AppKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AppKind::Kea => "kea",
            AppKind::Bind9 => "bind9",
        }
    }
}

impl fmt::Display for AppKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppKind {
    type Err = RoostError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "kea" => Ok(AppKind::Kea),
            "bind9" | "named" => Ok(AppKind::Bind9),
            _ => Err(RoostError::UnknownAppKind(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// AccessPoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPointKind {
    /// Command channel accepting configuration changes.
    Control,
    /// Read-only statistics channel, never dispatched to.
    Statistics,
}

/// One reachable endpoint of a managed app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub kind: AccessPointKind,
    pub address: String,
    pub port: u16,
    /// Authentication key, when the daemon requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub use_secure_protocol: bool,
}

impl AccessPoint {
    pub fn control(address: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            kind: AccessPointKind::Control,
            address: address.into(),
            port,
            key: None,
            use_secure_protocol: secure,
        }
    }

    /// Base URL of this endpoint. IPv6 addresses are bracketed.
    pub fn url(&self) -> String {
        let scheme = if self.use_secure_protocol {
            "https"
        } else {
            "http"
        };
        if self.address.contains(':') {
            format!("{scheme}://[{}]:{}/", self.address, self.port)
        } else {
            format!("{scheme}://{}:{}/", self.address, self.port)
        }
    }
}

// ---------------------------------------------------------------------------
// App and Daemon
// ---------------------------------------------------------------------------

/// A logical service running inside an app, e.g. the dhcp4 process of a
/// Kea server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Daemon {
    pub id: i64,
    pub name: String,
}

/// A managed daemon instance registered with the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub id: i64,
    pub name: String,
    pub kind: AppKind,
    #[serde(default)]
    pub access_points: Vec<AccessPoint>,
    #[serde(default)]
    pub daemons: Vec<Daemon>,
}

impl App {
    pub fn daemon_by_id(&self, daemon_id: i64) -> Option<&Daemon> {
        self.daemons.iter().find(|d| d.id == daemon_id)
    }
}

// ---------------------------------------------------------------------------
// AppRef
// ---------------------------------------------------------------------------

/// Minimal addressing shape of an app, embedded in staged commands so that
/// commit needs no further store reads to reach the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRef {
    pub id: i64,
    pub name: String,
    pub kind: AppKind,
    pub access_points: Vec<AccessPoint>,
}

impl AppRef {
    pub fn control_access_point(&self) -> Result<&AccessPoint> {
        self.access_points
            .iter()
            .find(|ap| ap.kind == AccessPointKind::Control)
            .ok_or_else(|| RoostError::NoControlAccessPoint(self.name.clone()))
    }

    /// URL of the control channel this app accepts commands on.
    pub fn control_url(&self) -> Result<String> {
        Ok(self.control_access_point()?.url())
    }
}

impl From<&App> for AppRef {
    fn from(app: &App) -> Self {
        Self {
            id: app.id,
            name: app.name.clone(),
            kind: app.kind,
            access_points: app.access_points.clone(),
        }
    }
}

/// A host's daemon association resolved to the daemon and its owning app.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonRef {
    pub id: i64,
    pub name: String,
    pub app: Option<AppRef>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
