//! Conversion of a host into Kea `reservation-add` / `reservation-del`
//! command arguments.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoostError};
use crate::host::{Host, IdentifierKind, LocalHost};

// ---------------------------------------------------------------------------
// reservation-add payload
// ---------------------------------------------------------------------------

/// Reservation as one daemon should know it. Field names follow the Kea
/// configuration convention, so the struct serializes straight into the
/// `reservation` argument of `reservation-add`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Reservation {
    pub subnet_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hw_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flex_id: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefixes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub client_classes: Vec<String>,
}

impl Reservation {
    /// Project `host` onto the daemon behind `local_host`. The daemon
    /// name decides the address family: `dhcp6` reservations carry
    /// address lists and delegated prefixes, everything else carries a
    /// single `ip-address`.
    pub fn new(host: &Host, local_host: &LocalHost, daemon_name: &str) -> Self {
        let mut reservation = Reservation {
            subnet_id: host.local_subnet_id(local_host.daemon_id),
            hostname: host.hostname.clone(),
            next_server: local_host.next_server.clone(),
            server_hostname: local_host.server_hostname.clone(),
            boot_file_name: local_host.boot_file_name.clone(),
            client_classes: local_host.client_classes.clone(),
            ..Default::default()
        };
        for ident in &host.identifiers {
            let hex = Some(ident.to_hex());
            match ident.kind {
                IdentifierKind::HwAddress => reservation.hw_address = hex,
                IdentifierKind::Duid => reservation.duid = hex,
                IdentifierKind::CircuitId => reservation.circuit_id = hex,
                IdentifierKind::ClientId => reservation.client_id = hex,
                IdentifierKind::FlexId => reservation.flex_id = hex,
            }
        }
        if daemon_name == "dhcp6" {
            for addr in &host.ip_reservations {
                if addr.contains('/') {
                    reservation.prefixes.push(addr.clone());
                } else {
                    reservation.ip_addresses.push(addr.clone());
                }
            }
        } else {
            reservation.ip_address = host
                .ip_reservations
                .iter()
                .find(|addr| !addr.contains('/'))
                .cloned();
        }
        reservation
    }
}

// ---------------------------------------------------------------------------
// reservation-del payload
// ---------------------------------------------------------------------------

/// Arguments of `reservation-del`, which addresses the reservation by
/// subnet and one identifier rather than by its full definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedReservation {
    #[serde(rename = "subnet-id")]
    pub subnet_id: i64,
    #[serde(rename = "identifier-type")]
    pub identifier_type: IdentifierKind,
    pub identifier: String,
}

impl DeletedReservation {
    pub fn from_host(host: &Host, daemon_id: i64) -> Result<Self> {
        let ident = host
            .primary_identifier()
            .ok_or(RoostError::NoIdentifiers(host.id))?;
        Ok(Self {
            subnet_id: host.local_subnet_id(daemon_id),
            identifier_type: ident.kind,
            identifier: ident.to_hex(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
