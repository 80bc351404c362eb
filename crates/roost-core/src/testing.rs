//! Shared fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use crate::app::{AccessPoint, App, AppKind, AppRef, Daemon, DaemonRef};
use crate::comm::CommandDispatcher;
use crate::error::{Result, RoostError};
use crate::host::{Host, HostIdentifier, IdentifierKind, LocalHost};
use crate::kea::command::{KeaCommand, KeaResponse, RESULT_SUCCESS};
use crate::manager::ConfigManager;
use crate::store::RedbStore;

pub fn kea_app(
    id: i64,
    name: &str,
    address: &str,
    port: u16,
    secure: bool,
    daemons: &[(i64, &str)],
) -> App {
    App {
        id,
        name: name.to_string(),
        kind: AppKind::Kea,
        access_points: vec![AccessPoint::control(address, port, secure)],
        daemons: daemons
            .iter()
            .map(|&(daemon_id, daemon_name)| Daemon {
                id: daemon_id,
                name: daemon_name.to_string(),
            })
            .collect(),
    }
}

/// Two single-daemon Kea apps on plain HTTP control channels.
pub fn fixture_apps() -> Vec<App> {
    vec![
        kea_app(1, "kea@192.0.2.1", "192.0.2.1", 1234, false, &[(1, "dhcp4")]),
        kea_app(2, "kea@192.0.2.2", "192.0.2.2", 2345, false, &[(2, "dhcp4")]),
    ]
}

/// Two Kea apps behind TLS control channels. Their daemon ids are
/// disjoint from [`fixture_apps`] so both sets can live in one store.
pub fn secure_apps() -> Vec<App> {
    vec![
        kea_app(3, "kea@localhost1", "localhost", 1234, true, &[(3, "dhcp4")]),
        kea_app(4, "kea@localhost2", "localhost", 1235, true, &[(4, "dhcp4")]),
    ]
}

/// A reservation for `cool.example.org` associated with the first
/// daemon of each given app, daemon references already resolved.
pub fn host_for(apps: &[App]) -> Host {
    let mut local_hosts = Vec::with_capacity(apps.len());
    for app in apps {
        let daemon = &app.daemons[0];
        let mut lh = LocalHost::new(daemon.id);
        lh.daemon = Some(DaemonRef {
            id: daemon.id,
            name: daemon.name.clone(),
            app: Some(AppRef::from(app)),
        });
        local_hosts.push(lh);
    }
    Host {
        id: 0,
        hostname: "cool.example.org".to_string(),
        subnet: None,
        identifiers: vec![HostIdentifier::new(
            IdentifierKind::HwAddress,
            vec![1, 2, 3, 4, 5, 6],
        )],
        ip_reservations: Vec::new(),
        local_hosts,
    }
}

pub fn test_host() -> Host {
    host_for(&fixture_apps())
}

// ---------------------------------------------------------------------------
// Fake control agents
// ---------------------------------------------------------------------------

enum Scripted {
    Responses(Vec<KeaResponse>),
    Error(RoostError),
}

#[derive(Default)]
struct FakeAgentState {
    sent: Vec<(AppRef, KeaCommand)>,
    scripted: VecDeque<Scripted>,
}

/// In-memory dispatcher standing in for the fleet's control agents.
/// Unscripted dispatches answer with a single success response; queued
/// responses and errors are consumed in order, one per dispatch.
#[derive(Clone, Default)]
pub struct FakeDispatcher {
    state: Arc<Mutex<FakeAgentState>>,
}

impl FakeDispatcher {
    pub fn queue_responses(&self, responses: Vec<KeaResponse>) {
        self.state
            .lock()
            .unwrap()
            .scripted
            .push_back(Scripted::Responses(responses));
    }

    pub fn queue_error(&self, error: RoostError) {
        self.state
            .lock()
            .unwrap()
            .scripted
            .push_back(Scripted::Error(error));
    }

    pub fn sent(&self) -> Vec<(AppRef, KeaCommand)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }
}

impl CommandDispatcher for FakeDispatcher {
    fn dispatch(&self, app: &AppRef, command: &KeaCommand) -> Result<Vec<KeaResponse>> {
        let mut state = self.state.lock().unwrap();
        state.sent.push((app.clone(), command.clone()));
        match state.scripted.pop_front() {
            Some(Scripted::Responses(responses)) => Ok(responses),
            Some(Scripted::Error(error)) => Err(error),
            None => Ok(vec![KeaResponse {
                result: RESULT_SUCCESS,
                text: Some("Command completed.".to_string()),
                arguments: None,
            }]),
        }
    }
}

/// Manager over a temporary store with [`fixture_apps`] registered and
/// a [`FakeDispatcher`] as the transport. The returned dispatcher
/// handle shares state with the manager's copy.
pub fn test_manager() -> (TempDir, ConfigManager, FakeDispatcher) {
    let dir = TempDir::new().unwrap();
    let store = RedbStore::open(&dir.path().join("test.db")).unwrap();
    for app in fixture_apps() {
        store.add_app(&app).unwrap();
    }
    let dispatcher = FakeDispatcher::default();
    let manager = ConfigManager::new(store, Box::new(dispatcher.clone()));
    (dir, manager, dispatcher)
}
