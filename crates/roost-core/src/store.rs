//! Durable store for fleet entities and scheduled changes, using redb.
//!
//! # Table design
//!
//! `apps` and `hosts` key rows by the 8-byte big-endian entity id, so
//! iteration order equals id order. `scheduled_changes` uses a 16-byte
//! composite key:
//! ```text
//! [ deadline_ms: u64 big-endian (8 bytes) | change id: u64 big-endian (8 bytes) ]
//! ```
//! Because the deadline occupies the high bytes, byte ordering equals
//! deadline ordering and a single range scan `..=due_upper_bound(now)`
//! returns every change due by `now`. Only the `executed` flag is
//! filtered in application code.
//!
//! Values are JSON-encoded rows. Host rows never carry resolved daemon
//! references; those are rebuilt from the `apps` table on read.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};

use crate::app::{App, AppRef, DaemonRef};
use crate::error::{Result, RoostError};
use crate::host::Host;
use crate::transaction::ScheduledChange;

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

/// Key: 8-byte big-endian app id. Value: JSON-encoded App.
const APPS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("apps");

/// Key: 8-byte big-endian host id. Value: JSON-encoded Host.
const HOSTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("hosts");

/// Key: 16-byte composite (deadline_ms big-endian ++ change id big-endian).
/// Value: JSON-encoded ScheduledChange.
const CHANGES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("scheduled_changes");

/// Id sequences, one row per entity table.
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn id_key(id: i64) -> [u8; 8] {
    (id.max(0) as u64).to_be_bytes()
}

fn change_key(deadline: DateTime<Utc>, id: i64) -> [u8; 16] {
    let mut key = [0u8; 16];
    let ms = deadline.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].copy_from_slice(&(id.max(0) as u64).to_be_bytes());
    key
}

/// Upper bound for a range scan returning all changes due by `now`.
///
/// The id suffix is `0xff` × 8, greater than any assigned id, so every
/// change with `deadline_ms <= now_ms` is included.
fn due_upper_bound(now: DateTime<Utc>) -> [u8; 16] {
    let mut key = [0u8; 16];
    let ms = now.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].fill(0xff);
    key
}

// ---------------------------------------------------------------------------
// RedbStore
// ---------------------------------------------------------------------------

/// Persistent store backing the orchestrator. All accessors take `&self`;
/// redb serializes writers internally.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the database at `path` and ensure all tables exist.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(|e| RoostError::Store(e.to_string()))?;
        let wt = db
            .begin_write()
            .map_err(|e| RoostError::Store(e.to_string()))?;
        wt.open_table(APPS)
            .map_err(|e| RoostError::Store(e.to_string()))?;
        wt.open_table(HOSTS)
            .map_err(|e| RoostError::Store(e.to_string()))?;
        wt.open_table(CHANGES)
            .map_err(|e| RoostError::Store(e.to_string()))?;
        wt.open_table(SEQUENCES)
            .map_err(|e| RoostError::Store(e.to_string()))?;
        wt.commit().map_err(|e| RoostError::Store(e.to_string()))?;
        Ok(Self { db })
    }

    /// Allocate the next id for `sequence` inside an open write
    /// transaction. A caller-provided id above the counter advances it;
    /// one at or below the counter may name an existing row and is
    /// refused rather than remapped.
    fn next_id(
        wt: &redb::WriteTransaction,
        sequence: &str,
        requested: i64,
    ) -> Result<i64> {
        let mut table = wt
            .open_table(SEQUENCES)
            .map_err(|e| RoostError::Store(e.to_string()))?;
        let current = table
            .get(sequence)
            .map_err(|e| RoostError::Store(e.to_string()))?
            .map(|v| v.value())
            .unwrap_or(0);
        let id = if requested > 0 {
            if requested as u64 <= current {
                return Err(RoostError::IdInUse {
                    table: sequence.to_string(),
                    id: requested,
                });
            }
            requested as u64
        } else {
            current + 1
        };
        table
            .insert(sequence, id)
            .map_err(|e| RoostError::Store(e.to_string()))?;
        Ok(id as i64)
    }

    // -----------------------------------------------------------------------
    // Apps
    // -----------------------------------------------------------------------

    /// Register an app and its daemons. Returns the assigned id.
    pub fn add_app(&self, app: &App) -> Result<i64> {
        let wt = self
            .db
            .begin_write()
            .map_err(|e| RoostError::Store(e.to_string()))?;
        let id = Self::next_id(&wt, "apps", app.id)?;
        let mut stored = app.clone();
        stored.id = id;
        let value = serde_json::to_vec(&stored)?;
        {
            let mut table = wt
                .open_table(APPS)
                .map_err(|e| RoostError::Store(e.to_string()))?;
            table
                .insert(id_key(id).as_slice(), value.as_slice())
                .map_err(|e| RoostError::Store(e.to_string()))?;
        }
        wt.commit().map_err(|e| RoostError::Store(e.to_string()))?;
        Ok(id)
    }

    /// All registered apps, in id order.
    pub fn apps(&self) -> Result<Vec<App>> {
        let rt = self
            .db
            .begin_read()
            .map_err(|e| RoostError::Store(e.to_string()))?;
        let table = rt
            .open_table(APPS)
            .map_err(|e| RoostError::Store(e.to_string()))?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(|e| RoostError::Store(e.to_string()))? {
            let (_, v) = entry.map_err(|e| RoostError::Store(e.to_string()))?;
            let app: App = serde_json::from_slice(v.value())?;
            result.push(app);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Hosts
    // -----------------------------------------------------------------------

    /// Insert a host reservation row. Returns the assigned id.
    pub fn add_host(&self, host: &Host) -> Result<i64> {
        let wt = self
            .db
            .begin_write()
            .map_err(|e| RoostError::Store(e.to_string()))?;
        let id = Self::next_id(&wt, "hosts", host.id)?;
        let mut stored = host.clone();
        stored.id = id;
        let value = serde_json::to_vec(&stored)?;
        {
            let mut table = wt
                .open_table(HOSTS)
                .map_err(|e| RoostError::Store(e.to_string()))?;
            table
                .insert(id_key(id).as_slice(), value.as_slice())
                .map_err(|e| RoostError::Store(e.to_string()))?;
        }
        wt.commit().map_err(|e| RoostError::Store(e.to_string()))?;
        Ok(id)
    }

    /// Replace an existing host row.
    pub fn update_host(&self, host: &Host) -> Result<()> {
        let value = serde_json::to_vec(host)?;
        let wt = self
            .db
            .begin_write()
            .map_err(|e| RoostError::Store(e.to_string()))?;
        {
            let mut table = wt
                .open_table(HOSTS)
                .map_err(|e| RoostError::Store(e.to_string()))?;
            let exists = table
                .get(id_key(host.id).as_slice())
                .map_err(|e| RoostError::Store(e.to_string()))?
                .is_some();
            if !exists {
                return Err(RoostError::HostNotFound(host.id));
            }
            table
                .insert(id_key(host.id).as_slice(), value.as_slice())
                .map_err(|e| RoostError::Store(e.to_string()))?;
        }
        wt.commit().map_err(|e| RoostError::Store(e.to_string()))?;
        Ok(())
    }

    /// Delete a host row.
    pub fn delete_host(&self, id: i64) -> Result<()> {
        let wt = self
            .db
            .begin_write()
            .map_err(|e| RoostError::Store(e.to_string()))?;
        {
            let mut table = wt
                .open_table(HOSTS)
                .map_err(|e| RoostError::Store(e.to_string()))?;
            let removed = table
                .remove(id_key(id).as_slice())
                .map_err(|e| RoostError::Store(e.to_string()))?;
            if removed.is_none() {
                return Err(RoostError::HostNotFound(id));
            }
        }
        wt.commit().map_err(|e| RoostError::Store(e.to_string()))?;
        Ok(())
    }

    /// Load one host with daemon references resolved.
    pub fn host(&self, id: i64) -> Result<Host> {
        let mut host = {
            let rt = self
                .db
                .begin_read()
                .map_err(|e| RoostError::Store(e.to_string()))?;
            let table = rt
                .open_table(HOSTS)
                .map_err(|e| RoostError::Store(e.to_string()))?;
            let value = table
                .get(id_key(id).as_slice())
                .map_err(|e| RoostError::Store(e.to_string()))?
                .ok_or(RoostError::HostNotFound(id))?;
            serde_json::from_slice::<Host>(value.value())?
        };
        self.hydrate_host(&mut host)?;
        Ok(host)
    }

    /// All hosts with daemon references resolved, in id order.
    pub fn hosts(&self) -> Result<Vec<Host>> {
        let mut result = {
            let rt = self
                .db
                .begin_read()
                .map_err(|e| RoostError::Store(e.to_string()))?;
            let table = rt
                .open_table(HOSTS)
                .map_err(|e| RoostError::Store(e.to_string()))?;
            let mut rows = Vec::new();
            for entry in table.iter().map_err(|e| RoostError::Store(e.to_string()))? {
                let (_, v) = entry.map_err(|e| RoostError::Store(e.to_string()))?;
                let host: Host = serde_json::from_slice(v.value())?;
                rows.push(host);
            }
            rows
        };
        for host in &mut result {
            self.hydrate_host(host)?;
        }
        Ok(result)
    }

    /// Resolve each daemon association of `host` against the registered
    /// apps. Associations naming an unknown daemon are left unresolved;
    /// validation at apply time turns those into errors.
    pub fn hydrate_host(&self, host: &mut Host) -> Result<()> {
        let apps = self.apps()?;
        for lh in &mut host.local_hosts {
            lh.daemon = apps.iter().find_map(|app| {
                app.daemon_by_id(lh.daemon_id).map(|d| DaemonRef {
                    id: d.id,
                    name: d.name.clone(),
                    app: Some(AppRef::from(app)),
                })
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Scheduled changes
    // -----------------------------------------------------------------------

    /// Persist a deferred change. Returns the assigned id.
    pub fn add_scheduled_change(&self, change: &ScheduledChange) -> Result<i64> {
        let wt = self
            .db
            .begin_write()
            .map_err(|e| RoostError::Store(e.to_string()))?;
        let id = Self::next_id(&wt, "scheduled_changes", change.id)?;
        let mut stored = change.clone();
        stored.id = id;
        let value = serde_json::to_vec(&stored)?;
        {
            let mut table = wt
                .open_table(CHANGES)
                .map_err(|e| RoostError::Store(e.to_string()))?;
            table
                .insert(change_key(stored.deadline, id).as_slice(), value.as_slice())
                .map_err(|e| RoostError::Store(e.to_string()))?;
        }
        wt.commit().map_err(|e| RoostError::Store(e.to_string()))?;
        Ok(id)
    }

    /// All scheduled changes, in deadline order (ascending).
    pub fn scheduled_changes(&self) -> Result<Vec<ScheduledChange>> {
        let rt = self
            .db
            .begin_read()
            .map_err(|e| RoostError::Store(e.to_string()))?;
        let table = rt
            .open_table(CHANGES)
            .map_err(|e| RoostError::Store(e.to_string()))?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(|e| RoostError::Store(e.to_string()))? {
            let (_, v) = entry.map_err(|e| RoostError::Store(e.to_string()))?;
            let change: ScheduledChange = serde_json::from_slice(v.value())?;
            result.push(change);
        }
        Ok(result)
    }

    pub fn scheduled_change(&self, id: i64) -> Result<ScheduledChange> {
        self.scheduled_changes()?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or(RoostError::ChangeNotFound(id))
    }

    /// Changes whose deadline has passed and which no sweep has driven
    /// yet, in deadline order due to the composite key design.
    pub fn due_changes(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledChange>> {
        let upper = due_upper_bound(now);
        let rt = self
            .db
            .begin_read()
            .map_err(|e| RoostError::Store(e.to_string()))?;
        let table = rt
            .open_table(CHANGES)
            .map_err(|e| RoostError::Store(e.to_string()))?;
        let mut result = Vec::new();
        for entry in table
            .range(..=upper.as_slice())
            .map_err(|e| RoostError::Store(e.to_string()))?
        {
            let (_, v) = entry.map_err(|e| RoostError::Store(e.to_string()))?;
            let change: ScheduledChange = serde_json::from_slice(v.value())?;
            if !change.executed {
                result.push(change);
            }
        }
        Ok(result)
    }

    /// Record that a sweep drove the change through commit. Executed
    /// rows stay visible for inspection but are never picked up again.
    pub fn mark_executed(&self, id: i64) -> Result<()> {
        let mut change = self.scheduled_change(id)?;
        let key = change_key(change.deadline, change.id);
        change.executed = true;
        let value = serde_json::to_vec(&change)?;
        let wt = self
            .db
            .begin_write()
            .map_err(|e| RoostError::Store(e.to_string()))?;
        {
            let mut table = wt
                .open_table(CHANGES)
                .map_err(|e| RoostError::Store(e.to_string()))?;
            table
                .remove(key.as_slice())
                .map_err(|e| RoostError::Store(e.to_string()))?;
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(|e| RoostError::Store(e.to_string()))?;
        }
        wt.commit().map_err(|e| RoostError::Store(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AccessPoint, AppKind, Daemon};
    use crate::host::LocalHost;
    use crate::testing::test_host;
    use crate::transaction::{Operation, Update};
    use chrono::Duration as CDur;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, RedbStore) {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    fn change_due_at(deadline: DateTime<Utc>) -> ScheduledChange {
        let update = Update::kea(Operation::HostAdd, vec![1]);
        ScheduledChange {
            id: 0,
            deadline,
            user_id: 42,
            updates: vec![update.to_persisted().unwrap()],
            executed: false,
        }
    }

    #[test]
    fn host_rows_roundtrip_and_delete() {
        let (_dir, store) = open_tmp();
        let id = store.add_host(&test_host()).unwrap();
        assert!(id > 0);

        let mut loaded = store.host(id).unwrap();
        assert_eq!(loaded.hostname, "cool.example.org");

        loaded.hostname = "renamed.example.org".to_string();
        store.update_host(&loaded).unwrap();
        assert_eq!(store.host(id).unwrap().hostname, "renamed.example.org");

        store.delete_host(id).unwrap();
        assert!(matches!(
            store.host(id),
            Err(RoostError::HostNotFound(got)) if got == id
        ));
        assert!(matches!(
            store.delete_host(id),
            Err(RoostError::HostNotFound(_))
        ));
    }

    #[test]
    fn update_requires_existing_row() {
        let (_dir, store) = open_tmp();
        let mut host = test_host();
        host.id = 9;
        assert!(matches!(
            store.update_host(&host),
            Err(RoostError::HostNotFound(9))
        ));
    }

    #[test]
    fn preset_ids_are_kept_and_advance_the_sequence() {
        let (_dir, store) = open_tmp();
        let mut host = test_host();
        host.id = 1000;
        assert_eq!(store.add_host(&host).unwrap(), 1000);
        host.id = 0;
        assert_eq!(store.add_host(&host).unwrap(), 1001);
    }

    #[test]
    fn preset_id_at_or_below_the_sequence_is_refused() {
        let (_dir, store) = open_tmp();
        let first_id = store.add_host(&test_host()).unwrap();
        let mut second = test_host();
        second.hostname = "second.example.org".to_string();
        let second_id = store.add_host(&second).unwrap();

        // Re-adding under an assigned id must not clobber its row.
        let mut dup = test_host();
        dup.id = first_id;
        dup.hostname = "dup.example.org".to_string();
        let err = store.add_host(&dup).unwrap_err();
        assert_eq!(
            err.to_string(),
            "id 1 is already in use in the hosts table"
        );

        let hosts = store.hosts().unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].hostname, "cool.example.org");
        assert_eq!(hosts[1].hostname, "second.example.org");
        // The refused insert leaves the sequence untouched.
        let mut third = test_host();
        third.hostname = "third.example.org".to_string();
        assert_eq!(store.add_host(&third).unwrap(), second_id + 1);
    }

    #[test]
    fn hydration_resolves_daemons_from_registered_apps() {
        let (_dir, store) = open_tmp();
        let app = App {
            id: 0,
            name: "kea@192.0.2.1".to_string(),
            kind: AppKind::Kea,
            access_points: vec![AccessPoint::control("192.0.2.1", 1234, false)],
            daemons: vec![Daemon {
                id: 1,
                name: "dhcp4".to_string(),
            }],
        };
        store.add_app(&app).unwrap();

        let mut host = test_host();
        host.local_hosts = vec![LocalHost::new(1), LocalHost::new(99)];
        let id = store.add_host(&host).unwrap();

        let loaded = store.host(id).unwrap();
        let resolved = loaded.local_hosts[0].daemon.as_ref().unwrap();
        assert_eq!(resolved.name, "dhcp4");
        assert_eq!(
            resolved.app.as_ref().unwrap().control_url().unwrap(),
            "http://192.0.2.1:1234/"
        );
        // Daemon 99 is registered nowhere; validation catches it later.
        assert!(loaded.local_hosts[1].daemon.is_none());
    }

    #[test]
    fn due_changes_returns_only_past_unexecuted_rows() {
        let (_dir, store) = open_tmp();
        let now = Utc::now();
        let past = store
            .add_scheduled_change(&change_due_at(now - CDur::milliseconds(100)))
            .unwrap();
        store
            .add_scheduled_change(&change_due_at(now + CDur::seconds(60)))
            .unwrap();
        let done = store
            .add_scheduled_change(&change_due_at(now - CDur::seconds(10)))
            .unwrap();
        store.mark_executed(done).unwrap();

        let due = store.due_changes(now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, past);
    }

    #[test]
    fn due_changes_are_ordered_by_deadline() {
        let (_dir, store) = open_tmp();
        let now = Utc::now();
        // Insert in reverse chronological order.
        let second = store
            .add_scheduled_change(&change_due_at(now - CDur::milliseconds(50)))
            .unwrap();
        let first = store
            .add_scheduled_change(&change_due_at(now - CDur::milliseconds(200)))
            .unwrap();

        let due = store.due_changes(now).unwrap();
        assert_eq!(due.iter().map(|c| c.id).collect::<Vec<_>>(), vec![first, second]);
    }

    #[test]
    fn executed_rows_stay_visible() {
        let (_dir, store) = open_tmp();
        let id = store
            .add_scheduled_change(&change_due_at(Utc::now() - CDur::seconds(1)))
            .unwrap();
        store.mark_executed(id).unwrap();

        assert!(store.due_changes(Utc::now()).unwrap().is_empty());
        let row = store.scheduled_change(id).unwrap();
        assert!(row.executed);
    }

    #[test]
    fn mark_executed_requires_existing_change() {
        let (_dir, store) = open_tmp();
        assert!(matches!(
            store.mark_executed(12),
            Err(RoostError::ChangeNotFound(12))
        ));
    }

    #[test]
    fn rows_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let change_id;
        let host_id;
        {
            let store = RedbStore::open(&path).unwrap();
            host_id = store.add_host(&test_host()).unwrap();
            change_id = store
                .add_scheduled_change(&change_due_at(Utc::now() - CDur::seconds(5)))
                .unwrap();
        }
        let store = RedbStore::open(&path).unwrap();
        assert_eq!(store.host(host_id).unwrap().hostname, "cool.example.org");
        let due = store.due_changes(Utc::now()).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, change_id);
    }

    #[test]
    fn empty_store_reads() {
        let (_dir, store) = open_tmp();
        assert!(store.hosts().unwrap().is_empty());
        assert!(store.apps().unwrap().is_empty());
        assert!(store.due_changes(Utc::now()).unwrap().is_empty());
    }
}
