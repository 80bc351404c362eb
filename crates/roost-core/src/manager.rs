//! Change orchestration.
//!
//! [`ConfigManager`] is the single entry point for configuration
//! changes. Target modules stage updates into a [`ChangeRequest`], and
//! the manager either commits the request immediately or persists it
//! as a scheduled change for the deadline sweep to execute later.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::comm::CommandDispatcher;
use crate::error::{Result, RoostError};
use crate::kea::KeaModule;
use crate::lock::{DaemonLocks, LockGuard};
use crate::store::RedbStore;
use crate::transaction::{ScheduledChange, TargetKind, TransactionState};

// ---------------------------------------------------------------------------
// Change requests
// ---------------------------------------------------------------------------

/// Lifecycle stage of a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Idle,
    Locked,
    Staged,
    Committed,
    Scheduled,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Locked => "locked",
            Stage::Staged => "staged",
            Stage::Committed => "committed",
            Stage::Scheduled => "scheduled",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An in-flight configuration change.
///
/// Created empty, populated by a target module's begin operation and
/// carried by the caller through apply into commit or schedule. Any
/// daemon locks taken at begin time live inside the request and are
/// released when it is dropped, however it ends.
#[derive(Debug, Default)]
pub struct ChangeRequest {
    stage: Stage,
    state: TransactionState,
    lock: Option<LockGuard>,
    user_id: Option<i64>,
}

impl ChangeRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn state(&self) -> &TransactionState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut TransactionState {
        &mut self.state
    }

    /// Record the user who owns this change. Required before the
    /// request can be scheduled.
    pub fn set_user(&mut self, user_id: i64) {
        self.user_id = Some(user_id);
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    pub fn locked_daemon_ids(&self) -> &[i64] {
        self.lock.as_ref().map(LockGuard::daemon_ids).unwrap_or(&[])
    }

    pub(crate) fn begin(&mut self, state: TransactionState, lock: Option<LockGuard>) -> Result<()> {
        self.ensure_stage(Stage::Idle, Stage::Locked, "change already begun")?;
        self.state = state;
        self.lock = lock;
        self.stage = Stage::Locked;
        Ok(())
    }

    pub(crate) fn mark_staged(&mut self) -> Result<()> {
        match self.stage {
            Stage::Locked | Stage::Staged => {
                self.stage = Stage::Staged;
                Ok(())
            }
            _ => Err(RoostError::InvalidTransition {
                from: self.stage.to_string(),
                to: Stage::Staged.to_string(),
                reason: "apply requires a begun change".to_string(),
            }),
        }
    }

    fn ensure_stage(&self, expected: Stage, to: Stage, reason: &str) -> Result<()> {
        if self.stage != expected {
            return Err(RoostError::InvalidTransition {
                from: self.stage.to_string(),
                to: to.to_string(),
                reason: reason.to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// State shared between the manager and its target modules.
pub(crate) struct ManagerShared {
    pub(crate) store: RedbStore,
    pub(crate) dispatcher: Box<dyn CommandDispatcher>,
    pub(crate) locks: DaemonLocks,
}

/// Orchestrates configuration changes across the fleet.
pub struct ConfigManager {
    shared: Arc<ManagerShared>,
    kea: KeaModule,
}

impl ConfigManager {
    pub fn new(store: RedbStore, dispatcher: Box<dyn CommandDispatcher>) -> Self {
        let shared = Arc::new(ManagerShared {
            store,
            dispatcher,
            locks: DaemonLocks::new(),
        });
        let kea = KeaModule::new(Arc::clone(&shared));
        Self { shared, kea }
    }

    pub fn store(&self) -> &RedbStore {
        &self.shared.store
    }

    pub fn kea(&self) -> &KeaModule {
        &self.kea
    }

    /// Daemon ids currently locked by in-flight changes, in ascending
    /// order.
    pub fn locked_daemons(&self) -> Vec<i64> {
        self.shared.locks.locked_ids()
    }

    /// Execute a staged request now. Updates are committed in staging
    /// order and the first failure aborts the rest. The request is
    /// consumed either way, releasing its daemon locks once dispatch
    /// has finished.
    pub fn commit(&self, request: ChangeRequest) -> Result<()> {
        request.ensure_stage(Stage::Staged, Stage::Committed, "commit requires a staged change")?;
        self.commit_state(request.state())
    }

    /// Persist a staged request as a scheduled change owned by the
    /// user recorded on the request. The daemon locks are released when
    /// the request is consumed; the sweep re-executes the change from
    /// its stored recipe alone.
    pub fn schedule(&self, request: ChangeRequest, deadline: DateTime<Utc>) -> Result<i64> {
        request.ensure_stage(Stage::Staged, Stage::Scheduled, "schedule requires a staged change")?;
        let user_id = request.user_id().ok_or(RoostError::MissingUser)?;
        let mut updates = Vec::with_capacity(request.state().updates.len());
        for update in &request.state().updates {
            updates.push(update.to_persisted()?);
        }
        let change = ScheduledChange {
            id: 0,
            deadline,
            user_id,
            updates,
            executed: false,
        };
        let id = self.shared.store.add_scheduled_change(&change)?;
        tracing::info!(change = id, user = user_id, deadline = %deadline, "scheduled configuration change");
        Ok(id)
    }

    /// Execute every scheduled change whose deadline is at or before
    /// `now`. Each change is committed independently; a failing change
    /// is reported in its outcome and does not stop the sweep. Every
    /// visited change is marked executed so it is never picked up
    /// twice.
    pub fn commit_due(&self, now: DateTime<Utc>) -> Result<Vec<SweepOutcome>> {
        let due = self.shared.store.due_changes(now)?;
        let mut outcomes = Vec::with_capacity(due.len());
        for change in due {
            let result = change
                .rehydrate()
                .and_then(|state| self.commit_state(&state));
            match &result {
                Ok(()) => {
                    tracing::info!(change = change.id, user = change.user_id, "executed scheduled change")
                }
                Err(e) => {
                    tracing::warn!(change = change.id, user = change.user_id, error = %e, "scheduled change failed")
                }
            }
            self.shared.store.mark_executed(change.id)?;
            outcomes.push(SweepOutcome {
                change_id: change.id,
                user_id: change.user_id,
                deadline: change.deadline,
                error: result.err().map(|e| e.to_string()),
            });
        }
        Ok(outcomes)
    }

    fn commit_state(&self, state: &TransactionState) -> Result<()> {
        for update in &state.updates {
            match update.target() {
                TargetKind::Kea => self.kea.commit_update(update)?,
            }
        }
        Ok(())
    }
}

/// Result of executing one due change during a sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepOutcome {
    pub change_id: i64,
    pub user_id: i64,
    pub deadline: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SweepOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
