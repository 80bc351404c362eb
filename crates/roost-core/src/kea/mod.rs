//! Kea target module.
//!
//! Implements the staged begin/apply/commit contract for Kea host
//! reservations. Begin prepares a change request (loading state and
//! taking daemon locks where the operation needs them), apply validates
//! the submitted host and stages one control command per daemon
//! association, and commit dispatches the staged commands in order,
//! writing the durable host row only after every dispatch succeeded.

pub mod command;
pub mod reservation;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app::AppRef;
use crate::error::{Result, RoostError};
use crate::host::Host;
use crate::kea::command::KeaCommand;
use crate::kea::reservation::{DeletedReservation, Reservation};
use crate::manager::{ChangeRequest, ManagerShared};
use crate::transaction::{Operation, Recipe, TargetKind, TransactionState, Update};

// ---------------------------------------------------------------------------
// Recipe
// ---------------------------------------------------------------------------

/// A staged control command bound to the app that should receive it.
/// The embedded [`AppRef`] carries the full addressing info, so commit
/// dispatches without further store reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppCommand {
    pub command: KeaCommand,
    pub app: AppRef,
}

/// Kea-specific transaction payload.
///
/// `host_before_update` is captured at begin time for update operations
/// and drives the delete half of the plan. `host_after_update` and
/// `host_id` carry what commit writes to the store once dispatch
/// succeeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeaRecipe {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<AppCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_before_update: Option<Host>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_after_update: Option<Host>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Command planning
// ---------------------------------------------------------------------------

fn reservation_add_commands(host: &Host) -> Result<Vec<AppCommand>> {
    let mut commands = Vec::with_capacity(host.local_hosts.len());
    for lh in &host.local_hosts {
        let daemon = lh
            .daemon
            .as_ref()
            .ok_or(RoostError::UnresolvedDaemon(host.id))?;
        let app = daemon
            .app
            .as_ref()
            .ok_or(RoostError::UnresolvedApp(host.id))?;
        let reservation = Reservation::new(host, lh, &daemon.name);
        let command = KeaCommand::new(
            "reservation-add",
            vec![daemon.name.clone()],
            Some(json!({ "reservation": serde_json::to_value(&reservation)? })),
        );
        commands.push(AppCommand {
            command,
            app: app.clone(),
        });
    }
    Ok(commands)
}

fn reservation_del_commands(host: &Host) -> Result<Vec<AppCommand>> {
    let mut commands = Vec::with_capacity(host.local_hosts.len());
    for lh in &host.local_hosts {
        let daemon = lh
            .daemon
            .as_ref()
            .ok_or(RoostError::UnresolvedDaemon(host.id))?;
        let app = daemon
            .app
            .as_ref()
            .ok_or(RoostError::UnresolvedApp(host.id))?;
        let deleted = DeletedReservation::from_host(host, lh.daemon_id)?;
        let command = KeaCommand::new(
            "reservation-del",
            vec![daemon.name.clone()],
            Some(serde_json::to_value(&deleted)?),
        );
        commands.push(AppCommand {
            command,
            app: app.clone(),
        });
    }
    Ok(commands)
}

/// Compute the command plan replacing `before` with `after`: one
/// `reservation-del` per association of `before`, then one
/// `reservation-add` per association of `after`. Deletes are planned
/// for retained daemons too, and all deletes precede all adds, so no
/// daemon holds two reservations with the same identifier while the
/// change is in flight.
pub fn plan_host_update(before: &Host, after: &Host) -> Result<Vec<AppCommand>> {
    let mut commands = reservation_del_commands(before)?;
    commands.extend(reservation_add_commands(after)?);
    Ok(commands)
}

fn missing_update(operation: Operation) -> RoostError {
    RoostError::MissingUpdate {
        target: TargetKind::Kea.to_string(),
        operation: operation.to_string(),
    }
}

fn recipe_gap(operation: Operation, what: &str) -> RoostError {
    RoostError::RecipeDecode {
        operation: operation.to_string(),
        reason: format!("missing {what}"),
    }
}

// ---------------------------------------------------------------------------
// KeaModule
// ---------------------------------------------------------------------------

/// Target module translating host reservation changes into Kea control
/// commands.
pub struct KeaModule {
    shared: Arc<ManagerShared>,
}

impl KeaModule {
    pub(crate) fn new(shared: Arc<ManagerShared>) -> Self {
        Self { shared }
    }

    /// First stage of adding a host. Creates the change request with an
    /// empty `host_add` update. No locks are taken; the affected
    /// daemons are unknown until apply.
    pub fn begin_host_add(&self) -> Result<ChangeRequest> {
        let state = TransactionState::new(Update::kea(Operation::HostAdd, Vec::new()));
        let mut request = ChangeRequest::new();
        request.begin(state, None)?;
        Ok(request)
    }

    /// Second stage of adding a host. Validates the daemon associations
    /// and stages one `reservation-add` per association.
    pub fn apply_host_add(&self, request: &mut ChangeRequest, host: &Host) -> Result<()> {
        host.ensure_dispatchable()?;
        let commands = reservation_add_commands(host)?;
        let update = request
            .state_mut()
            .update_for_mut(TargetKind::Kea, Operation::HostAdd)
            .ok_or_else(|| missing_update(Operation::HostAdd))?;
        update.daemon_ids = host.daemon_ids();
        let Recipe::Kea(recipe) = &mut update.recipe;
        recipe.commands = commands;
        recipe.host_after_update = Some(host.clone());
        request.mark_staged()
    }

    /// First stage of updating a host. Loads the current reservation,
    /// locks the daemons owning it, and snapshots it into the recipe as
    /// the base for diffing at apply time.
    pub fn begin_host_update(&self, host_id: i64) -> Result<ChangeRequest> {
        let host = self.shared.store.host(host_id)?;
        let daemon_ids = host.daemon_ids();
        let guard = self.shared.locks.lock(&daemon_ids)?;
        let mut update = Update::kea(Operation::HostUpdate, daemon_ids);
        let Recipe::Kea(recipe) = &mut update.recipe;
        recipe.host_before_update = Some(host);
        let mut request = ChangeRequest::new();
        request.begin(TransactionState::new(update), Some(guard))?;
        Ok(request)
    }

    /// Second stage of updating a host. Plans deletes from the begin
    /// snapshot followed by adds from the submitted host.
    pub fn apply_host_update(&self, request: &mut ChangeRequest, host: &Host) -> Result<()> {
        host.ensure_dispatchable()?;
        let update = request
            .state_mut()
            .update_for_mut(TargetKind::Kea, Operation::HostUpdate)
            .ok_or_else(|| missing_update(Operation::HostUpdate))?;
        let Recipe::Kea(recipe) = &mut update.recipe;
        let commands = {
            let before = recipe
                .host_before_update
                .as_ref()
                .ok_or(RoostError::MissingSnapshot(host.id))?;
            plan_host_update(before, host)?
        };
        recipe.commands = commands;
        recipe.host_after_update = Some(host.clone());
        request.mark_staged()
    }

    /// Stage the deletion of a host. Deletion has no separate begin
    /// stage; this creates a staged change request directly, with one
    /// `reservation-del` per daemon association.
    pub fn apply_host_delete(&self, host: &Host) -> Result<ChangeRequest> {
        host.ensure_dispatchable()?;
        let mut update = Update::kea(Operation::HostDelete, host.daemon_ids());
        {
            let Recipe::Kea(recipe) = &mut update.recipe;
            recipe.commands = reservation_del_commands(host)?;
            recipe.host_id = Some(host.id);
        }
        let mut request = ChangeRequest::new();
        request.begin(TransactionState::new(update), None)?;
        request.mark_staged()?;
        Ok(request)
    }

    /// Commit one update staged by this module: dispatch its commands
    /// in order and perform the durable mutation as the final step.
    pub(crate) fn commit_update(&self, update: &Update) -> Result<()> {
        let Recipe::Kea(recipe) = &update.recipe;
        match update.operation {
            Operation::HostAdd => self.commit_host_add(recipe),
            Operation::HostUpdate => self.commit_host_update(recipe),
            Operation::HostDelete => self.commit_host_delete(recipe),
        }
    }

    fn commit_host_add(&self, recipe: &KeaRecipe) -> Result<()> {
        let host = recipe
            .host_after_update
            .as_ref()
            .ok_or_else(|| recipe_gap(Operation::HostAdd, "host payload"))?;
        self.dispatch_all(recipe)?;
        self.shared.store.add_host(host)?;
        Ok(())
    }

    fn commit_host_update(&self, recipe: &KeaRecipe) -> Result<()> {
        let host = recipe
            .host_after_update
            .as_ref()
            .ok_or_else(|| recipe_gap(Operation::HostUpdate, "host payload"))?;
        self.dispatch_all(recipe)?;
        self.shared.store.update_host(host)
    }

    fn commit_host_delete(&self, recipe: &KeaRecipe) -> Result<()> {
        let host_id = recipe
            .host_id
            .ok_or_else(|| recipe_gap(Operation::HostDelete, "host id"))?;
        self.dispatch_all(recipe)?;
        self.shared.store.delete_host(host_id)
    }

    /// Send the staged commands strictly in order, evaluating each
    /// response before the next dispatch. The first failure aborts the
    /// remaining commands; transport errors and error statuses alike
    /// surface naming the command and the app it was addressed to.
    fn dispatch_all(&self, recipe: &KeaRecipe) -> Result<()> {
        for staged in &recipe.commands {
            let responses = self
                .shared
                .dispatcher
                .dispatch(&staged.app, &staged.command)
                .map_err(|e| RoostError::CommandFailed {
                    command: staged.command.command.clone(),
                    app: staged.app.name.clone(),
                    detail: e.to_string(),
                })?;
            for (i, response) in responses.iter().enumerate() {
                if response.is_error() {
                    // Responses come back in service list order.
                    let daemon = staged
                        .command
                        .service
                        .get(i)
                        .or_else(|| staged.command.service.first())
                        .map(String::as_str)
                        .unwrap_or("unknown");
                    return Err(RoostError::CommandFailed {
                        command: staged.command.command.clone(),
                        app: staged.app.name.clone(),
                        detail: response.status_detail(daemon),
                    });
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
