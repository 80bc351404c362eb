//! Transaction state shared by all target modules.
//!
//! A change request carries one `TransactionState`, which holds one
//! `Update` per logical sub-change. Live updates keep a typed `Recipe`;
//! raw structured data appears only at the durable-store boundary, where
//! `PersistedUpdate` rows are written by the scheduler and decoded back
//! when a due change is rehydrated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Result, RoostError};
use crate::kea::KeaRecipe;

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Managed system type an update is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Kea,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Kea => "kea",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    HostAdd,
    HostUpdate,
    HostDelete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::HostAdd => "host_add",
            Operation::HostUpdate => "host_update",
            Operation::HostDelete => "host_delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Live updates
// ---------------------------------------------------------------------------

/// Module-defined payload of an update. Only the module that created a
/// recipe interprets it; the manager treats it as opaque.
#[derive(Debug, Clone, PartialEq)]
pub enum Recipe {
    Kea(KeaRecipe),
}

impl Recipe {
    pub fn target(&self) -> TargetKind {
        match self {
            Recipe::Kea(_) => TargetKind::Kea,
        }
    }
}

/// One logical sub-change of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub operation: Operation,
    /// Daemons whose configuration this update touches. Advisory locks
    /// taken at begin time cover exactly this set.
    pub daemon_ids: Vec<i64>,
    pub recipe: Recipe,
}

impl Update {
    pub fn kea(operation: Operation, daemon_ids: Vec<i64>) -> Self {
        Self {
            operation,
            daemon_ids,
            recipe: Recipe::Kea(KeaRecipe::default()),
        }
    }

    pub fn target(&self) -> TargetKind {
        self.recipe.target()
    }

    /// Flatten into the row shape the scheduler stores.
    pub fn to_persisted(&self) -> Result<PersistedUpdate> {
        let recipe = match &self.recipe {
            Recipe::Kea(recipe) => serde_json::to_value(recipe)?,
        };
        Ok(PersistedUpdate {
            target: self.target(),
            operation: self.operation,
            daemon_ids: self.daemon_ids.clone(),
            recipe,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionState {
    pub updates: Vec<Update>,
    /// Set when this state was rehydrated from a scheduled row rather
    /// than built in the current request flow.
    pub scheduled: bool,
}

impl TransactionState {
    pub fn new(update: Update) -> Self {
        Self {
            updates: vec![update],
            scheduled: false,
        }
    }

    pub fn first_update(&self) -> Option<&Update> {
        self.updates.first()
    }

    pub fn update_for(&self, target: TargetKind, operation: Operation) -> Option<&Update> {
        self.updates
            .iter()
            .find(|u| u.target() == target && u.operation == operation)
    }

    pub fn update_for_mut(
        &mut self,
        target: TargetKind,
        operation: Operation,
    ) -> Option<&mut Update> {
        self.updates
            .iter_mut()
            .find(|u| u.target() == target && u.operation == operation)
    }

    /// Every daemon id named by any update, in staging order.
    pub fn daemon_ids(&self) -> Vec<i64> {
        let mut ids = Vec::new();
        for update in &self.updates {
            for id in &update.daemon_ids {
                if !ids.contains(id) {
                    ids.push(*id);
                }
            }
        }
        ids
    }
}

// ---------------------------------------------------------------------------
// Persisted shape
// ---------------------------------------------------------------------------

/// Update row as stored with a scheduled change. The recipe is kept as
/// raw structured data so the row survives even while module recipe
/// types evolve; decoding happens on rehydration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedUpdate {
    pub target: TargetKind,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub daemon_ids: Vec<i64>,
    pub recipe: Value,
}

impl PersistedUpdate {
    pub fn rehydrate(&self) -> Result<Update> {
        let recipe = match self.target {
            TargetKind::Kea => Recipe::Kea(serde_json::from_value(self.recipe.clone()).map_err(
                |e| RoostError::RecipeDecode {
                    operation: self.operation.to_string(),
                    reason: e.to_string(),
                },
            )?),
        };
        Ok(Update {
            operation: self.operation,
            daemon_ids: self.daemon_ids.clone(),
            recipe,
        })
    }
}

/// Durable record of a deferred change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledChange {
    #[serde(default)]
    pub id: i64,
    pub deadline: DateTime<Utc>,
    pub user_id: i64,
    pub updates: Vec<PersistedUpdate>,
    /// Set once a sweep has driven this change through commit, whether
    /// the commit succeeded or failed. Executed rows are never retried.
    #[serde(default)]
    pub executed: bool,
}

impl ScheduledChange {
    /// Rebuild an in-memory state equivalent to the one that was
    /// persisted. The result is tagged `scheduled`.
    pub fn rehydrate(&self) -> Result<TransactionState> {
        let mut updates = Vec::with_capacity(self.updates.len());
        for persisted in &self.updates {
            updates.push(persisted.rehydrate()?);
        }
        Ok(TransactionState {
            updates,
            scheduled: true,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
