//! Undoable, rebasable write commands.
//!
//! An action is what a store persists to its log. Applying it writes rows;
//! removing it restores the rows exactly as they were before it was
//! applied. Rebasing recomputes what removal must restore after other
//! actions have been applied underneath it.
//!
//! Actions are a closed set. Model-specific behavior (preparation and
//! validation) comes from the [`Model`] type parameter at build and check
//! time; replay only needs the model kind, which the action carries.

use crate::error::{SyncError, SyncResult};
use crate::model::{FieldErrors, Fields, Model};
use crate::registry::Registry;
use cloak_core::{CoreError, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Pre-update values of the changed fields, per row id.
///
/// `None` means the field was absent before the update.
pub type Priors = BTreeMap<String, BTreeMap<String, Option<String>>>;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// A persisted write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Inserts rows.
    Create(CreateAction),
    /// Changes fields on existing rows.
    Update(UpdateAction),
}

/// Inserts new rows, each with a fresh id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAction {
    /// Action id.
    pub id: String,
    /// Model kind.
    pub model: String,
    /// Creation time in Unix milliseconds.
    pub time: u64,
    /// Rows to insert.
    pub objects: Vec<Row>,
}

/// Sets fields on existing rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAction {
    /// Action id.
    pub id: String,
    /// Model kind.
    pub model: String,
    /// Creation time in Unix milliseconds.
    pub time: u64,
    /// Target row ids.
    pub ids: Vec<String>,
    /// New field values.
    pub update: Fields,
    /// Values to restore on removal.
    pub priors: Priors,
}

impl CreateAction {
    /// Builds a create for `M`, assigning each object a new id.
    pub fn build<M: Model>(objects: Vec<Fields>) -> Self {
        let objects = objects
            .into_iter()
            .map(|fields| Row::new(Uuid::new_v4().to_string(), M::prepare(fields)))
            .collect();
        Self {
            id: Uuid::new_v4().to_string(),
            model: M::KIND.to_string(),
            time: now_millis(),
            objects,
        }
    }

    fn ids(&self) -> Vec<String> {
        self.objects.iter().map(|o| o.id.clone()).collect()
    }
}

impl UpdateAction {
    /// Builds an update for `M`, capturing priors from the current rows.
    pub fn build<M: Model>(
        registry: &Registry,
        ids: Vec<String>,
        update: Fields,
    ) -> SyncResult<Self> {
        if update.contains_key("id") {
            return Err(CoreError::IdImmutable.into());
        }
        let mut action = Self {
            id: Uuid::new_v4().to_string(),
            model: M::KIND.to_string(),
            time: now_millis(),
            ids,
            update: M::prepare(update),
            priors: Priors::new(),
        };
        action.priors = action.read_priors(registry)?;
        Ok(action)
    }

    fn read_priors(&self, registry: &Registry) -> SyncResult<Priors> {
        let table = registry.table(&self.model)?;
        let mut priors = Priors::new();
        for id in &self.ids {
            let current = table.get(id)?.map(|row| row.fields).unwrap_or_default();
            let changed = self
                .update
                .iter()
                .filter(|(field, value)| current.get(*field) != Some(*value))
                .map(|(field, _)| (field.clone(), current.get(field).cloned()))
                .collect();
            priors.insert(id.clone(), changed);
        }
        Ok(priors)
    }
}

impl Action {
    /// Returns the action id.
    pub fn id(&self) -> &str {
        match self {
            Action::Create(a) => &a.id,
            Action::Update(a) => &a.id,
        }
    }

    /// Returns the model kind.
    pub fn model(&self) -> &str {
        match self {
            Action::Create(a) => &a.model,
            Action::Update(a) => &a.model,
        }
    }

    /// Returns the action kind, e.g. `"todo.create"`.
    pub fn kind(&self) -> String {
        match self {
            Action::Create(a) => format!("{}.create", a.model),
            Action::Update(a) => format!("{}.update", a.model),
        }
    }

    /// Returns the creation time in Unix milliseconds.
    pub fn time(&self) -> u64 {
        match self {
            Action::Create(a) => a.time,
            Action::Update(a) => a.time,
        }
    }

    /// Validates the action against `M` and the current rows.
    ///
    /// Returns one entry per failing object (create) or target id (update);
    /// an empty list means the action is safe to apply.
    pub fn errors<M: Model>(&self, registry: &Registry) -> SyncResult<Vec<FieldErrors>> {
        let shape = M::shape();
        let errors: Vec<FieldErrors> = match self {
            Action::Create(a) => a
                .objects
                .iter()
                .map(|o| shape.validate(&o.fields))
                .collect(),
            Action::Update(a) => {
                let table = registry.table(&a.model)?;
                let mut errors = Vec::with_capacity(a.ids.len());
                for id in &a.ids {
                    match table.get(id)? {
                        Some(row) => {
                            let mut merged = row.fields;
                            merged.extend(a.update.clone());
                            errors.push(shape.validate(&merged));
                        }
                        None => {
                            let mut missing = FieldErrors::new();
                            missing.insert("id", format!("no row with id {id}"));
                            errors.push(missing);
                        }
                    }
                }
                errors
            }
        };
        Ok(errors.into_iter().filter(|e| !e.is_empty()).collect())
    }

    /// Writes the action's effect. Returns the affected row ids.
    pub fn apply(&self, registry: &Registry) -> SyncResult<Vec<String>> {
        let table = registry.table(self.model())?;
        match self {
            Action::Create(a) => {
                table.create(&a.objects)?;
                Ok(a.ids())
            }
            Action::Update(a) => {
                table.update(&a.ids, &a.update)?;
                Ok(a.ids.clone())
            }
        }
    }

    /// Reverts the action's effect.
    ///
    /// A create deletes its rows. An update writes back only the fields its
    /// priors name: recorded values are restored and fields that were absent
    /// are cleared.
    pub fn remove(&self, registry: &Registry) -> SyncResult<()> {
        let table = registry.table(self.model())?;
        match self {
            Action::Create(a) => table.remove(&a.ids())?,
            Action::Update(a) => {
                for (id, prior) in &a.priors {
                    let target = std::slice::from_ref(id);
                    let restore: Fields = prior
                        .iter()
                        .filter_map(|(f, v)| v.as_ref().map(|v| (f.clone(), v.clone())))
                        .collect();
                    let absent: Vec<String> = prior
                        .iter()
                        .filter(|(_, v)| v.is_none())
                        .map(|(f, _)| f.clone())
                        .collect();
                    table.update(target, &restore)?;
                    if !absent.is_empty() {
                        table.unset(target, &absent)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Recomputes the action against the current rows.
    ///
    /// Creates are unchanged. Updates keep their target and new values and
    /// capture fresh priors.
    pub fn rebase(self, registry: &Registry) -> SyncResult<Action> {
        match self {
            Action::Create(a) => Ok(Action::Create(a)),
            Action::Update(mut a) => {
                a.priors = a.read_priors(registry)?;
                Ok(Action::Update(a))
            }
        }
    }

    /// Serializes the action to CBOR.
    pub fn encode(&self) -> SyncResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes).map_err(|e| SyncError::Codec(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserializes an action from CBOR.
    pub fn decode(bytes: &[u8]) -> SyncResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| SyncError::Codec(e.to_string()))
    }
}

impl From<CreateAction> for Action {
    fn from(action: CreateAction) -> Self {
        Action::Create(action)
    }
}

impl From<UpdateAction> for Action {
    fn from(action: UpdateAction) -> Self {
        Action::Update(action)
    }
}
