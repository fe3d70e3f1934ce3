//! The session registry: last-known state of every player.
//!
//! # Ordering
//!
//! Entries live in a `BTreeMap` keyed by [`PlayerId`], so iteration is
//! always in identifier order. [`SessionRegistry::snapshot`] relies on this
//! to produce snapshots ordered by identifier without sorting.
//!
//! # Concurrency note
//!
//! Not thread-safe by itself. A registry is owned by exactly one server or
//! client and only touched from its frame update.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use cubesync_protocol::{PlayerId, PlayerState};

use crate::SessionError;

/// Mapping from player identifier to that player's last-known state.
///
/// ## Lifecycle
///
/// ```text
/// create() ──→ apply_update() / get_mut() ... ──→ remove()
/// ```
#[derive(Debug, Default)]
pub struct SessionRegistry {
    players: BTreeMap<PlayerId, PlayerState>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new entry.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyRegistered`] if an entry with the
    /// same identifier exists. The existing entry is left untouched.
    pub fn create(
        &mut self,
        state: PlayerState,
    ) -> Result<&mut PlayerState, SessionError> {
        match self.players.entry(state.id.clone()) {
            Entry::Occupied(_) => Err(SessionError::AlreadyRegistered(state.id)),
            Entry::Vacant(slot) => {
                tracing::debug!(player_id = %state.id, "registry entry created");
                Ok(slot.insert(state))
            }
        }
    }

    /// Overwrites the position and color of an existing entry with the
    /// reported values. Last writer wins; nothing is validated.
    ///
    /// # Errors
    /// Returns [`SessionError::UnknownPlayer`] if no entry exists. The
    /// update is not applied and no entry is created.
    pub fn apply_update(
        &mut self,
        update: &PlayerState,
    ) -> Result<(), SessionError> {
        let entry = self
            .players
            .get_mut(&update.id)
            .ok_or_else(|| SessionError::UnknownPlayer(update.id.clone()))?;
        entry.position = update.position;
        entry.color = update.color;
        Ok(())
    }

    /// Removes an entry and returns its last state.
    ///
    /// # Errors
    /// Returns [`SessionError::UnknownPlayer`] if no entry exists.
    pub fn remove(
        &mut self,
        id: &PlayerId,
    ) -> Result<PlayerState, SessionError> {
        let state = self
            .players
            .remove(id)
            .ok_or_else(|| SessionError::UnknownPlayer(id.clone()))?;
        tracing::debug!(player_id = %id, "registry entry removed");
        Ok(state)
    }

    /// Looks up an entry.
    pub fn get(&self, id: &PlayerId) -> Option<&PlayerState> {
        self.players.get(id)
    }

    /// Looks up an entry for in-place modification.
    pub fn get_mut(&mut self, id: &PlayerId) -> Option<&mut PlayerState> {
        self.players.get_mut(id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.players.contains_key(id)
    }

    /// All identifiers, in order.
    pub fn ids(&self) -> impl Iterator<Item = &PlayerId> {
        self.players.keys()
    }

    /// All entries, in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    /// A fresh copy of every entry, ordered by identifier. Empty when the
    /// registry is empty.
    pub fn snapshot(&self) -> Vec<PlayerState> {
        self.players.values().cloned().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
