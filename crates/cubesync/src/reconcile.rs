//! Reconciliation: merging updates and snapshots into registries.
//!
//! # Server side
//!
//! [`apply_player_update`] folds one client report into the authoritative
//! registry (last writer wins, nothing validated) and [`build_snapshot`]
//! turns the whole registry into a `SERVER_UPDATE`.
//!
//! # Client side
//!
//! A [`Mirror`] is the client's view of the world: a registry, one render
//! proxy per entry, the set of identifiers seen in the latest snapshot, and
//! the client's own identifier. Merging a snapshot never touches the own
//! entry (the client is the authority for its own position and color), and
//! players missing from the latest snapshot are only dropped when
//! [`Mirror::drop_absent`] runs on its own cadence.

use std::collections::{HashMap, HashSet};

use cubesync_protocol::{Color, Message, PlayerId, PlayerState, Vec3};
use cubesync_session::{SessionError, SessionRegistry};

use crate::render::Renderer;

// ---------------------------------------------------------------------------
// Server merge
// ---------------------------------------------------------------------------

/// Overwrites the reported player's position and color.
///
/// # Errors
/// [`SessionError::UnknownPlayer`] if the player has no entry (for example
/// a report that raced the player's disconnect). Nothing is created.
pub fn apply_player_update(
    registry: &mut SessionRegistry,
    update: &PlayerState,
) -> Result<(), SessionError> {
    registry.apply_update(update)?;
    tracing::trace!(player_id = %update.id, "player update applied");
    Ok(())
}

/// A fresh `SERVER_UPDATE` listing every registered player, ordered by
/// identifier. Empty registries produce an empty list.
pub fn build_snapshot(registry: &SessionRegistry) -> Message {
    Message::ServerUpdate {
        players: registry.snapshot(),
    }
}

// ---------------------------------------------------------------------------
// Client mirror
// ---------------------------------------------------------------------------

/// The client's reconciled view of every player, with their render proxies.
pub struct Mirror<R: Renderer> {
    registry: SessionRegistry,
    proxies: HashMap<PlayerId, R::Handle>,
    /// Identifiers listed in the most recent snapshot.
    seen: HashSet<PlayerId>,
    own_id: Option<PlayerId>,
    renderer: R,
}

impl<R: Renderer> Mirror<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            registry: SessionRegistry::new(),
            proxies: HashMap::new(),
            seen: HashSet::new(),
            own_id: None,
            renderer,
        }
    }

    /// The identifier the server assigned to this client, if any.
    pub fn own_id(&self) -> Option<&PlayerId> {
        self.own_id.as_ref()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// The proxy for a player, if it has one.
    pub fn proxy(&self, id: &PlayerId) -> Option<R::Handle> {
        self.proxies.get(id).copied()
    }

    /// Whether the latest snapshot listed this player.
    pub fn was_seen(&self, id: &PlayerId) -> bool {
        self.seen.contains(id)
    }

    /// Records the identity assigned by the server and creates the own
    /// entry and proxy (origin, `color`).
    ///
    /// Returns `false` and changes nothing if an identity is already set.
    pub fn adopt_identity(&mut self, id: PlayerId, color: Color) -> bool {
        if self.own_id.is_some() {
            return false;
        }
        if !self.registry.contains(&id) {
            let state = PlayerState {
                id: id.clone(),
                position: Vec3::ZERO,
                color,
            };
            self.sync_proxy(&state);
            // Checked above, so this cannot collide.
            let _ = self.registry.create(state);
        }
        self.own_id = Some(id);
        true
    }

    /// Clears the own identity. Entries and proxies are kept.
    pub fn forget_identity(&mut self) -> Option<PlayerId> {
        self.own_id.take()
    }

    /// Merges one snapshot.
    ///
    /// Unknown players get an entry and a proxy; known players are
    /// overwritten; the own entry is left alone. Afterwards the seen set is
    /// exactly the snapshot's identifiers. Merging the same snapshot twice
    /// has the same effect as merging it once.
    ///
    /// Returns how many new players were created.
    pub fn merge_snapshot(&mut self, players: &[PlayerState]) -> usize {
        let mut created = 0;
        for player in players {
            if self.own_id.as_ref() == Some(&player.id) {
                continue;
            }
            self.sync_proxy(player);
            match self.registry.get_mut(&player.id) {
                Some(entry) => {
                    entry.position = player.position;
                    entry.color = player.color;
                }
                None => {
                    let _ = self.registry.create(player.clone());
                    created += 1;
                    tracing::info!(player_id = %player.id, "player appeared");
                }
            }
        }
        self.seen = players.iter().map(|p| p.id.clone()).collect();
        created
    }

    /// Removes every player absent from the latest snapshot, destroying
    /// their proxies. The own entry is never dropped.
    ///
    /// Returns the removed identifiers.
    pub fn drop_absent(&mut self) -> Vec<PlayerId> {
        let stale: Vec<PlayerId> = self
            .registry
            .ids()
            .filter(|id| !self.seen.contains(*id))
            .filter(|id| self.own_id.as_ref() != Some(*id))
            .cloned()
            .collect();

        for id in &stale {
            let _ = self.registry.remove(id);
            if let Some(handle) = self.proxies.remove(id) {
                self.renderer.destroy(handle);
            }
            tracing::info!(player_id = %id, "player dropped");
        }
        stale
    }

    /// Reads the own state back from the own proxy and stores it in the
    /// own registry entry.
    ///
    /// `None` without an identity or proxy.
    pub fn capture_own_state(&mut self) -> Option<PlayerState> {
        let id = self.own_id.as_ref()?;
        let handle = self.proxies.get(id).copied()?;
        let state = PlayerState {
            id: id.clone(),
            position: self.renderer.position(handle)?,
            color: self.renderer.color(handle)?,
        };
        if let Some(entry) = self.registry.get_mut(id) {
            entry.position = state.position;
            entry.color = state.color;
        }
        Some(state)
    }

    /// Moves the own proxy by `delta`. `false` without an identity, or if
    /// the result would not be finite (the proxy then stays put).
    pub fn translate_own(&mut self, delta: Vec3) -> bool {
        let Some(handle) = self.own_handle() else {
            return false;
        };
        let Some(position) = self.renderer.position(handle) else {
            return false;
        };
        let moved = position + delta;
        if !moved.is_finite() {
            tracing::warn!(?position, ?delta, "rejected move to a non-finite position");
            return false;
        }
        self.renderer.set_position(handle, moved);
        true
    }

    /// Recolors the own proxy. `false` without an identity or for a
    /// non-finite color.
    pub fn set_own_color(&mut self, color: Color) -> bool {
        if !color.is_finite() {
            tracing::warn!(?color, "rejected non-finite color");
            return false;
        }
        let Some(handle) = self.own_handle() else {
            return false;
        };
        self.renderer.set_color(handle, color);
        true
    }

    fn own_handle(&self) -> Option<R::Handle> {
        self.own_id
            .as_ref()
            .and_then(|id| self.proxies.get(id).copied())
    }

    /// Creates the player's proxy if needed and moves/recolors it.
    fn sync_proxy(&mut self, state: &PlayerState) {
        let renderer = &mut self.renderer;
        let handle = *self
            .proxies
            .entry(state.id.clone())
            .or_insert_with(|| renderer.create());
        self.renderer.set_position(handle, state.position);
        self.renderer.set_color(handle, state.color);
    }
}
