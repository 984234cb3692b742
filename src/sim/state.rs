//! Authoritative Game State and Snapshot/Rollback
//!
//! [`GameState`] is the single deterministic state tree a room's
//! simulation advances tick by tick. It carries a bounded ring of
//! snapshots (§4.4) so the frame engine and the reconnect/catch-up
//! path can roll back to any recently-committed frame.

use std::collections::{BTreeMap, VecDeque};

use crate::core::hash::StateHasher;
use crate::core::rng::DeterministicRng;
use crate::sim::entity::Entity;

/// Maximum number of snapshots retained for rollback.
pub const SNAPSHOT_RING_CAPACITY: usize = 60;

/// A point-in-time copy of [`GameState`], cheap enough to take every
/// tick within the ring capacity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub frame_id: u32,
    pub entities: BTreeMap<i32, Entity>,
    pub player_binding: BTreeMap<u16, i32>,
    pub rng_state: u32,
    pub hash: String,
}

/// The authoritative simulation state for one room.
#[derive(Clone, Debug)]
pub struct GameState {
    pub frame_id: u32,
    pub entities: BTreeMap<i32, Entity>,
    pub player_binding: BTreeMap<u16, i32>,
    pub running: bool,
    pub paused: bool,
    pub rng: DeterministicRng,
    snapshots: VecDeque<Snapshot>,
}

impl GameState {
    /// Construct a fresh, not-yet-running state from a PRNG seed.
    pub fn new(seed: u32) -> Self {
        Self {
            frame_id: 0,
            entities: BTreeMap::new(),
            player_binding: BTreeMap::new(),
            running: false,
            paused: false,
            rng: DeterministicRng::new(seed),
            snapshots: VecDeque::with_capacity(SNAPSHOT_RING_CAPACITY),
        }
    }

    /// Insert or replace an entity.
    pub fn add_entity(&mut self, entity: Entity) {
        self.entities.insert(entity.id, entity);
    }

    /// Remove an entity by id, returning it if present.
    pub fn remove_entity(&mut self, id: i32) -> Option<Entity> {
        self.entities.remove(&id)
    }

    /// Borrow an entity by id.
    pub fn get_entity(&self, id: i32) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Bind a player id to the entity it controls.
    pub fn bind_player(&mut self, player_id: u16, entity_id: i32) {
        self.player_binding.insert(player_id, entity_id);
    }

    /// Advance `frame_id` by one. Physics/collision is the caller's
    /// responsibility (see [`crate::sim::physics`]); this only tracks
    /// the tick counter.
    pub fn advance_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
    }

    /// Compute the canonical state hash (§4.4): entities in id order,
    /// fields `id, x, y, vx, vy, w, h, hp, max_hp` in that order, as
    /// decimal text, MD5-digested.
    pub fn compute_state_hash(&self) -> String {
        let mut hasher = StateHasher::new();
        hasher.push_i32(self.frame_id as i32);
        for (id, entity) in &self.entities {
            hasher.push_i32(*id);
            hasher.push_i32(entity.x);
            hasher.push_i32(entity.y);
            hasher.push_i32(entity.vx);
            hasher.push_i32(entity.vy);
            hasher.push_i32(entity.w);
            hasher.push_i32(entity.h);
            hasher.push_i32(entity.hp);
            hasher.push_i32(entity.max_hp);
        }
        hasher.finalize()
    }

    /// Take a snapshot of the current state and push it onto the ring,
    /// evicting the oldest entry if the ring is full.
    pub fn save_snapshot(&mut self) -> Snapshot {
        let snapshot = Snapshot {
            frame_id: self.frame_id,
            entities: self.entities.clone(),
            player_binding: self.player_binding.clone(),
            rng_state: self.rng.state(),
            hash: self.compute_state_hash(),
        };
        if self.snapshots.len() == SNAPSHOT_RING_CAPACITY {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot.clone());
        snapshot
    }

    /// Find a retained snapshot for `frame_id`, if still in the ring.
    pub fn find_snapshot(&self, frame_id: u32) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.frame_id == frame_id)
    }

    /// Restore state from a retained snapshot. Returns `false` (state
    /// unchanged) if `frame_id` has already been evicted from the ring.
    pub fn restore_snapshot(&mut self, frame_id: u32) -> bool {
        let Some(snapshot) = self.find_snapshot(frame_id).cloned() else {
            return false;
        };
        self.frame_id = snapshot.frame_id;
        self.entities = snapshot.entities;
        self.player_binding = snapshot.player_binding;
        self.rng.set_state(snapshot.rng_state);
        true
    }

    /// Alias for [`restore_snapshot`](Self::restore_snapshot), named
    /// for the rollback call site (§4.10).
    pub fn rollback_to(&mut self, frame_id: u32) -> bool {
        self.restore_snapshot(frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::to_fixed;

    fn entity(id: i32) -> Entity {
        Entity::new(id, to_fixed(id as f64), 0, to_fixed(1.0), to_fixed(1.0), 100)
    }

    #[test]
    fn test_add_and_get_entity() {
        let mut state = GameState::new(1);
        state.add_entity(entity(1));
        assert!(state.get_entity(1).is_some());
        assert!(state.get_entity(2).is_none());
    }

    #[test]
    fn test_remove_entity() {
        let mut state = GameState::new(1);
        state.add_entity(entity(1));
        let removed = state.remove_entity(1);
        assert!(removed.is_some());
        assert!(state.get_entity(1).is_none());
    }

    #[test]
    fn test_state_hash_deterministic() {
        let mut a = GameState::new(42);
        a.add_entity(entity(1));
        a.add_entity(entity(2));

        let mut b = GameState::new(42);
        b.add_entity(entity(1));
        b.add_entity(entity(2));

        assert_eq!(a.compute_state_hash(), b.compute_state_hash());
    }

    #[test]
    fn test_state_hash_sensitive_to_entity_change() {
        let mut state = GameState::new(1);
        state.add_entity(entity(1));
        let before = state.compute_state_hash();

        state.entities.get_mut(&1).unwrap().hp -= 1;
        let after = state.compute_state_hash();

        assert_ne!(before, after);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut state = GameState::new(7);
        state.add_entity(entity(1));
        state.advance_frame();
        let snap = state.save_snapshot();
        assert_eq!(snap.frame_id, state.frame_id);

        state.add_entity(entity(2));
        state.advance_frame();

        assert!(state.restore_snapshot(snap.frame_id));
        assert!(state.get_entity(2).is_none());
        assert_eq!(state.frame_id, snap.frame_id);
    }

    #[test]
    fn test_restore_fails_for_unknown_frame() {
        let mut state = GameState::new(1);
        assert!(!state.restore_snapshot(999));
    }

    #[test]
    fn test_snapshot_ring_evicts_oldest() {
        let mut state = GameState::new(1);
        for i in 0..(SNAPSHOT_RING_CAPACITY as u32 + 5) {
            state.frame_id = i;
            state.save_snapshot();
        }
        assert!(state.find_snapshot(0).is_none());
        assert!(state.find_snapshot(SNAPSHOT_RING_CAPACITY as u32 + 4).is_some());
    }

    #[test]
    fn test_rollback_restores_rng_state() {
        let mut state = GameState::new(1);
        state.rng.next_uint32();
        let snap = state.save_snapshot();
        let saved_rng_state = state.rng.state();

        state.rng.next_uint32();
        state.rng.next_uint32();
        assert_ne!(state.rng.state(), saved_rng_state);

        state.rollback_to(snap.frame_id);
        assert_eq!(state.rng.state(), saved_rng_state);
    }
}
