//! Client-Side Predictor
//!
//! Speculative local simulation ahead of the authoritative frame
//! stream (§4.10). Every predicted frame stores the input guess it was
//! built from; when the real [`Frame`] for that frame id arrives, a
//! mismatch triggers a snapshot restore and a replay of every
//! still-pending speculative frame on top of the corrected state.
//!
//! New relative to the teacher (`rune-relic-bevy` is a rendering
//! client, not a rollback predictor) — written in the same
//! `BTreeMap`-for-determinism, `Result`-propagating style as
//! `sim::state`/`sim::engine`.

use std::collections::BTreeMap;

use crate::core::fixed::Fixed;
use crate::network::protocol::StateSnapshot;
use crate::sim::entity::input_flags;
use crate::sim::frame::Frame;
use crate::sim::input::{InputRecord, INPUT_WIRE_SIZE};
use crate::sim::physics::{self, PhysicsConfig};
use crate::sim::state::GameState;

/// A speculatively-committed frame: the input guess it was built from,
/// kept so [`ClientPredictor::reconcile`] can detect a mismatch and
/// replay with the corrected input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PredictedRecord {
    pub guessed_inputs: BTreeMap<u16, [u8; INPUT_WIRE_SIZE]>,
}

/// Speculative-execution predictor for one local player.
pub struct ClientPredictor {
    local_player_id: u16,
    state: GameState,
    predicted: BTreeMap<u32, PredictedRecord>,
    physics_config: PhysicsConfig,
    dt_ms: i64,
    move_speed: Fixed,
    rollback_count: u32,
    /// Each remote player's most recently confirmed input, used to
    /// rebuild later pending frames' guesses during rollback replay
    /// instead of re-applying stale guesses (§4.10 step 2).
    last_confirmed_inputs: BTreeMap<u16, [u8; INPUT_WIRE_SIZE]>,
}

impl ClientPredictor {
    /// Start predicting from an authoritative starting state.
    pub fn new(local_player_id: u16, state: GameState, dt_ms: i64, move_speed: Fixed) -> Self {
        Self {
            local_player_id,
            state,
            predicted: BTreeMap::new(),
            physics_config: PhysicsConfig::default(),
            dt_ms,
            move_speed,
            rollback_count: 0,
            last_confirmed_inputs: BTreeMap::new(),
        }
    }

    /// Discard all local state and restore from a server-provided
    /// snapshot (`resync_full`, §4.9), clearing every pending
    /// prediction — they were built against state the snapshot just
    /// superseded.
    pub fn apply_resync(&mut self, snapshot: &StateSnapshot) {
        snapshot.restore_into(&mut self.state);
        self.predicted.clear();
        self.last_confirmed_inputs.clear();
    }

    /// The predictor's current (possibly speculative) state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// How many times a server correction has forced a rollback.
    pub fn rollback_count(&self) -> u32 {
        self.rollback_count
    }

    /// Speculatively advance one frame: apply `local_input` for the
    /// local player and `guessed_remote` for every other bound player
    /// (typically their last-known input, or blank). Snapshots the
    /// pre-frame state so [`reconcile`](Self::reconcile) can roll back
    /// to it later. Returns the frame id just predicted.
    pub fn predict_tick(
        &mut self,
        local_input: [u8; INPUT_WIRE_SIZE],
        guessed_remote: &BTreeMap<u16, [u8; INPUT_WIRE_SIZE]>,
    ) -> u32 {
        let frame_id = self.state.frame_id;
        self.state.save_snapshot();

        let mut inputs = guessed_remote.clone();
        inputs.insert(self.local_player_id, local_input);
        self.apply_inputs(&inputs);

        self.predicted.insert(frame_id, PredictedRecord { guessed_inputs: inputs });
        self.state.advance_frame();
        frame_id
    }

    /// Reconcile a predicted frame against the server's authoritative
    /// version. A matching guess just drops the pending record; a
    /// mismatch rolls back to the pre-frame snapshot, replays the
    /// authoritative input, then replays every later still-pending
    /// speculative frame on top of the corrected state.
    ///
    /// Does nothing if `authoritative.frame_id` was never predicted
    /// locally (already reconciled, or prediction never ran ahead) or
    /// its snapshot has since aged out of the ring.
    pub fn reconcile(&mut self, authoritative: &Frame) {
        let frame_id = authoritative.frame_id;
        for (&player_id, bytes) in &authoritative.inputs {
            if player_id != self.local_player_id {
                self.last_confirmed_inputs.insert(player_id, *bytes);
            }
        }

        let Some(predicted) = self.predicted.get(&frame_id) else {
            return;
        };

        if predicted.guessed_inputs == authoritative.inputs {
            self.predicted.remove(&frame_id);
            return;
        }

        self.rollback_count += 1;

        if !self.state.restore_snapshot(frame_id) {
            // Snapshot already evicted; caller must trigger a full resync.
            return;
        }

        self.apply_inputs(&authoritative.inputs);
        self.state.advance_frame();
        self.predicted.remove(&frame_id);

        // Later pending frames were predicted with guesses that are now
        // stale: rebuild each remote player's guess from the
        // most-recently-confirmed input before replaying, so a frame the
        // authoritative data already corrected doesn't re-diverge.
        let later_frames: Vec<u32> = self.predicted.keys().copied().filter(|&f| f > frame_id).collect();
        for later_frame in later_frames {
            let mut rebuilt = self.predicted.get(&later_frame).unwrap().guessed_inputs.clone();
            for (&player_id, bytes) in &self.last_confirmed_inputs {
                if player_id != self.local_player_id {
                    rebuilt.insert(player_id, *bytes);
                }
            }
            self.apply_inputs(&rebuilt);
            self.state.advance_frame();
            self.predicted.insert(later_frame, PredictedRecord { guessed_inputs: rebuilt });
        }
    }

    fn apply_inputs(&mut self, inputs: &BTreeMap<u16, [u8; INPUT_WIRE_SIZE]>) {
        for (player_id, bytes) in inputs {
            let Some(record) = InputRecord::from_bytes(bytes) else { continue };
            let Some(&entity_id) = self.state.player_binding.get(player_id) else { continue };
            if let Some(entity) = self.state.entities.get_mut(&entity_id) {
                entity.apply_input(record.flags & input_flags::ALL, self.move_speed);
            }
        }
        physics::update(&mut self.state.entities, self.dt_ms, &self.physics_config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::to_fixed;
    use crate::sim::entity::Entity;

    fn bootstrap(local_player_id: u16) -> ClientPredictor {
        let mut state = GameState::new(1);
        state.add_entity(Entity::new(1, 0, 0, to_fixed(1.0), to_fixed(1.0), 100));
        state.bind_player(local_player_id, 1);
        ClientPredictor::new(local_player_id, state, 16, to_fixed(5.0))
    }

    fn input(flags: u8) -> [u8; INPUT_WIRE_SIZE] {
        InputRecord { frame_id: 0, player_id: 1, flags, target_x: 0, target_y: 0 }.to_bytes()
    }

    #[test]
    fn test_correct_guess_does_not_rollback() {
        let mut predictor = bootstrap(1);
        let guess = BTreeMap::new();
        let frame_id = predictor.predict_tick(input(input_flags::MOVE_RIGHT), &guess);

        let mut authoritative_inputs = BTreeMap::new();
        authoritative_inputs.insert(1u16, input(input_flags::MOVE_RIGHT));
        let frame = Frame::confirmed(frame_id, authoritative_inputs, 0);

        predictor.reconcile(&frame);
        assert_eq!(predictor.rollback_count(), 0);
    }

    #[test]
    fn test_mismatched_guess_triggers_rollback() {
        let mut predictor = bootstrap(1);
        let guess = BTreeMap::new();
        let frame_id = predictor.predict_tick(input(input_flags::MOVE_RIGHT), &guess);

        let mut authoritative_inputs = BTreeMap::new();
        authoritative_inputs.insert(1u16, input(input_flags::MOVE_LEFT));
        let frame = Frame::confirmed(frame_id, authoritative_inputs, 0);

        predictor.reconcile(&frame);
        assert_eq!(predictor.rollback_count(), 1);
    }

    #[test]
    fn test_rollback_converges_to_authoritative_trajectory() {
        // A predictor that always guesses wrong should end up in the
        // same place as a plain state fed only authoritative input.
        let mut predictor = bootstrap(1);
        let mut reference = GameState::new(1);
        reference.add_entity(Entity::new(1, 0, 0, to_fixed(1.0), to_fixed(1.0), 100));
        reference.bind_player(1, 1);

        let authoritative_flags = [input_flags::MOVE_RIGHT, input_flags::MOVE_UP, input_flags::MOVE_LEFT];

        for &flags in &authoritative_flags {
            // Predictor always guesses the opposite of what actually happened.
            let wrong_guess = if flags == input_flags::MOVE_RIGHT { input_flags::MOVE_LEFT } else { input_flags::MOVE_RIGHT };
            let frame_id = predictor.predict_tick(input(wrong_guess), &BTreeMap::new());

            let mut authoritative_inputs = BTreeMap::new();
            authoritative_inputs.insert(1u16, input(flags));
            let frame = Frame::confirmed(frame_id, authoritative_inputs.clone(), 0);
            predictor.reconcile(&frame);

            if let Some(record) = Frame::confirmed(frame_id, authoritative_inputs, 0).input_for(1) {
                if let Some(entity) = reference.entities.get_mut(&1) {
                    entity.apply_input(record.flags, to_fixed(5.0));
                }
                physics::update(&mut reference.entities, 16, &PhysicsConfig::default());
                reference.advance_frame();
            }
        }

        assert_eq!(predictor.state().entities.get(&1), reference.entities.get(&1));
        assert!(predictor.rollback_count() > 0);
    }

    #[test]
    fn test_reconcile_ignores_unknown_frame() {
        let mut predictor = bootstrap(1);
        let frame = Frame::confirmed(999, BTreeMap::new(), 0);
        predictor.reconcile(&frame);
        assert_eq!(predictor.rollback_count(), 0);
    }
}
