//! Frame Engine
//!
//! Collects per-player input into a bounded pending buffer and commits
//! whole frames only when every registered player's input has arrived
//! (§4.6 "all-or-nothing commit"), or when [`force_tick`](FrameEngine::force_tick)
//! fills the gaps with blank input to keep the room moving.

use std::collections::BTreeMap;

use crate::sim::frame::Frame;
use crate::sim::input::{InputRecord, INPUT_WIRE_SIZE};

/// Maximum number of confirmed frames retained for replay/catch-up.
pub const MAX_FRAME_HISTORY: usize = 300;

/// Collects input and commits frames for one room.
#[derive(Debug)]
pub struct FrameEngine {
    current_frame: u32,
    player_count: usize,
    pending: BTreeMap<u32, BTreeMap<u16, [u8; INPUT_WIRE_SIZE]>>,
    history: Vec<Frame>,
}

impl FrameEngine {
    /// Start a frame engine for a room expecting `player_count` distinct
    /// input sources per frame.
    pub fn new(player_count: usize) -> Self {
        Self {
            current_frame: 0,
            player_count,
            pending: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    /// Current (not-yet-committed) frame id.
    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    /// Buffer one player's input for a future (or current) frame.
    ///
    /// Input for a frame that has already been committed is silently
    /// discarded. A second input for the same `(frame_id, player_id)`
    /// replaces the first (last-write-wins).
    pub fn add_input(&mut self, frame_id: u32, player_id: u16, data: [u8; INPUT_WIRE_SIZE]) {
        if frame_id < self.current_frame {
            return;
        }
        self.pending.entry(frame_id).or_default().insert(player_id, data);
    }

    /// Commit the current frame if every player's input for it has
    /// arrived. Returns the committed [`Frame`] and advances
    /// `current_frame`, or `None` if the frame is still incomplete.
    pub fn tick(&mut self, timestamp_ms: u64) -> Option<Frame> {
        let complete = self
            .pending
            .get(&self.current_frame)
            .map(|inputs| inputs.len() >= self.player_count)
            .unwrap_or(false);

        if !complete {
            return None;
        }

        let inputs = self.pending.remove(&self.current_frame).unwrap_or_default();
        let frame = Frame::confirmed(self.current_frame, inputs, timestamp_ms);
        self.commit(frame.clone());
        Some(frame)
    }

    /// Force the current frame to commit, filling any missing player's
    /// input with a blank record. Used when a slow client would
    /// otherwise stall the whole room.
    pub fn force_tick(&mut self, player_ids: &[u16], timestamp_ms: u64) -> Frame {
        let mut inputs = self.pending.remove(&self.current_frame).unwrap_or_default();
        for &player_id in player_ids {
            inputs
                .entry(player_id)
                .or_insert_with(|| InputRecord::blank(self.current_frame, player_id).to_bytes());
        }
        let frame = Frame::forced(self.current_frame, inputs, timestamp_ms);
        self.commit(frame.clone());
        frame
    }

    fn commit(&mut self, frame: Frame) {
        self.current_frame = self.current_frame.wrapping_add(1);
        self.history.push(frame);
        if self.history.len() > MAX_FRAME_HISTORY {
            self.history.remove(0);
        }
    }

    /// Committed frames still retained, oldest first.
    pub fn history(&self) -> &[Frame] {
        &self.history
    }

    /// Committed frames from `from_frame_id` (inclusive) onward, for
    /// reconnect catch-up (§4.9 `sync_frames`). Returns `None` if the
    /// requested starting frame has already fallen out of history.
    pub fn frames_since(&self, from_frame_id: u32) -> Option<&[Frame]> {
        let oldest = self.history.first()?.frame_id;
        if from_frame_id < oldest {
            return None;
        }
        let offset = (from_frame_id - oldest) as usize;
        self.history.get(offset..)
    }
}

/// FNV-1a hash over a byte string, used to derive a per-room PRNG seed
/// from the room id and start time without pulling in a new crate.
fn fnv1a(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c9dc5;
    const PRIME: u32 = 0x01000193;
    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Derive a room's PRNG seed from its id and the wall-clock time the
/// room started, so two rooms created in the same millisecond never
/// share a seed.
pub fn derive_room_seed(room_id: &[u8], start_time_millis: u64) -> u32 {
    let mut buf = Vec::with_capacity(room_id.len() + 4);
    buf.extend_from_slice(room_id);
    buf.extend_from_slice(&(start_time_millis as u32).to_le_bytes());
    fnv1a(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::entity::input_flags;

    fn record(frame_id: u32, player_id: u16) -> [u8; INPUT_WIRE_SIZE] {
        InputRecord {
            frame_id,
            player_id,
            flags: input_flags::MOVE_UP,
            target_x: 0,
            target_y: 0,
        }
        .to_bytes()
    }

    #[test]
    fn test_tick_waits_for_all_players() {
        let mut engine = FrameEngine::new(2);
        engine.add_input(0, 1, record(0, 1));
        assert!(engine.tick(0).is_none());

        engine.add_input(0, 2, record(0, 2));
        let frame = engine.tick(0).unwrap();
        assert_eq!(frame.frame_id, 0);
        assert!(frame.confirmed);
        assert_eq!(engine.current_frame(), 1);
    }

    #[test]
    fn test_stale_input_discarded() {
        let mut engine = FrameEngine::new(1);
        engine.add_input(0, 1, record(0, 1));
        engine.tick(0).unwrap();

        // Input for the already-committed frame is dropped.
        engine.add_input(0, 1, record(0, 1));
        assert!(engine.pending.get(&0).is_none());
    }

    #[test]
    fn test_duplicate_input_last_write_wins() {
        let mut engine = FrameEngine::new(1);
        let mut first = record(0, 1);
        first[6] = input_flags::JUMP;
        engine.add_input(0, 1, first);

        let mut second = record(0, 1);
        second[6] = input_flags::ATTACK;
        engine.add_input(0, 1, second);

        let frame = engine.tick(0).unwrap();
        assert_eq!(frame.input_for(1).unwrap().flags, input_flags::ATTACK);
    }

    #[test]
    fn test_force_tick_fills_missing_players() {
        let mut engine = FrameEngine::new(2);
        engine.add_input(0, 1, record(0, 1));

        let frame = engine.force_tick(&[1, 2], 0);
        assert!(!frame.confirmed);
        assert!(frame.input_for(2).is_some());
        assert_eq!(frame.input_for(2).unwrap().flags, 0);
        assert_eq!(engine.current_frame(), 1);
    }

    #[test]
    fn test_frames_since_returns_suffix() {
        let mut engine = FrameEngine::new(1);
        for i in 0..5u32 {
            engine.add_input(i, 1, record(i, 1));
            engine.tick(0).unwrap();
        }
        let suffix = engine.frames_since(2).unwrap();
        assert_eq!(suffix.len(), 3);
        assert_eq!(suffix[0].frame_id, 2);
    }

    #[test]
    fn test_frames_since_none_when_evicted() {
        let mut engine = FrameEngine::new(1);
        for i in 0..5u32 {
            engine.add_input(i, 1, record(i, 1));
            engine.tick(0).unwrap();
        }
        assert!(engine.frames_since(0).is_some());

        // Simulate eviction by requesting an older frame than history start.
        let oldest = engine.history().first().unwrap().frame_id;
        assert!(engine.frames_since(oldest.wrapping_sub(1)).is_none());
    }

    #[test]
    fn test_history_bounded_by_max_frame_history() {
        let mut engine = FrameEngine::new(1);
        for i in 0..(MAX_FRAME_HISTORY as u32 + 10) {
            engine.add_input(i, 1, record(i, 1));
            engine.tick(0).unwrap();
        }
        assert_eq!(engine.history().len(), MAX_FRAME_HISTORY);
    }

    #[test]
    fn test_room_seed_reproducible() {
        let a = derive_room_seed(b"room-1", 1_000);
        let b = derive_room_seed(b"room-1", 1_000);
        assert_eq!(a, b);
    }

    #[test]
    fn test_room_seed_differs_by_room_id() {
        let a = derive_room_seed(b"room-1", 1_000);
        let b = derive_room_seed(b"room-2", 1_000);
        assert_ne!(a, b);
    }
}
