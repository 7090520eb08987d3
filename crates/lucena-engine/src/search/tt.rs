//! Transposition table with depth- and generation-based replacement.

use shakmaty::Move;

use crate::search::{Score, MATE_THRESHOLD};

/// Bound kind stored with a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Empty slot.
    None,
    /// The stored score is exact (PV node).
    Exact,
    /// The search failed high; the true score is at least the stored one.
    Lower,
    /// The search failed low; the true score is at most the stored one.
    Upper,
}

/// One table slot.
///
/// The upper 32 bits of the Zobrist key disambiguate positions that map
/// to the same index; a fragment mismatch reads as "not found".
#[derive(Clone, Copy)]
struct TtEntry {
    key: u32,
    best_move: Option<Move>,
    score: i16,
    depth: u8,
    bound: Bound,
    generation: u8,
}

impl Default for TtEntry {
    fn default() -> Self {
        Self {
            key: 0,
            best_move: None,
            score: 0,
            depth: 0,
            bound: Bound::None,
            generation: 0,
        }
    }
}

/// Result of a successful probe, with the score already re-based to the
/// probing ply.
#[derive(Debug, Clone)]
pub struct TtProbe {
    /// Best move from a previous search of this position.
    pub best_move: Option<Move>,
    /// Score, mate distances relative to the probing ply.
    pub score: Score,
    /// Bound kind of the stored score.
    pub bound: Bound,
    /// Depth the stored score was searched to.
    pub depth: i32,
}

/// Convert a score into its stored, ply-independent form.
///
/// Mate scores encode distance from the root, which differs between two
/// paths reaching the same position. Stored entries hold distance from
/// the node instead.
fn score_to_tt(score: Score, ply: usize) -> i16 {
    let adjusted = if score > MATE_THRESHOLD {
        score + ply as Score
    } else if score < -MATE_THRESHOLD {
        score - ply as Score
    } else {
        score
    };
    adjusted as i16
}

/// Undo [`score_to_tt`] relative to the probing ply.
fn score_from_tt(score: i16, ply: usize) -> Score {
    let score = Score::from(score);
    if score > MATE_THRESHOLD {
        score - ply as Score
    } else if score < -MATE_THRESHOLD {
        score + ply as Score
    } else {
        score
    }
}

/// Fixed-capacity hash table of search results.
pub struct TranspositionTable {
    entries: Box<[TtEntry]>,
    mask: u64,
    generation: u8,
}

impl TranspositionTable {
    /// Create a table of roughly `mb` megabytes, rounded down to a power
    /// of two entries.
    pub fn new(mb: usize) -> Self {
        let bytes = mb.max(1) * 1024 * 1024;
        let count = (bytes / std::mem::size_of::<TtEntry>())
            .next_power_of_two()
            >> 1;
        let count = count.max(1);
        Self {
            entries: vec![TtEntry::default(); count].into_boxed_slice(),
            mask: (count - 1) as u64,
            generation: 0,
        }
    }

    /// Drop every entry, keeping the allocation.
    pub fn clear(&mut self) {
        self.entries.fill(TtEntry::default());
        self.generation = 0;
    }

    /// Advance the generation counter. Called once per search.
    pub fn new_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Look up `key`, re-basing any mate score to `ply`.
    pub fn probe(&self, key: u64, ply: usize) -> Option<TtProbe> {
        let entry = &self.entries[(key & self.mask) as usize];
        if entry.bound == Bound::None || entry.key != (key >> 32) as u32 {
            return None;
        }
        Some(TtProbe {
            best_move: entry.best_move,
            score: score_from_tt(entry.score, ply),
            bound: entry.bound,
            depth: i32::from(entry.depth),
        })
    }

    /// Store a search result for `key`.
    ///
    /// Replaces when the slot is empty, stale (older generation),
    /// searched no deeper than `depth`, or when the new bound is exact.
    pub fn store(
        &mut self,
        key: u64,
        best_move: Option<Move>,
        score: Score,
        bound: Bound,
        depth: i32,
        ply: usize,
    ) {
        let index = (key & self.mask) as usize;
        let existing = &self.entries[index];

        let replace = existing.bound == Bound::None
            || existing.generation != self.generation
            || depth >= i32::from(existing.depth)
            || bound == Bound::Exact;
        if !replace {
            return;
        }

        self.entries[index] = TtEntry {
            key: (key >> 32) as u32,
            best_move,
            score: score_to_tt(score, ply),
            depth: depth.clamp(0, 255) as u8,
            bound,
            generation: self.generation,
        };
    }

    /// Occupancy estimate in permille, sampled over the first 1000 slots.
    pub fn hashfull(&self) -> usize {
        let sample = self.entries.len().min(1000);
        let used = self.entries[..sample]
            .iter()
            .filter(|e| e.bound != Bound::None)
            .count();
        used * 1000 / sample
    }
}

impl std::fmt::Debug for TranspositionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranspositionTable")
            .field("entries", &self.entries.len())
            .field("generation", &self.generation)
            .finish()
    }
}
