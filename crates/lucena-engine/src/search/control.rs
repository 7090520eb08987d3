//! Search limits and per-search working state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use shakmaty::{Color, Move};

use crate::position::Position;
use crate::search::heuristics::{CounterMoveTable, KillerTable};
use crate::time::{allocate_time, TimeMs};

/// Index into the per-side limit arrays.
pub(crate) fn side_index(color: Color) -> usize {
    match color {
        Color::White => 0,
        Color::Black => 1,
    }
}

/// Budget for one search. Zero (or an empty move list) means
/// unconstrained on that axis.
#[derive(Debug, Clone, Default)]
pub struct SearchLimits {
    /// Remaining clock per side, white first.
    pub time_left: [TimeMs; 2],
    /// Increment per side, white first.
    pub increment: [TimeMs; 2],
    /// Moves until the next time control.
    pub moves_to_go: u32,
    /// Depth cap; defaults to `MAX_PLY` when zero.
    pub max_depth: i32,
    /// Node cap.
    pub max_nodes: u64,
    /// Fixed per-move time cap.
    pub max_time: TimeMs,
    /// When non-empty, only these root moves are searched.
    pub search_moves: Vec<Move>,
}

impl SearchLimits {
    /// Limit by depth alone.
    pub fn depth(depth: i32) -> Self {
        Self {
            max_depth: depth,
            ..Self::default()
        }
    }

    fn use_tournament_time(&self) -> bool {
        (self.time_left[0] | self.time_left[1]) != 0
    }

    fn use_fixed_time(&self) -> bool {
        self.max_time > 0
    }

    fn use_node_limit(&self) -> bool {
        self.max_nodes > 0
    }
}

/// Mutable state owned by one search: the working position, the node
/// counter, the wall clock, and the refutation tables.
pub struct SearchData {
    /// Working copy of the root position, mutated through do/undo.
    pub position: Position,
    /// The budget this search runs under.
    pub limits: SearchLimits,
    /// Nodes entered so far.
    pub nb_nodes: u64,
    /// Killer slots per ply.
    pub killers: KillerTable,
    /// Counter-move table.
    pub counters: CounterMoveTable,
    pub(crate) aborted: bool,
    start: Instant,
    allocated: TimeMs,
    stop: Arc<AtomicBool>,
}

impl SearchData {
    /// Set up the working state for one search.
    pub fn new(position: Position, limits: SearchLimits, stop: Arc<AtomicBool>) -> Self {
        let side = side_index(position.side_to_move());
        let allocated = allocate_time(
            limits.time_left[side],
            limits.increment[side],
            limits.moves_to_go,
        );
        Self {
            position,
            limits,
            nb_nodes: 0,
            killers: KillerTable::new(),
            counters: CounterMoveTable::new(),
            aborted: false,
            start: Instant::now(),
            allocated,
            stop,
        }
    }

    /// Milliseconds since the search started.
    pub fn elapsed(&self) -> TimeMs {
        self.start.elapsed().as_millis() as TimeMs
    }

    fn budget_exceeded(&self) -> bool {
        if self.limits.use_tournament_time() && self.elapsed() >= self.allocated {
            return true;
        }
        if self.limits.use_fixed_time() && self.elapsed() >= self.limits.max_time {
            return true;
        }
        if self.limits.use_node_limit() && self.nb_nodes >= self.limits.max_nodes {
            return true;
        }
        false
    }

    /// Whether the in-flight search must unwind.
    ///
    /// The clock and the stop flag are sampled only every 1024 nodes;
    /// once tripped, the answer stays `true` for the rest of the search.
    pub fn should_stop(&mut self) -> bool {
        if self.aborted {
            return true;
        }
        if self.nb_nodes % 1024 != 0 {
            return false;
        }
        if self.stop.load(Ordering::Relaxed) || self.budget_exceeded() {
            self.aborted = true;
        }
        self.aborted
    }

    /// Whether iterative deepening should start another iteration.
    ///
    /// Unlike [`should_stop`](Self::should_stop) this consults the clock
    /// directly; between iterations there is no hot path to protect.
    pub fn should_stop_iterating(&mut self) -> bool {
        if self.aborted {
            return true;
        }
        if self.stop.load(Ordering::Relaxed) || self.budget_exceeded() {
            self.aborted = true;
        }
        self.aborted
    }

    /// Record a quiet beta-cutoff move in the killer slots for `ply`.
    pub fn update_killers(&mut self, m: Move, ply: usize) {
        self.killers.store(ply, m);
    }

    /// Record `m` as the refutation of the opponent's last move.
    /// Does nothing at the root of the game.
    pub fn update_counter(&mut self, m: Move) {
        if let Some(prev) = self.position.previous_move() {
            if let Some(piece) = self.position.piece_at(prev.to()) {
                self.counters.store(piece, prev.to(), m);
            }
        }
    }

    /// The counter move recorded against the opponent's last move.
    pub fn counter_move(&self) -> Option<Move> {
        let prev = self.position.previous_move()?;
        let piece = self.position.piece_at(prev.to())?;
        self.counters.get(piece, prev.to())
    }
}
