//! Iterative-deepening principal-variation search.

pub mod control;
pub mod heuristics;
pub mod ordering;
pub mod tt;

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use shakmaty::Move;

use crate::eval::evaluate;
use crate::position::Position;
use crate::time::TimeMs;

use control::{SearchData, SearchLimits};
use ordering::MovePicker;
use tt::{Bound, TranspositionTable};

/// Search score in centipawns.
pub type Score = i32;

/// Unreachable bound for the alpha-beta window.
pub const INF: Score = 30_000;

/// Base mate score; `MATE_SCORE - ply` is "mate delivered at `ply`".
pub const MATE_SCORE: Score = 29_000;

/// Scores beyond this are forced mates.
pub const MATE_THRESHOLD: Score = 28_000;

/// Hard ceiling on search depth and PV length.
pub const MAX_PLY: usize = 128;

/// Default transposition table size in megabytes.
const DEFAULT_TT_MB: usize = 16;

/// Kind of node being searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeType {
    Root,
    Pv,
    NonPv,
}

/// A principal variation: the engine's expected line of play.
#[derive(Debug, Clone, Default)]
pub struct PvLine {
    moves: Vec<Move>,
}

impl PvLine {
    fn clear(&mut self) {
        self.moves.clear();
    }

    /// Replace this line with `m` followed by `child`.
    fn load(&mut self, m: Move, child: &PvLine) {
        self.moves.clear();
        self.moves.push(m);
        self.moves.extend_from_slice(&child.moves);
    }

    /// The moves of the line, best first.
    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    /// The first move of the line.
    pub fn first(&self) -> Option<Move> {
        self.moves.first().copied()
    }
}

/// Progress report emitted after each completed iteration and once at
/// the end of the search. The PV slice is borrowed; copy it out if it
/// must outlive the callback.
#[derive(Debug)]
pub struct SearchEvent<'a> {
    /// Last completed depth.
    pub depth: i32,
    /// Principal variation at that depth.
    pub pv: &'a [Move],
    /// Score of the PV head, side-to-move perspective.
    pub score: Score,
    /// Nodes visited so far.
    pub nodes: u64,
    /// Milliseconds since the search started.
    pub elapsed: TimeMs,
    /// Transposition table occupancy in permille.
    pub hashfull: usize,
}

/// Receiver of search progress. Callbacks run on the searching thread
/// and must not call back into the engine.
pub trait SearchHandler {
    /// A depth iteration completed.
    fn on_search_progress(&mut self, event: &SearchEvent);
    /// The search is over; `event` carries the final result.
    fn on_search_finish(&mut self, event: &SearchEvent);
}

/// The searcher: owns the root position, the transposition table, and
/// the cooperative stop flag.
pub struct Engine {
    root: Position,
    tt: TranspositionTable,
    stop: Arc<AtomicBool>,
    searching: bool,
    aborted: bool,
}

impl Engine {
    /// Engine at the starting position with the default table size.
    pub fn new() -> Self {
        Self::with_tt_size(DEFAULT_TT_MB)
    }

    /// Engine with a transposition table of `mb` megabytes.
    pub fn with_tt_size(mb: usize) -> Self {
        Self {
            root: Position::new(),
            tt: TranspositionTable::new(mb),
            stop: Arc::new(AtomicBool::new(false)),
            searching: false,
            aborted: false,
        }
    }

    /// Replace the root position.
    pub fn set_position(&mut self, position: Position) {
        self.root = position;
    }

    /// The current root position.
    pub fn position(&self) -> &Position {
        &self.root
    }

    /// Forget everything learned from previous games.
    pub fn new_game(&mut self) {
        self.tt.clear();
    }

    /// Resize the transposition table, dropping its contents.
    pub fn resize_tt(&mut self, mb: usize) {
        self.tt = TranspositionTable::new(mb);
    }

    /// Request cooperative termination of the running search.
    pub fn stop(&self) {
        self.stop.store(true, AtomicOrdering::Release);
    }

    /// Shared handle to the stop flag, for embedders that move the
    /// engine onto a worker thread.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Whether a search is currently running.
    pub fn is_searching(&self) -> bool {
        self.searching
    }

    /// Whether the last search ended by budget exhaustion or stop
    /// request rather than by reaching its depth cap.
    pub fn search_aborted(&self) -> bool {
        self.aborted
    }

    /// Run a search under `limits`, reporting progress to `handler`.
    ///
    /// Runs on the calling thread; embedders wanting an async search
    /// move the engine onto a worker. The root position is copied and
    /// restored-by-construction, so it is unchanged afterwards.
    ///
    /// # Panics
    ///
    /// Panics if a search is already running on this engine.
    pub fn search<H: SearchHandler>(&mut self, limits: &SearchLimits, handler: &mut H) {
        assert!(!self.searching, "search started while already searching");
        self.searching = true;
        self.aborted = false;
        self.stop.store(false, AtomicOrdering::Release);
        self.tt.new_generation();

        let mut sd = SearchData::new(self.root.clone(), limits.clone(), Arc::clone(&self.stop));
        self.iterate(&mut sd, handler);

        self.aborted = sd.aborted;
        self.searching = false;
    }

    /// Run one fixed-depth pass from the root, filling `pv`.
    ///
    /// Iterative deepening is one call per depth over the same
    /// [`SearchData`], which is what carries the killer and counter-move
    /// tables from one iteration to the next. Exposed for embedders
    /// that drive iterations over externally owned search state.
    pub fn search_iteration(&mut self, sd: &mut SearchData, depth: i32, pv: &mut PvLine) -> Score {
        pv.clear();
        self.pv_search(sd, -INF, INF, depth, 0, pv, NodeType::Root)
    }

    /// The iterative-deepening driver.
    fn iterate<H: SearchHandler>(&mut self, sd: &mut SearchData, handler: &mut H) {
        let max_depth = if sd.limits.max_depth > 0 {
            sd.limits.max_depth.min(MAX_PLY as i32)
        } else {
            MAX_PLY as i32
        };

        let mut best_pv = PvLine::default();
        let mut best_score: Score = 0;
        let mut completed_depth = 0;
        let mut pv = PvLine::default();

        for depth in 1..=max_depth {
            let score = self.search_iteration(sd, depth, &mut pv);

            // An aborted iteration is discarded; the previous depth's
            // line stays authoritative
            if sd.aborted {
                break;
            }

            best_pv = pv.clone();
            best_score = score;
            completed_depth = depth;

            handler.on_search_progress(&SearchEvent {
                depth,
                pv: best_pv.moves(),
                score,
                nodes: sd.nb_nodes,
                elapsed: sd.elapsed(),
                hashfull: self.tt.hashfull(),
            });

            if depth < max_depth && sd.should_stop_iterating() {
                break;
            }
        }

        handler.on_search_finish(&SearchEvent {
            depth: completed_depth,
            pv: best_pv.moves(),
            score: best_score,
            nodes: sd.nb_nodes,
            elapsed: sd.elapsed(),
            hashfull: self.tt.hashfull(),
        });
    }

    /// Negamax with alpha-beta over the staged move picker.
    #[allow(clippy::too_many_arguments)]
    fn pv_search(
        &mut self,
        sd: &mut SearchData,
        mut alpha: Score,
        beta: Score,
        depth: i32,
        ply: usize,
        pv: &mut PvLine,
        node: NodeType,
    ) -> Score {
        sd.nb_nodes += 1;

        if node != NodeType::Root && sd.should_stop() {
            return alpha;
        }
        if depth <= 0 {
            return self.q_search(sd, alpha, beta, 0, ply, pv);
        }
        if ply >= MAX_PLY {
            return evaluate(&sd.position);
        }

        let key = sd.position.hash_key();
        let mut tt_move = None;
        if let Some(entry) = self.tt.probe(key, ply) {
            tt_move = entry.best_move;
            // PV nodes keep searching to resolve the actual line
            if node == NodeType::NonPv && entry.depth >= depth {
                match entry.bound {
                    Bound::Exact => return entry.score,
                    Bound::Lower if entry.score >= beta => return entry.score,
                    Bound::Upper if entry.score <= alpha => return entry.score,
                    _ => {}
                }
            }
        }

        let [killer1, killer2] = sd.killers.get(ply);
        let counter = sd.counter_move();
        let picker = MovePicker::main(tt_move, killer1, killer2, counter);

        let mut best_score = -INF;
        let mut best_move: Option<Move> = None;
        let mut move_count = 0u32;
        let mut child_pv = PvLine::default();

        let completed = picker.enumerate(sd, |sd, m| {
            if node == NodeType::Root
                && !sd.limits.search_moves.is_empty()
                && !sd.limits.search_moves.contains(&m)
            {
                return true;
            }
            move_count += 1;

            let child_node = if node != NodeType::NonPv && move_count == 1 {
                NodeType::Pv
            } else {
                NodeType::NonPv
            };

            child_pv.clear();
            sd.position.do_move(m);
            let score = -self.pv_search(sd, -beta, -alpha, depth - 1, ply + 1, &mut child_pv, child_node);
            sd.position.undo_move(m);

            if sd.aborted {
                return false;
            }

            if score > best_score {
                best_score = score;
                if score > alpha {
                    alpha = score;
                    best_move = Some(m);
                    pv.load(m, &child_pv);
                }
            }

            if score >= beta {
                if !sd.position.is_tactical(&m) {
                    sd.update_killers(m, ply);
                    sd.update_counter(m);
                }
                self.tt.store(key, Some(m), score, Bound::Lower, depth, ply);
                return false;
            }
            true
        });

        // Abandon the node on abort: no store, no heuristics
        if sd.aborted {
            return alpha;
        }
        if !completed {
            return best_score;
        }

        if move_count == 0 {
            return if sd.position.in_check() {
                -(MATE_SCORE - ply as Score)
            } else {
                0
            };
        }

        let bound = if best_move.is_some() {
            Bound::Exact
        } else {
            Bound::Upper
        };
        self.tt.store(key, best_move, best_score, bound, depth, ply);

        best_score
    }

    /// Quiescence: resolve tactical noise before trusting the static
    /// evaluation.
    fn q_search(
        &mut self,
        sd: &mut SearchData,
        mut alpha: Score,
        beta: Score,
        depth: i32,
        ply: usize,
        pv: &mut PvLine,
    ) -> Score {
        sd.nb_nodes += 1;

        if sd.should_stop() {
            return alpha;
        }
        if ply >= MAX_PLY {
            return evaluate(&sd.position);
        }

        let in_check = sd.position.in_check();
        let mut best_score = -INF;

        // Stand pat: the side to move may decline every tactic.
        // Not available in check, where evasions are forced.
        if !in_check {
            let stand_pat = evaluate(&sd.position);
            if stand_pat >= beta {
                return stand_pat;
            }
            if stand_pat > alpha {
                alpha = stand_pat;
            }
            best_score = stand_pat;
        }

        let key = sd.position.hash_key();
        let tt_move = self.tt.probe(key, ply).and_then(|entry| entry.best_move);
        let picker = MovePicker::quiescence(tt_move);

        let mut move_count = 0u32;
        let mut child_pv = PvLine::default();

        picker.enumerate(sd, |sd, m| {
            move_count += 1;

            child_pv.clear();
            sd.position.do_move(m);
            let score = -self.q_search(sd, -beta, -alpha, depth - 1, ply + 1, &mut child_pv);
            sd.position.undo_move(m);

            if sd.aborted {
                return false;
            }

            if score > best_score {
                best_score = score;
                if score > alpha {
                    alpha = score;
                    pv.load(m, &child_pv);
                }
            }

            score < beta
        });

        if in_check && move_count == 0 {
            return -(MATE_SCORE - ply as Score);
        }

        best_score
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("tt", &self.tt)
            .field("searching", &self.searching)
            .field("aborted", &self.aborted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Handler that records every event.
    #[derive(Default)]
    struct Recorder {
        progress: Vec<(i32, Vec<Move>, Score, u64)>,
        finish: Option<(i32, Vec<Move>, Score, u64)>,
    }

    impl SearchHandler for Recorder {
        fn on_search_progress(&mut self, event: &SearchEvent) {
            self.progress
                .push((event.depth, event.pv.to_vec(), event.score, event.nodes));
        }

        fn on_search_finish(&mut self, event: &SearchEvent) {
            self.finish = Some((event.depth, event.pv.to_vec(), event.score, event.nodes));
        }
    }

    fn search_fen(fen: &str, depth: i32) -> (Engine, Recorder) {
        let mut engine = Engine::new();
        engine.set_position(fen.parse().unwrap());
        let mut recorder = Recorder::default();
        engine.search(&SearchLimits::depth(depth), &mut recorder);
        (engine, recorder)
    }

    #[test]
    fn depth_one_finds_a_legal_move() {
        let mut engine = Engine::new();
        let mut recorder = Recorder::default();
        engine.search(&SearchLimits::depth(1), &mut recorder);
        let (depth, pv, _, _) = recorder.finish.unwrap();
        assert_eq!(depth, 1);
        let first = pv[0];
        assert!(engine.position().is_legal(&first));
        assert!(!engine.search_aborted());
    }

    #[test]
    fn qsearch_stands_pat_on_quiet_position() {
        let mut engine = Engine::new();
        let mut sd = SearchData::new(
            Position::new(),
            SearchLimits::default(),
            engine.stop_flag(),
        );
        let mut pv = PvLine::default();
        let score = engine.q_search(&mut sd, -INF, INF, 0, 0, &mut pv);
        assert_eq!(score, evaluate(&Position::new()));
        assert_eq!(sd.nb_nodes, 1);
        assert!(pv.moves().is_empty());
    }

    #[test]
    fn finds_back_rank_mate_in_one() {
        let (_, recorder) = search_fen("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1", 3);
        let (_, pv, score, _) = recorder.finish.unwrap();
        assert!(score >= MATE_SCORE - 2, "expected mate score, got {score}");
        let mating = pv[0];
        assert_eq!(mating.role(), shakmaty::Role::Rook);
        assert_eq!(mating.to(), shakmaty::Square::A8);
    }

    #[test]
    fn stalemate_scores_zero_with_empty_pv() {
        let (engine, recorder) = search_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", 5);
        let (_, pv, score, _) = recorder.finish.unwrap();
        assert_eq!(score, 0);
        assert!(pv.is_empty());
        assert!(!engine.search_aborted());
    }

    #[test]
    fn mated_side_reports_mate_against_it() {
        // Back-rank mate already delivered
        let (_, recorder) = search_fen("R5k1/5ppp/8/8/8/8/5PPP/6K1 b - - 0 1", 2);
        let (_, pv, score, _) = recorder.finish.unwrap();
        assert_eq!(score, -MATE_SCORE);
        assert!(pv.is_empty());
    }

    #[test]
    fn progress_events_cover_every_depth() {
        let (_, recorder) = search_fen(
            "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4",
            4,
        );
        let depths: Vec<i32> = recorder.progress.iter().map(|(d, ..)| *d).collect();
        assert_eq!(depths, vec![1, 2, 3, 4]);
        // Node counts never decrease across iterations
        let nodes: Vec<u64> = recorder.progress.iter().map(|(.., n)| *n).collect();
        assert!(nodes.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn search_leaves_root_position_untouched() {
        let fen = "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4";
        let (engine, _) = search_fen(fen, 4);
        assert_eq!(engine.position().fen(), fen);
    }

    #[test]
    fn node_budget_is_respected_within_check_granularity() {
        let mut engine = Engine::new();
        let mut recorder = Recorder::default();
        let limits = SearchLimits {
            max_nodes: 10_000,
            max_depth: 20,
            ..SearchLimits::default()
        };
        engine.search(&limits, &mut recorder);

        let (_, _, _, nodes) = recorder.finish.unwrap();
        assert!(nodes <= 10_000 + 1024, "nodes: {nodes}");
        assert!(engine.search_aborted());
    }

    #[test]
    fn search_resets_prior_stop_and_abort_state() {
        let mut engine = Engine::new();
        // A stale stop request from before the search must not leak in
        engine.stop();
        let mut recorder = Recorder::default();
        engine.search(&SearchLimits::depth(2), &mut recorder);
        assert!(!engine.search_aborted());
        assert_eq!(recorder.progress.len(), 2);
    }

    #[test]
    fn root_restriction_searches_only_listed_moves() {
        let mut engine = Engine::new();
        let e4 = engine.position().parse_uci_move("e2e4").unwrap();
        let mut recorder = Recorder::default();
        let limits = SearchLimits {
            max_depth: 3,
            search_moves: vec![e4],
            ..SearchLimits::default()
        };
        engine.search(&limits, &mut recorder);
        let (_, pv, _, _) = recorder.finish.unwrap();
        assert_eq!(pv[0], e4);
    }

    #[test]
    fn deeper_search_still_finds_the_mate() {
        // Killers and the TT from earlier iterations must not corrupt
        // the mate line at higher depths
        let (_, recorder) = search_fen("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1", 6);
        let (_, pv, score, _) = recorder.finish.unwrap();
        assert!(score >= MATE_SCORE - 2);
        assert_eq!(pv[0].to(), shakmaty::Square::A8);
    }

    #[test]
    fn pv_grows_with_depth() {
        let (_, recorder) = search_fen(
            "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4",
            4,
        );
        let (depth, pv, _, _) = recorder.finish.unwrap();
        assert_eq!(depth, 4);
        assert!(pv.len() >= 2, "PV too short: {}", pv.len());
    }

    #[test]
    fn repeated_searches_on_warm_tt_stay_sound() {
        let mut engine = Engine::new();
        engine.set_position("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1".parse().unwrap());
        for _ in 0..2 {
            let mut recorder = Recorder::default();
            engine.search(&SearchLimits::depth(4), &mut recorder);
            let (_, pv, score, _) = recorder.finish.unwrap();
            assert!(score >= MATE_SCORE - 2);
            assert_eq!(pv[0].to(), shakmaty::Square::A8);
        }
    }
}
