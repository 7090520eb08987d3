//! Staged move ordering.
//!
//! The picker yields moves in the order most likely to cause a beta
//! cutoff: transposition move, then (out of check) tacticals split by
//! static exchange, killers, counter move, quiets split by score sign,
//! and finally the deferred bad tacticals and quiets. In check the
//! evasion stage replaces everything after the transposition move.
//!
//! Each stage scores and sorts its whole batch before yielding, so the
//! MVV-LVA and threat heuristics stay globally ordered within a stage.

use shakmaty::{attacks, Bitboard, Move, Role};

use crate::eval::material;
use crate::position::threats::{threat_map, threatened_pieces, ThreatMap};
use crate::position::{MoveCategory, Position};
use crate::search::control::SearchData;
use crate::search::Score;

/// How much static-exchange loss a "good" tactical may carry: a minor
/// for a minor trade stays good, a rook for a minor does not.
const SEE_TOLERANCE: Score = -50;

#[derive(Clone, Copy)]
struct ScoredMove {
    mv: Move,
    score: Score,
}

fn sort_descending(moves: &mut [ScoredMove]) {
    moves.sort_by(|a, b| b.score.cmp(&a.score));
}

/// Which stages the picker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerMode {
    /// Full ordering for the main search.
    Main,
    /// Quiescence: transposition move, evasions in check, and tacticals
    /// that do not lose material. Everything else is skipped.
    Quiescence,
}

/// Staged, lazy enumerator of legal moves for one node.
pub struct MovePicker {
    mode: PickerMode,
    tt_move: Option<Move>,
    refutations: [Option<Move>; 3],
}

impl MovePicker {
    /// Picker for a main-search node.
    ///
    /// `killer1` and `killer2` must differ unless both are `None`.
    pub fn main(
        tt_move: Option<Move>,
        killer1: Option<Move>,
        killer2: Option<Move>,
        counter: Option<Move>,
    ) -> Self {
        debug_assert!(killer1.is_none() || killer1 != killer2);
        Self {
            mode: PickerMode::Main,
            tt_move,
            refutations: [killer1, killer2, counter],
        }
    }

    /// Picker for a quiescence node.
    pub fn quiescence(tt_move: Option<Move>) -> Self {
        Self {
            mode: PickerMode::Quiescence,
            tt_move,
            refutations: [None; 3],
        }
    }

    /// Drive `handler` over the moves in stage order.
    ///
    /// The handler returns `false` to stop the enumeration (a beta
    /// cutoff); `enumerate` then returns `false` as well. No move is
    /// yielded twice.
    pub fn enumerate<H>(&self, sd: &mut SearchData, mut handler: H) -> bool
    where
        H: FnMut(&mut SearchData, Move) -> bool,
    {
        // Transposition move: only legality is required, it need not
        // survive move generation
        if let Some(tt) = self.tt_move {
            if sd.position.is_legal(&tt) {
                if !handler(sd, tt) {
                    return false;
                }
            }
        }

        // In check every legal move is an evasion and no later stage runs
        if sd.position.in_check() {
            let mut evasions: Vec<ScoredMove> = sd
                .position
                .moves(MoveCategory::Evasions)
                .into_iter()
                .filter(|m| Some(*m) != self.tt_move)
                .map(|m| ScoredMove {
                    score: score_evasion(&sd.position, &m),
                    mv: m,
                })
                .collect();
            sort_descending(&mut evasions);

            for entry in &evasions {
                if !handler(sd, entry.mv) {
                    return false;
                }
            }
            return true;
        }

        // Tacticals, MVV-LVA ordered before the static-exchange split
        let mut tacticals: Vec<ScoredMove> = Vec::new();
        for m in sd.position.moves(MoveCategory::Tactical) {
            if Some(m) == self.tt_move {
                continue;
            }
            if self.mode == PickerMode::Quiescence && !sd.position.see(&m, 0) {
                continue;
            }
            tacticals.push(ScoredMove {
                score: score_tactical(&m),
                mv: m,
            });
        }
        sort_descending(&mut tacticals);

        let mut bad_tacticals: Vec<ScoredMove> = Vec::new();
        for entry in &tacticals {
            if self.mode == PickerMode::Main && !sd.position.see(&entry.mv, SEE_TOLERANCE) {
                bad_tacticals.push(*entry);
                continue;
            }
            if !handler(sd, entry.mv) {
                return false;
            }
        }

        if self.mode == PickerMode::Quiescence {
            return true;
        }

        // Killers, then the counter move; each must be quiet, legal, and
        // new to this enumeration
        for (slot, refutation) in self.refutations.iter().enumerate() {
            let Some(m) = *refutation else { continue };
            if Some(m) == self.tt_move {
                continue;
            }
            if slot == 2 && (self.refutations[0] == Some(m) || self.refutations[1] == Some(m)) {
                continue;
            }
            if sd.position.is_tactical(&m) || !sd.position.is_legal(&m) {
                continue;
            }
            if !handler(sd, m) {
                return false;
            }
        }

        // Quiets, threat-aware; negative scores go to the back
        let map = threat_map(sd.position.board(), sd.position.side_to_move());
        let threatened = threatened_pieces(sd.position.board(), sd.position.side_to_move(), &map);

        let mut quiets: Vec<ScoredMove> = Vec::new();
        for m in sd.position.moves(MoveCategory::Quiet) {
            if Some(m) == self.tt_move || self.refutations.contains(&Some(m)) {
                continue;
            }
            quiets.push(ScoredMove {
                score: score_quiet(&sd.position, &map, threatened, &m),
                mv: m,
            });
        }
        sort_descending(&mut quiets);

        let mut bad_quiets: Vec<ScoredMove> = Vec::new();
        for entry in &quiets {
            if entry.score < 0 {
                bad_quiets.push(*entry);
                continue;
            }
            if !handler(sd, entry.mv) {
                return false;
            }
        }

        for entry in &bad_tacticals {
            if !handler(sd, entry.mv) {
                return false;
            }
        }

        for entry in &bad_quiets {
            if !handler(sd, entry.mv) {
                return false;
            }
        }

        true
    }
}

/// MVV-LVA: most valuable victim first, least valuable attacker breaking
/// ties.
fn score_tactical(m: &Move) -> Score {
    let victim = m.capture().map_or(0, material::value);
    victim - material::role_index(m.role()) as Score
}

/// Captures order like tacticals; quiet evasions rank behind them.
fn score_evasion(pos: &Position, m: &Move) -> Score {
    if pos.is_capture(m) {
        score_tactical(m)
    } else {
        0
    }
}

/// Score a quiet move: light pieces first, big bonuses for stepping a
/// threatened piece out of danger, a nudge for giving check.
fn score_quiet(pos: &Position, map: &ThreatMap, threatened: Bitboard, m: &Move) -> Score {
    // Promotions are tactical; one generated here is scored out of the way
    if m.promotion().is_some() {
        return -100;
    }

    let role = m.role();
    let to = m.to();
    let mut score = 6 - material::role_index(role) as Score;

    if m.from().is_some_and(|from| threatened.contains(from)) {
        score += match role {
            Role::Queen if !map.by_rooks.contains(to) => 1000,
            Role::Rook if !map.by_minors.contains(to) => 500,
            Role::Knight | Role::Bishop if !map.by_pawns.contains(to) => 300,
            _ => 0,
        };
    }

    if gives_check_from(pos, role, to) {
        score += 10;
    }

    score
}

/// Whether a piece of `role` on `to` would attack the enemy king.
/// Occupancy is taken as it stands; the moving piece's own shadow is a
/// known approximation shared with the capture scorer.
fn gives_check_from(pos: &Position, role: Role, to: shakmaty::Square) -> bool {
    let board = pos.board();
    let Some(king) = board.king_of(!pos.side_to_move()) else {
        return false;
    };
    let occupied = board.occupied();
    match role {
        Role::Pawn => attacks::pawn_attacks(pos.side_to_move(), to).contains(king),
        Role::Knight => attacks::knight_attacks(to).contains(king),
        Role::Bishop => attacks::bishop_attacks(to, occupied).contains(king),
        Role::Rook => attacks::rook_attacks(to, occupied).contains(king),
        Role::Queen => attacks::queen_attacks(to, occupied).contains(king),
        Role::King => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::control::SearchLimits;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn data(fen: &str) -> SearchData {
        let position: Position = fen.parse().unwrap();
        SearchData::new(position, SearchLimits::default(), Arc::new(AtomicBool::new(false)))
    }

    fn collect(picker: &MovePicker, sd: &mut SearchData) -> Vec<Move> {
        let mut seen = Vec::new();
        let completed = picker.enumerate(sd, |_, m| {
            seen.push(m);
            true
        });
        assert!(completed);
        seen
    }

    fn uci(sd: &SearchData, text: &str) -> Move {
        sd.position.parse_uci_move(text).expect("legal move")
    }

    #[test]
    fn yields_every_legal_move_exactly_once() {
        let mut sd = data("r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4");
        let tt = uci(&sd, "f3e5");
        let killer = uci(&sd, "b1c3");
        let counter = uci(&sd, "d2d3");
        let picker = MovePicker::main(Some(tt), Some(killer), None, Some(counter));

        let yielded = collect(&picker, &mut sd);
        let legal: HashSet<Move> = sd.position.moves(MoveCategory::All).into_iter().collect();

        assert_eq!(yielded.len(), legal.len());
        let unique: HashSet<Move> = yielded.iter().copied().collect();
        assert_eq!(unique.len(), yielded.len(), "a move was yielded twice");
        assert_eq!(unique, legal);
    }

    #[test]
    fn tt_move_comes_first() {
        let mut sd = data("r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4");
        let tt = uci(&sd, "e1g1");
        let picker = MovePicker::main(Some(tt), None, None, None);
        let yielded = collect(&picker, &mut sd);
        assert_eq!(yielded[0], tt);
    }

    #[test]
    fn illegal_tt_move_is_skipped() {
        // Qd1-h5 is legal after 1.e4 e5 but blocked by the f3 knight here
        let mut sd = data("r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4");
        let other: Position = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2"
            .parse()
            .unwrap();
        let foreign = other.parse_uci_move("d1h5").unwrap();
        assert!(!sd.position.is_legal(&foreign));

        let picker = MovePicker::main(Some(foreign), None, None, None);
        let yielded = collect(&picker, &mut sd);
        assert!(!yielded.contains(&foreign));
        assert_eq!(yielded.len(), sd.position.moves(MoveCategory::All).len());
    }

    #[test]
    fn pawn_takes_queen_before_knight_takes_pawn() {
        // Both exd5 (PxQ) and Nxh7 (NxP) win material
        let mut sd = data("4k3/7p/8/3q2N1/4P3/8/8/4K3 w - - 0 1");
        let pxq = uci(&sd, "e4d5");
        let nxp = uci(&sd, "g5h7");
        let picker = MovePicker::main(None, None, None, None);
        let yielded = collect(&picker, &mut sd);

        let pxq_at = yielded.iter().position(|m| *m == pxq).unwrap();
        let nxp_at = yielded.iter().position(|m| *m == nxp).unwrap();
        assert!(pxq_at < nxp_at, "MVV-LVA should put PxQ first");
    }

    #[test]
    fn losing_capture_is_deferred_behind_quiets() {
        // Qxe5 loses the queen to the d6 pawn
        let mut sd = data("4k3/8/3p4/4p3/3Q4/8/8/4K3 w - - 0 1");
        let qxp = uci(&sd, "d4e5");
        let picker = MovePicker::main(None, None, None, None);
        let yielded = collect(&picker, &mut sd);

        let qxp_at = yielded.iter().position(|m| *m == qxp).unwrap();
        // Qxd6 wins a pawn and stays in the tactical stage
        let qxd6 = uci(&sd, "d4d6");
        let qxd6_at = yielded.iter().position(|m| *m == qxd6).unwrap();
        assert!(qxd6_at < qxp_at);
        // With no negatively-scored quiets, the bad capture runs dead last
        assert_eq!(qxp_at, yielded.len() - 1);
        for (i, m) in yielded.iter().enumerate() {
            if !sd.position.is_tactical(m) {
                assert!(i < qxp_at, "{m} ran after the deferred capture");
            }
        }
    }

    #[test]
    fn killers_rank_between_tacticals_and_quiets() {
        // Nxh7 grabs a free pawn; the killer is an arbitrary quiet
        let mut sd = data("4k3/7p/8/6N1/8/8/1P6/4K3 w - - 0 1");
        let capture = uci(&sd, "g5h7");
        let killer = uci(&sd, "e1e2");
        let picker = MovePicker::main(None, Some(killer), None, None);
        let yielded = collect(&picker, &mut sd);

        let capture_at = yielded.iter().position(|m| *m == capture).unwrap();
        let killer_at = yielded.iter().position(|m| *m == killer).unwrap();
        assert!(capture_at < killer_at, "good capture should run before the killer");

        // All other quiets come after the killer
        for (i, m) in yielded.iter().enumerate() {
            if !sd.position.is_tactical(m) && *m != killer {
                assert!(i > killer_at, "{m} ran before the killer");
            }
        }
    }

    #[test]
    fn tactical_killer_is_ignored() {
        let mut sd = data("r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4");
        let capture = uci(&sd, "f3e5");
        let picker = MovePicker::main(None, Some(capture), None, None);
        let yielded = collect(&picker, &mut sd);
        // Still yielded exactly once, in the tactical stage
        assert_eq!(yielded.iter().filter(|m| **m == capture).count(), 1);
    }

    #[test]
    fn counter_move_skipped_when_equal_to_killer() {
        let mut sd = data("r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4");
        let quiet = uci(&sd, "b1c3");
        let picker = MovePicker::main(None, Some(quiet), None, Some(quiet));
        let yielded = collect(&picker, &mut sd);
        assert_eq!(yielded.iter().filter(|m| **m == quiet).count(), 1);
    }

    #[test]
    fn evasions_cover_all_legal_moves_in_check() {
        let mut sd = data("rnbqkbnr/ppppp1pp/8/5p1Q/8/4P3/PPPP1PPP/RNB1KBNR b KQkq - 1 2");
        assert!(sd.position.in_check());
        let picker = MovePicker::main(None, None, None, None);
        let yielded = collect(&picker, &mut sd);

        let legal: HashSet<Move> = sd.position.moves(MoveCategory::All).into_iter().collect();
        let unique: HashSet<Move> = yielded.iter().copied().collect();
        assert_eq!(unique, legal);
        assert_eq!(unique.len(), yielded.len());
    }

    #[test]
    fn capturing_evasions_come_first() {
        // Qxf7+; the king can take the queen or step to d8
        let mut sd = data("r1bqkbnr/pppp1Qpp/2n5/4p3/4P3/8/PPPP1PPP/RNB1KBNR b KQkq - 0 3");
        assert!(sd.position.in_check());
        let kxq = uci(&sd, "e8f7");
        let picker = MovePicker::main(None, None, None, None);
        let yielded = collect(&picker, &mut sd);
        assert!(yielded.len() >= 2);
        assert_eq!(yielded[0], kxq);
    }

    #[test]
    fn quiescence_keeps_only_winning_tacticals() {
        // exd5 wins a queen; Qxe5 would lose the queen to the d6 pawn
        let mut sd = data("4k3/8/3p4/3qp3/3QP3/8/8/4K3 w - - 0 1");
        let winning = uci(&sd, "e4d5");
        let losing = uci(&sd, "d4e5");
        let picker = MovePicker::quiescence(None);
        let yielded = collect(&picker, &mut sd);

        assert!(yielded.contains(&winning));
        assert!(!yielded.contains(&losing));
        for m in &yielded {
            assert!(sd.position.is_tactical(m));
        }
    }

    #[test]
    fn quiescence_yields_nothing_in_quiet_positions() {
        let mut sd = data("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
        let picker = MovePicker::quiescence(None);
        assert!(collect(&picker, &mut sd).is_empty());
    }

    #[test]
    fn enumeration_stops_on_handler_cutoff() {
        let mut sd = data("r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4");
        let picker = MovePicker::main(None, None, None, None);
        let mut count = 0;
        let completed = picker.enumerate(&mut sd, |_, _| {
            count += 1;
            count < 3
        });
        assert!(!completed);
        assert_eq!(count, 3);
    }

    #[test]
    fn escaping_a_threatened_queen_outranks_other_quiets() {
        // White queen on d4 is attacked by the rook on d8
        let mut sd = data("3rk3/8/8/8/3Q4/8/1P6/4K3 w - - 0 1");
        let picker = MovePicker::main(None, None, None, None);
        let yielded = collect(&picker, &mut sd);

        // First non-tactical move should move the queen off the d-file
        let first_quiet = yielded
            .iter()
            .find(|m| !sd.position.is_tactical(m))
            .unwrap();
        assert_eq!(first_quiet.role(), Role::Queen);
        assert_ne!(first_quiet.to().file(), shakmaty::File::D);
    }
}
