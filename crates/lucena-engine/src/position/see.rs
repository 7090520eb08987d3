//! Static exchange evaluation.
//!
//! Resolves the capture sequence on a single square by always recapturing
//! with the least valuable attacker, where either side may stop once
//! continuing would lose material.

use shakmaty::{Board, Color, Move, Piece, Role, Square};

use crate::eval::material;

/// Whether the exchange started by `m` nets at least `threshold`
/// centipawns for the mover.
pub(crate) fn see_ge(board: &Board, turn: Color, m: &Move, threshold: i32) -> bool {
    let from = match m {
        // Castling moves nothing into danger that SEE can measure
        Move::Castle { .. } => return 0 >= threshold,
        _ => match m.from() {
            Some(sq) => sq,
            None => return 0 >= threshold,
        },
    };
    let to = m.to();

    let mut balance = m.capture().map_or(0, material::value);
    if let Some(promoted) = m.promotion() {
        balance += material::value(promoted) - material::value(Role::Pawn);
    }

    // Resolve the board as it stands after the initial capture
    let mover = Piece {
        color: turn,
        role: m.promotion().unwrap_or(m.role()),
    };
    let mut next = board.clone();
    next.discard_piece_at(from);
    if m.is_en_passant() {
        next.discard_piece_at(Square::from_coords(to.file(), from.rank()));
    }
    next.set_piece_at(to, mover);

    balance - exchange(&next, to, !turn) >= threshold
}

/// Best material outcome for `side` continuing the exchange on `sq`,
/// given that declining to recapture is always available (never negative).
fn exchange(board: &Board, sq: Square, side: Color) -> i32 {
    let attackers = board.attacks_to(sq, side, board.occupied()) & board.by_color(side);
    let Some((from, piece)) = least_valuable_attacker(board, attackers, side) else {
        return 0;
    };
    let Some(victim) = board.piece_at(sq) else {
        return 0;
    };

    let mut next = board.clone();
    next.discard_piece_at(from);
    next.set_piece_at(sq, piece);

    (material::value(victim.role) - exchange(&next, sq, !side)).max(0)
}

/// Least valuable piece of `side` within `attackers`.
fn least_valuable_attacker(
    board: &Board,
    attackers: shakmaty::Bitboard,
    side: Color,
) -> Option<(Square, Piece)> {
    // Role::ALL runs pawn to king, already in value order
    for role in Role::ALL {
        let piece = Piece { color: side, role };
        if let Some(sq) = (attackers & board.by_piece(piece)).first() {
            return Some((sq, piece));
        }
    }
    None
}
