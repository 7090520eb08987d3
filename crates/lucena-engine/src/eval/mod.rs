//! Static evaluation: material plus piece-square tables.

pub mod material;
pub mod pst;

use shakmaty::Color;

use crate::position::Position;
use crate::search::Score;

/// Evaluate the position from the side-to-move perspective.
pub fn evaluate(pos: &Position) -> Score {
    let board = pos.board();
    let mut total: Score = 0;

    for sq in board.occupied() {
        if let Some(piece) = board.piece_at(sq) {
            let value = material::value(piece.role) + pst::bonus(piece.role, piece.color, sq);
            total += if piece.color == Color::White { value } else { -value };
        }
    }

    if pos.side_to_move() == Color::White {
        total
    } else {
        -total
    }
}
