//! Position facade over the shakmaty board.
//!
//! The search core never touches `shakmaty::Chess` directly. This wrapper
//! adds the pieces the search needs on top of it: paired `do_move` /
//! `undo_move`, previous-move tracking, category-restricted move
//! enumeration, thresholded static exchange evaluation, and threat maps.

pub(crate) mod see;
pub(crate) mod threats;

use std::str::FromStr;

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, MoveList, Piece, Position as _, Square};

/// Errors from building a [`Position`] out of a FEN string.
#[derive(Debug, thiserror::Error)]
pub enum FenParseError {
    /// The FEN text itself could not be parsed.
    #[error("invalid FEN: {source}")]
    Syntax {
        /// The underlying parse error.
        #[from]
        source: shakmaty::fen::ParseFenError,
    },

    /// The FEN parsed but does not describe a reachable, legal position.
    #[error("illegal position: {reason}")]
    Illegal {
        /// Description of the validation failure.
        reason: String,
    },
}

/// Restriction applied to legal-move enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveCategory {
    /// Every legal move.
    All,
    /// Captures and promotions.
    Tactical,
    /// Legal moves that are neither captures nor promotions.
    Quiet,
    /// Check evasions. Only meaningful while in check, where every legal
    /// move is an evasion.
    Evasions,
}

/// A chess position with move history.
///
/// `do_move` and `undo_move` are strict inverses: undoing the move that
/// was done restores the position bit for bit, including castling rights,
/// the en-passant square, and the Zobrist key.
#[derive(Debug, Clone)]
pub struct Position {
    chess: Chess,
    history: Vec<(Chess, Move)>,
}

impl Position {
    /// The standard starting position.
    pub fn new() -> Self {
        Self {
            chess: Chess::default(),
            history: Vec::new(),
        }
    }

    /// Build a position from a FEN string.
    pub fn from_fen(fen: &str) -> Result<Self, FenParseError> {
        let fen: Fen = fen.parse()?;
        let chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| FenParseError::Illegal {
                reason: e.to_string(),
            })?;
        Ok(Self {
            chess,
            history: Vec::new(),
        })
    }

    /// Render the current position as a FEN string.
    pub fn fen(&self) -> String {
        Fen::from_position(&self.chess, EnPassantMode::Legal).to_string()
    }

    /// The side to move.
    pub fn side_to_move(&self) -> Color {
        self.chess.turn()
    }

    /// Whether the side to move is in check.
    pub fn in_check(&self) -> bool {
        self.chess.is_check()
    }

    /// The piece standing on `sq`, if any.
    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.chess.board().piece_at(sq)
    }

    /// The underlying piece placement.
    pub fn board(&self) -> &shakmaty::Board {
        self.chess.board()
    }

    /// Zobrist key of the current position.
    pub fn hash_key(&self) -> u64 {
        let hash: Zobrist64 = self.chess.zobrist_hash(EnPassantMode::Legal);
        hash.0
    }

    /// Whether `m` is legal for the side to move.
    ///
    /// Works for moves that did not come out of move generation, such as
    /// a transposition-table move probed from a colliding entry.
    pub fn is_legal(&self, m: &Move) -> bool {
        self.chess.legal_moves().contains(m)
    }

    /// Whether `m` captures a piece (including en passant).
    pub fn is_capture(&self, m: &Move) -> bool {
        m.is_capture()
    }

    /// Whether `m` is a capture or a promotion.
    pub fn is_tactical(&self, m: &Move) -> bool {
        m.is_capture() || m.is_promotion()
    }

    /// Enumerate legal moves restricted to `category`.
    pub fn moves(&self, category: MoveCategory) -> MoveList {
        let mut list = self.chess.legal_moves();
        match category {
            MoveCategory::All | MoveCategory::Evasions => {}
            MoveCategory::Tactical => list.retain(|m| self.is_tactical(m)),
            MoveCategory::Quiet => list.retain(|m| !self.is_tactical(m)),
        }
        list
    }

    /// Play `m` on the position. Must be a legal move.
    pub fn do_move(&mut self, m: Move) {
        self.history.push((self.chess.clone(), m));
        self.chess.play_unchecked(m);
    }

    /// Take back `m`, which must be the most recently played move.
    pub fn undo_move(&mut self, m: Move) {
        let (chess, played) = self
            .history
            .pop()
            .expect("undo_move without a matching do_move");
        debug_assert_eq!(played, m, "undo_move out of order");
        self.chess = chess;
    }

    /// The most recently played move, if any.
    pub fn previous_move(&self) -> Option<Move> {
        self.history.last().map(|(_, m)| *m)
    }

    /// Thresholded static exchange evaluation.
    ///
    /// Returns whether the exchange started by `m` wins at least
    /// `threshold` centipawns, assuming optimal recaptures and that
    /// either side may stop recapturing.
    pub fn see(&self, m: &Move, threshold: i32) -> bool {
        see::see_ge(self.chess.board(), self.chess.turn(), m, threshold)
    }

    /// Resolve a move in UCI notation ("e2e4", "e7e8q") against this
    /// position. Returns `None` for unparseable or illegal moves.
    pub fn parse_uci_move(&self, text: &str) -> Option<Move> {
        let uci = UciMove::from_ascii(text.as_bytes()).ok()?;
        uci.to_move(&self.chess).ok()
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for Position {
    type Err = FenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_fen(s)
    }
}
