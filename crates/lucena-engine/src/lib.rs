//! Search core for the lucena chess engine.

pub mod eval;
pub mod perft;
pub mod position;
pub mod search;
pub mod time;

pub use eval::evaluate;
pub use perft::perft;
pub use position::{FenParseError, MoveCategory, Position};
pub use search::control::{SearchData, SearchLimits};
pub use search::ordering::{MovePicker, PickerMode};
pub use search::tt::{Bound, TranspositionTable};
pub use search::{
    Engine, PvLine, Score, SearchEvent, SearchHandler, INF, MATE_SCORE, MATE_THRESHOLD, MAX_PLY,
};
pub use time::TimeMs;
