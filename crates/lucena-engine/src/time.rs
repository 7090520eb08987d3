//! Per-move time allocation.

/// Wall-clock time in integer milliseconds.
pub type TimeMs = u64;

/// Slack kept back from the clock to cover I/O and scheduling jitter.
const MOVE_OVERHEAD: TimeMs = 10;

/// Derive the time budget for one move from the remaining clock.
///
/// Divides the usable remainder over the expected number of moves
/// (`moves_to_go` when the GUI supplies it, otherwise 25 with an
/// increment and 30 without) and banks most of the increment. The
/// result is monotone in `time_left` and never exceeds half the usable
/// remainder.
pub fn allocate_time(time_left: TimeMs, increment: TimeMs, moves_to_go: u32) -> TimeMs {
    if time_left <= MOVE_OVERHEAD {
        return 1;
    }
    let usable = time_left - MOVE_OVERHEAD;

    let mtg = if moves_to_go > 0 {
        TimeMs::from(moves_to_go)
    } else if increment > 0 {
        25
    } else {
        30
    };

    let allocated = usable / mtg + increment * 3 / 4;
    let cap = (usable / 2).max(1);
    allocated.clamp(1, cap)
}
