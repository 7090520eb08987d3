//! Event-driven UCI engine loop.
//!
//! The main thread multiplexes parsed commands from a stdin reader
//! thread with completion events from the search thread. Each `go`
//! hands the engine to a worker for the duration of the search; `stop`
//! reaches it through the shared stop flag.

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use shakmaty::CastlingMode;
use tracing::{debug, info, warn};

use lucena_engine::{
    Engine, Position, Score, SearchEvent, SearchHandler, SearchLimits, MATE_SCORE, MATE_THRESHOLD,
};

use crate::command::{parse_command, Command, GoParams};
use crate::error::UciError;

/// Whether the engine is idle or has a search thread running.
enum EngineState {
    Idle,
    Searching,
}

/// Events processed by the main engine loop.
enum EngineEvent {
    UciCommand(Result<Command, UciError>),
    SearchDone(SearchDone),
    InputClosed,
}

/// Payload returned by the search thread when it finishes.
struct SearchDone {
    engine: Engine,
}

/// Search-thread handler: `info` per iteration, `bestmove` at the end.
struct InfoReporter;

impl SearchHandler for InfoReporter {
    fn on_search_progress(&mut self, event: &SearchEvent) {
        let elapsed = event.elapsed.max(1);
        let nps = event.nodes.saturating_mul(1000) / elapsed;
        let mut line = format!(
            "info depth {} score {} nodes {} nps {} time {} hashfull {}",
            event.depth,
            format_score(event.score),
            event.nodes,
            nps,
            event.elapsed,
            event.hashfull,
        );
        if !event.pv.is_empty() {
            line.push_str(" pv");
            for m in event.pv {
                line.push(' ');
                line.push_str(&m.to_uci(CastlingMode::Standard).to_string());
            }
        }
        println!("{line}");
    }

    fn on_search_finish(&mut self, event: &SearchEvent) {
        match event.pv.first() {
            Some(m) => println!("bestmove {}", m.to_uci(CastlingMode::Standard)),
            None => println!("bestmove 0000"),
        }
    }
}

/// Render a score as `cp <n>` or `mate <n>` per the UCI convention.
fn format_score(score: Score) -> String {
    if score > MATE_THRESHOLD {
        format!("mate {}", (MATE_SCORE - score + 1) / 2)
    } else if score < -MATE_THRESHOLD {
        format!("mate -{}", (MATE_SCORE + score + 1) / 2)
    } else {
        format!("cp {score}")
    }
}

/// Translate `go` parameters into engine search limits, resolving any
/// `searchmoves` against the position about to be searched.
fn limits_from_go(params: &GoParams, position: &Position) -> SearchLimits {
    let mut limits = SearchLimits::default();

    if !params.infinite {
        limits.time_left = [params.wtime.unwrap_or(0), params.btime.unwrap_or(0)];
        limits.increment = [params.winc.unwrap_or(0), params.binc.unwrap_or(0)];
        limits.moves_to_go = params.movestogo.unwrap_or(0);
        limits.max_time = params.movetime.unwrap_or(0);
        limits.max_nodes = params.nodes.unwrap_or(0);
    }
    limits.max_depth = params.depth.unwrap_or(0);

    for text in &params.search_moves {
        match position.parse_uci_move(text) {
            Some(m) => limits.search_moves.push(m),
            None => warn!(mv = %text, "ignoring illegal searchmoves entry"),
        }
    }

    limits
}

/// The UCI engine: current position, the searcher, and loop state.
pub struct UciEngine {
    engine: Option<Engine>,
    position: Position,
    stop_flag: Arc<AtomicBool>,
    state: EngineState,
    pending_clear_tt: bool,
}

impl UciEngine {
    /// Create a new engine at the starting position.
    pub fn new() -> Self {
        let engine = Engine::new();
        let stop_flag = engine.stop_flag();
        Self {
            engine: Some(engine),
            position: Position::new(),
            stop_flag,
            state: EngineState::Idle,
            pending_clear_tt: false,
        }
    }

    /// Run the UCI event loop until `quit` or stdin closes.
    pub fn run(mut self) -> Result<(), UciError> {
        let (tx, rx) = mpsc::channel::<EngineEvent>();

        // Stdin reader thread
        let stdin_tx = tx.clone();
        std::thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        let trimmed = line.trim().to_string();
                        if trimmed.is_empty() {
                            continue;
                        }
                        debug!(cmd = %trimmed, "received UCI command");
                        let cmd = parse_command(&trimmed);
                        if stdin_tx.send(EngineEvent::UciCommand(cmd)).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            let _ = stdin_tx.send(EngineEvent::InputClosed);
        });

        for event in &rx {
            match event {
                EngineEvent::UciCommand(Ok(cmd)) => match cmd {
                    Command::Uci => self.handle_uci(),
                    Command::IsReady => println!("readyok"),
                    Command::UciNewGame => self.handle_ucinewgame(),
                    Command::SetOption { name, value } => self.handle_setoption(&name, value.as_deref()),
                    Command::Position(position) => self.position = position,
                    Command::Go(params) => self.handle_go(&params, &tx),
                    Command::Stop => self.handle_stop(),
                    Command::Quit => {
                        // Wind down any active search before leaving
                        if !matches!(self.state, EngineState::Idle) {
                            self.handle_stop();
                            for pending in &rx {
                                if let EngineEvent::SearchDone(done) = pending {
                                    self.finish_search(done);
                                    break;
                                }
                            }
                        }
                        break;
                    }
                    Command::Unknown(cmd) => {
                        if !cmd.is_empty() {
                            debug!(cmd = %cmd, "ignoring unknown command");
                        }
                    }
                },
                EngineEvent::UciCommand(Err(e)) => {
                    warn!(error = %e, "UCI parse error");
                }
                EngineEvent::SearchDone(done) => self.finish_search(done),
                EngineEvent::InputClosed => break,
            }
        }

        info!("lucena shutting down");
        Ok(())
    }

    fn handle_uci(&self) {
        println!("id name lucena");
        println!("id author the lucena authors");
        println!("option name Hash type spin default 16 min 1 max 1024");
        println!("uciok");
    }

    fn handle_ucinewgame(&mut self) {
        self.position = Position::new();
        if let Some(ref mut engine) = self.engine {
            engine.new_game();
        } else {
            // Search thread owns the engine -- clear once it returns
            self.pending_clear_tt = true;
        }
    }

    fn handle_setoption(&mut self, name: &str, value: Option<&str>) {
        match name {
            "hash" => {
                let Some(mb) = value.and_then(|v| v.parse::<usize>().ok()) else {
                    warn!(value = ?value, "bad Hash value");
                    return;
                };
                if let Some(ref mut engine) = self.engine {
                    engine.resize_tt(mb.clamp(1, 1024));
                } else {
                    warn!("cannot resize hash during search");
                }
            }
            other => debug!(option = %other, "ignoring unknown option"),
        }
    }

    fn handle_go(&mut self, params: &GoParams, tx: &mpsc::Sender<EngineEvent>) {
        if !matches!(self.state, EngineState::Idle) {
            warn!("go received while already searching, ignoring");
            return;
        }

        let mut engine = self.engine.take().unwrap_or_default();
        engine.set_position(self.position.clone());
        self.stop_flag = engine.stop_flag();

        let limits = limits_from_go(params, engine.position());
        let tx = tx.clone();
        std::thread::spawn(move || {
            engine.search(&limits, &mut InfoReporter);
            let _ = tx.send(EngineEvent::SearchDone(SearchDone { engine }));
        });

        self.state = EngineState::Searching;
    }

    fn handle_stop(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    fn finish_search(&mut self, done: SearchDone) {
        let mut engine = done.engine;
        if self.pending_clear_tt {
            engine.new_game();
            self.pending_clear_tt = false;
        }
        self.engine = Some(engine);
        self.state = EngineState::Idle;
    }
}

impl Default for UciEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centipawn_scores_format_as_cp() {
        assert_eq!(format_score(0), "cp 0");
        assert_eq!(format_score(-137), "cp -137");
    }

    #[test]
    fn mate_scores_format_as_mate_distance() {
        // Mate delivered at ply 1: mate in 1
        assert_eq!(format_score(MATE_SCORE - 1), "mate 1");
        // Mate delivered at ply 3: mate in 2
        assert_eq!(format_score(MATE_SCORE - 3), "mate 2");
        // Getting mated at ply 2
        assert_eq!(format_score(-(MATE_SCORE - 2)), "mate -1");
    }

    #[test]
    fn go_clocks_map_to_limits_per_side() {
        let params = GoParams {
            wtime: Some(300_000),
            btime: Some(200_000),
            winc: Some(2_000),
            binc: Some(1_000),
            movestogo: Some(40),
            ..GoParams::default()
        };
        let limits = limits_from_go(&params, &Position::new());
        assert_eq!(limits.time_left, [300_000, 200_000]);
        assert_eq!(limits.increment, [2_000, 1_000]);
        assert_eq!(limits.moves_to_go, 40);
        assert_eq!(limits.max_depth, 0);
    }

    #[test]
    fn go_infinite_clears_budgets() {
        let params = GoParams {
            wtime: Some(1_000),
            nodes: Some(500),
            infinite: true,
            ..GoParams::default()
        };
        let limits = limits_from_go(&params, &Position::new());
        assert_eq!(limits.time_left, [0, 0]);
        assert_eq!(limits.max_nodes, 0);
    }

    #[test]
    fn searchmoves_resolve_against_the_position() {
        let params = GoParams {
            search_moves: vec!["e2e4".into(), "x9y9".into(), "e2e5".into()],
            ..GoParams::default()
        };
        let limits = limits_from_go(&params, &Position::new());
        // Only the legal e2e4 survives
        assert_eq!(limits.search_moves.len(), 1);
        assert_eq!(
            limits.search_moves[0]
                .to_uci(CastlingMode::Standard)
                .to_string(),
            "e2e4"
        );
    }
}
